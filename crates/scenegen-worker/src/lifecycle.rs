//! Scene task lifecycle.
//!
//! A [`TaskController`] drives one scene descriptor to one [`SceneResult`]:
//!
//! 1. Submit the image job, poll it to a URL and download the frame. Any
//!    failure resubmits the image; by default there is no ceiling.
//! 2. For scenes with a video prompt, submit the video job using the remote
//!    image URL, poll it and download the clip. Submission failures,
//!    provider failures, unreadable status, timeouts and download failures
//!    each consume one of the policy's video attempts.
//!
//! Every path returns a result; nothing here panics or errors out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use scenegen_models::{
    FailureReason, JobKind, ProviderJob, SceneResult, SceneTaskDescriptor, TaskState,
    VideoProvider,
};
use scenegen_providers::{ImageRequest, PollStatus, ProviderAdapter, VideoRequest};
use tokio::time::{sleep, Duration, Instant};
use tracing::Instrument;

use crate::logging::SceneLogger;
use crate::metrics::{record_retry, record_scene};
use crate::retry::{retry_async, FailureTracker, RetryPolicy};

/// How one submitted job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEnd {
    /// The provider produced an artifact at this URL.
    Succeeded(String),
    /// The provider reported failure.
    Failed(String),
    /// Too many consecutive polls could not be read.
    Unreachable,
    /// No terminal status within the attempt window.
    TimedOut,
}

/// Polling limits for [`await_job`].
#[derive(Debug, Clone, Copy)]
pub struct PollLimits {
    pub interval: Duration,
    pub timeout: Duration,
    pub max_unknown_polls: u32,
}

/// Poll `job` until it ends.
///
/// A `Succeeded` status without an artifact URL is not terminal; polling
/// continues until a URL shows up or the window closes.
pub async fn await_job(
    adapter: &dyn ProviderAdapter,
    job: &mut ProviderJob,
    limits: PollLimits,
    logger: &SceneLogger,
) -> JobEnd {
    let deadline = Instant::now() + limits.timeout;
    let mut unknown = FailureTracker::new(3);

    loop {
        let outcome = adapter.poll(&job.job_id, job.kind).await;
        logger.log_polling(job.kind, &job.job_id, outcome.status.as_str());

        match outcome.status {
            PollStatus::Succeeded => {
                unknown.record_success();
                if let Some(url) = outcome.artifact_url {
                    job.transition(TaskState::Succeeded);
                    return JobEnd::Succeeded(url);
                }
                logger.log_warning(job.kind, "provider reported success without a URL");
            }
            PollStatus::Failed => {
                job.transition(TaskState::Failed);
                return JobEnd::Failed(
                    outcome
                        .error
                        .unwrap_or_else(|| "provider reported failure".to_string()),
                );
            }
            PollStatus::Unknown => {
                if unknown.record_failure() {
                    logger.log_warning(
                        job.kind,
                        &format!(
                            "status unavailable: {}",
                            outcome.error.as_deref().unwrap_or("no detail")
                        ),
                    );
                }
                if unknown.exceeds(limits.max_unknown_polls) {
                    return JobEnd::Unreachable;
                }
            }
            PollStatus::Queued | PollStatus::Processing => {
                unknown.record_success();
                if let Some(state) = outcome.status.task_state() {
                    job.transition(state);
                }
            }
        }

        if Instant::now() >= deadline {
            job.transition(TaskState::TimedOut);
            return JobEnd::TimedOut;
        }
        sleep(limits.interval).await;
    }
}

/// Download `url` to `dest`, retrying the same URL per the policy.
pub async fn download_artifact(
    adapter: &dyn ProviderAdapter,
    url: &str,
    dest: &Path,
    policy: &RetryPolicy,
) -> bool {
    retry_async(&policy.download_retry(), || async {
        if adapter.download(url, dest).await {
            Ok(())
        } else {
            Err(format!("download of {} failed", url))
        }
    })
    .await
    .is_success()
}

/// Drives one scene through its image and video stages.
pub struct TaskController {
    image: Arc<dyn ProviderAdapter>,
    video: Option<Arc<dyn ProviderAdapter>>,
    video_provider: Option<VideoProvider>,
    policy: RetryPolicy,
    output_dir: PathBuf,
}

impl TaskController {
    pub fn new(
        image: Arc<dyn ProviderAdapter>,
        video: Option<Arc<dyn ProviderAdapter>>,
        policy: RetryPolicy,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            image,
            video,
            video_provider: None,
            policy,
            output_dir: output_dir.into(),
        }
    }

    /// Name the backend behind the video adapter so results can record it.
    pub fn with_video_provider(mut self, provider: VideoProvider) -> Self {
        self.video_provider = Some(provider);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the scene to completion.
    pub async fn run(&self, descriptor: &SceneTaskDescriptor) -> SceneResult {
        let logger = SceneLogger::new(&descriptor.identity);
        let span = logger.create_span();
        self.drive(descriptor, &logger).instrument(span).await
    }

    async fn drive(&self, descriptor: &SceneTaskDescriptor, logger: &SceneLogger) -> SceneResult {
        let started = Instant::now();
        let mut result = SceneResult::new(descriptor.identity.clone());
        logger.log_start(descriptor.wants_video());

        if let Some(image_url) = self.image_stage(descriptor, &mut result, logger).await {
            if descriptor.wants_video() {
                match &self.video {
                    Some(video) => {
                        let video = video.as_ref();
                        self.video_stage(video, descriptor, &image_url, &mut result, logger)
                            .await
                    }
                    None => {
                        logger.log_error("no video provider for a scene with a video prompt");
                        result.failure = Some(FailureReason::Aborted {
                            message: "no video provider configured".to_string(),
                        });
                    }
                }
            }
        }

        result.completed_at = Utc::now();

        let outcome = match (&result.failure, result.has_video()) {
            (None, true) => "complete",
            (None, false) => "image_only",
            (Some(_), _) => "failed",
        };
        record_scene(outcome, started.elapsed().as_secs_f64());
        match &result.failure {
            Some(reason) => logger.log_completion(&format!("{} ({})", outcome, reason)),
            None => logger.log_completion(outcome),
        }

        result
    }

    /// Returns the remote image URL once the frame is on disk.
    async fn image_stage(
        &self,
        descriptor: &SceneTaskDescriptor,
        result: &mut SceneResult,
        logger: &SceneLogger,
    ) -> Option<String> {
        let stage = JobKind::Image;
        let dest = self.output_dir.join(descriptor.identity.image_file_name());
        let request = ImageRequest {
            prompt: descriptor.image_prompt.clone(),
            reference_image_urls: descriptor.reference_image_urls.clone(),
            aspect_ratio: descriptor.render.image_aspect_ratio.clone(),
            size: descriptor.render.image_size.clone(),
        };
        let limits = PollLimits {
            interval: self.policy.poll_interval,
            timeout: self.policy.image_timeout,
            max_unknown_polls: self.policy.max_unknown_polls,
        };

        loop {
            if !self.policy.allows_image_attempt(result.image_attempts) {
                result.failure = Some(FailureReason::ProviderUnavailable {
                    stage,
                    attempts: result.image_attempts,
                });
                logger.log_error("image attempt ceiling reached");
                return None;
            }
            if result.image_attempts > 0 {
                record_retry(stage.as_str());
                sleep(self.policy.submit_backoff).await;
            }

            result.image_attempts += 1;
            let attempt = result.image_attempts;

            let Some(job_id) = self.image.submit_image(&request).await else {
                logger.log_submit_failed(stage, attempt);
                continue;
            };
            logger.log_submitted(stage, &job_id, attempt);
            result.image_job_id = Some(job_id.clone());

            let mut job = ProviderJob::new(job_id, stage, self.image.name(), attempt);
            match await_job(self.image.as_ref(), &mut job, limits, logger).await {
                JobEnd::Succeeded(url) => {
                    logger.log_succeeded(stage, &job.job_id, attempt);
                    if download_artifact(self.image.as_ref(), &url, &dest, &self.policy).await {
                        result.image_path = Some(dest);
                        result.image_url = Some(url.clone());
                        return Some(url);
                    }
                    logger.log_warning(stage, "frame download failed, resubmitting");
                }
                JobEnd::Failed(message) => logger.log_failed(stage, &job.job_id, attempt, &message),
                JobEnd::Unreachable => {
                    logger.log_warning(stage, "status unavailable, resubmitting");
                }
                JobEnd::TimedOut => logger.log_timed_out(stage, &job.job_id, attempt),
            }
        }
    }

    async fn video_stage(
        &self,
        video: &dyn ProviderAdapter,
        descriptor: &SceneTaskDescriptor,
        image_url: &str,
        result: &mut SceneResult,
        logger: &SceneLogger,
    ) {
        let stage = JobKind::Video;
        let dest = self.output_dir.join(descriptor.identity.video_file_name());
        let request = VideoRequest {
            prompt: descriptor.video_prompt.clone().unwrap_or_default(),
            reference_image_url: image_url.to_string(),
            aspect_ratio: descriptor.render.video_aspect_ratio.clone(),
            duration: descriptor.render.video_duration.clone(),
            size: descriptor.render.video_size.clone(),
        };
        let limits = PollLimits {
            interval: self.policy.poll_interval,
            timeout: self.policy.video_timeout,
            max_unknown_polls: self.policy.max_unknown_polls,
        };
        let max_submissions = self.policy.video_submissions();

        while result.video_attempts < max_submissions {
            if result.video_attempts > 0 {
                record_retry(stage.as_str());
                sleep(self.policy.submit_backoff).await;
            }

            result.video_attempts += 1;
            let attempts = result.video_attempts;

            let Some(job_id) = video.submit_video(&request).await else {
                logger.log_submit_failed(stage, attempts);
                result.failure = Some(FailureReason::VideoSubmitFailed { attempts });
                continue;
            };
            logger.log_submitted(stage, &job_id, attempts);
            result.video_job_id = Some(job_id.clone());
            result.video_provider = self.video_provider;

            let mut job = ProviderJob::new(job_id, stage, video.name(), attempts);
            let failure = match await_job(video, &mut job, limits, logger).await {
                JobEnd::Succeeded(url) => {
                    logger.log_succeeded(stage, &job.job_id, attempts);
                    if download_artifact(video, &url, &dest, &self.policy).await {
                        result.video_path = Some(dest);
                        result.failure = None;
                        return;
                    }
                    FailureReason::VideoDownloadFailed { attempts }
                }
                JobEnd::Failed(message) => {
                    logger.log_failed(stage, &job.job_id, attempts, &message);
                    FailureReason::VideoFailed { attempts, message }
                }
                JobEnd::Unreachable => {
                    logger.log_warning(stage, "status unavailable");
                    FailureReason::VideoStatusUnavailable { attempts }
                }
                JobEnd::TimedOut => {
                    logger.log_timed_out(stage, &job.job_id, attempts);
                    FailureReason::VideoTimedOut { attempts }
                }
            };
            result.failure = Some(failure);
        }
    }
}
