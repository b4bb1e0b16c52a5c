//! Resuming outstanding video jobs.
//!
//! A batch can end with video jobs still running at the provider. Their ids
//! are in the saved report; [`VideoQuery`] polls them again, downloads the
//! finished clips and merges the outcome back into the report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use scenegen_models::{FailureReason, JobKind, ProviderJob, SceneResult, VideoProvider};
use scenegen_providers::{ProviderAdapter, ProviderRegistry};
use scenegen_report::{GenerationReport, OutstandingVideo, ReportError, ReportMeta, ReportStore};
use tracing::{info, warn};

use crate::error::WorkerResult;
use crate::lifecycle::{await_job, download_artifact, JobEnd, PollLimits};
use crate::logging::SceneLogger;
use crate::retry::RetryPolicy;

pub const DEFAULT_MAX_POLL: Duration = Duration::from_secs(3600);

/// What a query run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySummary {
    /// Outstanding jobs found in the report
    pub outstanding: usize,
    pub downloaded: usize,
    /// Clip was already on disk
    pub already_present: usize,
    pub failed: usize,
    /// Still running when the polling window closed, or no adapter to ask
    pub pending: usize,
}

enum Resumed {
    Downloaded(SceneResult),
    AlreadyPresent(SceneResult),
    Failed(SceneResult),
    Pending,
}

/// Polls a report's outstanding video jobs to completion.
///
/// Each job is polled through the provider recorded with its scene. Reports
/// that predate per-scene providers fall back to [`VideoQuery::with_fallback`].
pub struct VideoQuery {
    store: ReportStore,
    registry: ProviderRegistry,
    fallback: Option<VideoProvider>,
    policy: RetryPolicy,
    max_poll: Duration,
}

impl VideoQuery {
    pub fn new(store: ReportStore, registry: ProviderRegistry, policy: RetryPolicy) -> Self {
        Self {
            store,
            registry,
            fallback: None,
            policy,
            max_poll: DEFAULT_MAX_POLL,
        }
    }

    /// Provider for jobs whose scene did not record one.
    pub fn with_fallback(mut self, provider: VideoProvider) -> Self {
        self.fallback = Some(provider);
        self
    }

    pub fn with_max_poll(mut self, max_poll: Duration) -> Self {
        self.max_poll = max_poll;
        self
    }

    /// Load the report, resume every outstanding job and save the merge.
    pub async fn run(&self) -> WorkerResult<QuerySummary> {
        let report = self.store.load_report().await?.ok_or_else(|| {
            ReportError::not_found(self.store.report_path().display().to_string())
        })?;

        let outstanding = report.outstanding_videos();
        let mut summary = QuerySummary {
            outstanding: outstanding.len(),
            ..Default::default()
        };
        if outstanding.is_empty() {
            info!(dir = %self.store.dir().display(), "No outstanding video jobs");
            return Ok(summary);
        }

        info!(
            jobs = outstanding.len(),
            max_poll_secs = self.max_poll.as_secs(),
            "Resuming video jobs"
        );

        let resumed = join_all(outstanding.into_iter().map(|job| self.resume(&report, job))).await;

        let mut results = Vec::new();
        for outcome in resumed {
            match outcome {
                Resumed::Downloaded(result) => {
                    summary.downloaded += 1;
                    results.push(result);
                }
                Resumed::AlreadyPresent(result) => {
                    summary.already_present += 1;
                    results.push(result);
                }
                Resumed::Failed(result) => {
                    summary.failed += 1;
                    results.push(result);
                }
                Resumed::Pending => summary.pending += 1,
            }
        }

        if !results.is_empty() {
            let update = GenerationReport::from_results(meta_of(&report), results);
            self.store.save_run(&update, true).await?;
        }

        info!(
            downloaded = summary.downloaded,
            already_present = summary.already_present,
            failed = summary.failed,
            pending = summary.pending,
            "Video query finished"
        );
        Ok(summary)
    }

    /// Adapter for a job, by its recorded provider or the fallback.
    fn adapter_for(
        &self,
        job: &OutstandingVideo,
    ) -> Option<(VideoProvider, Arc<dyn ProviderAdapter>)> {
        let provider = job.provider.or(self.fallback)?;
        match self.registry.video(provider) {
            Ok(adapter) => Some((provider, adapter)),
            Err(e) => {
                warn!(
                    scene = %job.identity,
                    provider = %provider,
                    error = %e,
                    "Cannot resume video job"
                );
                None
            }
        }
    }

    async fn resume(&self, report: &GenerationReport, job: OutstandingVideo) -> Resumed {
        let logger = SceneLogger::new(&job.identity);
        let dest: PathBuf = self.store.dir().join(job.identity.video_file_name());
        let attempts = report
            .get(&job.identity.key())
            .map(|r| r.video_attempts)
            .unwrap_or(1)
            .max(1);

        let mut result = SceneResult::new(job.identity.clone());
        result.video_job_id = Some(job.job_id.clone());
        result.video_provider = job.provider;

        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            logger.log_completion("video already on disk");
            result.video_path = Some(dest);
            return Resumed::AlreadyPresent(result);
        }

        let Some((provider, video)) = self.adapter_for(&job) else {
            logger.log_warning(JobKind::Video, "no adapter for the job's provider");
            return Resumed::Pending;
        };
        result.video_provider = Some(provider);

        let limits = PollLimits {
            interval: self.policy.poll_interval,
            timeout: self.max_poll,
            max_unknown_polls: u32::MAX,
        };
        let mut provider_job = ProviderJob::new(job.job_id, JobKind::Video, video.name(), attempts);

        match await_job(video.as_ref(), &mut provider_job, limits, &logger).await {
            JobEnd::Succeeded(url) => {
                if download_artifact(video.as_ref(), &url, &dest, &self.policy).await {
                    logger.log_succeeded(JobKind::Video, &provider_job.job_id, attempts);
                    result.video_path = Some(dest);
                    Resumed::Downloaded(result)
                } else {
                    warn!(scene = %logger.scene(), url = %url, "Resumed video download failed");
                    result.failure = Some(FailureReason::VideoDownloadFailed { attempts });
                    Resumed::Failed(result)
                }
            }
            JobEnd::Failed(message) => {
                logger.log_failed(JobKind::Video, &provider_job.job_id, attempts, &message);
                result.failure = Some(FailureReason::VideoFailed { attempts, message });
                Resumed::Failed(result)
            }
            JobEnd::TimedOut | JobEnd::Unreachable => {
                logger.log_timed_out(JobKind::Video, &provider_job.job_id, attempts);
                Resumed::Pending
            }
        }
    }
}

fn meta_of(report: &GenerationReport) -> ReportMeta {
    ReportMeta {
        character_id: report.character_id.clone(),
        date: report.date.clone(),
        image_model: report.image_model.clone(),
        video_model: report.video_model.clone(),
        output_dir: report.output_dir.clone(),
    }
}
