//! Scripted in-memory provider for batch scenarios.
//!
//! Prompts carry the scene marker (`img:<scene>` / `vid:<scene>`); each
//! scene's behaviour is looked up by that marker. Every call is appended to
//! a shared log so tests can assert on ordering.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scenegen_models::{EventType, JobKind, SceneIdentity, SceneTaskDescriptor};
use scenegen_providers::{
    download_to_file, part_path, ImageRequest, PollOutcome, ProviderAdapter, VideoRequest,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SubmitImage { scene: String, job_id: String },
    SubmitVideo { scene: String, image_url: String },
    Poll { job_id: String },
    Download { url: String, dest: PathBuf, ok: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageScript {
    #[default]
    Succeed,
    /// First job fails at the provider, later ones succeed
    FailOnce,
    /// Submissions are rejected this many times before being accepted
    RejectSubmissions(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoScript {
    #[default]
    Succeed,
    /// Status stays `processing` forever
    NeverFinish,
    FailOnce,
    /// Every artifact download fails
    BrokenDownload,
}

#[derive(Debug, Clone)]
struct Job {
    scene: String,
    kind: JobKind,
    submission: u32,
    polls: u32,
}

/// In-memory provider serving both stages.
#[derive(Default)]
pub struct ScriptedProvider {
    images: HashMap<String, ImageScript>,
    videos: HashMap<String, VideoScript>,
    jobs: Mutex<HashMap<String, Job>>,
    submissions: Mutex<HashMap<(String, JobKind), u32>>,
    next_id: AtomicU32,
    log: Arc<Mutex<Vec<Call>>>,
    artifact_base: String,
    http: Option<(reqwest::Client, Duration)>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            artifact_base: "https://cdn.test".to_string(),
            ..Default::default()
        }
    }

    pub fn image(mut self, scene: &str, script: ImageScript) -> Self {
        self.images.insert(scene.to_string(), script);
        self
    }

    pub fn video(mut self, scene: &str, script: VideoScript) -> Self {
        self.videos.insert(scene.to_string(), script);
        self
    }

    /// Serve artifacts over HTTP from `base` instead of writing them locally.
    pub fn downloads_from(mut self, base: &str) -> Self {
        self.artifact_base = base.trim_end_matches('/').to_string();
        self.http = Some((reqwest::Client::new(), Duration::from_secs(5)));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }

    fn submit(&self, scene: &str, kind: JobKind) -> (String, u32) {
        let submission = {
            let mut submissions = self.submissions.lock().unwrap();
            let count = submissions.entry((scene.to_string(), kind)).or_insert(0);
            *count += 1;
            *count
        };
        let job_id = format!(
            "{}-{}",
            kind.as_str(),
            self.next_id.fetch_add(1, Ordering::SeqCst) + 1
        );
        self.jobs.lock().unwrap().insert(
            job_id.clone(),
            Job {
                scene: scene.to_string(),
                kind,
                submission,
                polls: 0,
            },
        );
        (job_id, submission)
    }

    pub fn submissions(&self, scene: &str, kind: JobKind) -> u32 {
        self.submissions
            .lock()
            .unwrap()
            .get(&(scene.to_string(), kind))
            .copied()
            .unwrap_or(0)
    }

    fn artifact_url(&self, job_id: &str, kind: JobKind) -> String {
        match kind {
            JobKind::Image => format!("{}/img/{}.png", self.artifact_base, job_id),
            JobKind::Video => format!("{}/vid/{}.mp4", self.artifact_base, job_id),
        }
    }
}

fn marker(prompt: &str) -> String {
    prompt
        .split_once(':')
        .map(|(_, scene)| scene.to_string())
        .unwrap_or_else(|| prompt.to_string())
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn submit_image(&self, request: &ImageRequest) -> Option<String> {
        let scene = marker(&request.prompt);
        let script = self.images.get(&scene).copied().unwrap_or_default();
        if let ImageScript::RejectSubmissions(n) = script {
            let rejected = self.submissions(&scene, JobKind::Image);
            if rejected < n {
                self.submissions
                    .lock()
                    .unwrap()
                    .insert((scene.clone(), JobKind::Image), rejected + 1);
                return None;
            }
        }
        let (job_id, _) = self.submit(&scene, JobKind::Image);
        self.record(Call::SubmitImage {
            scene,
            job_id: job_id.clone(),
        });
        Some(job_id)
    }

    async fn submit_video(&self, request: &VideoRequest) -> Option<String> {
        let scene = marker(&request.prompt);
        self.record(Call::SubmitVideo {
            scene: scene.clone(),
            image_url: request.reference_image_url.clone(),
        });
        let (job_id, _) = self.submit(&scene, JobKind::Video);
        Some(job_id)
    }

    async fn poll(&self, job_id: &str, _kind: JobKind) -> PollOutcome {
        self.record(Call::Poll {
            job_id: job_id.to_string(),
        });

        let job = {
            let mut jobs = self.jobs.lock().unwrap();
            let Some(job) = jobs.get_mut(job_id) else {
                return PollOutcome::unknown("no such job");
            };
            job.polls += 1;
            job.clone()
        };

        // Every job reports `processing` once before anything else.
        if job.polls == 1 {
            return PollOutcome::processing();
        }

        let url = Some(self.artifact_url(job_id, job.kind));
        match job.kind {
            JobKind::Image => match self.images.get(&job.scene).copied().unwrap_or_default() {
                ImageScript::FailOnce if job.submission == 1 => {
                    PollOutcome::failed("safety filter")
                }
                _ => PollOutcome::succeeded(url),
            },
            JobKind::Video => match self.videos.get(&job.scene).copied().unwrap_or_default() {
                VideoScript::NeverFinish => PollOutcome::processing(),
                VideoScript::FailOnce if job.submission == 1 => PollOutcome::failed("render error"),
                _ => PollOutcome::succeeded(url),
            },
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> bool {
        let ok = match &self.http {
            Some((client, timeout)) => download_to_file(client, url, dest, *timeout).await.is_ok(),
            None => {
                let broken = self
                    .videos
                    .iter()
                    .any(|(scene, script)| {
                        *script == VideoScript::BrokenDownload && dest_matches(dest, scene)
                    });
                if broken {
                    false
                } else {
                    let tmp = part_path(dest);
                    tokio::fs::write(&tmp, url.as_bytes()).await.is_ok()
                        && tokio::fs::rename(&tmp, dest).await.is_ok()
                }
            }
        };
        self.record(Call::Download {
            url: url.to_string(),
            dest: dest.to_path_buf(),
            ok,
        });
        ok
    }
}

fn dest_matches(dest: &Path, scene: &str) -> bool {
    dest.extension().map_or(false, |e| e == "mp4")
        && dest
            .file_name()
            .map_or(false, |n| n.to_string_lossy().ends_with(&format!("{}.mp4", scene)))
}

/// Two-hour slot starting at 06:00 for scene 1, 08:00 for scene 2, ...
pub fn time_slot(index: u32) -> String {
    let start = 4 + 2 * index;
    format!("{:02}:00-{:02}:00", start, start + 2)
}

/// Scene `index` in its own time slot, labelled with its marker.
pub fn scene(index: u32, marker: &str, video: bool) -> SceneTaskDescriptor {
    let identity = SceneIdentity::new(time_slot(index), EventType::N, index, 1).with_label(marker);
    let descriptor = SceneTaskDescriptor::new(identity, format!("img:{}", marker));
    if video {
        descriptor.with_video_prompt(format!("vid:{}", marker))
    } else {
        descriptor
    }
}
