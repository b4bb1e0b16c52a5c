//! Batch executor.
//!
//! Runs a batch of scene descriptors with bounded concurrency and collects
//! exactly one [`SceneResult`] per descriptor. Scene tasks send their result
//! over a channel; the receiving loop is the only owner of the result list.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use scenegen_models::{ImageProvider, SceneResult, SceneTaskDescriptor, VideoProvider};
use scenegen_providers::ProviderRegistry;
use scenegen_report::{GenerationReport, ReportMeta};
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

use crate::lifecycle::TaskController;
use crate::retry::RetryPolicy;

/// Called once per finished scene with `(result, finished, total)`.
pub type ProgressCallback = Arc<dyn Fn(&SceneResult, usize, usize) + Send + Sync>;

/// Batch-wide execution settings.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub max_workers: usize,
    pub output_dir: PathBuf,
    pub policy: RetryPolicy,
    pub default_image: ImageProvider,
    pub default_video: VideoProvider,
}

impl BatchSettings {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        default_image: ImageProvider,
        default_video: VideoProvider,
    ) -> Self {
        Self {
            max_workers: 4,
            output_dir: output_dir.into(),
            policy: RetryPolicy::default(),
            default_image,
            default_video,
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Worker count actually used; zero is treated as one.
    pub fn effective_workers(&self) -> usize {
        self.max_workers.max(1)
    }
}

/// Runs batches of scene tasks.
pub struct WorkerPool {
    registry: ProviderRegistry,
    settings: BatchSettings,
    progress: Option<ProgressCallback>,
}

impl WorkerPool {
    pub fn new(registry: ProviderRegistry, settings: BatchSettings) -> Self {
        Self {
            registry,
            settings,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    pub fn output_dir(&self) -> &Path {
        &self.settings.output_dir
    }

    /// Build the controller for one descriptor from its provider choices.
    pub fn controller_for(
        &self,
        descriptor: &SceneTaskDescriptor,
    ) -> Result<TaskController, String> {
        let image_provider = descriptor.image_provider.unwrap_or(self.settings.default_image);
        let image = self
            .registry
            .image(image_provider)
            .map_err(|e| e.to_string())?;

        let video_provider = descriptor
            .wants_video()
            .then(|| descriptor.video_provider.unwrap_or(self.settings.default_video));
        let video = video_provider
            .map(|provider| self.registry.video(provider))
            .transpose()
            .map_err(|e| e.to_string())?;

        let controller = TaskController::new(
            image,
            video,
            self.settings.policy.clone(),
            self.settings.output_dir.clone(),
        );
        Ok(match video_provider {
            Some(provider) => controller.with_video_provider(provider),
            None => controller,
        })
    }

    /// Run a batch and build its report.
    pub async fn run_batch(
        &self,
        meta: ReportMeta,
        descriptors: Vec<SceneTaskDescriptor>,
    ) -> GenerationReport {
        GenerationReport::from_results(meta, self.run_scenes(descriptors).await)
    }

    /// Run every descriptor and return one result each, in input order.
    ///
    /// A task that cannot start or that panics yields an aborted result.
    pub async fn run_scenes(&self, descriptors: Vec<SceneTaskDescriptor>) -> Vec<SceneResult> {
        let total = descriptors.len();
        if total == 0 {
            return Vec::new();
        }

        let workers = self.settings.effective_workers();
        info!(
            scenes = total,
            workers = workers,
            output_dir = %self.settings.output_dir.display(),
            "Starting batch"
        );

        if let Err(e) = tokio::fs::create_dir_all(&self.settings.output_dir).await {
            error!(error = %e, "Failed to create output directory");
            let message = format!("output directory unavailable: {}", e);
            return descriptors
                .into_iter()
                .map(|d| SceneResult::aborted(d.identity, message.clone()))
                .collect();
        }

        let semaphore = Arc::new(Semaphore::new(workers));
        let (tx, mut rx) = mpsc::channel::<(usize, SceneResult)>(total);

        for (index, descriptor) in descriptors.into_iter().enumerate() {
            let controller = match self.controller_for(&descriptor) {
                Ok(controller) => controller,
                Err(message) => {
                    warn!(scene = %descriptor.scene_name(), "Cannot start scene: {}", message);
                    let result = SceneResult::aborted(descriptor.identity, message);
                    tx.send((index, result)).await.ok();
                    continue;
                }
            };

            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = AssertUnwindSafe(controller.run(&descriptor)).catch_unwind().await;
                let result = match outcome {
                    Ok(result) => result,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        let scene = descriptor.scene_name();
                        error!(scene = %scene, "Scene task panicked: {}", message);
                        let message = format!("task aborted: {}", message);
                        SceneResult::aborted(descriptor.identity, message)
                    }
                };
                tx.send((index, result)).await.ok();
            });
        }
        drop(tx);

        let mut slots: Vec<Option<SceneResult>> = (0..total).map(|_| None).collect();
        let mut finished = 0usize;

        while let Some((index, result)) = rx.recv().await {
            finished += 1;
            if let Some(progress) = &self.progress {
                progress(&result, finished, total);
            }
            slots[index] = Some(result);
        }

        let results: Vec<SceneResult> = slots.into_iter().flatten().collect();
        let failed = results.iter().filter(|r| r.is_failed()).count();
        info!(scenes = results.len(), failed = failed, "Batch finished");
        results
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
