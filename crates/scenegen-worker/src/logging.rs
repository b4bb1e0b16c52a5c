//! Structured scene logging.

use scenegen_models::{JobKind, SceneIdentity};
use tracing::{error, info, warn, Span};

/// Logger carrying a scene's name on every event.
#[derive(Debug, Clone)]
pub struct SceneLogger {
    scene: String,
}

impl SceneLogger {
    pub fn new(identity: &SceneIdentity) -> Self {
        Self {
            scene: identity.scene_name(),
        }
    }

    pub fn scene(&self) -> &str {
        &self.scene
    }

    pub fn log_start(&self, wants_video: bool) {
        info!(scene = %self.scene, video = wants_video, "Scene started");
    }

    pub fn log_submitted(&self, stage: JobKind, job_id: &str, attempt: u32) {
        info!(
            scene = %self.scene,
            stage = %stage,
            job_id = %job_id,
            attempt = attempt,
            "Job submitted"
        );
    }

    pub fn log_submit_failed(&self, stage: JobKind, attempt: u32) {
        warn!(
            scene = %self.scene,
            stage = %stage,
            attempt = attempt,
            "Submission failed"
        );
    }

    pub fn log_polling(&self, stage: JobKind, job_id: &str, status: &str) {
        tracing::debug!(
            scene = %self.scene,
            stage = %stage,
            job_id = %job_id,
            status = status,
            "Polling"
        );
    }

    pub fn log_warning(&self, stage: JobKind, message: &str) {
        warn!(scene = %self.scene, stage = %stage, "{}", message);
    }

    pub fn log_failed(&self, stage: JobKind, job_id: &str, attempt: u32, message: &str) {
        warn!(
            scene = %self.scene,
            stage = %stage,
            job_id = %job_id,
            attempt = attempt,
            "Job failed: {}", message
        );
    }

    pub fn log_timed_out(&self, stage: JobKind, job_id: &str, attempt: u32) {
        warn!(
            scene = %self.scene,
            stage = %stage,
            job_id = %job_id,
            attempt = attempt,
            "Job timed out"
        );
    }

    pub fn log_succeeded(&self, stage: JobKind, job_id: &str, attempt: u32) {
        info!(
            scene = %self.scene,
            stage = %stage,
            job_id = %job_id,
            attempt = attempt,
            "Job succeeded"
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(scene = %self.scene, "Scene error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(scene = %self.scene, "Scene completed: {}", message);
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!("scene", scene = %self.scene)
    }
}
