//! The uniform provider contract.
//!
//! Every provider implements [`ProviderAdapter`]. Nothing crosses the
//! boundary as an error: a failed submission is `None`, a failed query is
//! [`PollStatus::Unknown`] and a failed download is `false`.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use scenegen_models::{JobKind, TaskState};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Image submission parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub reference_image_urls: Vec<String>,
    pub aspect_ratio: Option<String>,
    pub size: Option<String>,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

/// Video submission parameters. The reference image is mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VideoRequest {
    pub prompt: String,
    pub reference_image_url: String,
    pub aspect_ratio: Option<String>,
    pub duration: Option<String>,
    pub size: Option<String>,
}

impl VideoRequest {
    pub fn new(prompt: impl Into<String>, reference_image_url: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            reference_image_url: reference_image_url.into(),
            ..Default::default()
        }
    }
}

/// Normalized provider job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
    /// The query itself failed; says nothing about the job
    Unknown,
}

impl PollStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollStatus::Queued => "queued",
            PollStatus::Processing => "processing",
            PollStatus::Succeeded => "succeeded",
            PollStatus::Failed => "failed",
            PollStatus::Unknown => "unknown",
        }
    }

    /// Task state this status implies, if any.
    pub fn task_state(&self) -> Option<TaskState> {
        match self {
            PollStatus::Queued => Some(TaskState::Queued),
            PollStatus::Processing => Some(TaskState::Processing),
            PollStatus::Succeeded => Some(TaskState::Succeeded),
            PollStatus::Failed => Some(TaskState::Failed),
            PollStatus::Unknown => None,
        }
    }
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOutcome {
    pub status: PollStatus,
    pub artifact_url: Option<String>,
    pub error: Option<String>,
}

impl PollOutcome {
    fn with_status(status: PollStatus) -> Self {
        Self {
            status,
            artifact_url: None,
            error: None,
        }
    }

    pub fn queued() -> Self {
        Self::with_status(PollStatus::Queued)
    }

    pub fn processing() -> Self {
        Self::with_status(PollStatus::Processing)
    }

    pub fn unknown(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::with_status(PollStatus::Unknown)
        }
    }

    pub fn succeeded(artifact_url: Option<String>) -> Self {
        Self {
            artifact_url,
            ..Self::with_status(PollStatus::Succeeded)
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::with_status(PollStatus::Failed)
        }
    }
}

/// Uniform submit/poll/download contract for one external provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name used in logs and metrics.
    fn name(&self) -> &str;

    /// Submit an image job. Never retries internally.
    async fn submit_image(&self, request: &ImageRequest) -> Option<String> {
        warn!(
            provider = self.name(),
            "Image generation not supported (prompt {} chars)",
            request.prompt.len()
        );
        None
    }

    /// Submit a video job from a reference image. Never retries internally.
    async fn submit_video(&self, request: &VideoRequest) -> Option<String> {
        warn!(
            provider = self.name(),
            "Video generation not supported (reference {})",
            request.reference_image_url
        );
        None
    }

    /// Query a job once.
    async fn poll(&self, job_id: &str, kind: JobKind) -> PollOutcome;

    /// Stream an artifact to `dest`, replacing it only on complete success.
    async fn download(&self, url: &str, dest: &Path) -> bool;
}
