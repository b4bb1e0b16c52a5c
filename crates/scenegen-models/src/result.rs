//! Per-scene results.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::descriptor::VideoProvider;
use crate::identity::SceneIdentity;
use crate::job::JobKind;

/// Why a stage ended without an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Every video attempt hit the polling window
    VideoTimedOut { attempts: u32 },
    /// The provider reported failure on the last attempt
    VideoFailed { attempts: u32, message: String },
    /// The last attempt could not be submitted
    VideoSubmitFailed { attempts: u32 },
    /// The last attempt's status could not be read
    VideoStatusUnavailable { attempts: u32 },
    /// The last attempt rendered but could not be downloaded
    VideoDownloadFailed { attempts: u32 },
    /// A stage's attempt ceiling was reached
    ProviderUnavailable { stage: JobKind, attempts: u32 },
    /// The task ended abnormally
    Aborted { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::VideoTimedOut { attempts } => {
                write!(f, "video timed out after {} attempt(s)", attempts)
            }
            FailureReason::VideoFailed { attempts, message } => {
                write!(f, "video failed after {} attempt(s): {}", attempts, message)
            }
            FailureReason::VideoSubmitFailed { attempts } => {
                write!(f, "video submission failed after {} attempt(s)", attempts)
            }
            FailureReason::VideoStatusUnavailable { attempts } => {
                write!(f, "video status unavailable after {} attempt(s)", attempts)
            }
            FailureReason::VideoDownloadFailed { attempts } => {
                write!(f, "video download failed after {} attempt(s)", attempts)
            }
            FailureReason::ProviderUnavailable { stage, attempts } => {
                write!(f, "{} provider unavailable after {} attempt(s)", stage, attempts)
            }
            FailureReason::Aborted { message } => write!(f, "aborted: {}", message),
        }
    }
}

/// Terminal outcome of one scene task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SceneResult {
    pub identity: SceneIdentity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_path: Option<PathBuf>,

    /// Remote URL of the reference image used for the video stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_job_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_job_id: Option<String>,

    /// Backend the video job was submitted to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_provider: Option<VideoProvider>,

    #[serde(default)]
    pub image_attempts: u32,

    #[serde(default)]
    pub video_attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,

    pub completed_at: DateTime<Utc>,
}

impl SceneResult {
    /// Empty result for a scene; stage outcomes are filled in by the caller.
    pub fn new(identity: SceneIdentity) -> Self {
        Self {
            identity,
            image_path: None,
            video_path: None,
            image_url: None,
            image_job_id: None,
            video_job_id: None,
            video_provider: None,
            image_attempts: 0,
            video_attempts: 0,
            failure: None,
            completed_at: Utc::now(),
        }
    }

    /// Result for a task that ended without running to completion.
    pub fn aborted(identity: SceneIdentity, message: impl Into<String>) -> Self {
        Self {
            failure: Some(FailureReason::Aborted {
                message: message.into(),
            }),
            ..Self::new(identity)
        }
    }

    pub fn has_image(&self) -> bool {
        self.image_path.is_some()
    }

    pub fn has_video(&self) -> bool {
        self.video_path.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::EventType;

    #[test]
    fn test_failure_reason_display() {
        let reason = FailureReason::VideoTimedOut { attempts: 4 };
        assert_eq!(reason.to_string(), "video timed out after 4 attempt(s)");

        let reason = FailureReason::ProviderUnavailable {
            stage: JobKind::Image,
            attempts: 100,
        };
        assert_eq!(reason.to_string(), "image provider unavailable after 100 attempt(s)");
    }

    #[test]
    fn test_failure_reason_serde() {
        let reason = FailureReason::VideoFailed {
            attempts: 2,
            message: "content policy".to_string(),
        };
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["kind"], "video_failed");
        assert_eq!(json["attempts"], 2);
    }

    #[test]
    fn test_aborted_result() {
        let identity = SceneIdentity::new("08:00", EventType::N, 1, 1);
        let result = SceneResult::aborted(identity, "task panicked");
        assert!(result.is_failed());
        assert!(!result.has_image());
        assert!(!result.has_video());
    }
}
