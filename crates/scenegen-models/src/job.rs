//! Provider job definitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage a provider job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Image,
    Video,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Image => "image",
            JobKind::Video => "video",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single provider job attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Submission in flight
    #[default]
    Submitting,
    /// Accepted, waiting in the provider's queue
    Queued,
    /// Being rendered
    Processing,
    /// Artifact available
    Succeeded,
    /// Provider reported failure, or retries exhausted
    Failed,
    /// No terminal status within the attempt window
    TimedOut,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Submitting => "submitting",
            TaskState::Queued => "queued",
            TaskState::Processing => "processing",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::TimedOut => "timed_out",
        }
    }

    /// Terminal for the current attempt. `TimedOut` is not: it leads to a
    /// fresh attempt or to `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One in-flight unit of work at a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProviderJob {
    /// Provider-assigned job id
    pub job_id: String,

    pub kind: JobKind,

    /// Provider name
    pub provider: String,

    pub started_at: DateTime<Utc>,

    /// 1-based attempt number within the stage
    pub attempt: u32,

    #[serde(default)]
    pub state: TaskState,
}

impl ProviderJob {
    pub fn new(
        job_id: impl Into<String>,
        kind: JobKind,
        provider: impl Into<String>,
        attempt: u32,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            kind,
            provider: provider.into(),
            started_at: Utc::now(),
            attempt,
            state: TaskState::Queued,
        }
    }

    /// Record a state transition. Returns `true` if the state changed.
    pub fn transition(&mut self, state: TaskState) -> bool {
        if self.state == state {
            return false;
        }
        self.state = state;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::TimedOut.is_terminal());
        assert!(!TaskState::Processing.is_terminal());
    }

    #[test]
    fn test_job_transition() {
        let mut job = ProviderJob::new("abc", JobKind::Video, "sora2", 1);
        assert_eq!(job.state, TaskState::Queued);
        assert!(!job.transition(TaskState::Queued));
        assert!(job.transition(TaskState::Processing));
        assert_eq!(job.state.as_str(), "processing");
    }
}
