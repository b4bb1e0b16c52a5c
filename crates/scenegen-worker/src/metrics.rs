//! Scene-level metrics.

use metrics::{counter, histogram};

pub mod names {
    /// Finished scenes by outcome (`complete`, `image_only`, `failed`).
    pub const SCENES_TOTAL: &str = "scene_outcomes_total";

    /// Resubmissions by stage.
    pub const RETRIES_TOTAL: &str = "scene_retries_total";

    /// Wall-clock duration of one scene task.
    pub const DURATION_SECONDS: &str = "scene_duration_seconds";
}

pub fn record_scene(outcome: &'static str, duration_secs: f64) {
    counter!(names::SCENES_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::DURATION_SECONDS, "outcome" => outcome).record(duration_secs);
}

pub fn record_retry(stage: &'static str) {
    counter!(names::RETRIES_TOTAL, "stage" => stage).increment(1);
}
