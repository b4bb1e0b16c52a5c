//! Result aggregation for scene generation runs.
//!
//! - [`GenerationReport`]: per-event, per-scene outcomes with a summary
//! - [`InteractiveIndex`]: the same outcomes re-keyed for playback
//! - [`ReportStore`]: atomic persistence with merge for partial runs

pub mod error;
pub mod interactive;
pub mod merge;
pub mod report;
pub mod store;

pub use error::{ReportError, ReportResult};
pub use interactive::{
    BranchEntry, ChoiceEntry, EventFormat, InteractiveEvent, InteractiveIndex, PhaseEntry,
    ResolutionEntry,
};
pub use merge::merge;
pub use report::{
    BucketSummary, EventRecord, GenerationReport, OutstandingVideo, ReportMeta, ReportSummary,
    SceneRecord, TotalSummary,
};
pub use store::{write_json_atomic, ReportStore, INTERACTIVE_FILE, REPORT_FILE};
