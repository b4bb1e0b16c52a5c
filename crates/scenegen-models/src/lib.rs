//! Shared data models for the scene generation pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Scene identities and narrative roles
//! - Scene task descriptors and batch manifests
//! - Provider jobs and task states
//! - Per-scene results and failure reasons

pub mod descriptor;
pub mod error;
pub mod identity;
pub mod job;
pub mod result;

// Re-export common types
pub use descriptor::{
    BatchManifest, ImageProvider, RenderParams, SceneTaskDescriptor, VideoProvider,
};
pub use error::{ModelError, ModelResult};
pub use identity::{sanitize_label, EventKey, EventType, SceneIdentity, SceneKey, SceneRole};
pub use job::{JobKind, ProviderJob, TaskState};
pub use result::{FailureReason, SceneResult};
