//! Scene generation worker.
//!
//! This crate provides:
//! - The per-scene task lifecycle (image, then video)
//! - A bounded worker pool with a single result collector
//! - Resuming outstanding video jobs from a saved report
//! - INI/environment configuration

pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod query;
pub mod retry;

#[cfg(test)]
mod testing;

pub use commands::{execute_batch, plan_batch, BatchPlan, GenerateOptions};
pub use config::{AppConfig, ConfigError, GenerationSettings};
pub use error::{WorkerError, WorkerResult};
pub use executor::{BatchSettings, ProgressCallback, WorkerPool};
pub use lifecycle::{JobEnd, PollLimits, TaskController};
pub use logging::SceneLogger;
pub use query::{QuerySummary, VideoQuery};
pub use retry::RetryPolicy;
