//! Image and video generation provider adapters.
//!
//! Each external service is wrapped in a [`ProviderAdapter`] exposing the
//! same submit / poll / download contract:
//! - [`nano_banana`] and [`seedream`] produce keyframe images
//! - [`sora2`] and [`kling`] animate a keyframe into a clip
//!
//! [`ProviderRegistry`] maps the model enums used by scene descriptors to
//! configured adapters.

pub mod adapter;
pub mod error;
pub mod http;
pub mod kling;
pub mod metrics;
pub mod nano_banana;
pub mod registry;
pub mod seedream;
pub mod sora2;

pub use adapter::{ImageRequest, PollOutcome, PollStatus, ProviderAdapter, VideoRequest};
pub use error::{ProviderError, ProviderResult};
pub use http::{download_to_file, part_path, HttpTimeouts, HttpTransport};
pub use kling::{KlingAdapter, KlingConfig};
pub use nano_banana::{NanoBananaAdapter, NanoBananaConfig};
pub use registry::{ProviderRegistry, ProviderSettings};
pub use seedream::{SeedreamAdapter, SeedreamConfig};
pub use sora2::{Sora2Adapter, Sora2Config};
