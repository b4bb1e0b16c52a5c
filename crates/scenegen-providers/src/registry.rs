//! Provider lookup by model enum.

use std::collections::HashMap;
use std::sync::Arc;

use scenegen_models::{ImageProvider, VideoProvider};
use tracing::info;
use url::Url;

use crate::adapter::ProviderAdapter;
use crate::error::{ProviderError, ProviderResult};
use crate::http::HttpTimeouts;
use crate::kling::{KlingAdapter, KlingConfig};
use crate::nano_banana::{NanoBananaAdapter, NanoBananaConfig};
use crate::seedream::{SeedreamAdapter, SeedreamConfig};
use crate::sora2::{Sora2Adapter, Sora2Config};

/// Per-provider settings. A `None` provider is simply not registered.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub nano_banana: Option<NanoBananaConfig>,
    pub seedream: Option<SeedreamConfig>,
    pub sora2: Option<Sora2Config>,
    pub kling: Option<KlingConfig>,
    pub timeouts: HttpTimeouts,
}

fn check_url(provider: &str, field: &str, value: &str) -> ProviderResult<()> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| {
            ProviderError::config_error(format!(
                "{}.{} is not a valid URL ({}): {}",
                provider, field, e, value
            ))
        })
}

/// Adapters keyed by the model enums scene descriptors refer to.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    images: HashMap<ImageProvider, Arc<dyn ProviderAdapter>>,
    videos: HashMap<VideoProvider, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every configured provider.
    pub fn from_settings(settings: &ProviderSettings) -> ProviderResult<Self> {
        let mut registry = Self::new();
        let timeouts = settings.timeouts;

        if let Some(config) = &settings.nano_banana {
            check_url("nano_banana", "url", &config.url)?;
            check_url("nano_banana", "query_url", &config.query_url)?;
            registry.register_image(
                ImageProvider::NanoBanana,
                Arc::new(NanoBananaAdapter::new(config.clone(), timeouts)?),
            );
        }

        if let Some(config) = &settings.seedream {
            check_url("seedream", "url", &config.url)?;
            registry.register_image(
                ImageProvider::Seedream,
                Arc::new(SeedreamAdapter::new(config.clone(), timeouts)?),
            );
        }

        if let Some(config) = &settings.sora2 {
            check_url("sora2", "url", &config.url)?;
            for query_url in &config.query_urls {
                check_url("sora2", "query_urls", query_url)?;
            }
            registry.register_video(
                VideoProvider::Sora2,
                Arc::new(Sora2Adapter::new(config.clone(), timeouts)?),
            );
        }

        if let Some(config) = &settings.kling {
            check_url("kling", "url", &config.url)?;
            registry.register_video(
                VideoProvider::Kling,
                Arc::new(KlingAdapter::new(config.clone(), timeouts)?),
            );
        }

        info!(
            images = registry.images.len(),
            videos = registry.videos.len(),
            "Provider registry ready"
        );

        Ok(registry)
    }

    pub fn register_image(&mut self, provider: ImageProvider, adapter: Arc<dyn ProviderAdapter>) {
        self.images.insert(provider, adapter);
    }

    pub fn register_video(&mut self, provider: VideoProvider, adapter: Arc<dyn ProviderAdapter>) {
        self.videos.insert(provider, adapter);
    }

    pub fn with_image(
        mut self,
        provider: ImageProvider,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> Self {
        self.register_image(provider, adapter);
        self
    }

    pub fn with_video(
        mut self,
        provider: VideoProvider,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> Self {
        self.register_video(provider, adapter);
        self
    }

    pub fn image(&self, provider: ImageProvider) -> ProviderResult<Arc<dyn ProviderAdapter>> {
        self.images.get(&provider).cloned().ok_or_else(|| {
            ProviderError::config_error(format!(
                "image provider {} is not configured",
                provider.as_str()
            ))
        })
    }

    pub fn video(&self, provider: VideoProvider) -> ProviderResult<Arc<dyn ProviderAdapter>> {
        self.videos.get(&provider).cloned().ok_or_else(|| {
            ProviderError::config_error(format!(
                "video provider {} is not configured",
                provider.as_str()
            ))
        })
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("images", &self.images.keys().collect::<Vec<_>>())
            .field("videos", &self.videos.keys().collect::<Vec<_>>())
            .finish()
    }
}
