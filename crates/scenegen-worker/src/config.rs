//! Worker configuration.
//!
//! Settings come from an INI file overlaid by `SCENEGEN_`-prefixed
//! environment variables (`SCENEGEN_SORA2__KEY` sets `[sora2] key`).
//! Provider sections are only read for providers a batch actually uses, and
//! every missing key is reported in a single error.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use scenegen_models::{ImageProvider, VideoProvider};
use scenegen_providers::{
    KlingConfig, NanoBananaConfig, ProviderSettings, SeedreamConfig, Sora2Config,
};
use thiserror::Error;

use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "config.ini";
pub const ENV_PREFIX: &str = "SCENEGEN";

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Missing configuration keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// `[video_generation]` settings.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub default_image_model: ImageProvider,
    pub default_video_model: VideoProvider,
    /// Concurrent scene tasks
    pub max_workers: usize,
    /// Base directory for batch output when no directory is given
    pub output_root: Option<PathBuf>,
    pub retry: RetryPolicy,
}

/// Loaded configuration sources.
#[derive(Debug, Clone)]
pub struct AppConfig {
    source: Config,
}

impl AppConfig {
    /// Load `path` and the environment overlay.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        Self::from_builder(
            Config::builder()
                .add_source(File::new(&path.to_string_lossy(), FileFormat::Ini).required(true))
                .add_source(env_source()),
        )
    }

    /// Parse INI text without any environment overlay.
    pub fn from_ini_str(text: &str) -> ConfigResult<Self> {
        let source = Config::builder()
            .add_source(File::from_str(text, FileFormat::Ini))
            .build()?;
        Ok(Self { source })
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> ConfigResult<Self> {
        Ok(Self {
            source: builder.build()?,
        })
    }

    fn reader(&self) -> KeyReader<'_> {
        KeyReader {
            source: &self.source,
            missing: Vec::new(),
        }
    }

    /// Read `[video_generation]`.
    pub fn generation(&self) -> ConfigResult<GenerationSettings> {
        let mut keys = self.reader();
        let section = "video_generation";

        let image_model = keys.required(section, "default_image_model");
        let video_model = keys.required(section, "default_video_model");
        let max_workers = keys.required(section, "max_workers");
        let poll_interval = keys.required(section, "poll_interval");
        keys.finish()?;

        let default_image_model = image_model
            .unwrap_or_default()
            .parse::<ImageProvider>()
            .map_err(|e| {
                ConfigError::invalid("video_generation.default_image_model", e.to_string())
            })?;
        let default_video_model = video_model
            .unwrap_or_default()
            .parse::<VideoProvider>()
            .map_err(|e| {
                ConfigError::invalid("video_generation.default_video_model", e.to_string())
            })?;
        let max_workers = parse_number::<usize>(
            "video_generation.max_workers",
            &max_workers.unwrap_or_default(),
        )?;
        let poll_interval = parse_number::<u64>(
            "video_generation.poll_interval",
            &poll_interval.unwrap_or_default(),
        )?;
        if poll_interval == 0 {
            return Err(ConfigError::invalid(
                "video_generation.poll_interval",
                "must be at least 1 second",
            ));
        }

        let mut retry =
            RetryPolicy::default().with_poll_interval(Duration::from_secs(poll_interval));
        if let Some(secs) = self.optional_number::<u64>(section, "image_timeout_seconds")? {
            retry.image_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.optional_number::<u64>(section, "video_timeout_seconds")? {
            retry.video_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = self.optional_number::<u32>(section, "max_retry_on_timeout")? {
            retry.max_retry_on_timeout = retries;
        }
        if let Some(enabled) = self.optional_bool(section, "timeout_retry_enabled")? {
            retry.timeout_retry_enabled = enabled;
        }
        if let Some(max) = self.optional_number::<u32>(section, "max_image_attempts")? {
            // 0 keeps image submission unbounded
            retry.max_image_attempts = (max > 0).then_some(max);
        }

        Ok(GenerationSettings {
            default_image_model,
            default_video_model,
            max_workers,
            output_root: self.optional(section, "output_root").map(PathBuf::from),
            retry,
        })
    }

    /// Read the sections of the providers in use.
    pub fn provider_settings(
        &self,
        images: &HashSet<ImageProvider>,
        videos: &HashSet<VideoProvider>,
    ) -> ConfigResult<ProviderSettings> {
        let mut keys = self.reader();
        let mut settings = ProviderSettings::default();

        if images.contains(&ImageProvider::NanoBanana) {
            let url = keys.required("nano_banana", "url");
            let query_url = keys.required("nano_banana", "query_url");
            let key = keys.required("nano_banana", "key");
            if let (Some(url), Some(query_url), Some(key)) = (url, query_url, key) {
                let mut config = NanoBananaConfig::new(url, query_url, key);
                if let Some(v) = self.optional("nano_banana", "aspect_ratio") {
                    config.aspect_ratio = v;
                }
                if let Some(v) = self.optional("nano_banana", "image_size") {
                    config.image_size = v;
                }
                settings.nano_banana = Some(config);
            }
        }

        if images.contains(&ImageProvider::Seedream) {
            let url = keys.required("seedream", "url");
            let key = keys.required("seedream", "key");
            if let (Some(url), Some(key)) = (url, key) {
                let mut config = SeedreamConfig::new(url, key);
                if let Some(v) = self.optional("seedream", "model") {
                    config.model = v;
                }
                if let Some(v) = self.optional("seedream", "size") {
                    config.size = v;
                }
                if let Some(v) = self.optional("seedream", "sequential_generation") {
                    config.sequential_image_generation = v;
                }
                if let Some(v) = self.optional_bool("seedream", "watermark")? {
                    config.watermark = v;
                }
                settings.seedream = Some(config);
            }
        }

        if videos.contains(&VideoProvider::Sora2) {
            let url = keys.required("sora2", "url");
            let key = keys.required("sora2", "key");
            if let (Some(url), Some(key)) = (url, key) {
                let mut config = Sora2Config::new(url, key);
                if let Some(v) = self.optional("sora2", "query_urls") {
                    config = config.with_query_urls(split_list(&v));
                }
                if let Some(v) = self.optional("sora2", "aspect_ratio") {
                    config.aspect_ratio = v;
                }
                if let Some(v) = self.optional("sora2", "duration") {
                    config.duration = v;
                }
                if let Some(v) = self.optional("sora2", "size") {
                    config.size = v;
                }
                settings.sora2 = Some(config);
            }
        }

        if videos.contains(&VideoProvider::Kling) {
            let url = keys.required("kling", "url");
            let key = keys.required("kling", "key");
            if let (Some(url), Some(key)) = (url, key) {
                let mut config = KlingConfig::new(url, key);
                if let Some(v) = self.optional("kling", "model") {
                    config.model_name = v;
                }
                if let Some(v) = self.optional("kling", "mode") {
                    config.mode = v;
                }
                if let Some(v) = self.optional("kling", "duration") {
                    config.duration = v;
                }
                if let Some(v) = self.optional_number::<f64>("kling", "cfg_scale")? {
                    config.cfg_scale = v;
                }
                if let Some(v) = self.optional("kling", "sound") {
                    config.sound = v;
                }
                settings.kling = Some(config);
            }
        }

        keys.finish()?;
        Ok(settings)
    }

    fn optional(&self, section: &str, key: &str) -> Option<String> {
        lookup(&self.source, section, key)
    }

    fn optional_number<T>(&self, section: &str, key: &str) -> ConfigResult<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(section, key)
            .map(|v| parse_number(&format!("{}.{}", section, key), &v))
            .transpose()
    }

    fn optional_bool(&self, section: &str, key: &str) -> ConfigResult<Option<bool>> {
        self.optional(section, key)
            .map(|v| match v.to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(ConfigError::invalid(
                    format!("{}.{}", section, key),
                    format!("expected a boolean, got {:?}", v),
                )),
            })
            .transpose()
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

/// Non-empty value of `section.key`.
fn lookup(source: &Config, section: &str, key: &str) -> Option<String> {
    source
        .get_string(&format!("{}.{}", section, key))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<T>(key: &str, value: &str) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::invalid(key, format!("{} ({:?})", e, value)))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Collects missing required keys across sections.
struct KeyReader<'a> {
    source: &'a Config,
    missing: Vec<String>,
}

impl KeyReader<'_> {
    fn required(&mut self, section: &str, key: &str) -> Option<String> {
        let value = lookup(self.source, section, key);
        if value.is_none() {
            self.missing.push(format!("{}.{}", section, key));
        }
        value
    }

    fn finish(self) -> ConfigResult<()> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingKeys(self.missing))
        }
    }
}
