//! Scene task descriptors and batch manifests.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use validator::Validate;

use crate::error::{ModelError, ModelResult};
use crate::identity::{EventType, SceneIdentity};

/// Image generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ImageProvider {
    /// Asynchronous submit/poll API
    NanoBanana,
    /// Synchronous Ark images API
    Seedream,
}

impl ImageProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageProvider::NanoBanana => "nano_banana",
            ImageProvider::Seedream => "seedream",
        }
    }
}

impl fmt::Display for ImageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageProvider {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "nano_banana" | "nanobanana" => Ok(ImageProvider::NanoBanana),
            "seedream" => Ok(ImageProvider::Seedream),
            _ => Err(ModelError::unknown_provider(s)),
        }
    }
}

/// Video generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VideoProvider {
    Sora2,
    Kling,
}

impl VideoProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoProvider::Sora2 => "sora2",
            VideoProvider::Kling => "kling",
        }
    }
}

impl fmt::Display for VideoProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoProvider {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sora2" | "sora" => Ok(VideoProvider::Sora2),
            "kling" => Ok(VideoProvider::Kling),
            _ => Err(ModelError::unknown_provider(s)),
        }
    }
}

/// Per-scene rendering overrides. Unset fields use the provider defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RenderParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_aspect_ratio: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_aspect_ratio: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_duration: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_size: Option<String>,
}

/// Immutable description of one scene to generate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct SceneTaskDescriptor {
    #[validate(nested)]
    pub identity: SceneIdentity,

    /// Fully composed prompt for the reference image
    #[validate(length(min = 1))]
    pub image_prompt: String,

    /// Fully composed prompt for the video; absent for image-only scenes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_provider: Option<ImageProvider>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_provider: Option<VideoProvider>,

    /// Character/asset reference images, already hosted
    #[serde(default)]
    pub reference_image_urls: Vec<String>,

    #[serde(default)]
    pub render: RenderParams,
}

impl SceneTaskDescriptor {
    pub fn new(identity: SceneIdentity, image_prompt: impl Into<String>) -> Self {
        Self {
            identity,
            image_prompt: image_prompt.into(),
            video_prompt: None,
            image_provider: None,
            video_provider: None,
            reference_image_urls: Vec::new(),
            render: RenderParams::default(),
        }
    }

    pub fn with_video_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.video_prompt = Some(prompt.into());
        self
    }

    pub fn with_reference_images(mut self, urls: Vec<String>) -> Self {
        self.reference_image_urls = urls;
        self
    }

    /// Whether this scene has a video stage.
    pub fn wants_video(&self) -> bool {
        self.video_prompt
            .as_deref()
            .map(|p| !p.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn scene_name(&self) -> String {
        self.identity.scene_name()
    }
}

/// A day's worth of scene descriptors for one character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct BatchManifest {
    #[validate(length(min = 1))]
    pub character_id: String,

    /// Schedule date, e.g. `2025-01-15`
    #[validate(length(min = 1))]
    pub date: String,

    #[validate(nested)]
    pub scenes: Vec<SceneTaskDescriptor>,
}

impl BatchManifest {
    /// Parse and validate a manifest from JSON text.
    pub fn from_json(text: &str) -> ModelResult<Self> {
        let manifest: BatchManifest = serde_json::from_str(text)?;
        manifest.check()?;
        Ok(manifest)
    }

    /// Load and validate a manifest file.
    pub fn load(path: impl AsRef<Path>) -> ModelResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Validate field constraints and scene key uniqueness.
    pub fn check(&self) -> ModelResult<()> {
        self.validate()?;

        let mut seen = HashSet::new();
        for scene in &self.scenes {
            let key = scene.identity.key();
            if !seen.insert(key.clone()) {
                return Err(ModelError::DuplicateScene(key.to_string()));
            }
        }

        // The playback index addresses events by (time slot, type), so a
        // slot may hold only one event of each type.
        let mut event_index_by_slot = std::collections::HashMap::new();
        for scene in &self.scenes {
            let id = &scene.identity;
            let existing = event_index_by_slot
                .entry((id.time_slot.as_str(), id.event_type))
                .or_insert(id.event_index);
            if *existing != id.event_index {
                return Err(ModelError::invalid_manifest(format!(
                    "time slot {} has two {} events ({} and {})",
                    id.time_slot, id.event_type, existing, id.event_index
                )));
            }
        }

        Ok(())
    }

    /// Keep only scenes whose time slot is in `slots`. An empty filter keeps all.
    pub fn retain_time_slots(&mut self, slots: &[String]) {
        if slots.is_empty() {
            return;
        }
        self.scenes
            .retain(|s| slots.iter().any(|slot| slot == &s.identity.time_slot));
    }

    pub fn time_slots(&self) -> BTreeSet<String> {
        self.scenes
            .iter()
            .map(|s| s.identity.time_slot.clone())
            .collect()
    }

    pub fn count_by_type(&self, event_type: EventType) -> usize {
        self.scenes
            .iter()
            .filter(|s| s.identity.event_type == event_type)
            .count()
    }
}
