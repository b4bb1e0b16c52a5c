//! Command implementations behind the `scenegen` binary.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scenegen_models::{BatchManifest, ImageProvider, VideoProvider};
use scenegen_providers::ProviderRegistry;
use scenegen_report::{GenerationReport, InteractiveIndex, ReportError, ReportMeta, ReportStore};
use tracing::info;

use crate::config::{AppConfig, GenerationSettings};
use crate::error::{WorkerError, WorkerResult};
use crate::executor::{BatchSettings, ProgressCallback, WorkerPool};
use crate::query::{QuerySummary, VideoQuery};

/// Options of one `generate` invocation.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub manifest: PathBuf,
    pub output_dir: Option<PathBuf>,
    /// Restrict the run to these time slots; the report is then merged
    pub time_slots: Vec<String>,
    pub image_model: Option<ImageProvider>,
    pub video_model: Option<VideoProvider>,
    pub max_workers: Option<usize>,
}

/// A validated batch ready to execute.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub manifest: BatchManifest,
    pub settings: BatchSettings,
    /// Merge into the existing report instead of replacing it
    pub partial: bool,
}

impl BatchPlan {
    /// Image and video providers the batch will call.
    pub fn providers_in_use(&self) -> (HashSet<ImageProvider>, HashSet<VideoProvider>) {
        let mut images = HashSet::new();
        let mut videos = HashSet::new();

        for scene in &self.manifest.scenes {
            images.insert(scene.image_provider.unwrap_or(self.settings.default_image));
            if scene.wants_video() {
                videos.insert(scene.video_provider.unwrap_or(self.settings.default_video));
            }
        }
        (images, videos)
    }
}

/// Load the manifest and resolve settings for a `generate` run.
pub fn plan_batch(
    generation: &GenerationSettings,
    options: &GenerateOptions,
) -> WorkerResult<BatchPlan> {
    let mut manifest = BatchManifest::load(&options.manifest)?;
    manifest.retain_time_slots(&options.time_slots);
    if manifest.scenes.is_empty() {
        return Err(WorkerError::nothing_to_do(if options.time_slots.is_empty() {
            "manifest has no scenes".to_string()
        } else {
            format!("no scenes in time slots {}", options.time_slots.join(", "))
        }));
    }

    let output_dir = options.output_dir.clone().unwrap_or_else(|| {
        generation
            .output_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("output"))
            .join(&manifest.character_id)
            .join(&manifest.date)
    });

    let settings = BatchSettings::new(
        output_dir,
        options.image_model.unwrap_or(generation.default_image_model),
        options.video_model.unwrap_or(generation.default_video_model),
    )
    .with_max_workers(options.max_workers.unwrap_or(generation.max_workers))
    .with_policy(generation.retry.clone());

    Ok(BatchPlan {
        manifest,
        settings,
        partial: !options.time_slots.is_empty(),
    })
}

/// Run a planned batch against `registry` and persist the report.
pub async fn execute_batch(
    registry: ProviderRegistry,
    plan: BatchPlan,
    progress: Option<ProgressCallback>,
) -> WorkerResult<GenerationReport> {
    let meta = ReportMeta {
        character_id: plan.manifest.character_id.clone(),
        date: plan.manifest.date.clone(),
        image_model: plan.settings.default_image.as_str().to_string(),
        video_model: plan.settings.default_video.as_str().to_string(),
        output_dir: plan.settings.output_dir.clone(),
    };
    let store = ReportStore::new(&plan.settings.output_dir);

    let mut pool = WorkerPool::new(registry, plan.settings);
    if let Some(progress) = progress {
        pool = pool.with_progress(progress);
    }

    let report = pool.run_batch(meta, plan.manifest.scenes).await;
    Ok(store.save_run(&report, plan.partial).await?)
}

/// `generate`: plan, build providers from config, run and save.
pub async fn generate(
    config: &AppConfig,
    options: &GenerateOptions,
    progress: Option<ProgressCallback>,
) -> WorkerResult<GenerationReport> {
    let generation = config.generation()?;
    let plan = plan_batch(&generation, options)?;

    let (images, videos) = plan.providers_in_use();
    let registry = ProviderRegistry::from_settings(&config.provider_settings(&images, &videos)?)?;

    info!(
        character = %plan.manifest.character_id,
        date = %plan.manifest.date,
        scenes = plan.manifest.scenes.len(),
        partial = plan.partial,
        "Generating batch"
    );
    execute_batch(registry, plan, progress).await
}

/// `query`: resume outstanding video jobs of a saved report.
pub async fn query(
    config: &AppConfig,
    output_dir: &Path,
    max_poll: Duration,
) -> WorkerResult<QuerySummary> {
    let generation = config.generation()?;
    let store = ReportStore::new(output_dir);

    let report = store
        .load_report()
        .await?
        .ok_or_else(|| ReportError::not_found(store.report_path().display().to_string()))?;

    // Scenes recorded before per-scene providers were added use the batch model.
    let fallback = report.video_model.parse::<VideoProvider>().ok();
    let videos: HashSet<VideoProvider> = report
        .outstanding_videos()
        .iter()
        .filter_map(|job| job.provider.or(fallback))
        .collect();
    let settings = config.provider_settings(&HashSet::new(), &videos)?;
    let registry = ProviderRegistry::from_settings(&settings)?;

    let mut query = VideoQuery::new(store, registry, generation.retry).with_max_poll(max_poll);
    if let Some(provider) = fallback {
        query = query.with_fallback(provider);
    }
    query.run().await
}

/// `regenerate-interactive`: rebuild the interactive index from the report.
pub async fn regenerate_interactive(output_dir: &Path) -> WorkerResult<InteractiveIndex> {
    Ok(ReportStore::new(output_dir).regenerate_interactive().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use std::io::Write;

    const MANIFEST: &str = r#"{
        "character_id": "mika",
        "date": "2026-10-16",
        "scenes": [
            {
                "identity": {"time_slot": "08:00-10:00", "event_type": "N", "event_index": 1, "scene_ordinal": 1},
                "image_prompt": "breakfast",
                "video_prompt": "pours coffee"
            },
            {
                "identity": {"time_slot": "12:00-14:00", "event_type": "N", "event_index": 2, "scene_ordinal": 1},
                "image_prompt": "lunch",
                "image_provider": "seedream"
            },
            {
                "identity": {"time_slot": "20:00-22:00", "event_type": "R", "event_index": 3, "scene_ordinal": 1},
                "image_prompt": "rooftop",
                "video_prompt": "looks at the city",
                "video_provider": "kling"
            }
        ]
    }"#;

    fn generation() -> GenerationSettings {
        GenerationSettings {
            default_image_model: ImageProvider::NanoBanana,
            default_video_model: VideoProvider::Sora2,
            max_workers: 3,
            output_root: Some(PathBuf::from("/data/out")),
            retry: RetryPolicy::default(),
        }
    }

    fn manifest_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_plan_full_batch() {
        let file = manifest_file();
        let options = GenerateOptions {
            manifest: file.path().to_path_buf(),
            ..Default::default()
        };

        let plan = plan_batch(&generation(), &options).unwrap();

        assert!(!plan.partial);
        assert_eq!(plan.manifest.scenes.len(), 3);
        assert_eq!(plan.settings.output_dir, PathBuf::from("/data/out/mika/2026-10-16"));
        assert_eq!(plan.settings.max_workers, 3);

        let (images, videos) = plan.providers_in_use();
        assert_eq!(
            images,
            HashSet::from([ImageProvider::NanoBanana, ImageProvider::Seedream])
        );
        assert_eq!(videos, HashSet::from([VideoProvider::Sora2, VideoProvider::Kling]));
    }

    #[test]
    fn test_plan_time_slot_filter_is_partial() {
        let file = manifest_file();
        let options = GenerateOptions {
            manifest: file.path().to_path_buf(),
            time_slots: vec!["12:00-14:00".to_string()],
            output_dir: Some(PathBuf::from("/tmp/run")),
            video_model: Some(VideoProvider::Kling),
            max_workers: Some(1),
            ..Default::default()
        };

        let plan = plan_batch(&generation(), &options).unwrap();

        assert!(plan.partial);
        assert_eq!(plan.manifest.scenes.len(), 1);
        assert_eq!(plan.settings.output_dir, PathBuf::from("/tmp/run"));
        assert_eq!(plan.settings.default_video, VideoProvider::Kling);

        // Image-only slot: no video provider needed
        let (images, videos) = plan.providers_in_use();
        assert_eq!(images, HashSet::from([ImageProvider::Seedream]));
        assert!(videos.is_empty());
    }

    #[test]
    fn test_plan_unknown_time_slot() {
        let file = manifest_file();
        let options = GenerateOptions {
            manifest: file.path().to_path_buf(),
            time_slots: vec!["03:00-04:00".to_string()],
            ..Default::default()
        };

        let err = plan_batch(&generation(), &options).unwrap_err();
        assert!(matches!(err, WorkerError::NothingToDo(_)));
    }

    #[tokio::test]
    async fn test_regenerate_without_report() {
        let dir = tempfile::tempdir().unwrap();
        let err = regenerate_interactive(dir.path()).await.unwrap_err();
        assert!(matches!(err, WorkerError::Report(ReportError::NotFound(_))));
    }
}
