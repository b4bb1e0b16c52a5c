//! Partial re-runs, resumed queries and HTTP downloads.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{scene, time_slot, ScriptedProvider, VideoScript};
use scenegen_models::{BatchManifest, FailureReason, ImageProvider, JobKind, VideoProvider};
use scenegen_providers::{part_path, PollOutcome, ProviderAdapter, ProviderRegistry};
use scenegen_report::{EventRecord, GenerationReport, ReportStore};
use scenegen_worker::{
    execute_batch, BatchPlan, BatchSettings, RetryPolicy, VideoQuery, WorkerPool,
};
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn policy() -> RetryPolicy {
    RetryPolicy::default()
        .with_poll_interval(Duration::from_secs(5))
        .with_submit_backoff(Duration::from_secs(2))
        .with_timeouts(Duration::from_secs(60), Duration::from_secs(60))
        .with_max_retry_on_timeout(1)
}

fn registry(provider: Arc<dyn ProviderAdapter>) -> ProviderRegistry {
    ProviderRegistry::new()
        .with_image(ImageProvider::NanoBanana, provider.clone())
        .with_video(VideoProvider::Sora2, provider)
}

fn plan(dir: &Path, scenes: Vec<scenegen_models::SceneTaskDescriptor>, partial: bool) -> BatchPlan {
    BatchPlan {
        manifest: BatchManifest {
            character_id: "mika".to_string(),
            date: "2026-10-16".to_string(),
            scenes,
        },
        settings: BatchSettings::new(dir, ImageProvider::NanoBanana, VideoProvider::Sora2)
            .with_max_workers(2)
            .with_policy(policy()),
        partial,
    }
}

fn event_json(report: &GenerationReport, slot: &str) -> String {
    let event: &EventRecord = report
        .n_events
        .iter()
        .find(|e| e.time_slot == slot)
        .unwrap();
    serde_json::to_string(event).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_partial_rerun_only_touches_its_time_slot() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReportStore::new(dir.path());

    let first_run = Arc::new(ScriptedProvider::new().video("middle", VideoScript::NeverFinish));
    execute_batch(
        registry(first_run),
        plan(
            dir.path(),
            vec![
                scene(1, "early", true),
                scene(2, "middle", true),
                scene(3, "late", false),
            ],
            false,
        ),
        None,
    )
    .await
    .unwrap();
    let before = store.load_report().await.unwrap().unwrap();
    assert!(before.n_events[1].scenes[0].failure.is_some());

    let rerun = Arc::new(ScriptedProvider::new());
    execute_batch(registry(rerun), plan(dir.path(), vec![scene(2, "middle", true)], true), None)
        .await
        .unwrap();
    let after = store.load_report().await.unwrap().unwrap();

    assert_eq!(after.scene_count(), 3);
    assert_eq!(event_json(&before, &time_slot(1)), event_json(&after, &time_slot(1)));
    assert_eq!(event_json(&before, &time_slot(3)), event_json(&after, &time_slot(3)));

    let middle = &after.n_events[1].scenes[0];
    assert!(middle.video_path.is_some());
    assert!(middle.failure.is_none());
    assert_eq!(after.summary().total.videos, 2);

    let index = store.load_interactive().await.unwrap().unwrap();
    assert_eq!(index.events.len(), 3);
}

/// Video provider whose jobs have all finished by the time anyone asks.
struct FinishedVideos;

#[async_trait]
impl ProviderAdapter for FinishedVideos {
    fn name(&self) -> &str {
        "finished"
    }

    async fn poll(&self, job_id: &str, _kind: JobKind) -> PollOutcome {
        PollOutcome::succeeded(Some(format!("https://cdn.test/late/{}.mp4", job_id)))
    }

    async fn download(&self, _url: &str, dest: &Path) -> bool {
        tokio::fs::write(dest, b"mp4").await.is_ok()
    }
}

#[tokio::test(start_paused = true)]
async fn test_query_finishes_outstanding_videos() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReportStore::new(dir.path());

    let provider = Arc::new(ScriptedProvider::new().video("slow", VideoScript::NeverFinish));
    let report = execute_batch(
        registry(provider),
        plan(dir.path(), vec![scene(1, "slow", true), scene(2, "quick", true)], false),
        None,
    )
    .await
    .unwrap();
    assert_eq!(report.outstanding_videos().len(), 1);

    assert_eq!(
        report.outstanding_videos()[0].provider,
        Some(VideoProvider::Sora2)
    );

    let resumed =
        ProviderRegistry::new().with_video(VideoProvider::Sora2, Arc::new(FinishedVideos));
    let summary = VideoQuery::new(ReportStore::new(dir.path()), resumed, policy())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.outstanding, 1);
    assert_eq!(summary.downloaded, 1);

    let after = store.load_report().await.unwrap().unwrap();
    assert!(after.outstanding_videos().is_empty());
    assert_eq!(after.summary().total.videos, 2);
    let slow = &after.n_events[0].scenes[0];
    assert_eq!(slow.video_attempts, 2);
    assert!(slow.failure.is_none());
}

#[tokio::test]
async fn test_http_download_failure_leaves_no_artifact() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/img/.*\.png$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\x89PNG frame".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/vid/.*\.mp4$"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new().downloads_from(&server.uri()));
    let fast = RetryPolicy::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_submit_backoff(Duration::from_millis(10))
        .with_max_retry_on_timeout(0);
    let settings = BatchSettings::new(dir.path(), ImageProvider::NanoBanana, VideoProvider::Sora2)
        .with_policy(fast);

    let results = WorkerPool::new(registry(provider), settings)
        .run_scenes(vec![scene(1, "remote", true)])
        .await;
    let result = &results[0];

    let frame = result.image_path.as_ref().unwrap();
    assert_eq!(std::fs::read(frame).unwrap(), b"\x89PNG frame");

    assert!(result.video_path.is_none());
    assert_eq!(
        result.failure,
        Some(FailureReason::VideoDownloadFailed { attempts: 1 })
    );
    let clip = dir.path().join(result.identity.video_file_name());
    assert!(!clip.exists());
    assert!(!part_path(&clip).exists());
}
