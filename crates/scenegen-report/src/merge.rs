//! Merging a newer run into an existing report.
//!
//! Events are upserted by `(time_slot, event_type, event_index)`. Events the
//! newer run did not touch are left exactly as they were.

use scenegen_models::EventType;
use tracing::debug;

use crate::report::{sort_events, GenerationReport};

impl GenerationReport {
    /// Fold `incoming` into this report.
    ///
    /// Applying the same `incoming` twice gives the same result as applying
    /// it once.
    pub fn merge(&mut self, incoming: GenerationReport) {
        let GenerationReport {
            generated_at,
            n_events,
            r_events,
            sr_events,
            ..
        } = incoming;

        for (event_type, events) in [
            (EventType::N, n_events),
            (EventType::R, r_events),
            (EventType::SR, sr_events),
        ] {
            let bucket = self.events_mut(event_type);

            for event in events {
                let Some(i) = bucket.iter().position(|e| {
                    e.time_slot == event.time_slot && e.event_index == event.event_index
                }) else {
                    debug!(event = %event.key(), "Merging new event");
                    bucket.push(event);
                    continue;
                };

                let existing = &mut bucket[i];
                if !event.event_name.is_empty() {
                    existing.event_name = event.event_name.clone();
                }
                for scene in event.scenes {
                    match existing
                        .scenes
                        .iter()
                        .position(|s| s.scene_ordinal == scene.scene_ordinal)
                    {
                        Some(j) => existing.scenes[j].absorb(&scene),
                        None => existing.scenes.push(scene),
                    }
                }
                existing.sort_scenes();
            }

            sort_events(bucket);
        }

        self.generated_at = generated_at;
        self.refresh_summary();
    }
}

/// Merge `incoming` into `base` and return the result.
pub fn merge(mut base: GenerationReport, incoming: GenerationReport) -> GenerationReport {
    base.merge(incoming);
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportMeta;
    use scenegen_models::{FailureReason, SceneIdentity, SceneResult};
    use std::path::{Path, PathBuf};

    fn meta() -> ReportMeta {
        ReportMeta {
            character_id: "luna".to_string(),
            date: "2026-10-16".to_string(),
            image_model: "seedream".to_string(),
            video_model: "kling".to_string(),
            output_dir: PathBuf::from("/out"),
        }
    }

    fn scene(slot: &str, event_type: EventType, ordinal: u32) -> SceneResult {
        let identity = SceneIdentity::new(slot, event_type, 1, ordinal)
            .with_label(format!("shot {}", ordinal));
        let mut result = SceneResult::new(identity.clone());
        result.image_path = Some(Path::new("/out").join(identity.image_file_name()));
        result.image_job_id = Some(format!("img-{}-{}", slot, ordinal));
        result.image_attempts = 1;
        result
    }

    fn with_video(mut result: SceneResult) -> SceneResult {
        result.video_path = Some(Path::new("/out").join(result.identity.video_file_name()));
        result.video_job_id = Some(format!("vid-{}", result.identity.scene_ordinal));
        result.video_attempts = 1;
        result
    }

    fn timed_out(mut result: SceneResult) -> SceneResult {
        result.video_job_id = Some("vid-late".to_string());
        result.video_attempts = 4;
        result.failure = Some(FailureReason::VideoTimedOut { attempts: 4 });
        result
    }

    #[test]
    fn test_merge_is_idempotent() {
        let base = GenerationReport::from_results(
            meta(),
            vec![
                with_video(scene("08:00-10:00", EventType::N, 1)),
                timed_out(scene("10:00-12:00", EventType::R, 1)),
            ],
        );
        let incoming = GenerationReport::from_results(
            meta(),
            vec![
                with_video(scene("10:00-12:00", EventType::R, 1)),
                with_video(scene("12:00-14:00", EventType::SR, 1)),
            ],
        );

        let once = merge(base.clone(), incoming.clone());
        let twice = merge(once.clone(), incoming);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_untouched_events_are_byte_identical() {
        let base = GenerationReport::from_results(
            meta(),
            vec![
                with_video(scene("08:00-10:00", EventType::N, 1)),
                with_video(scene("08:00-10:00", EventType::N, 2)),
                timed_out(scene("10:00-12:00", EventType::N, 1)),
            ],
        );
        let before = serde_json::to_string(&base.n_events[0]).unwrap();

        let incoming = GenerationReport::from_results(
            meta(),
            vec![with_video(scene("10:00-12:00", EventType::N, 1))],
        );
        let merged = merge(base, incoming);

        assert_eq!(serde_json::to_string(&merged.n_events[0]).unwrap(), before);
        assert_eq!(merged.summary().n_events.videos_generated, 3);
    }

    #[test]
    fn test_known_event_updates_only_produced_fields() {
        let base = GenerationReport::from_results(
            meta(),
            vec![timed_out(scene("10:00-12:00", EventType::R, 1))],
        );

        // The newer run only produced a video; no image fields.
        let mut rerun = SceneResult::new(scene("10:00-12:00", EventType::R, 1).identity);
        rerun = with_video(rerun);
        let incoming = GenerationReport::from_results(meta(), vec![rerun]);

        let merged = merge(base, incoming);
        let record = &merged.r_events[0].scenes[0];

        assert!(record.image_path.is_some());
        assert_eq!(record.image_job_id.as_deref(), Some("img-10:00-12:00-1"));
        assert_eq!(record.image_attempts, 1);
        assert!(record.video_path.is_some());
        assert_eq!(record.video_attempts, 1);
        assert!(record.failure.is_none());
    }

    #[test]
    fn test_new_failure_recorded_when_no_video() {
        let base = GenerationReport::from_results(
            meta(),
            vec![scene("10:00-12:00", EventType::R, 1)],
        );
        let incoming = GenerationReport::from_results(
            meta(),
            vec![timed_out(scene("10:00-12:00", EventType::R, 1))],
        );

        let merged = merge(base, incoming);
        assert_eq!(
            merged.r_events[0].scenes[0].failure,
            Some(FailureReason::VideoTimedOut { attempts: 4 })
        );
    }

    #[test]
    fn test_missing_scenes_are_appended_in_order() {
        let base = GenerationReport::from_results(
            meta(),
            vec![with_video(scene("08:00-10:00", EventType::SR, 2))],
        );
        let incoming = GenerationReport::from_results(
            meta(),
            vec![
                with_video(scene("08:00-10:00", EventType::SR, 3)),
                with_video(scene("08:00-10:00", EventType::SR, 1)),
            ],
        );

        let merged = merge(base, incoming);
        let ordinals: Vec<u32> = merged.sr_events[0]
            .scenes
            .iter()
            .map(|s| s.scene_ordinal)
            .collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
        assert_eq!(merged.summary().sr_events.scenes, 3);
    }

    #[test]
    fn test_other_event_in_same_slot_is_inserted() {
        let base = GenerationReport::from_results(
            meta(),
            vec![with_video(scene("08:00-10:00", EventType::R, 1))],
        );
        let before = serde_json::to_string(&base.r_events[0]).unwrap();

        let mut second = scene("08:00-10:00", EventType::R, 1);
        second.identity.event_index = 2;
        let incoming = GenerationReport::from_results(meta(), vec![timed_out(second)]);

        let merged = merge(base, incoming);

        assert_eq!(merged.r_events.len(), 2);
        assert_eq!(serde_json::to_string(&merged.r_events[0]).unwrap(), before);
        assert_eq!(merged.r_events[1].event_index, 2);
        assert!(merged.r_events[1].scenes[0].is_video_outstanding());
        assert_eq!(merged.scene_count(), 2);
    }
}
