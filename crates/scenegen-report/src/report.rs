//! The generation report.
//!
//! Results are grouped into one bucket per event type (`n_events`,
//! `r_events`, `sr_events`). Within a bucket, events are kept sorted by
//! `(time_slot, event_index)` and scenes by ordinal, so the serialized
//! report does not depend on the order in which tasks finished.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use scenegen_models::{
    EventKey, EventType, FailureReason, SceneIdentity, SceneKey, SceneResult, SceneRole,
    VideoProvider,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Records
// ============================================================================

/// One scene as recorded in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub scene_ordinal: u32,

    pub scene_name: String,

    #[serde(default)]
    pub scene_title: String,

    #[serde(default)]
    pub role: SceneRole,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_job_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_job_id: Option<String>,

    /// Backend holding `video_job_id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_provider: Option<VideoProvider>,

    #[serde(default)]
    pub image_attempts: u32,

    #[serde(default)]
    pub video_attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

impl SceneRecord {
    pub fn from_result(result: &SceneResult) -> Self {
        Self {
            scene_ordinal: result.identity.scene_ordinal,
            scene_name: result.identity.scene_name(),
            scene_title: result.identity.label.clone(),
            role: result.identity.role.clone(),
            image_path: result.image_path.clone(),
            video_path: result.video_path.clone(),
            image_url: result.image_url.clone(),
            image_job_id: result.image_job_id.clone(),
            video_job_id: result.video_job_id.clone(),
            video_provider: result.video_provider,
            image_attempts: result.image_attempts,
            video_attempts: result.video_attempts,
            failure: result.failure.clone(),
        }
    }

    /// A video job was accepted but its clip never arrived.
    pub fn is_video_outstanding(&self) -> bool {
        self.video_job_id.is_some() && self.video_path.is_none()
    }

    /// Fold a newer run's record for the same scene into this one.
    ///
    /// Only fields the newer run produced overwrite; everything else keeps
    /// its previous value.
    pub fn absorb(&mut self, newer: &SceneRecord) {
        if !newer.scene_name.is_empty() {
            self.scene_name = newer.scene_name.clone();
        }
        if !newer.scene_title.is_empty() {
            self.scene_title = newer.scene_title.clone();
        }
        if newer.role != SceneRole::Simple {
            self.role = newer.role.clone();
        }

        overwrite(&mut self.image_path, &newer.image_path);
        overwrite(&mut self.video_path, &newer.video_path);
        overwrite(&mut self.image_url, &newer.image_url);
        overwrite(&mut self.image_job_id, &newer.image_job_id);
        overwrite(&mut self.video_job_id, &newer.video_job_id);
        overwrite(&mut self.video_provider, &newer.video_provider);

        if newer.image_attempts > 0 {
            self.image_attempts = newer.image_attempts;
        }
        if newer.video_attempts > 0 {
            self.video_attempts = newer.video_attempts;
        }

        if self.video_path.is_some() {
            self.failure = None;
        } else if newer.failure.is_some() {
            self.failure = newer.failure.clone();
        }
    }
}

fn overwrite<T: Clone>(slot: &mut Option<T>, newer: &Option<T>) {
    if newer.is_some() {
        *slot = newer.clone();
    }
}

/// One event and its scenes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub time_slot: String,
    pub event_type: EventType,
    pub event_index: u32,

    #[serde(default)]
    pub event_name: String,

    #[serde(default)]
    pub scenes: Vec<SceneRecord>,
}

impl EventRecord {
    pub fn new(identity: &SceneIdentity) -> Self {
        Self {
            time_slot: identity.time_slot.clone(),
            event_type: identity.event_type,
            event_index: identity.event_index,
            event_name: identity.event_name.clone(),
            scenes: Vec::new(),
        }
    }

    pub fn key(&self) -> EventKey {
        EventKey {
            time_slot: self.time_slot.clone(),
            event_type: self.event_type,
            event_index: self.event_index,
        }
    }

    /// Whether `identity` belongs to this event.
    pub fn holds(&self, identity: &SceneIdentity) -> bool {
        self.time_slot == identity.time_slot && self.event_index == identity.event_index
    }

    pub fn scene(&self, ordinal: u32) -> Option<&SceneRecord> {
        self.scenes.iter().find(|s| s.scene_ordinal == ordinal)
    }

    /// Insert a scene, replacing any scene with the same ordinal.
    pub fn put_scene(&mut self, record: SceneRecord) {
        match self
            .scenes
            .iter()
            .position(|s| s.scene_ordinal == record.scene_ordinal)
        {
            Some(i) => self.scenes[i] = record,
            None => {
                self.scenes.push(record);
                self.sort_scenes();
            }
        }
    }

    pub fn sort_scenes(&mut self) {
        self.scenes.sort_by_key(|s| s.scene_ordinal);
    }

    /// Rebuild the identity of one of this event's scenes.
    pub fn identity_of(&self, scene: &SceneRecord) -> SceneIdentity {
        SceneIdentity::new(
            self.time_slot.clone(),
            self.event_type,
            self.event_index,
            scene.scene_ordinal,
        )
        .with_event_name(self.event_name.clone())
        .with_label(scene.scene_title.clone())
        .with_role(scene.role.clone())
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Counts for one event-type bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSummary {
    /// Number of events
    pub total: usize,
    pub scenes: usize,
    pub images_generated: usize,
    pub videos_generated: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalSummary {
    pub images: usize,
    pub videos: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub n_events: BucketSummary,
    pub r_events: BucketSummary,
    pub sr_events: BucketSummary,
    pub total: TotalSummary,
}

impl ReportSummary {
    pub fn bucket(&self, event_type: EventType) -> &BucketSummary {
        match event_type {
            EventType::N => &self.n_events,
            EventType::R => &self.r_events,
            EventType::SR => &self.sr_events,
        }
    }
}

fn summarize(events: &[EventRecord]) -> BucketSummary {
    let scenes = events.iter().flat_map(|e| e.scenes.iter());
    let (mut count, mut images, mut videos) = (0, 0, 0);
    for scene in scenes {
        count += 1;
        images += usize::from(scene.image_path.is_some());
        videos += usize::from(scene.video_path.is_some());
    }
    BucketSummary {
        total: events.len(),
        scenes: count,
        images_generated: images,
        videos_generated: videos,
    }
}

// ============================================================================
// Report
// ============================================================================

/// Run-level metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportMeta {
    pub character_id: String,
    pub date: String,
    pub image_model: String,
    pub video_model: String,
    pub output_dir: PathBuf,
}

/// Aggregated results of a batch, as written to `generation_report.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub character_id: String,
    pub date: String,
    pub image_model: String,
    pub video_model: String,
    pub output_dir: PathBuf,
    pub generated_at: DateTime<Utc>,

    #[serde(default)]
    pub n_events: Vec<EventRecord>,

    #[serde(default)]
    pub r_events: Vec<EventRecord>,

    #[serde(default)]
    pub sr_events: Vec<EventRecord>,

    #[serde(default)]
    pub summary: ReportSummary,
}

impl GenerationReport {
    pub fn new(meta: ReportMeta) -> Self {
        Self {
            character_id: meta.character_id,
            date: meta.date,
            image_model: meta.image_model,
            video_model: meta.video_model,
            output_dir: meta.output_dir,
            generated_at: Utc::now(),
            n_events: Vec::new(),
            r_events: Vec::new(),
            sr_events: Vec::new(),
            summary: ReportSummary::default(),
        }
    }

    /// Build a report from a set of results.
    pub fn from_results(meta: ReportMeta, results: impl IntoIterator<Item = SceneResult>) -> Self {
        let mut report = Self::new(meta);
        for result in results {
            report.insert(&result);
        }
        report.refresh_summary();
        report
    }

    pub fn events(&self, event_type: EventType) -> &[EventRecord] {
        match event_type {
            EventType::N => &self.n_events,
            EventType::R => &self.r_events,
            EventType::SR => &self.sr_events,
        }
    }

    pub(crate) fn events_mut(&mut self, event_type: EventType) -> &mut Vec<EventRecord> {
        match event_type {
            EventType::N => &mut self.n_events,
            EventType::R => &mut self.r_events,
            EventType::SR => &mut self.sr_events,
        }
    }

    /// All events across buckets, in bucket order.
    pub fn all_events(&self) -> impl Iterator<Item = &EventRecord> {
        self.n_events
            .iter()
            .chain(self.r_events.iter())
            .chain(self.sr_events.iter())
    }

    pub fn event(&self, key: &EventKey) -> Option<&EventRecord> {
        self.events(key.event_type)
            .iter()
            .find(|e| e.time_slot == key.time_slot && e.event_index == key.event_index)
    }

    /// Record one result, replacing any earlier result for the same scene.
    pub fn record(&mut self, result: &SceneResult) {
        self.insert(result);
        self.refresh_summary();
    }

    fn insert(&mut self, result: &SceneResult) {
        let identity = &result.identity;
        let events = self.events_mut(identity.event_type);

        let event = match events.iter().position(|e| e.holds(identity)) {
            Some(i) => &mut events[i],
            None => {
                events.push(EventRecord::new(identity));
                let last = events.len() - 1;
                &mut events[last]
            }
        };

        if event.event_name.is_empty() && !identity.event_name.is_empty() {
            event.event_name = identity.event_name.clone();
        }
        event.put_scene(SceneRecord::from_result(result));

        sort_events(events);
    }

    pub fn get(&self, key: &SceneKey) -> Option<&SceneRecord> {
        self.events(key.event_type)
            .iter()
            .find(|e| e.time_slot == key.time_slot && e.event_index == key.event_index)
            .and_then(|e| e.scene(key.scene_ordinal))
    }

    pub fn scene_count(&self) -> usize {
        self.all_events().map(|e| e.scenes.len()).sum()
    }

    pub fn summary(&self) -> &ReportSummary {
        &self.summary
    }

    /// Recompute the summary from the current contents.
    pub fn refresh_summary(&mut self) {
        let n_events = summarize(&self.n_events);
        let r_events = summarize(&self.r_events);
        let sr_events = summarize(&self.sr_events);

        self.summary = ReportSummary {
            total: TotalSummary {
                images: n_events.images_generated
                    + r_events.images_generated
                    + sr_events.images_generated,
                videos: n_events.videos_generated
                    + r_events.videos_generated
                    + sr_events.videos_generated,
            },
            n_events,
            r_events,
            sr_events,
        };
    }

    /// Scenes whose video job was accepted but never downloaded.
    pub fn outstanding_videos(&self) -> Vec<OutstandingVideo> {
        self.all_events()
            .flat_map(|event| {
                event.scenes.iter().filter_map(move |scene| {
                    if !scene.is_video_outstanding() {
                        return None;
                    }
                    scene.video_job_id.clone().map(|job_id| OutstandingVideo {
                        identity: event.identity_of(scene),
                        job_id,
                        provider: scene.video_provider,
                    })
                })
            })
            .collect()
    }

    /// Sort every bucket and every event's scenes.
    pub fn normalize(&mut self) {
        for &event_type in EventType::ALL {
            let events = self.events_mut(event_type);
            for event in events.iter_mut() {
                event.sort_scenes();
            }
            sort_events(events);
        }
        self.refresh_summary();
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// A video job recorded in a report whose clip never arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutstandingVideo {
    pub identity: SceneIdentity,
    pub job_id: String,
    /// `None` for reports written before providers were recorded per scene
    pub provider: Option<VideoProvider>,
}

pub(crate) fn sort_events(events: &mut [EventRecord]) {
    events.sort_by(|a, b| {
        (a.time_slot.as_str(), a.event_index).cmp(&(b.time_slot.as_str(), b.event_index))
    });
}
