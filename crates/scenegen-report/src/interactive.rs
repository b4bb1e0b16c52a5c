//! Playback index (`interactive_data.json`).
//!
//! The same results as the report, re-keyed by narrative structure: a simple
//! event has one clip, an R event has a prologue and outcome branches, an SR
//! event has a prologue, numbered phases with choices, and endings. Only
//! file names are stored; the player resolves them against the output
//! directory.

use std::path::Path;

use scenegen_models::{EventKey, EventType, SceneRole};
use serde::{Deserialize, Serialize};

use crate::report::{EventRecord, GenerationReport, SceneRecord};

/// Structural shape of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventFormat {
    #[default]
    Simple,
    Branches,
    Phases,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchEntry {
    pub branch_id: String,
    pub video_file: String,
    #[serde(default)]
    pub scene_title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceEntry {
    pub option_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_file_part1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_file_part2: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseEntry {
    pub phase_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative_title: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChoiceEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionEntry {
    pub ending_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveEvent {
    pub time_slot: String,
    pub event_type: EventType,
    #[serde(default)]
    pub event_index: u32,
    #[serde(default)]
    pub event_name: String,
    #[serde(default)]
    pub format: EventFormat,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prologue: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<BranchEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<PhaseEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolutions: Vec<ResolutionEntry>,
}

impl InteractiveEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            time_slot: self.time_slot.clone(),
            event_type: self.event_type,
            event_index: self.event_index,
        }
    }

    fn from_record(record: &EventRecord) -> Self {
        let mut event = Self {
            time_slot: record.time_slot.clone(),
            event_type: record.event_type,
            event_index: record.event_index,
            event_name: record.event_name.clone(),
            format: format_of(&record.scenes),
            video_file: None,
            prologue: None,
            branches: Vec::new(),
            phases: Vec::new(),
            resolutions: Vec::new(),
        };

        for scene in &record.scenes {
            event.place(scene);
        }
        event.phases.sort_by_key(|p| p.phase_number);
        event
    }

    fn place(&mut self, scene: &SceneRecord) {
        let file = scene.video_path.as_deref().and_then(file_name);

        match &scene.role {
            SceneRole::Simple => {
                if self.video_file.is_none() {
                    self.video_file = file;
                }
            }
            SceneRole::Prologue => self.prologue = file,
            SceneRole::Branch { branch_id } => {
                if let Some(video_file) = file {
                    self.branches.push(BranchEntry {
                        branch_id: branch_id.clone(),
                        video_file,
                        scene_title: scene.scene_title.clone(),
                    });
                }
            }
            SceneRole::Narrative { phase } => {
                let entry = self.phase_mut(*phase);
                entry.video_file = file;
                if !scene.scene_title.is_empty() {
                    entry.narrative_title = Some(scene.scene_title.clone());
                }
            }
            SceneRole::Choice {
                phase,
                option_id,
                part,
            } => {
                let entry = self.phase_mut(*phase);
                let choice = match entry.choices.iter().position(|c| &c.option_id == option_id) {
                    Some(i) => &mut entry.choices[i],
                    None => {
                        entry.choices.push(ChoiceEntry {
                            option_id: option_id.clone(),
                            video_file_part1: None,
                            video_file_part2: None,
                        });
                        let last = entry.choices.len() - 1;
                        &mut entry.choices[last]
                    }
                };
                if *part >= 2 {
                    choice.video_file_part2 = file;
                } else {
                    choice.video_file_part1 = file;
                }
            }
            SceneRole::Ending { ending_id } => self.resolutions.push(ResolutionEntry {
                ending_id: ending_id.clone(),
                video_file: file,
            }),
        }
    }

    fn phase_mut(&mut self, phase_number: u32) -> &mut PhaseEntry {
        let index = match self.phases.iter().position(|p| p.phase_number == phase_number) {
            Some(i) => i,
            None => {
                self.phases.push(PhaseEntry {
                    phase_number,
                    video_file: None,
                    narrative_title: None,
                    choices: Vec::new(),
                });
                self.phases.len() - 1
            }
        };
        &mut self.phases[index]
    }

    /// Fold a newer build of the same event into this one. Only non-empty
    /// values overwrite; unseen entries are appended.
    fn absorb(&mut self, newer: InteractiveEvent) {
        if !newer.event_name.is_empty() {
            self.event_name = newer.event_name;
        }
        if newer.format != EventFormat::Simple {
            self.format = newer.format;
        }
        if newer.video_file.is_some() {
            self.video_file = newer.video_file;
        }
        if newer.prologue.is_some() {
            self.prologue = newer.prologue;
        }

        for branch in newer.branches {
            match self.branches.iter().position(|b| b.branch_id == branch.branch_id) {
                Some(i) => {
                    let existing = &mut self.branches[i];
                    if !branch.video_file.is_empty() {
                        existing.video_file = branch.video_file;
                    }
                    if !branch.scene_title.is_empty() {
                        existing.scene_title = branch.scene_title;
                    }
                }
                None => self.branches.push(branch),
            }
        }

        for phase in newer.phases {
            match self.phases.iter().position(|p| p.phase_number == phase.phase_number) {
                Some(i) => {
                    let existing = &mut self.phases[i];
                    if phase.video_file.is_some() {
                        existing.video_file = phase.video_file;
                    }
                    if phase.narrative_title.is_some() {
                        existing.narrative_title = phase.narrative_title;
                    }
                    for choice in phase.choices {
                        let found = existing
                            .choices
                            .iter()
                            .position(|c| c.option_id == choice.option_id);
                        match found {
                            Some(j) => {
                                let current = &mut existing.choices[j];
                                if choice.video_file_part1.is_some() {
                                    current.video_file_part1 = choice.video_file_part1;
                                }
                                if choice.video_file_part2.is_some() {
                                    current.video_file_part2 = choice.video_file_part2;
                                }
                            }
                            None => existing.choices.push(choice),
                        }
                    }
                }
                None => self.phases.push(phase),
            }
        }
        self.phases.sort_by_key(|p| p.phase_number);

        for resolution in newer.resolutions {
            match self
                .resolutions
                .iter()
                .position(|r| r.ending_id == resolution.ending_id)
            {
                Some(i) => {
                    if resolution.video_file.is_some() {
                        self.resolutions[i].video_file = resolution.video_file;
                    }
                }
                None => self.resolutions.push(resolution),
            }
        }
    }
}

fn format_of(scenes: &[SceneRecord]) -> EventFormat {
    let phased = scenes.iter().any(|s| {
        matches!(
            s.role,
            SceneRole::Narrative { .. } | SceneRole::Choice { .. } | SceneRole::Ending { .. }
        )
    });
    if phased {
        return EventFormat::Phases;
    }
    if scenes.iter().any(|s| matches!(s.role, SceneRole::Branch { .. })) {
        return EventFormat::Branches;
    }
    EventFormat::Simple
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// The whole playback index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveIndex {
    pub character_id: String,
    pub date: String,
    #[serde(default)]
    pub events: Vec<InteractiveEvent>,
}

impl InteractiveIndex {
    pub fn build(report: &GenerationReport) -> Self {
        let mut index = Self {
            character_id: report.character_id.clone(),
            date: report.date.clone(),
            events: report.all_events().map(InteractiveEvent::from_record).collect(),
        };
        index.sort();
        index
    }

    pub fn event(&self, key: &EventKey) -> Option<&InteractiveEvent> {
        self.events.iter().find(|e| &e.key() == key)
    }

    /// Upsert `newer` into this index by event key.
    pub fn merge(&mut self, newer: InteractiveIndex) {
        for event in newer.events {
            match self.events.iter().position(|e| e.key() == event.key()) {
                Some(i) => self.events[i].absorb(event),
                None => self.events.push(event),
            }
        }
        self.sort();
    }

    fn sort(&mut self) {
        self.events.sort_by_key(|e| e.key());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportMeta;
    use scenegen_models::{SceneIdentity, SceneResult};
    use std::path::PathBuf;

    fn meta() -> ReportMeta {
        ReportMeta {
            character_id: "luna".to_string(),
            date: "2026-10-16".to_string(),
            image_model: "nano_banana".to_string(),
            video_model: "sora2".to_string(),
            output_dir: PathBuf::from("/out"),
        }
    }

    fn clip(event_type: EventType, ordinal: u32, role: SceneRole, title: &str) -> SceneResult {
        let identity = SceneIdentity::new("20:00-22:00", event_type, 3, ordinal)
            .with_event_name("Night market")
            .with_label(title)
            .with_role(role);
        let mut result = SceneResult::new(identity.clone());
        result.video_path = Some(PathBuf::from("/out").join(identity.video_file_name()));
        result
    }

    #[test]
    fn test_branch_event() {
        let report = GenerationReport::from_results(
            meta(),
            vec![
                clip(EventType::R, 1, SceneRole::Prologue, "arrival"),
                clip(EventType::R, 2, SceneRole::Branch { branch_id: "A".into() }, "stay"),
                clip(EventType::R, 3, SceneRole::Branch { branch_id: "B".into() }, "leave"),
            ],
        );

        let index = InteractiveIndex::build(&report);
        let event = &index.events[0];

        assert_eq!(event.format, EventFormat::Branches);
        assert_eq!(event.prologue.as_deref(), Some("20-00-22-00_R_03_001_arrival.mp4"));
        assert_eq!(event.branches.len(), 2);
        assert_eq!(event.branches[1].branch_id, "B");
        assert_eq!(event.branches[1].scene_title, "leave");
        assert!(!event.branches[0].video_file.contains('/'));
    }

    #[test]
    fn test_phase_event() {
        let report = GenerationReport::from_results(
            meta(),
            vec![
                clip(EventType::SR, 1, SceneRole::Prologue, "intro"),
                clip(EventType::SR, 2, SceneRole::Narrative { phase: 1 }, "the door"),
                clip(
                    EventType::SR,
                    3,
                    SceneRole::Choice { phase: 1, option_id: "A".into(), part: 1 },
                    "open",
                ),
                clip(
                    EventType::SR,
                    4,
                    SceneRole::Choice { phase: 1, option_id: "A".into(), part: 2 },
                    "open more",
                ),
                clip(EventType::SR, 5, SceneRole::Ending { ending_id: "good".into() }, "dawn"),
            ],
        );

        let index = InteractiveIndex::build(&report);
        let event = &index.events[0];

        assert_eq!(event.format, EventFormat::Phases);
        assert_eq!(event.phases.len(), 1);
        let phase = &event.phases[0];
        assert_eq!(phase.narrative_title.as_deref(), Some("the door"));
        assert_eq!(phase.choices.len(), 1);
        assert!(phase.choices[0].video_file_part1.is_some());
        assert!(phase.choices[0].video_file_part2.is_some());
        assert_eq!(event.resolutions[0].ending_id, "good");
    }

    #[test]
    fn test_merge_keeps_existing_and_appends() {
        let first = InteractiveIndex::build(&GenerationReport::from_results(
            meta(),
            vec![
                clip(EventType::R, 1, SceneRole::Prologue, "arrival"),
                clip(EventType::R, 2, SceneRole::Branch { branch_id: "A".into() }, "stay"),
            ],
        ));

        let mut missing_prologue = clip(EventType::R, 1, SceneRole::Prologue, "arrival");
        missing_prologue.video_path = None;
        let second = InteractiveIndex::build(&GenerationReport::from_results(
            meta(),
            vec![
                missing_prologue,
                clip(EventType::R, 3, SceneRole::Branch { branch_id: "B".into() }, "leave"),
            ],
        ));

        let mut merged = first.clone();
        merged.merge(second.clone());

        let event = &merged.events[0];
        assert_eq!(event.prologue, first.events[0].prologue);
        assert_eq!(
            event.branches.iter().map(|b| b.branch_id.as_str()).collect::<Vec<_>>(),
            vec!["A", "B"]
        );

        let mut again = merged.clone();
        again.merge(second);
        assert_eq!(again, merged);
    }
}
