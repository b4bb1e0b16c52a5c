//! Scene identity types.
//!
//! A scene is addressed by a structured tuple rather than a delimited name.
//! The filesystem stem used for artifacts is derived from the tuple, never
//! parsed back.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationError};

use crate::error::ModelError;

/// Maximum length of the sanitized label embedded in artifact names.
const MAX_LABEL_CHARS: usize = 40;

/// Narrative event category.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub enum EventType {
    /// Simple daily event, one scene
    #[serde(rename = "N")]
    N,
    /// Branching event
    #[serde(rename = "R")]
    R,
    /// Multi-phase event with choices
    #[serde(rename = "SR")]
    SR,
}

impl EventType {
    pub const ALL: &'static [EventType] = &[EventType::N, EventType::R, EventType::SR];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::N => "N",
            EventType::R => "R",
            EventType::SR => "SR",
        }
    }

    /// Name of the report bucket holding events of this type.
    pub fn bucket(&self) -> &'static str {
        match self {
            EventType::N => "n_events",
            EventType::R => "r_events",
            EventType::SR => "sr_events",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "N" => Ok(EventType::N),
            "R" => Ok(EventType::R),
            "SR" => Ok(EventType::SR),
            other => Err(ModelError::invalid_manifest(format!(
                "unknown event type '{}'",
                other
            ))),
        }
    }
}

/// Narrative role of a scene within its event.
///
/// Drives how the playback index places the scene's video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SceneRole {
    /// Stand-alone scene (N events)
    #[default]
    Simple,
    /// Opening scene of an R/SR event
    Prologue,
    /// Narrative segment opening a phase
    Narrative { phase: u32 },
    /// Outcome branch of an R event
    Branch { branch_id: String },
    /// One part of a phase choice in an SR event
    Choice {
        phase: u32,
        option_id: String,
        #[serde(default = "default_part")]
        part: u32,
    },
    /// Closing scene of an SR event
    Ending { ending_id: String },
}

fn default_part() -> u32 {
    1
}

/// Identity of a single scene task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Validate)]
pub struct SceneIdentity {
    /// Time slot, e.g. `08:00-10:00`
    #[validate(length(min = 1), custom(function = "validate_time_slot"))]
    pub time_slot: String,

    pub event_type: EventType,

    /// 1-based index of the event within the day
    #[validate(range(min = 1))]
    pub event_index: u32,

    /// 1-based ordinal of the scene within its event
    #[validate(range(min = 1))]
    pub scene_ordinal: u32,

    #[serde(default)]
    pub event_name: String,

    /// Human-readable scene title
    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub role: SceneRole,
}

impl SceneIdentity {
    pub fn new(
        time_slot: impl Into<String>,
        event_type: EventType,
        event_index: u32,
        scene_ordinal: u32,
    ) -> Self {
        Self {
            time_slot: time_slot.into(),
            event_type,
            event_index,
            scene_ordinal,
            event_name: String::new(),
            label: String::new(),
            role: SceneRole::Simple,
        }
    }

    pub fn with_event_name(mut self, event_name: impl Into<String>) -> Self {
        self.event_name = event_name.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_role(mut self, role: SceneRole) -> Self {
        self.role = role;
        self
    }

    pub fn key(&self) -> SceneKey {
        SceneKey {
            time_slot: self.time_slot.clone(),
            event_type: self.event_type,
            event_index: self.event_index,
            scene_ordinal: self.scene_ordinal,
        }
    }

    pub fn event_key(&self) -> EventKey {
        EventKey {
            time_slot: self.time_slot.clone(),
            event_type: self.event_type,
            event_index: self.event_index,
        }
    }

    /// Filesystem-safe stem shared by this scene's artifacts.
    pub fn scene_name(&self) -> String {
        let base = format!(
            "{}_{}_{:02}_{:03}",
            sanitize_time_slot(&self.time_slot),
            self.event_type,
            self.event_index,
            self.scene_ordinal
        );
        let label = sanitize_label(&self.label);
        if label.is_empty() {
            base
        } else {
            format!("{}_{}", base, label)
        }
    }

    pub fn image_file_name(&self) -> String {
        format!("{}_frame.png", self.scene_name())
    }

    pub fn video_file_name(&self) -> String {
        format!("{}.mp4", self.scene_name())
    }
}

impl fmt::Display for SceneIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.scene_name())
    }
}

/// Total-ordered key of a scene within a report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneKey {
    pub time_slot: String,
    pub event_type: EventType,
    pub event_index: u32,
    pub scene_ordinal: u32,
}

impl fmt::Display for SceneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.time_slot, self.event_type, self.event_index, self.scene_ordinal
        )
    }
}

/// Merge key of an event.
///
/// A manifest holds at most one event per `(time_slot, event_type)`, so the
/// index only matters for results that did not come through a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub time_slot: String,
    pub event_type: EventType,
    pub event_index: u32,
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{:02}", self.time_slot, self.event_type, self.event_index)
    }
}

/// Reduce a free-form title to a filesystem-safe fragment.
///
/// Time slots name artifact files, so they may not carry path syntax.
fn validate_time_slot(time_slot: &str) -> Result<(), ValidationError> {
    if time_slot.contains(['/', '\\']) || time_slot.contains("..") {
        return Err(ValidationError::new("time_slot_path"));
    }
    Ok(())
}

/// Slot part of a file stem. Anything but alphanumerics and `-` becomes `-`.
fn sanitize_time_slot(time_slot: &str) -> String {
    time_slot
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

/// Keeps alphanumerics (any script), `-` and `_`; whitespace becomes `_`;
/// everything else is dropped. Runs of `_` collapse and the result is
/// capped at a fixed number of characters.
pub fn sanitize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        let mapped = if c.is_alphanumeric() || c == '-' {
            Some(c)
        } else if c == '_' || c.is_whitespace() {
            Some('_')
        } else {
            None
        };
        if let Some(c) = mapped {
            if c == '_' && out.ends_with('_') {
                continue;
            }
            out.push(c);
        }
    }
    out.trim_matches('_')
        .chars()
        .take(MAX_LABEL_CHARS)
        .collect::<String>()
        .trim_end_matches('_')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_name_layout() {
        let identity = SceneIdentity::new("08:00-10:00", EventType::R, 3, 7)
            .with_label("Branch A: the [rooftop] talk");

        assert_eq!(identity.scene_name(), "08-00-10-00_R_03_007_Branch_A_the_rooftop_talk");
        assert_eq!(
            identity.image_file_name(),
            "08-00-10-00_R_03_007_Branch_A_the_rooftop_talk_frame.png"
        );
        assert_eq!(
            identity.video_file_name(),
            "08-00-10-00_R_03_007_Branch_A_the_rooftop_talk.mp4"
        );
    }

    #[test]
    fn test_scene_name_without_label() {
        let identity = SceneIdentity::new("12:00", EventType::N, 1, 1);
        assert_eq!(identity.scene_name(), "12-00_N_01_001");
    }

    #[test]
    fn test_time_slot_cannot_leave_output_dir() {
        let identity = SceneIdentity::new("../../etc/08:00", EventType::N, 1, 1);

        let name = identity.video_file_name();
        assert_eq!(name, "------etc-08-00_N_01_001.mp4");
        assert!(!name.contains('/'));
        assert!(!name.contains(".."));
        assert!(identity.validate().is_err());

        let windows = SceneIdentity::new("..\\08:00", EventType::N, 1, 1);
        assert!(!windows.scene_name().contains('\\'));
        assert!(windows.validate().is_err());

        assert!(SceneIdentity::new("08:00-10:00", EventType::N, 1, 1).validate().is_ok());
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("  hello   world  "), "hello_world");
        assert_eq!(sanitize_label("【叙事段落1：开场】"), "叙事段落1开场");
        assert_eq!(sanitize_label("a/b\\c"), "abc");
        assert_eq!(sanitize_label(&"x".repeat(100)).chars().count(), MAX_LABEL_CHARS);
    }

    #[test]
    fn test_keys_order_by_slot_then_type() {
        let a = SceneIdentity::new("08:00", EventType::SR, 1, 2).key();
        let b = SceneIdentity::new("09:00", EventType::N, 1, 1).key();
        let c = SceneIdentity::new("08:00", EventType::SR, 1, 10).key();
        let mut keys = vec![b.clone(), c.clone(), a.clone()];
        keys.sort();
        assert_eq!(keys, vec![a, c, b]);
    }

    #[test]
    fn test_event_type_serde() {
        assert_eq!(serde_json::to_string(&EventType::SR).unwrap(), "\"SR\"");
        let parsed: EventType = serde_json::from_str("\"R\"").unwrap();
        assert_eq!(parsed, EventType::R);
        assert_eq!("sr".parse::<EventType>().unwrap(), EventType::SR);
        assert!("X".parse::<EventType>().is_err());
    }

    #[test]
    fn test_role_serde_is_tagged() {
        let role = SceneRole::Choice {
            phase: 2,
            option_id: "B".to_string(),
            part: 1,
        };
        let json = serde_json::to_value(&role).unwrap();
        assert_eq!(json["kind"], "choice");
        assert_eq!(json["option_id"], "B");

        let parsed: SceneRole =
            serde_json::from_str(r#"{"kind":"choice","phase":1,"option_id":"A"}"#).unwrap();
        assert_eq!(
            parsed,
            SceneRole::Choice {
                phase: 1,
                option_id: "A".to_string(),
                part: 1
            }
        );
    }
}
