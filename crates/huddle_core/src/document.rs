//! Action document model.
//!
//! # Responsibility
//! - Decode a YAML (or JSON) document into an ordered list of action payloads.
//! - Turn one payload into a typed [`Action`] on demand.
//!
//! # Invariants
//! - Top-level decoding only reads the common envelope (`id`, `when`,
//!   `use_tz`, `action`); kind-specific fields stay raw until [`ActionPayload::decode`].
//! - Kind names are matched case-insensitively.
//! - Unknown fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use serde_yaml::{Mapping, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Read;

/// Document loading and action decoding failure.
#[derive(Debug)]
pub enum DocumentError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    /// Kind name is not one of the supported actions.
    UnsupportedAction(String),
    /// Kind-specific fields have the wrong shape.
    InvalidFields {
        kind: ActionKind,
        source: serde_yaml::Error,
    },
}

impl Display for DocumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read document: {err}"),
            Self::Yaml(err) => write!(f, "failed to decode document: {err}"),
            Self::UnsupportedAction(kind) => write!(f, "unsupported action: {kind}"),
            Self::InvalidFields { kind, source } => {
                write!(f, "invalid fields for {}: {source}", kind.as_str())
            }
        }
    }
}

impl Error for DocumentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Yaml(err) => Some(err),
            Self::UnsupportedAction(_) => None,
            Self::InvalidFields { source, .. } => Some(source),
        }
    }
}

impl From<std::io::Error> for DocumentError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_yaml::Error> for DocumentError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Yaml(value)
    }
}

/// One batch of actions.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub actions: Vec<ActionPayload>,
}

impl Document {
    pub fn from_yaml_str(text: &str) -> Result<Self, DocumentError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, DocumentError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::from_yaml_str(&text)
    }
}

/// Raw action envelope as written in the document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ActionPayload {
    /// Batch-local identifier later actions may reference.
    #[serde(default)]
    pub id: String,
    /// Only empty or `now` executes.
    #[serde(default)]
    pub when: String,
    #[serde(default)]
    pub use_tz: String,
    #[serde(default)]
    pub action: String,
    #[serde(flatten)]
    pub fields: Mapping,
}

impl ActionPayload {
    /// Whether the action is scheduled for immediate execution.
    pub fn is_due(&self) -> bool {
        let when = self.when.trim();
        when.is_empty() || when == "now"
    }

    pub fn kind(&self) -> Result<ActionKind, DocumentError> {
        ActionKind::parse(&self.action)
            .ok_or_else(|| DocumentError::UnsupportedAction(self.action.clone()))
    }

    /// Decodes the kind-specific fields into a typed action.
    pub fn decode(&self) -> Result<Action, DocumentError> {
        let kind = self.kind()?;
        let fields = Value::Mapping(self.fields.clone());
        let invalid = |source: serde_yaml::Error| DocumentError::InvalidFields { kind, source };

        let action = match kind {
            ActionKind::CreatePoll => {
                Action::CreatePoll(serde_yaml::from_value(fields).map_err(invalid)?)
            }
            ActionKind::AddSlots => {
                Action::AddSlots(serde_yaml::from_value(fields).map_err(invalid)?)
            }
            ActionKind::VoteSlot => {
                Action::VoteSlot(serde_yaml::from_value(fields).map_err(invalid)?)
            }
            ActionKind::FinalizePoll => {
                Action::FinalizePoll(serde_yaml::from_value(fields).map_err(invalid)?)
            }
            ActionKind::CreateEvent => {
                Action::CreateEvent(serde_yaml::from_value(fields).map_err(invalid)?)
            }
            ActionKind::ProposeTimes => {
                Action::ProposeTimes(serde_yaml::from_value(fields).map_err(invalid)?)
            }
            ActionKind::RescheduleEvent => {
                Action::RescheduleEvent(serde_yaml::from_value(fields).map_err(invalid)?)
            }
            ActionKind::SetConstraints => {
                Action::SetConstraints(serde_yaml::from_value(fields).map_err(invalid)?)
            }
            ActionKind::RemoveConstraints => {
                Action::RemoveConstraints(serde_yaml::from_value(fields).map_err(invalid)?)
            }
            ActionKind::SyncNow => Action::SyncNow,
        };
        Ok(action)
    }
}

/// Closed set of supported action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreatePoll,
    AddSlots,
    VoteSlot,
    FinalizePoll,
    CreateEvent,
    ProposeTimes,
    RescheduleEvent,
    SetConstraints,
    RemoveConstraints,
    SyncNow,
}

impl ActionKind {
    pub const ALL: [ActionKind; 10] = [
        Self::CreatePoll,
        Self::AddSlots,
        Self::VoteSlot,
        Self::FinalizePoll,
        Self::CreateEvent,
        Self::ProposeTimes,
        Self::RescheduleEvent,
        Self::SetConstraints,
        Self::RemoveConstraints,
        Self::SyncNow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreatePoll => "create_poll",
            Self::AddSlots => "add_slots",
            Self::VoteSlot => "vote_slot",
            Self::FinalizePoll => "finalize_poll",
            Self::CreateEvent => "create_event",
            Self::ProposeTimes => "propose_times",
            Self::RescheduleEvent => "reschedule_event",
            Self::SetConstraints => "set_constraints",
            Self::RemoveConstraints => "remove_constraints",
            Self::SyncNow => "sync_now",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
    }
}

impl Display for ActionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed action, one variant per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    CreatePoll(CreatePoll),
    AddSlots(AddSlots),
    VoteSlot(VoteSlot),
    FinalizePoll(FinalizePoll),
    CreateEvent(CreateEvent),
    ProposeTimes(ProposeTimes),
    RescheduleEvent(RescheduleEvent),
    SetConstraints(SetConstraints),
    RemoveConstraints(RemoveConstraints),
    SyncNow,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowSpec {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParticipantSpec {
    pub email: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConstraintSpec {
    pub kind: String,
    pub scope: Option<String>,
    pub payload: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SlotSpec {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct VoteSpec {
    /// Slot id, or the slot's start time.
    pub slot_ref: String,
    pub email: Option<String>,
    pub vote: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CreatePoll {
    pub title: String,
    pub strategy: Option<String>,
    pub quorum: i64,
    pub deadline: Option<String>,
    pub notes: Option<String>,
    pub duration: Option<String>,
    pub participants: Vec<ParticipantSpec>,
    pub candidate_windows: Vec<WindowSpec>,
    pub constraints: Vec<ConstraintSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AddSlots {
    pub poll_ref: Option<String>,
    pub slots: Vec<SlotSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct VoteSlot {
    pub poll_ref: Option<String>,
    pub votes: Vec<VoteSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FinalizePoll {
    pub poll_ref: Option<String>,
    /// Slot ids or slot start times, most preferred first.
    pub preferred_order: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CreateEvent {
    pub title: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub calendar_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProposeTimes {
    pub candidate_windows: Vec<WindowSpec>,
    pub duration: Option<String>,
    /// Zero or negative means unlimited.
    pub max_candidates: i64,
    /// Accepted for compatibility; free/busy lookup is not performed.
    pub include_freebusy: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RescheduleEvent {
    pub event_ref: Option<String>,
    pub candidate_windows: Vec<WindowSpec>,
    pub duration: Option<String>,
    /// Accepted for compatibility; has no effect.
    pub keep_participants: bool,
    /// Accepted for compatibility; has no effect.
    pub direction: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SetConstraints {
    pub scope: Option<String>,
    pub scope_ref: Option<String>,
    pub constraints: Vec<ConstraintSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RemoveConstraints {
    pub constraint_ids: Vec<String>,
}
