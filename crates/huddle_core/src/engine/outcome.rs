//! Per-action run results.

use crate::algo::Candidate;
use serde::Serialize;

/// What one action did. The ordered list of outcomes is the authoritative
/// record of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub action_id: String,
    /// Canonical kind name, or the raw name for skipped unknown kinds.
    pub kind: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub slot_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constraint_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<Candidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<usize>,
    pub summary: String,
}

impl ActionOutcome {
    pub fn new(action_id: &str, kind: &str, summary: impl Into<String>) -> Self {
        Self {
            action_id: action_id.to_string(),
            kind: kind.to_string(),
            summary: summary.into(),
            ..Self::default()
        }
    }

    /// Outcome for an action not scheduled for immediate execution.
    pub fn skipped(action_id: &str, kind: &str) -> Self {
        Self {
            skipped: true,
            ..Self::new(action_id, kind, "skipped (when != now)")
        }
    }
}
