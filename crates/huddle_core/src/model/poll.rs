//! Poll aggregate: the poll itself plus its participants, availability
//! windows, candidate slots and votes.
//!
//! # Invariants
//! - Participants are unique per `(poll, email)`; re-adding updates the role.
//! - Slots are unique per `(poll, start)`.
//! - Votes are unique per `(slot, email)`; re-voting overwrites.
//! - `status` only moves `Draft -> Finalized`, pinning `event_id`.

use super::event::EventId;
use super::{new_record_id, validate_interval, ModelValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type PollId = String;
pub type SlotId = String;
pub type WindowId = String;

/// Voting strategy recorded when a poll does not name one.
pub const DEFAULT_STRATEGY: &str = "approval";
/// Participant role recorded when a participant does not name one.
pub const DEFAULT_ROLE: &str = "required";

/// Poll lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    /// Collecting slots and votes.
    Draft,
    /// Winning slot chosen and turned into an event.
    Finalized,
}

impl PollStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Finalized => "finalized",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "finalized" => Some(Self::Finalized),
            _ => None,
        }
    }
}

/// A named negotiation over candidate time slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub title: String,
    /// Free-form strategy tag, e.g. `approval`.
    pub strategy: String,
    pub quorum: i64,
    pub deadline: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// Intended meeting length in whole minutes (0 when unspecified).
    pub duration_minutes: i64,
    pub status: PollStatus,
    /// Event produced by finalization.
    pub event_id: Option<EventId>,
}

impl Poll {
    /// Creates a draft poll with a generated id and default strategy.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: new_record_id(),
            title: title.into(),
            strategy: DEFAULT_STRATEGY.to_string(),
            quorum: 0,
            deadline: None,
            notes: None,
            duration_minutes: 0,
            status: PollStatus::Draft,
            event_id: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.status == PollStatus::Finalized
    }
}

/// Poll-scoped invitee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub poll_id: PollId,
    pub email: String,
    pub role: String,
}

impl Participant {
    /// Creates a participant; a blank role falls back to [`DEFAULT_ROLE`].
    pub fn new(poll_id: impl Into<PollId>, email: impl Into<String>, role: Option<&str>) -> Self {
        let role = role
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_ROLE);
        Self {
            id: new_record_id(),
            poll_id: poll_id.into(),
            email: email.into(),
            role: role.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if self.email.trim().is_empty() {
            return Err(ModelValidationError::BlankEmail);
        }
        Ok(())
    }
}

/// Poll-scoped availability interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub id: WindowId,
    pub poll_id: PollId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(poll_id: impl Into<PollId>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(),
            poll_id: poll_id.into(),
            start,
            end,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        validate_interval(self.start, self.end)
    }
}

/// Concrete candidate meeting time attached to a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub poll_id: PollId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Set by the store on insert; `None` for records not yet persisted.
    pub created_at: Option<DateTime<Utc>>,
}

impl Slot {
    pub fn new(poll_id: impl Into<PollId>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(),
            poll_id: poll_id.into(),
            start,
            end,
            created_at: None,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        validate_interval(self.start, self.end)
    }
}

/// Voter answer for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Yes,
    No,
    Maybe,
}

impl VoteChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Maybe => "maybe",
        }
    }

    /// Parses a vote value case-insensitively.
    pub fn parse(value: &str) -> Result<Self, ModelValidationError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "maybe" => Ok(Self::Maybe),
            _ => Err(ModelValidationError::InvalidVote(value.to_string())),
        }
    }
}

/// One voter's answer for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: String,
    pub poll_id: PollId,
    pub slot_id: SlotId,
    pub email: String,
    pub choice: VoteChoice,
    pub comment: Option<String>,
}

impl Vote {
    pub fn new(
        poll_id: impl Into<PollId>,
        slot_id: impl Into<SlotId>,
        email: impl Into<String>,
        choice: VoteChoice,
    ) -> Self {
        Self {
            id: new_record_id(),
            poll_id: poll_id.into(),
            slot_id: slot_id.into(),
            email: email.into(),
            choice,
            comment: None,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if self.email.trim().is_empty() {
            return Err(ModelValidationError::BlankEmail);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Participant, Poll, PollStatus, VoteChoice, DEFAULT_ROLE, DEFAULT_STRATEGY};
    use crate::model::ModelValidationError;

    #[test]
    fn new_poll_is_draft_with_default_strategy() {
        let poll = Poll::new("Team sync");
        assert_eq!(poll.status, PollStatus::Draft);
        assert_eq!(poll.strategy, DEFAULT_STRATEGY);
        assert!(poll.event_id.is_none());
        assert!(!poll.is_finalized());
    }

    #[test]
    fn participant_role_defaults_when_blank() {
        let blank = Participant::new("p1", "a@example.com", Some("  "));
        assert_eq!(blank.role, DEFAULT_ROLE);
        let optional = Participant::new("p1", "b@example.com", Some("optional"));
        assert_eq!(optional.role, "optional");
    }

    #[test]
    fn vote_choice_parses_case_insensitively() {
        assert_eq!(VoteChoice::parse("YES").unwrap(), VoteChoice::Yes);
        assert_eq!(VoteChoice::parse(" Maybe ").unwrap(), VoteChoice::Maybe);
        let err = VoteChoice::parse("perhaps").unwrap_err();
        assert_eq!(err, ModelValidationError::InvalidVote("perhaps".to_string()));
    }

    #[test]
    fn poll_status_roundtrips_through_db_text() {
        for status in [PollStatus::Draft, PollStatus::Finalized] {
            assert_eq!(PollStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PollStatus::parse("archived"), None);
    }
}
