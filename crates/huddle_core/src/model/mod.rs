//! Domain records for polls, calendar events and constraints.
//!
//! # Responsibility
//! - Define the canonical data structures persisted by the store.
//! - Own record-level validation (interval ordering, closed value sets).
//!
//! # Invariants
//! - Every record is identified by a UUID v4 string assigned at construction.
//! - Every interval-shaped record (window, slot, event) has `start < end`.
//! - Instants are kept in UTC.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod constraint;
pub mod event;
pub mod poll;

/// Record-level validation failure raised before any SQL mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelValidationError {
    /// Interval start is not strictly before its end.
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Vote value outside `yes|no|maybe`.
    InvalidVote(String),
    /// Constraint scope outside `user|event|poll`.
    InvalidScope(String),
    /// Participant or voter email is blank after trim.
    BlankEmail,
}

impl Display for ModelValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidWindow { start, end } => write!(
                f,
                "window start {} must be before end {}",
                format_utc(start),
                format_utc(end)
            ),
            Self::InvalidVote(value) => {
                write!(f, "unsupported vote `{value}`; expected yes|no|maybe")
            }
            Self::InvalidScope(value) => {
                write!(f, "unsupported constraint scope `{value}`; expected user|event|poll")
            }
            Self::BlankEmail => write!(f, "email must not be blank"),
        }
    }
}

impl Error for ModelValidationError {}

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    /// Builds an interval, rejecting `start >= end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ModelValidationError> {
        validate_interval(start, end)?;
        Ok(Self { start, end })
    }
}

/// Shared ordering check for windows, slots and events.
pub fn validate_interval(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(), ModelValidationError> {
    if start < end {
        Ok(())
    } else {
        Err(ModelValidationError::InvalidWindow { start, end })
    }
}

/// Formats an instant as RFC3339 in UTC with second precision.
pub fn format_utc(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}
