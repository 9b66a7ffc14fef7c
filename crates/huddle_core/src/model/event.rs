//! Calendar event record.
//!
//! Events are created directly, by poll finalization, and mutated in place by
//! rescheduling (identity is preserved).

use super::{new_record_id, validate_interval, ModelValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type EventId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
    pub notes: Option<String>,
    /// Opaque reference into an external calendar.
    pub calendar_ref: Option<String>,
}

impl Event {
    pub fn new(title: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(),
            title: title.into(),
            start,
            end,
            location: None,
            notes: None,
            calendar_ref: None,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        validate_interval(self.start, self.end)
    }
}
