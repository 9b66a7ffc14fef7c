//! Typed scheduling preference scoped to a user, a poll or an event.

use super::{new_record_id, ModelValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type ConstraintId = String;

/// What a constraint applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintScope {
    User,
    Event,
    Poll,
}

impl ConstraintScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Event => "event",
            Self::Poll => "poll",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ModelValidationError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "event" => Ok(Self::Event),
            "poll" => Ok(Self::Poll),
            _ => Err(ModelValidationError::InvalidScope(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub id: ConstraintId,
    pub scope: ConstraintScope,
    /// Id of the scoped entity; usually `None` for user scope.
    pub scope_ref: Option<String>,
    /// Free-form tag, e.g. `no_meetings_before`.
    pub kind: String,
    /// Structured key/value data, persisted as JSON text.
    pub payload: Map<String, Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Constraint {
    pub fn new(
        scope: ConstraintScope,
        scope_ref: Option<String>,
        kind: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            id: new_record_id(),
            scope,
            scope_ref,
            kind: kind.into(),
            payload,
            created_at: None,
        }
    }
}
