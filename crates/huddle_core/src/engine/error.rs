//! Engine error types.
//!
//! [`ExecError`] describes why one action failed; [`RunFailure`] is what a
//! batch run returns: the failing action, its cause and everything that
//! completed before it.

use super::outcome::ActionOutcome;
use crate::document::DocumentError;
use crate::model::{format_utc, ModelValidationError};
use crate::repo::RepoError;
use crate::time::TimeError;
use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failure of a single action.
#[derive(Debug)]
pub enum ExecError {
    /// A zone, timestamp or duration field could not be parsed.
    Time { field: String, source: TimeError },
    Repo(RepoError),
    Validation(ModelValidationError),
    /// Kind-specific fields have the wrong shape.
    InvalidAction(DocumentError),
    MissingField(&'static str),
    /// A slot reference matched neither a slot id nor a slot start.
    UnresolvedReference(String),
    NoSlotsToFinalize(String),
    /// The requested meeting runs past the end of the window.
    DurationDoesNotFit {
        required_end: DateTime<Utc>,
        window_end: DateTime<Utc>,
    },
    UnsupportedAction(String),
    /// Writing to the run's output stream failed.
    Output(std::io::Error),
}

impl ExecError {
    pub(crate) fn time(field: impl Into<String>, source: TimeError) -> Self {
        Self::Time {
            field: field.into(),
            source,
        }
    }
}

impl Display for ExecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Time { field, source } => write!(f, "parse {field}: {source}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidAction(err) => write!(f, "{err}"),
            Self::MissingField(field) => write!(f, "{field} required"),
            Self::UnresolvedReference(reference) => {
                write!(f, "cannot resolve slot_ref: {reference}")
            }
            Self::NoSlotsToFinalize(poll_id) => write!(f, "no slots to finalize for poll {poll_id}"),
            Self::DurationDoesNotFit {
                required_end,
                window_end,
            } => write!(
                f,
                "duration doesn't fit into window (needs until {}, window ends {})",
                format_utc(required_end),
                format_utc(window_end)
            ),
            Self::UnsupportedAction(kind) => write!(f, "unsupported action: {kind}"),
            Self::Output(err) => write!(f, "failed to write run output: {err}"),
        }
    }
}

impl Error for ExecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Time { source, .. } => Some(source),
            Self::Repo(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::InvalidAction(err) => Some(err),
            Self::Output(err) => Some(err),
            Self::MissingField(_)
            | Self::UnresolvedReference(_)
            | Self::NoSlotsToFinalize(_)
            | Self::DurationDoesNotFit { .. }
            | Self::UnsupportedAction(_) => None,
        }
    }
}

impl From<RepoError> for ExecError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<ModelValidationError> for ExecError {
    fn from(value: ModelValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DocumentError> for ExecError {
    fn from(value: DocumentError) -> Self {
        match value {
            DocumentError::UnsupportedAction(kind) => Self::UnsupportedAction(kind),
            other => Self::InvalidAction(other),
        }
    }
}

impl From<std::io::Error> for ExecError {
    fn from(value: std::io::Error) -> Self {
        Self::Output(value)
    }
}

/// Batch-level failure.
#[derive(Debug)]
pub struct RunFailure {
    /// Zero-based position of the failing action; `None` when the batch
    /// itself (transaction begin/commit) failed.
    pub index: Option<usize>,
    /// The failing action's own identifier (may be empty).
    pub action_id: String,
    /// Action kind as written in the document.
    pub kind: String,
    pub error: ExecError,
    /// Outcomes of the actions that finished before the failure.
    pub completed: Vec<ActionOutcome>,
    /// Whether the completed actions were rolled back.
    pub rolled_back: bool,
}

impl RunFailure {
    pub(crate) fn batch(error: ExecError, completed: Vec<ActionOutcome>) -> Self {
        Self {
            index: None,
            action_id: String::new(),
            kind: String::new(),
            error,
            completed,
            rolled_back: true,
        }
    }
}

impl Display for RunFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.index {
            Some(index) => write!(
                f,
                "action #{} id={:?} op={}: {}",
                index + 1,
                self.action_id,
                self.kind,
                self.error
            ),
            None => write!(f, "batch failed: {}", self.error),
        }
    }
}

impl Error for RunFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}
