//! Repository layer: the only code that touches persistent storage.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts per aggregate.
//! - Isolate SQLite query details from the action engine.
//!
//! # Invariants
//! - Write paths call the record's `validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Single-row writes are not wrapped in explicit transactions; callers that
//!   need batch atomicity open one on the connection themselves.

use crate::db::DbError;
use crate::model::ModelValidationError;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod constraint_repo;
pub mod event_repo;
pub mod poll_repo;

pub use constraint_repo::ConstraintRepository;
pub use event_repo::EventRepository;
pub use poll_repo::PollRepository;

pub type RepoResult<T> = Result<T, RepoError>;

/// Entity names used in `NotFound` errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Poll,
    Event,
}

impl Entity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Event => "event",
        }
    }
}

/// Repository error for scheduling persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ModelValidationError),
    Db(DbError),
    NotFound {
        entity: Entity,
        id: String,
    },
    /// A slot with the same start already exists in the poll.
    DuplicateSlot {
        poll_id: String,
        start: DateTime<Utc>,
    },
    /// Finalization attempted on a poll that is no longer a draft.
    PollAlreadyFinalized(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{} not found: {id}", entity.as_str()),
            Self::DuplicateSlot { poll_id, start } => write!(
                f,
                "poll {poll_id} already has a slot starting at {}",
                crate::model::format_utc(start)
            ),
            Self::PollAlreadyFinalized(id) => write!(f, "poll already finalized: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound { .. } => None,
            Self::DuplicateSlot { .. } => None,
            Self::PollAlreadyFinalized(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ModelValidationError> for RepoError {
    fn from(value: ModelValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Everything the action engine needs from persistence.
pub trait Store: PollRepository + EventRepository + ConstraintRepository {}

impl<T: PollRepository + EventRepository + ConstraintRepository> Store for T {}

/// SQLite-backed store over a migrated connection.
///
/// Borrowing a `Transaction` (via deref) is how batch-atomic runs share one
/// transaction across every repository call.
pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

pub(crate) fn to_epoch_ms(value: &DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

pub(crate) fn from_epoch_ms(value: i64, column: &str) -> RepoResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value).ok_or_else(|| {
        RepoError::InvalidData(format!("timestamp `{value}` out of range in {column}"))
    })
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            failure.code == ErrorCode::ConstraintViolation
                && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}
