//! Core scheduling logic for huddle.
//!
//! Applies declarative action documents (polls, slots, votes, events,
//! constraints) to a SQLite store.

pub mod algo;
pub mod db;
pub mod document;
pub mod engine;
pub mod logging;
pub mod model;
pub mod repo;
pub mod time;

pub use db::{open_db, open_db_in_memory, DbError};
pub use document::{Action, ActionKind, ActionPayload, Document, DocumentError};
pub use engine::{
    apply_document, apply_document_atomically, ActionOutcome, ExecError, Executor,
    ExecutorConfig, RunFailure,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use repo::{RepoError, RepoResult, SqliteStore, Store};
