//! Batch execution engine.
//!
//! # Responsibility
//! - Apply an action document to a SQLite store and report per-action
//!   outcomes.
//! - Offer both commit modes: per-action (default) and whole-batch atomic.
//!
//! # Invariants
//! - [`apply_document`] keeps the writes of every action that finished before
//!   a failure.
//! - [`apply_document_atomically`] either commits every action or none.

pub mod config;
pub mod error;
pub mod executor;
pub mod outcome;
pub mod refs;

pub use config::ExecutorConfig;
pub use error::{ExecError, RunFailure};
pub use executor::Executor;
pub use outcome::ActionOutcome;
pub use refs::ReferenceMap;

use crate::document::Document;
use crate::repo::{RepoError, SqliteStore};
use log::{error, info};
use rusqlite::{Connection, TransactionBehavior};
use std::io::Write;

/// Applies `doc` with each action committing on its own.
///
/// On failure the returned [`RunFailure`] lists the actions whose writes were
/// kept.
pub fn apply_document(
    conn: &Connection,
    doc: &Document,
    config: &ExecutorConfig,
    output: &mut dyn Write,
) -> Result<Vec<ActionOutcome>, RunFailure> {
    let store = SqliteStore::new(conn);
    Executor::new(&store, config, output).run(doc)
}

/// Applies `doc` inside one immediate transaction.
///
/// Any failure rolls back every action of the batch; the returned
/// [`RunFailure`] then has `rolled_back` set.
pub fn apply_document_atomically(
    conn: &mut Connection,
    doc: &Document,
    config: &ExecutorConfig,
    output: &mut dyn Write,
) -> Result<Vec<ActionOutcome>, RunFailure> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| RunFailure::batch(RepoError::from(err).into(), Vec::new()))?;

    let result = {
        let store = SqliteStore::new(&tx);
        Executor::new(&store, config, output).run(doc)
    };

    match result {
        Ok(outcomes) => {
            tx.commit()
                .map_err(|err| RunFailure::batch(RepoError::from(err).into(), outcomes.clone()))?;
            info!(
                "event=run_commit module=engine status=ok actions={}",
                outcomes.len()
            );
            Ok(outcomes)
        }
        Err(mut failure) => {
            if let Err(err) = tx.rollback() {
                error!("event=run_commit module=engine status=error phase=rollback error={err}");
            }
            failure.rolled_back = true;
            info!(
                "event=run_commit module=engine status=rolled_back discarded={}",
                failure.completed.len()
            );
            Err(failure)
        }
    }
}
