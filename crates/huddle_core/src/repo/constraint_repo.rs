//! Constraint persistence.
//!
//! # Responsibility
//! - Store typed constraint records with their payload as JSON text.
//! - Delete constraints by id in batches of bound `IN (...)` statements.
//!
//! # Invariants
//! - Deleting unknown ids is not an error; the affected row count is returned.
//! - A bulk delete is all-or-nothing, however many batches it takes.

use super::{from_epoch_ms, RepoError, RepoResult, SqliteStore};
use crate::model::constraint::{Constraint, ConstraintId, ConstraintScope};
use rusqlite::{params, params_from_iter, Row};
use serde_json::{Map, Value};

/// Ids bound per `DELETE` statement, well under SQLite's variable limit.
const DELETE_BATCH_SIZE: usize = 500;

/// Repository interface for scheduling constraints.
pub trait ConstraintRepository {
    fn insert_constraint(&self, constraint: &Constraint) -> RepoResult<ConstraintId>;
    fn get_constraint(&self, id: &str) -> RepoResult<Option<Constraint>>;
    /// Lists constraints in one scope, optionally narrowed to a single ref.
    fn list_constraints(
        &self,
        scope: ConstraintScope,
        scope_ref: Option<&str>,
    ) -> RepoResult<Vec<Constraint>>;
    /// Deletes every listed id, returning how many rows were removed.
    fn delete_constraints(&self, ids: &[String]) -> RepoResult<usize>;
}

impl ConstraintRepository for SqliteStore<'_> {
    fn insert_constraint(&self, constraint: &Constraint) -> RepoResult<ConstraintId> {
        let payload = serde_json::to_string(&constraint.payload).map_err(|err| {
            RepoError::InvalidData(format!("constraint payload is not serializable: {err}"))
        })?;

        self.conn.execute(
            "INSERT INTO constraints (id, scope, scope_ref, kind, payload)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                constraint.id.as_str(),
                constraint.scope.as_str(),
                constraint.scope_ref.as_deref(),
                constraint.kind.as_str(),
                payload,
            ],
        )?;
        Ok(constraint.id.clone())
    }

    fn get_constraint(&self, id: &str) -> RepoResult<Option<Constraint>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, scope, scope_ref, kind, payload, created_at
             FROM constraints
             WHERE id = ?1;",
        )?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_constraint_row(row)?));
        }
        Ok(None)
    }

    fn list_constraints(
        &self,
        scope: ConstraintScope,
        scope_ref: Option<&str>,
    ) -> RepoResult<Vec<Constraint>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, scope, scope_ref, kind, payload, created_at
             FROM constraints
             WHERE scope = ?1
               AND (?2 IS NULL OR scope_ref = ?2)
             ORDER BY created_at ASC, id ASC;",
        )?;
        let mut rows = stmt.query(params![scope.as_str(), scope_ref])?;
        let mut constraints = Vec::new();
        while let Some(row) = rows.next()? {
            constraints.push(parse_constraint_row(row)?);
        }
        Ok(constraints)
    }

    fn delete_constraints(&self, ids: &[String]) -> RepoResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.conn.execute_batch("SAVEPOINT delete_constraints;")?;
        match self.delete_constraint_batches(ids) {
            Ok(removed) => {
                self.conn.execute_batch("RELEASE delete_constraints;")?;
                Ok(removed)
            }
            Err(err) => {
                self.conn.execute_batch(
                    "ROLLBACK TO delete_constraints; RELEASE delete_constraints;",
                )?;
                Err(err)
            }
        }
    }
}

impl SqliteStore<'_> {
    fn delete_constraint_batches(&self, ids: &[String]) -> RepoResult<usize> {
        let mut removed = 0;
        for batch in ids.chunks(DELETE_BATCH_SIZE) {
            let placeholders = (1..=batch.len())
                .map(|index| format!("?{index}"))
                .collect::<Vec<_>>()
                .join(", ");
            removed += self.conn.execute(
                &format!("DELETE FROM constraints WHERE id IN ({placeholders});"),
                params_from_iter(batch.iter()),
            )?;
        }
        Ok(removed)
    }
}

fn parse_constraint_row(row: &Row<'_>) -> RepoResult<Constraint> {
    let scope_text: String = row.get("scope")?;
    let scope = ConstraintScope::parse(&scope_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid scope `{scope_text}` in constraints.scope"
        ))
    })?;

    let payload_text: String = row.get("payload")?;
    let payload: Map<String, Value> = serde_json::from_str(&payload_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid JSON in constraints.payload: {err}"))
    })?;

    Ok(Constraint {
        id: row.get("id")?,
        scope,
        scope_ref: row.get("scope_ref")?,
        kind: row.get("kind")?,
        payload,
        created_at: Some(from_epoch_ms(row.get("created_at")?, "constraints.created_at")?),
    })
}
