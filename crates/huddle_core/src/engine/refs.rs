//! Batch-local reference resolution.
//!
//! # Invariants
//! - A map lives for exactly one run and is never shared between runs.
//! - Only executed actions with a non-empty id are recorded.
//! - A reference without a batch-local match is used as a literal store id.

use super::error::ExecError;
use super::outcome::ActionOutcome;
use crate::model::poll::Slot;
use crate::repo::PollRepository;
use crate::time::{parse_time, Zone};
use std::collections::HashMap;

/// Maps action ids to the outcomes they produced earlier in the run.
#[derive(Debug, Default)]
pub struct ReferenceMap {
    results: HashMap<String, ActionOutcome>,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome under its action id; blank ids are ignored.
    pub fn record(&mut self, outcome: &ActionOutcome) {
        if outcome.action_id.is_empty() {
            return;
        }
        self.results
            .insert(outcome.action_id.clone(), outcome.clone());
    }

    pub fn get(&self, action_id: &str) -> Option<&ActionOutcome> {
        self.results.get(action_id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Resolves `poll_ref` to the poll produced by an earlier action, or
    /// returns it verbatim.
    pub fn resolve_poll_ref(&self, reference: Option<&str>) -> Result<String, ExecError> {
        let reference = required(reference, "poll_ref")?;
        Ok(self
            .get(reference)
            .and_then(|outcome| outcome.poll_id.clone())
            .unwrap_or_else(|| reference.to_string()))
    }

    /// Resolves `event_ref` to the event produced by an earlier action, or
    /// returns it verbatim.
    pub fn resolve_event_ref(&self, reference: Option<&str>) -> Result<String, ExecError> {
        let reference = required(reference, "event_ref")?;
        Ok(self
            .get(reference)
            .and_then(|outcome| outcome.event_id.clone())
            .unwrap_or_else(|| reference.to_string()))
    }
}

/// Finds a poll's slot by id, or else by start time parsed in `zone`.
pub fn resolve_slot_ref<S>(
    store: &S,
    poll_id: &str,
    reference: &str,
    zone: &Zone,
) -> Result<Slot, ExecError>
where
    S: PollRepository + ?Sized,
{
    let reference = reference.trim();
    if let Some(slot) = store.get_slot(reference)? {
        if slot.poll_id == poll_id {
            return Ok(slot);
        }
    }

    if let Ok(start) = parse_time(reference, zone) {
        if let Some(slot) = store.get_slot_by_start(poll_id, &start)? {
            return Ok(slot);
        }
    }

    Err(ExecError::UnresolvedReference(reference.to_string()))
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, ExecError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ExecError::MissingField(field))
}
