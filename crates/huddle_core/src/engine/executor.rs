//! Action dispatcher.
//!
//! # Responsibility
//! - Walk a document's actions in order and run each due one against a store.
//! - Thread the run's [`ReferenceMap`] through every handler.
//!
//! # Invariants
//! - Actions not due now produce a skipped outcome and touch nothing.
//! - The first failing action stops the run; earlier outcomes are returned
//!   with the failure.
//! - Instants reach the store in UTC.

use super::config::ExecutorConfig;
use super::error::{ExecError, RunFailure};
use super::outcome::ActionOutcome;
use super::refs::{resolve_slot_ref, ReferenceMap};
use crate::algo::{self, fit_at_window_start, generate_candidates, SlotTally};
use crate::document::{
    Action, ActionKind, ActionPayload, AddSlots, CreateEvent, CreatePoll, Document, FinalizePoll,
    ProposeTimes, RemoveConstraints, RescheduleEvent, SetConstraints, VoteSlot, WindowSpec,
};
use crate::model::constraint::{Constraint, ConstraintScope};
use crate::model::event::Event;
use crate::model::format_utc;
use crate::model::poll::{Participant, Poll, Slot, Vote, VoteChoice, Window};
use crate::model::Interval;
use crate::repo::{Entity, RepoError, Store};
use crate::time::{format_duration, parse_duration, parse_time, resolve_zone, TimeError, Zone};
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info};
use std::io::Write;
use std::time::Instant;

type ExecResult<T> = Result<T, ExecError>;

/// Runs documents against a store.
///
/// Candidate lists from `propose_times` are also written to `output`.
pub struct Executor<'a, S: Store + ?Sized> {
    store: &'a S,
    config: &'a ExecutorConfig,
    output: &'a mut dyn Write,
}

impl<'a, S: Store + ?Sized> Executor<'a, S> {
    pub fn new(store: &'a S, config: &'a ExecutorConfig, output: &'a mut dyn Write) -> Self {
        Self {
            store,
            config,
            output,
        }
    }

    /// Applies every action of `doc` in order.
    ///
    /// # Errors
    /// Returns [`RunFailure`] for the first failing action, carrying the
    /// outcomes of the actions completed before it.
    pub fn run(&mut self, doc: &Document) -> Result<Vec<ActionOutcome>, RunFailure> {
        let started_at = Instant::now();
        info!(
            "event=run module=engine status=start version={:?} actions={}",
            doc.version,
            doc.actions.len()
        );

        let mut refs = ReferenceMap::new();
        let mut outcomes = Vec::with_capacity(doc.actions.len());
        let mut skipped = 0usize;

        for (index, payload) in doc.actions.iter().enumerate() {
            let kind_label = kind_label(payload);
            if !payload.is_due() {
                info!(
                    "event=action module=engine status=skipped index={} id={:?} kind={} when={:?}",
                    index, payload.id, kind_label, payload.when
                );
                skipped += 1;
                outcomes.push(ActionOutcome::skipped(&payload.id, &kind_label));
                continue;
            }

            let action_started_at = Instant::now();
            match self.execute(payload, &refs) {
                Ok(outcome) => {
                    info!(
                        "event=action module=engine status=ok index={} id={:?} kind={} duration_ms={}",
                        index,
                        payload.id,
                        kind_label,
                        action_started_at.elapsed().as_millis()
                    );
                    refs.record(&outcome);
                    outcomes.push(outcome);
                }
                Err(err) => {
                    error!(
                        "event=action module=engine status=error index={} id={:?} kind={} duration_ms={} error={}",
                        index,
                        payload.id,
                        kind_label,
                        action_started_at.elapsed().as_millis(),
                        err
                    );
                    error!(
                        "event=run module=engine status=error completed={} duration_ms={}",
                        outcomes.len(),
                        started_at.elapsed().as_millis()
                    );
                    return Err(RunFailure {
                        index: Some(index),
                        action_id: payload.id.clone(),
                        kind: payload.action.clone(),
                        error: err,
                        completed: outcomes,
                        rolled_back: false,
                    });
                }
            }
        }

        info!(
            "event=run module=engine status=ok actions={} skipped={} refs={} duration_ms={}",
            outcomes.len(),
            skipped,
            refs.len(),
            started_at.elapsed().as_millis()
        );
        Ok(outcomes)
    }

    fn execute(&mut self, payload: &ActionPayload, refs: &ReferenceMap) -> ExecResult<ActionOutcome> {
        let zone = self.zone_for(payload)?;
        let action = payload.decode()?;
        let id = payload.id.as_str();

        match action {
            Action::CreatePoll(spec) => self.create_poll(id, spec, &zone),
            Action::AddSlots(spec) => self.add_slots(id, spec, &zone, refs),
            Action::VoteSlot(spec) => self.vote_slot(id, spec, &zone, refs),
            Action::FinalizePoll(spec) => self.finalize_poll(id, spec, &zone, refs),
            Action::CreateEvent(spec) => self.create_event(id, spec, &zone),
            Action::ProposeTimes(spec) => self.propose_times(id, spec, &zone),
            Action::RescheduleEvent(spec) => self.reschedule_event(id, spec, &zone, refs),
            Action::SetConstraints(spec) => self.set_constraints(id, spec),
            Action::RemoveConstraints(spec) => self.remove_constraints(id, spec),
            Action::SyncNow => Ok(ActionOutcome::new(
                id,
                ActionKind::SyncNow.as_str(),
                "sync simulated (no-op)",
            )),
        }
    }

    fn zone_for(&self, payload: &ActionPayload) -> ExecResult<Zone> {
        let name = if payload.use_tz.trim().is_empty() {
            self.config.default_zone.as_str()
        } else {
            payload.use_tz.as_str()
        };
        resolve_zone(name).map_err(|err| ExecError::time("use_tz", err))
    }

    fn create_poll(&mut self, id: &str, spec: CreatePoll, zone: &Zone) -> ExecResult<ActionOutcome> {
        let duration_minutes = match non_blank(spec.duration.as_deref()) {
            Some(text) => parse_duration(text)
                .map_err(|err| ExecError::time("duration", err))?
                .num_minutes(),
            None => 0,
        };
        let deadline = match non_blank(spec.deadline.as_deref()) {
            Some(text) => Some(parse_field(text, zone, "deadline")?),
            None => None,
        };

        let mut poll = Poll::new(spec.title);
        poll.strategy = non_blank(spec.strategy.as_deref())
            .unwrap_or(self.config.default_strategy.as_str())
            .to_string();
        poll.quorum = spec.quorum;
        poll.deadline = deadline;
        poll.notes = spec.notes;
        poll.duration_minutes = duration_minutes;
        let poll_id = self.store.create_poll(&poll)?;

        for participant in &spec.participants {
            let participant =
                Participant::new(&poll_id, participant.email.trim(), participant.role.as_deref());
            self.store.upsert_participant(&participant)?;
        }

        for (index, window) in spec.candidate_windows.iter().enumerate() {
            let interval = parse_window(window, zone, &format!("candidate_windows[{index}]"))?;
            self.store
                .add_window(&Window::new(&poll_id, interval.start, interval.end))?;
        }

        let mut constraint_ids = Vec::with_capacity(spec.constraints.len());
        for constraint in spec.constraints {
            let record = Constraint::new(
                ConstraintScope::Poll,
                Some(poll_id.clone()),
                constraint.kind,
                constraint.payload,
            );
            constraint_ids.push(self.store.insert_constraint(&record)?);
        }

        let mut outcome = ActionOutcome::new(
            id,
            ActionKind::CreatePoll.as_str(),
            format!("poll created: {poll_id}"),
        );
        outcome.poll_id = Some(poll_id);
        outcome.constraint_ids = constraint_ids;
        Ok(outcome)
    }

    fn add_slots(
        &mut self,
        id: &str,
        spec: AddSlots,
        zone: &Zone,
        refs: &ReferenceMap,
    ) -> ExecResult<ActionOutcome> {
        let poll_id = refs.resolve_poll_ref(spec.poll_ref.as_deref())?;
        self.require_poll(&poll_id)?;

        let mut slot_ids = Vec::with_capacity(spec.slots.len());
        for (index, slot) in spec.slots.iter().enumerate() {
            let start = parse_field(&slot.start, zone, &format!("slots[{index}].start"))?;
            let end = parse_field(&slot.end, zone, &format!("slots[{index}].end"))?;
            slot_ids.push(self.store.add_slot(&Slot::new(&poll_id, start, end))?);
        }

        let mut outcome = ActionOutcome::new(
            id,
            ActionKind::AddSlots.as_str(),
            format!("slots added: {}", slot_ids.len()),
        );
        outcome.poll_id = Some(poll_id);
        outcome.slot_ids = slot_ids;
        Ok(outcome)
    }

    fn vote_slot(
        &mut self,
        id: &str,
        spec: VoteSlot,
        zone: &Zone,
        refs: &ReferenceMap,
    ) -> ExecResult<ActionOutcome> {
        let poll_id = refs.resolve_poll_ref(spec.poll_ref.as_deref())?;
        self.require_poll(&poll_id)?;

        let mut recorded = 0usize;
        for vote in spec.votes {
            let slot = resolve_slot_ref(self.store, &poll_id, &vote.slot_ref, zone)?;
            let choice = VoteChoice::parse(&vote.vote)?;
            let email = non_blank(vote.email.as_deref())
                .unwrap_or(self.config.unknown_voter_email.as_str())
                .to_string();

            let mut record = Vote::new(&poll_id, slot.id, email, choice);
            record.comment = vote.comment;
            self.store.upsert_vote(&record)?;
            recorded += 1;
        }

        let mut outcome = ActionOutcome::new(
            id,
            ActionKind::VoteSlot.as_str(),
            format!("votes recorded: {recorded}"),
        );
        outcome.poll_id = Some(poll_id);
        Ok(outcome)
    }

    fn finalize_poll(
        &mut self,
        id: &str,
        spec: FinalizePoll,
        zone: &Zone,
        refs: &ReferenceMap,
    ) -> ExecResult<ActionOutcome> {
        let poll_id = refs.resolve_poll_ref(spec.poll_ref.as_deref())?;
        let poll = self.require_poll(&poll_id)?;
        if poll.is_finalized() {
            return Err(RepoError::PollAlreadyFinalized(poll_id).into());
        }

        let slots = self.store.list_slots(&poll_id)?;
        if slots.is_empty() {
            return Err(ExecError::NoSlotsToFinalize(poll_id));
        }

        let preferred = algo::pick_preferred(&slots, &spec.preferred_order, zone).cloned();
        let (chosen, summary) = match preferred {
            Some(slot) => {
                let summary = format!("finalized with preferred slot {}", slot.id);
                (slot, summary)
            }
            None => {
                let mut tallies = Vec::with_capacity(slots.len());
                for slot in slots {
                    let yes = self.store.count_yes_votes(&slot.id)?;
                    tallies.push(SlotTally { slot, yes });
                }
                let top = algo::pick_top_voted(&tallies)
                    .ok_or_else(|| ExecError::NoSlotsToFinalize(poll_id.clone()))?;
                let summary = format!("finalized with slot {} (yes={})", top.slot.id, top.yes);
                (top.slot.clone(), summary)
            }
        };

        let title = if poll.title.trim().is_empty() {
            format!("Poll {poll_id}")
        } else {
            poll.title.clone()
        };
        let event_id = self
            .store
            .create_event(&Event::new(title, chosen.start, chosen.end))?;
        self.store.finalize_poll(&poll_id, &event_id)?;
        info!(
            "event=finalize_poll module=engine status=ok poll_id={} slot_id={} event_id={}",
            poll_id, chosen.id, event_id
        );

        let mut outcome = ActionOutcome::new(id, ActionKind::FinalizePoll.as_str(), summary);
        outcome.poll_id = Some(poll_id);
        outcome.slot_ids = vec![chosen.id];
        outcome.event_id = Some(event_id);
        Ok(outcome)
    }

    fn create_event(&mut self, id: &str, spec: CreateEvent, zone: &Zone) -> ExecResult<ActionOutcome> {
        let start = non_blank(spec.start.as_deref()).ok_or(ExecError::MissingField("start"))?;
        let end = non_blank(spec.end.as_deref()).ok_or(ExecError::MissingField("end"))?;
        let start = parse_field(start, zone, "start")?;
        let end = parse_field(end, zone, "end")?;

        let mut event = Event::new(spec.title, start, end);
        event.location = spec.location;
        event.notes = spec.notes;
        event.calendar_ref = spec.calendar_ref;
        let event_id = self.store.create_event(&event)?;

        let mut outcome = ActionOutcome::new(
            id,
            ActionKind::CreateEvent.as_str(),
            format!("event created: {event_id}"),
        );
        outcome.event_id = Some(event_id);
        Ok(outcome)
    }

    fn propose_times(&mut self, id: &str, spec: ProposeTimes, zone: &Zone) -> ExecResult<ActionOutcome> {
        if spec.candidate_windows.is_empty() {
            return Err(ExecError::MissingField("candidate_windows"));
        }
        let duration = self.duration_or(spec.duration.as_deref(), self.config.default_propose_duration)?;
        // Not order-checked: an inverted window yields no candidates.
        let windows = spec
            .candidate_windows
            .iter()
            .enumerate()
            .map(|(index, window)| parse_bounds(window, zone, &format!("candidate_windows[{index}]")))
            .collect::<ExecResult<Vec<_>>>()?;
        if spec.include_freebusy {
            debug!("event=propose_times module=engine status=ignored field=include_freebusy");
        }

        let max = usize::try_from(spec.max_candidates)
            .ok()
            .filter(|max| *max > 0);
        let candidates = generate_candidates(&windows, duration, self.config.candidate_step, max);
        info!(
            "event=propose_times module=engine status=ok windows={} duration={} count={}",
            windows.len(),
            format_duration(duration),
            candidates.len()
        );

        writeln!(self.output, "propose_times candidates:")?;
        serde_json::to_writer_pretty(&mut *self.output, &candidates).map_err(std::io::Error::from)?;
        writeln!(self.output)?;

        let mut outcome = ActionOutcome::new(
            id,
            ActionKind::ProposeTimes.as_str(),
            format!("candidates={}", candidates.len()),
        );
        outcome.candidates = candidates;
        Ok(outcome)
    }

    fn reschedule_event(
        &mut self,
        id: &str,
        spec: RescheduleEvent,
        zone: &Zone,
        refs: &ReferenceMap,
    ) -> ExecResult<ActionOutcome> {
        let event_id = refs.resolve_event_ref(spec.event_ref.as_deref())?;
        let first = spec
            .candidate_windows
            .first()
            .ok_or(ExecError::MissingField("candidate_windows"))?;
        let window = parse_window(first, zone, "candidate_windows[0]")?;
        let duration =
            self.duration_or(spec.duration.as_deref(), self.config.default_reschedule_duration)?;
        if spec.keep_participants || spec.direction.is_some() {
            debug!(
                "event=reschedule_event module=engine status=ignored keep_participants={} direction={:?}",
                spec.keep_participants, spec.direction
            );
        }

        let fitted =
            fit_at_window_start(&window, duration).ok_or(ExecError::DurationDoesNotFit {
                required_end: window.start + duration,
                window_end: window.end,
            })?;
        if self.store.get_event(&event_id)?.is_none() {
            return Err(RepoError::NotFound {
                entity: Entity::Event,
                id: event_id,
            }
            .into());
        }
        self.store
            .update_event_times(&event_id, &fitted.start, &fitted.end)?;

        let mut outcome = ActionOutcome::new(
            id,
            ActionKind::RescheduleEvent.as_str(),
            format!(
                "event {event_id} rescheduled to {} - {}",
                format_utc(&fitted.start),
                format_utc(&fitted.end)
            ),
        );
        outcome.event_id = Some(event_id);
        Ok(outcome)
    }

    fn set_constraints(&mut self, id: &str, spec: SetConstraints) -> ExecResult<ActionOutcome> {
        let scope_ref = non_blank(spec.scope_ref.as_deref()).map(str::to_string);
        let mut constraint_ids = Vec::with_capacity(spec.constraints.len());
        for constraint in spec.constraints {
            let scope_text = non_blank(constraint.scope.as_deref())
                .or_else(|| non_blank(spec.scope.as_deref()))
                .unwrap_or("user");
            let scope = ConstraintScope::parse(scope_text)?;
            let record = Constraint::new(scope, scope_ref.clone(), constraint.kind, constraint.payload);
            constraint_ids.push(self.store.insert_constraint(&record)?);
        }

        let mut outcome = ActionOutcome::new(
            id,
            ActionKind::SetConstraints.as_str(),
            format!("constraints added: {}", constraint_ids.len()),
        );
        outcome.constraint_ids = constraint_ids;
        Ok(outcome)
    }

    fn remove_constraints(&mut self, id: &str, spec: RemoveConstraints) -> ExecResult<ActionOutcome> {
        let removed = self.store.delete_constraints(&spec.constraint_ids)?;
        let mut outcome = ActionOutcome::new(
            id,
            ActionKind::RemoveConstraints.as_str(),
            format!("constraints removed: {removed}"),
        );
        outcome.removed = Some(removed);
        Ok(outcome)
    }

    fn require_poll(&self, poll_id: &str) -> ExecResult<Poll> {
        self.store.get_poll(poll_id)?.ok_or_else(|| {
            RepoError::NotFound {
                entity: Entity::Poll,
                id: poll_id.to_string(),
            }
            .into()
        })
    }

    fn duration_or(&self, text: Option<&str>, fallback: Duration) -> ExecResult<Duration> {
        let duration = match non_blank(text) {
            Some(text) => parse_duration(text).map_err(|err| ExecError::time("duration", err))?,
            None => fallback,
        };
        if duration <= Duration::zero() {
            return Err(ExecError::time(
                "duration",
                TimeError::InvalidDuration(format_duration(duration)),
            ));
        }
        Ok(duration)
    }
}

fn kind_label(payload: &ActionPayload) -> String {
    payload
        .kind()
        .map(|kind| kind.as_str().to_string())
        .unwrap_or_else(|_| payload.action.clone())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_field(text: &str, zone: &Zone, field: &str) -> ExecResult<DateTime<Utc>> {
    parse_time(text, zone).map_err(|err| ExecError::time(field, err))
}

fn parse_window(spec: &WindowSpec, zone: &Zone, field: &str) -> ExecResult<Interval> {
    let bounds = parse_bounds(spec, zone, field)?;
    Ok(Interval::new(bounds.start, bounds.end)?)
}

/// Parses both ends without the ordering check.
fn parse_bounds(spec: &WindowSpec, zone: &Zone, field: &str) -> ExecResult<Interval> {
    Ok(Interval {
        start: parse_field(&spec.start, zone, &format!("{field}.start"))?,
        end: parse_field(&spec.end, zone, &format!("{field}.end"))?,
    })
}
