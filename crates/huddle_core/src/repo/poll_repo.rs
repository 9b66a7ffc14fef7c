//! Poll repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist polls and their participants, windows, slots and votes.
//! - Provide the reads that finalization and slot resolution depend on.
//!
//! # Invariants
//! - Participant and vote writes are upserts keyed by their unique columns.
//! - Slot listing is deterministic: `start_ms ASC, id ASC`.
//! - Finalization only succeeds on draft polls.

use super::{
    from_epoch_ms, is_unique_violation, to_epoch_ms, Entity, RepoError, RepoResult, SqliteStore,
};
use crate::model::event::EventId;
use crate::model::poll::{
    Participant, Poll, PollId, PollStatus, Slot, SlotId, Vote, VoteChoice, Window, WindowId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

const POLL_SELECT_SQL: &str = "SELECT
    id,
    title,
    strategy,
    quorum,
    deadline_ms,
    notes,
    duration_minutes,
    status,
    event_id
FROM polls";

const SLOT_SELECT_SQL: &str = "SELECT id, poll_id, start_ms, end_ms, created_at FROM slots";

/// Repository interface for the poll aggregate.
pub trait PollRepository {
    fn create_poll(&self, poll: &Poll) -> RepoResult<PollId>;
    fn get_poll(&self, id: &str) -> RepoResult<Option<Poll>>;
    /// Moves a draft poll to finalized and pins the produced event.
    fn finalize_poll(&self, poll_id: &str, event_id: &str) -> RepoResult<()>;
    /// Inserts a participant or updates the role of an existing `(poll, email)`.
    fn upsert_participant(&self, participant: &Participant) -> RepoResult<()>;
    fn list_participants(&self, poll_id: &str) -> RepoResult<Vec<Participant>>;
    fn add_window(&self, window: &Window) -> RepoResult<WindowId>;
    fn list_windows(&self, poll_id: &str) -> RepoResult<Vec<Window>>;
    fn add_slot(&self, slot: &Slot) -> RepoResult<SlotId>;
    fn list_slots(&self, poll_id: &str) -> RepoResult<Vec<Slot>>;
    fn get_slot(&self, slot_id: &str) -> RepoResult<Option<Slot>>;
    fn get_slot_by_start(&self, poll_id: &str, start: &DateTime<Utc>) -> RepoResult<Option<Slot>>;
    /// Inserts a vote or overwrites vote/comment of an existing `(slot, email)`.
    fn upsert_vote(&self, vote: &Vote) -> RepoResult<()>;
    fn list_votes(&self, poll_id: &str) -> RepoResult<Vec<Vote>>;
    fn count_yes_votes(&self, slot_id: &str) -> RepoResult<i64>;
}

impl PollRepository for SqliteStore<'_> {
    fn create_poll(&self, poll: &Poll) -> RepoResult<PollId> {
        self.conn.execute(
            "INSERT INTO polls (
                id,
                title,
                strategy,
                quorum,
                deadline_ms,
                notes,
                duration_minutes,
                status,
                event_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                poll.id.as_str(),
                poll.title.as_str(),
                poll.strategy.as_str(),
                poll.quorum,
                poll.deadline.as_ref().map(to_epoch_ms),
                poll.notes.as_deref(),
                poll.duration_minutes,
                poll.status.as_str(),
                poll.event_id.as_deref(),
            ],
        )?;

        Ok(poll.id.clone())
    }

    fn get_poll(&self, id: &str) -> RepoResult<Option<Poll>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{POLL_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_poll_row(row)?));
        }

        Ok(None)
    }

    fn finalize_poll(&self, poll_id: &str, event_id: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE polls
             SET status = 'finalized', event_id = ?2
             WHERE id = ?1 AND status = 'draft';",
            params![poll_id, event_id],
        )?;
        if changed == 1 {
            return Ok(());
        }

        match self.get_poll(poll_id)? {
            Some(_) => Err(RepoError::PollAlreadyFinalized(poll_id.to_string())),
            None => Err(RepoError::NotFound {
                entity: Entity::Poll,
                id: poll_id.to_string(),
            }),
        }
    }

    fn upsert_participant(&self, participant: &Participant) -> RepoResult<()> {
        participant.validate()?;

        self.conn.execute(
            "INSERT INTO poll_participants (id, poll_id, email, role)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(poll_id, email) DO UPDATE SET role = excluded.role;",
            params![
                participant.id.as_str(),
                participant.poll_id.as_str(),
                participant.email.as_str(),
                participant.role.as_str(),
            ],
        )?;
        Ok(())
    }

    fn list_participants(&self, poll_id: &str) -> RepoResult<Vec<Participant>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, poll_id, email, role
             FROM poll_participants
             WHERE poll_id = ?1
             ORDER BY email ASC;",
        )?;
        let participants = stmt
            .query_map([poll_id], |row| {
                Ok(Participant {
                    id: row.get("id")?,
                    poll_id: row.get("poll_id")?,
                    email: row.get("email")?,
                    role: row.get("role")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(participants)
    }

    fn add_window(&self, window: &Window) -> RepoResult<WindowId> {
        window.validate()?;

        self.conn.execute(
            "INSERT INTO poll_windows (id, poll_id, start_ms, end_ms)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                window.id.as_str(),
                window.poll_id.as_str(),
                to_epoch_ms(&window.start),
                to_epoch_ms(&window.end),
            ],
        )?;
        Ok(window.id.clone())
    }

    fn list_windows(&self, poll_id: &str) -> RepoResult<Vec<Window>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, poll_id, start_ms, end_ms
             FROM poll_windows
             WHERE poll_id = ?1
             ORDER BY start_ms ASC, id ASC;",
        )?;
        let mut rows = stmt.query([poll_id])?;
        let mut windows = Vec::new();
        while let Some(row) = rows.next()? {
            windows.push(Window {
                id: row.get("id")?,
                poll_id: row.get("poll_id")?,
                start: from_epoch_ms(row.get("start_ms")?, "poll_windows.start_ms")?,
                end: from_epoch_ms(row.get("end_ms")?, "poll_windows.end_ms")?,
            });
        }
        Ok(windows)
    }

    fn add_slot(&self, slot: &Slot) -> RepoResult<SlotId> {
        slot.validate()?;

        let inserted = self.conn.execute(
            "INSERT INTO slots (id, poll_id, start_ms, end_ms)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                slot.id.as_str(),
                slot.poll_id.as_str(),
                to_epoch_ms(&slot.start),
                to_epoch_ms(&slot.end),
            ],
        );
        match inserted {
            Ok(_) => Ok(slot.id.clone()),
            Err(err) if is_unique_violation(&err) => Err(RepoError::DuplicateSlot {
                poll_id: slot.poll_id.clone(),
                start: slot.start,
            }),
            Err(err) => Err(err.into()),
        }
    }

    fn list_slots(&self, poll_id: &str) -> RepoResult<Vec<Slot>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SLOT_SELECT_SQL}
             WHERE poll_id = ?1
             ORDER BY start_ms ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([poll_id])?;
        let mut slots = Vec::new();
        while let Some(row) = rows.next()? {
            slots.push(parse_slot_row(row)?);
        }
        Ok(slots)
    }

    fn get_slot(&self, slot_id: &str) -> RepoResult<Option<Slot>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SLOT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([slot_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_slot_row(row)?));
        }
        Ok(None)
    }

    fn get_slot_by_start(&self, poll_id: &str, start: &DateTime<Utc>) -> RepoResult<Option<Slot>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SLOT_SELECT_SQL} WHERE poll_id = ?1 AND start_ms = ?2;"
        ))?;
        let mut rows = stmt.query(params![poll_id, to_epoch_ms(start)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_slot_row(row)?));
        }
        Ok(None)
    }

    fn upsert_vote(&self, vote: &Vote) -> RepoResult<()> {
        vote.validate()?;

        self.conn.execute(
            "INSERT INTO votes (id, poll_id, slot_id, email, vote, comment)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(slot_id, email) DO UPDATE SET
                vote = excluded.vote,
                comment = excluded.comment;",
            params![
                vote.id.as_str(),
                vote.poll_id.as_str(),
                vote.slot_id.as_str(),
                vote.email.as_str(),
                vote.choice.as_str(),
                vote.comment.as_deref(),
            ],
        )?;
        Ok(())
    }

    fn list_votes(&self, poll_id: &str) -> RepoResult<Vec<Vote>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, poll_id, slot_id, email, vote, comment
             FROM votes
             WHERE poll_id = ?1
             ORDER BY slot_id ASC, email ASC;",
        )?;
        let mut rows = stmt.query([poll_id])?;
        let mut votes = Vec::new();
        while let Some(row) = rows.next()? {
            let choice_text: String = row.get("vote")?;
            let choice = VoteChoice::parse(&choice_text).map_err(|_| {
                RepoError::InvalidData(format!("invalid vote `{choice_text}` in votes.vote"))
            })?;
            votes.push(Vote {
                id: row.get("id")?,
                poll_id: row.get("poll_id")?,
                slot_id: row.get("slot_id")?,
                email: row.get("email")?,
                choice,
                comment: row.get("comment")?,
            });
        }
        Ok(votes)
    }

    fn count_yes_votes(&self, slot_id: &str) -> RepoResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM votes WHERE slot_id = ?1 AND vote = 'yes';",
            [slot_id],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count)
    }
}

fn parse_poll_row(row: &Row<'_>) -> RepoResult<Poll> {
    let status_text: String = row.get("status")?;
    let status = PollStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid poll status `{status_text}` in polls.status"))
    })?;

    let deadline = match row.get::<_, Option<i64>>("deadline_ms")? {
        Some(value) => Some(from_epoch_ms(value, "polls.deadline_ms")?),
        None => None,
    };

    let event_id: Option<EventId> = row.get("event_id")?;
    if status == PollStatus::Finalized && event_id.is_none() {
        return Err(RepoError::InvalidData(
            "finalized poll without event_id".to_string(),
        ));
    }

    Ok(Poll {
        id: row.get("id")?,
        title: row.get("title")?,
        strategy: row.get("strategy")?,
        quorum: row.get("quorum")?,
        deadline,
        notes: row.get("notes")?,
        duration_minutes: row.get("duration_minutes")?,
        status,
        event_id,
    })
}

fn parse_slot_row(row: &Row<'_>) -> RepoResult<Slot> {
    let slot = Slot {
        id: row.get("id")?,
        poll_id: row.get("poll_id")?,
        start: from_epoch_ms(row.get("start_ms")?, "slots.start_ms")?,
        end: from_epoch_ms(row.get("end_ms")?, "slots.end_ms")?,
        created_at: Some(from_epoch_ms(row.get("created_at")?, "slots.created_at")?),
    };
    slot.validate()?;
    Ok(slot)
}
