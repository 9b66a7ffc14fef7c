//! Calendar event persistence.
//!
//! # Invariants
//! - Rescheduling mutates `start`/`end` in place; the event id never changes.

use super::{from_epoch_ms, to_epoch_ms, Entity, RepoError, RepoResult, SqliteStore};
use crate::model::event::{Event, EventId};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

/// Repository interface for calendar events.
pub trait EventRepository {
    fn create_event(&self, event: &Event) -> RepoResult<EventId>;
    fn get_event(&self, id: &str) -> RepoResult<Option<Event>>;
    /// Moves an existing event to a new interval.
    fn update_event_times(
        &self,
        id: &str,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> RepoResult<()>;
}

impl EventRepository for SqliteStore<'_> {
    fn create_event(&self, event: &Event) -> RepoResult<EventId> {
        event.validate()?;

        self.conn.execute(
            "INSERT INTO events (
                id,
                title,
                start_ms,
                end_ms,
                location,
                notes,
                calendar_ref
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                event.id.as_str(),
                event.title.as_str(),
                to_epoch_ms(&event.start),
                to_epoch_ms(&event.end),
                event.location.as_deref(),
                event.notes.as_deref(),
                event.calendar_ref.as_deref(),
            ],
        )?;

        Ok(event.id.clone())
    }

    fn get_event(&self, id: &str) -> RepoResult<Option<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, start_ms, end_ms, location, notes, calendar_ref
             FROM events
             WHERE id = ?1;",
        )?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_event_row(row)?));
        }
        Ok(None)
    }

    fn update_event_times(
        &self,
        id: &str,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> RepoResult<()> {
        crate::model::validate_interval(*start, *end)?;

        let changed = self.conn.execute(
            "UPDATE events SET start_ms = ?2, end_ms = ?3 WHERE id = ?1;",
            params![id, to_epoch_ms(start), to_epoch_ms(end)],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: Entity::Event,
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

fn parse_event_row(row: &Row<'_>) -> RepoResult<Event> {
    let event = Event {
        id: row.get("id")?,
        title: row.get("title")?,
        start: from_epoch_ms(row.get("start_ms")?, "events.start_ms")?,
        end: from_epoch_ms(row.get("end_ms")?, "events.end_ms")?,
        location: row.get("location")?,
        notes: row.get("notes")?,
        calendar_ref: row.get("calendar_ref")?,
    };
    event.validate()?;
    Ok(event)
}
