//! Winning-slot selection for poll finalization.
//!
//! # Invariants
//! - A preferred-order match always wins over vote counts.
//! - Scored selection orders by yes-count descending, then start ascending,
//!   then slot id, so the result is deterministic for any input order.

use crate::model::poll::Slot;
use crate::time::{parse_time, Zone};
use std::cmp::Ordering;

/// A slot paired with its number of `yes` votes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTally {
    pub slot: Slot,
    pub yes: i64,
}

/// Returns the first slot named by `preferred`, in preference order.
///
/// Each entry matches a slot id, or else a slot start time parsed in `zone`.
/// Start times compare at millisecond precision, the resolution slots are
/// stored at. Entries matching nothing are skipped.
pub fn pick_preferred<'a>(slots: &'a [Slot], preferred: &[String], zone: &Zone) -> Option<&'a Slot> {
    preferred.iter().find_map(|entry| {
        let entry = entry.trim();
        if let Some(slot) = slots.iter().find(|slot| slot.id == entry) {
            return Some(slot);
        }
        let start_ms = parse_time(entry, zone).ok()?.timestamp_millis();
        slots
            .iter()
            .find(|slot| slot.start.timestamp_millis() == start_ms)
    })
}

/// Picks the slot with the most `yes` votes; ties go to the earliest start.
pub fn pick_top_voted(tallies: &[SlotTally]) -> Option<&SlotTally> {
    tallies.iter().min_by(|left, right| rank(left, right))
}

fn rank(left: &SlotTally, right: &SlotTally) -> Ordering {
    right
        .yes
        .cmp(&left.yes)
        .then_with(|| left.slot.start.cmp(&right.slot.start))
        .then_with(|| left.slot.id.cmp(&right.slot.id))
}
