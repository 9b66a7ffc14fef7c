use chrono::{TimeZone, Utc};
use huddle_core::db::open_db_in_memory;
use huddle_core::model::constraint::ConstraintScope;
use huddle_core::model::ModelValidationError;
use huddle_core::repo::{
    ConstraintRepository, EventRepository, PollRepository, RepoError, SqliteStore,
};
use huddle_core::time::TimeError;
use huddle_core::{
    apply_document, apply_document_atomically, ActionOutcome, Document, ExecError,
    ExecutorConfig, RunFailure,
};
use rusqlite::Connection;

fn run(conn: &Connection, yaml: &str) -> Result<Vec<ActionOutcome>, RunFailure> {
    let mut output = Vec::new();
    run_capturing(conn, yaml, &mut output)
}

fn run_capturing(
    conn: &Connection,
    yaml: &str,
    output: &mut Vec<u8>,
) -> Result<Vec<ActionOutcome>, RunFailure> {
    let doc = Document::from_yaml_str(yaml).unwrap();
    apply_document(conn, &doc, &ExecutorConfig::default(), output)
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| row.get(0))
        .unwrap()
}

const POLL_WITH_SLOTS: &str = r#"
version: "1"
actions:
  - id: p1
    action: create_poll
    use_tz: UTC
    title: Design review
    duration: 30m
    participants:
      - email: a@example.com
      - email: b@example.com
        role: optional
    candidate_windows:
      - start: "2024-03-01 09:00"
        end: "2024-03-01 12:00"
    constraints:
      - kind: no_fridays
        payload: { strict: true }
  - id: s1
    action: add_slots
    use_tz: UTC
    poll_ref: p1
    slots:
      - { start: "2024-03-01 11:00", end: "2024-03-01 11:30" }
      - { start: "2024-03-01 10:00", end: "2024-03-01 10:30" }
      - { start: "2024-03-01 09:00", end: "2024-03-01 09:30" }
"#;

#[test]
fn add_slots_resolves_poll_created_earlier_in_the_batch() {
    let conn = open_db_in_memory().unwrap();
    let outcomes = run(&conn, POLL_WITH_SLOTS).unwrap();

    assert_eq!(outcomes.len(), 2);
    let poll_id = outcomes[0].poll_id.clone().unwrap();
    assert_eq!(outcomes[0].summary, format!("poll created: {poll_id}"));
    assert_eq!(outcomes[0].constraint_ids.len(), 1);
    assert_eq!(outcomes[1].poll_id.as_deref(), Some(poll_id.as_str()));
    assert_eq!(outcomes[1].slot_ids.len(), 3);
    assert_eq!(outcomes[1].summary, "slots added: 3");

    let store = SqliteStore::new(&conn);
    assert_eq!(store.list_slots(&poll_id).unwrap().len(), 3);
    assert_eq!(store.list_participants(&poll_id).unwrap().len(), 2);
    assert_eq!(store.list_windows(&poll_id).unwrap().len(), 1);
    let poll = store.get_poll(&poll_id).unwrap().unwrap();
    assert_eq!(poll.duration_minutes, 30);
    assert_eq!(poll.strategy, "approval");
    let constraints = store
        .list_constraints(ConstraintScope::Poll, Some(&poll_id))
        .unwrap();
    assert_eq!(constraints[0].kind, "no_fridays");
}

#[test]
fn finalize_breaks_yes_ties_by_earliest_start() {
    let conn = open_db_in_memory().unwrap();
    let doc = format!(
        "{POLL_WITH_SLOTS}{}",
        r#"
  - id: v1
    action: vote_slot
    use_tz: UTC
    poll_ref: p1
    votes:
      - { slot_ref: "2024-03-01 11:00", email: a@example.com, vote: "YES" }
      - { slot_ref: "2024-03-01 11:00", email: b@example.com, vote: yes }
      - { slot_ref: "2024-03-01 10:00", email: a@example.com, vote: yes }
      - { slot_ref: "2024-03-01 10:00", email: b@example.com, vote: Yes }
      - { slot_ref: "2024-03-01 09:00", email: a@example.com, vote: yes }
      - { slot_ref: "2024-03-01 09:00", email: b@example.com, vote: maybe }
  - id: f1
    action: finalize_poll
    poll_ref: p1
"#
    );
    let outcomes = run(&conn, &doc).unwrap();

    assert_eq!(outcomes[2].summary, "votes recorded: 6");
    let finalized = &outcomes[3];
    let poll_id = finalized.poll_id.clone().unwrap();
    let store = SqliteStore::new(&conn);
    let ten = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    let winner = store.get_slot_by_start(&poll_id, &ten).unwrap().unwrap();
    assert_eq!(finalized.slot_ids, vec![winner.id.clone()]);
    assert_eq!(
        finalized.summary,
        format!("finalized with slot {} (yes=2)", winner.id)
    );

    let event_id = finalized.event_id.clone().unwrap();
    let event = store.get_event(&event_id).unwrap().unwrap();
    assert_eq!(event.start, ten);
    assert_eq!(event.title, "Design review");

    let poll = store.get_poll(&poll_id).unwrap().unwrap();
    assert!(poll.is_finalized());
    assert_eq!(poll.event_id.as_deref(), Some(event_id.as_str()));
}

#[test]
fn preferred_order_wins_regardless_of_votes() {
    let conn = open_db_in_memory().unwrap();
    let setup = run(&conn, POLL_WITH_SLOTS).unwrap();
    let poll_id = setup[0].poll_id.clone().unwrap();
    let store = SqliteStore::new(&conn);
    let slots = store.list_slots(&poll_id).unwrap();
    let (first, last) = (&slots[0], &slots[2]);

    let doc = format!(
        r#"
actions:
  - action: vote_slot
    poll_ref: {poll_id}
    votes:
      - {{ slot_ref: {first}, email: a@example.com, vote: yes }}
      - {{ slot_ref: {first}, email: b@example.com, vote: yes }}
  - id: f
    action: finalize_poll
    poll_ref: {poll_id}
    preferred_order: [not-a-slot, {last}, {first}]
"#,
        first = first.id,
        last = last.id
    );
    let outcomes = run(&conn, &doc).unwrap();

    assert_eq!(
        outcomes[1].summary,
        format!("finalized with preferred slot {}", last.id)
    );
    let event = store
        .get_event(outcomes[1].event_id.as_deref().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(event.start, last.start);
    assert_eq!(event.end, last.end);
}

#[test]
fn repeated_votes_upsert_and_blank_email_uses_sentinel() {
    let conn = open_db_in_memory().unwrap();
    let doc = format!(
        "{POLL_WITH_SLOTS}{}",
        r#"
  - action: vote_slot
    use_tz: UTC
    poll_ref: p1
    votes:
      - { slot_ref: "2024-03-01 09:00", email: a@example.com, vote: no }
      - { slot_ref: "2024-03-01 09:00", email: a@example.com, vote: yes, comment: "moved my 1:1" }
      - { slot_ref: "2024-03-01 09:00", vote: maybe }
"#
    );
    let outcomes = run(&conn, &doc).unwrap();
    let poll_id = outcomes[0].poll_id.clone().unwrap();

    let store = SqliteStore::new(&conn);
    let votes = store.list_votes(&poll_id).unwrap();
    assert_eq!(votes.len(), 2);
    let mine = votes.iter().find(|v| v.email == "a@example.com").unwrap();
    assert_eq!(mine.choice.as_str(), "yes");
    assert_eq!(mine.comment.as_deref(), Some("moved my 1:1"));
    assert!(votes.iter().any(|v| v.email == "unknown@example.com"));
}

#[test]
fn unresolvable_slot_ref_stops_the_batch() {
    let conn = open_db_in_memory().unwrap();
    let doc = format!(
        "{POLL_WITH_SLOTS}{}",
        r#"
  - id: bad-vote
    action: vote_slot
    use_tz: UTC
    poll_ref: p1
    votes:
      - { slot_ref: "2024-03-01 16:00", email: a@example.com, vote: yes }
  - id: never
    action: sync_now
"#
    );
    let failure = run(&conn, &doc).unwrap_err();

    assert_eq!(failure.index, Some(2));
    assert_eq!(failure.action_id, "bad-vote");
    assert_eq!(failure.kind, "vote_slot");
    assert_eq!(failure.completed.len(), 2);
    assert!(!failure.rolled_back);
    assert!(matches!(failure.error, ExecError::UnresolvedReference(_)));
    assert_eq!(count(&conn, "votes"), 0);
}

#[test]
fn finalize_without_slots_fails() {
    let conn = open_db_in_memory().unwrap();
    let failure = run(
        &conn,
        r#"
actions:
  - { id: p, action: create_poll, title: Empty }
  - { id: f, action: finalize_poll, poll_ref: p }
"#,
    )
    .unwrap_err();

    assert!(matches!(failure.error, ExecError::NoSlotsToFinalize(_)));
    assert_eq!(count(&conn, "events"), 0);
}

#[test]
fn finalizing_twice_is_rejected_without_a_second_event() {
    let conn = open_db_in_memory().unwrap();
    let doc = format!(
        "{POLL_WITH_SLOTS}{}",
        r#"
  - { id: f1, action: finalize_poll, poll_ref: p1 }
  - { id: f2, action: finalize_poll, poll_ref: p1 }
"#
    );
    let failure = run(&conn, &doc).unwrap_err();

    assert_eq!(failure.action_id, "f2");
    assert!(matches!(
        failure.error,
        ExecError::Repo(RepoError::PollAlreadyFinalized(_))
    ));
    assert_eq!(count(&conn, "events"), 1);
}

#[test]
fn propose_times_slices_window_and_writes_candidates() {
    let conn = open_db_in_memory().unwrap();
    let mut output = Vec::new();
    let outcomes = run_capturing(
        &conn,
        r#"
actions:
  - id: pt
    action: propose_times
    duration: 30m
    include_freebusy: true
    candidate_windows:
      - { start: "2024-03-01T09:00:00Z", end: "2024-03-01T10:30:00Z" }
"#,
        &mut output,
    )
    .unwrap();

    let candidates = &outcomes[0].candidates;
    assert_eq!(outcomes[0].summary, "candidates=3");
    let starts: Vec<_> = candidates
        .iter()
        .map(|c| c.start.format("%H:%M").to_string())
        .collect();
    assert_eq!(starts, vec!["09:00", "09:30", "10:00"]);
    assert_eq!(candidates[2].end.format("%H:%M").to_string(), "10:30");

    let printed = String::from_utf8(output).unwrap();
    assert!(printed.starts_with("propose_times candidates:\n"));
    let json: serde_json::Value =
        serde_json::from_str(printed.trim_start_matches("propose_times candidates:\n")).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 3);
    assert_eq!(json[0]["score"], 0);
}

#[test]
fn propose_times_respects_max_candidates_and_default_duration() {
    let conn = open_db_in_memory().unwrap();
    let outcomes = run(
        &conn,
        r#"
actions:
  - action: propose_times
    max_candidates: 2
    candidate_windows:
      - { start: "2024-03-01T09:00:00Z", end: "2024-03-01T10:30:00Z" }
  - action: propose_times
    candidate_windows:
      - { start: "2024-03-01T09:00:00Z", end: "2024-03-01T10:30:00Z" }
"#,
    )
    .unwrap();

    assert_eq!(outcomes[0].candidates.len(), 2);
    assert_eq!(outcomes[1].candidates.len(), 3);
}

#[test]
fn propose_times_skips_inverted_windows() {
    let conn = open_db_in_memory().unwrap();
    let outcomes = run(
        &conn,
        r#"
actions:
  - id: pt
    action: propose_times
    candidate_windows:
      - { start: "2024-03-01T09:00:00Z", end: "2024-03-01T10:30:00Z" }
      - { start: "2024-03-01T12:00:00Z", end: "2024-03-01T11:00:00Z" }
      - { start: "2024-03-01T14:00:00Z", end: "2024-03-01T14:00:00Z" }
  - id: after
    action: sync_now
"#,
    )
    .unwrap();

    assert_eq!(outcomes[0].summary, "candidates=3");
    let first_window_end = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
    assert!(outcomes[0]
        .candidates
        .iter()
        .all(|c| c.end <= first_window_end));
    assert_eq!(outcomes[1].action_id, "after");
}

#[test]
fn preferred_start_matches_at_stored_precision() {
    let conn = open_db_in_memory().unwrap();
    let outcomes = run(
        &conn,
        r#"
actions:
  - { id: p, action: create_poll, title: Precise }
  - action: add_slots
    poll_ref: p
    slots:
      - { start: "2024-03-01T09:00:00.0005Z", end: "2024-03-01T09:30:00Z" }
      - { start: "2024-03-01T10:00:00Z", end: "2024-03-01T10:30:00Z" }
  - action: vote_slot
    poll_ref: p
    votes:
      - { slot_ref: "2024-03-01T10:00:00Z", email: a@example.com, vote: yes }
  - id: f
    action: finalize_poll
    poll_ref: p
    preferred_order: ["2024-03-01T09:00:00.0005Z"]
"#,
    )
    .unwrap();

    let early = &outcomes[1].slot_ids[0];
    assert_eq!(
        outcomes[3].summary,
        format!("finalized with preferred slot {early}")
    );
}

#[test]
fn propose_times_requires_windows() {
    let conn = open_db_in_memory().unwrap();
    let failure = run(&conn, "actions:\n  - action: propose_times\n").unwrap_err();
    assert!(matches!(
        failure.error,
        ExecError::MissingField("candidate_windows")
    ));
}

#[test]
fn reschedule_rejects_duration_longer_than_window() {
    let conn = open_db_in_memory().unwrap();
    let failure = run(
        &conn,
        r#"
actions:
  - id: e1
    action: create_event
    title: Sync
    start: "2024-03-01T09:00:00Z"
    end: "2024-03-01T09:30:00Z"
  - id: r1
    action: reschedule_event
    event_ref: e1
    duration: 90m
    candidate_windows:
      - { start: "2024-03-01T14:00:00Z", end: "2024-03-01T15:00:00Z" }
"#,
    )
    .unwrap_err();

    assert!(matches!(failure.error, ExecError::DurationDoesNotFit { .. }));
    let event_id = failure.completed[0].event_id.clone().unwrap();
    let store = SqliteStore::new(&conn);
    let event = store.get_event(&event_id).unwrap().unwrap();
    assert_eq!(event.start, Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
}

#[test]
fn reschedule_moves_event_to_window_start_keeping_identity() {
    let conn = open_db_in_memory().unwrap();
    let outcomes = run(
        &conn,
        r#"
actions:
  - id: e1
    action: create_event
    title: Sync
    location: Room 1
    start: "2024-03-01T09:00:00Z"
    end: "2024-03-01T09:30:00Z"
  - id: r1
    action: reschedule_event
    event_ref: e1
    keep_participants: true
    direction: forward
    candidate_windows:
      - { start: "2024-03-01T14:00:00Z", end: "2024-03-01T16:00:00Z" }
"#,
    )
    .unwrap();

    let event_id = outcomes[0].event_id.clone().unwrap();
    assert_eq!(outcomes[1].event_id.as_deref(), Some(event_id.as_str()));
    assert_eq!(
        outcomes[1].summary,
        format!("event {event_id} rescheduled to 2024-03-01T14:00:00Z - 2024-03-01T15:00:00Z")
    );
    let store = SqliteStore::new(&conn);
    let event = store.get_event(&event_id).unwrap().unwrap();
    assert_eq!(event.end, Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap());
    assert_eq!(event.location.as_deref(), Some("Room 1"));
}

#[test]
fn reschedule_of_unknown_event_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let failure = run(
        &conn,
        r#"
actions:
  - action: reschedule_event
    event_ref: does-not-exist
    candidate_windows:
      - { start: "2024-03-01T14:00:00Z", end: "2024-03-01T16:00:00Z" }
"#,
    )
    .unwrap_err();
    assert!(matches!(
        failure.error,
        ExecError::Repo(RepoError::NotFound { .. })
    ));
}

#[test]
fn create_event_reads_wall_clock_in_action_zone() {
    let conn = open_db_in_memory().unwrap();
    let outcomes = run(
        &conn,
        r#"
actions:
  - action: create_event
    use_tz: America/New_York
    title: Coffee
    start: "2024-03-01 10:00"
    end: "2024-03-01 10:45"
    notes: decaf
"#,
    )
    .unwrap();

    let store = SqliteStore::new(&conn);
    let event = store
        .get_event(outcomes[0].event_id.as_deref().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(event.start, Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap());
    assert_eq!(event.notes.as_deref(), Some("decaf"));
}

#[test]
fn invalid_zone_and_unsupported_time_are_reported_per_field() {
    let conn = open_db_in_memory().unwrap();
    let failure = run(
        &conn,
        "actions:\n  - action: sync_now\n    use_tz: Nowhere/City\n",
    )
    .unwrap_err();
    assert!(matches!(
        failure.error,
        ExecError::Time {
            ref field,
            source: TimeError::InvalidTimezone(_),
        } if field == "use_tz"
    ));

    let failure = run(
        &conn,
        "actions:\n  - { action: create_event, title: X, start: soon, end: later }\n",
    )
    .unwrap_err();
    assert!(matches!(
        failure.error,
        ExecError::Time {
            source: TimeError::UnsupportedTimeFormat(_),
            ..
        }
    ));
}

#[test]
fn inverted_slot_is_rejected_like_a_window() {
    let conn = open_db_in_memory().unwrap();
    let failure = run(
        &conn,
        r#"
actions:
  - { id: p, action: create_poll, title: T }
  - action: add_slots
    poll_ref: p
    slots:
      - { start: "2024-03-01T10:00:00Z", end: "2024-03-01T09:00:00Z" }
"#,
    )
    .unwrap_err();
    assert!(matches!(
        failure.error,
        ExecError::Validation(ModelValidationError::InvalidWindow { .. })
    ));
    assert_eq!(count(&conn, "slots"), 0);
}

#[test]
fn duplicate_slot_start_is_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    let failure = run(
        &conn,
        r#"
actions:
  - { id: p, action: create_poll, title: T }
  - action: add_slots
    poll_ref: p
    slots:
      - { start: "2024-03-01T09:00:00Z", end: "2024-03-01T09:30:00Z" }
      - { start: "2024-03-01T09:00:00Z", end: "2024-03-01T10:00:00Z" }
"#,
    )
    .unwrap_err();
    assert!(matches!(
        failure.error,
        ExecError::Repo(RepoError::DuplicateSlot { .. })
    ));
    assert_eq!(count(&conn, "slots"), 1);
}

#[test]
fn skipped_actions_touch_nothing_and_are_not_referenceable() {
    let conn = open_db_in_memory().unwrap();
    let failure = run(
        &conn,
        r#"
actions:
  - id: p
    when: next_week
    action: create_poll
    title: Later
  - id: weird
    when: tomorrow
    action: teleport
  - id: s
    action: add_slots
    poll_ref: p
    slots:
      - { start: "2024-03-01T09:00:00Z", end: "2024-03-01T09:30:00Z" }
"#,
    )
    .unwrap_err();

    assert_eq!(failure.completed.len(), 2);
    assert!(failure.completed.iter().all(|o| o.skipped));
    assert_eq!(failure.completed[0].summary, "skipped (when != now)");
    assert_eq!(failure.completed[1].kind, "teleport");
    assert!(matches!(
        failure.error,
        ExecError::Repo(RepoError::NotFound { ref id, .. }) if id == "p"
    ));
    assert_eq!(count(&conn, "polls"), 0);
}

#[test]
fn unsupported_action_keeps_earlier_writes() {
    let conn = open_db_in_memory().unwrap();
    let failure = run(
        &conn,
        r#"
actions:
  - { id: p, action: create_poll, title: Kept }
  - { id: x, action: Teleport }
"#,
    )
    .unwrap_err();

    assert!(matches!(failure.error, ExecError::UnsupportedAction(ref kind) if kind == "Teleport"));
    assert_eq!(failure.to_string(), "action #2 id=\"x\" op=Teleport: unsupported action: Teleport");
    assert_eq!(failure.completed.len(), 1);
    assert_eq!(count(&conn, "polls"), 1);
}

#[test]
fn atomic_mode_rolls_back_the_whole_batch() {
    let mut conn = open_db_in_memory().unwrap();
    let doc = Document::from_yaml_str(
        r#"
actions:
  - { id: p, action: create_poll, title: Gone }
  - { id: e, action: create_event, title: Gone, start: "2024-03-01T09:00:00Z", end: "2024-03-01T10:00:00Z" }
  - { id: x, action: finalize_poll, poll_ref: p }
"#,
    )
    .unwrap();
    let mut output = Vec::new();
    let failure =
        apply_document_atomically(&mut conn, &doc, &ExecutorConfig::default(), &mut output)
            .unwrap_err();

    assert!(failure.rolled_back);
    assert_eq!(failure.completed.len(), 2);
    assert_eq!(count(&conn, "polls"), 0);
    assert_eq!(count(&conn, "events"), 0);
}

#[test]
fn atomic_mode_commits_successful_batches() {
    let mut conn = open_db_in_memory().unwrap();
    let doc = Document::from_yaml_str(POLL_WITH_SLOTS).unwrap();
    let mut output = Vec::new();
    let outcomes =
        apply_document_atomically(&mut conn, &doc, &ExecutorConfig::default(), &mut output)
            .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(count(&conn, "slots"), 3);
}

#[test]
fn constraints_set_with_scope_fallbacks_and_removed_by_id() {
    let conn = open_db_in_memory().unwrap();
    let outcomes = run(
        &conn,
        r#"
actions:
  - id: c
    action: set_constraints
    scope_ref: alice@example.com
    constraints:
      - kind: no_meetings_before
        payload: { time: "09:00" }
      - kind: focus_block
        scope: event
        payload: { minutes: 90 }
  - id: c2
    action: set_constraints
    scope: poll
    constraints:
      - kind: max_length
"#,
    )
    .unwrap();
    assert_eq!(outcomes[0].summary, "constraints added: 2");

    let store = SqliteStore::new(&conn);
    let user = store
        .list_constraints(ConstraintScope::User, Some("alice@example.com"))
        .unwrap();
    assert_eq!(user.len(), 1);
    assert_eq!(user[0].payload["time"], "09:00");
    assert_eq!(
        store.list_constraints(ConstraintScope::Event, None).unwrap().len(),
        1
    );
    assert_eq!(
        store.list_constraints(ConstraintScope::Poll, None).unwrap().len(),
        1
    );

    let ids = outcomes[0].constraint_ids.join(", ");
    let removal = run(
        &conn,
        &format!(
            "actions:\n  - {{ action: remove_constraints, constraint_ids: [{ids}, missing] }}\n  - {{ action: remove_constraints }}\n"
        ),
    )
    .unwrap();
    assert_eq!(removal[0].summary, "constraints removed: 2");
    assert_eq!(removal[0].removed, Some(2));
    assert_eq!(removal[1].summary, "constraints removed: 0");
    assert_eq!(count(&conn, "constraints"), 1);
}

#[test]
fn unknown_constraint_scope_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let failure = run(
        &conn,
        "actions:\n  - { action: set_constraints, scope: team, constraints: [{ kind: k }] }\n",
    )
    .unwrap_err();
    assert!(matches!(
        failure.error,
        ExecError::Validation(ModelValidationError::InvalidScope(_))
    ));
}

#[test]
fn sync_now_is_a_no_op() {
    let conn = open_db_in_memory().unwrap();
    let outcomes = run(&conn, "actions:\n  - { id: s, action: SYNC_NOW }\n").unwrap();
    assert_eq!(outcomes[0].kind, "sync_now");
    assert_eq!(outcomes[0].summary, "sync simulated (no-op)");
}
