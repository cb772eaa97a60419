//! Integration tests for ingest under file-level lock contention.
//!
//! Two connections on the same database file: one holds a write lock
//! (`BEGIN IMMEDIATE`), the other ingests. The ingest path must treat
//! the resulting SQLITE_BUSY as a transient lock and retry.

use std::thread;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use presence_core::{
    ActiveSession, AggregatorConfig, CalendarPolicy, CompletedSession, Database, DatabaseError,
    IngestOutcome, PresenceError, SessionType, StreakAggregator,
};
use uuid::Uuid;

fn aggregator() -> StreakAggregator {
    StreakAggregator::new(AggregatorConfig::default(), CalendarPolicy::default())
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap()
}

fn finalized_session(db: &Database, user: &str) -> CompletedSession {
    let active = ActiveSession {
        id: Uuid::new_v4(),
        user_id: user.into(),
        session_type: SessionType::Breathing,
        started_at: t0(),
    };
    db.insert_active_session(&active).unwrap();
    let completed = active.finalize(t0() + Duration::seconds(300), None);
    assert!(db.finalize_session(&completed).unwrap());
    completed
}

#[test]
fn ingest_retries_past_a_transient_lock() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("presence.db");

    let db = Database::open_at(&path).unwrap();
    let session = finalized_session(&db, "u1");

    let writer = Database::open_at(&path).unwrap();
    writer.conn().execute_batch("BEGIN IMMEDIATE").unwrap();

    // The lock releases while the ingest backoff is still running
    // (attempts at ~0ms, ~50ms, ~150ms).
    let holder = thread::spawn(move || {
        thread::sleep(StdDuration::from_millis(100));
        writer.conn().execute_batch("COMMIT").unwrap();
    });

    let outcome = aggregator().ingest(&db, &session).unwrap();
    assert_eq!(outcome, IngestOutcome::Applied);
    holder.join().unwrap();

    let account = aggregator().get_state(&db, "u1").unwrap().unwrap();
    assert_eq!(account.daily_presence_secs, 300);
}

#[test]
fn held_lock_surfaces_as_locked_after_bounded_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("presence.db");

    let db = Database::open_at(&path).unwrap();
    let session = finalized_session(&db, "u1");

    let writer = Database::open_at(&path).unwrap();
    writer.conn().execute_batch("BEGIN IMMEDIATE").unwrap();

    let err = aggregator().ingest(&db, &session).unwrap_err();
    assert!(matches!(
        err,
        PresenceError::Database(DatabaseError::Locked)
    ));
    // The session was not claimed by the failed attempts.
    assert_eq!(db.is_session_ingested(session.id).unwrap(), Some(false));

    // Once released, the same ingest lands.
    writer.conn().execute_batch("ROLLBACK").unwrap();
    assert_eq!(
        aggregator().ingest(&db, &session).unwrap(),
        IngestOutcome::Applied
    );
}
