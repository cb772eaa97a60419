//! Session lifecycle tracking.
//!
//! The tracker owns the active-session slot per user: `start` claims it,
//! `end` finalizes and hands the completed session to the aggregator,
//! and `reap` force-completes sessions whose client went away. Per-user
//! mutual exclusion rides on the store's atomic primitives (the slot is
//! a keyed insert, finalize is a conditional delete, the account write
//! is a version CAS), so two ends of the same session can never both
//! ingest it, even from separate processes.
//!
//! ## Usage
//!
//! ```ignore
//! let mut tracker = SessionTracker::new(db, aggregator);
//! tracker.start("user", SessionType::Breathing)?;
//! let done = tracker.end("user", Some(4))?;
//! ```

use std::sync::Arc;

use chrono::Duration;

use crate::aggregator::{IngestOutcome, StreakAggregator};
use crate::clock::{Clock, SystemClock};
use crate::error::{PresenceError, Result};
use crate::events::Event;
use crate::session::{ActiveSession, CompletedSession, SessionType};
use crate::storage::Database;
use uuid::Uuid;

/// Tracks one in-progress session per user and routes completions into
/// the aggregator.
pub struct SessionTracker {
    db: Database,
    aggregator: StreakAggregator,
    clock: Arc<dyn Clock>,
    events: Vec<Event>,
}

impl SessionTracker {
    /// Build a tracker over the given store, using the system clock.
    pub fn new(db: Database, aggregator: StreakAggregator) -> Self {
        Self::with_clock(db, aggregator, Arc::new(SystemClock))
    }

    /// Build a tracker with an explicit clock (tests, simulation).
    pub fn with_clock(db: Database, aggregator: StreakAggregator, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            aggregator,
            clock,
            events: Vec::new(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn aggregator(&self) -> &StreakAggregator {
        &self.aggregator
    }

    /// The user's active session, if any.
    pub fn active_session(&self, user_id: &str) -> Result<Option<ActiveSession>> {
        self.db.active_session(user_id)
    }

    /// Events accumulated since the last drain.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a session for the user.
    ///
    /// # Errors
    /// Returns [`PresenceError::Conflict`] when a session is already
    /// active for this user.
    pub fn start(&mut self, user_id: &str, session_type: SessionType) -> Result<ActiveSession> {
        let session = ActiveSession {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            session_type,
            started_at: self.clock.now(),
        };

        if !self.db.insert_active_session(&session)? {
            return Err(PresenceError::Conflict {
                user_id: user_id.to_string(),
            });
        }

        self.events.push(Event::SessionStarted {
            session_id: session.id,
            user_id: session.user_id.clone(),
            session_type,
            at: session.started_at,
        });
        Ok(session)
    }

    /// End the user's active session and ingest it.
    ///
    /// The duration clamps to >= 0 against backward clock skew. A second
    /// call after completion fails with [`PresenceError::NotFound`]
    /// rather than mutating the finalized session.
    pub fn end(&mut self, user_id: &str, quality_rating: Option<u8>) -> Result<CompletedSession> {
        let active = self
            .db
            .active_session(user_id)?
            .ok_or_else(|| PresenceError::NotFound {
                user_id: user_id.to_string(),
            })?;

        let completed = active.finalize(self.clock.now(), quality_rating);
        let completed = self.finalize_and_ingest(completed)?;

        self.events.push(Event::SessionCompleted {
            session_id: completed.id,
            user_id: completed.user_id.clone(),
            duration_secs: completed.duration_secs,
            quality_rating: completed.quality_rating,
            at: completed.ended_at,
        });
        Ok(completed)
    }

    /// Force-complete every active session older than `stale_threshold`.
    ///
    /// The effective end time is `started_at + stale_threshold`, so the
    /// recorded duration is capped at the threshold. Reaped sessions go
    /// through the same finalize-and-ingest path as `end`; a session
    /// that was ended concurrently is simply skipped.
    pub fn reap(&mut self, stale_threshold: Duration) -> Result<Vec<CompletedSession>> {
        let cutoff = self.clock.now() - stale_threshold;
        let stale = self.db.active_sessions_started_before(cutoff)?;

        let mut reaped = Vec::new();
        for active in stale {
            let effective_end = active.started_at + stale_threshold;
            let session_id = active.id;
            let user_id = active.user_id.clone();
            tracing::warn!(
                %session_id,
                %user_id,
                "reaping stale session with no explicit end"
            );

            let completed = active.finalize(effective_end, None);
            match self.finalize_and_ingest(completed) {
                Ok(completed) => {
                    self.events.push(Event::SessionReaped {
                        session_id: completed.id,
                        user_id: completed.user_id.clone(),
                        duration_secs: completed.duration_secs,
                        at: completed.ended_at,
                    });
                    reaped.push(completed);
                }
                // Lost the race with an explicit end; nothing to repair.
                Err(PresenceError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(reaped)
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Clear the active slot, append the completed record, and ingest.
    ///
    /// The slot-clear and the append commit together; ingest runs after,
    /// so a crash in between leaves an un-ingested row for the recovery
    /// pass instead of losing the session.
    fn finalize_and_ingest(&mut self, completed: CompletedSession) -> Result<CompletedSession> {
        if !self.db.finalize_session(&completed)? {
            return Err(PresenceError::NotFound {
                user_id: completed.user_id.clone(),
            });
        }

        let outcome = self.aggregator.ingest(&self.db, &completed)?;
        if outcome == IngestOutcome::Applied {
            if let Some(account) = self.aggregator.get_state(&self.db, &completed.user_id)? {
                self.events.push(Event::AccountUpdated {
                    user_id: account.user_id.clone(),
                    daily_presence_secs: account.daily_presence_secs,
                    weekly_minutes: account.weekly_minutes,
                    current_streak: account.current_streak,
                    longest_streak: account.longest_streak,
                    at: completed.ended_at,
                });
            }
        }
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregatorConfig;
    use crate::calendar::CalendarPolicy;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn tracker_at(start: chrono::DateTime<Utc>) -> (SessionTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        let db = Database::open_memory().unwrap();
        let aggregator =
            StreakAggregator::new(AggregatorConfig::default(), CalendarPolicy::default());
        let tracker = SessionTracker::with_clock(db, aggregator, clock.clone());
        (tracker, clock)
    }

    fn t0() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap()
    }

    #[test]
    fn start_twice_conflicts() {
        let (mut tracker, _clock) = tracker_at(t0());
        tracker.start("u1", SessionType::Micro).unwrap();
        let err = tracker.start("u1", SessionType::Micro).unwrap_err();
        assert!(matches!(err, PresenceError::Conflict { .. }));
        // Other users are unaffected.
        tracker.start("u2", SessionType::Micro).unwrap();
    }

    #[test]
    fn end_without_start_not_found() {
        let (mut tracker, _clock) = tracker_at(t0());
        let err = tracker.end("u1", None).unwrap_err();
        assert!(matches!(err, PresenceError::NotFound { .. }));
    }

    #[test]
    fn end_is_not_repeatable() {
        let (mut tracker, clock) = tracker_at(t0());
        tracker.start("u1", SessionType::Breathing).unwrap();
        clock.advance(Duration::seconds(90));
        tracker.end("u1", None).unwrap();

        let err = tracker.end("u1", None).unwrap_err();
        assert!(matches!(err, PresenceError::NotFound { .. }));
        assert_eq!(
            tracker.database().sessions_for_user("u1").unwrap().len(),
            1
        );
    }

    #[test]
    fn backward_skew_clamps_duration() {
        let (mut tracker, clock) = tracker_at(t0());
        tracker.start("u1", SessionType::Custom).unwrap();
        clock.advance(Duration::seconds(-45));
        let done = tracker.end("u1", None).unwrap();
        assert_eq!(done.duration_secs, 0);
    }

    #[test]
    fn events_trace_the_lifecycle() {
        let (mut tracker, clock) = tracker_at(t0());
        tracker.start("u1", SessionType::Breathing).unwrap();
        clock.advance(Duration::seconds(120));
        tracker.end("u1", Some(5)).unwrap();

        let events = tracker.drain_events();
        assert!(matches!(events[0], Event::SessionStarted { .. }));
        assert!(matches!(events[1], Event::AccountUpdated { .. }));
        assert!(matches!(events[2], Event::SessionCompleted { .. }));
        assert!(tracker.drain_events().is_empty());
    }
}
