//! Streak and quota aggregation.
//!
//! Consumes completed sessions and maintains the per-user
//! [`PresenceAccount`]: daily seconds, weekly minutes, and the
//! consecutive-day streak. The fold itself is pure; persistence goes
//! through [`Database::apply_ingest`], which claims the session and
//! CAS-writes the account in one transaction. Replaying a session is
//! therefore always safe -- the claim makes ingest exactly-once per
//! session id.

use serde::{Deserialize, Serialize};

use crate::calendar::CalendarPolicy;
use crate::error::{DatabaseError, PresenceError, Result};
use crate::session::CompletedSession;
use crate::storage::{Database, IngestWrite};

/// Aggregation thresholds and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Minimum completed duration for a session to earn streak credit.
    /// Shorter sessions still count toward daily/weekly accumulators.
    pub min_qualifying_secs: i64,
    /// Attempts for the account write before surfacing StaleWrite.
    pub max_write_attempts: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            min_qualifying_secs: 60,
            max_write_attempts: 3,
        }
    }
}

/// Per-user aggregate state. One row per user; the only entity the
/// aggregator writes to. Derived from the session history, so it can be
/// rebuilt, but callers treat it as the authoritative projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceAccount {
    pub user_id: String,
    /// Accumulated seconds for the calendar day in `daily_date`.
    pub daily_presence_secs: i64,
    /// The day `daily_presence_secs` belongs to; a session on a later
    /// day resets the accumulator before adding.
    pub daily_date: chrono::NaiveDate,
    /// Accumulated whole minutes for the week starting `last_week_reset`.
    pub weekly_minutes: i64,
    /// Monday of the week the weekly accumulator belongs to.
    pub last_week_reset: chrono::NaiveDate,
    /// Consecutive calendar days with at least one qualifying session.
    pub current_streak: u32,
    /// High-water mark of `current_streak`; never decreases.
    pub longest_streak: u32,
    /// Date of the most recent qualifying session.
    pub last_session_date: Option<chrono::NaiveDate>,
    /// Optimistic-concurrency counter, bumped on every write.
    pub version: i64,
}

/// Result of ingesting one completed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The account was updated.
    Applied,
    /// The session had already been ingested; nothing changed.
    AlreadyIngested,
}

/// Streak and quota aggregator.
#[derive(Debug, Clone)]
pub struct StreakAggregator {
    config: AggregatorConfig,
    calendar: CalendarPolicy,
}

impl StreakAggregator {
    pub fn new(config: AggregatorConfig, calendar: CalendarPolicy) -> Self {
        Self { config, calendar }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn calendar(&self) -> &CalendarPolicy {
        &self.calendar
    }

    /// Ingest a completed session into the user's account.
    ///
    /// Idempotent per session id: a replay returns
    /// [`IngestOutcome::AlreadyIngested`] without touching the account.
    /// Contention is retried a bounded number of times: a version
    /// mismatch re-reads and re-folds, a locked database backs off
    /// briefly. When the attempts run out, a mismatch surfaces as
    /// [`PresenceError::StaleWrite`] and a lock as
    /// [`DatabaseError::Locked`].
    pub fn ingest(&self, db: &Database, session: &CompletedSession) -> Result<IngestOutcome> {
        let attempts = self.config.max_write_attempts.max(1);
        for attempt in 1..=attempts {
            let existing = db.account(&session.user_id)?;
            let previous_version = existing.as_ref().map(|a| a.version);
            let next = self.fold(existing, session);

            match db.apply_ingest(session.id, previous_version, &next) {
                Ok(IngestWrite::Applied) => return Ok(IngestOutcome::Applied),
                Ok(IngestWrite::AlreadyIngested) => return Ok(IngestOutcome::AlreadyIngested),
                Ok(IngestWrite::VersionMismatch) => {
                    tracing::debug!(
                        user_id = %session.user_id,
                        attempt,
                        "account version moved during ingest, retrying"
                    );
                }
                Err(PresenceError::Database(DatabaseError::Locked)) if attempt < attempts => {
                    tracing::debug!(
                        user_id = %session.user_id,
                        attempt,
                        "database locked during ingest, backing off"
                    );
                    std::thread::sleep(std::time::Duration::from_millis(
                        50 * u64::from(attempt),
                    ));
                }
                Err(e) => return Err(e),
            }
        }
        Err(PresenceError::StaleWrite {
            user_id: session.user_id.clone(),
            attempts,
        })
    }

    /// Read-only snapshot of the user's account, `None` if the user has
    /// never completed a session.
    pub fn get_state(&self, db: &Database, user_id: &str) -> Result<Option<PresenceAccount>> {
        db.account(user_id)
    }

    /// Pure fold of one session into the account state.
    ///
    /// Order matters: day rollover, week rollover, accumulate, then the
    /// streak rules for qualifying sessions.
    fn fold(
        &self,
        account: Option<PresenceAccount>,
        session: &CompletedSession,
    ) -> PresenceAccount {
        let date = self.calendar.local_date(session.ended_at);
        let week = self.calendar.week_start(date);

        let mut next = match account {
            Some(account) => {
                let mut next = account;
                next.version += 1;
                if next.daily_date != date {
                    next.daily_presence_secs = 0;
                    next.daily_date = date;
                }
                if week > next.last_week_reset {
                    next.weekly_minutes = 0;
                    next.last_week_reset = week;
                }
                next
            }
            None => PresenceAccount {
                user_id: session.user_id.clone(),
                daily_presence_secs: 0,
                daily_date: date,
                weekly_minutes: 0,
                last_week_reset: week,
                current_streak: 0,
                longest_streak: 0,
                last_session_date: None,
                version: 1,
            },
        };

        next.daily_presence_secs += session.duration_secs;
        // Floor: a sub-minute remainder never rounds up into the quota.
        next.weekly_minutes += session.duration_secs / 60;

        if session.duration_secs >= self.config.min_qualifying_secs {
            match next.last_session_date {
                Some(prev) if prev == date => {
                    // Already counted today.
                }
                Some(prev) if self.calendar.is_next_day(prev, date) => {
                    next.current_streak += 1;
                }
                _ => {
                    next.current_streak = 1;
                }
            }
            next.last_session_date = Some(date);
            next.longest_streak = next.longest_streak.max(next.current_streak);
        }

        next
    }
}
