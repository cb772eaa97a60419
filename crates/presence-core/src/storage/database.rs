//! SQLite-based session and account storage.
//!
//! Provides persistent storage for:
//! - The per-user active session slot (`active_sessions`)
//! - Completed session history, append-only (`sessions`)
//! - The per-user aggregate projection (`accounts`)
//!
//! Concurrency discipline lives here: the active-session slot is a
//! PRIMARY KEY on user_id (insert doubles as test-and-set), finalize is
//! a conditional delete-plus-append in one transaction, and the account
//! write is a compare-and-swap on a version column. Per-user operations
//! therefore serialize through the store even across processes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::aggregator::PresenceAccount;
use crate::error::{DatabaseError, Result};
use crate::session::{ActiveSession, CompletedSession, SessionType};

use super::{data_dir, migrations};

/// Outcome of the transactional ingest write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestWrite {
    /// The session was claimed and the account updated.
    Applied,
    /// The session's ingested flag was already set; nothing written.
    AlreadyIngested,
    /// The account version moved under us; the caller should reload
    /// and retry.
    VersionMismatch,
}

/// SQLite database for presence tracking.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/presence/presence.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("presence.db");
        Self::open_at(&path)
    }

    /// Open the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| DatabaseError::OpenFailed {
            path: PathBuf::from(path),
            source: e,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (tests, simulation).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| DatabaseError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    // ── Active sessions ──────────────────────────────────────────────

    /// Register `session` as the user's active session.
    ///
    /// Returns `false` when the user already has one -- the PRIMARY KEY
    /// on user_id makes this an atomic test-and-set.
    pub fn insert_active_session(&self, session: &ActiveSession) -> Result<bool> {
        let result = self.conn.execute(
            "INSERT INTO active_sessions (user_id, id, session_type, started_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.user_id,
                session.id.to_string(),
                session.session_type.as_str(),
                session.started_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => Ok(true),
            Err(e) if is_constraint_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// The user's active session, if any.
    pub fn active_session(&self, user_id: &str) -> Result<Option<ActiveSession>> {
        let row = self
            .conn
            .query_row(
                "SELECT user_id, id, session_type, started_at
                 FROM active_sessions WHERE user_id = ?1",
                params![user_id],
                row_to_active_session,
            )
            .optional()?;
        Ok(row)
    }

    /// All active sessions started at or before `cutoff` (reap candidates).
    pub fn active_sessions_started_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ActiveSession>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, id, session_type, started_at
             FROM active_sessions WHERE started_at <= ?1
             ORDER BY started_at",
        )?;
        let rows = stmt.query_map(params![cutoff.to_rfc3339()], row_to_active_session)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    // ── Completed sessions ───────────────────────────────────────────

    /// Clear the active slot and append the completed record, atomically.
    ///
    /// The completed row is written with `ingested = 0` in the same
    /// transaction that clears the slot, so a crash between finalize and
    /// ingest leaves a recoverable row rather than losing presence time.
    ///
    /// Returns `false` when the active slot no longer holds this session
    /// (a concurrent end or reap won).
    pub fn finalize_session(&self, completed: &CompletedSession) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;

        let cleared = tx.execute(
            "DELETE FROM active_sessions WHERE user_id = ?1 AND id = ?2",
            params![completed.user_id, completed.id.to_string()],
        )?;
        if cleared == 0 {
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO sessions
                 (id, user_id, session_type, started_at, ended_at,
                  duration_secs, quality_rating, ingested)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
            params![
                completed.id.to_string(),
                completed.user_id,
                completed.session_type.as_str(),
                completed.started_at.to_rfc3339(),
                completed.ended_at.to_rfc3339(),
                completed.duration_secs,
                completed.quality_rating.map(i64::from),
            ],
        )?;

        tx.commit()?;
        Ok(true)
    }

    /// Look up a completed session by id.
    pub fn session(&self, id: Uuid) -> Result<Option<CompletedSession>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, user_id, session_type, started_at, ended_at,
                        duration_secs, quality_rating
                 FROM sessions WHERE id = ?1",
                params![id.to_string()],
                row_to_completed_session,
            )
            .optional()?;
        Ok(row)
    }

    /// Whether a completed session has been consumed by the aggregate.
    pub fn is_session_ingested(&self, id: Uuid) -> Result<Option<bool>> {
        let row = self
            .conn
            .query_row(
                "SELECT ingested FROM sessions WHERE id = ?1",
                params![id.to_string()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(row.map(|v| v != 0))
    }

    /// Completed session history for one user, most recent first.
    pub fn sessions_for_user(&self, user_id: &str) -> Result<Vec<CompletedSession>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, session_type, started_at, ended_at,
                    duration_secs, quality_rating
             FROM sessions WHERE user_id = ?1
             ORDER BY ended_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_completed_session)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    /// Completed sessions the aggregate has not consumed yet
    /// (crash-recovery candidates), oldest first.
    pub fn uningested_sessions(&self) -> Result<Vec<CompletedSession>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, session_type, started_at, ended_at,
                    duration_secs, quality_rating
             FROM sessions WHERE ingested = 0
             ORDER BY ended_at",
        )?;
        let rows = stmt.query_map([], row_to_completed_session)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    // ── Accounts ─────────────────────────────────────────────────────

    /// The user's aggregate account, if one exists.
    pub fn account(&self, user_id: &str) -> Result<Option<PresenceAccount>> {
        let row = self
            .conn
            .query_row(
                "SELECT user_id, daily_presence_secs, daily_date, weekly_minutes,
                        last_week_reset, current_streak, longest_streak,
                        last_session_date, version
                 FROM accounts WHERE user_id = ?1",
                params![user_id],
                row_to_account,
            )
            .optional()?;
        Ok(row)
    }

    /// Claim a session for ingest and write the updated account, in one
    /// transaction.
    ///
    /// `previous_version` is `None` when no account row existed at read
    /// time; `account.version` must carry the post-update version. The
    /// claim (`ingested = 0 -> 1`) makes ingest exactly-once per session
    /// id; the version check makes the account write first-writer-wins.
    pub fn apply_ingest(
        &self,
        session_id: Uuid,
        previous_version: Option<i64>,
        account: &PresenceAccount,
    ) -> Result<IngestWrite> {
        let tx = self.conn.unchecked_transaction()?;

        let claimed = tx.execute(
            "UPDATE sessions SET ingested = 1 WHERE id = ?1 AND ingested = 0",
            params![session_id.to_string()],
        )?;
        if claimed == 0 {
            // Transaction drops without commit; nothing written.
            return Ok(IngestWrite::AlreadyIngested);
        }

        let written = match previous_version {
            None => {
                let result = tx.execute(
                    "INSERT INTO accounts
                         (user_id, daily_presence_secs, daily_date, weekly_minutes,
                          last_week_reset, current_streak, longest_streak,
                          last_session_date, version)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        account.user_id,
                        account.daily_presence_secs,
                        format_date(account.daily_date),
                        account.weekly_minutes,
                        format_date(account.last_week_reset),
                        account.current_streak,
                        account.longest_streak,
                        account.last_session_date.map(format_date),
                        account.version,
                    ],
                );
                match result {
                    Ok(n) => n,
                    // Another writer created the row first.
                    Err(e) if is_constraint_violation(&e) => 0,
                    Err(e) => return Err(e.into()),
                }
            }
            Some(version) => tx.execute(
                "UPDATE accounts
                 SET daily_presence_secs = ?2, daily_date = ?3, weekly_minutes = ?4,
                     last_week_reset = ?5, current_streak = ?6, longest_streak = ?7,
                     last_session_date = ?8, version = ?9
                 WHERE user_id = ?1 AND version = ?10",
                params![
                    account.user_id,
                    account.daily_presence_secs,
                    format_date(account.daily_date),
                    account.weekly_minutes,
                    format_date(account.last_week_reset),
                    account.current_streak,
                    account.longest_streak,
                    account.last_session_date.map(format_date),
                    account.version,
                    version,
                ],
            )?,
        };

        if written == 0 {
            return Ok(IngestWrite::VersionMismatch);
        }

        tx.commit()?;
        Ok(IngestWrite::Applied)
    }
}

// === Row mapping helpers ===

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

const DATE_FORMAT: &str = "%Y-%m-%d";

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_datetime(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse session type from its database string; unknown values map to
/// Custom rather than failing the whole query.
fn parse_session_type(s: &str) -> SessionType {
    SessionType::parse(s).unwrap_or(SessionType::Custom)
}

fn row_to_active_session(row: &rusqlite::Row) -> rusqlite::Result<ActiveSession> {
    let user_id: String = row.get(0)?;
    let id: String = row.get(1)?;
    let session_type: String = row.get(2)?;
    let started_at: String = row.get(3)?;
    Ok(ActiveSession {
        user_id,
        id: parse_uuid(1, &id)?,
        session_type: parse_session_type(&session_type),
        started_at: parse_datetime(3, &started_at)?,
    })
}

fn row_to_completed_session(row: &rusqlite::Row) -> rusqlite::Result<CompletedSession> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let session_type: String = row.get(2)?;
    let started_at: String = row.get(3)?;
    let ended_at: String = row.get(4)?;
    let duration_secs: i64 = row.get(5)?;
    // rusqlite range-checks the integer-to-u8 conversion.
    let quality_rating: Option<u8> = row.get(6)?;
    Ok(CompletedSession {
        id: parse_uuid(0, &id)?,
        user_id,
        session_type: parse_session_type(&session_type),
        started_at: parse_datetime(3, &started_at)?,
        ended_at: parse_datetime(4, &ended_at)?,
        duration_secs,
        quality_rating,
    })
}

fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<PresenceAccount> {
    let user_id: String = row.get(0)?;
    let daily_presence_secs: i64 = row.get(1)?;
    let daily_date: String = row.get(2)?;
    let weekly_minutes: i64 = row.get(3)?;
    let last_week_reset: String = row.get(4)?;
    let current_streak: u32 = row.get(5)?;
    let longest_streak: u32 = row.get(6)?;
    let last_session_date: Option<String> = row.get(7)?;
    let version: i64 = row.get(8)?;
    Ok(PresenceAccount {
        user_id,
        daily_presence_secs,
        daily_date: parse_date(2, &daily_date)?,
        weekly_minutes,
        last_week_reset: parse_date(4, &last_week_reset)?,
        current_streak,
        longest_streak,
        last_session_date: match last_session_date {
            Some(s) => Some(parse_date(7, &s)?),
            None => None,
        },
        version,
    })
}
