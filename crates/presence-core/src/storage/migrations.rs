//! Database schema migrations for presence tracking.
//!
//! Migrations are versioned and applied automatically when opening the
//! database. The `schema_version` table tracks the current version.

use rusqlite::{Connection, Result as SqliteResult};

/// Apply all pending migrations to bring the database to the current
/// schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Create the schema_version table if it doesn't exist.
fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            0
        } else {
            tracing::warn!("failed to read schema_version: {e}");
            0
        }
    })
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: initial schema.
///
/// - `active_sessions`: one row per user (PRIMARY KEY on user_id is the
///   at-most-one-active-session invariant, enforced by the database)
/// - `sessions`: append-only completed history; `ingested` marks whether
///   the aggregate has consumed the row
/// - `accounts`: per-user aggregate projection; `version` backs the
///   optimistic-concurrency check on updates
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS active_sessions (
            user_id      TEXT PRIMARY KEY,
            id           TEXT NOT NULL UNIQUE,
            session_type TEXT NOT NULL,
            started_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id            TEXT PRIMARY KEY,
            user_id       TEXT NOT NULL,
            session_type  TEXT NOT NULL,
            started_at    TEXT NOT NULL,
            ended_at      TEXT NOT NULL,
            duration_secs INTEGER NOT NULL,
            ingested      INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS accounts (
            user_id             TEXT PRIMARY KEY,
            daily_presence_secs INTEGER NOT NULL DEFAULT 0,
            daily_date          TEXT NOT NULL,
            weekly_minutes      INTEGER NOT NULL DEFAULT 0,
            last_week_reset     TEXT NOT NULL,
            current_streak      INTEGER NOT NULL DEFAULT 0,
            longest_streak      INTEGER NOT NULL DEFAULT 0,
            last_session_date   TEXT,
            version             INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_user_ended
            ON sessions(user_id, ended_at);",
    )?;

    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [1])?;

    tx.commit()?;
    Ok(())
}

/// Migration v2: quality ratings and recovery scan support.
///
/// Adds:
/// - `quality_rating`: optional user-supplied score set at completion
/// - an index on `sessions(ingested)` so the crash-recovery pass does
///   not walk the whole history
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE sessions ADD COLUMN quality_rating INTEGER;
         CREATE INDEX IF NOT EXISTS idx_sessions_ingested ON sessions(ingested);",
    )?;

    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [2])?;

    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_from_scratch() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 2);

        // All tables and the v2 column exist.
        conn.prepare("SELECT user_id, id, session_type, started_at FROM active_sessions")
            .unwrap();
        conn.prepare("SELECT id, duration_secs, ingested, quality_rating FROM sessions")
            .unwrap();
        conn.prepare("SELECT user_id, current_streak, longest_streak, version FROM accounts")
            .unwrap();
    }

    #[test]
    fn migrate_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 2);
    }

    #[test]
    fn incremental_migration_from_v1() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        migrate_v1(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 1);

        // Insert a v1-shaped row, then migrate forward.
        conn.execute(
            "INSERT INTO sessions (id, user_id, session_type, started_at, ended_at, duration_secs)
             VALUES ('s1', 'u1', 'breathing', '2025-03-01T09:00:00+00:00',
                     '2025-03-01T09:05:00+00:00', 300)",
            [],
        )
        .unwrap();

        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 2);

        let rating: Option<i64> = conn
            .query_row("SELECT quality_rating FROM sessions WHERE id = 's1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert!(rating.is_none());
    }
}
