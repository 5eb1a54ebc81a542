use rusqlite::Connection;

use crate::error::Result;

/// Initialise the schedule schema in `conn`.
///
/// Creates the `schedules` table (idempotent) and an index on `status`
/// so the per-tick "all active rows" query stays cheap as the table
/// grows. External editors create and modify rows; the daemon only
/// reads active rows and writes back the two execution-result columns.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schedules (
            id                        INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path                 TEXT    NOT NULL,
            tool                      TEXT    NOT NULL DEFAULT 'command',
            project                   TEXT,               -- Hop only
            run_config                TEXT,               -- Hop only
            fixed_time                TEXT,               -- HH:MM or NULL
            interval_minutes          INTEGER NOT NULL DEFAULT 0,
            weekdays                  TEXT,               -- comma-separated tokens
            month_days                TEXT,               -- comma-separated day numbers
            window_start              TEXT,               -- HH:MM or NULL
            window_end                TEXT,               -- HH:MM or NULL
            status                    TEXT    NOT NULL DEFAULT 'active',
            timeout_seconds           INTEGER NOT NULL DEFAULT 1800,
            last_run_at               TEXT,               -- YYYY-MM-DD HH:MM:SS
            last_run_duration_minutes REAL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_schedules_status ON schedules (status);
        ",
    )?;
    Ok(())
}
