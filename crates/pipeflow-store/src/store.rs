use std::str::FromStr;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::info;

use crate::{
    db::init_db,
    error::{Result, StoreError},
    types::{non_blank, parse_list, Schedule, ScheduleStatus, Tool},
};

const SCHEDULE_COLUMNS: &str = "id, file_path, tool, project, run_config, fixed_time, \
     interval_minutes, weekdays, month_days, window_start, window_end, \
     status, timeout_seconds, last_run_at, last_run_duration_minutes";

/// Shared handle over the schedule table.
///
/// Wraps its `Connection` in `Arc<Mutex>` so the run-loop and the
/// concurrently running job workers can each take a short lock per
/// operation: one to read the active rows, one (much later) to persist
/// a result. No lock is held across an execution's lifetime.
#[derive(Clone)]
pub struct ScheduleStore {
    conn: Arc<Mutex<Connection>>,
}

impl ScheduleStore {
    /// Wrap an open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open the store at `path` and initialise the schema.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::new(conn)
    }

    /// All active schedules, in the order the run-loop evaluates them.
    pub fn list_active(&self) -> Result<Vec<Schedule>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules \
             WHERE status = 'active' ORDER BY fixed_time, id"
        ))?;
        let rows = stmt
            .query_map([], row_to_schedule)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Fetch one schedule by ID (manual trigger surface).
    pub fn get(&self, id: i64) -> Result<Schedule> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1"
        ))?;
        stmt.query_row([id], row_to_schedule)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::ScheduleNotFound { id },
                other => StoreError::Database(other),
            })
    }

    /// Persist the outcome of one execution attempt. Called for every
    /// attempt — success, failure and timeout alike.
    pub fn record_execution(
        &self,
        id: i64,
        duration_minutes: f64,
        completed_at: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE schedules
             SET last_run_duration_minutes = ?1, last_run_at = ?2
             WHERE id = ?3",
            rusqlite::params![duration_minutes, completed_at, id],
        )?;
        if n == 0 {
            return Err(StoreError::ScheduleNotFound { id });
        }
        info!(schedule_id = id, duration_minutes, "execution recorded");
        Ok(())
    }

    /// Insert a new schedule and return it with its assigned ID.
    ///
    /// The daemon itself never creates rows; this exists for external
    /// editors and for tests.
    pub fn add(&self, mut schedule: Schedule) -> Result<Schedule> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO schedules
             (file_path, tool, project, run_config, fixed_time, interval_minutes,
              weekdays, month_days, window_start, window_end, status, timeout_seconds)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            rusqlite::params![
                schedule.file_path,
                schedule.tool.to_string(),
                schedule.project,
                schedule.run_config,
                schedule.fixed_time,
                schedule.interval_minutes,
                join_list(&schedule.weekdays),
                join_list(&schedule.month_days),
                schedule.window_start,
                schedule.window_end,
                schedule.status.to_string(),
                schedule.timeout_seconds as i64,
            ],
        )?;
        schedule.id = conn.last_insert_rowid();
        info!(schedule_id = schedule.id, file = %schedule.file_path, "schedule added");
        Ok(schedule)
    }
}

fn join_list(items: &[String]) -> Option<String> {
    if items.is_empty() {
        None
    } else {
        Some(items.join(","))
    }
}

fn row_to_schedule(row: &rusqlite::Row<'_>) -> rusqlite::Result<Schedule> {
    let id: i64 = row.get(0)?;
    let tool_raw: String = row.get(2)?;
    let status_raw: String = row.get(11)?;

    // A bad enum column is surfaced as a conversion error so the caller
    // can log and skip the pass instead of silently dropping rows.
    let tool = Tool::from_str(&tool_raw).map_err(|e| bad_column(2, id, e))?;
    let status = ScheduleStatus::from_str(&status_raw).map_err(|e| bad_column(11, id, e))?;

    let weekdays_raw: Option<String> = row.get(7)?;
    let month_days_raw: Option<String> = row.get(8)?;
    let timeout: i64 = row.get(12)?;

    Ok(Schedule {
        id,
        file_path: row.get(1)?,
        tool,
        project: non_blank(row.get(3)?),
        run_config: non_blank(row.get(4)?),
        fixed_time: non_blank(row.get(5)?),
        interval_minutes: row.get::<_, i64>(6)?.max(0) as u32,
        weekdays: parse_list(weekdays_raw.as_deref()),
        month_days: parse_list(month_days_raw.as_deref()),
        window_start: non_blank(row.get(9)?),
        window_end: non_blank(row.get(10)?),
        status,
        timeout_seconds: timeout.max(1) as u64,
        last_run_at: row.get(13)?,
        last_run_duration_minutes: row.get(14)?,
    })
}

fn bad_column(index: usize, id: i64, reason: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        format!("schedule {id}: {reason}").into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> ScheduleStore {
        ScheduleStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn schedule(file: &str, tool: Tool) -> Schedule {
        Schedule {
            id: 0,
            file_path: file.to_string(),
            tool,
            project: None,
            run_config: None,
            fixed_time: None,
            interval_minutes: 0,
            weekdays: vec![],
            month_days: vec![],
            window_start: None,
            window_end: None,
            status: ScheduleStatus::Active,
            timeout_seconds: 1800,
            last_run_at: None,
            last_run_duration_minutes: None,
        }
    }

    #[test]
    fn add_and_get_round_trip() {
        let store = memory_store();
        let mut s = schedule("/flows/load.hwf", Tool::Hop);
        s.project = Some("warehouse".into());
        s.run_config = Some("prod".into());
        s.weekdays = vec!["seg".into(), "sex".into()];

        let added = store.add(s).unwrap();
        assert!(added.id > 0);

        let fetched = store.get(added.id).unwrap();
        assert_eq!(fetched.file_path, "/flows/load.hwf");
        assert_eq!(fetched.tool, Tool::Hop);
        assert_eq!(fetched.project.as_deref(), Some("warehouse"));
        assert_eq!(fetched.weekdays, vec!["seg", "sex"]);
        assert_eq!(fetched.timeout_seconds, 1800);
        assert!(fetched.last_run_at.is_none());
    }

    #[test]
    fn list_active_skips_inactive_and_orders_by_fixed_time() {
        let store = memory_store();

        let mut late = schedule("b.kjb", Tool::Pdi);
        late.fixed_time = Some("22:00".into());
        store.add(late).unwrap();

        let mut early = schedule("a.kjb", Tool::Pdi);
        early.fixed_time = Some("06:00".into());
        store.add(early).unwrap();

        let mut off = schedule("c.kjb", Tool::Pdi);
        off.status = ScheduleStatus::Inactive;
        store.add(off).unwrap();

        let active = store.list_active().unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].file_path, "a.kjb");
        assert_eq!(active[1].file_path, "b.kjb");
    }

    #[test]
    fn record_execution_updates_both_fields() {
        let store = memory_store();
        let added = store.add(schedule("job.sh", Tool::Command)).unwrap();

        store
            .record_execution(added.id, 3.52, "2026-08-23 10:15:00")
            .unwrap();

        let fetched = store.get(added.id).unwrap();
        assert_eq!(fetched.last_run_duration_minutes, Some(3.52));
        assert_eq!(fetched.last_run_at.as_deref(), Some("2026-08-23 10:15:00"));
    }

    #[test]
    fn record_execution_unknown_id_errors() {
        let store = memory_store();
        let err = store.record_execution(999, 1.0, "2026-08-23 10:15:00");
        assert!(matches!(err, Err(StoreError::ScheduleNotFound { id: 999 })));
    }

    #[test]
    fn get_unknown_id_errors() {
        let store = memory_store();
        assert!(matches!(
            store.get(42),
            Err(StoreError::ScheduleNotFound { id: 42 })
        ));
    }
}
