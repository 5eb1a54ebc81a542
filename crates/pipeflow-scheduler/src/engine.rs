//! The run-loop: evaluate, dispatch, sleep, repeat.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use pipeflow_core::SchedulerConfig;
use pipeflow_store::{Schedule, ScheduleStore};

use crate::due::is_due;
use crate::error::Result;

/// Hands a due schedule off for execution and returns the handle the
/// engine tracks for overlap detection and shutdown draining. The
/// daemon wires this to the job runner; tests substitute recorders.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, schedule: Schedule) -> JoinHandle<()>;
}

pub struct SchedulerEngine {
    store: ScheduleStore,
    dispatcher: Arc<dyn Dispatcher>,
    config: SchedulerConfig,
    in_flight: DashMap<i64, JoinHandle<()>>,
}

impl SchedulerEngine {
    pub fn new(store: ScheduleStore, dispatcher: Arc<dyn Dispatcher>, config: SchedulerConfig) -> Self {
        Self {
            store,
            dispatcher,
            config,
            in_flight: DashMap::new(),
        }
    }

    /// Run until the shutdown signal flips, then drain in-flight jobs
    /// for up to the configured grace period.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_secs = self.config.tick_secs,
            allow_overlap = self.config.allow_overlap,
            "scheduler engine started"
        );

        while !*shutdown.borrow() {
            let delay = match self.pass() {
                Ok(dispatched) => {
                    if dispatched > 0 {
                        info!(dispatched, "evaluation pass complete");
                    }
                    self.config.tick_secs
                }
                Err(e) => {
                    error!("evaluation pass failed: {e}");
                    self.config.backoff_secs
                }
            };
            if sleep_interruptible(delay, &mut shutdown).await {
                break;
            }
        }

        info!("scheduler engine stopping");
        self.drain(Duration::from_secs(self.config.shutdown_grace_secs))
            .await;
    }

    /// One evaluation pass over the active schedules. Returns how many
    /// jobs were dispatched.
    fn pass(&self) -> Result<usize> {
        self.in_flight.retain(|_, handle| !handle.is_finished());

        let now = Local::now().naive_local();
        let mut dispatched = 0;

        for schedule in self.store.list_active()? {
            if !is_due(&schedule, now) {
                continue;
            }

            let still_running = self
                .in_flight
                .get(&schedule.id)
                .is_some_and(|h| !h.is_finished());
            if still_running && !self.config.allow_overlap {
                info!(
                    schedule_id = schedule.id,
                    artifact = schedule.artifact_name(),
                    "previous run still executing, skipping"
                );
                continue;
            }

            let id = schedule.id;
            let handle = self.dispatcher.dispatch(schedule);
            self.in_flight.insert(id, handle);
            dispatched += 1;
        }

        Ok(dispatched)
    }

    /// Wait for in-flight jobs, giving up at the deadline. Jobs that
    /// outlive it keep running detached; the process is about to exit
    /// anyway and their results were persisted by the runner if they
    /// finish in time.
    async fn drain(&self, grace: Duration) {
        let ids: Vec<i64> = self.in_flight.iter().map(|e| *e.key()).collect();
        if ids.is_empty() {
            return;
        }
        info!(jobs = ids.len(), "waiting for in-flight jobs");

        let deadline = Instant::now() + grace;
        for id in ids {
            if let Some((_, handle)) = self.in_flight.remove(&id) {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if tokio::time::timeout(remaining, handle).await.is_err() {
                    warn!(schedule_id = id, "job still running at shutdown deadline");
                }
            }
        }
    }
}

/// Sleep in one-second slices so a shutdown request interrupts a tick
/// within a second. Returns true when shutdown was requested.
async fn sleep_interruptible(secs: u64, shutdown: &mut watch::Receiver<bool>) -> bool {
    for _ in 0..secs {
        if *shutdown.borrow() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
    *shutdown.borrow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeflow_store::{ScheduleStatus, Tool};
    use rusqlite::Connection;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Dispatcher whose jobs run for a caller-chosen time.
    struct Recording {
        count: AtomicUsize,
        job_millis: u64,
    }

    impl Recording {
        fn new(job_millis: u64) -> Arc<Self> {
            Arc::new(Self {
                count: AtomicUsize::new(0),
                job_millis,
            })
        }
    }

    impl Dispatcher for Recording {
        fn dispatch(&self, _schedule: Schedule) -> JoinHandle<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            let millis = self.job_millis;
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(millis)).await;
            })
        }
    }

    fn store_with(schedules: &[(&str, ScheduleStatus)]) -> ScheduleStore {
        let store = ScheduleStore::new(Connection::open_in_memory().unwrap()).unwrap();
        for (file, status) in schedules {
            store
                .add(Schedule {
                    id: 0,
                    file_path: file.to_string(),
                    tool: Tool::Command,
                    project: None,
                    run_config: None,
                    fixed_time: None,
                    interval_minutes: 0,
                    weekdays: vec![],
                    month_days: vec![],
                    window_start: None,
                    window_end: None,
                    status: *status,
                    timeout_seconds: 1800,
                    last_run_at: None,
                    last_run_duration_minutes: None,
                })
                .unwrap();
        }
        store
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            tick_secs: 1,
            backoff_secs: 1,
            shutdown_grace_secs: 1,
            allow_overlap: false,
        }
    }

    #[tokio::test]
    async fn pass_dispatches_due_active_schedules_only() {
        let store = store_with(&[
            ("a.sh", ScheduleStatus::Active),
            ("b.sh", ScheduleStatus::Active),
            ("c.sh", ScheduleStatus::Inactive),
        ]);
        let dispatcher = Recording::new(0);
        let engine = SchedulerEngine::new(store, dispatcher.clone(), config());

        let dispatched = engine.pass().unwrap();
        assert_eq!(dispatched, 2);
        assert_eq!(dispatcher.count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn live_run_is_not_dispatched_again() {
        let store = store_with(&[("a.sh", ScheduleStatus::Active)]);
        let dispatcher = Recording::new(5_000);
        let engine = SchedulerEngine::new(store, dispatcher.clone(), config());

        assert_eq!(engine.pass().unwrap(), 1);
        assert_eq!(engine.pass().unwrap(), 0);
        assert_eq!(dispatcher.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn overlap_allowed_when_configured() {
        let store = store_with(&[("a.sh", ScheduleStatus::Active)]);
        let dispatcher = Recording::new(5_000);
        let mut cfg = config();
        cfg.allow_overlap = true;
        let engine = SchedulerEngine::new(store, dispatcher.clone(), cfg);

        assert_eq!(engine.pass().unwrap(), 1);
        assert_eq!(engine.pass().unwrap(), 1);
        assert_eq!(dispatcher.count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn finished_run_allows_redispatch() {
        let store = store_with(&[("a.sh", ScheduleStatus::Active)]);
        let dispatcher = Recording::new(0);
        let engine = SchedulerEngine::new(store, dispatcher.clone(), config());

        assert_eq!(engine.pass().unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.pass().unwrap(), 1);
    }

    #[tokio::test]
    async fn run_stops_promptly_on_shutdown() {
        let store = store_with(&[("a.sh", ScheduleStatus::Active)]);
        let engine = Arc::new(SchedulerEngine::new(store, Recording::new(0), config()));
        let (tx, rx) = watch::channel(false);

        let task = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run(rx).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .expect("engine did not stop in time")
            .unwrap();
    }
}
