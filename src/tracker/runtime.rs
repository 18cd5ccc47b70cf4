use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::engine::TaskTracker;
use crate::repository::TaskRepository;

/// Periods of the two independent loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Fast local tick that refreshes progress and detects ready tasks.
    pub tick_interval: Duration,
    /// Slow authoritative re-fetch.
    pub poll_interval: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// The running timers of one tracker.
///
/// `shutdown` stops both loops and waits for them. Dropping the runtime
/// without calling it aborts them, so no timer outlives its owner.
pub struct TrackerRuntime {
    shutdown_tx: watch::Sender<bool>,
    tick_handle: Option<JoinHandle<()>>,
    poll_handle: Option<JoinHandle<()>>,
}

impl TrackerRuntime {
    pub fn spawn<R>(tracker: Arc<TaskTracker<R>>, schedule: Schedule) -> Self
    where
        R: TaskRepository + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tick_handle = tokio::spawn(run_tick_loop(
            tracker.clone(),
            schedule.tick_interval,
            shutdown_rx.clone(),
        ));
        let poll_handle = tokio::spawn(run_poll_loop(
            tracker,
            schedule.poll_interval,
            shutdown_rx,
        ));

        info!(
            "Tracker runtime started (tick {:?}, poll {:?})",
            schedule.tick_interval, schedule.poll_interval
        );

        Self {
            shutdown_tx,
            tick_handle: Some(tick_handle),
            poll_handle: Some(poll_handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.tick_handle.as_ref().is_some_and(|h| !h.is_finished())
            || self.poll_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops both loops and waits until they have exited.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in [self.tick_handle.take(), self.poll_handle.take()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::error!("Tracker loop ended abnormally: {}", e);
                }
            }
        }
        info!("Tracker runtime stopped");
    }
}

impl Drop for TrackerRuntime {
    fn drop(&mut self) {
        for handle in [self.tick_handle.take(), self.poll_handle.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}

async fn run_tick_loop<R>(
    tracker: Arc<TaskTracker<R>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    R: TaskRepository + 'static,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Completions run beside the tick so a slow call never delays it.
    let mut completions = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            Some(_) = completions.join_next(), if !completions.is_empty() => {}
            _ = ticker.tick() => {
                let ready = tracker.tick(tracker.now());
                for id in ready {
                    let tracker = tracker.clone();
                    completions.spawn(async move {
                        tracker.auto_complete(&id).await;
                    });
                }
            }
        }
    }

    // Aborts any completion still waiting on the repository.
    completions.shutdown().await;
    debug!("Tick loop stopped");
}

async fn run_poll_loop<R>(
    tracker: Arc<TaskTracker<R>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    R: TaskRepository + 'static,
{
    // The caller loads before starting the runtime, so the first poll waits a period.
    let mut poller = interval_at(Instant::now() + period, period);
    poller.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = poller.tick() => {
                debug!("Reconciliation poll");
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = tracker.poll() => {}
                }
            }
        }
    }

    debug!("Poll loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{OwnerId, OwnerScope, TaskId, TaskKind, TaskRecord, TaskStatus};
    use crate::repository::mock::MockRepository;
    use crate::repository::AuthToken;
    use chrono::{TimeZone, Utc};

    fn schedule() -> Schedule {
        Schedule {
            tick_interval: Duration::from_secs(1),
            poll_interval: Duration::from_secs(30),
        }
    }

    fn task(id: &str, duration_seconds: u64) -> TaskRecord {
        TaskRecord {
            id: TaskId::new(id),
            owner_id: OwnerId::new("party-1"),
            kind: TaskKind::Explore {
                party: vec![OwnerId::new("d-1")],
                loot: vec![],
            },
            started_at: Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
            duration_seconds,
            status: TaskStatus::Active,
        }
    }

    async fn loaded_tracker(
        tasks: Vec<TaskRecord>,
    ) -> (Arc<TaskTracker<MockRepository>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        ));
        let tracker = Arc::new(TaskTracker::new(
            MockRepository::with_tasks(tasks),
            clock.clone(),
            AuthToken::new("token"),
        ));
        tracker.load(&OwnerScope::new("party-1")).await.unwrap();
        (tracker, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn tick_loop_completes_ready_task_once() {
        let (tracker, clock) = loaded_tracker(vec![task("e-1", 5)]).await;
        let runtime = TrackerRuntime::spawn(tracker.clone(), schedule());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(tracker.repository().complete_count(), 0);

        clock.advance(chrono::Duration::seconds(5));
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(tracker.repository().complete_count(), 1);
        assert!(tracker.all_active().is_empty());
        runtime.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn poll_loop_reconciles_on_its_own_schedule() {
        let (tracker, _clock) = loaded_tracker(vec![task("e-1", 3600)]).await;
        let runtime = TrackerRuntime::spawn(tracker.clone(), schedule());
        assert_eq!(tracker.repository().list_count(), 1);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(tracker.repository().list_count(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(tracker.repository().list_count(), 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(tracker.repository().list_count(), 3);
        runtime.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_fires_after_shutdown() {
        let (tracker, clock) = loaded_tracker(vec![task("e-1", 5)]).await;
        let runtime = TrackerRuntime::spawn(tracker.clone(), schedule());
        tokio::time::sleep(Duration::from_secs(1)).await;

        runtime.shutdown().await;
        let lists = tracker.repository().list_count();

        clock.advance(chrono::Duration::hours(1));
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(tracker.repository().complete_count(), 0);
        assert_eq!(tracker.repository().list_count(), lists);
        assert_eq!(Arc::strong_count(&tracker), 1, "loops must release the tracker");
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_runtime_aborts_loops() {
        let (tracker, clock) = loaded_tracker(vec![task("e-1", 5)]).await;
        let runtime = TrackerRuntime::spawn(tracker.clone(), schedule());
        assert!(runtime.is_running());
        drop(runtime);

        clock.advance(chrono::Duration::hours(1));
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(tracker.repository().complete_count(), 0);
        assert_eq!(tracker.repository().list_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_completion_leaves_task_active() {
        let (tracker, clock) = loaded_tracker(vec![task("e-1", 5)]).await;
        tracker
            .repository()
            .hold_completions(Arc::new(tokio::sync::Notify::new()));
        let runtime = TrackerRuntime::spawn(tracker.clone(), schedule());

        clock.advance(chrono::Duration::seconds(5));
        tokio::time::sleep(Duration::from_secs(2)).await;
        let id = TaskId::new("e-1");
        assert_eq!(tracker.repository().complete_count(), 1);
        assert_eq!(tracker.get(&id).unwrap().status(), TaskStatus::Completing);

        runtime.shutdown().await;

        assert_eq!(tracker.in_flight(), 0);
        assert_eq!(tracker.get(&id).unwrap().status(), TaskStatus::Active);
        assert_eq!(tracker.tick(tracker.now()), vec![id]);
    }
}
