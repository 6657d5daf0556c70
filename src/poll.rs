//! Poll loop manager: one timer-driven status cycle per tracked task.
//!
//! Each cycle is a spawned tokio task that waits for the poll interval,
//! issues one status query, and hands the result to a [`DeltaSink`]. A cycle
//! ends when it delivers a terminal delta, when the sink no longer knows the
//! task or already holds it as terminal, when it is stopped, or when
//! [`PollManager::cancel_all`] tears every cycle down.
//!
//! # Guarantees
//!
//! - At most one cycle per task id; [`PollManager::start`] on a tracked id is a no-op.
//! - At most one query in flight per task id: the next wait starts only after
//!   the previous query's result was handled.
//! - Query failures never end a cycle. They are logged and the next interval
//!   tries again.
//! - After [`stop`](PollManager::stop) or [`cancel_all`](PollManager::cancel_all)
//!   returns, no further delta is applied for the affected ids. Each cycle
//!   checks its `active` flag and applies the delta while holding the flag's
//!   lock; stopping clears the flag under the same lock.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use doctrack::history::TaskHistory;
//! use doctrack::poll::PollManager;
//! # use doctrack::endpoint::JobEndpoint;
//!
//! # async fn example(endpoint: Arc<dyn JobEndpoint>) {
//! let history = Arc::new(TaskHistory::new());
//! let poller = PollManager::attached(endpoint, history.clone(), Duration::from_secs(2));
//!
//! assert!(poller.start("task-1"));
//! assert!(!poller.start("task-1")); // already polling
//!
//! poller.cancel_all();
//! assert_eq!(poller.active_count(), 0);
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::constants::DEFAULT_POLL_INTERVAL_MS;
use crate::endpoint::JobEndpoint;
use crate::history::{DeltaOutcome, DeltaSink, PollControl, TaskHistory};

/// Registry entry for one running cycle.
struct CycleHandle {
    generation: u64,
    cancel: CancellationToken,
    active: Arc<Mutex<bool>>,
    join: JoinHandle<()>,
}

impl CycleHandle {
    /// Clears the active flag (waiting out any delta being applied) and wakes
    /// the cycle so it exits.
    fn signal_stop(&self) {
        *self.active.lock() = false;
        self.cancel.cancel();
    }
}

/// Owns the poll cycles of every tracked task.
pub struct PollManager {
    endpoint: Arc<dyn JobEndpoint>,
    sink: Arc<dyn DeltaSink>,
    interval: Duration,
    cycles: Arc<DashMap<String, CycleHandle>>,
    next_generation: AtomicU64,
}

impl std::fmt::Debug for PollManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollManager")
            .field("interval", &self.interval)
            .field("active_cycles", &self.cycles.len())
            .finish()
    }
}

impl PollManager {
    /// Creates a manager that delivers deltas to `sink`.
    pub fn new(endpoint: Arc<dyn JobEndpoint>, sink: Arc<dyn DeltaSink>, interval: Duration) -> Self {
        Self {
            endpoint,
            sink,
            interval,
            cycles: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Creates a manager with the default two-second interval.
    pub fn with_default_interval(endpoint: Arc<dyn JobEndpoint>, sink: Arc<dyn DeltaSink>) -> Self {
        Self::new(
            endpoint,
            sink,
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        )
    }

    /// Creates a manager feeding `history` and attaches it as the history's
    /// poll controller, so evicting a record stops its cycle.
    pub fn attached(
        endpoint: Arc<dyn JobEndpoint>,
        history: Arc<TaskHistory>,
        interval: Duration,
    ) -> Arc<Self> {
        let manager = Arc::new(Self::new(endpoint, history.clone(), interval));
        let control: Arc<dyn PollControl> = manager.clone();
        history.attach_poller(Arc::downgrade(&control));
        manager
    }

    /// The delay between queries.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts polling `task_id`. Returns `false` if a cycle already exists.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self, task_id: &str) -> bool {
        let entry = match self.cycles.entry(task_id.to_string()) {
            Entry::Occupied(_) => {
                tracing::debug!(task_id, "poll cycle already running");
                return false;
            }
            Entry::Vacant(entry) => entry,
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let active = Arc::new(Mutex::new(true));
        let cycle = PollCycle {
            task_id: task_id.to_string(),
            generation,
            interval: self.interval,
            endpoint: Arc::clone(&self.endpoint),
            sink: Arc::clone(&self.sink),
            cancel: cancel.clone(),
            active: Arc::clone(&active),
            cycles: Arc::clone(&self.cycles),
        };
        let join = tokio::spawn(cycle.run());

        entry.insert(CycleHandle {
            generation,
            cancel,
            active,
            join,
        });
        tracing::info!(task_id, interval_ms = self.interval.as_millis() as u64, "poll cycle started");
        true
    }

    /// Stops the cycle for `task_id`. Returns `true` if one was running.
    pub fn stop(&self, task_id: &str) -> bool {
        match self.cycles.remove(task_id) {
            Some((_, handle)) => {
                handle.signal_stop();
                tracing::debug!(task_id, "poll cycle stopped");
                true
            }
            None => false,
        }
    }

    /// Stops every cycle and returns how many were running.
    ///
    /// Idempotent; calling it with nothing to stop is a no-op.
    pub fn cancel_all(&self) -> usize {
        let stopped = self
            .tracked_ids()
            .iter()
            .filter(|task_id| self.stop(task_id))
            .count();
        if stopped > 0 {
            tracing::info!(stopped, "cancelled all poll cycles");
        }
        stopped
    }

    /// Stops every cycle and waits for their tasks to finish.
    pub async fn shutdown(&self) {
        let mut joins = Vec::new();
        for task_id in self.tracked_ids() {
            if let Some((_, handle)) = self.cycles.remove(&task_id) {
                handle.signal_stop();
                joins.push(handle.join);
            }
        }
        for result in futures::future::join_all(joins).await {
            if let Err(err) = result {
                tracing::warn!(error = %err, "poll cycle ended abnormally");
            }
        }
    }

    /// Returns `true` if `task_id` has a running cycle.
    pub fn is_polling(&self, task_id: &str) -> bool {
        self.cycles.contains_key(task_id)
    }

    /// Number of running cycles.
    pub fn active_count(&self) -> usize {
        self.cycles.len()
    }

    /// Ids with a running cycle.
    pub fn tracked_ids(&self) -> Vec<String> {
        self.cycles.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl PollControl for PollManager {
    fn stop(&self, task_id: &str) -> bool {
        PollManager::stop(self, task_id)
    }
}

impl Drop for PollManager {
    fn drop(&mut self) {
        for entry in self.cycles.iter() {
            entry.value().signal_stop();
        }
        self.cycles.clear();
    }
}

/// State owned by one spawned cycle.
struct PollCycle {
    task_id: String,
    generation: u64,
    interval: Duration,
    endpoint: Arc<dyn JobEndpoint>,
    sink: Arc<dyn DeltaSink>,
    cancel: CancellationToken,
    active: Arc<Mutex<bool>>,
    cycles: Arc<DashMap<String, CycleHandle>>,
}

impl PollCycle {
    async fn run(self) {
        let task_id = self.task_id.as_str();
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }

            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                result = self.endpoint.status(task_id) => result,
            };

            let delta = match result {
                Ok(delta) => delta,
                Err(err) => {
                    tracing::warn!(task_id, error = %err, "status query failed; retrying next interval");
                    continue;
                }
            };

            let terminal = delta.is_terminal();
            let status = delta.status;
            let outcome = {
                let active = self.active.lock();
                if !*active {
                    break;
                }
                self.sink.apply_delta(task_id, delta)
            };
            tracing::trace!(task_id, %status, ?outcome, "delta delivered");

            if terminal {
                tracing::info!(task_id, %status, "task finished; poll cycle stopping");
                break;
            }
            match outcome {
                DeltaOutcome::Applied => {}
                DeltaOutcome::Ignored => {
                    tracing::debug!(task_id, "task already terminal; poll cycle stopping");
                    break;
                }
                DeltaOutcome::UnknownTask => {
                    tracing::debug!(task_id, "task no longer tracked; poll cycle stopping");
                    break;
                }
            }
        }
        self.release();
    }

    /// Deregisters this cycle unless a newer cycle replaced it.
    fn release(&self) {
        *self.active.lock() = false;
        let generation = self.generation;
        self.cycles
            .remove_if(&self.task_id, |_, handle| handle.generation == generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EndpointError, EndpointErrorKind};
    use crate::types::{Language, SubmissionRequest, TaskDelta, TaskRecord, TaskStatus};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Replies from a script; once the script runs out it reports a transport error.
    #[derive(Default)]
    struct ScriptedEndpoint {
        script: parking_lot::Mutex<VecDeque<Result<TaskDelta, EndpointError>>>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Option<Duration>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedEndpoint {
        fn new(script: Vec<Result<TaskDelta, EndpointError>>) -> Self {
            Self {
                script: parking_lot::Mutex::new(script.into()),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobEndpoint for ScriptedEndpoint {
        async fn submit(&self, _request: SubmissionRequest) -> Result<String, EndpointError> {
            Ok("unused".to_string())
        }

        async fn status(&self, _task_id: &str) -> Result<TaskDelta, EndpointError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.script.lock().pop_front().unwrap_or_else(|| {
                Err(EndpointError::new(EndpointErrorKind::Transport, "script exhausted"))
            })
        }
    }

    fn history_with(id: &str) -> Arc<TaskHistory> {
        let history = Arc::new(TaskHistory::new());
        history
            .upsert_created(TaskRecord::pending(
                id,
                "a.pdf",
                Language::English,
                Language::ChineseSimplified,
            ))
            .unwrap();
        history
    }

    const INTERVAL: Duration = Duration::from_secs(2);

    #[tokio::test(start_paused = true)]
    async fn polls_until_terminal_then_stops() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![
            Ok(TaskDelta::new(TaskStatus::Converting, 10)),
            Ok(TaskDelta::success("out1")),
        ]));
        let history = history_with("t1");
        let poller = PollManager::attached(endpoint.clone(), history.clone(), INTERVAL);

        assert!(poller.start("t1"));
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        let record = history.get("t1").unwrap();
        assert_eq!(record.status, TaskStatus::Converting);
        assert_eq!(record.progress, 10);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let record = history.get("t1").unwrap();
        assert_eq!(record.status, TaskStatus::Success);
        assert_eq!(record.result_ref.as_deref(), Some("out1"));
        assert!(!poller.is_polling("t1"));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(endpoint.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_a_no_op() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![Ok(TaskDelta::new(
            TaskStatus::Converting,
            5,
        ))]));
        let poller = PollManager::new(endpoint.clone(), history_with("t1"), INTERVAL);

        assert!(poller.start("t1"));
        assert!(!poller.start("t1"));
        assert_eq!(poller.active_count(), 1);

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(endpoint.calls(), 1);
        poller.cancel_all();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_starts_create_one_cycle() {
        let endpoint = Arc::new(ScriptedEndpoint::new(
            (0..100)
                .map(|_| Ok(TaskDelta::new(TaskStatus::Converting, 5)))
                .collect(),
        ));
        let poller = Arc::new(PollManager::new(
            endpoint.clone(),
            history_with("t1"),
            Duration::from_millis(10),
        ));

        let starts: Vec<_> = (0..8)
            .map(|_| {
                let poller = poller.clone();
                tokio::spawn(async move { poller.start("t1") })
            })
            .collect();
        let mut started = 0;
        for start in starts {
            if start.await.unwrap() {
                started += 1;
            }
        }
        assert_eq!(started, 1);
        assert_eq!(poller.active_count(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(endpoint.calls() >= 1);
        assert_eq!(endpoint.max_in_flight.load(Ordering::SeqCst), 1);
        poller.shutdown().await;
        assert_eq!(poller.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_swallowed() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![
            Err(EndpointError::new(EndpointErrorKind::Transport, "connection refused")),
            Err(EndpointError::new(EndpointErrorKind::Timeout, "timed out")),
            Ok(TaskDelta::new(TaskStatus::Translating, 60)),
        ]));
        let history = history_with("t1");
        let poller = PollManager::new(endpoint.clone(), history.clone(), INTERVAL);
        poller.start("t1");

        tokio::time::sleep(Duration::from_millis(4_100)).await;
        let record = history.get("t1").unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.progress, 0);
        assert!(poller.is_polling("t1"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        let record = history.get("t1").unwrap();
        assert_eq!(record.status, TaskStatus::Translating);
        assert_eq!(record.progress, 60);
        assert!(poller.is_polling("t1"));
        poller.cancel_all();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_discards_in_flight_result() {
        let gate = Arc::new(Notify::new());
        let endpoint = Arc::new(ScriptedEndpoint {
            gate: Some(gate.clone()),
            ..ScriptedEndpoint::new(vec![Ok(TaskDelta::success("late"))])
        });
        let history = history_with("t1");
        let poller = PollManager::new(endpoint.clone(), history.clone(), INTERVAL);
        poller.start("t1");

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(endpoint.calls(), 1);

        assert_eq!(poller.cancel_all(), 1);
        gate.notify_waiters();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let record = history.get("t1").unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(endpoint.calls(), 1);
        assert_eq!(poller.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_is_idempotent() {
        let poller = PollManager::with_default_interval(
            Arc::new(ScriptedEndpoint::default()),
            Arc::new(TaskHistory::new()),
        );
        assert_eq!(poller.cancel_all(), 0);
        assert_eq!(poller.cancel_all(), 0);
        assert_eq!(poller.interval(), Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_stops_cycle() {
        let endpoint = Arc::new(ScriptedEndpoint::default());
        let history = history_with("t1");
        let poller = PollManager::attached(endpoint.clone(), history.clone(), INTERVAL);
        poller.start("t1");
        assert!(poller.is_polling("t1"));

        history.remove("t1");
        assert!(!poller.is_polling("t1"));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_record_is_already_terminal() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![Ok(TaskDelta::new(
            TaskStatus::Translating,
            50,
        ))]));
        let history = history_with("t1");
        history.apply_delta("t1", TaskDelta::failed("boom"));
        let poller = PollManager::new(endpoint.clone(), history.clone(), INTERVAL);
        poller.start("t1");

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(endpoint.calls(), 1);
        assert!(!poller.is_polling("t1"));
        assert_eq!(history.get("t1").unwrap().status, TaskStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_task_is_unknown_to_sink() {
        let endpoint = Arc::new(ScriptedEndpoint::new(
            (0..5)
                .map(|_| Ok(TaskDelta::new(TaskStatus::Converting, 10)))
                .collect(),
        ));
        let history = Arc::new(TaskHistory::new());
        let poller = PollManager::new(endpoint.clone(), history.clone(), INTERVAL);
        assert!(poller.start("never-registered"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(endpoint.calls(), 1);
        assert!(!poller.is_polling("never-registered"));
        assert!(history.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn one_query_in_flight_per_task() {
        let endpoint = Arc::new(ScriptedEndpoint {
            delay: Some(Duration::from_secs(5)),
            ..ScriptedEndpoint::new(
                (0..10)
                    .map(|i| Ok(TaskDelta::new(TaskStatus::Converting, i * 10)))
                    .collect(),
            )
        });
        let history = history_with("t1");
        let poller = PollManager::new(endpoint.clone(), history.clone(), INTERVAL);
        poller.start("t1");

        // Each round trip is 2s wait + 5s response.
        tokio::time::sleep(Duration::from_millis(14_500)).await;
        assert_eq!(endpoint.calls(), 2);
        assert_eq!(endpoint.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(history.get("t1").unwrap().progress, 10);
        poller.cancel_all();
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_stop_starts_fresh_cycle() {
        let endpoint = Arc::new(ScriptedEndpoint::default());
        let poller = PollManager::new(endpoint.clone(), history_with("t1"), INTERVAL);
        assert!(poller.start("t1"));
        assert!(poller.stop("t1"));
        assert!(!poller.stop("t1"));
        assert!(poller.start("t1"));

        // The first cycle's release must not deregister the second.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(poller.is_polling("t1"));
        poller.cancel_all();
    }
}
