//! The engine facade: submission, history, and polling wired together.
//!
//! [`TaskTracker`] follows the order a presentation layer drives the engine
//! in: submit a document, record the pending task, poll it until it finishes,
//! and list or delete history entries.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use doctrack::endpoint::StaticCredentials;
//! use doctrack::{Artifact, EngineConfig, Language, TaskTracker};
//! # use doctrack::endpoint::JobEndpoint;
//!
//! # async fn example(endpoint: Arc<dyn JobEndpoint>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::load()?;
//! let tracker = TaskTracker::from_config(endpoint, Arc::new(StaticCredentials::configured()), &config);
//!
//! let record = tracker
//!     .submit(Artifact::pdf("a.pdf", b"%PDF".to_vec()), Language::English, Language::ChineseSimplified)
//!     .await?;
//! assert!(tracker.poller().is_polling(&record.id));
//!
//! for record in &tracker.list() {
//!     println!("{} {} {}%", record.display_name, record.status, record.progress);
//! }
//! tracker.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::endpoint::{CredentialProvider, JobEndpoint, RecordStore};
use crate::error::{EndpointError, EndpointErrorKind, TaskError};
use crate::history::{HistoryListing, TaskHistory};
use crate::poll::PollManager;
use crate::submit::TaskSubmitter;
use crate::types::{Artifact, Language, TaskRecord};

/// Submits conversion jobs and keeps their records current.
#[derive(Debug)]
pub struct TaskTracker {
    submitter: TaskSubmitter,
    history: Arc<TaskHistory>,
    poller: Arc<PollManager>,
}

impl TaskTracker {
    /// Creates a tracker polling every `interval`, with default submission limits.
    pub fn new(
        endpoint: Arc<dyn JobEndpoint>,
        credentials: Arc<dyn CredentialProvider>,
        interval: Duration,
    ) -> Self {
        let submitter = TaskSubmitter::new(endpoint.clone(), credentials);
        Self::assemble(submitter, endpoint, interval)
    }

    /// Creates a tracker from an [`EngineConfig`].
    pub fn from_config(
        endpoint: Arc<dyn JobEndpoint>,
        credentials: Arc<dyn CredentialProvider>,
        config: &EngineConfig,
    ) -> Self {
        let submitter = TaskSubmitter::from_config(endpoint.clone(), credentials, config);
        Self::assemble(submitter, endpoint, config.poll_interval())
    }

    fn assemble(submitter: TaskSubmitter, endpoint: Arc<dyn JobEndpoint>, interval: Duration) -> Self {
        let history = Arc::new(TaskHistory::new());
        let poller = PollManager::attached(endpoint, history.clone(), interval);
        Self {
            submitter,
            history,
            poller,
        }
    }

    /// Submits `artifact`, records the task as `pending`, and starts polling it.
    ///
    /// # Errors
    ///
    /// Returns the submitter's [`TaskError`] unchanged, or
    /// [`TaskError::DuplicateId`] if the endpoint reused a tracked id.
    pub async fn submit(
        &self,
        artifact: Artifact,
        source_language: Language,
        target_language: Language,
    ) -> Result<TaskRecord, TaskError> {
        let (task_id, display_name) = self
            .submitter
            .submit_named(artifact, source_language, target_language)
            .await?;

        let record = TaskRecord::pending(task_id, display_name, source_language, target_language);
        self.history.upsert_created(record.clone())?;
        self.poller.start(&record.id);
        Ok(record)
    }

    /// Registers an already-known record, polling it unless it is terminal.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::DuplicateId`] if the id is already tracked.
    pub fn track(&self, record: TaskRecord) -> Result<(), TaskError> {
        let record = record.settle();
        let task_id = record.id.clone();
        let terminal = record.is_terminal();
        self.history.upsert_created(record)?;
        if !terminal {
            self.poller.start(&task_id);
        }
        Ok(())
    }

    /// Reconciles with the listing in `store` and resumes polling for every
    /// unfinished record. Returns the ids whose polling was (re)started.
    ///
    /// # Errors
    ///
    /// Returns the store's [`EndpointError`]; local state is unchanged then.
    pub async fn refresh(&self, store: &dyn RecordStore) -> Result<Vec<String>, EndpointError> {
        let snapshot = store.fetch_history().await?;
        let inserted = self.history.merge_snapshot(snapshot);

        let resumed: Vec<String> = self
            .history
            .list()
            .iter()
            .filter(|record| !record.is_terminal())
            .filter(|record| self.poller.start(&record.id))
            .map(|record| record.id.clone())
            .collect();

        tracing::debug!(
            inserted = inserted.len(),
            resumed = resumed.len(),
            "history refreshed"
        );
        Ok(resumed)
    }

    /// Deletes `task_id` from `store`, then evicts it locally (which stops its
    /// poll cycle). A record the store no longer knows is still evicted.
    ///
    /// # Errors
    ///
    /// Returns the store's [`EndpointError`] for anything but `NotFound`; the
    /// local record is kept then.
    pub async fn delete(
        &self,
        store: &dyn RecordStore,
        task_id: &str,
    ) -> Result<Option<TaskRecord>, EndpointError> {
        match store.delete(task_id).await {
            Ok(()) => {}
            Err(err) if err.kind == EndpointErrorKind::NotFound => {
                tracing::debug!(task_id, "record already gone from store");
            }
            Err(err) => {
                tracing::warn!(task_id, error = %err, "delete failed");
                return Err(err);
            }
        }
        Ok(self.history.remove(task_id))
    }

    /// Snapshot of all records, newest first.
    pub fn list(&self) -> HistoryListing {
        self.history.list()
    }

    /// The underlying history.
    pub fn history(&self) -> &Arc<TaskHistory> {
        &self.history
    }

    /// The underlying poll manager.
    pub fn poller(&self) -> &Arc<PollManager> {
        &self.poller
    }

    /// The underlying submitter.
    pub fn submitter(&self) -> &TaskSubmitter {
        &self.submitter
    }

    /// Stops all polling. Records keep their last applied state.
    pub fn cancel_all(&self) -> usize {
        self.poller.cancel_all()
    }

    /// Stops all polling and waits for every cycle to finish.
    pub async fn shutdown(&self) {
        self.poller.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::StaticCredentials;
    use crate::types::{SubmissionRequest, TaskDelta, TaskStatus};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// A job runner whose task states are set directly by the test.
    #[derive(Default)]
    struct FakeRunner {
        next_id: Mutex<u32>,
        states: Mutex<HashMap<String, TaskDelta>>,
        stored: Mutex<Vec<TaskRecord>>,
        deleted: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        fn set(&self, task_id: &str, delta: TaskDelta) {
            self.states.lock().insert(task_id.to_string(), delta);
        }
    }

    #[async_trait]
    impl JobEndpoint for FakeRunner {
        async fn submit(&self, _request: SubmissionRequest) -> Result<String, EndpointError> {
            let mut next = self.next_id.lock();
            *next += 1;
            Ok(format!("t{next}"))
        }

        async fn status(&self, task_id: &str) -> Result<TaskDelta, EndpointError> {
            self.states
                .lock()
                .get(task_id)
                .cloned()
                .ok_or_else(|| EndpointError::new(EndpointErrorKind::NotFound, "unknown task"))
        }
    }

    #[async_trait]
    impl RecordStore for FakeRunner {
        async fn fetch_history(&self) -> Result<Vec<TaskRecord>, EndpointError> {
            Ok(self.stored.lock().clone())
        }

        async fn delete(&self, task_id: &str) -> Result<(), EndpointError> {
            if task_id == "locked" {
                return Err(EndpointError::new(EndpointErrorKind::Rejected, "in use"));
            }
            self.deleted.lock().push(task_id.to_string());
            Ok(())
        }
    }

    fn tracker(runner: Arc<FakeRunner>) -> TaskTracker {
        TaskTracker::new(
            runner,
            Arc::new(StaticCredentials::configured()),
            Duration::from_secs(2),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn submit_records_and_polls() {
        let runner = Arc::new(FakeRunner::default());
        let tracker = tracker(runner.clone());

        let record = tracker
            .submit(Artifact::pdf("a.pdf", b"x".to_vec()), Language::English, Language::ChineseSimplified)
            .await
            .unwrap();
        assert_eq!(record.id, "t1");
        assert_eq!(record.status, TaskStatus::Pending);
        assert!(tracker.poller().is_polling("t1"));

        runner.set("t1", TaskDelta::success("out1"));
        tokio::time::sleep(Duration::from_millis(2_100)).await;

        let listed = tracker.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed.iter().next().unwrap().status, TaskStatus::Success);
        assert!(!tracker.poller().is_polling("t1"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_submission_records_nothing() {
        let runner = Arc::new(FakeRunner::default());
        let tracker = TaskTracker::new(
            runner,
            Arc::new(StaticCredentials::missing()),
            Duration::from_secs(2),
        );
        let err = tracker
            .submit(Artifact::pdf("a.pdf", b"x".to_vec()), Language::English, Language::French)
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(tracker.list().is_empty());
        assert_eq!(tracker.poller().active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn track_skips_polling_for_terminal_records() {
        let tracker = tracker(Arc::new(FakeRunner::default()));
        let mut done = TaskRecord::pending("done", "a.pdf", Language::English, Language::German);
        done.status = TaskStatus::Failed;
        tracker.track(done).unwrap();
        tracker
            .track(TaskRecord::pending("live", "b.pdf", Language::English, Language::German))
            .unwrap();

        assert!(!tracker.poller().is_polling("done"));
        assert!(tracker.poller().is_polling("live"));
        assert!(matches!(
            tracker.track(TaskRecord::pending("live", "b.pdf", Language::English, Language::German)),
            Err(TaskError::DuplicateId { .. })
        ));
        tracker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_resumes_unfinished_records() {
        let runner = Arc::new(FakeRunner::default());
        let mut finished = TaskRecord::pending("old", "old.pdf", Language::English, Language::Japanese);
        finished.status = TaskStatus::Success;
        finished.progress = 100;
        finished.result_ref = Some("/download/old".to_string());
        let mut running = TaskRecord::pending("run", "run.pdf", Language::English, Language::Japanese);
        running.status = TaskStatus::Translating;
        running.progress = 60;
        *runner.stored.lock() = vec![finished, running];

        let tracker = tracker(runner.clone());
        let resumed = tracker.refresh(runner.as_ref()).await.unwrap();
        assert_eq!(resumed, vec!["run".to_string()]);
        assert_eq!(tracker.list().len(), 2);

        // A second refresh finds the cycle already running.
        assert!(tracker.refresh(runner.as_ref()).await.unwrap().is_empty());
        tracker.cancel_all();
    }

    #[tokio::test(start_paused = true)]
    async fn success_without_result_ref_is_polled_until_published() {
        let runner = Arc::new(FakeRunner::default());
        let mut tracked = TaskRecord::pending("tracked", "a.pdf", Language::English, Language::German);
        tracked.status = TaskStatus::Success;
        let mut stored = TaskRecord::pending("stored", "b.pdf", Language::English, Language::German);
        stored.status = TaskStatus::Success;
        stored.progress = 250;
        *runner.stored.lock() = vec![stored];

        let tracker = tracker(runner.clone());
        tracker.track(tracked).unwrap();
        assert!(tracker.poller().is_polling("tracked"));
        assert_eq!(tracker.refresh(runner.as_ref()).await.unwrap(), vec!["stored".to_string()]);

        let record = tracker.history().get("stored").unwrap();
        assert_eq!(record.status, TaskStatus::Translating);
        assert_eq!(record.progress, 99);

        runner.set("stored", TaskDelta::success("/download/stored"));
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        let record = tracker.history().get("stored").unwrap();
        assert_eq!(record.status, TaskStatus::Success);
        assert_eq!(record.result_ref.as_deref(), Some("/download/stored"));
        assert!(!tracker.poller().is_polling("stored"));
        tracker.cancel_all();
    }

    #[tokio::test(start_paused = true)]
    async fn delete_evicts_and_stops_polling() {
        let runner = Arc::new(FakeRunner::default());
        let tracker = tracker(runner.clone());
        tracker
            .track(TaskRecord::pending("t1", "a.pdf", Language::English, Language::Korean))
            .unwrap();

        let removed = tracker.delete(runner.as_ref(), "t1").await.unwrap();
        assert_eq!(removed.map(|r| r.id), Some("t1".to_string()));
        assert!(!tracker.poller().is_polling("t1"));
        assert_eq!(*runner.deleted.lock(), vec!["t1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_delete_keeps_local_record() {
        let runner = Arc::new(FakeRunner::default());
        let tracker = tracker(runner.clone());
        tracker
            .track(TaskRecord::pending("locked", "a.pdf", Language::English, Language::Korean))
            .unwrap();

        let err = tracker.delete(runner.as_ref(), "locked").await.unwrap_err();
        assert_eq!(err.kind, EndpointErrorKind::Rejected);
        assert!(tracker.history().contains("locked"));
        assert!(tracker.poller().is_polling("locked"));
        tracker.cancel_all();
    }
}
