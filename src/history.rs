//! History reconciler: the owned collection of every known task.
//!
//! [`TaskHistory`] is the single writer of [`TaskRecord`]s. Other components
//! request mutations through its narrow contract:
//! [`upsert_created`](TaskHistory::upsert_created),
//! [`apply_delta`](TaskHistory::apply_delta), and
//! [`remove`](TaskHistory::remove).
//!
//! # Merge Rules
//!
//! - Deltas for unknown ids are discarded; eviction can race an in-flight poll.
//! - Terminal records ignore every further delta.
//! - `status`, `result_ref`, and `error_detail` are overwritten; `progress`
//!   only moves forward.
//! - A `success` delta without a result reference does not finish the task:
//!   the current status is kept and progress rises to at most 99.
//!
//! # Concurrency
//!
//! The collection sits behind a `parking_lot::RwLock`. Writers take the lock
//! for the duration of one synchronous merge and never across an `.await`.
//!
//! # Examples
//!
//! ```
//! use doctrack::history::{DeltaOutcome, TaskHistory};
//! use doctrack::{Language, TaskDelta, TaskRecord, TaskStatus};
//!
//! let history = TaskHistory::new();
//! history
//!     .upsert_created(TaskRecord::pending("t1", "a.pdf", Language::English, Language::ChineseSimplified))
//!     .unwrap();
//!
//! let outcome = history.apply_delta("t1", TaskDelta::new(TaskStatus::Converting, 10));
//! assert_eq!(outcome, DeltaOutcome::Applied);
//! assert_eq!(history.get("t1").unwrap().progress, 10);
//!
//! assert_eq!(history.apply_delta("nope", TaskDelta::new(TaskStatus::Converting, 10)), DeltaOutcome::UnknownTask);
//! ```

use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::TaskError;
use crate::types::task::{TaskDelta, TaskRecord, TaskStatus};

/// What happened to a delta handed to [`TaskHistory::apply_delta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// The record was updated.
    Applied,
    /// No record with this id; the delta was discarded.
    UnknownTask,
    /// The record is terminal; the delta was discarded.
    Ignored,
}

/// Receives status deltas produced by the poller.
///
/// [`TaskHistory`] is the production sink. Tests substitute recording sinks
/// to exercise the poller without a history.
pub trait DeltaSink: Send + Sync {
    /// Applies one delta for `task_id`.
    fn apply_delta(&self, task_id: &str, delta: TaskDelta) -> DeltaOutcome;
}

/// Stops polling for evicted records.
///
/// Implemented by [`PollManager`](crate::poll::PollManager).
pub trait PollControl: Send + Sync {
    /// Stops the poll cycle for `task_id`, if any. Returns `true` if one was running.
    fn stop(&self, task_id: &str) -> bool;
}

/// The ordered, id-keyed collection of tracked tasks.
#[derive(Default)]
pub struct TaskHistory {
    records: RwLock<IndexMap<String, TaskRecord>>,
    poller: RwLock<Option<Weak<dyn PollControl>>>,
}

impl std::fmt::Debug for TaskHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHistory")
            .field("len", &self.len())
            .field("poller_attached", &self.poller.read().is_some())
            .finish()
    }
}

impl TaskHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the poll controller that [`remove`](Self::remove) signals.
    ///
    /// Held weakly so the poller, which owns a strong handle to this history,
    /// does not form a reference cycle with it.
    pub fn attach_poller(&self, poller: Weak<dyn PollControl>) {
        *self.poller.write() = Some(poller);
    }

    /// Inserts a freshly created record, settled with [`TaskRecord::settle`].
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::DuplicateId`] if a record with the same id exists.
    /// Creation happens once per id, so this indicates a programming error.
    pub fn upsert_created(&self, record: TaskRecord) -> Result<(), TaskError> {
        let record = record.settle();
        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            tracing::error!(task_id = %record.id, "duplicate task id on create");
            return Err(TaskError::DuplicateId { task_id: record.id });
        }
        tracing::debug!(task_id = %record.id, display_name = %record.display_name, "task created");
        records.insert(record.id.clone(), record);
        Ok(())
    }

    /// Merges a status delta into the record for `task_id`.
    pub fn apply_delta(&self, task_id: &str, delta: TaskDelta) -> DeltaOutcome {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(task_id) else {
            tracing::debug!(task_id, status = %delta.status, "discarding delta for unknown task");
            return DeltaOutcome::UnknownTask;
        };
        merge(record, delta)
    }

    /// Evicts the record for `task_id` and stops any poll cycle for it.
    pub fn remove(&self, task_id: &str) -> Option<TaskRecord> {
        let removed = self.records.write().shift_remove(task_id);

        let poller = self.poller.read().as_ref().and_then(Weak::upgrade);
        if let Some(poller) = poller {
            if poller.stop(task_id) {
                tracing::debug!(task_id, "stopped polling for evicted task");
            }
        }

        removed
    }

    /// Returns a copy of the record for `task_id`.
    pub fn get(&self, task_id: &str) -> Option<TaskRecord> {
        self.records.read().get(task_id).cloned()
    }

    /// Returns `true` if a record with this id exists.
    pub fn contains(&self, task_id: &str) -> bool {
        self.records.read().contains_key(task_id)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns `true` if there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// A snapshot of all records, most recently created first.
    ///
    /// Records created at the same instant are ordered by insertion, the
    /// later insertion first.
    pub fn list(&self) -> HistoryListing {
        let mut records: Vec<TaskRecord> = self.records.read().values().rev().cloned().collect();
        // Stable sort keeps reverse insertion order among equal timestamps.
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        HistoryListing {
            records: Arc::from(records),
        }
    }

    /// Reconciles a listing fetched from the external record store.
    ///
    /// Unknown records are settled and inserted. Known records receive the stored record
    /// as a delta, so the usual monotonic and terminal rules hold; a stored
    /// record that is behind the local one (lower progress, not terminal) is
    /// skipped so a stale listing cannot move a task back a stage.
    /// Returns the ids that were newly inserted.
    pub fn merge_snapshot(&self, snapshot: Vec<TaskRecord>) -> Vec<String> {
        let mut records = self.records.write();
        let mut inserted = Vec::new();
        for incoming in snapshot {
            match records.get_mut(&incoming.id) {
                Some(existing) => {
                    if incoming.is_terminal() || incoming.progress >= existing.progress {
                        merge(existing, incoming.to_delta());
                    }
                }
                None => {
                    inserted.push(incoming.id.clone());
                    records.insert(incoming.id.clone(), incoming.settle());
                }
            }
        }
        tracing::debug!(inserted = inserted.len(), total = records.len(), "merged history snapshot");
        inserted
    }
}

impl DeltaSink for TaskHistory {
    fn apply_delta(&self, task_id: &str, delta: TaskDelta) -> DeltaOutcome {
        TaskHistory::apply_delta(self, task_id, delta)
    }
}

fn merge(record: &mut TaskRecord, delta: TaskDelta) -> DeltaOutcome {
    if record
        .status
        .validate_transition(&record.id, &delta.status)
        .is_err()
    {
        tracing::debug!(
            task_id = %record.id,
            current = %record.status,
            reported = %delta.status,
            "ignoring delta for terminal task"
        );
        return DeltaOutcome::Ignored;
    }

    let terminal = delta.is_terminal();
    let progress = delta.progress.min(100);
    match delta.status {
        TaskStatus::Success if terminal => {
            record.status = TaskStatus::Success;
            record.progress = 100;
            record.result_ref = delta.result_ref;
            record.error_detail = None;
        }
        TaskStatus::Success => {
            // Finished without a published output: hold the stage, keep polling.
            raise_progress(record, progress.min(99));
        }
        TaskStatus::Failed => {
            record.error_detail = Some(delta.error_detail_or_default());
            record.status = TaskStatus::Failed;
            record.result_ref = None;
        }
        status => {
            record.status = status;
            record.result_ref = None;
            record.error_detail = None;
            raise_progress(record, progress);
        }
    }
    DeltaOutcome::Applied
}

fn raise_progress(record: &mut TaskRecord, progress: u8) {
    if progress >= record.progress {
        record.progress = progress;
    }
}

/// A finite, restartable snapshot of the history in display order.
///
/// Iterating does not consume the listing; call [`iter`](Self::iter) as many
/// times as needed. Cloning is cheap.
#[derive(Debug, Clone, Default)]
pub struct HistoryListing {
    records: Arc<[TaskRecord]>,
}

impl HistoryListing {
    /// Iterates over the records, most recent first.
    pub fn iter(&self) -> std::slice::Iter<'_, TaskRecord> {
        self.records.iter()
    }

    /// Number of records in the snapshot.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copies the records into a `Vec`.
    pub fn to_vec(&self) -> Vec<TaskRecord> {
        self.records.to_vec()
    }
}

impl<'a> IntoIterator for &'a HistoryListing {
    type Item = &'a TaskRecord;
    type IntoIter = std::slice::Iter<'a, TaskRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
