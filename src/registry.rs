//! Process-wide job status registry for external pollers.
//!
//! The registry is a side channel, independent of the graph engine's own
//! state: node bodies append progress events and debug notes under their
//! job id, and unrelated consumers (typically an HTTP layer) poll
//! [`snapshot`](JobStatusRegistry::snapshot) for a consistent copy. It is
//! explicitly injected into every node invocation through the
//! [`NodeContext`](crate::node::NodeContext) rather than living in a global.
//!
//! Records are never evicted by the engine; they live for the process
//! lifetime. [`remove`](JobStatusRegistry::remove) exists so an integrating
//! application can implement its own expiry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::events::ProgressEvent;
use crate::types::JobPhase;

/// Mutable status record for one job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobStatus {
    pub status: JobPhase,
    /// Structured result payload, set on completion.
    pub result: Option<serde_json::Value>,
    /// Error message, set on failure.
    pub error: Option<String>,
    /// Free-form notes appended at notable stage boundaries.
    pub debug_info: Vec<String>,
    pub last_update: DateTime<Utc>,
    /// Accumulated progress events, in emission order.
    pub events: Vec<ProgressEvent>,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self {
            status: JobPhase::Pending,
            result: None,
            error: None,
            debug_info: Vec::new(),
            last_update: Utc::now(),
            events: Vec::new(),
        }
    }
}

/// Shared mapping from job id to [`JobStatus`].
///
/// Clones share the same underlying map. All operations take the internal
/// lock briefly, so concurrent appends from a wave's nodes and concurrent
/// polls from readers are both safe; readers get a full copy, never a
/// partially written record.
#[derive(Clone, Default)]
pub struct JobStatusRegistry {
    inner: Arc<Mutex<FxHashMap<String, JobStatus>>>,
}

impl JobStatusRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a record exists for `job_id`, inserting the lazy default, and
    /// return a copy of it.
    pub fn get_or_create(&self, job_id: &str) -> JobStatus {
        let mut map = self.inner.lock();
        map.entry(job_id.to_string()).or_default().clone()
    }

    /// Append a progress event to the job's queue.
    ///
    /// No-op when the job id is absent: callers must tolerate the registry
    /// not yet containing a job rather than failing the run over a missing
    /// status record.
    pub fn append_event(&self, job_id: &str, event: ProgressEvent) {
        let mut map = self.inner.lock();
        if let Some(status) = map.get_mut(job_id) {
            status.events.push(event);
            status.last_update = Utc::now();
        }
    }

    /// Append a debug note. No-op when the job id is absent.
    pub fn push_debug(&self, job_id: &str, note: impl Into<String>) {
        let mut map = self.inner.lock();
        if let Some(status) = map.get_mut(job_id) {
            status.debug_info.push(note.into());
            status.last_update = Utc::now();
        }
    }

    /// Transition the job's phase. No-op when the job id is absent.
    pub fn set_phase(&self, job_id: &str, phase: JobPhase) {
        let mut map = self.inner.lock();
        if let Some(status) = map.get_mut(job_id) {
            status.status = phase;
            status.last_update = Utc::now();
        }
    }

    /// Record the final result payload and mark the job completed.
    pub fn set_result(&self, job_id: &str, result: serde_json::Value) {
        let mut map = self.inner.lock();
        if let Some(status) = map.get_mut(job_id) {
            status.status = JobPhase::Completed;
            status.result = Some(result);
            status.last_update = Utc::now();
        }
    }

    /// Record a failure message and mark the job errored.
    pub fn set_error(&self, job_id: &str, message: impl Into<String>) {
        let mut map = self.inner.lock();
        if let Some(status) = map.get_mut(job_id) {
            status.status = JobPhase::Error;
            status.error = Some(message.into());
            status.last_update = Utc::now();
        }
    }

    /// Consistent copy of the job's record for external pollers.
    #[must_use]
    pub fn snapshot(&self, job_id: &str) -> Option<JobStatus> {
        self.inner.lock().get(job_id).cloned()
    }

    /// Drop a record. The engine never calls this; it exists for host-level
    /// eviction policies.
    pub fn remove(&self, job_id: &str) -> Option<JobStatus> {
        self.inner.lock().remove(job_id)
    }

    /// Number of tracked jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ProgressEvent;

    #[test]
    /// get_or_create inserts the lazy default exactly once.
    fn lazy_default_insert() {
        let registry = JobStatusRegistry::new();
        let status = registry.get_or_create("job-1");
        assert_eq!(status.status, JobPhase::Pending);
        assert!(status.events.is_empty());

        registry.set_phase("job-1", JobPhase::Running);
        let again = registry.get_or_create("job-1");
        assert_eq!(again.status, JobPhase::Running);
    }

    #[test]
    /// append_event on an unknown job id is a silent no-op.
    fn append_absent_is_noop() {
        let registry = JobStatusRegistry::new();
        registry.append_event("ghost", ProgressEvent::started("n", "m"));
        assert!(registry.snapshot("ghost").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    /// Result and error transitions update phase and payload together.
    fn terminal_transitions() {
        let registry = JobStatusRegistry::new();
        registry.get_or_create("ok");
        registry.set_result("ok", serde_json::json!({"report": "text"}));
        let ok = registry.snapshot("ok").unwrap();
        assert_eq!(ok.status, JobPhase::Completed);
        assert!(ok.result.is_some());

        registry.get_or_create("bad");
        registry.set_error("bad", "provider down");
        let bad = registry.snapshot("bad").unwrap();
        assert_eq!(bad.status, JobPhase::Error);
        assert_eq!(bad.error.as_deref(), Some("provider down"));
    }

    #[test]
    /// remove hands back the record and forgets the job.
    fn remove_evicts() {
        let registry = JobStatusRegistry::new();
        registry.get_or_create("gone");
        assert!(registry.remove("gone").is_some());
        assert!(registry.snapshot("gone").is_none());
    }

    #[tokio::test]
    /// Concurrent appenders never lose events.
    async fn concurrent_appends() {
        let registry = JobStatusRegistry::new();
        registry.get_or_create("shared");

        let mut handles = Vec::new();
        for worker in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    registry.append_event(
                        "shared",
                        ProgressEvent::started(format!("w{worker}"), format!("event {i}")),
                    );
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let status = registry.snapshot("shared").unwrap();
        assert_eq!(status.events.len(), 8 * 50);
    }
}
