//! Issue and progress tracking.
//!
//! The tracker is the one structure mutated from multiple execution contexts
//! (scheduler workers and the background pipeline task), so every append goes
//! through a single internal lock. Callback invocation happens after that
//! lock is released, and a panicking observer is isolated and recorded
//! instead of propagating into the pipeline.

mod issue;

pub use issue::{DetailedIssue, IssueStatus, ProgressEvent, Severity, NO_PERCENTAGE};

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Progress events retained for status queries.
const PROGRESS_RING_CAPACITY: usize = 256;

/// Handle returned by `register_callback`, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackId(u64);

type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Record of a defect inside the tracking machinery itself. A tracking bug
/// must never abort the pipeline, so these degrade to log entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalErrorRecord {
    pub step: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct TrackerState {
    issues: Vec<DetailedIssue>,
    progress: VecDeque<ProgressEvent>,
    internal_errors: Vec<InternalErrorRecord>,
}

struct Inner {
    state: Mutex<TrackerState>,
    callbacks: Mutex<Vec<(CallbackId, ProgressCallback)>>,
    next_callback_id: AtomicU64,
}

/// Append-only structured log of issues and progress events.
#[derive(Clone)]
pub struct ProgressIssueTracker {
    inner: Arc<Inner>,
}

impl Default for ProgressIssueTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressIssueTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(TrackerState::default()),
                callbacks: Mutex::new(Vec::new()),
                next_callback_id: AtomicU64::new(1),
            }),
        }
    }

    /// Append a progress event and notify all observers synchronously.
    ///
    /// The state lock is released before any callback runs; a panicking
    /// callback is recorded as an internal error and the rest still fire.
    pub fn update_progress(&self, message: &str, percentage: i32) {
        let event = ProgressEvent::new(message, percentage);
        {
            let mut state = self.lock_state();
            if state.progress.len() >= PROGRESS_RING_CAPACITY {
                state.progress.pop_front();
            }
            state.progress.push_back(event.clone());
        }

        let callbacks: Vec<ProgressCallback> = {
            let guard = self.inner.callbacks.lock().unwrap_or_else(|e| e.into_inner());
            guard.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                warn!(message, "progress callback panicked");
                self.log_internal_error("progress_callback", "observer panicked during progress notification");
            }
        }
    }

    /// Validate and append an issue.
    ///
    /// On an invalid draft (empty project, source, phase, or message) this
    /// degrades to an internal-error record plus a minimal critical issue
    /// rather than failing, so a tracking bug never aborts the pipeline.
    pub fn log_issue(&self, issue: DetailedIssue) -> DetailedIssue {
        let invalid_field = [
            ("project_id", issue.project_id.trim().is_empty()),
            ("source_component", issue.source_component.trim().is_empty()),
            ("phase", issue.phase.trim().is_empty()),
            ("message", issue.message.trim().is_empty()),
        ]
        .into_iter()
        .find(|(_, empty)| *empty)
        .map(|(name, _)| name);

        let accepted = match invalid_field {
            None => issue,
            Some(field) => {
                self.log_internal_error(
                    "log_issue",
                    &format!("issue rejected: required field {} is empty", field),
                );
                DetailedIssue::new(
                    if issue.project_id.trim().is_empty() { "unknown" } else { &issue.project_id },
                    "IssueLogger",
                    "IssueLogging",
                    Severity::Critical,
                    "IssueLoggingError",
                    &format!("Failed to log issue: required field {} is empty", field),
                )
            }
        };

        let mut state = self.lock_state();
        state.issues.push(accepted.clone());
        accepted
    }

    /// Record a defect in the orchestrator or tracker itself.
    pub fn log_internal_error(&self, step: &str, message: &str) {
        warn!(step, message, "internal error");
        let mut state = self.lock_state();
        state.internal_errors.push(InternalErrorRecord {
            step: step.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Transition an issue's status; unknown ids are ignored.
    pub fn update_issue_status(&self, issue_id: &str, status: IssueStatus) {
        let mut state = self.lock_state();
        if let Some(issue) = state.issues.iter_mut().find(|i| i.issue_id == issue_id) {
            issue.status = status;
        }
    }

    pub fn register_callback(&self, callback: impl Fn(&ProgressEvent) + Send + Sync + 'static) -> CallbackId {
        let id = CallbackId(self.inner.next_callback_id.fetch_add(1, Ordering::Relaxed));
        let mut guard = self.inner.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        guard.push((id, Arc::new(callback)));
        id
    }

    pub fn unregister_callback(&self, id: CallbackId) {
        let mut guard = self.inner.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        guard.retain(|(cb_id, _)| *cb_id != id);
    }

    /// Issues, optionally filtered by severity.
    pub fn issues_by_severity(&self, filter: Option<Severity>) -> Vec<DetailedIssue> {
        let state = self.lock_state();
        state
            .issues
            .iter()
            .filter(|i| filter.is_none_or(|s| i.severity == s))
            .cloned()
            .collect()
    }

    pub fn issue_count(&self) -> usize {
        self.lock_state().issues.len()
    }

    /// The most recent `n` progress events, oldest first.
    pub fn recent_progress(&self, n: usize) -> Vec<ProgressEvent> {
        let state = self.lock_state();
        let skip = state.progress.len().saturating_sub(n);
        state.progress.iter().skip(skip).cloned().collect()
    }

    pub fn internal_errors(&self) -> Vec<InternalErrorRecord> {
        self.lock_state().internal_errors.clone()
    }

    /// Drop all recorded state; used when a new project resets the engine.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        *state = TrackerState::default();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        // A panic while holding the lock only means a half-appended log; the
        // data is still usable, so recover instead of poisoning the pipeline.
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
