//! Dependency-aware task scheduler.
//!
//! Executes a plan's tasks as a DAG: a task becomes ready when every
//! dependency has reached a terminal result, ready tasks run on a bounded
//! pool ordered by `(priority, name)`, and failed tasks are retried before
//! being recorded as failures. Dependents are released when a dependency
//! reaches ANY terminal result, success or failure: downstream tasks get
//! their chance to produce partial output and the refinement loop repairs
//! the holes afterwards.
//!
//! The returned report always contains exactly one entry per submitted task.
//! Tasks that never became ready (cycles, cancellation) are recorded as
//! submit-stage failures rather than dropped.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::plan::Task;
use crate::tracker::{ProgressIssueTracker, NO_PERCENTAGE};
use crate::workers::{TaskContext, Worker, WorkerOutput, WorkerRegistry};

/// Where in the task lifecycle a failure was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// The task never started: unknown worker, dependency cycle, or the run
    /// was cancelled before it became ready.
    Submit,
    /// The worker panicked; panics are defects and are not retried.
    Execution,
    /// The worker returned an error on every attempt.
    MaxRetries,
}

/// Structured record of one task failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task_name: String,
    pub worker: String,
    pub stage: FailureStage,
    pub error_type: String,
    pub error_message: String,
    pub attempts: u32,
}

/// Terminal result of one task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Success { output: WorkerOutput, attempts: u32 },
    Failure(TaskFailure),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success { .. })
    }
}

/// Result of one scheduler run: one entry per submitted task, no exceptions.
#[derive(Debug, Default)]
pub struct ScheduleReport {
    pub results: HashMap<String, TaskOutcome>,
}

impl ScheduleReport {
    pub fn all_succeeded(&self) -> bool {
        self.results.values().all(TaskOutcome::is_success)
    }

    pub fn failures(&self) -> Vec<&TaskFailure> {
        self.results
            .values()
            .filter_map(|r| match r {
                TaskOutcome::Failure(f) => Some(f),
                TaskOutcome::Success { .. } => None,
            })
            .collect()
    }

    pub fn success_count(&self) -> usize {
        self.results.values().filter(|r| r.is_success()).count()
    }
}

enum Completion {
    Output(WorkerOutput),
    Error(String),
    Panicked(String),
}

/// Bounded-concurrency DAG executor over the worker registry.
pub struct TaskScheduler {
    registry: WorkerRegistry,
    tracker: ProgressIssueTracker,
    max_workers: usize,
    max_retries: u32,
}

impl TaskScheduler {
    pub fn new(
        registry: WorkerRegistry,
        tracker: ProgressIssueTracker,
        max_workers: usize,
        max_retries: u32,
    ) -> Self {
        Self {
            registry,
            tracker,
            max_workers: max_workers.max(1),
            max_retries,
        }
    }

    /// Run `tasks` to completion (or cancellation) and return a total report.
    ///
    /// Dependencies naming tasks outside this set are ignored; the engine
    /// uses that to schedule one layer at a time.
    pub async fn run(
        &self,
        tasks: &[Task],
        base_context: &TaskContext,
        cancel: &CancelToken,
    ) -> ScheduleReport {
        let total = tasks.len();
        let mut report = ScheduleReport::default();
        if total == 0 {
            return report;
        }

        let by_name: HashMap<String, Task> =
            tasks.iter().map(|t| (t.name.clone(), t.clone())).collect();
        let priorities: HashMap<String, i32> =
            tasks.iter().map(|t| (t.name.clone(), t.priority)).collect();

        let mut in_degree: HashMap<String, usize> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for task in tasks {
            let deps: Vec<&String> = task
                .dependencies
                .iter()
                .filter(|d| by_name.contains_key(d.as_str()))
                .collect();
            in_degree.insert(task.name.clone(), deps.len());
            for dep in deps {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(task.name.clone());
            }
        }

        // Min-heap on (priority, name): lower priority first, name breaks ties
        // so runs are deterministic.
        let mut ready: BinaryHeap<Reverse<(i32, String)>> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(name, _)| Reverse((priorities[name], name.clone())))
            .collect();

        let mut attempts: HashMap<String, u32> = HashMap::new();
        let mut running = 0usize;
        let mut done = 0usize;
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, Completion)>();

        let release = |name: &str,
                       in_degree: &mut HashMap<String, usize>,
                       ready: &mut BinaryHeap<Reverse<(i32, String)>>| {
            if let Some(children) = dependents.get(name) {
                for child in children {
                    let degree = in_degree.get_mut(child).expect("dependent is in set");
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse((priorities[child], child.clone())));
                    }
                }
            }
        };

        while done < total {
            while running < self.max_workers && !cancel.is_cancelled() {
                let Some(Reverse((_, name))) = ready.pop() else {
                    break;
                };
                let task = by_name[&name].clone();
                let Some(worker) = self.registry.get(task.worker_name()) else {
                    warn!(task = %name, worker = task.worker_name(), "no worker registered");
                    report.results.insert(
                        name.clone(),
                        TaskOutcome::Failure(TaskFailure {
                            task_name: name.clone(),
                            worker: task.worker_name().to_string(),
                            stage: FailureStage::Submit,
                            error_type: "unknown_worker".to_string(),
                            error_message: format!(
                                "No worker registered under {}",
                                task.worker_name()
                            ),
                            attempts: 0,
                        }),
                    );
                    done += 1;
                    release(&name, &mut in_degree, &mut ready);
                    continue;
                };

                let attempt = attempts.entry(name.clone()).or_insert(0);
                *attempt += 1;
                debug!(task = %name, attempt = *attempt, "dispatching task");
                running += 1;
                spawn_task(worker, task, base_context.clone(), tx.clone());
            }

            if running == 0 {
                // Nothing in flight and nothing launchable: either a cycle
                // left tasks unready or the run was cancelled.
                break;
            }

            let Some((name, completion)) = rx.recv().await else {
                break;
            };
            running -= 1;

            match completion {
                Completion::Output(output) => {
                    done += 1;
                    self.tracker.update_progress(
                        &format!("Task {} completed ({}/{})", name, done, total),
                        NO_PERCENTAGE,
                    );
                    report.results.insert(
                        name.clone(),
                        TaskOutcome::Success {
                            output,
                            attempts: attempts[&name],
                        },
                    );
                    release(&name, &mut in_degree, &mut ready);
                }
                Completion::Error(message) => {
                    let tries = attempts[&name];
                    if tries <= self.max_retries {
                        debug!(task = %name, attempt = tries, "task failed, requeueing");
                        ready.push(Reverse((priorities[&name], name)));
                    } else {
                        warn!(task = %name, attempts = tries, "task exhausted retries");
                        done += 1;
                        let worker_name = by_name[&name].worker_name().to_string();
                        report.results.insert(
                            name.clone(),
                            TaskOutcome::Failure(TaskFailure {
                                task_name: name.clone(),
                                worker: worker_name,
                                stage: FailureStage::MaxRetries,
                                error_type: "worker_error".to_string(),
                                error_message: message,
                                attempts: tries,
                            }),
                        );
                        release(&name, &mut in_degree, &mut ready);
                    }
                }
                Completion::Panicked(message) => {
                    warn!(task = %name, "worker panicked");
                    done += 1;
                    let worker_name = by_name[&name].worker_name().to_string();
                    report.results.insert(
                        name.clone(),
                        TaskOutcome::Failure(TaskFailure {
                            task_name: name.clone(),
                            worker: worker_name,
                            stage: FailureStage::Execution,
                            error_type: "worker_panic".to_string(),
                            error_message: message,
                            attempts: attempts[&name],
                        }),
                    );
                    release(&name, &mut in_degree, &mut ready);
                }
            }
        }

        // Total-map guarantee: every submitted task gets a terminal record.
        let cancelled = cancel.is_cancelled();
        for task in tasks {
            if report.results.contains_key(&task.name) {
                continue;
            }
            let (error_type, error_message) = if cancelled {
                ("cancelled", "Run cancelled before the task started".to_string())
            } else {
                (
                    "dependency_cycle",
                    "Task never became ready; its dependencies form a cycle".to_string(),
                )
            };
            report.results.insert(
                task.name.clone(),
                TaskOutcome::Failure(TaskFailure {
                    task_name: task.name.clone(),
                    worker: task.worker_name().to_string(),
                    stage: FailureStage::Submit,
                    error_type: error_type.to_string(),
                    error_message,
                    attempts: attempts.get(&task.name).copied().unwrap_or(0),
                }),
            );
        }

        report
    }
}

fn spawn_task(
    worker: Arc<dyn Worker>,
    task: Task,
    base_context: TaskContext,
    tx: mpsc::UnboundedSender<(String, Completion)>,
) {
    tokio::spawn(async move {
        let name = task.name.clone();
        let context = TaskContext {
            task_name: task.name.clone(),
            layer: Some(task.layer),
            ..base_context
        };
        // Inner spawn so a panicking worker surfaces as a JoinError instead
        // of taking the scheduler down with it.
        let exec = tokio::spawn(async move { worker.execute(&task.input, &context).await });
        let completion = match exec.await {
            Ok(Ok(output)) => Completion::Output(output),
            Ok(Err(err)) => Completion::Error(format!("{:#}", err)),
            Err(join_err) => Completion::Panicked(join_err.to_string()),
        };
        let _ = tx.send((name, completion));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Layer;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct RecordingWorker {
        order: Arc<Mutex<Vec<String>>>,
        fail: Vec<&'static str>,
    }

    #[async_trait]
    impl Worker for RecordingWorker {
        async fn execute(&self, _input: &str, context: &TaskContext) -> Result<WorkerOutput> {
            self.order.lock().unwrap().push(context.task_name.clone());
            if self.fail.contains(&context.task_name.as_str()) {
                anyhow::bail!("simulated failure in {}", context.task_name);
            }
            Ok(WorkerOutput::Text(format!("done {}", context.task_name)))
        }
    }

    struct CountingWorker {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Worker for CountingWorker {
        async fn execute(&self, _input: &str, _context: &TaskContext) -> Result<WorkerOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("always fails")
        }
    }

    fn registry_with(worker: Arc<dyn Worker>) -> WorkerRegistry {
        let mut registry = WorkerRegistry::new();
        registry.register_for_all_layers(worker);
        registry
    }

    fn task(name: &str) -> Task {
        Task::new(name, Layer::Backend, "do it")
    }

    #[tokio::test]
    async fn respects_dependencies_and_returns_total_map() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = registry_with(Arc::new(RecordingWorker {
            order: Arc::clone(&order),
            fail: vec![],
        }));
        let scheduler = TaskScheduler::new(registry, ProgressIssueTracker::new(), 4, 0);
        let tasks = vec![
            task("db"),
            task("api").with_dependencies(vec!["db"]),
            task("ui").with_dependencies(vec!["db", "api"]),
        ];
        let report = scheduler
            .run(&tasks, &TaskContext::default(), &CancelToken::new())
            .await;

        assert_eq!(report.results.len(), 3);
        assert!(report.all_succeeded());
        let order = order.lock().unwrap();
        let pos = |n: &str| order.iter().position(|t| t == n).unwrap();
        assert!(pos("db") < pos("api"));
        assert!(pos("api") < pos("ui"));
    }

    #[tokio::test]
    async fn priority_orders_ready_tasks_with_single_worker() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = registry_with(Arc::new(RecordingWorker {
            order: Arc::clone(&order),
            fail: vec![],
        }));
        let scheduler = TaskScheduler::new(registry, ProgressIssueTracker::new(), 1, 0);
        let tasks = vec![
            task("a").with_priority(2),
            task("b").with_priority(3),
            task("c").with_priority(1),
        ];
        let report = scheduler
            .run(&tasks, &TaskContext::default(), &CancelToken::new())
            .await;
        assert!(report.all_succeeded());
        assert_eq!(*order.lock().unwrap(), vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn retries_then_records_max_retries_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let registry = registry_with(Arc::new(CountingWorker {
            calls: Arc::clone(&calls),
        }));
        let scheduler = TaskScheduler::new(registry, ProgressIssueTracker::new(), 2, 2);
        let report = scheduler
            .run(&[task("flaky")], &TaskContext::default(), &CancelToken::new())
            .await;

        // max_retries = 2 means 1 initial attempt + 2 retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match &report.results["flaky"] {
            TaskOutcome::Failure(f) => {
                assert_eq!(f.stage, FailureStage::MaxRetries);
                assert_eq!(f.attempts, 3);
                assert!(f.error_message.contains("always fails"));
            }
            other => panic!("expected failure, got {:?}", other.is_success()),
        }
    }

    #[tokio::test]
    async fn failed_dependency_still_releases_dependents() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = registry_with(Arc::new(RecordingWorker {
            order: Arc::clone(&order),
            fail: vec!["db"],
        }));
        let scheduler = TaskScheduler::new(registry, ProgressIssueTracker::new(), 2, 0);
        let tasks = vec![task("db"), task("api").with_dependencies(vec!["db"])];
        let report = scheduler
            .run(&tasks, &TaskContext::default(), &CancelToken::new())
            .await;

        assert_eq!(report.results.len(), 2);
        assert!(!report.results["db"].is_success());
        assert!(report.results["api"].is_success());
    }

    #[tokio::test]
    async fn cycle_members_become_submit_failures() {
        let registry = registry_with(Arc::new(RecordingWorker {
            order: Arc::new(Mutex::new(Vec::new())),
            fail: vec![],
        }));
        let scheduler = TaskScheduler::new(registry, ProgressIssueTracker::new(), 2, 0);
        let tasks = vec![
            task("a").with_dependencies(vec!["b"]),
            task("b").with_dependencies(vec!["a"]),
            task("free"),
        ];
        let report = scheduler
            .run(&tasks, &TaskContext::default(), &CancelToken::new())
            .await;

        assert_eq!(report.results.len(), 3);
        assert!(report.results["free"].is_success());
        for name in ["a", "b"] {
            match &report.results[name] {
                TaskOutcome::Failure(f) => {
                    assert_eq!(f.stage, FailureStage::Submit);
                    assert_eq!(f.error_type, "dependency_cycle");
                }
                _ => panic!("{} should have failed", name),
            }
        }
    }

    #[tokio::test]
    async fn unknown_worker_is_submit_failure_and_releases_dependents() {
        // Empty registry: every dispatch fails at submit.
        let scheduler = TaskScheduler::new(
            WorkerRegistry::new(),
            ProgressIssueTracker::new(),
            2,
            1,
        );
        let tasks = vec![task("a"), task("b").with_dependencies(vec!["a"])];
        let report = scheduler
            .run(&tasks, &TaskContext::default(), &CancelToken::new())
            .await;

        assert_eq!(report.results.len(), 2);
        for name in ["a", "b"] {
            match &report.results[name] {
                TaskOutcome::Failure(f) => {
                    assert_eq!(f.stage, FailureStage::Submit);
                    assert_eq!(f.error_type, "unknown_worker");
                    assert_eq!(f.attempts, 0);
                }
                _ => panic!("{} should have failed", name),
            }
        }
    }

    #[tokio::test]
    async fn cancelled_run_marks_unstarted_tasks() {
        let registry = registry_with(Arc::new(RecordingWorker {
            order: Arc::new(Mutex::new(Vec::new())),
            fail: vec![],
        }));
        let scheduler = TaskScheduler::new(registry, ProgressIssueTracker::new(), 1, 0);
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = scheduler
            .run(&[task("a"), task("b")], &TaskContext::default(), &cancel)
            .await;

        assert_eq!(report.results.len(), 2);
        for outcome in report.results.values() {
            match outcome {
                TaskOutcome::Failure(f) => assert_eq!(f.error_type, "cancelled"),
                _ => panic!("cancelled run should not execute tasks"),
            }
        }
    }
}
