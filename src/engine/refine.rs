//! The refinement loop.
//!
//! Applies fix tasks, commits, rebuilds, retests, and reclassifies, bounded
//! by `max_iterations`. Every exit is a classified outcome; "we gave up" and
//! "the analysis contradicts the tests" are recorded states, never silent
//! successes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::Engine;
use crate::cancel::CancelToken;
use crate::errors::EngineError;
use crate::plan::Task;
use crate::project::ProjectStatus;
use crate::scheduler::{TaskOutcome, TaskScheduler};
use crate::resources::BuildConfig;
use crate::tracker::{DetailedIssue, Severity};
use crate::workers::TaskContext;
use crate::workspace::ProjectWorkspace;

/// How a refinement run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementStatus {
    /// Tests came back clean.
    Completed,
    /// A rebuild failed; refinement cannot continue.
    BuildFailed,
    /// The test harness itself malfunctioned.
    TestingFrameworkError,
    /// Tests keep failing but analysis found nothing actionable.
    CompletedWithUnresolvedConflictingAnalysis,
    /// The iteration budget ran out with issues still open.
    CompletedWithIssuesMaxIterations,
    /// A stop request arrived between iterations.
    Stopped,
}

impl RefinementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefinementStatus::Completed => "completed",
            RefinementStatus::BuildFailed => "build_failed",
            RefinementStatus::TestingFrameworkError => "testing_framework_error",
            RefinementStatus::CompletedWithUnresolvedConflictingAnalysis => {
                "completed_with_unresolved_conflicting_analysis"
            }
            RefinementStatus::CompletedWithIssuesMaxIterations => {
                "completed_with_issues_max_iterations"
            }
            RefinementStatus::Stopped => "stopped",
        }
    }

    /// The project status this outcome maps to.
    pub fn project_status(&self) -> ProjectStatus {
        match self {
            RefinementStatus::Completed => ProjectStatus::Completed,
            RefinementStatus::BuildFailed => ProjectStatus::BuildFailed,
            RefinementStatus::TestingFrameworkError => ProjectStatus::TestingFailed,
            RefinementStatus::CompletedWithUnresolvedConflictingAnalysis
            | RefinementStatus::CompletedWithIssuesMaxIterations => {
                ProjectStatus::CompletedWithIssues
            }
            RefinementStatus::Stopped => ProjectStatus::Stopped,
        }
    }
}

impl std::fmt::Display for RefinementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefinementOutcome {
    pub status: RefinementStatus,
    /// Iterations actually run.
    pub iterations: u32,
}

pub(super) async fn run(
    engine: &Arc<Engine>,
    workspace: &ProjectWorkspace,
    build_config: &BuildConfig,
    initial_fix_tasks: Vec<Task>,
    cancel: &CancelToken,
) -> Result<RefinementOutcome, EngineError> {
    let project = engine.project_clone().ok_or(EngineError::NoProject)?;
    let project_id = project.project_id.clone();
    let max_iterations = project.max_iterations.max(1);

    if initial_fix_tasks.is_empty() {
        return Ok(RefinementOutcome {
            status: RefinementStatus::CompletedWithUnresolvedConflictingAnalysis,
            iterations: 0,
        });
    }

    let config = engine.config();
    let scheduler = TaskScheduler::new(
        engine.registry().clone(),
        engine.tracker().clone(),
        config.max_workers,
        config.max_retries,
    );
    let mut fix_tasks = initial_fix_tasks;

    for iteration in 1..=max_iterations {
        if cancel.is_cancelled() {
            return Ok(RefinementOutcome {
                status: RefinementStatus::Stopped,
                iterations: iteration - 1,
            });
        }
        engine.with_project_mut(|p| p.current_iteration = iteration);
        let percentage = 80 + (15 * iteration / max_iterations) as i32;
        engine.progress(
            &format!(
                "Refinement iteration {}/{} ({} fix tasks)",
                iteration,
                max_iterations,
                fix_tasks.len()
            ),
            percentage.min(95),
        );
        info!(iteration, fixes = fix_tasks.len(), "refinement iteration");

        // 1. apply fixes through the same write path as generation
        let context = TaskContext {
            project_id: project_id.clone(),
            project_name: project.name.clone(),
            project_description: project.description.clone(),
            task_name: String::new(),
            layer: None,
            existing_files: workspace.list_files(),
        };
        let report = scheduler.run(&fix_tasks, &context, cancel).await;
        for (name, outcome) in &report.results {
            match outcome {
                TaskOutcome::Success { output, .. } => {
                    let written = workspace.persist_output(output, name)?;
                    engine.with_project_mut(|p| {
                        for path in &written {
                            p.record_file(path);
                        }
                    });
                }
                TaskOutcome::Failure(failure) => {
                    engine.log_engine_issue(
                        &project_id,
                        "Refinement",
                        Severity::Medium,
                        "FixApplicationFailure",
                        &format!("Fix task {} failed: {}", failure.task_name, failure.error_message),
                    );
                }
            }
        }

        // 2. commit
        engine
            .commit(workspace, &format!("Refinement iteration {}", iteration))
            .await;

        // 3. rebuild
        if let Err(err) = engine
            .resources()
            .install_and_build(workspace.root(), build_config)
            .await
        {
            engine.log_engine_issue(
                &project_id,
                "Build",
                Severity::Critical,
                "BuildFailure",
                &err.to_string(),
            );
            return Ok(RefinementOutcome {
                status: RefinementStatus::BuildFailed,
                iterations: iteration,
            });
        }

        // 4. retest
        let harness = engine.harness_for(build_config);
        let test_report = harness.run_unit_tests(workspace.root()).await;
        if !test_report.success {
            engine.log_engine_issue(
                &project_id,
                "UnitTest",
                Severity::Critical,
                "TestFrameworkFailure",
                &test_report.summary,
            );
            return Ok(RefinementOutcome {
                status: RefinementStatus::TestingFrameworkError,
                iterations: iteration,
            });
        }
        if !test_report.issues_found {
            return Ok(RefinementOutcome {
                status: RefinementStatus::Completed,
                iterations: iteration,
            });
        }

        // 5. reclassify
        let mut issues = Vec::new();
        for failure in &test_report.failures {
            let mut issue = DetailedIssue::new(
                &project_id,
                "TestHarness.UnitTests",
                "UnitTest",
                Severity::High,
                "TestFailure",
                &format!("{}: {}", failure.name, failure.message),
            );
            if let Some(path) = &failure.file_path {
                issue = issue.with_file(path, failure.line_number);
            }
            issues.push(engine.tracker().log_issue(issue));
        }
        match engine.analyzer().classify_issues(&issues).await {
            Ok(analysis) if analysis.fix_tasks.is_empty() => {
                return Ok(RefinementOutcome {
                    status: RefinementStatus::CompletedWithUnresolvedConflictingAnalysis,
                    iterations: iteration,
                });
            }
            Ok(analysis) => {
                fix_tasks = analysis.fix_tasks;
            }
            Err(err) => {
                engine.log_engine_issue(
                    &project_id,
                    "Analysis",
                    Severity::Critical,
                    "AnalysisContractViolation",
                    &format!("{:#}", err),
                );
                return Ok(RefinementOutcome {
                    status: RefinementStatus::CompletedWithUnresolvedConflictingAnalysis,
                    iterations: iteration,
                });
            }
        }
    }

    Ok(RefinementOutcome {
        status: RefinementStatus::CompletedWithIssuesMaxIterations,
        iterations: max_iterations,
    })
}
