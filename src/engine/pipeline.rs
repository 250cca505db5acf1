//! The background pipeline chain: generate → commit → build → deploy →
//! test → analyze → refine.
//!
//! The whole chain runs on one spawned task. `drive` returns early (Ok) at
//! every controlled terminal outcome; any error that escapes it is an
//! internal engine fault, downgraded at the top of the task to a logged
//! critical issue plus a failed status so the background task never
//! unwinds.

use std::sync::Arc;

use tracing::{error, info};

use super::Engine;
use crate::errors::EngineError;
use crate::history::HistoryEntry;
use crate::plan::{Layer, Task};
use crate::project::ProjectStatus;
use crate::scheduler::{TaskOutcome, TaskScheduler};
use crate::tracker::Severity;
use crate::workers::TaskContext;

pub(super) async fn run(engine: Arc<Engine>) {
    let description = engine
        .project_clone()
        .map(|p| p.description)
        .unwrap_or_default();

    if let Err(err) = drive(&engine).await {
        error!(error = %err, "pipeline faulted");
        let project_id = engine
            .project_clone()
            .map(|p| p.project_id)
            .unwrap_or_else(|| "unknown".to_string());
        engine.log_engine_issue(
            &project_id,
            "Pipeline",
            Severity::Critical,
            "InternalEngineError",
            &err.to_string(),
        );
        let status = engine.current_status();
        if !status.is_terminal() {
            engine.set_status(failure_status_for(status));
        }
    }

    let snapshot = engine.status();
    let success = snapshot.status == ProjectStatus::Completed;
    let url = snapshot.service_urls.first().cloned().unwrap_or_default();
    let entry = HistoryEntry::new(
        snapshot.project_id.as_deref().unwrap_or("unknown"),
        success,
        &url,
        &description,
    );
    if let Err(err) = engine.history().append(&entry) {
        engine
            .tracker()
            .log_internal_error("history", &err.to_string());
    }
    info!(status = %snapshot.status, "pipeline finished");
}

/// Which failed status an internal fault maps to, by the phase that was
/// active when it escaped.
fn failure_status_for(active: ProjectStatus) -> ProjectStatus {
    match active {
        ProjectStatus::Building => ProjectStatus::BuildFailed,
        ProjectStatus::StartingServices => ProjectStatus::DeploymentFailed,
        ProjectStatus::Testing => ProjectStatus::TestingFailed,
        ProjectStatus::Analyzing | ProjectStatus::Refining => ProjectStatus::AnalysisFailed,
        _ => ProjectStatus::GenerationFailed,
    }
}

async fn drive(engine: &Arc<Engine>) -> Result<(), EngineError> {
    let project = engine.project_clone().ok_or(EngineError::NoProject)?;
    let plan = project.execution_plan.clone().ok_or_else(|| EngineError::Internal {
        step: "generate".to_string(),
        message: "no execution plan on a planned project".to_string(),
    })?;
    let workspace = engine.workspace().ok_or(EngineError::NoProject)?;
    let cancel = engine.cancel_token();
    let config = engine.config();
    let project_id = project.project_id.clone();

    let scheduler = TaskScheduler::new(
        engine.registry().clone(),
        engine.tracker().clone(),
        config.max_workers,
        config.max_retries,
    );

    // --- generation, layer by layer ---
    let total_tasks = plan.tasks.len().max(1);
    let mut done_tasks = 0usize;
    for layer in Layer::ORDER {
        if cancel.is_cancelled() {
            return stop_pipeline(engine).await;
        }
        let tasks: Vec<Task> = plan.tasks_for_layer(layer).into_iter().cloned().collect();
        if tasks.is_empty() {
            continue;
        }
        info!(%layer, tasks = tasks.len(), "generating layer");
        let context = TaskContext {
            project_id: project_id.clone(),
            project_name: project.name.clone(),
            project_description: project.description.clone(),
            task_name: String::new(),
            layer: Some(layer),
            existing_files: workspace.list_files(),
        };
        let report = scheduler.run(&tasks, &context, &cancel).await;

        let mut layer_successes = 0usize;
        for (name, outcome) in &report.results {
            match outcome {
                TaskOutcome::Success { output, .. } => {
                    let written = workspace.persist_output(output, name)?;
                    engine.with_project_mut(|p| {
                        for path in &written {
                            p.record_file(path);
                        }
                    });
                    layer_successes += 1;
                }
                TaskOutcome::Failure(failure) => {
                    engine.log_engine_issue(
                        &project_id,
                        "CodeGeneration",
                        Severity::High,
                        "GenerationFailure",
                        &format!(
                            "Task {} failed at {:?} stage: {}",
                            failure.task_name, failure.stage, failure.error_message
                        ),
                    );
                }
            }
        }
        done_tasks += tasks.len();
        engine.progress(
            &format!("Generated {} layer ({}/{} tasks)", layer, done_tasks, plan.tasks.len()),
            (25 + 25 * done_tasks / total_tasks) as i32,
        );

        if layer_successes == 0 {
            engine.set_status(ProjectStatus::GenerationFailed);
            return Ok(());
        }
    }

    engine.commit(&workspace, "Generate initial implementation").await;

    // --- build ---
    if cancel.is_cancelled() {
        return stop_pipeline(engine).await;
    }
    engine.set_status(ProjectStatus::Building);
    engine.progress("Building project", 55);
    let build_config = engine.resources().detect(workspace.root());
    info!(kind = %build_config.kind, "detected project kind");
    if let Err(err) = engine
        .resources()
        .install_and_build(workspace.root(), &build_config)
        .await
    {
        let mut issue = crate::tracker::DetailedIssue::new(
            &project_id,
            "Engine",
            "Build",
            Severity::Critical,
            "BuildFailure",
            &err.to_string(),
        );
        if let crate::errors::ResourceError::BuildFailure { output, .. } = &err {
            issue = issue.with_description(output);
        }
        engine.tracker().log_issue(issue);
        engine.set_status(ProjectStatus::BuildFailed);
        return Ok(());
    }

    // --- deploy ---
    if cancel.is_cancelled() {
        return stop_pipeline(engine).await;
    }
    engine.set_status(ProjectStatus::StartingServices);
    if build_config.run.is_some() {
        match engine
            .resources()
            .start_service(workspace.root(), &build_config, &project_id)
            .await
        {
            Ok((port, urls)) => {
                engine.with_project_mut(|p| {
                    p.allocated_ports.push(port);
                    p.service_urls = urls.clone();
                });
                engine.progress(&format!("Service running on port {}", port), 70);
            }
            Err(err) => {
                engine.log_engine_issue(
                    &project_id,
                    "Deployment",
                    Severity::Critical,
                    "ServiceStartFailure",
                    &err.to_string(),
                );
                engine.set_status(ProjectStatus::DeploymentFailed);
                return Ok(());
            }
        }
    } else {
        engine.progress_note("No run command for this project kind; skipping deployment");
    }

    // --- test ---
    engine.set_status(ProjectStatus::Testing);
    engine.progress("Running unit tests", 75);
    let harness = engine.harness_for(&build_config);
    let report = harness.run_unit_tests(workspace.root()).await;
    if !report.success {
        engine.log_engine_issue(
            &project_id,
            "UnitTest",
            Severity::Critical,
            "TestFrameworkFailure",
            &report.summary,
        );
        engine.set_status(ProjectStatus::TestingFailed);
        return Ok(());
    }
    if !report.issues_found {
        engine.set_status(ProjectStatus::Completed);
        engine.progress("Pipeline completed", 100);
        return Ok(());
    }

    // --- analyze ---
    engine.set_status(ProjectStatus::Analyzing);
    engine.progress_note(&format!("Analyzing test failures: {}", report.summary));
    let mut issues = Vec::new();
    for failure in &report.failures {
        let mut issue = crate::tracker::DetailedIssue::new(
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
    let analysis = match engine.analyzer().classify_issues(&issues).await {
        Ok(analysis) => analysis,
        Err(err) => {
            engine.log_engine_issue(
                &project_id,
                "Analysis",
                Severity::Critical,
                "AnalysisContractViolation",
                &format!("{:#}", err),
            );
            engine.set_status(ProjectStatus::AnalysisFailed);
            return Ok(());
        }
    };
    for enriched in &analysis.issues {
        engine
            .tracker()
            .update_issue_status(&enriched.issue_id, enriched.status);
    }

    // --- refine ---
    engine.set_status(ProjectStatus::Refining);
    let outcome = super::refine::run(
        engine,
        &workspace,
        &build_config,
        analysis.fix_tasks,
        &cancel,
    )
    .await?;
    engine.with_project_mut(|p| p.current_iteration = outcome.iterations);
    engine.progress_note(&format!("Refinement finished: {}", outcome.status));

    if outcome.status == crate::engine::RefinementStatus::Stopped {
        return stop_pipeline(engine).await;
    }
    engine.set_status(outcome.status.project_status());
    if engine.current_status() == ProjectStatus::Completed {
        engine.progress("Pipeline completed", 100);
    } else {
        engine.progress("Pipeline completed with issues", 100);
    }
    Ok(())
}

/// Cooperative stop: shut services down, mark the project stopped.
async fn stop_pipeline(engine: &Arc<Engine>) -> Result<(), EngineError> {
    info!("pipeline stopping on request");
    engine.resources().stop_all().await;
    engine.with_project_mut(|p| {
        p.service_urls.clear();
        p.allocated_ports.clear();
    });
    engine.set_status(ProjectStatus::Stopped);
    engine.progress_note("Pipeline stopped");
    Ok(())
}
