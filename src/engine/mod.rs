//! The orchestration engine.
//!
//! One engine instance drives at most one project at a time through the
//! pipeline: initialize → plan → generate → build → deploy → test → analyze
//! → refine. Public operations validate the project's status, mutate it
//! under one lock, and hand the long-running chain to a single background
//! task. `stop` and `status` are always safe to call concurrently with an
//! active run.

mod pipeline;
mod refine;

pub use refine::{RefinementOutcome, RefinementStatus};

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::collab::{
    CommandTestHarness, HeuristicAnalyzer, IssueAnalyzer, ShellToolRunner, TestHarness, ToolRunner,
};
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::history::RunHistory;
use crate::plan::{ExecutionPlan, PLANNER_PROMPT};
use crate::project::{Project, ProjectStatus, StatusSnapshot};
use crate::resources::{BuildConfig, ResourceManager};
use crate::tracker::{DetailedIssue, ProgressIssueTracker, Severity, NO_PERCENTAGE};
use crate::workers::{TaskContext, Worker, WorkerOutput, WorkerRegistry};
use crate::workspace::ProjectWorkspace;

/// Response of `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResponse {
    pub project_id: String,
    pub status: ProjectStatus,
}

/// Response of `plan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResponse {
    pub plan_summary: String,
    pub task_count: usize,
}

/// Response of `generate_code`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub status: String,
}

/// An error reported from outside the pipeline (a user, a monitor, a
/// browser session).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalErrorReport {
    pub message: String,
    #[serde(default)]
    pub source_component: Option<String>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub line_number: Option<u32>,
    #[serde(default)]
    pub stack_trace: Option<String>,
}

struct EngineState {
    project: Option<Project>,
    cancel: CancelToken,
    run: Option<JoinHandle<()>>,
}

/// The orchestrator. Construct with `new`, customize collaborators with the
/// `with_*` builders, then share behind an `Arc`.
pub struct Engine {
    config: EngineConfig,
    registry: WorkerRegistry,
    tracker: ProgressIssueTracker,
    resources: ResourceManager,
    tools: Arc<dyn ToolRunner>,
    analyzer: Arc<dyn IssueAnalyzer>,
    harness: Option<Arc<dyn TestHarness>>,
    history: RunHistory,
    state: Mutex<EngineState>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let tools: Arc<dyn ToolRunner> = Arc::new(ShellToolRunner);
        Self {
            resources: ResourceManager::new(&config, Arc::clone(&tools)),
            history: RunHistory::new(&config.workspace_path),
            tools,
            registry: WorkerRegistry::new(),
            tracker: ProgressIssueTracker::new(),
            analyzer: Arc::new(HeuristicAnalyzer),
            harness: None,
            state: Mutex::new(EngineState {
                project: None,
                cancel: CancelToken::new(),
                run: None,
            }),
            config,
        }
    }

    pub fn with_registry(mut self, registry: WorkerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_worker(mut self, name: &str, worker: Arc<dyn Worker>) -> Self {
        self.registry.register(name, worker);
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn IssueAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_harness(mut self, harness: Arc<dyn TestHarness>) -> Self {
        self.harness = Some(harness);
        self
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolRunner>) -> Self {
        self.resources = ResourceManager::new(&self.config, Arc::clone(&tools));
        self.tools = tools;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tracker(&self) -> &ProgressIssueTracker {
        &self.tracker
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    /// The current project's execution plan, if planning has happened.
    pub fn execution_plan(&self) -> Option<ExecutionPlan> {
        let state = self.lock_state();
        state
            .project
            .as_ref()
            .and_then(|p| p.execution_plan.clone())
    }

    /// Set up a fresh project: workspace scaffold, repository, tracker
    /// reset. Requires any previous project to be terminal.
    pub async fn initialize(
        &self,
        description: &str,
        name: Option<&str>,
    ) -> Result<InitializeResponse, EngineError> {
        {
            let state = self.lock_state();
            if let Some(project) = &state.project {
                if !project.status.is_terminal() {
                    return Err(EngineError::InvalidStatus {
                        required: "idle or terminal".to_string(),
                        actual: project.status.to_string(),
                    });
                }
            }
            if state.run.as_ref().is_some_and(|h| !h.is_finished()) {
                return Err(EngineError::InvalidStatus {
                    required: "no active run".to_string(),
                    actual: "running".to_string(),
                });
            }
        }

        // Reset everything the previous project left behind.
        self.resources.stop_all().await;
        self.tracker.reset();

        let project = Project::new(description, name, self.config.max_iterations);
        info!(project_id = %project.project_id, name = %project.name, "initializing project");

        let setup = async {
            self.config
                .ensure_workspace()
                .map_err(|e| EngineError::Initialization(e.to_string()))?;
            let workspace = ProjectWorkspace::new(&self.config.workspace_path, &project.name);
            workspace
                .scaffold(&project.name, &project.description)
                .map_err(|e| EngineError::Initialization(e.to_string()))?;
            // Repository init is best-effort: the pipeline works without
            // version control if git is unavailable.
            match self
                .tools
                .run_shell_command("git init", workspace.root(), self.config.command_timeout())
                .await
            {
                Ok(out) if !out.success() => {
                    self.tracker
                        .log_internal_error("git_init", &out.combined());
                }
                Err(err) => {
                    self.tracker.log_internal_error("git_init", &err.to_string());
                }
                Ok(_) => {}
            }
            Ok::<(), EngineError>(())
        }
        .await;

        let mut state = self.lock_state();
        match setup {
            Ok(()) => {
                let mut project = project;
                project.status = ProjectStatus::Initialized;
                let response = InitializeResponse {
                    project_id: project.project_id.clone(),
                    status: project.status,
                };
                state.project = Some(project);
                state.cancel = CancelToken::new();
                drop(state);
                self.tracker.update_progress("Project initialized", 10);
                Ok(response)
            }
            Err(err) => {
                let mut project = project;
                project.status = ProjectStatus::InitializationFailed;
                let project_id = project.project_id.clone();
                state.project = Some(project);
                drop(state);
                self.log_engine_issue(
                    &project_id,
                    "Initialization",
                    Severity::Critical,
                    err.issue_type(),
                    &err.to_string(),
                );
                Err(err)
            }
        }
    }

    /// Decompose the project description into an execution plan via the
    /// `planner` worker. Retryable after `planning_failed`.
    pub async fn plan(&self) -> Result<PlanResponse, EngineError> {
        let (project_id, name, description) = {
            let mut state = self.lock_state();
            let project = state.project.as_mut().ok_or(EngineError::NoProject)?;
            if !matches!(
                project.status,
                ProjectStatus::Initialized | ProjectStatus::PlanningFailed
            ) {
                return Err(EngineError::InvalidStatus {
                    required: "initialized".to_string(),
                    actual: project.status.to_string(),
                });
            }
            project.status = ProjectStatus::Planning;
            (
                project.project_id.clone(),
                project.name.clone(),
                project.description.clone(),
            )
        };

        let result = self.run_planner(&project_id, &name, &description).await;
        match result {
            Ok(plan) => {
                let response = PlanResponse {
                    plan_summary: plan.summary.clone(),
                    task_count: plan.tasks.len(),
                };
                {
                    let mut state = self.lock_state();
                    if let Some(project) = state.project.as_mut() {
                        project.execution_plan = Some(plan);
                        project.status = ProjectStatus::Planned;
                    }
                }
                self.tracker.update_progress("Execution plan ready", 20);
                Ok(response)
            }
            Err(err) => {
                self.set_status(ProjectStatus::PlanningFailed);
                self.log_engine_issue(
                    &project_id,
                    "Planning",
                    Severity::High,
                    err.issue_type(),
                    &err.to_string(),
                );
                Err(err)
            }
        }
    }

    async fn run_planner(
        &self,
        project_id: &str,
        name: &str,
        description: &str,
    ) -> Result<ExecutionPlan, EngineError> {
        let worker = self
            .registry
            .get("planner")
            .ok_or_else(|| EngineError::UnknownWorker("planner".to_string()))?;
        let prompt = format!("{}\n\nProject description:\n{}", PLANNER_PROMPT, description);
        let context = TaskContext {
            project_id: project_id.to_string(),
            project_name: name.to_string(),
            project_description: description.to_string(),
            task_name: "plan".to_string(),
            layer: None,
            existing_files: Vec::new(),
        };
        let output = worker
            .execute(&prompt, &context)
            .await
            .map_err(|e| EngineError::Planning(format!("{:#}", e)))?;
        let text = match output {
            WorkerOutput::Text(text) => text,
            WorkerOutput::Files(_) => {
                return Err(EngineError::Planning(
                    "Planner returned file descriptors instead of a decomposition".to_string(),
                ))
            }
        };
        ExecutionPlan::parse(&text).map_err(|e| EngineError::Planning(format!("{:#}", e)))
    }

    /// Start the generate→build→deploy→test→analyze→refine chain.
    ///
    /// With `background=true` the chain runs on one spawned task and this
    /// returns immediately; a second call while that task is alive returns
    /// `already_running` without side effects.
    pub async fn generate_code(
        self: &Arc<Self>,
        background: bool,
    ) -> Result<GenerateResponse, EngineError> {
        {
            let mut state = self.lock_state();
            if state.run.as_ref().is_some_and(|h| !h.is_finished()) {
                return Ok(GenerateResponse {
                    status: "already_running".to_string(),
                });
            }
            let project = state.project.as_mut().ok_or(EngineError::NoProject)?;
            if project.status != ProjectStatus::Planned {
                return Err(EngineError::InvalidStatus {
                    required: "planned".to_string(),
                    actual: project.status.to_string(),
                });
            }
            project.status = ProjectStatus::Generating;
            state.cancel = CancelToken::new();

            if background {
                let engine = Arc::clone(self);
                state.run = Some(tokio::spawn(async move {
                    pipeline::run(engine).await;
                }));
                return Ok(GenerateResponse {
                    status: "started".to_string(),
                });
            }
        }

        pipeline::run(Arc::clone(self)).await;
        Ok(GenerateResponse {
            status: self.status().status.to_string(),
        })
    }

    /// Request a cooperative stop. Observed between layers and between
    /// refinement iterations; in-flight work is not interrupted.
    pub fn stop(&self) -> &'static str {
        let state = self.lock_state();
        state.cancel.cancel();
        info!("stop requested");
        "stopping_initiated"
    }

    /// Read-only snapshot, safe concurrently with an active run.
    pub fn status(&self) -> StatusSnapshot {
        let state = self.lock_state();
        let run_active = state.run.as_ref().is_some_and(|h| !h.is_finished());
        match &state.project {
            Some(project) => StatusSnapshot {
                project_id: Some(project.project_id.clone()),
                project_name: Some(project.name.clone()),
                description: Some(project.description.clone()),
                status: project.status,
                current_iteration: project.current_iteration,
                max_iterations: project.max_iterations,
                files_generated: project.files.len(),
                service_urls: project.service_urls.clone(),
                run_active,
                issue_count: self.tracker.issue_count(),
                recent_progress: self.tracker.recent_progress(10),
            },
            None => StatusSnapshot {
                project_id: None,
                project_name: None,
                description: None,
                status: ProjectStatus::Idle,
                current_iteration: 0,
                max_iterations: self.config.max_iterations,
                files_generated: 0,
                service_urls: Vec::new(),
                run_active,
                issue_count: self.tracker.issue_count(),
                recent_progress: self.tracker.recent_progress(10),
            },
        }
    }

    /// Record an issue originating outside the pipeline. Escalates the
    /// project to `error_reported` when it is not mid-run.
    pub fn report_external_error(&self, report: ExternalErrorReport) -> DetailedIssue {
        let project_id = {
            let state = self.lock_state();
            state
                .project
                .as_ref()
                .map(|p| p.project_id.clone())
                .unwrap_or_else(|| "unknown".to_string())
        };
        let mut issue = DetailedIssue::new(
            &project_id,
            report.source_component.as_deref().unwrap_or("External"),
            report.phase.as_deref().unwrap_or("External"),
            report.severity.unwrap_or(Severity::High),
            "ExternalError",
            &report.message,
        );
        if let Some(path) = &report.file_path {
            issue = issue.with_file(path, report.line_number);
        }
        if let Some(trace) = &report.stack_trace {
            issue = issue.with_stack_trace(trace);
        }
        let logged = self.tracker.log_issue(issue);

        let mut state = self.lock_state();
        let run_active = state.run.as_ref().is_some_and(|h| !h.is_finished());
        if let Some(project) = state.project.as_mut() {
            if project.status.is_terminal() && !run_active {
                project.status = ProjectStatus::ErrorReported;
            }
        }
        logged
    }

    // ----- internals shared with the pipeline -----

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_status(&self, status: ProjectStatus) {
        let mut state = self.lock_state();
        if let Some(project) = state.project.as_mut() {
            project.status = status;
        }
    }

    pub(crate) fn current_status(&self) -> ProjectStatus {
        let state = self.lock_state();
        state
            .project
            .as_ref()
            .map(|p| p.status)
            .unwrap_or_default()
    }

    pub(crate) fn project_clone(&self) -> Option<Project> {
        self.lock_state().project.clone()
    }

    pub(crate) fn with_project_mut(&self, f: impl FnOnce(&mut Project)) {
        let mut state = self.lock_state();
        if let Some(project) = state.project.as_mut() {
            f(project);
        }
    }

    pub(crate) fn cancel_token(&self) -> CancelToken {
        self.lock_state().cancel.clone()
    }

    pub(crate) fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub(crate) fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub(crate) fn analyzer(&self) -> &Arc<dyn IssueAnalyzer> {
        &self.analyzer
    }

    pub(crate) fn workspace(&self) -> Option<ProjectWorkspace> {
        let state = self.lock_state();
        state
            .project
            .as_ref()
            .map(|p| ProjectWorkspace::new(&self.config.workspace_path, &p.name))
    }

    pub(crate) fn harness_for(&self, build_config: &BuildConfig) -> Arc<dyn TestHarness> {
        match &self.harness {
            Some(harness) => Arc::clone(harness),
            None => Arc::new(CommandTestHarness::new(
                build_config.test.clone(),
                Arc::clone(&self.tools),
                self.config.command_timeout(),
            )),
        }
    }

    pub(crate) fn log_engine_issue(
        &self,
        project_id: &str,
        phase: &str,
        severity: Severity,
        issue_type: &str,
        message: &str,
    ) -> DetailedIssue {
        self.tracker.log_issue(DetailedIssue::new(
            project_id,
            "Engine",
            phase,
            severity,
            issue_type,
            message,
        ))
    }

    /// Best-effort commit; failures are recorded, never fatal.
    pub(crate) async fn commit(&self, workspace: &ProjectWorkspace, message: &str) {
        let command = format!(
            "git add -A && git commit -m \"{}\" --allow-empty",
            message.replace('"', "")
        );
        match self
            .tools
            .run_shell_command(&command, workspace.root(), self.config.command_timeout())
            .await
        {
            Ok(out) if !out.success() => {
                warn!(message, "commit failed");
                self.tracker.log_internal_error("commit", &out.combined());
            }
            Err(err) => {
                self.tracker.log_internal_error("commit", &err.to_string());
            }
            Ok(_) => {}
        }
    }

    pub(crate) fn progress(&self, message: &str, percentage: i32) {
        self.tracker.update_progress(message, percentage);
    }

    pub(crate) fn progress_note(&self, message: &str) {
        self.tracker.update_progress(message, NO_PERCENTAGE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{Analysis, TestReport};
    use crate::workers::{TemplatePlanner, TemplateWorker};
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;
    use std::path::Path;

    struct AlwaysCleanHarness;

    #[async_trait]
    impl TestHarness for AlwaysCleanHarness {
        async fn run_unit_tests(&self, _project_dir: &Path) -> TestReport {
            TestReport::clean("all green")
        }
    }

    struct SlowWorker;

    #[async_trait]
    impl Worker for SlowWorker {
        async fn execute(&self, _input: &str, _context: &TaskContext) -> AnyResult<WorkerOutput> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(WorkerOutput::Text(String::new()))
        }
    }

    fn offline_engine(workspace: &Path) -> Arc<Engine> {
        let config = EngineConfig::default()
            .with_workspace(workspace.to_path_buf())
            .with_max_workers(2);
        let mut registry = WorkerRegistry::new();
        registry.register_for_all_layers(Arc::new(TemplateWorker));
        registry.register("planner", Arc::new(TemplatePlanner));
        Arc::new(
            Engine::new(config)
                .with_registry(registry)
                .with_harness(Arc::new(AlwaysCleanHarness)),
        )
    }

    #[tokio::test]
    async fn initialize_round_trips_through_status() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = offline_engine(tmp.path());
        let response = engine.initialize("A todo app", Some("todo")).await.unwrap();
        assert!(!response.project_id.is_empty());
        assert_eq!(response.status, ProjectStatus::Initialized);

        let snapshot = engine.status();
        assert_eq!(snapshot.status, ProjectStatus::Initialized);
        assert_eq!(snapshot.project_id.as_deref(), Some(response.project_id.as_str()));
        assert_eq!(snapshot.description.as_deref(), Some("A todo app"));
        assert!(tmp.path().join("todo/src").is_dir());
    }

    #[tokio::test]
    async fn plan_requires_initialized_status() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = offline_engine(tmp.path());
        let err = engine.plan().await.unwrap_err();
        assert!(matches!(err, EngineError::NoProject));

        engine.initialize("x", Some("x")).await.unwrap();
        engine.plan().await.unwrap();
        let err = engine.plan().await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidStatus { .. }));
    }

    #[tokio::test]
    async fn planning_failure_is_retryable() {
        let tmp = tempfile::tempdir().unwrap();
        let config = EngineConfig::default().with_workspace(tmp.path().to_path_buf());
        // No planner registered: first plan fails.
        let engine = Arc::new(Engine::new(config));
        engine.initialize("x", Some("x")).await.unwrap();
        assert!(engine.plan().await.is_err());
        assert_eq!(engine.status().status, ProjectStatus::PlanningFailed);
        // Still rejected (planner still missing) but the precondition check
        // passes: the error is about the worker, not the status.
        let err = engine.plan().await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownWorker(_)));
    }

    #[tokio::test]
    async fn sync_pipeline_completes_offline() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = offline_engine(tmp.path());
        engine.initialize("A todo app", Some("todo")).await.unwrap();
        engine.plan().await.unwrap();
        let response = engine.generate_code(false).await.unwrap();
        assert_eq!(response.status, "completed");

        let snapshot = engine.status();
        assert_eq!(snapshot.status, ProjectStatus::Completed);
        assert!(snapshot.files_generated > 0);
        assert!(tmp.path().join("todo/src").is_dir());

        let runs = engine.history().entries().unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].success);
    }

    #[tokio::test]
    async fn overlapping_async_generate_returns_already_running() {
        let tmp = tempfile::tempdir().unwrap();
        let config = EngineConfig::default().with_workspace(tmp.path().to_path_buf());
        let mut registry = WorkerRegistry::new();
        registry.register_for_all_layers(Arc::new(SlowWorker));
        registry.register("planner", Arc::new(TemplatePlanner));
        let engine = Arc::new(Engine::new(config).with_registry(registry));

        engine.initialize("x", Some("x")).await.unwrap();
        engine.plan().await.unwrap();
        let first = engine.generate_code(true).await.unwrap();
        assert_eq!(first.status, "started");
        let second = engine.generate_code(true).await.unwrap();
        assert_eq!(second.status, "already_running");
        assert_eq!(engine.stop(), "stopping_initiated");
    }

    #[tokio::test]
    async fn generate_requires_planned_status() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = offline_engine(tmp.path());
        engine.initialize("x", Some("x")).await.unwrap();
        let err = engine.generate_code(true).await.unwrap_err();
        match err {
            EngineError::InvalidStatus { required, actual } => {
                assert_eq!(required, "planned");
                assert_eq!(actual, "initialized");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn external_error_escalates_terminal_project() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = offline_engine(tmp.path());
        engine.initialize("x", Some("x")).await.unwrap();
        // initialized is non-terminal: status untouched.
        engine.report_external_error(ExternalErrorReport {
            message: "browser console error".into(),
            source_component: None,
            phase: None,
            severity: None,
            file_path: None,
            line_number: None,
            stack_trace: None,
        });
        assert_eq!(engine.status().status, ProjectStatus::Initialized);
        assert_eq!(engine.status().issue_count, 1);

        engine.set_status(ProjectStatus::Completed);
        engine.report_external_error(ExternalErrorReport {
            message: "crash after completion".into(),
            source_component: Some("Monitor".into()),
            phase: Some("PostDeployment".into()),
            severity: Some(Severity::Critical),
            file_path: Some("src/app.js".into()),
            line_number: Some(12),
            stack_trace: None,
        });
        assert_eq!(engine.status().status, ProjectStatus::ErrorReported);
    }

    #[tokio::test]
    async fn initialize_rejects_active_project_and_resets_terminal_one() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = offline_engine(tmp.path());
        let first = engine.initialize("first", Some("p1")).await.unwrap();
        engine.set_status(ProjectStatus::Generating);
        let err = engine.initialize("second", Some("p2")).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidStatus { .. }));

        engine.set_status(ProjectStatus::Completed);
        let second = engine.initialize("second", Some("p2")).await.unwrap();
        assert_ne!(first.project_id, second.project_id);
        assert_eq!(engine.status().project_name.as_deref(), Some("p2"));
    }

    struct NoFixAnalyzer;

    #[async_trait]
    impl IssueAnalyzer for NoFixAnalyzer {
        async fn classify_issues(&self, issues: &[DetailedIssue]) -> AnyResult<Analysis> {
            Ok(Analysis {
                issues: issues.to_vec(),
                fix_tasks: Vec::new(),
            })
        }
    }

    struct AlwaysFailingHarness;

    #[async_trait]
    impl TestHarness for AlwaysFailingHarness {
        async fn run_unit_tests(&self, _project_dir: &Path) -> TestReport {
            TestReport {
                success: true,
                issues_found: true,
                summary: "1 test failed".into(),
                failures: vec![crate::collab::TestFailureDetail {
                    name: "login".into(),
                    message: "expected 200, got 500".into(),
                    file_path: None,
                    line_number: None,
                }],
            }
        }
    }

    #[tokio::test]
    async fn unactionable_analysis_ends_with_issues() {
        let tmp = tempfile::tempdir().unwrap();
        let config = EngineConfig::default().with_workspace(tmp.path().to_path_buf());
        let mut registry = WorkerRegistry::new();
        registry.register_for_all_layers(Arc::new(TemplateWorker));
        registry.register("planner", Arc::new(TemplatePlanner));
        let engine = Arc::new(
            Engine::new(config)
                .with_registry(registry)
                .with_harness(Arc::new(AlwaysFailingHarness))
                .with_analyzer(Arc::new(NoFixAnalyzer)),
        );
        engine.initialize("x", Some("x")).await.unwrap();
        engine.plan().await.unwrap();
        let response = engine.generate_code(false).await.unwrap();
        assert_eq!(response.status, "completed_with_issues");
        let runs = engine.history().entries().unwrap();
        assert!(!runs[0].success);
    }
}
