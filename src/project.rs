//! Project identity and lifecycle state.
//!
//! A `Project` is the single mutable record the engine threads through every
//! pipeline phase. At most one project is active (non-terminal) per engine
//! instance; that invariant is enforced at the engine's entry points rather
//! than through ambient globals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::plan::ExecutionPlan;

/// Pipeline status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// No project has been initialized.
    #[default]
    Idle,
    Initializing,
    InitializationFailed,
    Initialized,
    Planning,
    /// Retryable: `plan` may be called again after a failed decomposition.
    PlanningFailed,
    Planned,
    Generating,
    GenerationFailed,
    Building,
    BuildFailed,
    StartingServices,
    DeploymentFailed,
    Testing,
    TestingFailed,
    Analyzing,
    AnalysisFailed,
    Refining,
    Completed,
    CompletedWithIssues,
    /// An external error report arrived while the project was not running.
    ErrorReported,
    Stopped,
}

impl ProjectStatus {
    /// Terminal statuses accept a new `initialize` call; non-terminal ones
    /// indicate a project is mid-pipeline.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProjectStatus::Idle
                | ProjectStatus::InitializationFailed
                | ProjectStatus::PlanningFailed
                | ProjectStatus::GenerationFailed
                | ProjectStatus::BuildFailed
                | ProjectStatus::DeploymentFailed
                | ProjectStatus::TestingFailed
                | ProjectStatus::AnalysisFailed
                | ProjectStatus::Completed
                | ProjectStatus::CompletedWithIssues
                | ProjectStatus::ErrorReported
                | ProjectStatus::Stopped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Idle => "idle",
            ProjectStatus::Initializing => "initializing",
            ProjectStatus::InitializationFailed => "initialization_failed",
            ProjectStatus::Initialized => "initialized",
            ProjectStatus::Planning => "planning",
            ProjectStatus::PlanningFailed => "planning_failed",
            ProjectStatus::Planned => "planned",
            ProjectStatus::Generating => "generating",
            ProjectStatus::GenerationFailed => "generation_failed",
            ProjectStatus::Building => "building",
            ProjectStatus::BuildFailed => "build_failed",
            ProjectStatus::StartingServices => "starting_services",
            ProjectStatus::DeploymentFailed => "deployment_failed",
            ProjectStatus::Testing => "testing",
            ProjectStatus::TestingFailed => "testing_failed",
            ProjectStatus::Analyzing => "analyzing",
            ProjectStatus::AnalysisFailed => "analysis_failed",
            ProjectStatus::Refining => "refining",
            ProjectStatus::Completed => "completed",
            ProjectStatus::CompletedWithIssues => "completed_with_issues",
            ProjectStatus::ErrorReported => "error_reported",
            ProjectStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single project record threaded through all pipeline phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    pub name: String,
    pub description: String,
    pub status: ProjectStatus,
    pub execution_plan: Option<ExecutionPlan>,
    pub current_iteration: u32,
    pub max_iterations: u32,
    /// Relative paths written so far, in write order, deduplicated.
    pub files: Vec<String>,
    pub service_urls: Vec<String>,
    pub allocated_ports: Vec<u16>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Create a fresh project record in `initializing` state.
    pub fn new(description: &str, name: Option<&str>, max_iterations: u32) -> Self {
        let name = match name {
            Some(n) => n.to_string(),
            None => derive_name(description),
        };
        Self {
            project_id: Uuid::new_v4().to_string(),
            name,
            description: description.to_string(),
            status: ProjectStatus::Initializing,
            execution_plan: None,
            current_iteration: 0,
            max_iterations,
            files: Vec::new(),
            service_urls: Vec::new(),
            allocated_ports: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Record a written file, preserving first-write order.
    pub fn record_file(&mut self, path: &str) {
        if !self.files.iter().any(|f| f == path) {
            self.files.push(path.to_string());
        }
    }
}

/// Derive a project name from the first line of the description plus a
/// timestamp, matching the behavior callers rely on when no name is given.
fn derive_name(description: &str) -> String {
    let first_line: String = description
        .lines()
        .next()
        .unwrap_or("project")
        .chars()
        .take(30)
        .collect();
    let slug: String = first_line
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug.trim_matches('-').to_string();
    let slug = if slug.is_empty() { "project".to_string() } else { slug };
    format!("{}-{}", slug, Utc::now().format("%Y%m%d%H%M"))
}

/// Read-only snapshot returned by `GetStatus`, safe to serialize to CLI/API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub current_iteration: u32,
    pub max_iterations: u32,
    pub files_generated: usize,
    pub service_urls: Vec<String>,
    pub run_active: bool,
    pub issue_count: usize,
    pub recent_progress: Vec<crate::tracker::ProgressEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_project_is_initializing_with_id() {
        let project = Project::new("A todo app", Some("todo"), 5);
        assert!(!project.project_id.is_empty());
        assert_eq!(project.name, "todo");
        assert_eq!(project.status, ProjectStatus::Initializing);
        assert_eq!(project.max_iterations, 5);
    }

    #[test]
    fn derived_name_slugs_first_line() {
        let project = Project::new("Build Me A Shop!\nwith stripe", None, 3);
        assert!(project.name.starts_with("build-me-a-shop"));
    }

    #[test]
    fn record_file_deduplicates_and_preserves_order() {
        let mut project = Project::new("x", Some("x"), 1);
        project.record_file("src/index.js");
        project.record_file("src/app.js");
        project.record_file("src/index.js");
        assert_eq!(project.files, vec!["src/index.js", "src/app.js"]);
    }

    #[test]
    fn terminal_statuses() {
        assert!(ProjectStatus::Idle.is_terminal());
        assert!(ProjectStatus::BuildFailed.is_terminal());
        assert!(ProjectStatus::Completed.is_terminal());
        assert!(!ProjectStatus::Generating.is_terminal());
        assert!(!ProjectStatus::Refining.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ProjectStatus::StartingServices).unwrap();
        assert_eq!(json, "\"starting_services\"");
        assert_eq!(ProjectStatus::PlanningFailed.to_string(), "planning_failed");
    }
}
