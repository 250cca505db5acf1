//! External collaborator seams: shell execution, test harness, issue analysis.
//!
//! The pipeline depends on these traits only; the default implementations
//! shell out or apply deterministic heuristics so the CLI works end to end,
//! and tests swap in stubs.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::ResourceError;
use crate::plan::{Layer, Task};
use crate::tracker::{DetailedIssue, Severity};

/// Captured result of a completed (not timed-out) shell command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Combined output for issue messages, stderr first.
    pub fn combined(&self) -> String {
        let mut out = String::new();
        if !self.stderr.trim().is_empty() {
            out.push_str(self.stderr.trim());
        }
        if !self.stdout.trim().is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(self.stdout.trim());
        }
        out
    }
}

/// Runs shell commands with a bounded wait window.
///
/// Expiry is a distinct failure (`CommandTimeout`) from a process that exited
/// nonzero; callers that care inspect `exit_code` themselves.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run_shell_command(
        &self,
        command: &str,
        cwd: &Path,
        timeout: Duration,
    ) -> std::result::Result<CommandOutput, ResourceError>;
}

/// Default `ToolRunner`: `sh -c` with piped output.
#[derive(Debug, Clone, Default)]
pub struct ShellToolRunner;

#[async_trait]
impl ToolRunner for ShellToolRunner {
    async fn run_shell_command(
        &self,
        command: &str,
        cwd: &Path,
        timeout: Duration,
    ) -> std::result::Result<CommandOutput, ResourceError> {
        debug!(command, cwd = %cwd.display(), "running shell command");
        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ResourceError::CommandTimeout {
                command: command.to_string(),
                seconds: timeout.as_secs(),
            })??;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// One failing test, as much detail as the harness could extract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestFailureDetail {
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
}

/// Outcome of one test run.
///
/// `success=false` means the harness itself malfunctioned (could not run at
/// all); failing tests are `success=true, issues_found=true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub success: bool,
    pub issues_found: bool,
    pub summary: String,
    #[serde(default)]
    pub failures: Vec<TestFailureDetail>,
}

impl TestReport {
    pub fn clean(summary: &str) -> Self {
        Self {
            success: true,
            issues_found: false,
            summary: summary.to_string(),
            failures: Vec::new(),
        }
    }
}

/// Runs the project's unit tests.
#[async_trait]
pub trait TestHarness: Send + Sync {
    async fn run_unit_tests(&self, project_dir: &Path) -> TestReport;
}

/// Default harness: runs the detected test command and reads its exit code.
///
/// A missing test command is a clean pass, not a malfunction; spawn or
/// timeout failures are malfunctions.
pub struct CommandTestHarness {
    command: Option<String>,
    runner: Arc<dyn ToolRunner>,
    timeout: Duration,
}

impl CommandTestHarness {
    pub fn new(command: Option<String>, runner: Arc<dyn ToolRunner>, timeout: Duration) -> Self {
        Self {
            command,
            runner,
            timeout,
        }
    }
}

#[async_trait]
impl TestHarness for CommandTestHarness {
    async fn run_unit_tests(&self, project_dir: &Path) -> TestReport {
        let Some(command) = &self.command else {
            return TestReport::clean("No test command for this project kind");
        };
        match self
            .runner
            .run_shell_command(command, project_dir, self.timeout)
            .await
        {
            Ok(output) if output.success() => {
                TestReport::clean(&format!("{} passed", command))
            }
            Ok(output) => TestReport {
                success: true,
                issues_found: true,
                summary: format!("{} exited with code {}", command, output.exit_code),
                failures: vec![TestFailureDetail {
                    name: command.clone(),
                    message: truncate(&output.combined(), 2000),
                    file_path: None,
                    line_number: None,
                }],
            },
            Err(err) => {
                warn!(command, error = %err, "test harness malfunction");
                TestReport {
                    success: false,
                    issues_found: false,
                    summary: format!("Test harness failed to run: {}", err),
                    failures: Vec::new(),
                }
            }
        }
    }
}

/// Result of issue classification: enriched issues plus the fix tasks the
/// refinement loop should run.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub issues: Vec<DetailedIssue>,
    pub fix_tasks: Vec<Task>,
}

/// Classifies raw issues into actionable fix work.
#[async_trait]
pub trait IssueAnalyzer: Send + Sync {
    async fn classify_issues(&self, issues: &[DetailedIssue]) -> Result<Analysis>;
}

/// Default analyzer: deterministic mapping with no external calls.
///
/// Build and test failures become one fix task each, routed by file
/// extension to the frontend or backend worker. Informational issues are
/// never actionable.
#[derive(Debug, Clone, Default)]
pub struct HeuristicAnalyzer;

const ACTIONABLE_TYPES: &[&str] = &["BuildFailure", "TestFailure", "ServiceStartFailure"];

fn layer_for_path(path: Option<&str>) -> Layer {
    match path.map(PathBuf::from) {
        Some(p) => match p.extension().and_then(|e| e.to_str()) {
            Some("jsx") | Some("tsx") | Some("css") | Some("html") | Some("vue") => Layer::Frontend,
            _ => Layer::Backend,
        },
        None => Layer::Backend,
    }
}

#[async_trait]
impl IssueAnalyzer for HeuristicAnalyzer {
    async fn classify_issues(&self, issues: &[DetailedIssue]) -> Result<Analysis> {
        let mut analysis = Analysis::default();
        for (index, issue) in issues.iter().enumerate() {
            let mut issue = issue.clone();
            issue.actionable = issue.severity != Severity::Informational
                && ACTIONABLE_TYPES.contains(&issue.issue_type.as_str());
            if issue.actionable {
                let layer = layer_for_path(issue.file_path.as_deref());
                let mut input = format!("Fix this {}: {}", issue.issue_type, issue.message);
                if let Some(description) = &issue.description {
                    input.push('\n');
                    input.push_str(description);
                }
                if let Some(path) = &issue.file_path {
                    input.push_str(&format!("\nAffected file: {}", path));
                }
                analysis
                    .fix_tasks
                    .push(Task::new(&format!("fix-{}", index + 1), layer, &input));
            }
            analysis.issues.push(issue);
        }
        Ok(analysis)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
