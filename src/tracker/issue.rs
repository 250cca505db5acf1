//! Canonical structured records for faults and progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Issue severity, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Informational,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Informational => "informational",
        };
        f.write_str(s)
    }
}

/// Issue lifecycle. Issues are never deleted, only transitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    #[default]
    New,
    Analyzed,
    FixProposed,
    FixAttempted,
    Resolved,
    Ignored,
}

/// The canonical structured record of any fault detected in the pipeline.
///
/// Immutable once logged except for `status` and the enrichment fields
/// written by analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedIssue {
    pub issue_id: String,
    pub project_id: String,
    pub timestamp: DateTime<Utc>,
    /// e.g. "Engine", "Scheduler", "TestHarness.UnitTests", "Engine.Internal"
    pub source_component: String,
    /// e.g. "CodeGeneration", "Build", "UnitTest", "Deployment"
    pub phase: String,
    pub severity: Severity,
    /// Free-form taxonomy tag, e.g. "BuildFailure", "TestFailure".
    #[serde(rename = "type")]
    pub issue_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    pub status: IssueStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_issue_ids: Vec<String>,
    /// True once analysis judged a fix task can address this issue.
    #[serde(default)]
    pub actionable: bool,
}

impl DetailedIssue {
    pub fn new(
        project_id: &str,
        source_component: &str,
        phase: &str,
        severity: Severity,
        issue_type: &str,
        message: &str,
    ) -> Self {
        Self {
            issue_id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            timestamp: Utc::now(),
            source_component: source_component.to_string(),
            phase: phase.to_string(),
            severity,
            issue_type: issue_type.to_string(),
            message: message.to_string(),
            description: None,
            file_path: None,
            line_number: None,
            function_name: None,
            stack_trace: None,
            status: IssueStatus::New,
            related_issue_ids: Vec::new(),
            actionable: false,
        }
    }

    pub fn with_file(mut self, path: &str, line: Option<u32>) -> Self {
        self.file_path = Some(path.to_string());
        self.line_number = line;
        self
    }

    pub fn with_function(mut self, name: &str) -> Self {
        self.function_name = Some(name.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_stack_trace(mut self, trace: &str) -> Self {
        self.stack_trace = Some(trace.to_string());
        self
    }
}

/// Sentinel percentage meaning "no specific percentage".
pub const NO_PERCENTAGE: i32 = -1;

/// One entry in the bounded progress ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// 0–100, or `NO_PERCENTAGE`.
    pub percentage: i32,
}

impl ProgressEvent {
    pub fn new(message: &str, percentage: i32) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.to_string(),
            percentage: percentage.clamp(NO_PERCENTAGE, 100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_issue_gets_id_timestamp_and_new_status() {
        let issue = DetailedIssue::new(
            "p1",
            "Engine",
            "Build",
            Severity::Critical,
            "BuildFailure",
            "npm run build failed",
        );
        assert!(!issue.issue_id.is_empty());
        assert_eq!(issue.status, IssueStatus::New);
        assert!(!issue.actionable);
    }

    #[test]
    fn builder_enrichment_fields() {
        let issue = DetailedIssue::new("p1", "TestHarness", "UnitTest", Severity::High, "TestFailure", "assert failed")
            .with_file("src/api.js", Some(42))
            .with_function("handleLogin");
        assert_eq!(issue.file_path.as_deref(), Some("src/api.js"));
        assert_eq!(issue.line_number, Some(42));
        assert_eq!(issue.function_name.as_deref(), Some("handleLogin"));
    }

    #[test]
    fn issue_type_serializes_as_type() {
        let issue = DetailedIssue::new("p1", "Engine", "Build", Severity::Low, "Lint", "m");
        let json = serde_json::to_string(&issue).unwrap();
        assert!(json.contains("\"type\":\"Lint\""));
    }

    #[test]
    fn progress_event_clamps_percentage() {
        assert_eq!(ProgressEvent::new("m", 150).percentage, 100);
        assert_eq!(ProgressEvent::new("m", -7).percentage, NO_PERCENTAGE);
        assert_eq!(ProgressEvent::new("m", NO_PERCENTAGE).percentage, NO_PERCENTAGE);
    }
}
