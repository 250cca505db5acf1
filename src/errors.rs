//! Typed error hierarchy for the Atelier orchestrator.
//!
//! Two top-level enums cover the two subsystems that surface errors to
//! callers:
//! - `EngineError` — pipeline phase failures raised by the orchestration engine
//! - `ResourceError` — build, port-allocation, and deployment failures
//!
//! Task-level failures inside the scheduler are deliberately NOT errors: the
//! scheduler captures them as data (`TaskFailure` in `scheduler`) so a DAG run
//! always completes and returns a full result map.

use thiserror::Error;

/// Errors from the orchestration engine's phase transitions.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Operation requires status {required}, current status is {actual}")]
    InvalidStatus { required: String, actual: String },

    #[error("No active project")]
    NoProject,

    #[error("Worker {0} is not registered")]
    UnknownWorker(String),

    #[error("Testing framework malfunctioned: {0}")]
    TestFramework(String),

    #[error("Analyzer returned a malformed response: {0}")]
    AnalysisContract(String),

    #[error("Internal engine error in {step}: {message}")]
    Internal { step: String, message: String },

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the resource manager (build, ports, deployment).
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Build failed: {message}")]
    BuildFailure { message: String, output: String },

    #[error("No port available in range {start}..={end}")]
    NoPortAvailable { start: u16, end: u16 },

    #[error("Service failed to start: {message}")]
    ServiceStartFailure { message: String, output: String },

    #[error("Command timed out after {seconds}s: {command}")]
    CommandTimeout { command: String, seconds: u64 },

    #[error("No {what} command for project kind {kind}")]
    MissingCommand { what: String, kind: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// The issue-taxonomy tag recorded when this error is logged as a
    /// DetailedIssue.
    pub fn issue_type(&self) -> &'static str {
        match self {
            EngineError::Initialization(_) => "InitializationError",
            EngineError::Planning(_) => "PlanningError",
            EngineError::InvalidStatus { .. } | EngineError::NoProject => "PreconditionError",
            EngineError::UnknownWorker(_) => "ConfigurationError",
            EngineError::TestFramework(_) => "TestFrameworkFailure",
            EngineError::AnalysisContract(_) => "AnalysisContractViolation",
            EngineError::Internal { .. } => "InternalEngineError",
            EngineError::Resource(ResourceError::BuildFailure { .. }) => "BuildFailure",
            EngineError::Resource(ResourceError::NoPortAvailable { .. }) => "NoPortAvailable",
            EngineError::Resource(ResourceError::ServiceStartFailure { .. }) => {
                "ServiceStartFailure"
            }
            EngineError::Resource(_) => "ResourceError",
            EngineError::Other(_) => "InternalEngineError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_failure_carries_output() {
        let err = ResourceError::BuildFailure {
            message: "npm run build exited with 1".into(),
            output: "TS2322: type error".into(),
        };
        match &err {
            ResourceError::BuildFailure { output, .. } => {
                assert!(output.contains("TS2322"));
            }
            _ => panic!("Expected BuildFailure"),
        }
    }

    #[test]
    fn no_port_available_names_the_range() {
        let err = ResourceError::NoPortAvailable {
            start: 3000,
            end: 9000,
        };
        assert!(err.to_string().contains("3000"));
        assert!(err.to_string().contains("9000"));
    }

    #[test]
    fn engine_error_converts_from_resource_error() {
        let inner = ResourceError::ServiceStartFailure {
            message: "exited before responding".into(),
            output: String::new(),
        };
        let err: EngineError = inner.into();
        assert_eq!(err.issue_type(), "ServiceStartFailure");
    }

    #[test]
    fn issue_types_match_taxonomy() {
        assert_eq!(
            EngineError::Planning("bad decomposition".into()).issue_type(),
            "PlanningError"
        );
        assert_eq!(
            EngineError::Internal {
                step: "generate".into(),
                message: "panic".into()
            }
            .issue_type(),
            "InternalEngineError"
        );
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&EngineError::NoProject);
        assert_std_error(&ResourceError::NoPortAvailable { start: 1, end: 2 });
    }
}
