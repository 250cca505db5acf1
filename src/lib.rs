//! Atelier: a software-synthesis pipeline orchestrator.
//!
//! An engine drives a described project through planning, DAG-scheduled
//! code generation, build, deployment, testing, analysis, and bounded
//! refinement, tracking issues and progress along the way. Code generation
//! itself is pluggable through the `Worker` trait; this crate owns the
//! orchestration, the resources, and the bookkeeping.

pub mod api;
pub mod cancel;
pub mod cmd;
pub mod collab;
pub mod config;
pub mod engine;
pub mod errors;
pub mod history;
pub mod plan;
pub mod project;
pub mod resources;
pub mod scheduler;
pub mod tracker;
pub mod workers;
pub mod workspace;

pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use engine::{Engine, RefinementStatus};
pub use errors::{EngineError, ResourceError};
pub use plan::{ExecutionPlan, Layer, Task};
pub use project::{Project, ProjectStatus, StatusSnapshot};
pub use scheduler::{ScheduleReport, TaskOutcome, TaskScheduler};
pub use tracker::{DetailedIssue, ProgressIssueTracker, Severity};
pub use workers::{Worker, WorkerOutput, WorkerRegistry};
