//! Worker capability seam.
//!
//! A `Worker` turns a task's input into generated file content. Workers are
//! external collaborators (typically LLM-backed); the core only depends on
//! this trait and a registry resolved once at startup. Workers may be invoked
//! more than once for the same task name (retries), so implementations must
//! be idempotent or side-effect-tolerant.

mod command;
mod template;

pub use command::CommandWorker;
pub use template::{TemplatePlanner, TemplateWorker};

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::plan::Layer;

/// Shared context handed to a worker alongside the task input.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskContext {
    pub project_id: String,
    pub project_name: String,
    pub project_description: String,
    pub task_name: String,
    pub layer: Option<Layer>,
    /// Relative paths already present in the project, for cross-referencing.
    pub existing_files: Vec<String>,
}

/// A file descriptor returned by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    /// Relative to the project root.
    pub path: String,
    pub content: String,
}

/// What a worker produced: structured file descriptors, or free-form text
/// that the core persists as a single file if no file blocks can be parsed
/// out of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerOutput {
    Files(Vec<GeneratedFile>),
    Text(String),
}

/// An external capability that executes one task.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn execute(&self, input: &str, context: &TaskContext) -> Result<WorkerOutput>;
}

/// Capability registry mapping worker names to implementations.
///
/// Built once at startup; the scheduler and refinement loop resolve workers
/// by name (`Layer::worker_name` for generation, `agent_type` for fixes).
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, worker: Arc<dyn Worker>) {
        self.workers.insert(name.to_string(), worker);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Register the same worker for every generation layer plus the planner.
    pub fn register_for_all_layers(&mut self, worker: Arc<dyn Worker>) {
        for layer in Layer::ORDER {
            self.register(layer.worker_name(), Arc::clone(&worker));
        }
        self.register("planner", worker);
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("workers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Worker for Echo {
        async fn execute(&self, input: &str, _context: &TaskContext) -> Result<WorkerOutput> {
            Ok(WorkerOutput::Text(input.to_string()))
        }
    }

    #[test]
    fn registry_register_and_get() {
        let mut registry = WorkerRegistry::new();
        registry.register("backend", Arc::new(Echo));
        assert!(registry.contains("backend"));
        assert!(registry.get("frontend").is_none());
    }

    #[test]
    fn register_for_all_layers_covers_planner_too() {
        let mut registry = WorkerRegistry::new();
        registry.register_for_all_layers(Arc::new(Echo));
        for layer in Layer::ORDER {
            assert!(registry.contains(layer.worker_name()), "{} missing", layer);
        }
        assert!(registry.contains("planner"));
    }

    #[tokio::test]
    async fn worker_trait_is_object_safe() {
        let worker: Arc<dyn Worker> = Arc::new(Echo);
        let out = worker.execute("hello", &TaskContext::default()).await.unwrap();
        assert_eq!(out, WorkerOutput::Text("hello".into()));
    }
}
