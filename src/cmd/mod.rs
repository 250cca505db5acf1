//! CLI command handlers.

mod client;
mod history;
mod plan;
mod run;
mod serve;

pub use client::{report_error, status, stop};
pub use history::history;
pub use plan::plan;
pub use run::run;
pub use serve::serve;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::workers::{CommandWorker, TemplatePlanner, TemplateWorker, WorkerRegistry};

/// Assemble an engine with its worker registry.
///
/// Workers come from `--worker-cmd` (or `ATELIER_WORKER_CMD`); without one
/// the offline template workers are used so every command still works.
pub fn build_engine(config: EngineConfig, worker_cmd: Option<String>) -> Arc<Engine> {
    let worker_cmd = worker_cmd.or_else(|| std::env::var("ATELIER_WORKER_CMD").ok());
    let timeout = Duration::from_secs(config.command_timeout_secs);
    let mut registry = WorkerRegistry::new();
    match worker_cmd
        .as_deref()
        .and_then(|line| CommandWorker::from_command_line(line, timeout))
    {
        Some(worker) => {
            info!("using external worker command");
            registry.register_for_all_layers(Arc::new(worker));
        }
        None => {
            info!("no worker command configured; using offline template workers");
            registry.register_for_all_layers(Arc::new(TemplateWorker));
            registry.register("planner", Arc::new(TemplatePlanner));
        }
    }
    Arc::new(Engine::new(config).with_registry(registry))
}
