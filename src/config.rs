//! Runtime configuration for the orchestrator.
//!
//! Configuration is environment-derived: every knob has an `ATELIER_*`
//! variable and a sensible default, and `.env` files are honored via dotenvy.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Engine-wide runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root directory that holds one subdirectory per project.
    pub workspace_path: PathBuf,
    /// Concurrent task executions inside the scheduler.
    pub max_workers: usize,
    /// Per-task retry budget in the scheduler.
    pub max_retries: u32,
    /// Refinement loop bound.
    pub max_iterations: u32,
    /// Inclusive port scan range for deployments.
    pub port_range: (u16, u16),
    /// Bounded wait for external build/install/test commands, in seconds.
    pub command_timeout_secs: u64,
    /// Bounded wait for a deployed service to respond, in seconds.
    pub service_ready_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_path: default_workspace(),
            max_workers: 2,
            max_retries: 2,
            max_iterations: 5,
            port_range: (3000, 9000),
            command_timeout_secs: 300,
            service_ready_timeout_secs: 30,
        }
    }
}

fn default_workspace() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("atelier")
        .join("workspace")
}

impl EngineConfig {
    /// Load configuration from the environment, falling back to defaults.
    ///
    /// Recognized variables: `ATELIER_WORKSPACE`, `ATELIER_MAX_WORKERS`,
    /// `ATELIER_MAX_RETRIES`, `ATELIER_MAX_ITERATIONS`, `ATELIER_PORT_MIN`,
    /// `ATELIER_PORT_MAX`, `ATELIER_COMMAND_TIMEOUT_SECS`,
    /// `ATELIER_SERVICE_READY_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let workspace_path = std::env::var("ATELIER_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or(defaults.workspace_path);

        let port_min = env_parse("ATELIER_PORT_MIN", defaults.port_range.0)?;
        let port_max = env_parse("ATELIER_PORT_MAX", defaults.port_range.1)?;
        if port_min > port_max {
            anyhow::bail!("ATELIER_PORT_MIN {} exceeds ATELIER_PORT_MAX {}", port_min, port_max);
        }

        Ok(Self {
            workspace_path,
            max_workers: env_parse("ATELIER_MAX_WORKERS", defaults.max_workers)?.max(1),
            max_retries: env_parse("ATELIER_MAX_RETRIES", defaults.max_retries)?,
            max_iterations: env_parse("ATELIER_MAX_ITERATIONS", defaults.max_iterations)?.max(1),
            port_range: (port_min, port_max),
            command_timeout_secs: env_parse(
                "ATELIER_COMMAND_TIMEOUT_SECS",
                defaults.command_timeout_secs,
            )?,
            service_ready_timeout_secs: env_parse(
                "ATELIER_SERVICE_READY_TIMEOUT_SECS",
                defaults.service_ready_timeout_secs,
            )?,
        })
    }

    /// Override the workspace root.
    pub fn with_workspace(mut self, path: PathBuf) -> Self {
        self.workspace_path = path;
        self
    }

    /// Override the scheduler pool size.
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = max.max(1);
        self
    }

    /// Override the refinement bound.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn service_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.service_ready_timeout_secs)
    }

    /// Create the workspace root if it does not exist yet.
    pub fn ensure_workspace(&self) -> Result<()> {
        std::fs::create_dir_all(&self.workspace_path)
            .with_context(|| format!("Failed to create workspace at {}", self.workspace_path.display()))
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", var, raw)),
        Err(_) => Ok(default),
    }
}
