//! Resource management: project shape, ports, deployed services.

mod detect;
mod ports;
mod service;

pub use detect::{build_config_for, detect_project_kind, BuildConfig, ProjectKind};
pub use ports::PortAllocator;
pub use service::ServiceProcess;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::collab::ToolRunner;
use crate::config::EngineConfig;
use crate::errors::ResourceError;

const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Running service bookkeeping plus the port allocator, shared across the
/// engine and the API.
pub struct ResourceManager {
    ports: PortAllocator,
    services: tokio::sync::Mutex<HashMap<u16, ServiceProcess>>,
    tools: Arc<dyn ToolRunner>,
    command_timeout: Duration,
    service_ready_timeout: Duration,
}

impl ResourceManager {
    pub fn new(config: &EngineConfig, tools: Arc<dyn ToolRunner>) -> Self {
        Self {
            ports: PortAllocator::new(config.port_range.0, config.port_range.1),
            services: tokio::sync::Mutex::new(HashMap::new()),
            tools,
            command_timeout: config.command_timeout(),
            service_ready_timeout: config.service_ready_timeout(),
        }
    }

    /// Detect the project kind under `dir` and derive its command set.
    pub fn detect(&self, dir: &Path) -> BuildConfig {
        build_config_for(detect_project_kind(dir))
    }

    /// Run the kind's install then build commands. A nonzero exit from
    /// either is a `BuildFailure` carrying the captured output.
    pub async fn install_and_build(
        &self,
        dir: &Path,
        config: &BuildConfig,
    ) -> Result<(), ResourceError> {
        for (step, command) in [("install", &config.install), ("build", &config.build)] {
            let Some(command) = command else { continue };
            info!(step, command, kind = %config.kind, "running build step");
            let output = self
                .tools
                .run_shell_command(command, dir, self.command_timeout)
                .await?;
            if !output.success() {
                return Err(ResourceError::BuildFailure {
                    message: format!("{} step failed ({}): exit {}", step, command, output.exit_code),
                    output: output.combined(),
                });
            }
        }
        Ok(())
    }

    /// Allocate a port and start the kind's run command as a deployed
    /// service. The port is reclaimed if the service fails to come up.
    pub async fn start_service(
        &self,
        dir: &Path,
        config: &BuildConfig,
        owner_tag: &str,
    ) -> Result<(u16, Vec<String>), ResourceError> {
        let Some(run) = &config.run else {
            return Err(ResourceError::MissingCommand {
                what: "run".to_string(),
                kind: config.kind.to_string(),
            });
        };

        let port = self.ports.allocate(config.default_port(), owner_tag)?;
        match ServiceProcess::start(
            run,
            dir,
            port,
            &config.expected_ports,
            self.service_ready_timeout,
        )
        .await
        {
            Ok(service) => {
                let urls = service.urls.clone();
                self.services.lock().await.insert(port, service);
                Ok((port, urls))
            }
            Err(err) => {
                self.ports.release(port);
                Err(err)
            }
        }
    }

    /// Stop the service on `port`. The port is reclaimed even when
    /// termination errors; stopping an unknown port is a no-op.
    pub async fn stop_service(&self, port: u16) -> Result<(), ResourceError> {
        let service = self.services.lock().await.remove(&port);
        let result = match service {
            Some(service) => service.stop(STOP_GRACE_PERIOD).await,
            None => Ok(()),
        };
        self.ports.release(port);
        if let Err(err) = &result {
            warn!(port, error = %err, "service stop errored; port reclaimed anyway");
        }
        result
    }

    /// Stop every running service, reclaiming all their ports.
    pub async fn stop_all(&self) {
        let ports: Vec<u16> = self.services.lock().await.keys().copied().collect();
        for port in ports {
            let _ = self.stop_service(port).await;
        }
    }

    pub fn allocated_ports(&self) -> Vec<u16> {
        self.ports.allocated_ports()
    }
}
