//! Deployed service processes.
//!
//! A service is a child process started from a kind-specific run template.
//! Start is only declared successful once the service answers HTTP on one of
//! its expected ports within the readiness window; a process that exits
//! first fails with its captured output, and a process that stays silent
//! past the window is killed and reported as unresponsive.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::errors::ResourceError;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// A running deployed service.
#[derive(Debug)]
pub struct ServiceProcess {
    child: tokio::process::Child,
    pub pid: Option<u32>,
    pub port: u16,
    pub urls: Vec<String>,
    pub command: String,
}

impl ServiceProcess {
    /// Substitute `{port}` into the run template, spawn the service, and
    /// poll until it responds on the allocated port or one of
    /// `extra_probe_ports`.
    pub async fn start(
        run_template: &str,
        cwd: &Path,
        port: u16,
        extra_probe_ports: &[u16],
        ready_timeout: Duration,
    ) -> Result<Self, ResourceError> {
        let command = run_template.replace("{port}", &port.to_string());
        info!(command, port, "starting service");

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(cwd)
            .env("PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let pid = child.id();

        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| ResourceError::ServiceStartFailure {
                message: format!("Failed to build readiness client: {}", e),
                output: String::new(),
            })?;

        let mut probe_ports = vec![port];
        probe_ports.extend(extra_probe_ports.iter().filter(|p| **p != port));

        let deadline = Instant::now() + ready_timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                let output = child.wait_with_output().await?;
                let combined = format!(
                    "{}\n{}",
                    String::from_utf8_lossy(&output.stderr).trim(),
                    String::from_utf8_lossy(&output.stdout).trim()
                );
                return Err(ResourceError::ServiceStartFailure {
                    message: format!(
                        "Service exited with {} before responding: {}",
                        status, command
                    ),
                    output: combined.trim().to_string(),
                });
            }

            let mut urls = Vec::new();
            for probe_port in &probe_ports {
                let url = format!("http://127.0.0.1:{}/", probe_port);
                match client.get(&url).send().await {
                    Ok(response) if response.status().as_u16() < 400 => {
                        debug!(%url, "service responding");
                        urls.push(url);
                    }
                    _ => {}
                }
            }
            if !urls.is_empty() {
                info!(port, ?urls, "service ready");
                return Ok(Self {
                    child,
                    pid,
                    port,
                    urls,
                    command,
                });
            }

            if Instant::now() >= deadline {
                warn!(command, "service did not become ready in time");
                let _ = child.kill().await;
                return Err(ResourceError::ServiceStartFailure {
                    message: format!(
                        "Service still running but unresponsive after {}s: {}",
                        ready_timeout.as_secs_f32(),
                        command
                    ),
                    output: String::new(),
                });
            }
            sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Stop the service: signal for graceful shutdown, wait out the grace
    /// period, then kill.
    pub async fn stop(mut self, grace: Duration) -> Result<(), ResourceError> {
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            debug!(pid, "sending SIGTERM");
            let _ = tokio::process::Command::new("kill")
                .arg("-TERM")
                .arg(pid.to_string())
                .status()
                .await;
            if tokio::time::timeout(grace, self.child.wait()).await.is_ok() {
                info!(pid, "service stopped gracefully");
                return Ok(());
            }
            warn!(pid, "grace period expired, killing service");
        }
        #[cfg(not(unix))]
        let _ = grace;

        self.child.kill().await?;
        Ok(())
    }
}
