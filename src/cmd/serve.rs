use std::net::SocketAddr;

use anyhow::Result;

use crate::api;
use crate::config::EngineConfig;

/// `atelier serve` — run the HTTP API.
pub async fn serve(host: String, port: u16, worker_cmd: Option<String>) -> Result<()> {
    let config = EngineConfig::from_env()?;
    config.ensure_workspace()?;
    let engine = super::build_engine(config, worker_cmd);
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    api::serve(engine, addr).await
}
