//! Client commands that talk to a running `atelier serve` instance.

use anyhow::{Context, Result};
use serde_json::json;

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

/// `atelier status` — fetch and print the server's status snapshot.
pub async fn status(url: String) -> Result<()> {
    let snapshot: serde_json::Value = client()
        .get(format!("{}/api/status", url.trim_end_matches('/')))
        .send()
        .await
        .context("Failed to reach the API server")?
        .json()
        .await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// `atelier stop` — request a cooperative stop on the server.
pub async fn stop(url: String) -> Result<()> {
    let response: serde_json::Value = client()
        .post(format!("{}/api/projects/stop", url.trim_end_matches('/')))
        .send()
        .await
        .context("Failed to reach the API server")?
        .json()
        .await?;
    println!("{}", response["status"].as_str().unwrap_or("unknown"));
    Ok(())
}

/// `atelier report-error` — file an external error report with the server.
pub async fn report_error(url: String, message: String, file: Option<String>) -> Result<()> {
    let body = json!({
        "message": message,
        "source_component": "Cli",
        "file_path": file,
    });
    let response: serde_json::Value = client()
        .post(format!("{}/api/errors", url.trim_end_matches('/')))
        .json(&body)
        .send()
        .await
        .context("Failed to reach the API server")?
        .json()
        .await?;
    println!("Recorded issue {}", response["issue_id"].as_str().unwrap_or("?"));
    Ok(())
}
