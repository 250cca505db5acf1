use anyhow::Result;

use crate::config::EngineConfig;
use crate::history::RunHistory;

/// `atelier history` — list or clear past pipeline runs.
pub async fn history(clear: bool) -> Result<()> {
    let config = EngineConfig::from_env()?;
    let history = RunHistory::new(&config.workspace_path);

    if clear {
        history.clear()?;
        println!("History cleared");
        return Ok(());
    }

    let entries = history.entries()?;
    if entries.is_empty() {
        println!("No recorded runs");
        return Ok(());
    }
    for entry in entries {
        let outcome = if entry.success { "ok" } else { "failed" };
        let url = if entry.url.is_empty() { "-" } else { &entry.url };
        println!(
            "{}  {}  {:6}  {}  {}",
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            entry.project_id,
            outcome,
            url,
            entry.prompt
        );
    }
    Ok(())
}
