use anyhow::Result;

use crate::config::EngineConfig;

/// `atelier plan` — initialize and plan, print the decomposition, stop
/// there.
pub async fn plan(description: String, name: Option<String>, worker_cmd: Option<String>) -> Result<()> {
    let config = EngineConfig::from_env()?;
    config.ensure_workspace()?;
    let engine = super::build_engine(config, worker_cmd);

    let init = engine.initialize(&description, name.as_deref()).await?;
    let response = engine.plan().await?;
    println!("Project: {}", init.project_id);
    println!("Summary: {}", response.plan_summary);

    if let Some(plan) = engine.execution_plan() {
        println!("{}", plan.describe());
        for task in &plan.tasks {
            let deps = if task.dependencies.is_empty() {
                String::new()
            } else {
                format!(" (after {})", task.dependencies.join(", "))
            };
            println!("  [{}] {}{}", task.layer, task.name, deps);
        }
    }
    Ok(())
}
