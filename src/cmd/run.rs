use anyhow::Result;

use crate::config::EngineConfig;

/// `atelier run` — drive the whole pipeline in-process and print the
/// outcome.
pub async fn run(
    description: String,
    name: Option<String>,
    worker_cmd: Option<String>,
    max_iterations: Option<u32>,
) -> Result<()> {
    let mut config = EngineConfig::from_env()?;
    if let Some(max) = max_iterations {
        config = config.with_max_iterations(max);
    }
    config.ensure_workspace()?;
    let engine = super::build_engine(config, worker_cmd);

    let init = engine.initialize(&description, name.as_deref()).await?;
    println!("Project {} initialized", init.project_id);

    let plan = engine.plan().await?;
    println!("Plan: {} ({} tasks)", plan.plan_summary, plan.task_count);

    engine.generate_code(false).await?;

    let snapshot = engine.status();
    println!("Status: {}", snapshot.status);
    println!("Files generated: {}", snapshot.files_generated);
    for url in &snapshot.service_urls {
        println!("Service: {}", url);
    }
    if snapshot.issue_count > 0 {
        println!("Issues logged: {}", snapshot.issue_count);
        for issue in engine.tracker().issues_by_severity(None).iter().take(10) {
            println!("  [{}] {} — {}", issue.severity, issue.issue_type, issue.message);
        }
    }
    Ok(())
}
