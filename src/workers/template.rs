//! Deterministic offline worker used by dry runs and tests.

use anyhow::Result;
use async_trait::async_trait;

use crate::plan::Layer;

use super::{GeneratedFile, TaskContext, Worker, WorkerOutput};

/// Produces a small placeholder file per task without touching any external
/// process, so the whole pipeline can run end to end offline.
#[derive(Debug, Clone, Default)]
pub struct TemplateWorker;

impl TemplateWorker {
    fn path_for(context: &TaskContext) -> String {
        let stem = if context.task_name.is_empty() {
            "task".to_string()
        } else {
            context.task_name.replace([' ', '/'], "-")
        };
        match context.layer {
            Some(Layer::Frontend) | Some(Layer::Design) => format!("src/{}.jsx", stem),
            _ => format!("src/{}.js", stem),
        }
    }
}

#[async_trait]
impl Worker for TemplateWorker {
    async fn execute(&self, input: &str, context: &TaskContext) -> Result<WorkerOutput> {
        let content = format!(
            "// {} ({})\n// {}\nmodule.exports = {{}};\n",
            context.task_name,
            context
                .layer
                .map(|l| l.to_string())
                .unwrap_or_else(|| "general".to_string()),
            input.lines().next().unwrap_or_default(),
        );
        Ok(WorkerOutput::Files(vec![GeneratedFile {
            path: Self::path_for(context),
            content,
        }]))
    }
}

/// Offline planner emitting a fixed four-task decomposition, so dry runs
/// can exercise the whole pipeline without an external generator.
#[derive(Debug, Clone, Default)]
pub struct TemplatePlanner;

#[async_trait]
impl Worker for TemplatePlanner {
    async fn execute(&self, input: &str, _context: &TaskContext) -> Result<WorkerOutput> {
        let summary = input.lines().next().unwrap_or("Generated project").trim();
        let plan = serde_json::json!({
            "summary": format!("Offline plan: {}", summary),
            "tasks": [
                {"name": "data-model", "layer": "backend", "description": "Define the data model and storage access", "priority": 0},
                {"name": "api", "layer": "backend", "description": "Implement the HTTP API", "priority": 1, "dependencies": ["data-model"]},
                {"name": "styles", "layer": "design", "description": "Base layout and styles", "priority": 0},
                {"name": "ui", "layer": "frontend", "description": "User interface wired to the API", "priority": 0, "dependencies": ["api"]}
            ]
        });
        Ok(WorkerOutput::Text(plan.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ExecutionPlan;

    #[tokio::test]
    async fn template_planner_output_parses_as_a_plan() {
        let out = TemplatePlanner
            .execute("A todo app", &TaskContext::default())
            .await
            .unwrap();
        let WorkerOutput::Text(text) = out else {
            panic!("planner must return text");
        };
        let plan = ExecutionPlan::parse(&text).unwrap();
        assert_eq!(plan.tasks.len(), 4);
        assert!(plan.tasks.iter().any(|t| t.layer == Layer::Frontend));
    }

    #[tokio::test]
    async fn template_worker_emits_one_file_per_task() {
        let context = TaskContext {
            task_name: "user api".into(),
            layer: Some(Layer::Backend),
            ..Default::default()
        };
        let out = TemplateWorker.execute("REST endpoints", &context).await.unwrap();
        match out {
            WorkerOutput::Files(files) => {
                assert_eq!(files.len(), 1);
                assert_eq!(files[0].path, "src/user-api.js");
                assert!(files[0].content.contains("REST endpoints"));
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn frontend_tasks_get_jsx_paths() {
        let context = TaskContext {
            task_name: "home".into(),
            layer: Some(Layer::Frontend),
            ..Default::default()
        };
        let out = TemplateWorker.execute("landing page", &context).await.unwrap();
        match out {
            WorkerOutput::Files(files) => assert_eq!(files[0].path, "src/home.jsx"),
            other => panic!("unexpected output: {:?}", other),
        }
    }
}
