//! Execution plans: the task DAG produced by planning.
//!
//! Planning asks the `planner` worker for a JSON decomposition of the project
//! description. The response is parsed leniently (JSON extracted from
//! surrounding prose or markdown fences) but validated strictly: duplicate
//! task names or dependencies on unknown tasks are malformed decompositions
//! and fail planning.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Coarse architectural bucket used to order and route generation tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    #[default]
    Backend,
    Middleware,
    Design,
    Frontend,
}

impl Layer {
    /// Fixed generation order: later layers may assume earlier outputs exist.
    pub const ORDER: [Layer; 4] = [
        Layer::Backend,
        Layer::Middleware,
        Layer::Design,
        Layer::Frontend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Backend => "backend",
            Layer::Middleware => "middleware",
            Layer::Design => "design",
            Layer::Frontend => "frontend",
        }
    }

    /// Capability-registry name that executes tasks for this layer.
    ///
    /// Selection is a pure function; the registry itself is resolved once at
    /// startup.
    pub fn worker_name(&self) -> &'static str {
        self.as_str()
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of generation work. Immutable once the plan is handed to the
/// scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique within a plan.
    pub name: String,
    #[serde(default)]
    pub layer: Layer,
    /// Opaque payload handed to the worker (the task prompt).
    #[serde(alias = "description")]
    pub input: String,
    /// Lower sorts first among ready tasks.
    #[serde(default)]
    pub priority: i32,
    /// Task names that must reach a terminal result before this task runs.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Task {
    pub fn new(name: &str, layer: Layer, input: &str) -> Self {
        Self {
            name: name.to_string(),
            layer,
            input: input.to_string(),
            priority: 0,
            dependencies: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<&str>) -> Self {
        self.dependencies = deps.into_iter().map(String::from).collect();
        self
    }

    /// Which registered worker executes this task.
    pub fn worker_name(&self) -> &'static str {
        self.layer.worker_name()
    }
}

/// The task graph produced by planning and consumed by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub summary: String,
    pub tasks: Vec<Task>,
}

impl ExecutionPlan {
    /// Parse a decomposition response into a validated plan.
    ///
    /// Tolerates prose or markdown fences around the JSON object but rejects
    /// empty plans, duplicate task names, and dependencies on unknown tasks.
    pub fn parse(raw: &str) -> Result<Self> {
        let cleaned = match (raw.find('{'), raw.rfind('}')) {
            (Some(start), Some(end)) if start < end => &raw[start..=end],
            _ => raw,
        };
        let plan: ExecutionPlan =
            serde_json::from_str(cleaned).context("Decomposition response is not valid JSON")?;
        plan.validate()?;
        Ok(plan)
    }

    fn validate(&self) -> Result<()> {
        if self.tasks.is_empty() {
            anyhow::bail!("Decomposition contains no tasks");
        }
        let mut seen = std::collections::HashSet::new();
        for task in &self.tasks {
            if task.name.trim().is_empty() {
                anyhow::bail!("Decomposition contains a task with an empty name");
            }
            if !seen.insert(task.name.as_str()) {
                anyhow::bail!("Duplicate task name in decomposition: {}", task.name);
            }
        }
        for task in &self.tasks {
            for dep in &task.dependencies {
                if !seen.contains(dep.as_str()) {
                    anyhow::bail!(
                        "Task {} depends on unknown task {}",
                        task.name,
                        dep
                    );
                }
            }
        }
        Ok(())
    }

    /// Tasks belonging to one layer, in plan order.
    pub fn tasks_for_layer(&self, layer: Layer) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.layer == layer).collect()
    }

    /// One-line summary for status output.
    pub fn describe(&self) -> String {
        let mut counts = std::collections::HashMap::new();
        for task in &self.tasks {
            *counts.entry(task.layer).or_insert(0usize) += 1;
        }
        let per_layer: Vec<String> = Layer::ORDER
            .iter()
            .filter_map(|l| counts.get(l).map(|c| format!("{} {}", c, l)))
            .collect();
        format!("{} tasks ({})", self.tasks.len(), per_layer.join(", "))
    }
}

/// System prompt handed to the `planner` worker when decomposing a project.
pub const PLANNER_PROMPT: &str = r#"You are a software project planner. Decompose the project below into generation tasks.

Respond with valid JSON only (no markdown, no explanation) matching this schema:
{
  "summary": "One-sentence plan summary",
  "tasks": [
    {
      "name": "short-unique-name",
      "layer": "backend" | "middleware" | "design" | "frontend",
      "description": "Detailed prompt for the worker that generates this part",
      "priority": 0,
      "dependencies": ["names", "of", "prerequisite", "tasks"]
    }
  ]
}

Rules:
- Lower priority numbers run first among ready tasks.
- Dependencies must name other tasks in this plan.
- Backend tasks run before middleware, middleware before design, design before frontend.
- Keep plans small: one task per coherent component.
"#;

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN_JSON: &str = r#"{
        "summary": "Todo app",
        "tasks": [
            {"name": "api", "layer": "backend", "description": "REST API", "priority": 0},
            {"name": "auth", "layer": "middleware", "description": "Sessions", "priority": 1, "dependencies": ["api"]},
            {"name": "ui", "layer": "frontend", "description": "React UI", "dependencies": ["api", "auth"]}
        ]
    }"#;

    #[test]
    fn parse_valid_plan() {
        let plan = ExecutionPlan::parse(PLAN_JSON).unwrap();
        assert_eq!(plan.tasks.len(), 3);
        assert_eq!(plan.tasks[1].dependencies, vec!["api"]);
        assert_eq!(plan.tasks[2].layer, Layer::Frontend);
    }

    #[test]
    fn parse_tolerates_markdown_wrapping() {
        let wrapped = format!("Here is the plan:\n```json\n{}\n```\nDone.", PLAN_JSON);
        let plan = ExecutionPlan::parse(&wrapped).unwrap();
        assert_eq!(plan.tasks.len(), 3);
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(ExecutionPlan::parse("I could not decompose this").is_err());
    }

    #[test]
    fn parse_rejects_empty_plan() {
        let err = ExecutionPlan::parse(r#"{"summary": "x", "tasks": []}"#).unwrap_err();
        assert!(err.to_string().contains("no tasks"));
    }

    #[test]
    fn parse_rejects_duplicate_names() {
        let raw = r#"{"summary": "x", "tasks": [
            {"name": "a", "description": "one"},
            {"name": "a", "description": "two"}
        ]}"#;
        let err = ExecutionPlan::parse(raw).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn parse_rejects_unknown_dependency() {
        let raw = r#"{"summary": "x", "tasks": [
            {"name": "a", "description": "one", "dependencies": ["ghost"]}
        ]}"#;
        let err = ExecutionPlan::parse(raw).unwrap_err();
        assert!(err.to_string().contains("unknown task"));
    }

    #[test]
    fn layer_order_is_backend_first_frontend_last() {
        assert_eq!(Layer::ORDER.first(), Some(&Layer::Backend));
        assert_eq!(Layer::ORDER.last(), Some(&Layer::Frontend));
    }

    #[test]
    fn describe_counts_per_layer() {
        let plan = ExecutionPlan::parse(PLAN_JSON).unwrap();
        let summary = plan.describe();
        assert!(summary.contains("3 tasks"));
        assert!(summary.contains("1 backend"));
    }
}
