//! Subprocess-backed worker.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{TaskContext, Worker, WorkerOutput};

/// Runs an external command per task, feeding the task prompt on stdin and
/// taking stdout as the worker output. This is how LLM CLIs (or any other
/// generator) plug in without the core knowing about them.
#[derive(Debug, Clone)]
pub struct CommandWorker {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandWorker {
    pub fn new(program: &str, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            args,
            timeout,
        }
    }

    /// Parse a shell-ish command line into program + args (whitespace split,
    /// no quoting). Returns `None` for an empty line.
    pub fn from_command_line(line: &str, timeout: Duration) -> Option<Self> {
        let mut parts = line.split_whitespace().map(String::from);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }

    fn render_prompt(input: &str, context: &TaskContext) -> String {
        let mut prompt = String::new();
        prompt.push_str(&format!(
            "Project: {}\nTask: {}\n",
            context.project_name, context.task_name
        ));
        if let Some(layer) = context.layer {
            prompt.push_str(&format!("Layer: {}\n", layer));
        }
        if !context.existing_files.is_empty() {
            prompt.push_str("Existing files:\n");
            for file in &context.existing_files {
                prompt.push_str(&format!("  {}\n", file));
            }
        }
        prompt.push('\n');
        prompt.push_str(input);
        prompt
    }
}

#[async_trait]
impl Worker for CommandWorker {
    async fn execute(&self, input: &str, context: &TaskContext) -> Result<WorkerOutput> {
        let prompt = Self::render_prompt(input, context);
        debug!(program = %self.program, task = %context.task_name, "spawning worker command");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn worker command {}", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .context("Failed to write prompt to worker stdin")?;
            drop(stdin);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .with_context(|| {
                format!(
                    "Worker command {} timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                )
            })?
            .context("Failed to collect worker command output")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Worker command {} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }

        Ok(WorkerOutput::Text(
            String::from_utf8_lossy(&output.stdout).into_owned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_command_line_splits_program_and_args() {
        let worker =
            CommandWorker::from_command_line("mygen --model fast", Duration::from_secs(5)).unwrap();
        assert_eq!(worker.program, "mygen");
        assert_eq!(worker.args, vec!["--model", "fast"]);
        assert!(CommandWorker::from_command_line("   ", Duration::from_secs(5)).is_none());
    }

    #[test]
    fn prompt_includes_context() {
        let context = TaskContext {
            project_name: "shop".into(),
            task_name: "api".into(),
            existing_files: vec!["src/db.js".into()],
            ..Default::default()
        };
        let prompt = CommandWorker::render_prompt("Build the API", &context);
        assert!(prompt.contains("Project: shop"));
        assert!(prompt.contains("src/db.js"));
        assert!(prompt.ends_with("Build the API"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn executes_cat_as_echo_worker() {
        let worker = CommandWorker::new("cat", vec![], Duration::from_secs(10));
        let context = TaskContext {
            task_name: "t".into(),
            ..Default::default()
        };
        let out = worker.execute("hello worker", &context).await.unwrap();
        match out {
            WorkerOutput::Text(text) => assert!(text.contains("hello worker")),
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let worker = CommandWorker::new("false", vec![], Duration::from_secs(10));
        let err = worker
            .execute("x", &TaskContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited"));
    }
}
