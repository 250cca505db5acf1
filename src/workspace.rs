//! Per-project workspace directory.
//!
//! Each project gets `workspace/<name>/` with `src/`, `tests/` and `docs/`
//! scaffolded up front. Worker output lands here through one write path,
//! whether it came back as structured file descriptors or as free-form text
//! with `FILE:` blocks.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::workers::{GeneratedFile, WorkerOutput};

/// `FILE: path` followed by a fenced code block.
fn file_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"FILE\s*:\s*([\w\-./]+)\s*\n```\w*\n((?s).*?)```").expect("valid regex")
    })
}

/// Handle on one project's directory tree.
#[derive(Debug, Clone)]
pub struct ProjectWorkspace {
    root: PathBuf,
}

impl ProjectWorkspace {
    pub fn new(workspace_root: &Path, project_name: &str) -> Self {
        Self {
            root: workspace_root.join(project_name),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory skeleton and a README for the project.
    pub fn scaffold(&self, name: &str, description: &str) -> Result<()> {
        for dir in ["src", "tests", "docs"] {
            std::fs::create_dir_all(self.root.join(dir))
                .with_context(|| format!("Failed to create {}/{}", self.root.display(), dir))?;
        }
        let readme = format!("# {}\n\n{}\n", name, description);
        std::fs::write(self.root.join("README.md"), readme)
            .with_context(|| format!("Failed to write README in {}", self.root.display()))?;
        debug!(root = %self.root.display(), "scaffolded project workspace");
        Ok(())
    }

    /// Write one file under the project root, creating parent directories.
    /// Paths escaping the root are rejected.
    pub fn write_file(&self, rel_path: &str, content: &str) -> Result<()> {
        let rel = sanitize_rel_path(rel_path)
            .with_context(|| format!("Unsafe file path from worker: {}", rel_path))?;
        let full = self.root.join(rel);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&full, content)
            .with_context(|| format!("Failed to write {}", full.display()))?;
        Ok(())
    }

    /// Turn worker output into concrete files and write them, returning the
    /// relative paths written. Free-form text without `FILE:` blocks is
    /// persisted whole under `docs/`.
    pub fn persist_output(&self, output: &WorkerOutput, task_name: &str) -> Result<Vec<String>> {
        let files = match output {
            WorkerOutput::Files(files) => files.clone(),
            WorkerOutput::Text(text) => {
                let parsed = parse_file_blocks(text);
                if parsed.is_empty() {
                    if text.trim().is_empty() {
                        return Ok(Vec::new());
                    }
                    vec![GeneratedFile {
                        path: format!("docs/{}.md", task_name.replace([' ', '/'], "-")),
                        content: text.clone(),
                    }]
                } else {
                    parsed
                }
            }
        };

        let mut written = Vec::new();
        for file in files {
            match self.write_file(&file.path, &file.content) {
                Ok(()) => written.push(file.path),
                Err(err) => warn!(path = %file.path, error = %err, "skipping unwritable file"),
            }
        }
        Ok(written)
    }

    /// All files under the project root, as sorted relative paths.
    pub fn list_files(&self) -> Vec<String> {
        let mut files: Vec<String> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                e.path()
                    .strip_prefix(&self.root)
                    .ok()
                    .map(|p| p.to_string_lossy().into_owned())
            })
            .collect();
        files.sort();
        files
    }
}

/// Extract `FILE: path` + fenced-block pairs from worker text.
pub fn parse_file_blocks(text: &str) -> Vec<GeneratedFile> {
    file_block_regex()
        .captures_iter(text)
        .map(|caps| GeneratedFile {
            path: caps[1].trim().to_string(),
            content: caps[2].to_string(),
        })
        .collect()
}

/// A relative path with no traversal components.
fn sanitize_rel_path(path: &str) -> Option<PathBuf> {
    let candidate = Path::new(path);
    if candidate.components().next().is_none() {
        return None;
    }
    for component in candidate.components() {
        match component {
            Component::Normal(_) => {}
            _ => return None,
        }
    }
    Some(candidate.to_path_buf())
}
