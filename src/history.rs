//! Plain-text record of past pipeline runs.
//!
//! One tab-separated line per run under the workspace root, append-only:
//! `id  timestamp  ok|failed  url  prompt`. Unparseable lines are skipped on
//! read so a corrupt entry never breaks listing.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const HISTORY_FILE: &str = "history.txt";

/// One past run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub project_id: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// Deployment URL, empty when the run produced no running service.
    pub url: String,
    pub prompt: String,
}

impl HistoryEntry {
    pub fn new(project_id: &str, success: bool, url: &str, prompt: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            timestamp: Utc::now(),
            success,
            url: url.to_string(),
            prompt: prompt.to_string(),
        }
    }

    fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.project_id,
            self.timestamp.to_rfc3339(),
            if self.success { "ok" } else { "failed" },
            flatten(&self.url),
            flatten(&self.prompt),
        )
    }

    fn from_line(line: &str) -> Option<Self> {
        let mut parts = line.splitn(5, '\t');
        let project_id = parts.next()?.to_string();
        let timestamp = DateTime::parse_from_rfc3339(parts.next()?)
            .ok()?
            .with_timezone(&Utc);
        let success = match parts.next()? {
            "ok" => true,
            "failed" => false,
            _ => return None,
        };
        let url = parts.next()?.to_string();
        let prompt = parts.next()?.to_string();
        Some(Self {
            project_id,
            timestamp,
            success,
            url,
            prompt,
        })
    }
}

/// Tabs and newlines would corrupt the line format.
fn flatten(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}

/// The history file under one workspace root.
#[derive(Debug, Clone)]
pub struct RunHistory {
    path: PathBuf,
}

impl RunHistory {
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            path: workspace_root.join(HISTORY_FILE),
        }
    }

    pub fn append(&self, entry: &HistoryEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut contents = match std::fs::read_to_string(&self.path) {
            Ok(existing) => existing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        contents.push_str(&entry.to_line());
        contents.push('\n');
        std::fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    /// All entries in file order (oldest first). A missing file is empty
    /// history.
    pub fn entries(&self) -> Result<Vec<HistoryEntry>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        Ok(contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(HistoryEntry::from_line)
            .collect())
    }

    /// Remove all recorded runs.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove {}", self.path.display())),
        }
    }
}
