//! Plain-text line logs
//!
//! Each tool, agent and metrics collector keeps its own human-readable log.
//! The file is opened, appended and closed for every line, so several
//! writers (and several processes) can share a file without coordination.

use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only text log at a fixed path
#[derive(Debug, Clone)]
pub struct LineLog {
    path: PathBuf,
}

impl LineLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log named `file_name` inside `dir`
    pub fn in_dir(dir: &Path, file_name: &str) -> Self {
        Self::new(dir.join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `[YYYY-mm-dd HH:MM:SS] message`.
    ///
    /// Never fails: write errors are reported to tracing and dropped.
    pub fn write(&self, message: &str) {
        let line = format!("[{}] {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
        if let Err(e) = self.append(&line) {
            tracing::debug!(path = %self.path.display(), error = %e, "line log write failed");
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lines_are_appended_with_timestamp() {
        let dir = TempDir::new().unwrap();
        let log = LineLog::in_dir(&dir.path().join("nested"), "tool.log");

        log.write("first");
        log.write("second");

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] first"));
        assert!(lines[1].ends_with("] second"));
    }

    #[test]
    fn test_unwritable_path_is_silent() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        // Parent is a regular file, so create_dir_all fails
        let log = LineLog::new(blocker.join("tool.log"));
        log.write("dropped");
        assert!(!log.path().exists());
    }
}
