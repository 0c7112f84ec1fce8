//! Append-only build log.
//!
//! Every message written through [`BuildLog`] is split into lines, each line
//! is appended to `build.log` with a millisecond timestamp, and the original
//! text is forwarded to an [`OutputSink`] so front ends can show progress
//! while a build runs.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use crate::util::process::LineSink;

/// Receives user-facing build output.
pub trait OutputSink {
    /// Handle one message. Messages are single lines without a newline.
    fn emit(&self, text: &str);
}

impl<F> OutputSink for F
where
    F: Fn(&str),
{
    fn emit(&self, text: &str) {
        self(text)
    }
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn emit(&self, _text: &str) {}
}

/// Timestamped build log that mirrors its output to a sink.
pub struct BuildLog<'a> {
    path: PathBuf,
    sink: &'a dyn OutputSink,
}

impl<'a> BuildLog<'a> {
    /// Create a log writing to `path`. Nothing is touched on disk until the
    /// first write or [`BuildLog::truncate`].
    pub fn new(path: impl Into<PathBuf>, sink: &'a dyn OutputSink) -> Self {
        BuildLog {
            path: path.into(),
            sink,
        }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Empty the log file, creating it if needed.
    pub fn truncate(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
        fs::write(&self.path, "")
            .with_context(|| format!("failed to truncate build log: {}", self.path.display()))
    }

    /// Write a message. Multi-line messages produce one log entry per line.
    pub fn message(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if let Err(e) = self.append(text) {
            tracing::warn!("failed to write build log {}: {:#}", self.path.display(), e);
        }
        for line in text.lines() {
            self.sink.emit(line);
        }
        if text.is_empty() {
            self.sink.emit("");
        }
    }

    fn append(&self, text: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let lines: Vec<&str> = if text.is_empty() {
            vec![""]
        } else {
            text.lines().collect()
        };
        for line in lines {
            let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f");
            writeln!(file, "[{}] {}", timestamp, line)?;
        }
        Ok(())
    }
}

impl LineSink for BuildLog<'_> {
    fn line(&self, line: &str) {
        self.message(line);
    }
}
