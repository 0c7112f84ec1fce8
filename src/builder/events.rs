//! Build event types for JSON output.
//!
//! The pipeline reports progress through [`BuildObserver`]. With
//! `--message-format=json` the command line front end prints each event as
//! one JSON object per line.
//!
//! # Event Types
//!
//! - `phase-started`: A phase is about to run
//! - `phase-finished`: A phase completed successfully
//! - `build-finished`: Build completed (success or failure)
//!
//! # Stability
//!
//! New fields may be added, but existing fields should not be removed or renamed.

use std::path::PathBuf;

use serde::Serialize;

/// A build event emitted during the build process.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason")]
pub enum BuildEvent {
    /// A phase is about to run.
    #[serde(rename = "phase-started")]
    PhaseStarted {
        /// 1-based position in the pipeline
        index: usize,
        /// Number of phases in the pipeline
        total: usize,
        /// Phase name
        phase: String,
    },

    /// A phase completed successfully.
    #[serde(rename = "phase-finished")]
    PhaseFinished {
        phase: String,
        duration_ms: u64,
    },

    /// Build completed (success or failure).
    #[serde(rename = "build-finished")]
    BuildFinished {
        /// Whether the build succeeded
        success: bool,
        /// Total build duration in milliseconds
        duration_ms: u64,
        /// Phase that failed
        #[serde(skip_serializing_if = "Option::is_none")]
        failed_phase: Option<String>,
        /// Failure message
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Directory holding exported binaries
        #[serde(skip_serializing_if = "Option::is_none")]
        output_dir: Option<PathBuf>,
        /// Port the program was uploaded to
        #[serde(skip_serializing_if = "Option::is_none")]
        port: Option<String>,
    },
}

impl BuildEvent {
    /// Create a phase started event.
    pub fn started(index: usize, total: usize, phase: impl Into<String>) -> Self {
        BuildEvent::PhaseStarted {
            index,
            total,
            phase: phase.into(),
        }
    }

    /// Create a phase finished event.
    pub fn phase_finished(phase: impl Into<String>, duration_ms: u64) -> Self {
        BuildEvent::PhaseFinished {
            phase: phase.into(),
            duration_ms,
        }
    }

    /// Create a successful build finished event.
    pub fn succeeded(duration_ms: u64, output_dir: Option<PathBuf>, port: Option<String>) -> Self {
        BuildEvent::BuildFinished {
            success: true,
            duration_ms,
            failed_phase: None,
            error: None,
            output_dir,
            port,
        }
    }

    /// Create a failed build finished event.
    pub fn failed(duration_ms: u64, phase: impl Into<String>, error: impl Into<String>) -> Self {
        BuildEvent::BuildFinished {
            success: false,
            duration_ms,
            failed_phase: Some(phase.into()),
            error: Some(error.into()),
            output_dir: None,
            port: None,
        }
    }

    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Receives pipeline events.
pub trait BuildObserver {
    fn on_event(&self, event: &BuildEvent);
}

impl<F> BuildObserver for F
where
    F: Fn(&BuildEvent),
{
    fn on_event(&self, event: &BuildEvent) {
        self(event)
    }
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoObserver;

impl BuildObserver for NoObserver {
    fn on_event(&self, _event: &BuildEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_started_serialization() {
        let json = BuildEvent::started(3, 14, "provision-core").to_json();
        assert!(json.contains("\"reason\":\"phase-started\""));
        assert!(json.contains("\"index\":3"));
        assert!(json.contains("\"total\":14"));
        assert!(json.contains("\"phase\":\"provision-core\""));
    }

    #[test]
    fn test_succeeded_serialization() {
        let event = BuildEvent::succeeded(2340, Some(PathBuf::from("/opt/build")), None);
        let json = event.to_json();
        assert!(json.contains("\"reason\":\"build-finished\""));
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"duration_ms\":2340"));
        assert!(json.contains("/opt/build"));
        assert!(!json.contains("\"port\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_failed_serialization() {
        let json = BuildEvent::failed(10, "compile", "compilation failed with status 1").to_json();
        assert!(json.contains("\"success\":false"));
        assert!(json.contains("\"failed_phase\":\"compile\""));
        assert!(json.contains("compilation failed"));
    }
}
