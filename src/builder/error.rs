//! Build failure taxonomy.

use std::path::PathBuf;

use thiserror::Error;

use super::glue::GlueError;
use crate::toolchain::{CoreError, LibraryError, QueryError};

/// Why a build stopped.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A required binary is not on disk. Not retryable.
    #[error("{tool} not found at {}", .path.display())]
    ToolMissing { tool: String, path: PathBuf },

    #[error("toolchain query failed: {0}")]
    QueryFailed(String),

    #[error("installation failed: {0}")]
    InstallFailed(String),

    #[error("core provisioning failed: {0}")]
    CoreProvisioning(String),

    #[error("transpiler exited with status {0}")]
    TranspileFailed(i32),

    #[error(transparent)]
    Glue(#[from] GlueError),

    #[error("compilation failed with status {0}")]
    CompileFailed(i32),

    #[error("upload to {port} failed with status {code}")]
    UploadFailed { port: String, code: i32 },

    #[error("`{command}` timed out")]
    Timeout { command: String },

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Process(#[from] anyhow::Error),
}

impl BuildError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for the command line front end.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::ToolMissing { .. } => 3,
            BuildError::QueryFailed(_) => 4,
            BuildError::InstallFailed(_) => 5,
            BuildError::CoreProvisioning(_) => 6,
            BuildError::TranspileFailed(_) => 7,
            BuildError::Glue(_) => 8,
            BuildError::CompileFailed(_) => 9,
            BuildError::UploadFailed { .. } => 10,
            BuildError::Timeout { .. } => 11,
            BuildError::Io { .. } | BuildError::Process(_) => 1,
        }
    }
}

impl From<LibraryError> for BuildError {
    fn from(err: LibraryError) -> Self {
        match err {
            LibraryError::Query(e) => BuildError::QueryFailed(e.to_string()),
            other => BuildError::InstallFailed(other.to_string()),
        }
    }
}

impl From<CoreError> for BuildError {
    fn from(err: CoreError) -> Self {
        BuildError::CoreProvisioning(err.to_string())
    }
}

impl From<QueryError> for BuildError {
    fn from(err: QueryError) -> Self {
        BuildError::QueryFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            BuildError::ToolMissing {
                tool: "iec2c".into(),
                path: "/opt/iec2c".into(),
            },
            BuildError::QueryFailed("x".into()),
            BuildError::InstallFailed("x".into()),
            BuildError::CoreProvisioning("x".into()),
            BuildError::TranspileFailed(1),
            BuildError::Glue(GlueError::Malformed { line: "x".into() }),
            BuildError::CompileFailed(1),
            BuildError::UploadFailed {
                port: "/dev/ttyUSB0".into(),
                code: 1,
            },
            BuildError::Timeout {
                command: "compile".into(),
            },
        ];
        let codes: BTreeSet<i32> = errors.iter().map(BuildError::exit_code).collect();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn test_library_error_conversion() {
        let missing: BTreeSet<String> = ["CAN".to_string()].into_iter().collect();
        let err = BuildError::from(LibraryError::StillMissing(missing));
        assert!(matches!(err, BuildError::InstallFailed(ref msg) if msg.contains("CAN")));

        let err = BuildError::from(LibraryError::Query(QueryError::Tool("offline".into())));
        assert!(matches!(err, BuildError::QueryFailed(_)));
    }

    #[test]
    fn test_tool_missing_message() {
        let err = BuildError::ToolMissing {
            tool: "arduino-cli".into(),
            path: "/opt/arduino/bin/arduino-cli-l64".into(),
        };
        assert_eq!(
            err.to_string(),
            "arduino-cli not found at /opt/arduino/bin/arduino-cli-l64"
        );
    }
}
