//! Error taxonomy for valrun.
//!
//! Each orchestration stage owns one error enum; [`ValrunError`] wraps them
//! for callers that drive the whole pipeline.

use std::path::PathBuf;

/// Errors produced while validating a configuration directory.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("no mesh directories found in {directory}")]
    NoMeshDirectories { directory: PathBuf },

    #[error("{directory}: expected exactly one {expected_kind} file, found {found_count}")]
    StructuralMismatch {
        directory: PathBuf,
        expected_kind: String,
        found_count: usize,
    },

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error view of a mesh run that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    #[error("solver in {mesh} timed out after {timeout_secs}s")]
    TimedOut { mesh: String, timeout_secs: u64 },

    #[error("solver in {mesh} failed (exit code {exit_code:?}): {detail}")]
    ProcessFailed {
        mesh: String,
        exit_code: Option<i32>,
        detail: String,
    },

    #[error("solver in {mesh} exited cleanly but produced no output artifacts")]
    MissingArtifacts { mesh: String },
}

/// Error view of a plotting step that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlotError {
    #[error("plotting not invoked: {reason}")]
    NotInvoked { reason: String },

    #[error("plotting failed (exit code {exit_code:?})")]
    ProcessFailed { exit_code: Option<i32> },

    #[error("plotting timed out after {timeout_secs}s")]
    TimedOut { timeout_secs: u64 },

    #[error("plotting exited cleanly but produced no image artifacts")]
    NoArtifacts,
}

/// Errors produced while collecting results into the output tree.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("filesystem failure at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CollectionError {
    pub(crate) fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CollectionError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Errors resolving the validation case tree before any run starts.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("model directory not found: {0}")]
    ModelDirectoryMissing(PathBuf),

    #[error("configuration directory not found: {0}")]
    ConfigurationMissing(PathBuf),

    #[error("no configuration directories found in {0}")]
    NoConfigurations(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors loading or checking [`crate::config::ValrunSettings`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Umbrella error for valrun operations.
#[derive(Debug, thiserror::Error)]
pub enum ValrunError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("collection error: {0}")]
    Collection(#[from] CollectionError),

    #[error("setup error: {0}")]
    Setup(#[from] SetupError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for valrun operations.
pub type Result<T> = std::result::Result<T, ValrunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_mismatch_names_directory_and_kind() {
        let err = ValidationError::StructuralMismatch {
            directory: PathBuf::from("cases/047"),
            expected_kind: "mesh".to_string(),
            found_count: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("cases/047"));
        assert!(msg.contains("mesh"));
        assert!(msg.contains("found 2"));
    }

    #[test]
    fn test_run_error_display() {
        let err = RunError::TimedOut {
            mesh: "093".to_string(),
            timeout_secs: 60,
        };
        assert!(err.to_string().contains("timed out after 60s"));

        let err = RunError::ProcessFailed {
            mesh: "093".to_string(),
            exit_code: Some(3),
            detail: "diverged".to_string(),
        };
        assert!(err.to_string().contains("Some(3)"));
        assert!(err.to_string().contains("diverged"));
    }

    #[test]
    fn test_umbrella_conversion() {
        let err: ValrunError = ValidationError::NoMeshDirectories {
            directory: PathBuf::from("x"),
        }
        .into();
        assert!(err.to_string().starts_with("validation error"));
    }
}
