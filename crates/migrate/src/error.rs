use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid layout version `{value}`")]
    InvalidVersion { value: String },
    #[error("failed to execute `{operation}`: {source}")]
    CommandExecution {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("`{operation}` failed: {stderr}")]
    CommandFailed {
        operation: &'static str,
        stderr: String,
    },
    #[error("{path} is not a git repository")]
    NotGitRepository { path: PathBuf },
    #[error("{path} is a linked worktree; run the upgrade from the primary tree")]
    NotPrimaryTree { path: PathBuf },
    #[error("{path} does not look like a ratchet project (no metadata, no known layout)")]
    UnrecognizedProject { path: PathBuf },
    #[error("bundled resources unavailable: {detail}")]
    BundleUnavailable { detail: String },
    #[error("migration `{id}` failed on {path}: {detail}")]
    UnitFailed {
        id: &'static str,
        path: PathBuf,
        detail: String,
    },
    #[error("migration `{id}` already recorded as successful")]
    DuplicateRecord { id: String },
}

impl Error {
    #[must_use]
    pub fn command_execution(operation: &'static str, source: std::io::Error) -> Self {
        Self::CommandExecution { operation, source }
    }

    #[must_use]
    pub fn command_failed(operation: &'static str, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            operation,
            stderr: stderr.into(),
        }
    }

    #[must_use]
    pub fn unit_failed(
        id: &'static str,
        path: impl Into<PathBuf>,
        detail: impl Into<String>,
    ) -> Self {
        Self::UnitFailed {
            id,
            path: path.into(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
