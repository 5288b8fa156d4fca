use std::path::PathBuf;

use thiserror::Error;

/// Failure modes surfaced by the update, download and install pipeline.
#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("malformed version string {text:?}: {reason}")]
    Parse { text: String, reason: &'static str },

    #[error("network error during {operation}: {details}")]
    Network {
        operation: &'static str,
        details: String,
    },

    #[error("no release asset matches pattern {pattern:?} for {repo}")]
    AssetNotFound { repo: String, pattern: String },

    #[error("cannot replace {}: a file is in use (is the game still running?)", path.display())]
    FileLocked { path: PathBuf },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract archive: {0}")]
    ArchiveCorrupt(#[from] zip::result::ZipError),

    #[error("title has no remote source to check")]
    SourceUnavailable,

    #[error("failed to start {}: {details}", exe.display())]
    Launch { exe: PathBuf, details: String },
}

impl LauncherError {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub fn network(operation: &'static str, details: impl Into<String>) -> Self {
        Self::Network {
            operation,
            details: details.into(),
        }
    }

    pub fn network_from<E: std::fmt::Display>(operation: &'static str, error: E) -> Self {
        Self::network(operation, error.to_string())
    }

    /// Short "kind - message" line for status displays.
    pub fn diagnostic(&self) -> String {
        let kind = match self {
            Self::Parse { .. } => "ParseError",
            Self::Network { .. } => "NetworkError",
            Self::AssetNotFound { .. } => "AssetNotFound",
            Self::FileLocked { .. } => "FileLocked",
            Self::Io { .. } => "IoError",
            Self::ArchiveCorrupt(_) => "ArchiveCorrupt",
            Self::SourceUnavailable => "SourceUnavailable",
            Self::Launch { .. } => "LaunchError",
        };
        format!("{kind} - {self}")
    }

    /// Whether the pipeline was interrupted mid-transfer or mid-install in a
    /// way worth retrying with the same inputs.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::FileLocked { .. } | Self::Io { .. }
        )
    }
}
