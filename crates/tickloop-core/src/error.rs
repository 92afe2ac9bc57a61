//! Error taxonomy for the TickLoop core.

use crate::config::ConfigError;

/// TickLoop core errors.
#[derive(Debug, thiserror::Error)]
pub enum TickloopError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("git error: {0}")]
    GitError(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("stage {stage} timed out after {seconds} seconds")]
    Timeout { stage: String, seconds: u64 },

    #[error("patch error: {0}")]
    Patch(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for TickLoop core operations.
pub type Result<T> = std::result::Result<T, TickloopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_error_display() {
        let err = TickloopError::GitError("git status failed".to_string());
        assert!(err.to_string().contains("git error"));
        assert!(err.to_string().contains("git status failed"));
    }

    #[test]
    fn test_timeout_error_names_stage() {
        let err = TickloopError::Timeout {
            stage: "collector".to_string(),
            seconds: 30,
        };
        let msg = err.to_string();
        assert!(msg.contains("collector"));
        assert!(msg.contains("30"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing artifact");
        let err: TickloopError = io.into();
        assert!(err.to_string().contains("missing artifact"));
    }
}
