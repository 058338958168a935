//! Error types for rtctl

use rtperiodic::RTError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Real-time error: {0}")]
    Realtime(#[from] RTError),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Thread exited with code {0}")]
    ThreadFailed(i32),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Realtime(RTError::InvalidPriority { .. } | RTError::InvalidConfig(_))
            | CliError::InvalidConfiguration(_)
            | CliError::JsonError(_) => 4,
            CliError::PermissionDenied(_) => 6,
            CliError::Realtime(_) | CliError::ThreadFailed(_) => 2,
            CliError::IoError(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::from(RTError::NotPeriodic).exit_code(), 2);
        assert_eq!(
            CliError::from(RTError::InvalidPriority {
                requested: 200,
                min: 1,
                max: 99
            })
            .exit_code(),
            4
        );
        assert_eq!(CliError::PermissionDenied("pid 1".into()).exit_code(), 6);
    }
}
