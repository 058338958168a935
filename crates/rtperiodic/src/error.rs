//! Error types for the real-time thread engine.

use thiserror::Error;

use crate::registry::ThreadId;

/// Errors reported by the real-time thread engine.
///
/// Every variant is reported synchronously to the caller of the failing
/// operation. Variants carrying an OS error number keep the raw `errno`
/// (or `kern_return_t` on Mach hosts) so the boundary layer can hand it
/// back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RTError {
    /// The monotonic or realtime clock could not be queried.
    #[error("Clock unavailable (os error {errno})")]
    ClockUnavailable {
        /// OS error number reported by the clock service
        errno: i32,
    },

    /// Priority outside the range reported by the platform scheduler.
    #[error("Unsupported priority {requested}, minimum: {min}; maximum: {max}")]
    InvalidPriority {
        /// Requested priority
        requested: i32,
        /// Platform minimum
        min: i32,
        /// Platform maximum
        max: i32,
    },

    /// A period-dependent operation was called on a non-periodic thread.
    #[error("Thread is not periodic")]
    NotPeriodic,

    /// Applying the native scheduling attributes failed.
    #[error("Failed to apply real-time scheduling policy (os error {os_error})")]
    SchedulingPolicy {
        /// OS error carried from the failing call
        os_error: i32,
    },

    /// The native thread could not be created.
    #[error("Cannot start realtime thread (os error {errno})")]
    SpawnFailure {
        /// OS error number from thread creation
        errno: i32,
    },

    /// The callback reference could not be resolved at creation.
    #[error("Callback reference {0} cannot be resolved")]
    InvalidCallback(u64),

    /// Lifecycle operation called in the wrong state.
    #[error("Cannot {operation} a thread in state {state}")]
    InvalidState {
        /// Attempted operation
        operation: &'static str,
        /// State the thread was in
        state: &'static str,
    },

    /// Handle id is unknown or was already destroyed.
    #[error("Invalid thread handle {0}")]
    InvalidHandle(ThreadId),

    /// The sleep primitive failed with something other than an interruption.
    #[error("Absolute wait failed (os error {errno})")]
    WaitFailed {
        /// OS error number from the sleep call
        errno: i32,
    },

    /// Invalid configuration parameter.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Feature not available on this host.
    #[error("Not supported on this platform: {0}")]
    Unsupported(&'static str),

    /// A periodic task panicked and its runner stopped.
    #[error("Periodic task panicked")]
    TaskPanicked,
}

impl RTError {
    /// Numeric error code, stable across releases.
    pub fn code(&self) -> u8 {
        match self {
            RTError::ClockUnavailable { .. } => 1,
            RTError::InvalidPriority { .. } => 2,
            RTError::NotPeriodic => 3,
            RTError::SchedulingPolicy { .. } => 4,
            RTError::SpawnFailure { .. } => 5,
            RTError::InvalidCallback(_) => 6,
            RTError::InvalidState { .. } => 7,
            RTError::InvalidHandle(_) => 8,
            RTError::WaitFailed { .. } => 9,
            RTError::InvalidConfig(_) => 10,
            RTError::Unsupported(_) => 11,
            RTError::TaskPanicked => 12,
        }
    }

    /// OS error number carried by this error, if any.
    pub fn os_error(&self) -> Option<i32> {
        match self {
            RTError::ClockUnavailable { errno }
            | RTError::SpawnFailure { errno }
            | RTError::WaitFailed { errno } => Some(*errno),
            RTError::SchedulingPolicy { os_error } => Some(*os_error),
            _ => None,
        }
    }

    /// Status code handed across the binding boundary.
    ///
    /// Errors carrying an OS error map to that (positive) error number,
    /// everything else to the negated [`code`](Self::code).
    pub fn status_code(&self) -> i32 {
        match self.os_error() {
            Some(errno) if errno != 0 => errno,
            _ => -i32::from(self.code()),
        }
    }

    /// Check if the caller can retry or continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RTError::NotPeriodic
                | RTError::InvalidPriority { .. }
                | RTError::InvalidConfig(_)
                | RTError::InvalidState { .. }
        )
    }

    /// Capture the current `errno` as a clock failure.
    pub(crate) fn clock_from_last_os_error() -> Self {
        RTError::ClockUnavailable {
            errno: last_errno(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        RTError::InvalidConfig(message.into())
    }
}

/// Last OS error number for the calling thread.
pub(crate) fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Result alias used throughout the engine.
pub type RTResult<T = ()> = Result<T, RTError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let errors = [
            RTError::ClockUnavailable { errno: 1 },
            RTError::InvalidPriority {
                requested: 0,
                min: 1,
                max: 99,
            },
            RTError::NotPeriodic,
            RTError::SchedulingPolicy { os_error: 22 },
            RTError::SpawnFailure { errno: 11 },
            RTError::InvalidCallback(3),
            RTError::InvalidState {
                operation: "start",
                state: "running",
            },
            RTError::InvalidHandle(ThreadId::from_raw(7)),
            RTError::WaitFailed { errno: 22 },
            RTError::invalid_config("period"),
            RTError::Unsupported("affinity"),
            RTError::TaskPanicked,
        ];

        let mut codes: Vec<u8> = errors.iter().map(RTError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_status_code_prefers_os_error() {
        assert_eq!(RTError::SpawnFailure { errno: 11 }.status_code(), 11);
        assert_eq!(RTError::SchedulingPolicy { os_error: 1 }.status_code(), 1);
        assert_eq!(RTError::NotPeriodic.status_code(), -3);
        assert_eq!(RTError::SpawnFailure { errno: 0 }.status_code(), -5);
    }

    #[test]
    fn test_display_messages() {
        let err = RTError::InvalidPriority {
            requested: 120,
            min: 1,
            max: 99,
        };
        assert_eq!(
            err.to_string(),
            "Unsupported priority 120, minimum: 1; maximum: 99"
        );
        assert_eq!(RTError::NotPeriodic.to_string(), "Thread is not periodic");
    }

    #[test]
    fn test_recoverable() {
        assert!(RTError::NotPeriodic.is_recoverable());
        assert!(!RTError::ClockUnavailable { errno: 22 }.is_recoverable());
        assert!(!RTError::SpawnFailure { errno: 11 }.is_recoverable());
    }
}
