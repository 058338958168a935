//! Process scheduler passthrough and current-thread introspection.
//!
//! The raw functions mirror the OS calls directly and report failures as a
//! negated `errno`; they never fail in any other way. The typed wrappers
//! convert those codes into [`std::io::Error`].

use core::fmt;
use core::str::FromStr;
use std::io;

use serde::{Deserialize, Serialize};

use crate::error::{RTError, RTResult};
use crate::platform;

/// Scheduling class, numbered in the Linux order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(i32)]
pub enum SchedulerAlgorithm {
    /// Default time-sharing class.
    Other = 0,
    /// Fixed-priority first-in first-out.
    Fifo = 1,
    /// Fixed-priority round-robin.
    RoundRobin = 2,
    /// Batch, CPU-bound time-sharing.
    Batch = 3,
    /// Isochronous; reserved on mainline kernels.
    Iso = 4,
    /// Very low priority background work.
    Idle = 5,
    /// Earliest-deadline-first.
    Deadline = 6,
}

impl SchedulerAlgorithm {
    /// Every class, in ordinal order.
    pub const ALL: [SchedulerAlgorithm; 7] = [
        SchedulerAlgorithm::Other,
        SchedulerAlgorithm::Fifo,
        SchedulerAlgorithm::RoundRobin,
        SchedulerAlgorithm::Batch,
        SchedulerAlgorithm::Iso,
        SchedulerAlgorithm::Idle,
        SchedulerAlgorithm::Deadline,
    ];

    /// Stable ordinal.
    pub fn ordinal(self) -> i32 {
        self as i32
    }

    /// Class for an ordinal.
    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.ordinal() == ordinal)
    }

    /// Native class constant, if the host has this class.
    pub fn to_native(self) -> Option<i32> {
        #[cfg(target_os = "linux")]
        {
            Some(self.ordinal())
        }
        #[cfg(target_vendor = "apple")]
        {
            match self {
                SchedulerAlgorithm::Other => Some(libc::SCHED_OTHER),
                SchedulerAlgorithm::Fifo => Some(libc::SCHED_FIFO),
                SchedulerAlgorithm::RoundRobin => Some(libc::SCHED_RR),
                _ => None,
            }
        }
        #[cfg(not(any(target_os = "linux", target_vendor = "apple")))]
        {
            (self == SchedulerAlgorithm::Other).then_some(0)
        }
    }

    /// Class for a native constant.
    pub fn from_native(raw: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.to_native() == Some(raw))
    }

    /// Short lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerAlgorithm::Other => "other",
            SchedulerAlgorithm::Fifo => "fifo",
            SchedulerAlgorithm::RoundRobin => "round-robin",
            SchedulerAlgorithm::Batch => "batch",
            SchedulerAlgorithm::Iso => "iso",
            SchedulerAlgorithm::Idle => "idle",
            SchedulerAlgorithm::Deadline => "deadline",
        }
    }

    /// Whether the class gives fixed-priority real-time guarantees.
    pub fn is_realtime(self) -> bool {
        matches!(
            self,
            SchedulerAlgorithm::Fifo | SchedulerAlgorithm::RoundRobin | SchedulerAlgorithm::Deadline
        )
    }
}

impl fmt::Display for SchedulerAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulerAlgorithm {
    type Err = RTError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "other" | "normal" => Ok(SchedulerAlgorithm::Other),
            "fifo" => Ok(SchedulerAlgorithm::Fifo),
            "rr" | "round-robin" | "roundrobin" => Ok(SchedulerAlgorithm::RoundRobin),
            "batch" => Ok(SchedulerAlgorithm::Batch),
            "iso" => Ok(SchedulerAlgorithm::Iso),
            "idle" => Ok(SchedulerAlgorithm::Idle),
            "deadline" => Ok(SchedulerAlgorithm::Deadline),
            other => Err(RTError::invalid_config(format!(
                "unknown scheduler algorithm '{other}'"
            ))),
        }
    }
}

/// Set the scheduling class and priority of process `pid` (0 = caller).
/// Returns 0 or a negated `errno`.
pub fn set_scheduler(pid: i32, class: i32, priority: i32) -> i32 {
    platform::set_process_scheduler(pid, class, priority)
}

/// Scheduling class of process `pid`, or a negated `errno`.
pub fn get_scheduler(pid: i32) -> i32 {
    platform::get_process_scheduler(pid)
}

/// Scheduling priority of process `pid`, or a negated `errno`.
pub fn get_priority(pid: i32) -> i32 {
    platform::get_process_priority(pid)
}

fn check_code(rc: i32) -> io::Result<i32> {
    if rc < 0 {
        Err(io::Error::from_raw_os_error(rc.saturating_neg()))
    } else {
        Ok(rc)
    }
}

/// Typed [`set_scheduler`].
///
/// # Errors
///
/// Returns [`io::ErrorKind::Unsupported`] when the host lacks `algorithm`,
/// or the OS error from the call.
pub fn set_process_scheduler(pid: i32, algorithm: SchedulerAlgorithm, priority: i32) -> io::Result<()> {
    let class = algorithm
        .to_native()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, algorithm.as_str()))?;
    check_code(set_scheduler(pid, class, priority)).map(|_| ())
}

/// Typed [`get_scheduler`].
///
/// # Errors
///
/// Returns the OS error, or [`io::ErrorKind::InvalidData`] for an unknown class.
pub fn process_scheduler(pid: i32) -> io::Result<SchedulerAlgorithm> {
    let raw = check_code(get_scheduler(pid))?;
    SchedulerAlgorithm::from_native(raw).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown scheduling class {raw}"),
        )
    })
}

/// Typed [`get_priority`].
///
/// # Errors
///
/// Returns the OS error from the call.
pub fn process_priority(pid: i32) -> io::Result<i32> {
    check_code(get_priority(pid))
}

/// Priority of the calling thread.
///
/// # Errors
///
/// Returns [`RTError::SchedulingPolicy`] if the query fails.
pub fn current_thread_priority() -> RTResult<i32> {
    Ok(platform::current_thread_scheduling()?.1)
}

/// Scheduling class of the calling thread.
///
/// # Errors
///
/// Returns [`RTError::SchedulingPolicy`] if the query fails or the class is
/// not one of [`SchedulerAlgorithm`].
pub fn current_thread_scheduler() -> RTResult<SchedulerAlgorithm> {
    let (raw, _) = platform::current_thread_scheduling()?;
    SchedulerAlgorithm::from_native(raw).ok_or(RTError::SchedulingPolicy { os_error: raw })
}

/// Lock current and future pages of the process into RAM.
///
/// # Errors
///
/// Returns the OS error, or [`io::ErrorKind::Unsupported`] on hosts
/// without memory locking.
pub fn lock_memory() -> io::Result<()> {
    platform::lock_memory()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_are_stable() {
        for (index, alg) in SchedulerAlgorithm::ALL.into_iter().enumerate() {
            assert_eq!(usize::try_from(alg.ordinal()).ok(), Some(index));
            assert_eq!(SchedulerAlgorithm::from_ordinal(alg.ordinal()), Some(alg));
        }
        assert_eq!(SchedulerAlgorithm::from_ordinal(7), None);
    }

    #[test]
    fn test_parse_names() -> RTResult {
        assert_eq!("FIFO".parse::<SchedulerAlgorithm>()?, SchedulerAlgorithm::Fifo);
        assert_eq!("rr".parse::<SchedulerAlgorithm>()?, SchedulerAlgorithm::RoundRobin);
        for alg in SchedulerAlgorithm::ALL {
            assert_eq!(alg.as_str().parse::<SchedulerAlgorithm>()?, alg);
        }
        assert!("realtime".parse::<SchedulerAlgorithm>().is_err());
        Ok(())
    }

    #[test]
    fn test_serde_names() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&SchedulerAlgorithm::RoundRobin)?, "\"round-robin\"");
        let alg: SchedulerAlgorithm = serde_json::from_str("\"deadline\"")?;
        assert_eq!(alg, SchedulerAlgorithm::Deadline);
        Ok(())
    }

    #[test]
    fn test_current_thread_defaults_to_time_sharing() -> RTResult {
        let alg = std::thread::spawn(current_thread_scheduler)
            .join()
            .unwrap_or(Err(RTError::SpawnFailure { errno: 0 }))?;
        assert_eq!(alg, SchedulerAlgorithm::Other);
        Ok(())
    }

    #[test]
    fn test_negated_errno_maps_to_io_error() {
        let err = check_code(-22).err().map(|e| e.raw_os_error());
        assert_eq!(err, Some(Some(22)));
        assert_eq!(check_code(3).ok(), Some(3));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_invalid_pid_is_reported() {
        assert_eq!(get_scheduler(-1), -libc::EINVAL);
        assert!(process_scheduler(-1).is_err());
    }
}
