//! CPU affinity.
//!
//! Stateless wrappers over the host's pinning call. Hosts without CPU
//! pinning report [`RTError::Unsupported`].

use std::thread::JoinHandle;

use crate::error::{RTError, RTResult};
use crate::platform;

/// Highest logical CPU index plus one that a CPU set can address.
pub fn max_cpus() -> usize {
    platform::CPU_SET_CAPACITY
}

/// Number of CPUs the process may run on, or 1 if unknown.
pub fn available_cpus() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// Check that `cpus` is a non-empty set of addressable CPU indices.
///
/// # Errors
///
/// Returns [`RTError::Unsupported`] on hosts without CPU pinning and
/// [`RTError::InvalidConfig`] for an empty set or an index out of range.
pub fn validate_cpus(cpus: &[usize]) -> RTResult {
    if platform::CPU_SET_CAPACITY == 0 {
        return Err(RTError::Unsupported("CPU affinity"));
    }
    if cpus.is_empty() {
        return Err(RTError::invalid_config("CPU set must not be empty"));
    }
    match cpus.iter().find(|&&cpu| cpu >= platform::CPU_SET_CAPACITY) {
        Some(cpu) => Err(RTError::invalid_config(format!(
            "CPU index {cpu} exceeds CPU set capacity {}",
            platform::CPU_SET_CAPACITY
        ))),
        None => Ok(()),
    }
}

/// Pin the calling thread to `cpus`.
///
/// # Errors
///
/// See [`validate_cpus`]; OS failures surface as
/// [`RTError::SchedulingPolicy`].
pub fn set_current_thread_affinity(cpus: &[usize]) -> RTResult {
    validate_cpus(cpus)?;
    platform::set_current_thread_affinity(cpus)
}

/// Pin the thread behind `handle` to `cpus`.
///
/// # Errors
///
/// See [`set_current_thread_affinity`].
pub fn set_thread_affinity<T>(handle: &JoinHandle<T>, cpus: &[usize]) -> RTResult {
    validate_cpus(cpus)?;
    platform::set_thread_affinity(handle, cpus)
}
