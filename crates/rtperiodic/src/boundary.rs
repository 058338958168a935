//! Flat entry points for a foreign binding layer.
//!
//! Every function works on integers only: handles are raw [`ThreadId`]s and
//! timestamps are split into `(seconds, nanos)`. Callbacks are named by an
//! opaque reference that a process-wide [`CallbackHost`] resolves into a
//! closure when the thread is created.

use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::affinity;
use crate::clock;
use crate::config::{PeriodicParameters, ThreadConfig};
use crate::error::{RTError, RTResult};
use crate::policy;
use crate::process;
use crate::registry::{ThreadId, ThreadRegistry};
use crate::thread::ThreadCallback;
use crate::timespec::Timestamp;

/// Resolves opaque callback references from the host runtime.
pub trait CallbackHost: Send + Sync {
    /// Turn `callback_ref` into a thread body, or `None` if it is unknown.
    fn resolve(&self, callback_ref: u64) -> Option<ThreadCallback>;
}

#[cfg(unix)]
const EINVAL: i32 = libc::EINVAL;
/// Linux value, for hosts without an errno table.
#[cfg(not(unix))]
const EINVAL: i32 = 22;

static CALLBACK_HOST: OnceLock<Arc<dyn CallbackHost>> = OnceLock::new();
static REGISTRY: OnceLock<ThreadRegistry> = OnceLock::new();

fn registry() -> &'static ThreadRegistry {
    REGISTRY.get_or_init(ThreadRegistry::new)
}

/// Install the process-wide callback host. Only the first call has an
/// effect; returns whether this call installed `host`.
pub fn register_callback_host(host: Arc<dyn CallbackHost>) -> bool {
    let installed = CALLBACK_HOST.set(host).is_ok();
    if installed {
        debug!("callback host registered");
    } else {
        warn!("callback host already registered; ignoring");
    }
    installed
}

fn timestamp(seconds: i64, nanos: i64) -> Timestamp {
    Timestamp::from_signed_parts(seconds, nanos)
}

/// Create a thread and return its raw handle id.
///
/// With `start_on_clock` the first deadline is the given start timestamp;
/// otherwise it is anchored to the clock when the thread first runs.
///
/// # Errors
///
/// Returns [`RTError::InvalidCallback`] if no host is registered or the host
/// cannot resolve `callback_ref`, or any creation error.
#[expect(clippy::too_many_arguments, reason = "flat foreign-call signature")]
pub fn create_thread(
    callback_ref: u64,
    priority: i32,
    periodic: bool,
    start_on_clock: bool,
    start_seconds: i64,
    start_nanos: i64,
    period_seconds: i64,
    period_nanos: i64,
) -> RTResult<u64> {
    let callback = CALLBACK_HOST
        .get()
        .and_then(|host| host.resolve(callback_ref))
        .ok_or(RTError::InvalidCallback(callback_ref))?;

    let mut config = ThreadConfig::new(priority);
    if periodic {
        let mut params = PeriodicParameters::new(timestamp(period_seconds, period_nanos));
        if start_on_clock {
            params = params.with_start(timestamp(start_seconds, start_nanos));
        }
        config.periodic = Some(params);
    }
    Ok(registry().create(config, callback)?.as_raw())
}

/// Start a thread. Returns 0 on success or [`RTError::status_code`].
pub fn start_thread(handle: u64) -> i32 {
    match registry().start(ThreadId::from_raw(handle)) {
        Ok(()) => 0,
        Err(err) => {
            warn!(handle, error = %err, "cannot start realtime thread");
            err.status_code()
        }
    }
}

/// Wait for the next period of `handle`; returns the lateness.
///
/// # Errors
///
/// Returns [`RTError::InvalidHandle`] or [`RTError::NotPeriodic`].
pub fn wait_for_next_period(handle: u64, phase_offset_nanos: i64) -> RTResult<i64> {
    registry().wait_for_next_period(ThreadId::from_raw(handle), phase_offset_nanos)
}

/// Wait until an absolute monotonic time; returns the lateness.
///
/// # Errors
///
/// Returns [`RTError::InvalidHandle`] or a clock/wait failure.
pub fn wait_until(handle: u64, seconds: i64, nanos: i64) -> RTResult<i64> {
    registry().wait_until(ThreadId::from_raw(handle), timestamp(seconds, nanos))
}

/// Re-anchor the next deadline of `handle` to now.
///
/// # Errors
///
/// Returns [`RTError::InvalidHandle`] or [`RTError::NotPeriodic`].
pub fn set_next_period_to_clock(handle: u64) -> RTResult {
    registry().set_next_period_to_clock(ThreadId::from_raw(handle))
}

/// Re-anchor the next deadline of `handle`.
///
/// # Errors
///
/// Returns [`RTError::InvalidHandle`] or [`RTError::NotPeriodic`].
pub fn set_next_period(handle: u64, seconds: i64, nanos: i64) -> RTResult {
    registry().set_next_period(ThreadId::from_raw(handle), timestamp(seconds, nanos))
}

/// Next deadline of `handle` in nanoseconds on the monotonic clock.
///
/// # Errors
///
/// Returns [`RTError::InvalidHandle`] or [`RTError::NotPeriodic`].
pub fn get_next_period(handle: u64) -> RTResult<i64> {
    Ok(registry()
        .next_period(ThreadId::from_raw(handle))?
        .as_nanos_i64())
}

/// Pin the thread behind `handle` to `cpus`.
///
/// # Errors
///
/// Returns [`RTError::InvalidHandle`] or an affinity error.
pub fn set_thread_affinity(handle: u64, cpus: &[usize]) -> RTResult {
    registry().set_affinity(ThreadId::from_raw(handle), cpus)
}

/// Pin the calling thread to `cpus`.
///
/// # Errors
///
/// See [`affinity::set_current_thread_affinity`].
pub fn set_current_thread_affinity(cpus: &[usize]) -> RTResult {
    affinity::set_current_thread_affinity(cpus)
}

/// Join `handle` and return its exit code.
///
/// # Errors
///
/// Returns [`RTError::InvalidHandle`] or [`RTError::InvalidState`].
pub fn join(handle: u64) -> RTResult<i32> {
    registry().join(ThreadId::from_raw(handle))
}

/// Destroy `handle`. The id is invalid afterwards.
///
/// # Errors
///
/// Returns [`RTError::InvalidHandle`] for an unknown id.
pub fn destroy(handle: u64) -> RTResult {
    registry().destroy(ThreadId::from_raw(handle))
}

/// Highest priority of the default policy.
///
/// # Errors
///
/// Returns [`RTError::SchedulingPolicy`] if the query fails.
pub fn get_maximum_priority() -> RTResult<i32> {
    policy::maximum_priority()
}

/// Lowest priority of the default policy.
///
/// # Errors
///
/// Returns [`RTError::SchedulingPolicy`] if the query fails.
pub fn get_minimum_priority() -> RTResult<i32> {
    policy::minimum_priority()
}

/// Monotonic time in nanoseconds.
///
/// # Errors
///
/// Returns [`RTError::ClockUnavailable`].
pub fn get_current_monotonic_time() -> RTResult<i64> {
    clock::monotonic_nanos()
}

/// Wall-clock time in nanoseconds since the Unix epoch.
///
/// # Errors
///
/// Returns [`RTError::ClockUnavailable`].
pub fn get_current_realtime_clock_time() -> RTResult<i64> {
    clock::realtime_nanos()
}

/// Priority of the calling thread.
///
/// # Errors
///
/// Returns [`RTError::SchedulingPolicy`].
pub fn get_current_thread_priority() -> RTResult<i32> {
    process::current_thread_priority()
}

/// Scheduling class ordinal of the calling thread.
///
/// # Errors
///
/// Returns [`RTError::SchedulingPolicy`].
pub fn get_current_thread_scheduling_class() -> RTResult<i32> {
    Ok(process::current_thread_scheduler()?.ordinal())
}

/// Set scheduling class (ordinal) and priority of process `pid`; 0 or a
/// negated `errno`.
pub fn set_process_scheduler(pid: i32, class_ordinal: i32, priority: i32) -> i32 {
    let native = process::SchedulerAlgorithm::from_ordinal(class_ordinal)
        .and_then(process::SchedulerAlgorithm::to_native);
    match native {
        Some(class) => process::set_scheduler(pid, class, priority),
        None => {
            warn!(class_ordinal, "unknown scheduling class");
            -EINVAL
        }
    }
}

/// Scheduling class ordinal of process `pid`, or a negated `errno`.
pub fn get_process_scheduler(pid: i32) -> i32 {
    let raw = process::get_scheduler(pid);
    if raw < 0 {
        return raw;
    }
    process::SchedulerAlgorithm::from_native(raw).map_or(raw, process::SchedulerAlgorithm::ordinal)
}

/// Priority of process `pid`, or a negated `errno`.
pub fn get_process_priority(pid: i32) -> i32 {
    process::get_priority(pid)
}
