//! Linux backend: POSIX clocks, absolute `clock_nanosleep` and `SCHED_FIFO`.

use std::io;
use std::mem;
use std::os::unix::thread::JoinHandleExt;
use std::ptr;
use std::thread::JoinHandle;

use libc::{
    CLOCK_MONOTONIC, CLOCK_REALTIME, CPU_SETSIZE, EINTR, EPERM, MCL_CURRENT, MCL_FUTURE,
    SCHED_FIFO, TIMER_ABSTIME, c_long, clock_gettime, clock_nanosleep, clockid_t, cpu_set_t,
    mlockall, pthread_getschedparam, pthread_self, pthread_setaffinity_np, pthread_setschedparam,
    sched_get_priority_max, sched_get_priority_min, sched_getparam, sched_getscheduler,
    sched_param, sched_setaffinity, sched_setscheduler, time_t, timespec,
};
use tracing::{debug, warn};

use crate::error::{RTError, RTResult, last_errno};
use crate::policy::{PolicyRequest, PriorityRange, RealtimePolicy};
use crate::timespec::Timestamp;

/// Number of logical CPUs a `cpu_set_t` can address.
pub(crate) const CPU_SET_CAPACITY: usize = CPU_SETSIZE as usize;

/// Monotonic clock, delegated directly to `CLOCK_MONOTONIC`.
pub(crate) fn monotonic_now() -> RTResult<Timestamp> {
    read_clock(CLOCK_MONOTONIC)
}

/// Wall clock, for diagnostics only.
pub(crate) fn realtime_now() -> RTResult<Timestamp> {
    read_clock(CLOCK_REALTIME)
}

fn read_clock(clock: clockid_t) -> RTResult<Timestamp> {
    let mut ts = timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
    let rc = unsafe { clock_gettime(clock, &mut ts) };
    if rc != 0 {
        return Err(RTError::clock_from_last_os_error());
    }
    Ok(from_timespec(&ts))
}

fn from_timespec(ts: &timespec) -> Timestamp {
    Timestamp::from_signed_parts(i64::from(ts.tv_sec), i64::from(ts.tv_nsec))
}

fn to_timespec(ts: Timestamp) -> timespec {
    timespec {
        tv_sec: time_t::try_from(ts.seconds()).unwrap_or(time_t::MAX),
        // Below 1e9, fits every c_long width.
        tv_nsec: ts.nanoseconds() as c_long,
    }
}

/// Sleep until `target` on the monotonic clock.
///
/// Uses an absolute deadline, so `now` is only needed by backends that
/// convert to a relative sleep. Interrupted sleeps are resumed against the
/// same deadline.
pub(crate) fn sleep_until(target: Timestamp, _now: Timestamp) -> RTResult {
    let deadline = to_timespec(target);
    loop {
        // SAFETY: `deadline` outlives the call; absolute sleeps never write
        // the remaining time, so a null pointer is allowed.
        let rc = unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, TIMER_ABSTIME, &deadline, ptr::null_mut())
        };
        match rc {
            0 => return Ok(()),
            EINTR => continue,
            errno => return Err(RTError::WaitFailed { errno }),
        }
    }
}

/// Model A: POSIX fixed-priority `SCHED_FIFO` on the calling thread.
///
/// The priority is always set explicitly on the new thread, never inherited
/// from its creator. The period is not used; Linux enforces no per-period
/// budget for `SCHED_FIFO`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPriorityPolicy;

impl RealtimePolicy for FixedPriorityPolicy {
    fn name(&self) -> &'static str {
        "SCHED_FIFO"
    }

    fn priority_range(&self) -> RTResult<PriorityRange> {
        // SAFETY: pure query on a valid policy constant.
        let min = unsafe { sched_get_priority_min(SCHED_FIFO) };
        // SAFETY: pure query on a valid policy constant.
        let max = unsafe { sched_get_priority_max(SCHED_FIFO) };
        if min < 0 || max < 0 {
            return Err(RTError::SchedulingPolicy {
                os_error: last_errno(),
            });
        }
        Ok(PriorityRange { min, max })
    }

    fn apply(&self, request: &PolicyRequest) -> RTResult {
        self.priority_range()?.check(request.priority)?;

        let param = sched_param {
            sched_priority: request.priority,
        };
        // SAFETY: always valid for the calling thread.
        let thread = unsafe { pthread_self() };
        // SAFETY: `thread` is the live calling thread and `param` outlives the call.
        let rc = unsafe { pthread_setschedparam(thread, SCHED_FIFO, &param) };

        match rc {
            0 => {
                debug!(priority = request.priority, "SCHED_FIFO applied");
                Ok(())
            }
            EPERM => {
                warn!(
                    priority = request.priority,
                    "Missing privilege for SCHED_FIFO (CAP_SYS_NICE or rtprio limit); \
                     continuing with default scheduling"
                );
                Ok(())
            }
            os_error => Err(RTError::SchedulingPolicy { os_error }),
        }
    }
}

/// Backend policy type.
pub type PlatformPolicy = FixedPriorityPolicy;

/// `(scheduling class, priority)` of the calling thread.
pub(crate) fn current_thread_scheduling() -> RTResult<(i32, i32)> {
    let mut policy = 0;
    let mut param = sched_param { sched_priority: 0 };
    // SAFETY: always valid for the calling thread.
    let thread = unsafe { pthread_self() };
    // SAFETY: both out-pointers are valid and writable for the call.
    let rc = unsafe { pthread_getschedparam(thread, &mut policy, &mut param) };
    if rc != 0 {
        return Err(RTError::SchedulingPolicy { os_error: rc });
    }
    Ok((policy, param.sched_priority))
}

fn cpu_set(cpus: &[usize]) -> RTResult<cpu_set_t> {
    // SAFETY: `cpu_set_t` is a plain bitmask; all-zero is the empty set.
    let mut set: cpu_set_t = unsafe { mem::zeroed() };
    for &cpu in cpus {
        if cpu >= CPU_SET_CAPACITY {
            return Err(RTError::invalid_config(format!(
                "CPU index {cpu} exceeds CPU set capacity {CPU_SET_CAPACITY}"
            )));
        }
        // SAFETY: index checked against CPU_SETSIZE above.
        unsafe { libc::CPU_SET(cpu, &mut set) };
    }
    Ok(set)
}

/// Pin the calling thread to `cpus`.
pub(crate) fn set_current_thread_affinity(cpus: &[usize]) -> RTResult {
    let set = cpu_set(cpus)?;
    // SAFETY: pid 0 addresses the calling thread; `set` is valid for its size.
    let rc = unsafe { sched_setaffinity(0, mem::size_of::<cpu_set_t>(), &set) };
    if rc != 0 {
        return Err(RTError::SchedulingPolicy {
            os_error: last_errno(),
        });
    }
    Ok(())
}

/// Pin the thread behind `handle` to `cpus`.
pub(crate) fn set_thread_affinity<T>(handle: &JoinHandle<T>, cpus: &[usize]) -> RTResult {
    let set = cpu_set(cpus)?;
    let thread = handle.as_pthread_t();
    // SAFETY: the join handle keeps the pthread alive until joined;
    // `set` is valid for its size.
    let rc = unsafe { pthread_setaffinity_np(thread, mem::size_of::<cpu_set_t>(), &set) };
    if rc != 0 {
        return Err(RTError::SchedulingPolicy { os_error: rc });
    }
    Ok(())
}

/// Kernel id of a thread, valid for `sched_setaffinity`.
pub(crate) type NativeThreadId = libc::pid_t;

/// Kernel id of the calling thread.
pub(crate) fn current_native_thread_id() -> NativeThreadId {
    // SAFETY: gettid takes no arguments and always succeeds.
    unsafe { libc::gettid() }
}

/// Pin the thread with kernel id `thread` to `cpus`.
///
/// A kernel id never dangles; if the thread has already exited the call
/// fails with `ESRCH`.
pub(crate) fn set_native_thread_affinity(thread: NativeThreadId, cpus: &[usize]) -> RTResult {
    let set = cpu_set(cpus)?;
    // SAFETY: `set` is valid for its size; `thread` is a plain integer id.
    let rc = unsafe { sched_setaffinity(thread, mem::size_of::<cpu_set_t>(), &set) };
    if rc != 0 {
        return Err(RTError::SchedulingPolicy {
            os_error: last_errno(),
        });
    }
    Ok(())
}

/// Lock current and future pages into RAM.
pub(crate) fn lock_memory() -> io::Result<()> {
    // SAFETY: no pointers involved.
    let rc = unsafe { mlockall(MCL_CURRENT | MCL_FUTURE) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// `sched_setscheduler` passthrough; `0` on success, `-errno` on failure.
pub(crate) fn set_process_scheduler(pid: i32, class: i32, priority: i32) -> i32 {
    let param = sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` outlives the call.
    let rc = unsafe { sched_setscheduler(pid, class, &param) };
    if rc < 0 { -last_errno() } else { rc }
}

/// `sched_getscheduler` passthrough; class or `-errno`.
pub(crate) fn get_process_scheduler(pid: i32) -> i32 {
    // SAFETY: no pointers involved.
    let rc = unsafe { sched_getscheduler(pid) };
    if rc < 0 { -last_errno() } else { rc }
}

/// `sched_getparam` passthrough; priority or `-errno`.
pub(crate) fn get_process_priority(pid: i32) -> i32 {
    let mut param = sched_param { sched_priority: 0 };
    // SAFETY: `param` is valid and writable for the call.
    let rc = unsafe { sched_getparam(pid, &mut param) };
    if rc < 0 {
        -last_errno()
    } else {
        param.sched_priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_range() -> RTResult {
        let range = FixedPriorityPolicy.priority_range()?;
        assert_eq!(range.min, 1);
        assert_eq!(range.max, 99);
        Ok(())
    }

    #[test]
    fn test_timespec_conversion() {
        let ts = Timestamp::new(12, 345_678_901);
        let raw = to_timespec(ts);
        assert_eq!(raw.tv_sec, 12);
        assert_eq!(raw.tv_nsec, 345_678_901);
        assert_eq!(from_timespec(&raw), ts);
    }

    #[test]
    fn test_cpu_set_rejects_out_of_range() {
        assert!(matches!(
            cpu_set(&[CPU_SET_CAPACITY]),
            Err(RTError::InvalidConfig(_))
        ));
        assert!(cpu_set(&[0, 1]).is_ok());
    }

    #[test]
    fn test_invalid_pid_reports_negated_errno() {
        assert_eq!(get_process_scheduler(-1), -libc::EINVAL);
    }
}
