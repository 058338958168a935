//! Mach backend: tick-counter clock emulation, relative sleeps and the
//! time-constraint thread policy.

use std::io;
use std::mem;
use std::sync::OnceLock;
use std::thread::JoinHandle;

use libc::{
    CLOCK_REALTIME, EINTR, EPERM, KERN_SUCCESS, SCHED_FIFO, THREAD_EXTENDED_POLICY,
    THREAD_EXTENDED_POLICY_COUNT, THREAD_PRECEDENCE_POLICY, THREAD_PRECEDENCE_POLICY_COUNT,
    THREAD_TIME_CONSTRAINT_POLICY, THREAD_TIME_CONSTRAINT_POLICY_COUNT, c_long, clock_gettime,
    mach_port_t, nanosleep, pthread_getschedparam, pthread_mach_thread_np, pthread_self,
    pthread_setschedparam, sched_get_priority_max, sched_get_priority_min, sched_param,
    thread_extended_policy_data_t, thread_policy_flavor_t, thread_policy_set, thread_policy_t,
    thread_precedence_policy_data_t, thread_time_constraint_policy_data_t, time_t, timespec,
};
use tracing::{debug, warn};

use crate::error::{RTError, RTResult, last_errno};
use crate::policy::{PolicyRequest, PriorityRange, RealtimePolicy, TimeConstraint, TimebaseRatio};
use crate::timespec::{Timestamp, delta};

/// Mach has no CPU pinning; affinity requests are rejected before indexing.
pub(crate) const CPU_SET_CAPACITY: usize = 0;

/// Timebase ratio, queried once per process and never torn down.
static TIMEBASE: OnceLock<Result<TimebaseRatio, i32>> = OnceLock::new();

#[expect(deprecated, reason = "libc marks the mach time calls deprecated in favour of mach2")]
fn query_timebase() -> Result<TimebaseRatio, i32> {
    let mut info = libc::mach_timebase_info_data_t { numer: 0, denom: 0 };
    // SAFETY: `info` is valid and writable for the call.
    let rc = unsafe { libc::mach_timebase_info(&mut info) };
    if rc != KERN_SUCCESS || info.denom == 0 {
        return Err(rc);
    }
    Ok(TimebaseRatio {
        numer: info.numer,
        denom: info.denom,
    })
}

pub(crate) fn timebase() -> RTResult<TimebaseRatio> {
    match *TIMEBASE.get_or_init(query_timebase) {
        Ok(ratio) => Ok(ratio),
        Err(errno) => Err(RTError::ClockUnavailable { errno }),
    }
}

fn sched_param_for(priority: i32) -> sched_param {
    // SAFETY: `sched_param` is plain data; the opaque tail must be zeroed.
    let mut param: sched_param = unsafe { mem::zeroed() };
    param.sched_priority = priority;
    param
}

/// Monotonic clock emulated from the Mach absolute tick counter.
#[expect(deprecated, reason = "libc marks the mach time calls deprecated in favour of mach2")]
pub(crate) fn monotonic_now() -> RTResult<Timestamp> {
    let ratio = timebase()?;
    // SAFETY: no arguments, always succeeds.
    let ticks = unsafe { libc::mach_absolute_time() };
    Ok(Timestamp::from_nanos(ratio.ticks_to_nanos(ticks)))
}

/// Wall clock, for diagnostics only.
pub(crate) fn realtime_now() -> RTResult<Timestamp> {
    let mut ts = timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
    let rc = unsafe { clock_gettime(CLOCK_REALTIME, &mut ts) };
    if rc != 0 {
        return Err(RTError::clock_from_last_os_error());
    }
    Ok(Timestamp::from_signed_parts(
        i64::from(ts.tv_sec),
        i64::from(ts.tv_nsec),
    ))
}

/// Sleep until `target`, converting to a relative sleep from the
/// already-read `now`. Interrupted sleeps resume with the remaining time.
pub(crate) fn sleep_until(target: Timestamp, now: Timestamp) -> RTResult {
    let remaining = Timestamp::from_signed_parts(0, delta(now, target));
    let mut request = timespec {
        tv_sec: time_t::try_from(remaining.seconds()).unwrap_or(time_t::MAX),
        tv_nsec: remaining.nanoseconds() as c_long,
    };
    loop {
        let mut left = timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: both timespecs are valid for the call.
        let rc = unsafe { nanosleep(&request, &mut left) };
        if rc == 0 {
            return Ok(());
        }
        match last_errno() {
            EINTR => request = left,
            errno => return Err(RTError::WaitFailed { errno }),
        }
    }
}

/// Model B: cooperative time-constraint policy for Mach kernels.
///
/// Periodic threads get a `{period, computation, constraint}` triple in host
/// ticks plus a non-timeshare extended policy. Every thread gets a
/// precedence (importance) hint and a fixed-priority hint.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeConstraintPolicy;

fn set_thread_policy(
    port: mach_port_t,
    flavor: thread_policy_flavor_t,
    info: thread_policy_t,
    count: u32,
) -> RTResult {
    // SAFETY: `info` points at a live policy struct of the size `count` describes.
    let rc = unsafe { thread_policy_set(port, flavor, info, count) };
    if rc != KERN_SUCCESS {
        return Err(RTError::SchedulingPolicy { os_error: rc });
    }
    Ok(())
}

impl RealtimePolicy for TimeConstraintPolicy {
    fn name(&self) -> &'static str {
        "THREAD_TIME_CONSTRAINT_POLICY"
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

        // SAFETY: always valid for the calling thread.
        let thread = unsafe { pthread_self() };
        // SAFETY: `thread` is the live calling thread.
        let port = unsafe { pthread_mach_thread_np(thread) };

        if request.periodic {
            let constraint = TimeConstraint::from_period(request.period, timebase()?);
            let mut policy = thread_time_constraint_policy_data_t {
                period: constraint.period,
                computation: constraint.computation,
                constraint: constraint.constraint,
                preemptible: 0,
            };
            set_thread_policy(
                port,
                THREAD_TIME_CONSTRAINT_POLICY as thread_policy_flavor_t,
                (&raw mut policy).cast(),
                THREAD_TIME_CONSTRAINT_POLICY_COUNT,
            )?;

            let mut extended = thread_extended_policy_data_t { timeshare: 0 };
            set_thread_policy(
                port,
                THREAD_EXTENDED_POLICY as thread_policy_flavor_t,
                (&raw mut extended).cast(),
                THREAD_EXTENDED_POLICY_COUNT,
            )?;
            debug!(
                period = constraint.period,
                computation = constraint.computation,
                constraint = constraint.constraint,
                "time-constraint policy applied"
            );
        }

        let mut precedence = thread_precedence_policy_data_t {
            importance: request.priority,
        };
        set_thread_policy(
            port,
            THREAD_PRECEDENCE_POLICY as thread_policy_flavor_t,
            (&raw mut precedence).cast(),
            THREAD_PRECEDENCE_POLICY_COUNT,
        )?;

        let param = sched_param_for(request.priority);
        // SAFETY: `thread` is the live calling thread and `param` outlives the call.
        let rc = unsafe { pthread_setschedparam(thread, SCHED_FIFO, &param) };
        match rc {
            0 => Ok(()),
            EPERM => {
                warn!(
                    priority = request.priority,
                    "Missing privilege for fixed-priority hint; continuing"
                );
                Ok(())
            }
            os_error => Err(RTError::SchedulingPolicy { os_error }),
        }
    }
}

/// Backend policy type.
pub type PlatformPolicy = TimeConstraintPolicy;

/// `(scheduling class, priority)` of the calling thread.
pub(crate) fn current_thread_scheduling() -> RTResult<(i32, i32)> {
    let mut policy = 0;
    let mut param = sched_param_for(0);
    // SAFETY: always valid for the calling thread.
    let thread = unsafe { pthread_self() };
    // SAFETY: both out-pointers are valid and writable for the call.
    let rc = unsafe { pthread_getschedparam(thread, &mut policy, &mut param) };
    if rc != 0 {
        return Err(RTError::SchedulingPolicy { os_error: rc });
    }
    Ok((policy, param.sched_priority))
}

pub(crate) fn set_current_thread_affinity(_cpus: &[usize]) -> RTResult {
    Err(RTError::Unsupported("CPU affinity on Mach kernels"))
}

pub(crate) fn set_thread_affinity<T>(_handle: &JoinHandle<T>, _cpus: &[usize]) -> RTResult {
    Err(RTError::Unsupported("CPU affinity on Mach kernels"))
}

/// Mach and fallback hosts cannot address threads for pinning.
/// Mach port of a thread.
pub(crate) type NativeThreadId = mach_port_t;

pub(crate) fn current_native_thread_id() -> NativeThreadId {
    // SAFETY: pthread_self always names the calling thread, which is live.
    unsafe { pthread_mach_thread_np(pthread_self()) }
}

pub(crate) fn set_native_thread_affinity(_thread: NativeThreadId, _cpus: &[usize]) -> RTResult {
    Err(RTError::Unsupported("CPU affinity on Mach kernels"))
}

pub(crate) fn lock_memory() -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

pub(crate) fn set_process_scheduler(_pid: i32, _class: i32, _priority: i32) -> i32 {
    -libc::ENOSYS
}

pub(crate) fn get_process_scheduler(_pid: i32) -> i32 {
    -libc::ENOSYS
}

pub(crate) fn get_process_priority(_pid: i32) -> i32 {
    -libc::ENOSYS
}
