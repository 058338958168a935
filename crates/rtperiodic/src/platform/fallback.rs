//! Fallback backend for hosts without POSIX or Mach scheduling.

use std::io;
use std::sync::OnceLock;
use std::thread::JoinHandle;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::error::{RTError, RTResult};
use crate::policy::{PolicyRequest, PriorityRange, RealtimePolicy};
use crate::timespec::{Timestamp, delta};

#[cfg(unix)]
const ENOSYS: i32 = libc::ENOSYS;
/// Linux value, for hosts without an errno table.
#[cfg(not(unix))]
const ENOSYS: i32 = 38;

pub(crate) const CPU_SET_CAPACITY: usize = 0;

static EPOCH: OnceLock<Instant> = OnceLock::new();

pub(crate) fn monotonic_now() -> RTResult<Timestamp> {
    let epoch = EPOCH.get_or_init(Instant::now);
    Ok(Timestamp::from(epoch.elapsed()))
}

pub(crate) fn realtime_now() -> RTResult<Timestamp> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(Timestamp::from)
        .map_err(|_err| RTError::ClockUnavailable { errno: 0 })
}

pub(crate) fn sleep_until(target: Timestamp, now: Timestamp) -> RTResult {
    let remaining = Timestamp::from_signed_parts(0, delta(now, target));
    std::thread::sleep(remaining.as_duration());
    Ok(())
}

/// No native real-time classes; accepts priority 0 only.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestEffortPolicy;

impl RealtimePolicy for BestEffortPolicy {
    fn name(&self) -> &'static str {
        "best-effort"
    }

    fn priority_range(&self) -> RTResult<PriorityRange> {
        Ok(PriorityRange { min: 0, max: 0 })
    }

    fn apply(&self, request: &PolicyRequest) -> RTResult {
        self.priority_range()?.check(request.priority)?;
        debug!("no real-time scheduling on this platform");
        Ok(())
    }
}

/// Backend policy type.
pub type PlatformPolicy = BestEffortPolicy;

pub(crate) fn current_thread_scheduling() -> RTResult<(i32, i32)> {
    Ok((0, 0))
}

pub(crate) fn set_current_thread_affinity(_cpus: &[usize]) -> RTResult {
    Err(RTError::Unsupported("CPU affinity"))
}

pub(crate) fn set_thread_affinity<T>(_handle: &JoinHandle<T>, _cpus: &[usize]) -> RTResult {
    Err(RTError::Unsupported("CPU affinity"))
}

/// Without a kernel thread id the std id stands in; it cannot be pinned.
pub(crate) type NativeThreadId = std::thread::ThreadId;

pub(crate) fn current_native_thread_id() -> NativeThreadId {
    std::thread::current().id()
}

pub(crate) fn set_native_thread_affinity(_thread: NativeThreadId, _cpus: &[usize]) -> RTResult {
    Err(RTError::Unsupported("CPU affinity"))
}

pub(crate) fn lock_memory() -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

pub(crate) fn set_process_scheduler(_pid: i32, _class: i32, _priority: i32) -> i32 {
    -ENOSYS
}

pub(crate) fn get_process_scheduler(_pid: i32) -> i32 {
    -ENOSYS
}

pub(crate) fn get_process_priority(_pid: i32) -> i32 {
    -ENOSYS
}
