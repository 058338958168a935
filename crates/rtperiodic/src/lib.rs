//! Periodic real-time threads on a monotonic clock.
//!
//! This crate creates native threads with elevated, OS-enforced scheduling
//! and paces them on a fixed period without drift. It includes:
//!
//! - **Timestamp arithmetic**: normalized `(seconds, nanoseconds)` values
//! - **Clock source**: monotonic and wall-clock reads
//! - **RealtimePolicy**: `SCHED_FIFO` on Linux, the Mach time-constraint
//!   policy on Apple hosts
//! - **PeriodicThread**: create/start/wait/join lifecycle of one thread
//! - **PeriodicRunner**: runs a task every period until shut down
//! - **ThreadRegistry** and [`boundary`]: integer handles for foreign callers
//! - **RtProcessSetup**: memory locking and CPU DMA latency requests
//!
//! # Scheduling guarantees
//!
//! - Deadlines are computed by adding the period to the previous deadline,
//!   so a late wake never shifts later deadlines
//! - Waits block on the calling thread's own stack and retry through signal
//!   interruptions
//! - A missed deadline is reported as negative lateness without sleeping
//!
//! # Example
//!
//! ```no_run
//! use rtperiodic::{PeriodicThread, ThreadConfig, Timestamp, maximum_priority};
//!
//! # fn main() -> Result<(), rtperiodic::RTError> {
//! let config = ThreadConfig::periodic(maximum_priority()?, Timestamp::from_nanos(1_000_000));
//! let mut thread = PeriodicThread::new(
//!     config,
//!     Box::new(|ctx| {
//!         for _ in 0..1000 {
//!             // control work here
//!             if ctx.wait_for_next_period(0).is_err() {
//!                 return 1;
//!             }
//!         }
//!         0
//!     }),
//! )?;
//! thread.start()?;
//! let code = thread.join()?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![deny(static_mut_refs)]
#![deny(unused_must_use)]

pub mod affinity;
pub mod boundary;
pub mod clock;
pub mod config;
pub mod error;
pub mod policy;
pub mod process;
pub mod registry;
pub mod rt_setup;
pub mod runner;
pub mod schedule;
pub mod stats;
pub mod thread;
pub mod timespec;
pub mod waiter;

mod platform;

pub mod prelude;

pub use config::{OverrunPolicy, PeriodicParameters, PriorityParameters, ThreadConfig};
pub use error::{RTError, RTResult};
pub use platform::PlatformPolicy;
#[cfg(not(any(target_os = "linux", target_vendor = "apple")))]
pub use platform::BestEffortPolicy;
#[cfg(target_os = "linux")]
pub use platform::FixedPriorityPolicy;
#[cfg(target_vendor = "apple")]
pub use platform::TimeConstraintPolicy;
pub use policy::{
    DefaultPolicy, PolicyRequest, PriorityRange, RealtimePolicy, default_policy, maximum_priority,
    minimum_priority,
};
pub use process::SchedulerAlgorithm;
pub use registry::{ThreadId, ThreadRegistry};
pub use rt_setup::{RtProcessSetup, RtSetupGuard};
pub use runner::{NonRealtimePolicy, PeriodicRunner, PeriodicTask, RunnerFactory, ShutdownHandle};
pub use stats::{LatenessStats, LatenessSummary};
pub use thread::{PeriodicThread, ThreadCallback, ThreadContext, ThreadState};
pub use timespec::Timestamp;
pub use waiter::wait_until_absolute;

/// Period of a 1 kHz loop in nanoseconds.
pub const PERIOD_1KHZ_NS: u64 = 1_000_000;
