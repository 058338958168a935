//! Commonly used types, for glob import.

pub use crate::config::{OverrunPolicy, PeriodicParameters, ThreadConfig};
pub use crate::error::{RTError, RTResult};
pub use crate::policy::{RealtimePolicy, maximum_priority, minimum_priority};
pub use crate::rt_setup::RtProcessSetup;
pub use crate::runner::{PeriodicRunner, RunnerFactory};
pub use crate::stats::LatenessStats;
pub use crate::thread::{PeriodicThread, ThreadContext, ThreadState};
pub use crate::timespec::Timestamp;
pub use crate::{PERIOD_1KHZ_NS, clock};
