//! Host-specific clock, sleep and scheduling primitives.
//!
//! Exactly one backend is compiled in. Each exposes the same set of
//! functions so the rest of the crate never branches on the host.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub(crate) use linux::*;
#[cfg(target_os = "linux")]
pub use linux::{FixedPriorityPolicy, PlatformPolicy};

#[cfg(target_vendor = "apple")]
mod macos;
#[cfg(target_vendor = "apple")]
pub(crate) use macos::*;
#[cfg(target_vendor = "apple")]
pub use macos::{PlatformPolicy, TimeConstraintPolicy};

#[cfg(not(any(target_os = "linux", target_vendor = "apple")))]
mod fallback;
#[cfg(not(any(target_os = "linux", target_vendor = "apple")))]
pub(crate) use fallback::*;
#[cfg(not(any(target_os = "linux", target_vendor = "apple")))]
pub use fallback::{BestEffortPolicy, PlatformPolicy};
