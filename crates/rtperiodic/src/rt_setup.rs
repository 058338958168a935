//! Process-wide real-time hardening.
//!
//! Both steps are best effort: failures are logged and the process carries
//! on with whatever latency it can get.

use std::fs::File;
use std::io;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::process;

/// Path of the Linux PM QoS CPU DMA latency request file.
pub const CPU_DMA_LATENCY_PATH: &str = "/dev/cpu_dma_latency";

/// Process-wide real-time setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtProcessSetup {
    /// Lock all current and future pages into RAM.
    ///
    /// Prevents page faults in the periodic loop.
    pub lock_memory: bool,

    /// Maximum CPU wake-up latency to request, in microseconds.
    ///
    /// `Some(0)` keeps CPUs out of deep idle states entirely. Linux only;
    /// the request lasts as long as the returned guard.
    #[serde(default)]
    pub cpu_dma_latency_us: Option<u32>,
}

impl Default for RtProcessSetup {
    fn default() -> Self {
        Self {
            lock_memory: true,
            cpu_dma_latency_us: Some(0),
        }
    }
}

impl RtProcessSetup {
    /// Create a new setup with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// No hardening at all.
    pub fn minimal() -> Self {
        Self {
            lock_memory: false,
            cpu_dma_latency_us: None,
        }
    }

    /// Setup for test runs: no memory locking, no global latency request.
    pub fn testing() -> Self {
        Self::minimal()
    }

    /// Set memory locking.
    #[must_use]
    pub fn with_lock_memory(mut self, enabled: bool) -> Self {
        self.lock_memory = enabled;
        self
    }

    /// Request a CPU DMA latency bound.
    #[must_use]
    pub fn with_cpu_dma_latency(mut self, latency_us: u32) -> Self {
        self.cpu_dma_latency_us = Some(latency_us);
        self
    }

    /// Check if any hardening is enabled.
    pub fn has_rt_features(&self) -> bool {
        self.lock_memory || self.cpu_dma_latency_us.is_some()
    }

    /// Apply the setup. Keep the returned guard alive for as long as the
    /// latency request should hold.
    pub fn apply(&self) -> RtSetupGuard {
        let mut guard = RtSetupGuard::default();

        if self.lock_memory {
            match process::lock_memory() {
                Ok(()) => {
                    debug!("process memory locked");
                    guard.memory_locked = true;
                }
                Err(err) => warn!(error = %err, "Cannot lock process memory; continuing"),
            }
        }

        if let Some(latency_us) = self.cpu_dma_latency_us {
            match request_cpu_dma_latency(latency_us) {
                Ok(file) => {
                    debug!(latency_us, "CPU DMA latency requested");
                    guard.dma_latency = Some(file);
                }
                Err(err) => warn!(
                    latency_us,
                    error = %err,
                    "Cannot request CPU DMA latency; continuing"
                ),
            }
        }

        guard
    }
}

/// Outcome of [`RtProcessSetup::apply`]. Dropping it withdraws the latency
/// request; locked memory stays locked.
#[derive(Debug, Default)]
pub struct RtSetupGuard {
    memory_locked: bool,
    dma_latency: Option<File>,
}

impl RtSetupGuard {
    /// Whether memory locking succeeded.
    pub fn memory_locked(&self) -> bool {
        self.memory_locked
    }

    /// Whether a latency request is being held.
    pub fn holds_dma_latency(&self) -> bool {
        self.dma_latency.is_some()
    }
}

#[cfg(target_os = "linux")]
fn request_cpu_dma_latency(latency_us: u32) -> io::Result<File> {
    use std::io::Write;

    let value = i32::try_from(latency_us)
        .map_err(|_overflow| io::Error::new(io::ErrorKind::InvalidInput, "latency too large"))?;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .open(CPU_DMA_LATENCY_PATH)?;
    file.write_all(&value.to_ne_bytes())?;
    Ok(file)
}

#[cfg(not(target_os = "linux"))]
fn request_cpu_dma_latency(_latency_us: u32) -> io::Result<File> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "CPU DMA latency requests need Linux PM QoS",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let setup = RtProcessSetup::default();
        assert!(setup.lock_memory);
        assert_eq!(setup.cpu_dma_latency_us, Some(0));
        assert!(setup.has_rt_features());
    }

    #[test]
    fn test_minimal() {
        let setup = RtProcessSetup::minimal();
        assert!(!setup.has_rt_features());
        let guard = setup.apply();
        assert!(!guard.memory_locked());
        assert!(!guard.holds_dma_latency());
    }

    #[test]
    fn test_builder_pattern() {
        let setup = RtProcessSetup::testing()
            .with_lock_memory(true)
            .with_cpu_dma_latency(10);
        assert!(setup.lock_memory);
        assert_eq!(setup.cpu_dma_latency_us, Some(10));
    }

    #[test]
    fn test_latency_request_degrades_without_privilege() {
        // Usually unprivileged in CI; either outcome must leave a usable guard.
        let guard = RtProcessSetup::minimal().with_cpu_dma_latency(1000).apply();
        drop(guard);
    }

    #[test]
    fn test_json_round_trip() -> Result<(), serde_json::Error> {
        let setup = RtProcessSetup::default().with_cpu_dma_latency(5);
        let json = serde_json::to_string(&setup)?;
        assert_eq!(serde_json::from_str::<RtProcessSetup>(&json)?, setup);
        Ok(())
    }
}
