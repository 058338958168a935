//! Fixed-rate task runner on a periodic thread.
//!
//! A [`PeriodicRunner`] owns one [`PeriodicThread`] whose body waits for the
//! next period and then runs the task, until it is shut down. The shutdown
//! flag is checked after every wake, so the task never runs again once
//! [`PeriodicRunner::await_termination`] has returned.
//!
//! [`RunnerFactory`] hands out runners that share a priority, CPU set and
//! policy. [`RunnerFactory::non_realtime`] keeps the host's default
//! scheduler while still pacing on absolute deadlines.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::{PeriodicParameters, ThreadConfig};
use crate::error::{RTError, RTResult};
use crate::policy::{self, PolicyRequest, PriorityRange, RealtimePolicy};
use crate::thread::{EXIT_PANICKED, PeriodicThread, ThreadState};
use crate::timespec::Timestamp;

/// Work run once per period.
pub type PeriodicTask = Box<dyn FnMut() + Send + 'static>;

/// Exit code of a runner whose periodic wait failed.
const EXIT_WAIT_FAILED: i32 = 1;

/// Stops a [`PeriodicRunner`] from any thread, including its own task.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    stopped: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Ask the runner to stop at its next wake.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Whether shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Leaves the thread on the host's default scheduler.
///
/// Only priority `0` is accepted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonRealtimePolicy;

impl RealtimePolicy for NonRealtimePolicy {
    fn name(&self) -> &'static str {
        "non-realtime"
    }

    fn priority_range(&self) -> RTResult<PriorityRange> {
        Ok(PriorityRange { min: 0, max: 0 })
    }

    fn apply(&self, _request: &PolicyRequest) -> RTResult {
        Ok(())
    }
}

/// Runs a task at a fixed rate on its own periodic thread.
#[derive(Debug)]
pub struct PeriodicRunner {
    config: ThreadConfig,
    policy: Arc<dyn RealtimePolicy>,
    thread: Option<PeriodicThread>,
    shutdown: ShutdownHandle,
    periods: Arc<AtomicU64>,
    failure: Arc<Mutex<Option<RTError>>>,
}

impl PeriodicRunner {
    /// Runner scheduled by the platform's real-time policy.
    ///
    /// Any period in `config` is replaced by the one passed to
    /// [`schedule`](Self::schedule).
    pub fn new(config: ThreadConfig) -> Self {
        Self::with_policy(config, policy::default_policy())
    }

    /// Runner scheduled by `policy`.
    pub fn with_policy(config: ThreadConfig, policy: Arc<dyn RealtimePolicy>) -> Self {
        Self {
            config,
            policy,
            thread: None,
            shutdown: ShutdownHandle::default(),
            periods: Arc::new(AtomicU64::new(0)),
            failure: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawn the thread and run `task` once every `period`.
    ///
    /// The first run happens one period after the thread starts.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidState`] if a task was already scheduled,
    /// otherwise any error from [`PeriodicThread::with_policy`] or
    /// [`PeriodicThread::start`].
    pub fn schedule(&mut self, mut task: PeriodicTask, period: Timestamp) -> RTResult {
        if let Some(thread) = &self.thread {
            return Err(RTError::InvalidState {
                operation: "schedule",
                state: thread.state().as_str(),
            });
        }

        let mut config = self.config.clone();
        config.periodic = Some(match config.periodic {
            Some(parameters) => PeriodicParameters {
                period,
                ..parameters
            },
            None => PeriodicParameters::new(period),
        });

        let shutdown = self.shutdown.clone();
        let periods = Arc::clone(&self.periods);
        let failure = Arc::clone(&self.failure);
        let mut thread = PeriodicThread::with_policy(
            config,
            Box::new(move |ctx| {
                while !shutdown.is_shutdown() {
                    if let Err(err) = ctx.wait_for_next_period(0) {
                        warn!(%err, "periodic wait failed; stopping runner");
                        *failure.lock() = Some(err);
                        return EXIT_WAIT_FAILED;
                    }
                    if shutdown.is_shutdown() {
                        break;
                    }
                    task();
                    periods.fetch_add(1, Ordering::Relaxed);
                }
                0
            }),
            Arc::clone(&self.policy),
        )?;
        thread.start()?;
        info!(
            thread = thread.name(),
            period = %period,
            policy = self.policy.name(),
            "periodic runner scheduled"
        );
        self.thread = Some(thread);
        Ok(())
    }

    /// Ask the runner to stop at its next wake. Does not block.
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Handle that stops this runner from elsewhere.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Block until the thread exits and return the number of periods run.
    ///
    /// Without a prior [`shutdown`](Self::shutdown) this waits for another
    /// holder of the [`ShutdownHandle`] to stop the runner.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidState`] if nothing was scheduled,
    /// [`RTError::TaskPanicked`] if the task panicked, or the error that
    /// ended the periodic wait.
    pub fn await_termination(&mut self) -> RTResult<u64> {
        let Some(thread) = self.thread.as_mut() else {
            return Err(RTError::InvalidState {
                operation: "await",
                state: ThreadState::Created.as_str(),
            });
        };
        let code = thread.join()?;
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }
        if code == EXIT_PANICKED {
            return Err(RTError::TaskPanicked);
        }
        let periods = self.periods.load(Ordering::Relaxed);
        debug!(thread = thread.name(), periods, "periodic runner stopped");
        Ok(periods)
    }

    /// Periods the task has completed so far.
    pub fn periods(&self) -> u64 {
        self.periods.load(Ordering::Relaxed)
    }

    /// Native thread name once scheduled.
    pub fn name(&self) -> Option<&str> {
        self.thread.as_ref().map(PeriodicThread::name)
    }

    /// Whether the runner's thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| thread.state() == ThreadState::Running)
    }
}

impl Drop for PeriodicRunner {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("periodic runner dropped while running; forcing stop");
            self.shutdown();
            if let Err(err) = self.await_termination() {
                warn!(%err, "periodic runner stopped with error");
            }
        }
    }
}

/// Creates runners that share a priority, CPU set and policy.
#[derive(Debug, Clone)]
pub struct RunnerFactory {
    priority: i32,
    affinity: Vec<usize>,
    policy: Arc<dyn RealtimePolicy>,
}

impl RunnerFactory {
    /// Real-time runners at `priority` under the platform policy.
    pub fn new(priority: i32) -> Self {
        Self::with_policy(priority, policy::default_policy())
    }

    /// Runners at `priority` under `policy`.
    pub fn with_policy(priority: i32, policy: Arc<dyn RealtimePolicy>) -> Self {
        Self {
            priority,
            affinity: Vec::new(),
            policy,
        }
    }

    /// Runners on the host's default scheduler.
    pub fn non_realtime() -> Self {
        Self::with_policy(0, Arc::new(NonRealtimePolicy))
    }

    /// Pin every runner to `cpus`.
    #[must_use]
    pub fn with_affinity(mut self, cpus: impl Into<Vec<usize>>) -> Self {
        self.affinity = cpus.into();
        self
    }

    /// New unscheduled runner whose thread name starts with `name`.
    pub fn create(&self, name: &str) -> PeriodicRunner {
        let config = ThreadConfig::new(self.priority)
            .with_name(name)
            .with_affinity(self.affinity.clone());
        PeriodicRunner::with_policy(config, Arc::clone(&self.policy))
    }
}
