//! Periodic real-time thread handle.
//!
//! A [`PeriodicThread`] owns one native thread. Its lifecycle is
//! `Created -> Running -> Joining -> Joined`; a failed start ends in `Failed`.
//!
//! Scheduling attributes are applied by the new thread to itself before the
//! callback runs, and the outcome is handed back to [`PeriodicThread::start`]
//! over a rendezvous channel so policy errors are reported synchronously.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::config::ThreadConfig;
use crate::error::{RTError, RTResult};
use crate::platform;
use crate::policy::{self, PolicyRequest, RealtimePolicy};
use crate::schedule::PeriodicSchedule;
use crate::timespec::Timestamp;

/// Exit code reported when the callback panicked.
pub const EXIT_PANICKED: i32 = -1;

/// Exit code of a thread whose scheduling setup failed before the callback ran.
const EXIT_SETUP_FAILED: i32 = -2;

/// Thread body. Called exactly once; the returned value becomes the exit code.
pub type ThreadCallback = Box<dyn FnOnce(&ThreadContext) -> i32 + Send + 'static>;

static THREAD_NUMBER: AtomicU64 = AtomicU64::new(0);

/// Lifecycle state of a [`PeriodicThread`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Configured, not yet started.
    Created,
    /// Native thread spawned and configured.
    Running,
    /// An owner is blocked waiting for the thread body to return.
    Joining,
    /// Native thread joined; exit code available.
    Joined,
    /// Start failed; the native thread, if any, has exited.
    Failed,
}

impl ThreadState {
    /// State name for diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadState::Created => "Created",
            ThreadState::Running => "Running",
            ThreadState::Joining => "Joining",
            ThreadState::Joined => "Joined",
            ThreadState::Failed => "Failed",
        }
    }
}

/// Schedule access for code running on a periodic thread.
///
/// Handed to the callback by reference; cheap to clone.
#[derive(Debug, Clone)]
pub struct ThreadContext {
    schedule: Arc<PeriodicSchedule>,
}

impl ThreadContext {
    pub(crate) fn new(schedule: Arc<PeriodicSchedule>) -> Self {
        Self { schedule }
    }

    /// Sleep until the next period boundary, shifted by `phase_offset_ns`.
    ///
    /// Returns the lateness in nanoseconds; negative means the deadline was
    /// missed and the call did not block.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::NotPeriodic`] on a non-periodic thread, or any
    /// clock or wait failure.
    pub fn wait_for_next_period(&self, phase_offset_ns: i64) -> RTResult<i64> {
        self.schedule.wait_for_next_period(phase_offset_ns)
    }

    /// Sleep until `target` on the monotonic clock.
    ///
    /// # Errors
    ///
    /// Any clock or wait failure.
    pub fn wait_until(&self, target: Timestamp) -> RTResult<i64> {
        self.schedule.wait_until(target)
    }

    /// Re-anchor the next deadline to now.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::NotPeriodic`] on a non-periodic thread.
    pub fn set_next_period_to_clock(&self) -> RTResult {
        self.schedule.set_next_period_to_clock()
    }

    /// Re-anchor the next deadline to `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::NotPeriodic`] on a non-periodic thread.
    pub fn set_next_period(&self, timestamp: Timestamp) -> RTResult {
        self.schedule.set_next_period(timestamp)
    }

    /// Current deadline anchor.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::NotPeriodic`] on a non-periodic thread.
    pub fn next_period(&self) -> RTResult<Timestamp> {
        self.schedule.next_period()
    }

    /// Whether the thread is periodic.
    pub fn is_periodic(&self) -> bool {
        self.schedule.is_periodic()
    }

    /// Configured period, if periodic.
    pub fn period(&self) -> Option<Timestamp> {
        self.schedule.period()
    }

    /// Back-to-back missed deadlines so far.
    pub fn consecutive_overruns(&self) -> u32 {
        self.schedule.consecutive_overruns()
    }
}

/// Handle to one periodic real-time thread.
pub struct PeriodicThread {
    name: String,
    config: ThreadConfig,
    policy: Arc<dyn RealtimePolicy>,
    schedule: Arc<PeriodicSchedule>,
    callback: Option<ThreadCallback>,
    native: Option<JoinHandle<i32>>,
    native_id: Option<platform::NativeThreadId>,
    state: ThreadState,
    return_value: Option<i32>,
}

impl core::fmt::Debug for PeriodicThread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PeriodicThread")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("policy", &self.policy.name())
            .field("state", &self.state)
            .field("return_value", &self.return_value)
            .finish_non_exhaustive()
    }
}

impl PeriodicThread {
    /// Create a thread under the default scheduling policy.
    ///
    /// # Errors
    ///
    /// See [`PeriodicThread::with_policy`].
    pub fn new(config: ThreadConfig, callback: ThreadCallback) -> RTResult<Self> {
        Self::with_policy(config, callback, policy::default_policy())
    }

    /// Create a thread scheduled by `policy`. Nothing is spawned yet.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidPriority`] or [`RTError::InvalidConfig`] if
    /// `config` does not validate against `policy`.
    pub fn with_policy(
        config: ThreadConfig,
        callback: ThreadCallback,
        policy: Arc<dyn RealtimePolicy>,
    ) -> RTResult<Self> {
        config.validate_with(policy.as_ref())?;

        let number = THREAD_NUMBER.fetch_add(1, Ordering::Relaxed);
        let name = match &config.name {
            Some(prefix) => format!("{prefix}-realtime-thread-{number}"),
            None => format!("realtime-thread-{number}"),
        };
        let schedule = Arc::new(PeriodicSchedule::new(config.periodic, config.overrun));

        Ok(Self {
            name,
            config,
            policy,
            schedule,
            callback: Some(callback),
            native: None,
            native_id: None,
            state: ThreadState::Created,
            return_value: None,
        })
    }

    /// Native thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Configured priority.
    pub fn priority(&self) -> i32 {
        self.config.priority
    }

    /// Configuration the thread was created with.
    pub fn config(&self) -> &ThreadConfig {
        &self.config
    }

    /// Whether the thread is periodic.
    pub fn is_periodic(&self) -> bool {
        self.schedule.is_periodic()
    }

    /// Exit code, once joined.
    pub fn return_value(&self) -> Option<i32> {
        self.return_value
    }

    /// Schedule context shared with the running thread.
    pub fn context(&self) -> ThreadContext {
        ThreadContext::new(Arc::clone(&self.schedule))
    }

    fn invalid_state(&self, operation: &'static str) -> RTError {
        RTError::InvalidState {
            operation,
            state: self.state.as_str(),
        }
    }

    /// Spawn the native thread and apply real-time scheduling to it.
    ///
    /// Returns once the new thread has configured itself. If that fails the
    /// thread exits without running the callback and the handle moves to
    /// [`ThreadState::Failed`].
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidState`] unless the thread is `Created`,
    /// [`RTError::InvalidPriority`] if the priority left the policy's range,
    /// [`RTError::SpawnFailure`] if the OS refused to create the thread, or
    /// the error raised while applying scheduling or affinity.
    pub fn start(&mut self) -> RTResult {
        if self.state != ThreadState::Created {
            return Err(self.invalid_state("start"));
        }
        self.policy.priority_range()?.check(self.config.priority)?;
        let Some(callback) = self.callback.take() else {
            return Err(self.invalid_state("start"));
        };

        let request = PolicyRequest {
            priority: self.config.priority,
            periodic: self.schedule.is_periodic(),
            period: self.schedule.period().unwrap_or(Timestamp::ZERO),
        };
        let policy = Arc::clone(&self.policy);
        let schedule = Arc::clone(&self.schedule);
        let affinity = self.config.affinity.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<RTResult<platform::NativeThreadId>>(1);

        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let setup = prepare_current_thread(policy.as_ref(), &request, &affinity, &schedule);
                let ready = setup.is_ok();
                if ready_tx.send(setup).is_err() || !ready {
                    return EXIT_SETUP_FAILED;
                }
                let context = ThreadContext::new(schedule);
                callback(&context)
            });

        let native = match spawned {
            Ok(native) => native,
            Err(err) => {
                self.state = ThreadState::Failed;
                return Err(RTError::SpawnFailure {
                    errno: err.raw_os_error().unwrap_or(0),
                });
            }
        };

        let outcome = ready_rx.recv().unwrap_or(Err(RTError::SpawnFailure { errno: 0 }));
        match outcome {
            Ok(native_id) => {
                debug!(
                    thread = %self.name,
                    policy = self.policy.name(),
                    priority = self.config.priority,
                    "realtime thread started"
                );
                self.native = Some(native);
                self.native_id = Some(native_id);
                self.state = ThreadState::Running;
                Ok(())
            }
            Err(err) => {
                if native.join().is_err() {
                    warn!(thread = %self.name, "realtime thread panicked during setup");
                }
                self.state = ThreadState::Failed;
                Err(err)
            }
        }
    }

    /// Wait for the thread body to return and yield its exit code.
    ///
    /// Joining again returns the same code without blocking. A panicking
    /// callback yields [`EXIT_PANICKED`].
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidState`] if the thread was never started.
    pub fn join(&mut self) -> RTResult<i32> {
        match self.begin_join()? {
            JoinStep::Finished(code) => Ok(code),
            JoinStep::Pending(native) => Ok(self.finish_join(native.join())),
        }
    }

    /// First half of [`join`](Self::join): hand out the native handle so the
    /// caller can block on it without holding a lock on `self`.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidState`] if the thread was never started or
    /// another owner is already joining it.
    pub(crate) fn begin_join(&mut self) -> RTResult<JoinStep> {
        if let Some(code) = self.return_value {
            return Ok(JoinStep::Finished(code));
        }
        let Some(native) = self.native.take() else {
            return Err(self.invalid_state("join"));
        };
        self.state = ThreadState::Joining;
        Ok(JoinStep::Pending(native))
    }

    /// Second half of [`join`](Self::join): record the exit code.
    pub(crate) fn finish_join(&mut self, outcome: thread::Result<i32>) -> i32 {
        let code = outcome.unwrap_or_else(|_panic| {
            warn!(thread = %self.name, "realtime thread callback panicked");
            EXIT_PANICKED
        });
        debug!(thread = %self.name, code, "realtime thread joined");
        self.return_value = Some(code);
        self.native_id = None;
        self.state = ThreadState::Joined;
        code
    }

    /// Release the handle.
    ///
    /// The caller should have joined the thread first. A thread still
    /// running is detached; it keeps its own reference to the schedule.
    pub fn destroy(self) {
        if self.native.is_none() {
            debug!(thread = %self.name, state = self.state.as_str(), "destroying realtime thread");
        }
        drop(self);
    }

    /// Pin the thread to `cpus`. Before start the set is stored and applied
    /// by the thread itself; on a running thread, including one being
    /// joined, it is applied immediately.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidState`] once the thread has exited, or any
    /// affinity error from the host.
    pub fn set_affinity(&mut self, cpus: &[usize]) -> RTResult {
        crate::affinity::validate_cpus(cpus)?;
        match (self.state, self.native_id) {
            (ThreadState::Created, _) => {
                self.config.affinity = cpus.to_vec();
                Ok(())
            }
            (ThreadState::Running | ThreadState::Joining, Some(native_id)) => {
                platform::set_native_thread_affinity(native_id, cpus)?;
                self.config.affinity = cpus.to_vec();
                Ok(())
            }
            _ => Err(self.invalid_state("set affinity of")),
        }
    }

    /// See [`ThreadContext::wait_for_next_period`].
    ///
    /// # Errors
    ///
    /// Returns [`RTError::NotPeriodic`] on a non-periodic thread.
    pub fn wait_for_next_period(&self, phase_offset_ns: i64) -> RTResult<i64> {
        self.schedule.wait_for_next_period(phase_offset_ns)
    }

    /// See [`ThreadContext::wait_until`].
    ///
    /// # Errors
    ///
    /// Any clock or wait failure.
    pub fn wait_until(&self, target: Timestamp) -> RTResult<i64> {
        self.schedule.wait_until(target)
    }

    /// See [`ThreadContext::set_next_period_to_clock`].
    ///
    /// # Errors
    ///
    /// Returns [`RTError::NotPeriodic`] on a non-periodic thread.
    pub fn set_next_period_to_clock(&self) -> RTResult {
        self.schedule.set_next_period_to_clock()
    }

    /// See [`ThreadContext::set_next_period`].
    ///
    /// # Errors
    ///
    /// Returns [`RTError::NotPeriodic`] on a non-periodic thread.
    pub fn set_next_period(&self, timestamp: Timestamp) -> RTResult {
        self.schedule.set_next_period(timestamp)
    }

    /// See [`ThreadContext::next_period`].
    ///
    /// # Errors
    ///
    /// Returns [`RTError::NotPeriodic`] on a non-periodic thread.
    pub fn next_period(&self) -> RTResult<Timestamp> {
        self.schedule.next_period()
    }
}

impl Drop for PeriodicThread {
    fn drop(&mut self) {
        if self.native.is_some() {
            warn!(
                thread = %self.name,
                state = self.state.as_str(),
                "realtime thread released without join; detaching"
            );
        }
    }
}

/// Result of [`PeriodicThread::begin_join`].
#[derive(Debug)]
pub(crate) enum JoinStep {
    /// Already joined; the cached exit code.
    Finished(i32),
    /// Native handle to block on, then pass to
    /// [`PeriodicThread::finish_join`].
    Pending(JoinHandle<i32>),
}

fn prepare_current_thread(
    policy: &dyn RealtimePolicy,
    request: &PolicyRequest,
    affinity: &[usize],
    schedule: &PeriodicSchedule,
) -> RTResult<platform::NativeThreadId> {
    if !affinity.is_empty() {
        platform::set_current_thread_affinity(affinity)?;
    }
    policy.apply(request)?;
    schedule.resync_if_pending()?;
    Ok(platform::current_native_thread_id())
}
