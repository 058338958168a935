//! Handle table for periodic threads.
//!
//! Threads are addressed by opaque [`ThreadId`]s instead of pointers. An id
//! packs a slot index with the slot's generation; destroying a thread bumps
//! the generation, so a stale id is reported as [`RTError::InvalidHandle`]
//! instead of reaching a reused slot.

use core::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::config::ThreadConfig;
use crate::error::{RTError, RTResult};
use crate::policy::{self, RealtimePolicy};
use crate::thread::{JoinStep, PeriodicThread, ThreadCallback, ThreadContext, ThreadState};
use crate::timespec::Timestamp;

/// Opaque thread handle id. Zero is never a valid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

impl ThreadId {
    fn new(index: u32, generation: u32) -> Self {
        Self((u64::from(generation) << 32) | u64::from(index))
    }

    /// Rebuild an id from its integer form.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Integer form, for crossing a language boundary.
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    fn index(self) -> usize {
        (self.0 & u64::from(u32::MAX)) as usize
    }

    fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Generational arena.
#[derive(Debug)]
pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    /// Empty table.
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the table has no live entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store `value` and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidConfig`] once `u32::MAX` slots are in use.
    pub fn insert(&mut self, value: T) -> RTResult<ThreadId> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len())
                    .map_err(|_overflow| RTError::invalid_config("thread handle table is full"))?;
                self.slots.push(Slot {
                    generation: 1,
                    value: None,
                });
                index
            }
        };
        let slot = self
            .slots
            .get_mut(index as usize)
            .ok_or_else(|| RTError::invalid_config("thread handle table is corrupt"))?;
        slot.value = Some(value);
        self.len += 1;
        Ok(ThreadId::new(index, slot.generation))
    }

    fn slot(&self, id: ThreadId) -> Option<&Slot<T>> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
    }

    /// Look up a live entry.
    pub fn get(&self, id: ThreadId) -> Option<&T> {
        self.slot(id).and_then(|slot| slot.value.as_ref())
    }

    /// Remove an entry, invalidating `id`.
    pub fn remove(&mut self, id: ThreadId) -> Option<T> {
        let slot = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())?;
        let value = slot.value.take()?;
        // Generation 0 is reserved so a zeroed id never resolves.
        slot.generation = slot.generation.wrapping_add(1).max(1);
        self.free.push(id.index() as u32);
        self.len -= 1;
        Some(value)
    }
}

#[derive(Debug)]
struct ThreadEntry {
    context: ThreadContext,
    thread: Mutex<PeriodicThread>,
}

/// Registry of periodic threads addressed by [`ThreadId`].
///
/// Waits go through the thread's shared schedule and never touch the
/// per-thread lock, so a running thread can wait while its owner joins it.
#[derive(Debug)]
pub struct ThreadRegistry {
    policy: Arc<dyn RealtimePolicy>,
    table: RwLock<HandleTable<Arc<ThreadEntry>>>,
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadRegistry {
    /// Registry using the default policy.
    pub fn new() -> Self {
        Self::with_policy(policy::default_policy())
    }

    /// Registry whose threads are scheduled by `policy`.
    pub fn with_policy(policy: Arc<dyn RealtimePolicy>) -> Self {
        Self {
            policy,
            table: RwLock::new(HandleTable::new()),
        }
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Whether no handles are live.
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    fn entry(&self, id: ThreadId) -> RTResult<Arc<ThreadEntry>> {
        self.table
            .read()
            .get(id)
            .cloned()
            .ok_or(RTError::InvalidHandle(id))
    }

    /// Create a thread and return its id. Nothing is spawned yet.
    ///
    /// # Errors
    ///
    /// See [`PeriodicThread::with_policy`].
    pub fn create(&self, config: ThreadConfig, callback: ThreadCallback) -> RTResult<ThreadId> {
        let thread = PeriodicThread::with_policy(config, callback, Arc::clone(&self.policy))?;
        let entry = Arc::new(ThreadEntry {
            context: thread.context(),
            thread: Mutex::new(thread),
        });
        let id = self.table.write().insert(entry)?;
        debug!(%id, "realtime thread created");
        Ok(id)
    }

    /// Start thread `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidHandle`] for an unknown id, otherwise see
    /// [`PeriodicThread::start`].
    pub fn start(&self, id: ThreadId) -> RTResult {
        self.entry(id)?.thread.lock().start()
    }

    /// Lifecycle state of thread `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidHandle`] for an unknown id.
    pub fn state(&self, id: ThreadId) -> RTResult<ThreadState> {
        Ok(self.entry(id)?.thread.lock().state())
    }

    /// Schedule context of thread `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidHandle`] for an unknown id.
    pub fn context(&self, id: ThreadId) -> RTResult<ThreadContext> {
        Ok(self.entry(id)?.context.clone())
    }

    /// See [`ThreadContext::wait_for_next_period`].
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidHandle`] or [`RTError::NotPeriodic`].
    pub fn wait_for_next_period(&self, id: ThreadId, phase_offset_ns: i64) -> RTResult<i64> {
        self.context(id)?.wait_for_next_period(phase_offset_ns)
    }

    /// See [`ThreadContext::wait_until`].
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidHandle`] or a clock/wait failure.
    pub fn wait_until(&self, id: ThreadId, target: Timestamp) -> RTResult<i64> {
        self.context(id)?.wait_until(target)
    }

    /// See [`ThreadContext::set_next_period_to_clock`].
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidHandle`] or [`RTError::NotPeriodic`].
    pub fn set_next_period_to_clock(&self, id: ThreadId) -> RTResult {
        self.context(id)?.set_next_period_to_clock()
    }

    /// See [`ThreadContext::set_next_period`].
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidHandle`] or [`RTError::NotPeriodic`].
    pub fn set_next_period(&self, id: ThreadId, timestamp: Timestamp) -> RTResult {
        self.context(id)?.set_next_period(timestamp)
    }

    /// See [`ThreadContext::next_period`].
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidHandle`] or [`RTError::NotPeriodic`].
    pub fn next_period(&self, id: ThreadId) -> RTResult<Timestamp> {
        self.context(id)?.next_period()
    }

    /// Pin thread `id` to `cpus`.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidHandle`], otherwise see
    /// [`PeriodicThread::set_affinity`].
    pub fn set_affinity(&self, id: ThreadId, cpus: &[usize]) -> RTResult {
        self.entry(id)?.thread.lock().set_affinity(cpus)
    }

    /// Join thread `id` and return its exit code.
    ///
    /// The per-thread lock is released while blocked on the native thread,
    /// so the callback may keep using its own id until it returns.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidHandle`], otherwise see
    /// [`PeriodicThread::join`].
    pub fn join(&self, id: ThreadId) -> RTResult<i32> {
        let entry = self.entry(id)?;
        let step = entry.thread.lock().begin_join()?;
        let native = match step {
            JoinStep::Finished(code) => return Ok(code),
            JoinStep::Pending(native) => native,
        };
        let outcome = native.join();
        Ok(entry.thread.lock().finish_join(outcome))
    }

    /// Remove thread `id`. The id is invalid afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidHandle`] for an unknown id.
    pub fn destroy(&self, id: ThreadId) -> RTResult {
        let entry = self
            .table
            .write()
            .remove(id)
            .ok_or(RTError::InvalidHandle(id))?;
        debug!(%id, "realtime thread handle destroyed");
        drop(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_never_zero() -> RTResult {
        let mut table = HandleTable::new();
        let id = table.insert("a")?;
        assert_ne!(id.as_raw(), 0);
        assert_eq!(table.get(ThreadId::from_raw(0)), None);
        Ok(())
    }

    #[test]
    fn test_removed_id_is_invalidated() -> RTResult {
        let mut table = HandleTable::new();
        let first = table.insert(1)?;
        assert_eq!(table.remove(first), Some(1));
        assert_eq!(table.get(first), None);
        assert_eq!(table.remove(first), None);

        let second = table.insert(2)?;
        assert_eq!(second.index(), first.index());
        assert_ne!(second, first);
        assert_eq!(table.get(second), Some(&2));
        assert_eq!(table.get(first), None);
        Ok(())
    }

    #[test]
    fn test_len_tracks_live_entries() -> RTResult {
        let mut table = HandleTable::new();
        let a = table.insert('a')?;
        let _b = table.insert('b')?;
        assert_eq!(table.len(), 2);
        table.remove(a);
        assert_eq!(table.len(), 1);
        assert!(!table.is_empty());
        Ok(())
    }

    #[test]
    fn test_raw_round_trip() {
        let id = ThreadId::new(7, 3);
        assert_eq!(ThreadId::from_raw(id.as_raw()), id);
        assert_eq!(id.to_string(), "7v3");
    }
}
