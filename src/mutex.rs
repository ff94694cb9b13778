//! # Mutex Pool
//!
//! Kernel mutex storage. A mutex here is deliberately small: an owner
//! slot, nothing more. A mutex is locked exactly when it has an owner,
//! and the tasks blocked on it are not stored here — they sit in the
//! global WAITING queue tagged with the mutex id, which gives the
//! unlock path its wakeup order (highest priority first, FIFO among
//! equals) for free.
//!
//! The locking protocol itself (blocking, handoff, preemption
//! signalling) lives in the scheduler, which owns both this pool and
//! the task queues.

use crate::config::MAX_MUTEXES;
use crate::task::TaskId;

/// Handle to a kernel mutex: its slot index in the mutex pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexId(pub(crate) u8);

impl MutexId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One mutex slot.
struct MutexSlot {
    /// Slot allocation flag.
    in_use: bool,
    /// Owning task while locked. `None` = unlocked; the lock has no
    /// separate locked bit, so owner and lock state cannot disagree.
    owner: Option<TaskId>,
}

impl MutexSlot {
    const EMPTY: Self = Self {
        in_use: false,
        owner: None,
    };
}

/// Fixed pool of mutex slots.
pub(crate) struct MutexPool {
    slots: [MutexSlot; MAX_MUTEXES],
}

impl MutexPool {
    pub(crate) const fn new() -> Self {
        Self {
            slots: [MutexSlot::EMPTY; MAX_MUTEXES],
        }
    }

    /// Claim a free slot, initialised unlocked.
    pub(crate) fn create(&mut self) -> Option<MutexId> {
        let idx = self.slots.iter().position(|s| !s.in_use)?;
        self.slots[idx].in_use = true;
        self.slots[idx].owner = None;
        Some(MutexId(idx as u8))
    }

    /// Whether `id` refers to a claimed slot.
    #[inline]
    pub(crate) fn is_valid(&self, id: MutexId) -> bool {
        id.index() < MAX_MUTEXES && self.slots[id.index()].in_use
    }

    #[inline]
    pub(crate) fn owner(&self, id: MutexId) -> Option<TaskId> {
        self.slots[id.index()].owner
    }

    #[inline]
    pub(crate) fn set_owner(&mut self, id: MutexId, owner: Option<TaskId>) {
        self.slots[id.index()].owner = owner;
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_starts_unlocked() {
        let mut pool = MutexPool::new();
        let m = pool.create().unwrap();
        assert!(pool.is_valid(m));
        assert_eq!(pool.owner(m), None);
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut pool = MutexPool::new();
        for _ in 0..MAX_MUTEXES {
            pool.create().unwrap();
        }
        assert!(pool.create().is_none());
    }

    #[test]
    fn test_owner_roundtrip() {
        let mut pool = MutexPool::new();
        let m = pool.create().unwrap();

        pool.set_owner(m, Some(TaskId(3)));
        assert_eq!(pool.owner(m), Some(TaskId(3)));

        pool.set_owner(m, None);
        assert_eq!(pool.owner(m), None);
    }
}
