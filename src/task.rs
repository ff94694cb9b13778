//! # Task Control Block
//!
//! Defines the task model: the TCB, the task state machine, the per-task
//! preemption flag, and the static TCB pool the queues index into.
//!
//! ## State Machine
//!
//! ```text
//!   DORMANT ──(create_task)──► READY ◄──────► RUNNING
//!      ▲                         ▲               │
//!      │                         │ tick due /    │ sleep_ms /
//!      │ VM done                 │ handoff /     │ mutex blocked /
//!      │                         │ resume        │ suspend
//!      └───── RUNNING            │               ▼
//!                          WAITING · SUSPENDED
//! ```
//!
//! A TCB sits on exactly one of the four state queues at any time (or on
//! none, transiently, inside a critical section while it is moved).

use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::{DEFAULT_TASK_PRIORITY, MAX_TASKS};
use crate::mutex::MutexId;
use crate::queue::QueueKind;

// ---------------------------------------------------------------------------
// Task identity
// ---------------------------------------------------------------------------

/// Handle to a task: its slot index in the kernel's TCB pool.
///
/// Ids are stable for the life of the kernel — slots of terminated
/// tasks are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskId(pub(crate) u8);

impl TaskId {
    /// Slot index behind this id.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Why a WAITING task is waiting, with the data the wakeup needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// Timed sleep; wakes when the global tick reaches `until`
    /// (signed-difference comparison, so wraparound is tolerated).
    Sleep { until: u32 },
    /// Blocked on a mutex; woken by ownership handoff at unlock.
    Mutex(MutexId),
}

/// Execution state of a task. Selects which queue the TCB lives on;
/// READY and RUNNING share the ready queue, with the RUNNING task at
/// its head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// No VM attached: never started, or terminated.
    Dormant,
    /// Runnable, waiting in the ready queue.
    Ready,
    /// Currently executing on the CPU.
    Running,
    /// Blocked; the reason carries the wakeup condition.
    Waiting(WaitReason),
    /// Taken out of scheduling until explicitly resumed.
    Suspended,
}

impl TaskState {
    /// The queue a task in this state lives on.
    #[inline]
    pub(crate) fn queue(&self) -> QueueKind {
        match self {
            TaskState::Dormant => QueueKind::Dormant,
            TaskState::Ready | TaskState::Running => QueueKind::Ready,
            TaskState::Waiting(_) => QueueKind::Waiting,
            TaskState::Suspended => QueueKind::Suspended,
        }
    }
}

// ---------------------------------------------------------------------------
// Preemption flag
// ---------------------------------------------------------------------------

/// The cross-context one-bit signal from the tick handler and blocking
/// operations to a running VM.
///
/// Written from interrupt context with release ordering, read at VM
/// safe points with acquire ordering. At most one task is running, so
/// there is a single reader; the writers are the tick handler and the
/// blocking ops.
#[derive(Debug)]
pub struct PreemptFlag(AtomicBool);

impl PreemptFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    #[inline]
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for PreemptFlag {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block — the per-task kernel record.
///
/// TCBs are stored inline in the kernel's [`TaskPool`]; the `next`
/// field is the intrusive link of the state queue the task currently
/// sits on.
pub(crate) struct Tcb<V> {
    /// Slot allocation flag. `false` marks a free pool slot.
    pub(crate) in_use: bool,

    /// Current state; selects the queue this TCB lives on.
    pub(crate) state: TaskState,

    /// Configured base priority. Smaller value = more urgent.
    pub(crate) priority: u8,

    /// Effective scheduling priority, the queue sort key. Mirrors
    /// `priority` today; kept separate so priority inheritance can
    /// diverge from the base value later.
    pub(crate) priority_preemption: u8,

    /// Remaining ticks in the current slice. 0 means the slice is
    /// spent and the dispatcher will rotate the task on next requeue.
    pub(crate) timeslice: u8,

    /// The guest VM bound to this task. `None` exactly while dormant.
    pub(crate) vm: Option<V>,

    /// Preemption signal polled by the VM at safe points.
    pub(crate) preempt: PreemptFlag,

    /// Intrusive queue link. A TCB is on exactly one queue at a time.
    pub(crate) next: Option<TaskId>,
}

impl<V> Tcb<V> {
    /// A free pool slot in the canonical zero-state.
    pub(crate) const EMPTY: Self = Self {
        in_use: false,
        state: TaskState::Dormant,
        priority: DEFAULT_TASK_PRIORITY,
        priority_preemption: DEFAULT_TASK_PRIORITY,
        timeslice: 0,
        vm: None,
        preempt: PreemptFlag::new(),
        next: None,
    };
}

// ---------------------------------------------------------------------------
// TCB pool
// ---------------------------------------------------------------------------

/// Fixed pool of TCB slots. The four state queues are index lists over
/// this storage.
pub(crate) struct TaskPool<V> {
    slots: [Tcb<V>; MAX_TASKS],
}

impl<V> TaskPool<V> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: [Tcb::EMPTY; MAX_TASKS],
        }
    }

    /// Claim the first free slot and reset it to the canonical
    /// zero-state with the given priority. Returns `None` when the
    /// pool is exhausted. The slot is not linked into any queue yet.
    pub(crate) fn allocate(&mut self, priority: u8) -> Option<TaskId> {
        let idx = self.slots.iter().position(|s| !s.in_use)?;
        let tcb = &mut self.slots[idx];
        tcb.in_use = true;
        tcb.state = TaskState::Dormant;
        tcb.priority = priority;
        tcb.priority_preemption = priority;
        tcb.timeslice = 0;
        tcb.vm = None;
        tcb.preempt.clear();
        tcb.next = None;
        Some(TaskId(idx as u8))
    }

    /// Return a claimed slot to the free pool. Only valid for slots
    /// that were never linked into a queue (failed creation).
    pub(crate) fn release(&mut self, id: TaskId) {
        let tcb = &mut self.slots[id.index()];
        debug_assert!(tcb.next.is_none());
        tcb.in_use = false;
        tcb.vm = None;
    }

    pub(crate) fn get(&self, id: TaskId) -> &Tcb<V> {
        &self.slots[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> &mut Tcb<V> {
        &mut self.slots[id.index()]
    }

    /// Iterate over the ids of all claimed slots.
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn live_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.in_use)
            .map(|(i, _)| TaskId(i as u8))
    }
}

impl<V> core::ops::Index<TaskId> for TaskPool<V> {
    type Output = Tcb<V>;

    fn index(&self, id: TaskId) -> &Tcb<V> {
        self.get(id)
    }
}

impl<V> core::ops::IndexMut<TaskId> for TaskPool<V> {
    fn index_mut(&mut self, id: TaskId) -> &mut Tcb<V> {
        self.get_mut(id)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
