//! # Scheduler
//!
//! The kernel core: the dispatch loop, the tick handler, the blocking
//! operations and the mutex protocol. Owns the TCB pool, the four state
//! queues and the mutex pool.
//!
//! ## Dispatch
//!
//! The dispatcher picks the head of the ready queue (highest priority,
//! FIFO among equals), marks it RUNNING and runs its VM for one step.
//! The step returns when the VM observes the preemption flag, when guest
//! code invokes a blocking operation, or when the program terminates.
//! The dispatcher then reacts: terminated tasks park on the dormant
//! queue, tasks with a spent slice rotate to the tail of their priority
//! group, blocked tasks are already where their state says they are.
//!
//! ## Time
//!
//! [`Scheduler::tick`] is the timer-interrupt entry point: it advances
//! the global tick, burns the running task's slice and wakes due
//! sleepers. On targets without a timer, [`Scheduler::run_tickless`]
//! drives the VM in bounded sub-steps and calls the tick handler itself,
//! one tick per dispatch round.
//!
//! ## Concurrency
//!
//! Everything here executes in task context except `tick`, which runs
//! in interrupt context. Queue and mutex mutation in task context is
//! bracketed by [`sync::critical_section`]; the tick handler holds the
//! implicit interrupt-context lock.

use core::fmt;

use crate::config::{DEFAULT_TASK_PRIORITY, TICK_HZ, TIMESLICE_TICKS};
use crate::mutex::{MutexId, MutexPool};
use crate::queue::{QueueKind, TaskQueues};
use crate::sync;
use crate::task::{TaskId, TaskPool, TaskState, WaitReason};
use crate::vm::{GuestVm, TaskOps, VmPort, VmStatus};

// ---------------------------------------------------------------------------
// Creation parameters and errors
// ---------------------------------------------------------------------------

/// Per-task creation parameters.
#[derive(Debug, Clone, Copy)]
pub struct TaskConfig {
    /// Base scheduling priority. Smaller value = more urgent.
    pub priority: u8,
}

impl TaskConfig {
    pub const fn with_priority(priority: u8) -> Self {
        Self { priority }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            priority: DEFAULT_TASK_PRIORITY,
        }
    }
}

/// Why `create_task` failed. Recoverable — the caller decides; the
/// kernel keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// No free TCB slot.
    PoolExhausted,
    /// The VM port could not produce an instance.
    VmOpenFailed,
    /// The VM rejected the bytecode image.
    IllegalBytecode,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// The kernel. Generic over the VM port that produces guest VM
/// instances for new tasks.
///
/// Embedded use keeps a single static instance and routes the timer
/// interrupt to [`tick`](Self::tick); see the `vmos-demo` binary.
pub struct Scheduler<P: VmPort> {
    port: P,
    pool: TaskPool<P::Vm>,
    queues: TaskQueues,
    mutexes: MutexPool,
    /// Global tick counter. Wraps; all comparisons are
    /// signed-difference.
    tick_count: u32,
}

impl<P: VmPort> Scheduler<P> {
    pub const fn new(port: P) -> Self {
        Self {
            port,
            pool: TaskPool::new(),
            queues: TaskQueues::new(),
            mutexes: MutexPool::new(),
            tick_count: 0,
        }
    }

    // -----------------------------------------------------------------
    // Task creation
    // -----------------------------------------------------------------

    /// Create a task running `bytecode` and enqueue it ready.
    ///
    /// Opens a VM through the port, loads the image, puts the VM into
    /// execution state and links the new TCB into the ready queue. On
    /// any failure the claimed slot is released and the VM (if any)
    /// dropped.
    pub fn create_task(
        &mut self,
        bytecode: &[u8],
        config: TaskConfig,
    ) -> Result<TaskId, SpawnError> {
        let id = self
            .pool
            .allocate(config.priority)
            .ok_or(SpawnError::PoolExhausted)?;
        self.pool[id].timeslice = TIMESLICE_TICKS;

        let Some(mut vm) = self.port.open() else {
            self.pool.release(id);
            return Err(SpawnError::VmOpenFailed);
        };
        if vm.load(bytecode).is_err() {
            log::error!("task creation failed: illegal bytecode");
            self.pool.release(id);
            return Err(SpawnError::IllegalBytecode);
        }
        vm.begin();

        self.pool[id].state = TaskState::Ready;
        self.pool[id].vm = Some(vm);
        sync::critical_section(|| self.queues.insert(&mut self.pool, id));
        Ok(id)
    }

    /// Create a task without a VM, parked on the dormant queue.
    /// Promotion to a runnable task is up to the embedder.
    pub fn create_dormant_task(&mut self, config: TaskConfig) -> Result<TaskId, SpawnError> {
        let id = self
            .pool
            .allocate(config.priority)
            .ok_or(SpawnError::PoolExhausted)?;
        self.pool[id].timeslice = TIMESLICE_TICKS;
        sync::critical_section(|| self.queues.insert(&mut self.pool, id));
        Ok(id)
    }

    // -----------------------------------------------------------------
    // Dispatcher
    // -----------------------------------------------------------------

    /// Run until every task has terminated: ready, waiting and
    /// suspended queues all empty. Dormant tasks do not keep the
    /// kernel alive.
    ///
    /// Timer-driven variant — something external (normally the tick
    /// interrupt) must call [`tick`](Self::tick), or sleeping tasks
    /// never wake and slices never expire.
    pub fn run(&mut self) {
        while self.step() {}
    }

    /// One dispatch iteration of [`run`](Self::run). Returns `false`
    /// once the kernel is drained.
    pub fn step(&mut self) -> bool {
        let Some(cur) = self.queues.head(QueueKind::Ready) else {
            if self.drained() {
                return false;
            }
            sync::idle_cpu();
            return true;
        };

        self.pool[cur].state = TaskState::Running;
        self.pool[cur].preempt.clear();
        let status = self.run_vm_once(cur);
        self.finish_step(cur, status)
    }

    /// Run until drained without any external tick source.
    ///
    /// Each dispatch round executes the VM in bounded sub-steps — one
    /// per remaining slice tick — and then calls the tick handler once,
    /// so time advances at slice granularity.
    pub fn run_tickless(&mut self) {
        while self.step_tickless() {}
    }

    /// One dispatch iteration of [`run_tickless`](Self::run_tickless).
    pub fn step_tickless(&mut self) -> bool {
        let Some(cur) = self.queues.head(QueueKind::Ready) else {
            if self.drained() {
                return false;
            }
            // No timer exists in this mode: advance time while idle so
            // sleepers still wake.
            self.tick();
            sync::idle_cpu();
            return true;
        };

        self.pool[cur].state = TaskState::Running;

        let mut status = VmStatus::Yielded;
        while self.pool[cur].timeslice > 0 {
            // Raised before every sub-step: the VM returns at its next
            // safe point, making one sub-step worth one slice tick.
            self.pool[cur].preempt.raise();
            status = self.run_vm_once(cur);
            self.pool[cur].timeslice = self.pool[cur].timeslice.saturating_sub(1);
            if status == VmStatus::Done {
                break;
            }
            if self.pool[cur].state != TaskState::Running {
                break;
            }
        }
        self.tick();

        self.finish_step(cur, status)
    }

    /// Run the task's VM for one step through a fresh binding.
    fn run_vm_once(&mut self, id: TaskId) -> VmStatus {
        let Some(mut vm) = self.pool[id].vm.take() else {
            unreachable!("runnable task without a VM");
        };
        let status = {
            let mut binding = TaskBinding {
                sched: &mut *self,
                id,
            };
            vm.run(&mut binding)
        };
        self.pool[id].vm = Some(vm);
        status
    }

    /// React to a VM step outcome. Returns `false` once the kernel is
    /// drained.
    fn finish_step(&mut self, cur: TaskId, status: VmStatus) -> bool {
        match status {
            VmStatus::Done => {
                log::debug!("task {} terminated", cur.index());
                sync::critical_section(|| {
                    self.queues.remove(&mut self.pool, cur);
                    self.pool[cur].state = TaskState::Dormant;
                    self.queues.insert(&mut self.pool, cur);
                });
                if let Some(mut vm) = self.pool[cur].vm.take() {
                    vm.end();
                }
                !self.drained()
            }
            VmStatus::Yielded => {
                sync::critical_section(|| {
                    // A blocking op may have moved the task already; the
                    // queues then reflect the new state and there is
                    // nothing left to do.
                    if self.pool[cur].state == TaskState::Running {
                        self.pool[cur].state = TaskState::Ready;
                        if self.pool[cur].timeslice == 0 {
                            // Slice spent: rotate to the tail of the
                            // priority group with a fresh slice.
                            self.queues.remove(&mut self.pool, cur);
                            self.pool[cur].timeslice = TIMESLICE_TICKS;
                            self.queues.insert(&mut self.pool, cur);
                        }
                    }
                });
                true
            }
        }
    }

    /// Whether nothing runnable or wakeable remains.
    fn drained(&self) -> bool {
        self.queues.is_empty(QueueKind::Ready)
            && self.queues.is_empty(QueueKind::Waiting)
            && self.queues.is_empty(QueueKind::Suspended)
    }

    // -----------------------------------------------------------------
    // Tick handler
    // -----------------------------------------------------------------

    /// Timer tick entry point. Call from the tick interrupt at
    /// [`TICK_HZ`](crate::config::TICK_HZ).
    ///
    /// Advances the global tick, burns one slice tick of the running
    /// task (raising its preemption flag when the slice is spent) and
    /// wakes every sleeper whose deadline has passed.
    pub fn tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);

        if let Some(head) = self.queues.head(QueueKind::Ready) {
            let tcb = &mut self.pool[head];
            if tcb.state == TaskState::Running && tcb.timeslice > 0 {
                tcb.timeslice -= 1;
                if tcb.timeslice == 0 {
                    tcb.preempt.raise();
                }
            }
        }

        // Signed difference: overdue sleepers wake even when their
        // exact tick was missed, and wraparound compares correctly.
        let mut woke = false;
        let mut cur = self.queues.head(QueueKind::Waiting);
        while let Some(id) = cur {
            cur = self.pool[id].next;
            if let TaskState::Waiting(WaitReason::Sleep { until }) = self.pool[id].state {
                if self.tick_count.wrapping_sub(until) as i32 >= 0 {
                    self.queues.remove(&mut self.pool, id);
                    self.pool[id].state = TaskState::Ready;
                    self.pool[id].timeslice = TIMESLICE_TICKS;
                    self.queues.insert(&mut self.pool, id);
                    woke = true;
                }
            }
        }

        if woke {
            self.raise_preempt_on_running();
        }
    }

    /// Raise the preemption flag of the RUNNING task, if one exists.
    ///
    /// Walks the ready queue rather than probing the head: a task woken
    /// or resumed with a higher priority may already sit in front of
    /// the running one.
    fn raise_preempt_on_running(&self) {
        for id in self.queues.iter(&self.pool, QueueKind::Ready) {
            if self.pool[id].state == TaskState::Running {
                self.pool[id].preempt.raise();
                return;
            }
        }
    }

    // -----------------------------------------------------------------
    // Blocking operations
    // -----------------------------------------------------------------

    /// Put `task` to sleep for at least `ms` milliseconds. The wakeup
    /// lands on the tick handler round at or after the deadline; the
    /// task then runs at the next dispatch of its priority.
    pub fn sleep_ms(&mut self, task: TaskId, ms: u32) {
        if !self.is_live(task) {
            return;
        }
        sync::critical_section(|| {
            self.queues.remove(&mut self.pool, task);
            let until = self.tick_count.wrapping_add(ms_to_ticks(ms));
            let tcb = &mut self.pool[task];
            tcb.timeslice = 0;
            tcb.state = TaskState::Waiting(WaitReason::Sleep { until });
            self.queues.insert(&mut self.pool, task);
        });
        self.pool[task].preempt.raise();
    }

    /// Give up the rest of `task`'s time slice. The dispatcher rotates
    /// it to the tail of its priority group on the next requeue.
    pub fn relinquish(&mut self, task: TaskId) {
        if !self.is_live(task) {
            return;
        }
        self.pool[task].timeslice = 0;
        self.pool[task].preempt.raise();
    }

    /// Change `task`'s priority, re-sorting it into its queue at once
    /// so the ordering invariant holds unconditionally.
    pub fn change_priority(&mut self, task: TaskId, priority: u8) {
        if !self.pool[task].in_use {
            return;
        }
        sync::critical_section(|| {
            self.queues.remove(&mut self.pool, task);
            let tcb = &mut self.pool[task];
            tcb.priority = priority;
            tcb.priority_preemption = priority;
            tcb.timeslice = 0;
            self.queues.insert(&mut self.pool, task);
        });
        self.pool[task].preempt.raise();
    }

    /// Take `task` out of scheduling until [`resume_task`] is called.
    /// Suspending a sleeping task cancels the sleep.
    ///
    /// [`resume_task`]: Self::resume_task
    pub fn suspend_task(&mut self, task: TaskId) {
        if !self.is_live(task) {
            return;
        }
        sync::critical_section(|| {
            self.queues.remove(&mut self.pool, task);
            self.pool[task].state = TaskState::Suspended;
            self.queues.insert(&mut self.pool, task);
        });
        self.pool[task].preempt.raise();
    }

    /// Make a suspended task ready again. The running task's
    /// preemption flag is raised so a higher-priority resumee preempts
    /// it at the next safe point. No-op for tasks that are not
    /// suspended.
    pub fn resume_task(&mut self, task: TaskId) {
        if !self.pool[task].in_use || self.pool[task].state != TaskState::Suspended {
            return;
        }
        sync::critical_section(|| {
            self.raise_preempt_on_running();
            self.queues.remove(&mut self.pool, task);
            self.pool[task].state = TaskState::Ready;
            self.queues.insert(&mut self.pool, task);
        });
    }

    // -----------------------------------------------------------------
    // Mutex operations
    // -----------------------------------------------------------------

    /// Claim a mutex slot. `None` when the pool is exhausted.
    pub fn mutex_create(&mut self) -> Option<MutexId> {
        self.mutexes.create()
    }

    /// Acquire `mutex` for `task`, blocking the task when the mutex is
    /// held by another. Acquisition while blocked is implicit: the
    /// task owns the mutex when it next runs (ownership is handed off
    /// at unlock).
    ///
    /// Re-locking a mutex the task already owns is a no-op.
    pub fn mutex_lock(&mut self, mutex: MutexId, task: TaskId) {
        if !self.mutexes.is_valid(mutex) || !self.is_live(task) {
            return;
        }
        sync::critical_section(|| match self.mutexes.owner(mutex) {
            None => {
                self.mutexes.set_owner(mutex, Some(task));
                log::trace!("mutex {}: acquired by task {}", mutex.index(), task.index());
            }
            Some(owner) if owner == task => {
                log::trace!("mutex {}: already held by task {}", mutex.index(), task.index());
            }
            Some(_) => {
                log::trace!("mutex {}: contended, task {} waits", mutex.index(), task.index());
                self.queues.remove(&mut self.pool, task);
                self.pool[task].state = TaskState::Waiting(WaitReason::Mutex(mutex));
                self.queues.insert(&mut self.pool, task);
                self.pool[task].preempt.raise();
            }
        });
    }

    /// Try to acquire `mutex` for `task` without blocking. Returns
    /// `true` on acquisition.
    pub fn mutex_trylock(&mut self, mutex: MutexId, task: TaskId) -> bool {
        if !self.mutexes.is_valid(mutex) || !self.is_live(task) {
            return false;
        }
        sync::critical_section(|| {
            if self.mutexes.owner(mutex).is_none() {
                self.mutexes.set_owner(mutex, Some(task));
                log::trace!("mutex {}: try-acquired by task {}", mutex.index(), task.index());
                true
            } else {
                log::trace!("mutex {}: trylock failed for task {}", mutex.index(), task.index());
                false
            }
        })
    }

    /// Release `mutex`, which `task` must own.
    ///
    /// If tasks are blocked on it, ownership transfers directly to the
    /// first waiter in queue order — highest priority, FIFO among
    /// equals — which becomes ready; no other task can squeeze in an
    /// acquisition between the unlock and the wakeup. With no waiters
    /// the mutex simply unlocks.
    ///
    /// # Panics
    ///
    /// Unlocking a mutex the task does not own is a kernel-usage bug
    /// and asserts.
    pub fn mutex_unlock(&mut self, mutex: MutexId, task: TaskId) {
        if !self.mutexes.is_valid(mutex) {
            return;
        }
        assert!(
            self.mutexes.owner(mutex) == Some(task),
            "mutex unlocked by non-owner"
        );

        sync::critical_section(|| {
            let mut cur = self.queues.head(QueueKind::Waiting);
            let mut handed_off = false;
            while let Some(id) = cur {
                cur = self.pool[id].next;
                if self.pool[id].state == TaskState::Waiting(WaitReason::Mutex(mutex)) {
                    self.mutexes.set_owner(mutex, Some(id));
                    self.queues.remove(&mut self.pool, id);
                    self.pool[id].state = TaskState::Ready;
                    self.queues.insert(&mut self.pool, id);
                    log::trace!("mutex {}: handed off to task {}", mutex.index(), id.index());
                    handed_off = true;
                    break;
                }
            }

            if handed_off {
                self.raise_preempt_on_running();
            } else {
                self.mutexes.set_owner(mutex, None);
                log::trace!("mutex {}: released", mutex.index());
            }
        });
    }

    // -----------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------

    /// Current global tick.
    pub fn now(&self) -> u32 {
        self.tick_count
    }

    /// State of `task`, or `None` for a free slot.
    pub fn task_state(&self, task: TaskId) -> Option<TaskState> {
        self.pool[task].in_use.then(|| self.pool[task].state)
    }

    /// Base priority of `task`, or `None` for a free slot.
    pub fn task_priority(&self, task: TaskId) -> Option<u8> {
        self.pool[task].in_use.then(|| self.pool[task].priority)
    }

    /// The RUNNING task, if one exists. It is always the ready-queue
    /// head.
    pub fn current_task(&self) -> Option<TaskId> {
        self.queues
            .head(QueueKind::Ready)
            .filter(|&id| self.pool[id].state == TaskState::Running)
    }

    /// Owner of `mutex`, or `None` when unlocked (or invalid).
    pub fn mutex_owner(&self, mutex: MutexId) -> Option<TaskId> {
        if !self.mutexes.is_valid(mutex) {
            return None;
        }
        self.mutexes.owner(mutex)
    }

    /// Render all four queues, front to back, for debugging.
    pub fn dump_queues<W: fmt::Write>(&self, w: &mut W) -> fmt::Result {
        const NAMES: [(QueueKind, &str); 4] = [
            (QueueKind::Dormant, "DORMANT"),
            (QueueKind::Ready, "READY"),
            (QueueKind::Waiting, "WAITING"),
            (QueueKind::Suspended, "SUSPENDED"),
        ];
        for (kind, name) in NAMES {
            writeln!(w, "<<<<< {} >>>>>", name)?;
            for id in self.queues.iter(&self.pool, kind) {
                let tcb = &self.pool[id];
                let tag = match tcb.state {
                    TaskState::Dormant => "DORMANT",
                    TaskState::Ready => "READY",
                    TaskState::Running => "RUN",
                    TaskState::Waiting(WaitReason::Sleep { .. }) => "SLEEP",
                    TaskState::Waiting(WaitReason::Mutex(_)) => "MUTEX",
                    TaskState::Suspended => "SUSPEND",
                };
                writeln!(
                    w,
                    " task:{:2} pri:{:3} {:7} tmsl:{:3}",
                    id.index(),
                    tcb.priority_preemption,
                    tag,
                    tcb.timeslice
                )?;
            }
        }
        Ok(())
    }

    /// Whether `task` is a claimed, non-dormant slot — the targets
    /// blocking operations accept. Everything else no-ops silently.
    fn is_live(&self, task: TaskId) -> bool {
        self.pool[task].in_use && self.pool[task].state != TaskState::Dormant
    }
}

/// Milliseconds to ticks at [`TICK_HZ`].
fn ms_to_ticks(ms: u32) -> u32 {
    ((ms as u64 * TICK_HZ as u64) / 1000) as u32
}

// ---------------------------------------------------------------------------
// Guest binding
// ---------------------------------------------------------------------------

/// The [`TaskOps`] surface handed to a VM while it runs: the kernel
/// plus the identity of the calling task.
struct TaskBinding<'a, P: VmPort> {
    sched: &'a mut Scheduler<P>,
    id: TaskId,
}

impl<P: VmPort> TaskOps for TaskBinding<'_, P> {
    fn task_id(&self) -> TaskId {
        self.id
    }

    fn preempt_requested(&self) -> bool {
        self.sched.pool[self.id].preempt.is_raised()
    }

    fn sleep_ms(&mut self, ms: u32) {
        self.sched.sleep_ms(self.id, ms);
    }

    fn relinquish(&mut self) {
        self.sched.relinquish(self.id);
    }

    fn change_priority(&mut self, priority: u8) {
        self.sched.change_priority(self.id, priority);
    }

    fn suspend(&mut self) {
        self.sched.suspend_task(self.id);
    }

    fn resume_task(&mut self, task: TaskId) {
        self.sched.resume_task(task);
    }

    fn mutex_lock(&mut self, mutex: MutexId) {
        self.sched.mutex_lock(mutex, self.id);
    }

    fn mutex_trylock(&mut self, mutex: MutexId) -> bool {
        self.sched.mutex_trylock(mutex, self.id)
    }

    fn mutex_unlock(&mut self, mutex: MutexId) {
        self.sched.mutex_unlock(mutex, self.id);
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
