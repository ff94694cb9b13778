//! # Guest VM Seam
//!
//! The kernel never interprets bytecode itself; it drives guest virtual
//! machines through the traits defined here. [`VmPort`] produces VM
//! instances, [`GuestVm`] is one instance's lifecycle, and [`TaskOps`]
//! is the kernel surface handed to a VM while it runs — the channel
//! through which guest code invokes blocking operations and observes
//! the preemption flag.
//!
//! ## Step Contract
//!
//! [`GuestVm::run`] executes guest code until one of:
//!
//! 1. the preemption flag is observed set at a safe point,
//! 2. the guest invokes a blocking operation (which sets the flag),
//! 3. the program terminates.
//!
//! Cases 1 and 2 return [`VmStatus::Yielded`]; case 3 returns
//! [`VmStatus::Done`]. The dispatcher relies on the step returning
//! promptly once the flag is up — a VM that ignores it starves every
//! other task.

use crate::mutex::MutexId;
use crate::task::TaskId;

/// Outcome of one VM step, as seen by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmStatus {
    /// The VM returned control but the program has not finished: it was
    /// preempted or called a blocking operation.
    Yielded,
    /// The program terminated. The kernel ends the VM and moves the
    /// task to the dormant queue.
    Done,
}

/// Bytecode rejected by [`GuestVm::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// The image is structurally invalid (bad magic, truncated body,
    /// unknown opcode — whatever the VM's format defines).
    IllegalBytecode,
}

/// Factory for guest VM instances.
///
/// The port owns whatever backing store VM instances need (an instance
/// pool, a bump region). `open` returns `None` when no further instance
/// can be produced; `create_task` surfaces that as
/// [`SpawnError::VmOpenFailed`](crate::scheduler::SpawnError::VmOpenFailed).
pub trait VmPort {
    /// The VM instance type this port produces.
    type Vm: GuestVm;

    /// Produce a fresh, empty VM instance.
    fn open(&mut self) -> Option<Self::Vm>;
}

/// One guest VM instance bound to a task.
///
/// Lifecycle: `open` (via the port) → [`load`](GuestVm::load) →
/// [`begin`](GuestVm::begin) → [`run`](GuestVm::run) repeatedly →
/// [`end`](GuestVm::end) → drop (drop releases the instance).
pub trait GuestVm {
    /// Load a bytecode image into the VM.
    fn load(&mut self, bytecode: &[u8]) -> Result<(), LoadError>;

    /// Put the VM into execution state. Called once, after a
    /// successful load and before the first `run`.
    fn begin(&mut self);

    /// Execute guest code until a safe-point yield or termination.
    /// See the step contract in the module docs.
    fn run(&mut self, host: &mut dyn TaskOps) -> VmStatus;

    /// Tear down execution state. Called once, after the final `run`.
    fn end(&mut self);
}

/// Kernel surface exposed to a running VM.
///
/// All operations act on the calling task except [`resume_task`],
/// which targets another task by id. Each blocking operation raises
/// the caller's preemption flag as a side effect, so the VM should
/// return [`VmStatus::Yielded`] at its next safe point.
///
/// [`resume_task`]: TaskOps::resume_task
pub trait TaskOps {
    /// Id of the calling task.
    fn task_id(&self) -> TaskId;

    /// Whether the preemption flag is raised for the calling task.
    /// VMs poll this at safe points.
    fn preempt_requested(&self) -> bool;

    /// Stop for at least `ms` milliseconds.
    fn sleep_ms(&mut self, ms: u32);

    /// Give up the rest of the current time slice.
    fn relinquish(&mut self);

    /// Change the calling task's scheduling priority.
    fn change_priority(&mut self, priority: u8);

    /// Suspend the calling task until another task resumes it.
    fn suspend(&mut self);

    /// Resume a suspended task.
    fn resume_task(&mut self, task: TaskId);

    /// Acquire `mutex`, blocking the calling task if it is held.
    fn mutex_lock(&mut self, mutex: MutexId);

    /// Try to acquire `mutex`; returns `true` on acquisition, `false`
    /// if it is held. Never blocks.
    fn mutex_trylock(&mut self, mutex: MutexId) -> bool;

    /// Release `mutex`. The calling task must be the owner.
    fn mutex_unlock(&mut self, mutex: MutexId);
}
