//! # VmOS — a multitasking kernel for bytecode VMs
//!
//! VmOS multiplexes a set of long-lived tasks over a single hardware
//! thread. Each task runs guest bytecode on its own virtual machine
//! instance; the kernel decides which task's VM advances next, for how
//! long, and how tasks block and resume.
//!
//! ## Scheduling Model
//!
//! - **Priority-preemptive**: smaller priority value = more urgent. The
//!   ready queue is sorted by priority; the head is the running task.
//! - **Fixed time slices**: a task runs for [`TIMESLICE_TICKS`] timer
//!   ticks, then rotates to the tail of its priority group (round-robin
//!   among equals).
//! - **Cooperative at VM-step granularity**: preemption is signalled
//!   through a per-task flag that the VM polls at safe points. The VM
//!   returns control promptly; it is never interrupted mid-instruction.
//!
//! [`TIMESLICE_TICKS`]: config::TIMESLICE_TICKS
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  Guest bytecode tasks                   │
//! ├────────────────────────────────────────────────────────┤
//! │        VM seam (vm.rs): GuestVm · VmPort · TaskOps      │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Dispatcher  │   Tick handler     │  Blocking ops     │
//! │  scheduler.rs│   scheduler.rs     │  scheduler.rs     │
//! │  ─ run()     │   ─ tick()         │  ─ sleep_ms()     │
//! │  ─ step()    │   ─ slice countdown│  ─ suspend/resume │
//! │  ─ tickless  │   ─ sleep wakeups  │  ─ mutex ops      │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │   Task model (task.rs) · Queues (queue.rs) · mutex.rs   │
//! │     TCB pool · state machine · four sorted queues       │
//! ├────────────────────────────────────────────────────────┤
//! │        Arch port (arch/): IRQ mask · idle · SysTick     │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Task State Machine
//!
//! ```text
//! DORMANT --(create_task)--> READY <--> RUNNING
//! RUNNING --(sleep_ms)-----> WAITING(Sleep) --(tick due)---> READY
//! RUNNING --(mutex blocked)-> WAITING(Mutex) --(handoff)---> READY
//! RUNNING --(suspend)------> SUSPENDED --(resume)----------> READY
//! RUNNING --(VM done)------> DORMANT
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: task and mutex state live in fixed pools sized by
//!   [`config`]; the intrusive queue links are pool indices.
//! - **Critical sections**: all queue and mutex mutation is bracketed by
//!   [`sync::critical_section`] — interrupt masking on the Cortex-M
//!   port, a plain call on the hosted port.
//! - **Preemption flag**: one `AtomicBool` per task, written with
//!   release ordering from tick/blocking-op context and read with
//!   acquire ordering at VM safe points.
//!
//! ## Timer Wiring
//!
//! The embedder owns the tick source. On a Cortex-M target, configure
//! SysTick at [`config::TICK_HZ`] and call [`Scheduler::tick`] from the
//! handler; see the `vmos-demo` binary. Alternatively run without a
//! timer: [`Scheduler::run_tickless`] simulates ticks at slice
//! granularity from the dispatch loop itself.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod mutex;
pub mod queue;
pub mod scheduler;
pub mod sync;
pub mod task;
pub mod vm;

pub use mutex::MutexId;
pub use scheduler::{Scheduler, SpawnError, TaskConfig};
pub use task::{TaskId, TaskState, WaitReason};
pub use vm::{GuestVm, LoadError, TaskOps, VmPort, VmStatus};
