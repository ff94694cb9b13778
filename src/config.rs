//! # VmOS Configuration
//!
//! Compile-time constants governing the kernel. All limits are fixed at
//! compile time — no dynamic allocation.

/// Maximum number of tasks the kernel can manage simultaneously.
/// This bounds the static TCB pool. Slots of terminated tasks remain
/// occupied on the dormant queue, so size this for the total number of
/// tasks ever created, not just the number alive at once.
pub const MAX_TASKS: usize = 16;

/// Maximum number of kernel mutexes. Bounds the static mutex pool.
pub const MAX_MUTEXES: usize = 8;

/// Tick frequency in Hz. Determines scheduler time granularity; the
/// millisecond arguments of `sleep_ms` are converted with this rate.
/// Nominally 1000 (one tick per millisecond).
pub const TICK_HZ: u32 = 1000;

/// Time slice in ticks. A task runs for this many ticks before it is
/// rotated to the tail of its priority group. Held in a `u8` field,
/// so 255 is the ceiling.
pub const TIMESLICE_TICKS: u8 = 10;

/// Priority assigned to tasks created without an explicit one.
/// Smaller value = more urgent.
pub const DEFAULT_TASK_PRIORITY: u8 = 128;

/// System clock frequency in Hz, used by the Cortex-M port to compute
/// the SysTick reload value (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;
