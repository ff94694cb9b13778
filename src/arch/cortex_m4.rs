//! # Cortex-M Port
//!
//! Hardware-specific plumbing for ARM Cortex-M targets: interrupt
//! masking for critical sections, `wfi` for the idle loop, and SysTick
//! configuration for the scheduler tick.
//!
//! The port does not own the tick routing — the embedder's SysTick
//! handler calls [`Scheduler::tick`](crate::Scheduler::tick) on its
//! kernel instance (see the `vmos-demo` binary).

use cortex_m::peripheral::syst::SystClkSource;

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};

/// Execute `f` with interrupts disabled.
///
/// This is the kernel's critical section: it serialises task-context
/// queue access against the tick interrupt. Keep the enclosed work
/// short to bound interrupt latency.
#[inline]
pub fn critical_section<R>(f: impl FnOnce() -> R) -> R {
    cortex_m::interrupt::free(|_| f())
}

/// Park the CPU until the next interrupt. Used by the dispatcher when
/// the ready queue is empty but sleepers or suspended tasks remain.
#[inline]
pub fn idle_cpu() {
    cortex_m::asm::wfi();
}

/// Configure SysTick to fire at [`TICK_HZ`] from the processor clock.
///
/// Route the resulting exception to the kernel's tick handler.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}
