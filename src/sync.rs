//! # Synchronization Primitives
//!
//! Re-exports the active port's critical section and idle primitive.
//! All shared kernel state (queues, mutex pool) is mutated inside
//! [`critical_section`] from task context; the tick handler runs in
//! interrupt context and holds the implicit lock.

#[cfg(all(feature = "port-cortex-m", target_arch = "arm"))]
pub use crate::arch::cortex_m4::{critical_section, idle_cpu};

#[cfg(not(all(feature = "port-cortex-m", target_arch = "arm")))]
pub use crate::arch::hosted::{critical_section, idle_cpu};
