//! # Architecture Ports
//!
//! The kernel's hardware boundary: critical sections, the idle
//! instruction and tick-source setup. One port is active per build —
//! the Cortex-M port when the `port-cortex-m` feature is enabled on an
//! ARM target, the hosted port everywhere else (tests, simulators).
//! [`crate::sync`] re-exports the active port's primitives.

#[cfg(all(feature = "port-cortex-m", target_arch = "arm"))]
pub mod cortex_m4;

#[cfg(not(all(feature = "port-cortex-m", target_arch = "arm")))]
pub mod hosted;
