//! # VmOS Demo Firmware
//!
//! Runs the kernel on a Cortex-M4 with two guest tasks interpreting a
//! tiny demo bytecode:
//!
//! | Task | Priority | Program |
//! |------|----------|---------|
//! | `sampler` | 50 | count, sleep 500 ms, repeat |
//! | `background` | 100 | count, give up the slice, repeat |
//!
//! The sampler's higher priority means it runs the moment its sleep
//! expires; the background task soaks up the remaining time and yields
//! at every safe point.
//!
//! SysTick is the tick source: it fires at `config::TICK_HZ` and
//! drives preemption and sleep wakeups through `Scheduler::tick`.
//!
//! The firmware only makes sense on an ARM target; building the binary
//! for the host yields a stub that says so.

#![cfg_attr(target_arch = "arm", no_std)]
#![cfg_attr(target_arch = "arm", no_main)]

#[cfg(target_arch = "arm")]
mod firmware {
    use core::ptr::addr_of_mut;

    use cortex_m_rt::{entry, exception};
    use panic_halt as _;

    use vmos::arch::cortex_m4;
    use vmos::{GuestVm, LoadError, Scheduler, TaskConfig, TaskOps, VmPort, VmStatus};

    // -----------------------------------------------------------------
    // Demo guest VM
    // -----------------------------------------------------------------

    /// Demo bytecode: one-byte opcodes, `SLEEP` takes a one-byte
    /// operand in units of 10 ms.
    const OP_WORK: u8 = 0x01;
    const OP_SLEEP: u8 = 0x02;
    const OP_YIELD: u8 = 0x03;
    const OP_LOOP: u8 = 0x04;

    const MAX_PROGRAM: usize = 32;

    /// A minimal guest VM: interprets the demo bytecode from an inline
    /// buffer, checking the preemption flag after every instruction.
    struct DemoVm {
        program: [u8; MAX_PROGRAM],
        len: usize,
        pc: usize,
        counter: u32,
    }

    impl DemoVm {
        const fn new() -> Self {
            Self {
                program: [0; MAX_PROGRAM],
                len: 0,
                pc: 0,
                counter: 0,
            }
        }
    }

    impl GuestVm for DemoVm {
        fn load(&mut self, bytecode: &[u8]) -> Result<(), LoadError> {
            if bytecode.len() > MAX_PROGRAM {
                return Err(LoadError::IllegalBytecode);
            }
            let mut i = 0;
            while i < bytecode.len() {
                match bytecode[i] {
                    OP_WORK | OP_YIELD | OP_LOOP => i += 1,
                    OP_SLEEP if i + 1 < bytecode.len() => i += 2,
                    _ => return Err(LoadError::IllegalBytecode),
                }
            }
            self.program[..bytecode.len()].copy_from_slice(bytecode);
            self.len = bytecode.len();
            Ok(())
        }

        fn begin(&mut self) {
            self.pc = 0;
            self.counter = 0;
        }

        fn run(&mut self, host: &mut dyn TaskOps) -> VmStatus {
            loop {
                if self.pc >= self.len {
                    return VmStatus::Done;
                }
                let opcode = self.program[self.pc];
                self.pc += 1;
                match opcode {
                    OP_WORK => self.counter = self.counter.wrapping_add(1),
                    OP_SLEEP => {
                        let units = self.program[self.pc];
                        self.pc += 1;
                        host.sleep_ms(units as u32 * 10);
                    }
                    OP_YIELD => host.relinquish(),
                    OP_LOOP => self.pc = 0,
                    _ => return VmStatus::Done,
                }
                if host.preempt_requested() {
                    return VmStatus::Yielded;
                }
            }
        }

        fn end(&mut self) {}
    }

    /// Port producing [`DemoVm`] instances.
    struct DemoPort;

    impl VmPort for DemoPort {
        type Vm = DemoVm;

        fn open(&mut self) -> Option<DemoVm> {
            Some(DemoVm::new())
        }
    }

    // -----------------------------------------------------------------
    // Kernel instance and tick wiring
    // -----------------------------------------------------------------

    /// The kernel instance.
    ///
    /// # Safety
    /// Accessed through `SCHEDULER_PTR`, set once during startup. Task
    /// context accesses shared state inside critical sections; SysTick
    /// runs with interrupts already serialised.
    static mut SCHEDULER: Scheduler<DemoPort> = Scheduler::new(DemoPort);

    /// Raw pointer for the SysTick handler, which cannot hold a
    /// reference.
    static mut SCHEDULER_PTR: *mut Scheduler<DemoPort> = core::ptr::null_mut();

    /// Scheduler tick, driven at `TICK_HZ` by SysTick.
    #[exception]
    fn SysTick() {
        // SAFETY: the pointer is set once before interrupts are
        // enabled; SysTick is the only interrupt touching the kernel.
        unsafe {
            let sched = *addr_of_mut!(SCHEDULER_PTR);
            if !sched.is_null() {
                (*sched).tick();
            }
        }
    }

    // -----------------------------------------------------------------
    // Entry point
    // -----------------------------------------------------------------

    /// Sampler: one unit of work every 500 ms.
    const SAMPLER: &[u8] = &[OP_WORK, OP_SLEEP, 50, OP_LOOP];

    /// Background: work, then hand the slice back.
    const BACKGROUND: &[u8] = &[OP_WORK, OP_YIELD, OP_LOOP];

    #[entry]
    fn main() -> ! {
        let mut peripherals = cortex_m::Peripherals::take().unwrap();

        // SAFETY: startup runs before interrupts are enabled; this is
        // the only place the pointer is written.
        let sched = unsafe {
            SCHEDULER_PTR = addr_of_mut!(SCHEDULER);
            &mut *addr_of_mut!(SCHEDULER)
        };

        sched
            .create_task(SAMPLER, TaskConfig::with_priority(50))
            .expect("failed to create sampler task");
        sched
            .create_task(BACKGROUND, TaskConfig::with_priority(100))
            .expect("failed to create background task");

        cortex_m4::configure_systick(&mut peripherals.SYST);

        // Both demo programs loop forever, so this only returns if
        // every task is terminated externally.
        sched.run();

        loop {
            cortex_m4::idle_cpu();
        }
    }
}

#[cfg(not(target_arch = "arm"))]
fn main() {
    eprintln!("vmos-demo is firmware; build it for a Cortex-M target, e.g.");
    eprintln!("  cargo build --features port-cortex-m --target thumbv7em-none-eabihf");
}
