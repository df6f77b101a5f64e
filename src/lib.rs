//! Swarm OS kernel core.
//!
//! This crate is the scheduling core of a small cooperative/preemptive
//! round-robin kernel for a 32-bit microcontroller: task table, per-task
//! stack construction, round-robin selection, and the context-switch /
//! launch protocol driven from the system tick and a pendable
//! context-switch interrupt.
//!
//! # Algorithm naivety principles
//!
//! Like the kernel this one is modeled on, this implementation uses
//! deliberately simple algorithms:
//!
//! 1. Use safe Rust everywhere except the two architecture-specific leaves
//!    (the PendSV and SVCall handlers) that the ISA forces into assembly.
//! 2. Keep the scheduler O(1) and free of hidden state.
//! 3. Revisit these decisions if they ever become a performance problem,
//!    which on the target class of hardware (a handful of tasks, a tick
//!    every few milliseconds) they are not expected to.
//!
//! What's out of scope is everything that depends on what the tasks
//! actually do: peripheral drivers, inter-task synchronization, memory
//! protection between tasks, and priority-based preemption.
#![cfg_attr(target_os = "none", no_std)]

#[macro_use]
mod klog;

pub mod config;
pub mod err;
pub mod sched;
pub mod task;
pub mod watchdog;

mod kernel;

#[cfg_attr(target_os = "none", path = "arch/arm_m.rs")]
#[cfg_attr(not(target_os = "none"), path = "arch/sim.rs")]
pub mod arch;

pub use err::CreateError;
pub use kernel::{tick_reload, yield_now, Kernel, PendableService, SystemTimer};
pub use task::TaskId;
