//! EmberOS kernel nucleus
//!
//! Ties the subsystem crates together: interrupt dispatch wiring, the global
//! allocator over the kernel heap, the serial logger, the panic path, the
//! interactive shell, and the `kernel_main` bootstrap that sequences it all
//! and hands control to the cooperative scheduler.

#![no_std]

extern crate alloc;

pub mod shell;

#[cfg(target_arch = "x86")]
mod allocator;
#[cfg(target_arch = "x86")]
pub mod interrupts;
#[cfg(target_arch = "x86")]
mod kernel;
#[cfg(target_arch = "x86")]
mod logger;
#[cfg(target_arch = "x86")]
pub mod panic;

#[cfg(target_arch = "x86")]
pub use kernel::kernel_main;
