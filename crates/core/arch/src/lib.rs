//! EmberOS i686 Architecture Support
//!
//! This crate provides low-level CPU and architecture support:
//! - Port I/O primitives
//! - CPU control (interrupt flag, halt, control registers)
//! - IDT (Interrupt Descriptor Table) with 32-bit interrupt gates
//! - PIC (8259 Programmable Interrupt Controller)
//! - PIT (8253/8254 Programmable Interval Timer)
//! - COM1 serial output for kernel logging
//!
//! Everything that touches the hardware is gated on `target_arch = "x86"`;
//! the descriptor-packing logic in [`idt`] is plain data manipulation and
//! builds everywhere, which is what the unit tests exercise.

#![no_std]

pub mod idt;

#[cfg(target_arch = "x86")]
pub mod cpu;
#[cfg(target_arch = "x86")]
pub mod pic;
#[cfg(target_arch = "x86")]
pub mod pit;
#[cfg(target_arch = "x86")]
pub mod port;
#[cfg(target_arch = "x86")]
pub mod serial;
