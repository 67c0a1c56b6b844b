//! 8259 Programmable Interrupt Controller (PIC)
//!
//! Handles IRQ remapping and End-of-Interrupt signaling.

use crate::port::{io_wait, outb};

// PIC ports
const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

// PIC commands
const ICW1_INIT: u8 = 0x11;
const ICW4_8086: u8 = 0x01;
const PIC_EOI: u8 = 0x20;

/// IRQ offset for the master PIC (vectors 0x20-0x27)
pub const PIC1_OFFSET: u8 = 0x20;
/// IRQ offset for the slave PIC (vectors 0x28-0x2F)
pub const PIC2_OFFSET: u8 = 0x28;

/// Master mask with only IRQ0 (timer) and IRQ1 (keyboard) unmasked
pub const MASTER_MASK_TIMER_KEYBOARD: u8 = 0xFC;
/// All slave lines masked
pub const SLAVE_MASK_ALL: u8 = 0xFF;

/// Remap both PICs and program the interrupt masks.
///
/// Runs the full ICW1..ICW4 initialization sequence: ICW1 to both command
/// ports, ICW2 with the two vector offsets, ICW3 for the cascade at IRQ2,
/// ICW4 for 8086 mode, then the masks to the data ports.
pub fn remap(master_offset: u8, slave_offset: u8, master_mask: u8, slave_mask: u8) {
    unsafe {
        // ICW1: start initialization, expect ICW4
        outb(PIC1_COMMAND, ICW1_INIT);
        io_wait();
        outb(PIC2_COMMAND, ICW1_INIT);
        io_wait();

        // ICW2: vector offsets
        outb(PIC1_DATA, master_offset);
        io_wait();
        outb(PIC2_DATA, slave_offset);
        io_wait();

        // ICW3: slave on IRQ2, cascade identity
        outb(PIC1_DATA, 0x04);
        io_wait();
        outb(PIC2_DATA, 0x02);
        io_wait();

        // ICW4: 8086 mode
        outb(PIC1_DATA, ICW4_8086);
        io_wait();
        outb(PIC2_DATA, ICW4_8086);
        io_wait();

        // Interrupt masks
        outb(PIC1_DATA, master_mask);
        outb(PIC2_DATA, slave_mask);
    }

    log::debug!(
        "pic: remapped to {:#04x}/{:#04x}, masks {:#04x}/{:#04x}",
        master_offset,
        slave_offset,
        master_mask,
        slave_mask
    );
}

/// Send End-of-Interrupt for a hardware IRQ line (0-15).
///
/// IRQs 8-15 arrive through the slave, which needs its own EOI before the
/// master's.
pub fn send_eoi(irq: u8) {
    unsafe {
        if irq >= 8 {
            outb(PIC2_COMMAND, PIC_EOI);
        }
        outb(PIC1_COMMAND, PIC_EOI);
    }
}

/// EOI both PICs. Used by the fallback handler, which cannot know which line
/// (if any) raised the vector.
pub fn send_eoi_all() {
    unsafe {
        outb(PIC2_COMMAND, PIC_EOI);
        outb(PIC1_COMMAND, PIC_EOI);
    }
}
