//! COM1 serial output
//!
//! Byte-level writer used by the kernel logger. Polled, transmit-only.

use core::fmt;

use spin::Mutex;

use crate::port::{inb, outb};

const COM1: u16 = 0x3F8;

/// Transmit side of a 16550-style UART
pub struct SerialPort {
    base: u16,
}

impl SerialPort {
    pub const fn new(base: u16) -> Self {
        SerialPort { base }
    }

    /// Program 38400 8N1 with FIFOs enabled
    pub fn init(&mut self) {
        unsafe {
            outb(self.base + 1, 0x00); // Disable interrupts
            outb(self.base + 3, 0x80); // DLAB on
            outb(self.base + 0, 0x03); // Divisor low: 38400 baud
            outb(self.base + 1, 0x00); // Divisor high
            outb(self.base + 3, 0x03); // 8 bits, no parity, one stop bit
            outb(self.base + 2, 0xC7); // FIFO, cleared, 14-byte threshold
        }
    }

    fn transmit_ready(&self) -> bool {
        unsafe { inb(self.base + 5) & 0x20 != 0 }
    }

    pub fn write_byte(&mut self, byte: u8) {
        while !self.transmit_ready() {
            core::hint::spin_loop();
        }
        unsafe {
            outb(self.base, byte);
        }
    }

    pub fn write_str_bytes(&mut self, s: &str) {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_str_bytes(s);
        Ok(())
    }
}

/// Kernel-wide COM1 instance
pub static COM1_PORT: Mutex<SerialPort> = Mutex::new(SerialPort::new(COM1));

/// Initialize COM1. Call once before the logger is installed.
pub fn init() {
    COM1_PORT.lock().init();
}
