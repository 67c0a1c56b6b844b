//! 8253/8254 Programmable Interval Timer (PIT)

use crate::port::outb;

const PIT_CHANNEL0: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;

/// Channel 0, lobyte/hibyte access, mode 3 (square wave)
const PIT_MODE_SQUARE_WAVE: u8 = 0x36;

/// 16-bit divisor giving roughly 100 Hz from the 1.193182 MHz input clock
pub const DIVISOR_100HZ: u16 = 0x2E9B;

/// Program channel 0 for the ~100 Hz kernel tick.
///
/// The divisor is written low-byte-first after the mode command.
pub fn init_100hz() {
    unsafe {
        outb(PIT_COMMAND, PIT_MODE_SQUARE_WAVE);
        outb(PIT_CHANNEL0, (DIVISOR_100HZ & 0xFF) as u8);
        outb(PIT_CHANNEL0, (DIVISOR_100HZ >> 8) as u8);
    }
    log::debug!("pit: channel 0 programmed, divisor {:#06x}", DIVISOR_100HZ);
}
