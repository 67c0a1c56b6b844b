//! EmberOS Keyboard Driver
//!
//! Translates PS/2 scancode set 1 into a byte stream for task space:
//! - printable ASCII plus `\b`, `\t`, `\n`, space, Esc
//! - navigation bytes `0x80..=0x86` for Left, Right, Up, Down, Home, End,
//!   Delete (extended `E0`-prefixed keys)
//!
//! The decode state machine runs in the keyboard ISR; decoded bytes cross
//! into task space through a single-producer/single-consumer ring. The ISR
//! is the only producer and never blocks; a full ring drops the byte.

#![no_std]

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

pub mod keys {
    //! Reserved navigation bytes delivered through `getchar`
    pub const LEFT: u8 = 0x80;
    pub const RIGHT: u8 = 0x81;
    pub const UP: u8 = 0x82;
    pub const DOWN: u8 = 0x83;
    pub const HOME: u8 = 0x84;
    pub const END: u8 = 0x85;
    pub const DELETE: u8 = 0x86;
}

/// Scancodes with dedicated handling
mod scancodes {
    pub const LEFT_SHIFT_DOWN: u8 = 0x2A;
    pub const RIGHT_SHIFT_DOWN: u8 = 0x36;
    pub const LEFT_SHIFT_UP: u8 = 0xAA;
    pub const RIGHT_SHIFT_UP: u8 = 0xB6;
    pub const EXTENDED_PREFIX: u8 = 0xE0;

    pub const EXT_LEFT: u8 = 0x4B;
    pub const EXT_RIGHT: u8 = 0x4D;
    pub const EXT_UP: u8 = 0x48;
    pub const EXT_DOWN: u8 = 0x50;
    pub const EXT_HOME: u8 = 0x47;
    pub const EXT_END: u8 = 0x4F;
    pub const EXT_DELETE: u8 = 0x53;
}

/// US QWERTY, unshifted. Zero means the scancode produces nothing.
/// Indices 0x3A and up (function keys, keypad, locks) all stay zero.
#[rustfmt::skip]
static SCANCODE_ASCII: [u8; 128] = [
    0, 27, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 8,
    b'\t', b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n',
    0, b'a', b's', b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`',
    0, b'\\', b'z', b'x', b'c', b'v', b'b', b'n', b'm', b',', b'.', b'/', 0, b'*', 0, b' ',
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0,
];

/// US QWERTY with Shift held
#[rustfmt::skip]
static SCANCODE_ASCII_SHIFT: [u8; 128] = [
    0, 27, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 8,
    b'\t', b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\n',
    0, b'A', b'S', b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~',
    0, b'|', b'Z', b'X', b'C', b'V', b'B', b'N', b'M', b'<', b'>', b'?', 0, b'*', 0, b' ',
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0,
];

/// Scancode decode state: the two latches of the state machine.
pub struct Decoder {
    shift_held: bool,
    e0_pending: bool,
}

impl Decoder {
    pub const fn new() -> Self {
        Decoder {
            shift_held: false,
            e0_pending: false,
        }
    }

    /// Feed one scancode, get at most one output byte.
    ///
    /// Shift make/break codes are consumed before the extended-prefix path,
    /// so `E0 36` / `E0 B6` (fake right-shift) land in the shift branch.
    pub fn decode(&mut self, scancode: u8) -> Option<u8> {
        use scancodes::*;

        match scancode {
            LEFT_SHIFT_DOWN | RIGHT_SHIFT_DOWN => {
                self.shift_held = true;
                return None;
            }
            LEFT_SHIFT_UP | RIGHT_SHIFT_UP => {
                self.shift_held = false;
                return None;
            }
            EXTENDED_PREFIX => {
                self.e0_pending = true;
                return None;
            }
            _ => {}
        }

        if self.e0_pending {
            // One scancode consumes the prefix whether or not it maps
            self.e0_pending = false;
            let special = match scancode {
                EXT_LEFT => keys::LEFT,
                EXT_RIGHT => keys::RIGHT,
                EXT_UP => keys::UP,
                EXT_DOWN => keys::DOWN,
                EXT_HOME => keys::HOME,
                EXT_END => keys::END,
                EXT_DELETE => keys::DELETE,
                _ => return None,
            };
            return Some(special);
        }

        // Key releases (bit 7) carry no output past this point
        if scancode >= 0x80 {
            return None;
        }

        let table = if self.shift_held {
            &SCANCODE_ASCII_SHIFT
        } else {
            &SCANCODE_ASCII
        };
        match table[scancode as usize] {
            0 => None,
            byte => Some(byte),
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Ring capacity. One slot stays open to tell full from empty.
pub const QUEUE_SIZE: usize = 128;

/// Single-producer (ISR) / single-consumer (task) byte ring.
///
/// The producer writes the slot before releasing the new head; the consumer
/// acquires the head before reading the slot. With one producer and one
/// consumer that is the whole synchronization story.
pub struct KeyQueue {
    head: AtomicUsize,
    tail: AtomicUsize,
    slots: UnsafeCell<[u8; QUEUE_SIZE]>,
}

// SAFETY: slot accesses are ordered through head/tail; each index is written
// by exactly one side.
unsafe impl Sync for KeyQueue {}

impl KeyQueue {
    pub const fn new() -> Self {
        KeyQueue {
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            slots: UnsafeCell::new([0; QUEUE_SIZE]),
        }
    }

    /// Producer side. Returns false (dropping the byte) when full.
    pub fn push(&self, byte: u8) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) % QUEUE_SIZE;
        if next == self.tail.load(Ordering::Acquire) {
            return false;
        }
        unsafe {
            (*self.slots.get())[head] = byte;
        }
        self.head.store(next, Ordering::Release);
        true
    }

    /// Consumer side. Non-blocking.
    pub fn pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }
        let byte = unsafe { (*self.slots.get())[tail] };
        self.tail.store((tail + 1) % QUEUE_SIZE, Ordering::Release);
        Some(byte)
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// Consumer-side drain
    pub fn clear(&self) {
        while self.pop().is_some() {}
    }
}

impl Default for KeyQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode state. Touched only from the keyboard ISR (and `init`), so the
/// lock is never contended.
static DECODER: Mutex<Decoder> = Mutex::new(Decoder::new());

/// The ISR-to-task ring
static QUEUE: KeyQueue = KeyQueue::new();

/// Reset decode state and drain the queue.
pub fn init() {
    let mut decoder = DECODER.lock();
    *decoder = Decoder::new();
    QUEUE.clear();
}

/// ISR entry point: advance the state machine with one scancode and queue at
/// most one decoded byte. Never allocates, never blocks; a full queue drops
/// the byte.
pub fn handle_scancode(scancode: u8) {
    if let Some(byte) = DECODER.lock().decode(scancode) {
        let _ = QUEUE.push(byte);
    }
}

/// Task-side read. Returns 0 when no byte is pending.
pub fn getchar() -> u8 {
    QUEUE.pop().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    extern crate std;
    use std::vec::Vec;

    fn run(decoder: &mut Decoder, scancodes: &[u8]) -> Vec<u8> {
        scancodes.iter().filter_map(|&sc| decoder.decode(sc)).collect()
    }

    #[test]
    fn shift_latch_selects_table() {
        // S5: {2A, 1E, AA, 1E} decodes to 'A' then 'a', nothing else.
        let mut decoder = Decoder::new();
        let out = run(&mut decoder, &[0x2A, 0x1E, 0xAA, 0x1E]);
        assert_eq!(out, [b'A', b'a']);
    }

    #[test]
    fn extended_arrow_emits_one_byte() {
        // S6: {E0, 4B} produces exactly the Left byte.
        let mut decoder = Decoder::new();
        let out = run(&mut decoder, &[0xE0, 0x4B]);
        assert_eq!(out, [keys::LEFT]);
    }

    #[test]
    fn all_extended_keys_map() {
        let mut decoder = Decoder::new();
        let sequence = [
            0xE0, 0x4B, 0xE0, 0x4D, 0xE0, 0x48, 0xE0, 0x50, 0xE0, 0x47, 0xE0, 0x4F, 0xE0, 0x53,
        ];
        let out = run(&mut decoder, &sequence);
        assert_eq!(
            out,
            [
                keys::LEFT,
                keys::RIGHT,
                keys::UP,
                keys::DOWN,
                keys::HOME,
                keys::END,
                keys::DELETE
            ]
        );
    }

    #[test]
    fn unmapped_extended_scancode_clears_latch_silently() {
        let mut decoder = Decoder::new();
        // E0 followed by a code with no extended meaning: nothing comes out,
        // and the next ordinary scancode decodes normally.
        let out = run(&mut decoder, &[0xE0, 0x1E, 0x1E]);
        assert_eq!(out, [b'a']);
    }

    #[test]
    fn key_releases_are_ignored() {
        let mut decoder = Decoder::new();
        let out = run(&mut decoder, &[0x1E, 0x9E, 0x1F, 0x9F]);
        assert_eq!(out, [b'a', b's']);
    }

    #[test]
    fn unknown_scancodes_produce_nothing() {
        let mut decoder = Decoder::new();
        // LCtrl make (0x1D) and an out-of-table code
        let out = run(&mut decoder, &[0x1D, 0x7F]);
        assert!(out.is_empty());
    }

    #[test]
    fn shifted_symbols() {
        let mut decoder = Decoder::new();
        // '1' then Shift+'1' = '!'
        let out = run(&mut decoder, &[0x02, 0x2A, 0x02, 0xAA]);
        assert_eq!(out, [b'1', b'!']);
    }

    #[test]
    fn control_bytes_decode() {
        let mut decoder = Decoder::new();
        let out = run(&mut decoder, &[0x0E, 0x0F, 0x1C, 0x39]);
        assert_eq!(out, [8, b'\t', b'\n', b' ']);
    }

    #[test]
    fn queue_empty_pop_is_none() {
        let queue = KeyQueue::new();
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn queue_is_fifo() {
        let queue = KeyQueue::new();
        for byte in [b'x', b'y', b'z'] {
            assert!(queue.push(byte));
        }
        assert_eq!(queue.pop(), Some(b'x'));
        assert_eq!(queue.pop(), Some(b'y'));
        assert_eq!(queue.pop(), Some(b'z'));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn queue_full_drops_byte() {
        let queue = KeyQueue::new();
        // One slot stays open, so capacity is QUEUE_SIZE - 1
        for i in 0..QUEUE_SIZE - 1 {
            assert!(queue.push(i as u8));
        }
        assert!(!queue.push(0xFF));
        assert_eq!(queue.pop(), Some(0));
        // Space for exactly one more after a pop
        assert!(queue.push(0xFF));
        assert!(!queue.push(0xFF));
    }

    #[test]
    fn queue_wraps_around() {
        let queue = KeyQueue::new();
        for round in 0..3 {
            for i in 0..QUEUE_SIZE - 1 {
                assert!(queue.push((round + i) as u8));
            }
            for i in 0..QUEUE_SIZE - 1 {
                assert_eq!(queue.pop(), Some((round + i) as u8));
            }
        }
        assert!(queue.is_empty());
    }
}
