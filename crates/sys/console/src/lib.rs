//! EmberOS VGA Text Console
//!
//! A thin write surface over the 80x25 text-mode framebuffer: two bytes per
//! cell, ASCII low byte, VGA attribute high byte. The kernel core only writes
//! status and diagnostic lines through this crate; the shell does its own
//! line rendering on top of the same primitives.
//!
//! [`Vga`] works over any cell buffer base so the logic can be driven against
//! plain memory; the kernel-facing globals pin it to `0xB8000`.

#![no_std]

use core::fmt;

#[cfg(target_arch = "x86")]
use spin::Mutex;

/// Columns in the text grid
pub const COLS: usize = 80;
/// Rows in the text grid
pub const ROWS: usize = 25;
/// Physical address of the VGA text framebuffer
pub const VGA_TEXT_BASE: usize = 0xB8000;

/// VGA text attributes the kernel uses
pub mod attr {
    /// White on black, normal text
    pub const NORMAL: u8 = 0x0F;
    /// Inverted cell used as the block cursor
    pub const CURSOR: u8 = 0x7F;
    /// Green-background diagnostic accent
    pub const ACCENT: u8 = 0x2E;
    /// Alternate diagnostic accent
    pub const ACCENT_ALT: u8 = 0x2F;
}

/// Writer over an 80x25 cell grid.
pub struct Vga {
    base: *mut u8,
}

// The buffer pointer is only ever used from one task at a time behind the
// console Mutex.
unsafe impl Send for Vga {}

impl Vga {
    /// Wrap a raw cell buffer.
    ///
    /// # Safety
    ///
    /// `base` must point to at least `ROWS * COLS * 2` writable bytes for the
    /// lifetime of the value.
    pub const unsafe fn with_base(base: *mut u8) -> Self {
        Vga { base }
    }

    #[inline]
    fn offset(row: usize, col: usize) -> isize {
        ((row * COLS + col) * 2) as isize
    }

    /// Write one cell
    pub fn put(&mut self, row: usize, col: usize, ch: u8, attribute: u8) {
        if row >= ROWS || col >= COLS {
            return;
        }
        unsafe {
            let cell = self.base.offset(Self::offset(row, col));
            core::ptr::write_volatile(cell, ch);
            core::ptr::write_volatile(cell.offset(1), attribute);
        }
    }

    /// Change only the attribute byte of a cell
    pub fn set_attr(&mut self, row: usize, col: usize, attribute: u8) {
        if row >= ROWS || col >= COLS {
            return;
        }
        unsafe {
            core::ptr::write_volatile(self.base.offset(Self::offset(row, col) + 1), attribute);
        }
    }

    pub fn char_at(&self, row: usize, col: usize) -> u8 {
        if row >= ROWS || col >= COLS {
            return 0;
        }
        unsafe { core::ptr::read_volatile(self.base.offset(Self::offset(row, col))) }
    }

    pub fn attr_at(&self, row: usize, col: usize) -> u8 {
        if row >= ROWS || col >= COLS {
            return 0;
        }
        unsafe { core::ptr::read_volatile(self.base.offset(Self::offset(row, col) + 1)) }
    }

    /// Write a string on `row` starting at column 0, clipped at the grid edge
    pub fn print_line(&mut self, s: &str, row: usize) {
        self.print_at(s, row, 0);
    }

    /// Write a string at (`row`, `col`), clipped at the grid edge
    pub fn print_at(&mut self, s: &str, row: usize, col: usize) {
        for (i, byte) in s.bytes().enumerate() {
            if col + i >= COLS {
                break;
            }
            self.put(row, col + i, byte, attr::NORMAL);
        }
    }

    /// Blank out a whole row
    pub fn clear_row(&mut self, row: usize) {
        for col in 0..COLS {
            self.put(row, col, b' ', attr::NORMAL);
        }
    }

    /// Blank the whole grid
    pub fn clear(&mut self) {
        for row in 0..ROWS {
            self.clear_row(row);
        }
    }

    /// Move every row up by one and blank the last row
    pub fn scroll_up(&mut self) {
        for row in 1..ROWS {
            for col in 0..COLS {
                let ch = self.char_at(row, col);
                let attribute = self.attr_at(row, col);
                self.put(row - 1, col, ch, attribute);
            }
        }
        self.clear_row(ROWS - 1);
    }
}

/// `fmt::Write` adapter for one row. Formatted output lands left to right and
/// is clipped at column 80.
pub struct LineWriter<'a> {
    vga: &'a mut Vga,
    row: usize,
    col: usize,
}

impl<'a> LineWriter<'a> {
    pub fn new(vga: &'a mut Vga, row: usize) -> Self {
        LineWriter { vga, row, col: 0 }
    }
}

impl fmt::Write for LineWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if self.col >= COLS {
                break;
            }
            self.vga.put(self.row, self.col, byte, attr::NORMAL);
            self.col += 1;
        }
        Ok(())
    }
}

/// The machine console at `VGA_TEXT_BASE`.
#[cfg(target_arch = "x86")]
static CONSOLE: Mutex<Vga> = Mutex::new(unsafe { Vga::with_base(VGA_TEXT_BASE as *mut u8) });

/// Lock the machine console
#[cfg(target_arch = "x86")]
pub fn console() -> spin::MutexGuard<'static, Vga> {
    CONSOLE.lock()
}

/// Write a status line on `row` of the machine console
#[cfg(target_arch = "x86")]
pub fn print_line(s: &str, row: usize) {
    console().print_line(s, row);
}
