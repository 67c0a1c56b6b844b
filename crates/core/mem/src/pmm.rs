//! Physical Memory Manager (PMM)
//!
//! A bitmap over the tracked physical span, one bit per 4 KiB frame.
//! Bit set means allocated. Frames backing the kernel image and the kernel
//! heap are pre-marked at init and never handed out.

use spin::Mutex;

use crate::layout::{FRAME_COUNT, FRAME_SIZE, HEAP_BASE, HEAP_SIZE};

const BITMAP_BYTES: usize = FRAME_COUNT / 8;

/// Frame allocation bitmap
#[derive(Clone)]
pub struct FrameBitmap {
    bits: [u8; BITMAP_BYTES],
}

impl FrameBitmap {
    pub const fn new() -> Self {
        FrameBitmap {
            bits: [0; BITMAP_BYTES],
        }
    }

    /// Clear the map, then reserve every frame from address 0 through
    /// `reserved_end` so the kernel image and heap are never returned.
    pub fn reset(&mut self, reserved_end: usize) {
        for byte in self.bits.iter_mut() {
            *byte = 0;
        }
        let reserved_frames = reserved_end / FRAME_SIZE;
        for frame in 0..reserved_frames.min(FRAME_COUNT) {
            self.bits[frame / 8] |= 1 << (frame % 8);
        }
    }

    pub fn is_allocated(&self, frame: usize) -> bool {
        self.bits[frame / 8] & (1 << (frame % 8)) != 0
    }

    /// First-clear-bit scan from frame 0. Returns the frame's physical base
    /// address, or `None` when every tracked frame is taken.
    pub fn alloc(&mut self) -> Option<usize> {
        for frame in 0..FRAME_COUNT {
            if !self.is_allocated(frame) {
                self.bits[frame / 8] |= 1 << (frame % 8);
                return Some(frame * FRAME_SIZE);
            }
        }
        None
    }

    /// Clear the bit for the frame containing `addr`.
    ///
    /// Double-free is undefined here; no detection is performed.
    pub fn free(&mut self, addr: usize) {
        let frame = addr / FRAME_SIZE;
        if frame >= FRAME_COUNT {
            return;
        }
        self.bits[frame / 8] &= !(1 << (frame % 8));
    }
}

impl Default for FrameBitmap {
    fn default() -> Self {
        Self::new()
    }
}

/// Global PMM instance
static PMM: Mutex<FrameBitmap> = Mutex::new(FrameBitmap::new());

/// Initialize the frame bitmap, reserving everything up to the end of the
/// kernel heap.
pub fn init() {
    PMM.lock().reset(HEAP_BASE + HEAP_SIZE);
    log::info!(
        "pmm: {} frames tracked, {} reserved",
        FRAME_COUNT,
        (HEAP_BASE + HEAP_SIZE) / FRAME_SIZE
    );
}

/// Allocate a single 4 KiB frame
pub fn alloc_page() -> Option<usize> {
    PMM.lock().alloc()
}

/// Free a previously allocated frame
pub fn free_page(addr: usize) {
    PMM.lock().free(addr);
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESERVED_END: usize = HEAP_BASE + HEAP_SIZE;

    fn fresh() -> FrameBitmap {
        let mut bitmap = FrameBitmap::new();
        bitmap.reset(RESERVED_END);
        bitmap
    }

    #[test]
    fn reserved_range_is_never_returned() {
        let mut bitmap = fresh();
        let first = bitmap.alloc().unwrap();
        assert_eq!(first, RESERVED_END);
        for frame in 0..RESERVED_END / FRAME_SIZE {
            assert!(bitmap.is_allocated(frame));
        }
    }

    #[test]
    fn alloc_free_alloc_reuses_frame() {
        // S2: three ascending frames, free the middle one, get it back.
        let mut bitmap = fresh();
        let p1 = bitmap.alloc().unwrap();
        let p2 = bitmap.alloc().unwrap();
        let p3 = bitmap.alloc().unwrap();
        assert!(p1 < p2 && p2 < p3);
        bitmap.free(p2);
        let p4 = bitmap.alloc().unwrap();
        assert_eq!(p4, p2);
    }

    #[test]
    fn no_frame_returned_twice_without_free() {
        let mut bitmap = fresh();
        let a = bitmap.alloc().unwrap();
        let b = bitmap.alloc().unwrap();
        let c = bitmap.alloc().unwrap();
        assert!(a != b && b != c && a != c);
    }

    #[test]
    fn free_then_alloc_restores_bitmap() {
        let mut bitmap = fresh();
        let before = bitmap.clone();
        let page = bitmap.alloc().unwrap();
        bitmap.free(page);
        assert_eq!(bitmap.bits, before.bits);
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut bitmap = fresh();
        while bitmap.alloc().is_some() {}
        assert!(bitmap.alloc().is_none());
    }

    #[test]
    fn free_out_of_span_is_ignored()  {
        let mut bitmap = fresh();
        bitmap.free(crate::layout::PMM_SPAN + FRAME_SIZE);
        let first = bitmap.alloc().unwrap();
        assert_eq!(first, RESERVED_END);
    }
}
