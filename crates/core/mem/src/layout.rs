//! Physical memory layout
//!
//! Fixed addresses and spans the allocators are built around. The kernel
//! image, heap, and paging structures all live inside the identity-mapped
//! low region.

/// Size of one physical frame / virtual page
pub const FRAME_SIZE: usize = 4096;

/// Physical span tracked by the frame bitmap (32 MiB)
pub const PMM_SPAN: usize = 32 * 1024 * 1024;

/// Number of frames in the tracked span
pub const FRAME_COUNT: usize = PMM_SPAN / FRAME_SIZE;

/// Start of the kernel heap arena (2 MiB mark, clear of the kernel image)
pub const HEAP_BASE: usize = 0x20_0000;

/// Kernel heap arena size (128 KiB)
pub const HEAP_SIZE: usize = 128 * 1024;

/// Everything below this address is identity-mapped at boot (16 MiB)
pub const IDENTITY_MAP_END: usize = 16 * 1024 * 1024;

/// Entries per page directory / page table
pub const PAGE_TABLE_ENTRIES: usize = 1024;

/// Round `value` down to its containing frame base
#[inline]
pub const fn frame_align_down(value: usize) -> usize {
    value & !(FRAME_SIZE - 1)
}

/// Round `value` up to the next frame boundary
#[inline]
pub const fn frame_align_up(value: usize) -> usize {
    (value + FRAME_SIZE - 1) & !(FRAME_SIZE - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_helpers() {
        assert_eq!(frame_align_down(0x1234), 0x1000);
        assert_eq!(frame_align_up(0x1234), 0x2000);
        assert_eq!(frame_align_up(0x2000), 0x2000);
    }

    #[test]
    fn heap_sits_inside_identity_span() {
        assert!(HEAP_BASE + HEAP_SIZE <= IDENTITY_MAP_END);
        assert_eq!(HEAP_BASE % 8, 0);
    }
}
