//! Kernel heap
//!
//! First-fit free list over a single contiguous arena. Every block carries an
//! inline header `{size, free, next}`; headers span the arena back to back,
//! so for any adjacent pair `addr(a) + HEADER_SIZE + a.size == addr(b)`.
//! Allocation sizes round up to 8-byte multiples and the arena base is
//! 8-byte aligned, so payload pointers always come back 8-byte aligned.
//!
//! Allocation never aborts: exhaustion is `None` and callers check.

use core::mem::size_of;
use core::ptr::{self, NonNull};

use spin::Mutex;

use crate::layout::{HEAP_BASE, HEAP_SIZE};

/// Inline per-block metadata. `align(8)` keeps the struct size a multiple of
/// 8 so payloads after the header stay aligned.
#[repr(C, align(8))]
struct BlockHeader {
    /// Payload bytes following this header
    size: usize,
    free: bool,
    next: *mut BlockHeader,
}

/// Size of one block header in bytes
pub const HEADER_SIZE: usize = size_of::<BlockHeader>();

/// Payload alignment guaranteed by the allocator
pub const HEAP_ALIGNMENT: usize = 8;

#[inline]
const fn align8(value: usize) -> usize {
    (value + 7) & !7
}

/// First-fit allocator state over one arena.
pub struct FreeListHeap {
    base: *mut u8,
    size: usize,
    head: *mut BlockHeader,
}

// Access is serialized by the global Mutex; raw pointers only reach into the
// arena itself.
unsafe impl Send for FreeListHeap {}

impl FreeListHeap {
    pub const fn empty() -> Self {
        FreeListHeap {
            base: ptr::null_mut(),
            size: 0,
            head: ptr::null_mut(),
        }
    }

    /// Take ownership of `[base, base + size)` and write the single spanning
    /// free header.
    ///
    /// # Safety
    ///
    /// The region must be writable, unused by anything else, 8-byte aligned,
    /// and larger than one header.
    pub unsafe fn init(&mut self, base: *mut u8, size: usize) {
        ptr::write_bytes(base, 0, size);
        let head = base as *mut BlockHeader;
        (*head).size = size - HEADER_SIZE;
        (*head).free = true;
        (*head).next = ptr::null_mut();
        self.base = base;
        self.size = size;
        self.head = head;
    }

    /// First-fit allocation of `size` bytes (rounded up to a multiple of 8).
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        if self.head.is_null() {
            return None;
        }
        let size = align8(size.max(1));
        let mut cur = self.head;
        // SAFETY: the list only links headers inside the arena; `init` wrote
        // the first one and splits only carve within existing blocks.
        unsafe {
            while !cur.is_null() {
                if (*cur).free && (*cur).size >= size {
                    if (*cur).size > size + HEADER_SIZE + HEAP_ALIGNMENT {
                        // Carve the tail into a new free block
                        let split = (cur as *mut u8).add(HEADER_SIZE + size) as *mut BlockHeader;
                        (*split).size = (*cur).size - size - HEADER_SIZE;
                        (*split).free = true;
                        (*split).next = (*cur).next;
                        (*cur).size = size;
                        (*cur).next = split;
                    }
                    (*cur).free = false;
                    return NonNull::new((cur as *mut u8).add(HEADER_SIZE));
                }
                cur = (*cur).next;
            }
        }
        None
    }

    /// Mark the block owning `ptr` free, then coalesce adjacent free pairs.
    pub fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        // SAFETY: `ptr` was returned by `alloc`, so a header precedes it.
        unsafe {
            let block = ptr.sub(HEADER_SIZE) as *mut BlockHeader;
            (*block).free = true;
            self.coalesce();
        }
    }

    /// One left-to-right pass merging every physically contiguous free pair.
    /// Runs on every free to keep fragmentation bounded.
    unsafe fn coalesce(&mut self) {
        let mut cur = self.head;
        while !cur.is_null() && !(*cur).next.is_null() {
            let next = (*cur).next;
            let contiguous = cur as usize + HEADER_SIZE + (*cur).size == next as usize;
            if (*cur).free && (*next).free && contiguous {
                (*cur).size += HEADER_SIZE + (*next).size;
                (*cur).next = (*next).next;
            } else {
                cur = next;
            }
        }
    }
}

/// Global heap instance over the fixed kernel arena
static HEAP: Mutex<FreeListHeap> = Mutex::new(FreeListHeap::empty());

/// Initialize the kernel heap over `[HEAP_BASE, HEAP_BASE + HEAP_SIZE)`.
///
/// # Safety
///
/// Must be called exactly once, before any allocation, with the arena region
/// identity-mapped and unused by anything else.
pub unsafe fn init() {
    HEAP.lock().init(HEAP_BASE as *mut u8, HEAP_SIZE);
    log::info!("heap: {} KiB arena at {:#x}", HEAP_SIZE / 1024, HEAP_BASE);
}

/// Allocate `size` bytes from the kernel heap
pub fn kmalloc(size: usize) -> Option<NonNull<u8>> {
    HEAP.lock().alloc(size)
}

/// Return a block to the kernel heap. Null is ignored.
pub fn kfree(ptr: *mut u8) {
    HEAP.lock().free(ptr);
}

#[cfg(test)]
mod tests {
    use super::*;

    extern crate std;
    use std::vec;
    use std::vec::Vec;

    const ARENA_SIZE: usize = 128 * 1024;

    struct TestArena {
        // u64 backing keeps the arena 8-byte aligned
        _backing: Vec<u64>,
        heap: FreeListHeap,
        base: usize,
    }

    fn fresh() -> TestArena {
        let mut backing = vec![0u64; ARENA_SIZE / 8];
        let base = backing.as_mut_ptr() as *mut u8;
        let mut heap = FreeListHeap::empty();
        unsafe { heap.init(base, ARENA_SIZE) };
        TestArena {
            base: base as usize,
            _backing: backing,
            heap,
        }
    }

    /// Walk the header list and assert the adjacency invariant: each block
    /// starts exactly where the previous one ends, the chain covers the whole
    /// arena, and no two neighbours are both free.
    fn assert_layout(arena: &TestArena, expect_no_adjacent_free: bool) {
        unsafe {
            let mut cur = arena.heap.head;
            let mut prev_free = false;
            let mut end = 0usize;
            while !cur.is_null() {
                let next = (*cur).next;
                end = cur as usize + HEADER_SIZE + (*cur).size;
                if !next.is_null() {
                    assert_eq!(end, next as usize, "blocks must be back to back");
                }
                if expect_no_adjacent_free {
                    assert!(!(prev_free && (*cur).free), "adjacent free blocks survived");
                }
                prev_free = (*cur).free;
                cur = next;
            }
            assert_eq!(end, arena.base + ARENA_SIZE, "chain must span the arena");
        }
    }

    fn addr(ptr: Option<NonNull<u8>>) -> usize {
        ptr.unwrap().as_ptr() as usize
    }

    #[test]
    fn payloads_are_aligned_and_in_arena() {
        let mut arena = fresh();
        for request in [1usize, 7, 8, 13, 32, 100, 4096] {
            let p = addr(arena.heap.alloc(request));
            assert_eq!(p % 8, 0);
            assert!(p >= arena.base && p + request <= arena.base + ARENA_SIZE);
        }
        assert_layout(&arena, false);
    }

    #[test]
    fn first_fit_reuses_freed_hole() {
        // S1: a=32, b=64, c=16, free(b), d=48 lands exactly on b.
        let mut arena = fresh();
        let a = addr(arena.heap.alloc(32));
        let b = addr(arena.heap.alloc(64));
        let c = addr(arena.heap.alloc(16));
        assert!(a < b && b < c);
        arena.heap.free(b as *mut u8);
        assert_layout(&arena, true);
        let d = addr(arena.heap.alloc(48));
        assert_eq!(d, b);
        assert_layout(&arena, false);
    }

    #[test]
    fn split_leaves_trailing_free_block() {
        let mut arena = fresh();
        let first = addr(arena.heap.alloc(32));
        assert_eq!(first, arena.base + HEADER_SIZE);
        unsafe {
            let head = arena.heap.head;
            assert!(!(*head).free);
            assert_eq!((*head).size, 32);
            let tail = (*head).next;
            assert!((*tail).free);
            assert_eq!((*tail).size, ARENA_SIZE - 2 * HEADER_SIZE - 32);
        }
        assert_layout(&arena, false);
    }

    #[test]
    fn small_surplus_is_not_split() {
        let mut arena = fresh();
        let a = addr(arena.heap.alloc(64));
        let _guard = addr(arena.heap.alloc(32));
        arena.heap.free(a as *mut u8);
        // The 64-byte hole is reused whole: the surplus of a 48-byte request
        // does not strictly exceed header + 8, so no split happens.
        let b = arena.heap.alloc(48).unwrap();
        assert_eq!(b.as_ptr() as usize, a);
        unsafe {
            assert_eq!((*arena.heap.head).size, 64);
            assert!(!(*arena.heap.head).free);
        }
        assert_layout(&arena, false);
    }

    #[test]
    fn free_coalesces_neighbours() {
        let mut arena = fresh();
        let a = addr(arena.heap.alloc(32));
        let b = addr(arena.heap.alloc(32));
        let c = addr(arena.heap.alloc(32));
        arena.heap.free(a as *mut u8);
        assert_layout(&arena, true);
        arena.heap.free(b as *mut u8);
        assert_layout(&arena, true);
        arena.heap.free(c as *mut u8);
        assert_layout(&arena, true);
        // Everything merged back into the single spanning block
        unsafe {
            assert!((*arena.heap.head).free);
            assert_eq!((*arena.heap.head).size, ARENA_SIZE - HEADER_SIZE);
            assert!((*arena.heap.head).next.is_null());
        }
    }

    #[test]
    fn free_then_alloc_returns_same_address() {
        let mut arena = fresh();
        let p = addr(arena.heap.alloc(40));
        arena.heap.free(p as *mut u8);
        let q = addr(arena.heap.alloc(40));
        assert_eq!(p, q);
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut arena = fresh();
        assert!(arena.heap.alloc(ARENA_SIZE).is_none());
        let p = arena.heap.alloc(ARENA_SIZE - HEADER_SIZE);
        assert!(p.is_some());
        assert!(arena.heap.alloc(8).is_none());
    }

    #[test]
    fn free_null_is_ignored() {
        let mut arena = fresh();
        arena.heap.free(ptr::null_mut());
        assert_layout(&arena, true);
    }

    #[test]
    fn header_size_keeps_alignment() {
        assert_eq!(HEADER_SIZE % 8, 0);
    }
}
