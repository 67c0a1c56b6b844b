//! x86 (32-bit) paging
//!
//! Two-level translation: one page directory, 1024 entries, each pointing at
//! a 1024-entry page table of 4 KiB pages. The kernel identity-maps the
//! first 16 MiB through four tables and leaves every other directory slot
//! zero; a single spare table stands by in case the boot stack lies outside
//! the identity span. Page faults are fatal here.

#[cfg(target_arch = "x86")]
use core::fmt::Write as _;

#[cfg(target_arch = "x86")]
use spin::Mutex;

use crate::layout::{
    frame_align_down, FRAME_SIZE, IDENTITY_MAP_END, PAGE_TABLE_ENTRIES,
};

/// Page table entry flags
pub mod flags {
    /// Entry is present
    pub const PRESENT: u32 = 1 << 0;
    /// Page is writable
    pub const WRITABLE: u32 = 1 << 1;

    /// Mask for the physical frame base in an entry
    pub const ADDR_MASK: u32 = 0xFFFF_F000;
}

/// Page tables needed to identity-map the low span
pub const IDENTITY_TABLES: usize = IDENTITY_MAP_END / (PAGE_TABLE_ENTRIES * FRAME_SIZE);

/// Bytes covered by one directory slot
const DIR_SLOT_SPAN: usize = PAGE_TABLE_ENTRIES * FRAME_SIZE;

/// One page directory or page table: 1024 32-bit entries, 4 KiB aligned.
#[repr(C, align(4096))]
#[derive(Clone, Copy)]
pub struct PageTable {
    entries: [u32; PAGE_TABLE_ENTRIES],
}

impl PageTable {
    pub const fn new() -> Self {
        PageTable {
            entries: [0; PAGE_TABLE_ENTRIES],
        }
    }

    #[inline]
    pub fn entry(&self, index: usize) -> u32 {
        self.entries[index]
    }

    #[inline]
    pub fn set_entry(&mut self, index: usize, entry: u32) {
        self.entries[index] = entry;
    }

    #[inline]
    pub fn is_present(&self, index: usize) -> bool {
        self.entries[index] & flags::PRESENT != 0
    }

    pub fn clear(&mut self) {
        for entry in self.entries.iter_mut() {
            *entry = 0;
        }
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The kernel address space: directory + identity tables + one spare.
pub struct AddressSpace {
    directory: PageTable,
    tables: [PageTable; IDENTITY_TABLES],
    /// Backs one directory slot beyond the identity span (boot-stack safety
    /// net; unused when the stack lives below 16 MiB)
    spare: PageTable,
    spare_slot: Option<usize>,
}

impl AddressSpace {
    pub const fn new() -> Self {
        AddressSpace {
            directory: PageTable::new(),
            tables: [PageTable::new(); IDENTITY_TABLES],
            spare: PageTable::new(),
            spare_slot: None,
        }
    }

    /// Zero the directory, then identity-map `[0, IDENTITY_MAP_END)` as
    /// present + writable. Every directory slot past the identity tables
    /// stays zero.
    pub fn identity_map_low(&mut self) {
        self.directory.clear();
        self.spare_slot = None;
        for table_index in 0..IDENTITY_TABLES {
            for entry_index in 0..PAGE_TABLE_ENTRIES {
                let phys = ((table_index * PAGE_TABLE_ENTRIES + entry_index) * FRAME_SIZE) as u32;
                self.tables[table_index].set_entry(entry_index, phys | flags::PRESENT | flags::WRITABLE);
            }
        }
        for table_index in 0..IDENTITY_TABLES {
            let table_phys = &self.tables[table_index] as *const PageTable as usize as u32;
            self.directory
                .set_entry(table_index, table_phys | flags::PRESENT | flags::WRITABLE);
        }
    }

    /// Identity-map every frame overlapping `[start, end)`, present +
    /// writable. Inside the identity span this rewrites the existing
    /// entries; outside it the spare table backs one extra directory slot.
    pub fn map_range(&mut self, start: usize, end: usize) {
        let mut addr = frame_align_down(start);
        while addr < end {
            self.map_page(addr);
            addr += FRAME_SIZE;
        }
    }

    fn map_page(&mut self, addr: usize) {
        let dir_index = addr / DIR_SLOT_SPAN;
        let table_index = (addr / FRAME_SIZE) % PAGE_TABLE_ENTRIES;
        let entry = (addr as u32 & flags::ADDR_MASK) | flags::PRESENT | flags::WRITABLE;

        if dir_index < IDENTITY_TABLES {
            self.tables[dir_index].set_entry(table_index, entry);
            return;
        }
        match self.spare_slot {
            Some(slot) if slot == dir_index => {
                self.spare.set_entry(table_index, entry);
            }
            None => {
                self.spare.clear();
                self.spare.set_entry(table_index, entry);
                let spare_phys = &self.spare as *const PageTable as usize as u32;
                self.directory
                    .set_entry(dir_index, spare_phys | flags::PRESENT | flags::WRITABLE);
                self.spare_slot = Some(dir_index);
            }
            Some(_) => {
                // Cannot happen with the declared boot contract: the stack is
                // one contiguous range, so it touches at most one extra slot.
                log::warn!("paging: cannot map {:#x}, spare table already assigned", addr);
            }
        }
    }

    /// Structure-level translation check (follows this space's own tables,
    /// not CR3).
    pub fn is_mapped(&self, addr: usize) -> bool {
        let dir_index = addr / DIR_SLOT_SPAN;
        let table_index = (addr / FRAME_SIZE) % PAGE_TABLE_ENTRIES;
        if !self.directory.is_present(dir_index) {
            return false;
        }
        if dir_index < IDENTITY_TABLES {
            return self.tables[dir_index].is_present(table_index);
        }
        match self.spare_slot {
            Some(slot) if slot == dir_index => self.spare.is_present(table_index),
            _ => false,
        }
    }

    pub fn directory(&self) -> &PageTable {
        &self.directory
    }

    /// Physical address of the directory for CR3. Valid because the kernel
    /// image (and these statics) sit inside the identity span.
    pub fn directory_phys(&self) -> usize {
        &self.directory as *const PageTable as usize
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// The kernel's single address space
#[cfg(target_arch = "x86")]
static KERNEL_SPACE: Mutex<AddressSpace> = Mutex::new(AddressSpace::new());

#[cfg(target_arch = "x86")]
extern "C" {
    static stack_bottom: u8;
    static stack_top: u8;
}

/// Build the identity map, make sure the boot stack is covered, load CR3,
/// and turn paging on.
#[cfg(target_arch = "x86")]
pub fn init() {
    use ember_arch::cpu;

    let mut space = KERNEL_SPACE.lock();
    space.identity_map_low();

    // The boot contract permits the stack to lie outside the identity span;
    // map it explicitly either way.
    let (bottom, top) = unsafe {
        (
            &stack_bottom as *const u8 as usize,
            &stack_top as *const u8 as usize,
        )
    };
    space.map_range(bottom, top);

    unsafe {
        cpu::write_cr3(space.directory_phys() as u32);
        cpu::enable_paging();
    }
    log::info!(
        "paging: identity-mapped first {} MiB, stack {:#x}..{:#x}, CR0.PG set",
        IDENTITY_MAP_END >> 20,
        bottom,
        top
    );
}

/// Whether CR0.PG is set
#[cfg(target_arch = "x86")]
pub fn is_enabled() -> bool {
    ember_arch::cpu::paging_enabled()
}

/// Fatal page-fault path: one diagnostic line on framebuffer row 22, then a
/// permanent halt with interrupts disabled.
#[cfg(target_arch = "x86")]
pub fn page_fault(err_code: u32, fault_addr: u32) -> ! {
    {
        let mut vga = ember_console::console();
        let mut line = ember_console::LineWriter::new(&mut vga, 22);
        let _ = write!(line, "Page fault at {:08X} err: {:08X}", fault_addr, err_code);
    }
    log::error!(
        "page fault at {:#010x}, error code {:#010x}",
        fault_addr,
        err_code
    );
    ember_arch::cpu::halt_forever()
}

#[cfg(test)]
mod tests {
    use super::*;

    extern crate std;
    use std::boxed::Box;

    fn mapped_space() -> Box<AddressSpace> {
        let mut space = Box::new(AddressSpace::new());
        space.identity_map_low();
        space
    }

    #[test]
    fn identity_entries_cover_low_span() {
        let space = mapped_space();
        // Spot-check translation entries across all four tables
        for addr in [0usize, 0x1000, 0x3F_F000, 0x40_0000, 0xCA_F000, 0xFF_F000] {
            let table = addr / DIR_SLOT_SPAN;
            let entry = space.tables[table].entry((addr / FRAME_SIZE) % PAGE_TABLE_ENTRIES);
            assert_eq!(entry & flags::ADDR_MASK, addr as u32);
            assert_eq!(entry & 0x3, flags::PRESENT | flags::WRITABLE);
            assert!(space.is_mapped(addr));
        }
    }

    #[test]
    fn directory_slots_past_identity_span_are_zero() {
        let space = mapped_space();
        for index in 0..IDENTITY_TABLES {
            assert!(space.directory().is_present(index));
        }
        for index in IDENTITY_TABLES..PAGE_TABLE_ENTRIES {
            assert_eq!(space.directory().entry(index), 0);
        }
    }

    #[test]
    fn addresses_past_identity_span_are_unmapped() {
        let space = mapped_space();
        assert!(!space.is_mapped(IDENTITY_MAP_END));
        assert!(!space.is_mapped(0xDEAD_B000));
    }

    #[test]
    fn stack_range_inside_span_stays_mapped() {
        let mut space = mapped_space();
        space.map_range(0x0030_0000, 0x0030_4000);
        assert!(space.is_mapped(0x0030_0000));
        assert!(space.is_mapped(0x0030_3000));
        assert!(space.spare_slot.is_none());
    }

    #[test]
    fn stack_range_outside_span_uses_spare_table() {
        let mut space = mapped_space();
        let start = IDENTITY_MAP_END + 0x2000;
        space.map_range(start, start + 2 * FRAME_SIZE);
        assert!(space.is_mapped(start));
        assert!(space.is_mapped(start + FRAME_SIZE));
        assert!(!space.is_mapped(start + 2 * FRAME_SIZE));
        assert_eq!(space.spare_slot, Some(start / DIR_SLOT_SPAN));
        // The slot got wired into the directory
        assert!(space.directory().is_present(start / DIR_SLOT_SPAN));
    }

    #[test]
    fn map_range_covers_partial_frames() {
        let mut space = mapped_space();
        let start = IDENTITY_MAP_END + 0x800; // mid-frame
        space.map_range(start, start + FRAME_SIZE);
        assert!(space.is_mapped(frame_align_down(start)));
        assert!(space.is_mapped(start + FRAME_SIZE - 1));
    }
}
