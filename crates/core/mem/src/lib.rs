//! EmberOS Memory Management
//!
//! Three allocators layered over a statically known physical map:
//! - [`pmm`]: one bit per 4 KiB frame across the first 32 MiB
//! - [`paging`]: identity map of the first 16 MiB behind a directory and four
//!   page tables, enabled once at boot
//! - [`heap`]: a first-fit free-list over the fixed 128 KiB kernel heap
//!
//! All three are process-wide singletons with a two-phase lifecycle:
//! uninitialized before `kernel_main` calls their `init`, live afterwards.

#![no_std]

pub mod heap;
pub mod layout;
pub mod paging;
pub mod pmm;
