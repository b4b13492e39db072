//! Resource-map allocation policy
//!
//! A single first-fit free list ordered by address spans every page held.
//! Free blocks carry their size in place, so releases merge with their
//! neighbours without any side table.

pub mod free_block;
pub mod free_list;
pub mod rm_allocator;
#[cfg(feature = "tracking")]
pub mod stats;

pub use free_block::{granule, FreeBlock, MapPage, FREE_HEADER_SIZE, MAP_PAGE_HEADER_SIZE, PAGE_CAPACITY};
pub use free_list::{AddressOrderedIter, AddressOrderedList};
pub use rm_allocator::{MapPageIter, ResourceMapAllocator};
#[cfg(feature = "tracking")]
pub use stats::ResourceMapStats;
