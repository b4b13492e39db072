//! Buddy allocation policy
//!
//! This module provides a page-local buddy system with:
//! - Power-of-two size classes from 32 bytes to a whole page
//! - Address-sorted per-class free lists stored inside the free blocks
//! - Recursive buddy merging and reclamation of empty pages
//! - Detailed statistics and debugging

pub mod buddy_allocator;
pub mod buddy_block;
pub mod buddy_page;
pub mod free_list;
pub mod size_class;
#[cfg(feature = "tracking")]
pub mod stats;

pub use buddy_allocator::{BuddyAllocator, PageIter};
pub use buddy_block::{buddy_offset, BuddyBlock, BLOCK_HEADER_SIZE};
pub use buddy_page::{BuddyPage, HEADER_CLASS, PAGE_HEADER_SIZE};
pub use free_list::FreeListIter;
pub use size_class::SizeClass;
#[cfg(feature = "tracking")]
pub use stats::BuddyStats;
