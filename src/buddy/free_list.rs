//! Per-class free lists threaded through free blocks
//!
//! Each list is kept sorted by ascending offset so that a block and its upper
//! buddy, when both free, sit next to each other.

#[cfg(feature = "log")]
use log::error;

use super::buddy_block::{buddy_offset, BuddyBlock};
use super::buddy_page::BuddyPage;
use super::size_class::SizeClass;
use crate::PAGE_SIZE;

/// Upper bound on list length, used to detect corrupted links
const MAX_LIST_LEN: usize = PAGE_SIZE / SizeClass::MIN.size();

impl BuddyPage {
    fn block(&self, offset: usize) -> BuddyBlock {
        BuddyBlock::new(self.base(), offset)
    }

    /// Pop the lowest-addressed free block of exactly `class`
    pub(crate) fn pop_front(&mut self, class: SizeClass) -> Option<usize> {
        let head = self.head(class)?;
        let next = self.block(head).next();
        self.set_head(class, next);
        Some(head)
    }

    /// Insert a free block into its class list at its address-ordered position
    pub(crate) fn insert_sorted(&mut self, offset: usize, class: SizeClass) {
        debug_assert!(offset + class.size() <= PAGE_SIZE);

        let mut prev = None;
        let mut current = self.head(class);
        let mut visited = 0;

        while let Some(off) = current {
            debug_assert_ne!(off, offset, "block {:#x} already free", offset);
            if off > offset || visited > MAX_LIST_LEN {
                break;
            }
            prev = current;
            current = self.block(off).next();
            visited += 1;
        }

        if visited > MAX_LIST_LEN {
            error!("Potential cycle detected during insert");
        }

        self.block(offset).write_header(class, current);
        match prev {
            Some(prev) => self.block(prev).set_next(Some(offset)),
            None => self.set_head(class, Some(offset)),
        }
    }

    /// Find the first block whose buddy directly follows it in the list,
    /// unlink both and return the lower offset.
    pub(crate) fn take_buddy_pair(&mut self, class: SizeClass) -> Option<usize> {
        let mut prev = None;
        let mut current = self.head(class);
        let mut visited = 0;

        while let Some(off) = current {
            if visited > MAX_LIST_LEN {
                error!("Potential cycle detected during buddy search");
                return None;
            }
            let next = self.block(off).next();
            if let Some(next_off) = next {
                if buddy_offset(off, class.size()) == next_off {
                    let after = self.block(next_off).next();
                    match prev {
                        Some(prev) => self.block(prev).set_next(after),
                        None => self.set_head(class, after),
                    }
                    return Some(off);
                }
            }
            prev = current;
            current = next;
            visited += 1;
        }
        None
    }

    /// Iterate the offsets of the free blocks of `class`
    pub fn iter(&self, class: SizeClass) -> FreeListIter {
        FreeListIter {
            page: *self,
            current: self.head(class),
            remaining: MAX_LIST_LEN,
        }
    }

    /// Number of free blocks of `class`
    pub fn len(&self, class: SizeClass) -> usize {
        self.iter(class).count()
    }

    /// Total bytes held in free lists on this page
    pub fn free_bytes(&self) -> usize {
        SizeClass::all()
            .map(|class| self.len(class) * class.size())
            .sum()
    }
}

/// Iterator over one class list of a page, yielding block offsets
pub struct FreeListIter {
    page: BuddyPage,
    current: Option<usize>,
    remaining: usize,
}

impl Iterator for FreeListIter {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.current?;
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.current = BuddyBlock::new(self.page.base(), offset).next();
        Some(offset)
    }
}
