//! Address-ordered free list spanning every page of a resource map.

#[cfg(feature = "log")]
use log::trace;

use super::free_block::{FreeBlock, FREE_HEADER_SIZE};

/// Singly linked list of free blocks sorted by ascending address
pub struct AddressOrderedList {
    head: Option<FreeBlock>,
    len: usize,
}

impl AddressOrderedList {
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn iter(&self) -> AddressOrderedIter {
        AddressOrderedIter {
            current: self.head,
            remaining: self.len,
        }
    }

    fn link_after(&mut self, prev: Option<FreeBlock>, next: Option<FreeBlock>) {
        match prev {
            Some(mut prev) => prev.set_next(next),
            None => self.head = next,
        }
    }

    /// Record `size` free bytes at `addr`, ahead of the first block with a
    /// greater address (or at the tail).
    pub(crate) fn insert_sorted(&mut self, addr: usize, size: usize) -> FreeBlock {
        let mut prev = None;
        let mut current = self.head;

        while let Some(block) = current {
            debug_assert_ne!(block.addr(), addr, "block {:#x} already free", addr);
            if block.addr() > addr {
                break;
            }
            prev = current;
            current = block.next();
        }

        let mut block = FreeBlock::new(addr);
        block.write_header(size, current);
        self.link_after(prev, Some(block));
        self.len += 1;
        block
    }

    /// First-fit: carve `size` bytes from the first block large enough.
    ///
    /// A block whose remainder would be smaller than a header is taken whole;
    /// otherwise the low part is handed out and a header for the remainder is
    /// written right after it, keeping the block's place in the list.
    pub(crate) fn take_first_fit(&mut self, size: usize) -> Option<usize> {
        let mut prev = None;
        let mut current = self.head;

        while let Some(block) = current {
            let available = block.size();
            if available >= size {
                let next = block.next();
                if available - size < FREE_HEADER_SIZE {
                    self.link_after(prev, next);
                    self.len -= 1;
                } else {
                    let mut rest = FreeBlock::new(block.addr() + size);
                    rest.write_header(available - size, next);
                    self.link_after(prev, Some(rest));
                }
                return Some(block.addr());
            }
            prev = current;
            current = block.next();
        }
        None
    }

    /// Merge address-adjacent blocks on the same page until a full pass
    /// finds nothing to merge. Returns the number of merges.
    pub(crate) fn coalesce(&mut self) -> usize {
        let mut merges = 0;
        loop {
            let mut merged = false;
            let mut current = self.head;

            while let Some(mut block) = current {
                match block.next() {
                    Some(next) if block.touches(next) => {
                        trace!(
                            "resource map: merge {:#x}+{} with {:#x}+{}",
                            block.addr(),
                            block.size(),
                            next.addr(),
                            next.size()
                        );
                        block.set_size(block.size() + next.size());
                        block.set_next(next.next());
                        self.len -= 1;
                        merges += 1;
                        merged = true;
                    }
                    next => current = next,
                }
            }

            if !merged {
                return merges;
            }
        }
    }

    /// Unlink `target` from the list. Returns false if it was not linked.
    pub(crate) fn remove(&mut self, target: FreeBlock) -> bool {
        let mut prev = None;
        let mut current = self.head;

        while let Some(block) = current {
            if block == target {
                self.link_after(prev, block.next());
                self.len -= 1;
                return true;
            }
            if block.addr() > target.addr() {
                break;
            }
            prev = current;
            current = block.next();
        }
        false
    }
}

impl Default for AddressOrderedList {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the free list, yielding blocks in address order
pub struct AddressOrderedIter {
    current: Option<FreeBlock>,
    remaining: usize,
}

impl Iterator for AddressOrderedIter {
    type Item = FreeBlock;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.current?;
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.current = block.next();
        Some(block)
    }
}
