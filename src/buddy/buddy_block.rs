//! Buddy block metadata
//!
//! Every block, free or allocated, starts with a small in-place header. Block
//! links are stored as offsets within the owning page, which is recovered from
//! the block address by masking.

use super::size_class::SizeClass;
use crate::page::page_of;

/// In-place header at the start of every buddy block.
///
/// `next` and `data` are page offsets; offset 0 always belongs to the page
/// header block, so a zero link means "none".
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockHeader {
    size: u16,
    next: u16,
    data: u16,
    _reserved: u16,
}

/// Bytes taken from every block by its header
pub const BLOCK_HEADER_SIZE: usize = core::mem::size_of::<BlockHeader>();

/// Offset of the buddy of the block at `offset` with size `size`.
///
/// Odd-numbered blocks pair with their lower neighbour, even-numbered blocks
/// with their upper one.
#[inline]
pub const fn buddy_offset(offset: usize, size: usize) -> usize {
    if (offset / size) % 2 == 1 {
        offset - size
    } else {
        offset + size
    }
}

/// A block identified by its page and its offset within the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuddyBlock {
    page: usize,
    offset: usize,
}

impl BuddyBlock {
    pub const fn new(page: usize, offset: usize) -> Self {
        Self { page, offset }
    }

    /// Recover a block from the pointer handed out to the caller
    pub const fn from_data_addr(addr: usize) -> Self {
        let block = addr - BLOCK_HEADER_SIZE;
        let page = page_of(block);
        Self {
            page,
            offset: block - page,
        }
    }

    pub const fn page(&self) -> usize {
        self.page
    }

    pub const fn offset(&self) -> usize {
        self.offset
    }

    pub const fn addr(&self) -> usize {
        self.page + self.offset
    }

    /// First usable byte after the header
    pub const fn data_addr(&self) -> usize {
        self.addr() + BLOCK_HEADER_SIZE
    }

    /// The block this one merges with when both are free
    pub const fn buddy(&self, class: SizeClass) -> Self {
        Self {
            page: self.page,
            offset: buddy_offset(self.offset, class.size()),
        }
    }

    fn header(&self) -> &BlockHeader {
        unsafe { &*(self.addr() as *const BlockHeader) }
    }

    fn header_mut(&mut self) -> &mut BlockHeader {
        unsafe { &mut *(self.addr() as *mut BlockHeader) }
    }

    /// Stamp a fresh header for a block of `class`
    pub(crate) fn write_header(&mut self, class: SizeClass, next: Option<usize>) {
        debug_assert!(
            crate::is_aligned(self.offset, class.size()),
            "block offset {:#x} not aligned to class {}",
            self.offset,
            class.size()
        );
        let data = (self.offset + BLOCK_HEADER_SIZE) as u16;
        *self.header_mut() = BlockHeader {
            size: class.size() as u16,
            next: next.unwrap_or(0) as u16,
            data,
            _reserved: 0,
        };
    }

    /// Size recorded in the header
    pub fn size(&self) -> usize {
        self.header().size as usize
    }

    /// Cached offset of the first usable byte
    pub fn data_offset(&self) -> usize {
        self.header().data as usize
    }

    pub(crate) fn next(&self) -> Option<usize> {
        match self.header().next {
            0 => None,
            next => Some(next as usize),
        }
    }

    pub(crate) fn set_next(&mut self, next: Option<usize>) {
        self.header_mut().next = next.unwrap_or(0) as u16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PAGE_SIZE;

    #[test]
    fn test_header_is_compact() {
        assert_eq!(BLOCK_HEADER_SIZE, 8);
    }

    #[test]
    fn test_buddy_offset_is_involution() {
        for class in SizeClass::all() {
            let size = class.size();
            let mut offset = 0;
            while offset < PAGE_SIZE {
                let buddy = buddy_offset(offset, size);
                assert_eq!(buddy_offset(buddy, size), offset);
                assert_eq!(buddy, offset ^ size);
                offset += size;
            }
        }
    }

    #[test]
    fn test_from_data_addr() {
        let page = 5 * PAGE_SIZE;
        let block = BuddyBlock::new(page, 256);
        let recovered = BuddyBlock::from_data_addr(block.data_addr());
        assert_eq!(recovered, block);
        assert_eq!(recovered.page(), page);
        // 256 is the upper half of [0, 512), 512 the lower half of [512, 1024)
        assert_eq!(block.buddy(SizeClass::Bytes256).offset(), 0);
        assert_eq!(block.buddy(SizeClass::Bytes128).offset(), 384);
        let even = BuddyBlock::new(page, 512);
        assert_eq!(even.buddy(SizeClass::Bytes256).offset(), 768);
        assert_eq!(buddy_offset(768, 256), 512);
    }
}
