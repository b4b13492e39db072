//! Per-page header for the buddy policy.
//!
//! The header lives inside the first block of its own page (offset 0), right
//! after that block's [`BlockHeader`](super::buddy_block::BlockHeader). It
//! links pages into a singly linked list and holds one free-list head per
//! size class.

use super::buddy_block::BLOCK_HEADER_SIZE;
use super::size_class::SizeClass;
use crate::page::{page_of, PageHandle};

#[repr(C)]
pub(crate) struct PageHeader {
    magic: u32,
    live: u16,
    _reserved: u16,
    page: usize,
    next: usize,
    free_heads: [u16; SizeClass::COUNT],
}

const PAGE_HEADER_MAGIC: u32 = 0x4b4d_4142;

/// Bytes taken by the page header, not counting its block header
pub const PAGE_HEADER_SIZE: usize = core::mem::size_of::<PageHeader>();

/// Class of the block reserved for the page header at offset 0
pub const HEADER_CLASS: SizeClass = SizeClass::Bytes64;

const _: () = assert!(BLOCK_HEADER_SIZE + PAGE_HEADER_SIZE <= HEADER_CLASS.size());
const _: () = assert!(BLOCK_HEADER_SIZE + PAGE_HEADER_SIZE > HEADER_CLASS.size() / 2);

/// View over a page formatted by the buddy policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuddyPage {
    base: usize,
}

impl BuddyPage {
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    /// The page holding `addr`
    pub const fn containing(addr: usize) -> Self {
        Self {
            base: page_of(addr),
        }
    }

    pub const fn base(&self) -> usize {
        self.base
    }

    pub const fn handle(&self) -> PageHandle {
        PageHandle::containing(self.base)
    }

    fn header(&self) -> &PageHeader {
        unsafe { &*((self.base + BLOCK_HEADER_SIZE) as *const PageHeader) }
    }

    fn header_mut(&mut self) -> &mut PageHeader {
        unsafe { &mut *((self.base + BLOCK_HEADER_SIZE) as *mut PageHeader) }
    }

    /// Write an empty page header into a freshly acquired page
    pub(crate) fn format(page: PageHandle) -> Self {
        let mut this = Self::new(page.addr());
        *this.header_mut() = PageHeader {
            magic: PAGE_HEADER_MAGIC,
            live: 0,
            _reserved: 0,
            page: page.addr(),
            next: 0,
            free_heads: [0; SizeClass::COUNT],
        };
        this
    }

    pub fn is_valid(&self) -> bool {
        let header = self.header();
        header.magic == PAGE_HEADER_MAGIC && header.page == self.base
    }

    /// Number of live allocations on this page
    pub fn live(&self) -> usize {
        self.header().live as usize
    }

    pub(crate) fn inc_live(&mut self) {
        self.header_mut().live += 1;
    }

    /// Decrement the live counter, returning the new value
    pub(crate) fn dec_live(&mut self) -> usize {
        let header = self.header_mut();
        debug_assert!(header.live > 0, "release on page without live blocks");
        header.live = header.live.saturating_sub(1);
        header.live as usize
    }

    pub fn next_page(&self) -> Option<BuddyPage> {
        match self.header().next {
            0 => None,
            next => Some(BuddyPage::new(next)),
        }
    }

    pub(crate) fn set_next_page(&mut self, next: Option<BuddyPage>) {
        self.header_mut().next = next.map_or(0, |page| page.base);
    }

    pub(crate) fn head(&self, class: SizeClass) -> Option<usize> {
        match self.header().free_heads[class.to_index()] {
            0 => None,
            head => Some(head as usize),
        }
    }

    pub(crate) fn set_head(&mut self, class: SizeClass, head: Option<usize>) {
        self.header_mut().free_heads[class.to_index()] = head.unwrap_or(0) as u16;
    }
}
