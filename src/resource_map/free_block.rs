//! In-place headers for the resource-map policy.
//!
//! A page starts with a [`MapPageHeader`] linking it into the page list. The
//! rest of the page is carved into allocated runs and free blocks; every free
//! block starts with a [`FreeHeader`] holding its size and the address of the
//! next free block, in ascending address order across all pages.

use crate::page::{page_of, PageHandle};
use crate::PAGE_SIZE;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct FreeHeader {
    size: usize,
    next: usize,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct MapPageHeader {
    page: usize,
    next: usize,
}

/// Bytes needed to describe a free block; also the allocation granularity
pub const FREE_HEADER_SIZE: usize = core::mem::size_of::<FreeHeader>();

/// Bytes reserved at the start of each page for the page header
pub const MAP_PAGE_HEADER_SIZE: usize = core::mem::size_of::<MapPageHeader>();

/// Usable bytes per page
pub const PAGE_CAPACITY: usize = PAGE_SIZE - MAP_PAGE_HEADER_SIZE;

const _: () = assert!(crate::is_aligned(MAP_PAGE_HEADER_SIZE, FREE_HEADER_SIZE));
const _: () = assert!(crate::is_aligned(PAGE_CAPACITY, FREE_HEADER_SIZE));

/// Round a request up to the allocation granularity
#[inline]
pub const fn granule(size: usize) -> usize {
    crate::align_up(size, FREE_HEADER_SIZE)
}

/// View over a free block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock {
    addr: usize,
}

impl FreeBlock {
    pub const fn new(addr: usize) -> Self {
        Self { addr }
    }

    pub const fn addr(&self) -> usize {
        self.addr
    }

    pub const fn page(&self) -> usize {
        page_of(self.addr)
    }

    fn header(&self) -> &FreeHeader {
        unsafe { &*(self.addr as *const FreeHeader) }
    }

    fn header_mut(&mut self) -> &mut FreeHeader {
        unsafe { &mut *(self.addr as *mut FreeHeader) }
    }

    /// Stamp a header describing `size` bytes at this address
    pub(crate) fn write_header(&mut self, size: usize, next: Option<FreeBlock>) {
        debug_assert!(size >= FREE_HEADER_SIZE);
        debug_assert!(self.addr - self.page() >= MAP_PAGE_HEADER_SIZE);
        debug_assert!(self.addr - self.page() + size <= PAGE_SIZE);
        *self.header_mut() = FreeHeader {
            size,
            next: next.map_or(0, |block| block.addr),
        };
    }

    pub fn size(&self) -> usize {
        self.header().size
    }

    pub(crate) fn set_size(&mut self, size: usize) {
        self.header_mut().size = size;
    }

    /// One past the last byte of the block
    pub fn end(&self) -> usize {
        self.addr + self.size()
    }

    pub fn next(&self) -> Option<FreeBlock> {
        match self.header().next {
            0 => None,
            next => Some(FreeBlock::new(next)),
        }
    }

    pub(crate) fn set_next(&mut self, next: Option<FreeBlock>) {
        self.header_mut().next = next.map_or(0, |block| block.addr);
    }

    /// Whether `next` starts right where this block ends, on the same page
    pub fn touches(&self, next: FreeBlock) -> bool {
        self.end() == next.addr && self.page() == next.page()
    }

    /// Whether this block spans every usable byte of its page
    pub fn covers_page(&self) -> bool {
        self.addr == self.page() + MAP_PAGE_HEADER_SIZE && self.size() == PAGE_CAPACITY
    }
}

/// View over a page formatted by the resource-map policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapPage {
    base: usize,
}

impl MapPage {
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    pub const fn base(&self) -> usize {
        self.base
    }

    pub const fn handle(&self) -> PageHandle {
        PageHandle::containing(self.base)
    }

    fn header(&self) -> &MapPageHeader {
        unsafe { &*(self.base as *const MapPageHeader) }
    }

    fn header_mut(&mut self) -> &mut MapPageHeader {
        unsafe { &mut *(self.base as *mut MapPageHeader) }
    }

    /// Write the page header into a freshly acquired page
    pub(crate) fn format(page: PageHandle) -> Self {
        let mut this = Self::new(page.addr());
        *this.header_mut() = MapPageHeader {
            page: page.addr(),
            next: 0,
        };
        this
    }

    pub fn is_valid(&self) -> bool {
        self.header().page == self.base
    }

    /// The free block covering the whole usable area
    pub const fn first_block(&self) -> FreeBlock {
        FreeBlock::new(self.base + MAP_PAGE_HEADER_SIZE)
    }

    pub fn next_page(&self) -> Option<MapPage> {
        match self.header().next {
            0 => None,
            next => Some(MapPage::new(next)),
        }
    }

    pub(crate) fn set_next_page(&mut self, next: Option<MapPage>) {
        self.header_mut().next = next.map_or(0, |page| page.base);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{PageProvider, SystemPageProvider};

    #[test]
    fn test_layout_constants() {
        assert_eq!(FREE_HEADER_SIZE, 16);
        assert_eq!(PAGE_CAPACITY, PAGE_SIZE - 16);
        assert_eq!(granule(1), 16);
        assert_eq!(granule(16), 16);
        assert_eq!(granule(4000), 4000);
        assert_eq!(granule(4001), 4016);
    }

    #[test]
    fn test_block_header_round_trip() {
        let mut provider = SystemPageProvider::new();
        let handle = provider.acquire_page().unwrap();
        let page = MapPage::format(handle);
        assert!(page.is_valid());

        let mut first = page.first_block();
        let mut second = FreeBlock::new(first.addr() + 64);
        second.write_header(128, None);
        first.write_header(64, Some(second));

        assert_eq!(first.next(), Some(second));
        assert!(first.touches(second));
        assert!(!second.touches(first));
        assert_eq!(second.end(), first.addr() + 192);
        assert!(!first.covers_page());

        first.write_header(PAGE_CAPACITY, None);
        assert!(first.covers_page());

        provider.release_page(handle);
    }
}
