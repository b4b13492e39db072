//! Resource-map allocator over provider pages
//!
//! Free space across all pages is tracked by one address-ordered list. A
//! request takes the first block large enough, splitting off the remainder.
//! Released blocks are put back in address order and merged with touching
//! neighbours; pages that end up completely free go back to the provider.

use core::ptr::NonNull;

#[cfg(feature = "log")]
use log::{debug, error, warn};

use super::free_block::{granule, FreeBlock, MapPage, FREE_HEADER_SIZE, PAGE_CAPACITY};
use super::free_list::{AddressOrderedIter, AddressOrderedList};
use crate::page::{page_of, PageHandle, PageProvider, SystemPageProvider};
use crate::{AllocError, AllocResult, KernelAllocator, PAGE_SIZE};

#[cfg(feature = "tracking")]
use super::stats::{MemoryStatsReporter, ResourceMapStats};

/// First-fit allocator drawing pages from a [`PageProvider`]
pub struct ResourceMapAllocator<P: PageProvider = SystemPageProvider> {
    provider: P,
    free_list: AddressOrderedList,
    first_page: Option<MapPage>,
    pages_held: usize,
    bytes_requested: usize,
}

impl<P: PageProvider> ResourceMapAllocator<P> {
    pub const fn new(provider: P) -> Self {
        Self {
            provider,
            free_list: AddressOrderedList::new(),
            first_page: None,
            pages_held: 0,
            bytes_requested: 0,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    /// Iterate the free list in address order
    pub fn free_blocks(&self) -> AddressOrderedIter {
        self.free_list.iter()
    }

    /// Iterate the page list in link order
    pub fn pages(&self) -> MapPageIter {
        MapPageIter {
            current: self.first_page,
            remaining: self.pages_held,
        }
    }

    #[allow(unused_variables)]
    fn acquire_page(&mut self, request_size: usize) -> AllocResult<PageHandle> {
        self.provider.acquire_page().map_err(|err| {
            error!(
                "resource map: provider failed for {} byte request: {}",
                request_size, err
            );
            #[cfg(feature = "tracking")]
            MemoryStatsReporter::print_alloc_failure_stats(&self.get_stats(), request_size);
            err
        })
    }

    /// Acquire a page, link it at the tail of the page list and add its
    /// usable area to the free list as a single block.
    fn grow(&mut self, request_size: usize) -> AllocResult<()> {
        let handle = self.acquire_page(request_size)?;
        let page = MapPage::format(handle);

        match self.pages().last() {
            Some(mut last) => last.set_next_page(Some(page)),
            None => self.first_page = Some(page),
        }
        self.pages_held += 1;

        self.free_list
            .insert_sorted(page.first_block().addr(), PAGE_CAPACITY);

        debug!(
            "resource map: linked page {:#x}, {} pages held",
            page.base(),
            self.pages_held
        );
        Ok(())
    }

    /// Merge touching free blocks until nothing more merges.
    ///
    /// Returns the number of merges; zero on an already merged list.
    pub fn coalesce(&mut self) -> usize {
        self.free_list.coalesce()
    }

    /// Return every completely free page to the provider.
    ///
    /// Returns the number of pages released.
    pub fn reclaim_empty_pages(&mut self) -> usize {
        let mut reclaimed = 0;
        while let Some(block) = self.free_list.iter().find(FreeBlock::covers_page) {
            self.free_list.remove(block);
            self.unlink_page(MapPage::new(block.page()));
            reclaimed += 1;
        }
        reclaimed
    }

    fn unlink_page(&mut self, page: MapPage) {
        let next = page.next_page();
        if self.first_page == Some(page) {
            self.first_page = next;
        } else {
            let mut pages = self.pages();
            while let Some(mut prev) = pages.next() {
                if prev.next_page() == Some(page) {
                    prev.set_next_page(next);
                    break;
                }
            }
        }
        self.pages_held -= 1;

        debug!(
            "resource map: returning page {:#x}, {} pages held",
            page.base(),
            self.pages_held
        );
        self.provider.release_page(page.handle());
    }

    /// Resource-map statistics
    #[cfg(feature = "tracking")]
    pub fn get_stats(&self) -> ResourceMapStats {
        let mut stats = ResourceMapStats::new();
        stats.pages_held = self.pages_held;
        stats.bytes_requested = self.bytes_requested;
        for block in self.free_list.iter() {
            stats.free_blocks += 1;
            stats.free_bytes += block.size();
            stats.largest_free = stats.largest_free.max(block.size());
        }
        stats
    }

    /// Check the free list and page list against the resource-map invariants.
    ///
    /// # Panics
    ///
    /// Panics with a description of the first violated invariant.
    pub fn check_integrity(&self) {
        let mut pages = 0;
        for page in self.pages() {
            pages += 1;
            assert!(page.is_valid(), "page {:#x}: corrupted header", page.base());
        }
        assert_eq!(pages, self.pages_held, "page list length mismatch");

        let mut count = 0;
        let mut prev: Option<FreeBlock> = None;
        for block in self.free_list.iter() {
            count += 1;
            let page = MapPage::new(page_of(block.addr()));
            assert!(
                self.pages().any(|held| held == page),
                "block {:#x}: page not held",
                block.addr()
            );
            assert!(
                block.addr() >= page.first_block().addr() && block.end() <= page.base() + PAGE_SIZE,
                "block {:#x}: out of page bounds",
                block.addr()
            );
            assert!(
                block.size() >= FREE_HEADER_SIZE && block.size() % FREE_HEADER_SIZE == 0,
                "block {:#x}: bad size {}",
                block.addr(),
                block.size()
            );
            assert!(!block.covers_page(), "block {:#x}: empty page kept", block.addr());
            if let Some(prev) = prev {
                assert!(prev.end() <= block.addr(), "free list not sorted or overlapping");
                assert!(
                    !prev.touches(block),
                    "blocks {:#x} and {:#x} not merged",
                    prev.addr(),
                    block.addr()
                );
            }
            prev = Some(block);
        }
        assert_eq!(count, self.free_list.len(), "free list length mismatch");
    }
}

impl<P: PageProvider> KernelAllocator for ResourceMapAllocator<P> {
    const ALIGN: usize = FREE_HEADER_SIZE;

    fn allocate(&mut self, size: usize) -> AllocResult<NonNull<u8>> {
        if size == 0 {
            return Err(AllocError::InvalidParam);
        }
        if size > PAGE_CAPACITY {
            warn!("resource map: {} byte request exceeds page capacity", size);
            return Err(AllocError::OversizeRequest);
        }

        let need = granule(size);
        let addr = match self.free_list.take_first_fit(need) {
            Some(addr) => addr,
            None => {
                self.grow(size)?;
                self.free_list
                    .take_first_fit(need)
                    .ok_or(AllocError::OversizeRequest)?
            }
        };
        self.bytes_requested += size;

        Ok(unsafe { NonNull::new_unchecked(addr as *mut u8) })
    }

    fn release(&mut self, ptr: NonNull<u8>, size: usize) {
        let addr = ptr.as_ptr() as usize;
        if size == 0 || size > PAGE_CAPACITY {
            error!("resource map: release of {} bytes at {:#x}", size, addr);
            return;
        }
        debug_assert!(
            self.pages().any(|page| page.base() == page_of(addr)),
            "release of {:#x} outside held pages",
            addr
        );

        self.free_list.insert_sorted(addr, granule(size));
        self.bytes_requested = self.bytes_requested.saturating_sub(size);
        self.coalesce();
        self.reclaim_empty_pages();
    }

    fn pages_held(&self) -> usize {
        self.pages_held
    }

    fn bytes_requested(&self) -> usize {
        self.bytes_requested
    }
}

impl Default for ResourceMapAllocator {
    fn default() -> Self {
        Self::new(SystemPageProvider::new())
    }
}

/// Iterator over the page list
pub struct MapPageIter {
    current: Option<MapPage>,
    remaining: usize,
}

impl Iterator for MapPageIter {
    type Item = MapPage;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.current?;
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.current = page.next_page();
        Some(page)
    }
}
