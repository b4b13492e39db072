//! Buddy allocator over provider pages
//!
//! Each page is split into power-of-two blocks between 32 bytes and the page
//! size. Pages are chained through their headers; a request is served from the
//! smallest class that has a free block on any page, splitting it down as
//! needed. Freed blocks merge with their buddy, and a page whose last live
//! block is released goes back to the provider.

use core::ptr::NonNull;

#[cfg(feature = "log")]
use log::{debug, error, trace, warn};

use super::buddy_block::{BuddyBlock, BLOCK_HEADER_SIZE};
use super::buddy_page::{BuddyPage, HEADER_CLASS};
use super::free_list::FreeListIter;
use super::size_class::SizeClass;
use crate::page::{PageHandle, PageProvider, SystemPageProvider};
use crate::{AllocError, AllocResult, KernelAllocator, PAGE_SIZE};

#[cfg(feature = "tracking")]
use super::stats::{BuddyStats, MemoryStatsReporter};

/// Buddy allocator drawing pages from a [`PageProvider`]
pub struct BuddyAllocator<P: PageProvider = SystemPageProvider> {
    provider: P,
    first_page: Option<BuddyPage>,
    linked_pages: usize,
    whole_pages: usize,
    bytes_requested: usize,
}

impl<P: PageProvider> BuddyAllocator<P> {
    pub const fn new(provider: P) -> Self {
        Self {
            provider,
            first_page: None,
            linked_pages: 0,
            whole_pages: 0,
            bytes_requested: 0,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    /// Number of pages in the page list (whole-page allocations excluded)
    pub fn page_count(&self) -> usize {
        self.linked_pages
    }

    /// Iterate the page list in link order
    pub fn pages(&self) -> PageIter {
        PageIter {
            current: self.first_page,
            remaining: self.linked_pages,
        }
    }

    /// Base address of the `index`-th page in the page list
    pub fn page_base(&self, index: usize) -> Option<usize> {
        self.pages().nth(index).map(|page| page.base())
    }

    /// Live allocations on the `index`-th page
    pub fn live_blocks(&self, index: usize) -> Option<usize> {
        self.pages().nth(index).map(|page| page.live())
    }

    /// Free block offsets of `class` on the `index`-th page, lowest first
    pub fn free_blocks(&self, index: usize, class: SizeClass) -> Option<FreeListIter> {
        self.pages().nth(index).map(|page| page.iter(class))
    }

    #[allow(unused_variables)]
    fn acquire_page(&mut self, request_size: usize) -> AllocResult<PageHandle> {
        self.provider.acquire_page().map_err(|err| {
            error!(
                "buddy allocator: provider failed for {} byte request: {}",
                request_size, err
            );
            #[cfg(feature = "tracking")]
            MemoryStatsReporter::print_alloc_failure_stats(&self.get_stats(), request_size);
            err
        })
    }

    /// Split the block at `offset` from `from` down to `to`, pushing every
    /// upper half onto its class list. The lower half is kept each time.
    fn split_block(mut page: BuddyPage, offset: usize, from: SizeClass, to: SizeClass) -> BuddyBlock {
        let mut class = from;
        while class > to {
            let Some(half) = class.half() else {
                break;
            };
            page.insert_sorted(offset + half.size(), half);
            trace!(
                "buddy allocator: split {:#x}+{:#x} into two {} byte halves",
                page.base(),
                offset,
                half.size()
            );
            class = half;
        }

        let mut block = BuddyBlock::new(page.base(), offset);
        block.write_header(class, None);
        block
    }

    /// Take a block of `class` from a single page, splitting larger ones.
    fn take_from_page(page: BuddyPage, class: SizeClass) -> Option<BuddyBlock> {
        let mut page = page;
        for search in class.upward() {
            if let Some(offset) = page.pop_front(search) {
                return Some(Self::split_block(page, offset, search, class));
            }
        }
        None
    }

    /// Search every page at one class before moving up to the next class.
    fn take_free_block(&mut self, class: SizeClass) -> Option<BuddyBlock> {
        for search in class.upward() {
            if search == SizeClass::MAX {
                break;
            }
            let mut pages = self.pages();
            while let Some(mut page) = pages.next() {
                if let Some(offset) = page.pop_front(search) {
                    let block = Self::split_block(page, offset, search, class);
                    page.inc_live();
                    return Some(block);
                }
            }
        }
        None
    }

    /// Acquire and format a page, then link it at the tail of the page list.
    fn grow(&mut self, request_size: usize) -> AllocResult<BuddyPage> {
        let handle = self.acquire_page(request_size)?;
        let page = BuddyPage::format(handle);

        // The page header claims the lowest block by splitting the whole page
        // down to its class. Offset 0 is never linked into a free list.
        Self::split_block(page, 0, SizeClass::MAX, HEADER_CLASS);

        match self.pages().last() {
            Some(mut last) => last.set_next_page(Some(page)),
            None => self.first_page = Some(page),
        }
        self.linked_pages += 1;

        debug!(
            "buddy allocator: linked page {:#x}, {} pages in list",
            page.base(),
            self.linked_pages
        );
        Ok(page)
    }

    fn alloc_block(&mut self, class: SizeClass, request_size: usize) -> AllocResult<BuddyBlock> {
        if let Some(block) = self.take_free_block(class) {
            return Ok(block);
        }

        let mut page = self.grow(request_size)?;
        let Some(block) = Self::take_from_page(page, class) else {
            // Unlink the untouched page
            self.reclaim_page(page);
            return Err(AllocError::OversizeRequest);
        };
        page.inc_live();
        Ok(block)
    }

    /// Hand out a dedicated page without a page header.
    fn alloc_whole_page(&mut self, request_size: usize) -> AllocResult<BuddyBlock> {
        let handle = self.acquire_page(request_size)?;
        let mut block = BuddyBlock::new(handle.addr(), 0);
        block.write_header(SizeClass::MAX, None);
        self.whole_pages += 1;

        debug!("buddy allocator: whole page {:#x}", handle.addr());
        Ok(block)
    }

    /// Return a free block to its class list and merge it with its buddy.
    fn free_block(page: BuddyPage, offset: usize, class: SizeClass) {
        let mut page = page;
        page.insert_sorted(offset, class);
        Self::coalesce(page);
    }

    /// Merge the first free buddy pair found, smallest class first.
    ///
    /// Only one merge happens per call; the merged block is freed again
    /// through [`free_block`](Self::free_block), which coalesces once more, so
    /// merges cascade up the classes one level per recursion.
    fn coalesce(page: BuddyPage) -> bool {
        let mut page = page;
        for class in SizeClass::all() {
            if class == SizeClass::MAX {
                break;
            }
            if let Some(offset) = page.take_buddy_pair(class) {
                let Some(merged) = class.double() else {
                    break;
                };
                debug_assert!(merged < SizeClass::MAX, "page header block was merged");
                trace!(
                    "buddy allocator: merged {:#x}+{:#x} into {} bytes",
                    page.base(),
                    offset,
                    merged.size()
                );
                Self::free_block(page, offset, merged);
                return true;
            }
        }
        false
    }

    /// Run coalescing on the `index`-th page.
    ///
    /// Returns whether a merge took place. On a fully merged page this is a
    /// no-op.
    pub fn coalesce_page(&mut self, index: usize) -> bool {
        match self.pages().nth(index) {
            Some(page) => Self::coalesce(page),
            None => false,
        }
    }

    /// Unlink an empty page and hand it back to the provider.
    fn reclaim_page(&mut self, page: BuddyPage) {
        debug_assert_eq!(
            page.free_bytes(),
            PAGE_SIZE - HEADER_CLASS.size(),
            "empty page {:#x} is not fully merged",
            page.base()
        );

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
        self.linked_pages -= 1;

        debug!(
            "buddy allocator: returning page {:#x}, {} pages in list",
            page.base(),
            self.linked_pages
        );
        self.provider.release_page(page.handle());
    }

    /// Buddy allocator statistics
    #[cfg(feature = "tracking")]
    pub fn get_stats(&self) -> BuddyStats {
        let mut stats = BuddyStats::new();
        stats.pages_held = self.pages_held();
        stats.whole_pages = self.whole_pages;
        stats.bytes_requested = self.bytes_requested;

        for page in self.pages() {
            stats.live_blocks += page.live();
            for class in SizeClass::all() {
                let count = page.len(class);
                stats.free_blocks_by_class[class.to_index()] += count;
                stats.free_bytes += count * class.size();
            }
        }
        stats
    }

    /// Check every page's free lists against the buddy invariants.
    ///
    /// # Panics
    ///
    /// Panics with a description of the first violated invariant.
    pub fn check_integrity(&self) {
        let mut linked = 0;
        for page in self.pages() {
            linked += 1;
            assert!(page.is_valid(), "page {:#x}: corrupted header", page.base());
            assert!(page.live() > 0, "page {:#x}: empty page kept", page.base());
            assert!(
                page.head(SizeClass::MAX).is_none(),
                "page {:#x}: whole-page block on a linked page",
                page.base()
            );

            for class in SizeClass::all() {
                let mut prev: Option<usize> = None;
                for offset in page.iter(class) {
                    let block = BuddyBlock::new(page.base(), offset);
                    assert!(
                        offset >= HEADER_CLASS.size() && offset + class.size() <= PAGE_SIZE,
                        "page {:#x}: block {:#x} out of bounds",
                        page.base(),
                        offset
                    );
                    assert!(
                        crate::is_aligned(offset, class.size()),
                        "page {:#x}: block {:#x} misaligned for {}",
                        page.base(),
                        offset,
                        class.size()
                    );
                    assert_eq!(block.size(), class.size(), "block {:#x}: wrong size", offset);
                    assert_eq!(
                        block.data_offset(),
                        offset + BLOCK_HEADER_SIZE,
                        "block {:#x}: stale data offset",
                        offset
                    );
                    if let Some(prev) = prev {
                        assert!(prev < offset, "page {:#x}: list not sorted", page.base());
                        assert_ne!(
                            block.buddy(class).offset(),
                            prev,
                            "page {:#x}: free buddies {:#x}/{:#x} not merged",
                            page.base(),
                            prev,
                            offset
                        );
                    }
                    prev = Some(offset);
                }
            }
        }
        assert_eq!(linked, self.linked_pages, "page list length mismatch");
    }
}

impl<P: PageProvider> KernelAllocator for BuddyAllocator<P> {
    const ALIGN: usize = BLOCK_HEADER_SIZE;

    fn allocate(&mut self, size: usize) -> AllocResult<NonNull<u8>> {
        if size == 0 {
            return Err(AllocError::InvalidParam);
        }

        let Some(class) = size
            .checked_add(BLOCK_HEADER_SIZE)
            .and_then(SizeClass::from_size)
        else {
            warn!("buddy allocator: {} byte request exceeds a page", size);
            return Err(AllocError::OversizeRequest);
        };

        let block = if class == SizeClass::MAX {
            self.alloc_whole_page(size)?
        } else {
            self.alloc_block(class, size)?
        };
        self.bytes_requested += size;

        Ok(unsafe { NonNull::new_unchecked(block.data_addr() as *mut u8) })
    }

    fn release(&mut self, ptr: NonNull<u8>, size: usize) {
        let block = BuddyBlock::from_data_addr(ptr.as_ptr() as usize);
        let Some(class) = size
            .checked_add(BLOCK_HEADER_SIZE)
            .and_then(SizeClass::from_size)
        else {
            error!("buddy allocator: release of {} bytes at {:p}", size, ptr);
            return;
        };
        debug_assert_eq!(
            block.size(),
            class.size(),
            "release size {} does not match block at {:#x}",
            size,
            block.addr()
        );
        self.bytes_requested = self.bytes_requested.saturating_sub(size);

        if class == SizeClass::MAX {
            debug_assert_eq!(block.offset(), 0);
            self.whole_pages -= 1;
            debug!("buddy allocator: returning whole page {:#x}", block.page());
            self.provider.release_page(PageHandle::containing(block.page()));
            return;
        }

        let mut page = BuddyPage::containing(block.addr());
        debug_assert!(page.is_valid(), "release into unformatted page {:#x}", page.base());

        Self::free_block(page, block.offset(), class);
        if page.dec_live() == 0 {
            self.reclaim_page(page);
        }
    }

    fn pages_held(&self) -> usize {
        self.linked_pages + self.whole_pages
    }

    fn bytes_requested(&self) -> usize {
        self.bytes_requested
    }
}

impl Default for BuddyAllocator {
    fn default() -> Self {
        Self::new(SystemPageProvider::new())
    }
}

/// Iterator over the page list
pub struct PageIter {
    current: Option<BuddyPage>,
    remaining: usize,
}

impl Iterator for PageIter {
    type Item = BuddyPage;

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
