//! Page provider carving pages out of a caller-supplied memory region.
//!
//! Free pages are chained through their first word, so the provider needs no
//! storage of its own beyond the list head.

#[cfg(feature = "log")]
use log::{debug, warn};

use super::{PageHandle, PageProvider};
use crate::{AllocError, AllocResult, PAGE_SIZE};

/// Page provider over a fixed region `[start, start + size)`.
pub struct RegionPageProvider {
    start: usize,
    end: usize,
    /// Base address of the first free page
    free_head: Option<usize>,
    total_pages: usize,
    free_pages: usize,
}

impl RegionPageProvider {
    /// Create an empty provider, must call [`init`](Self::init) before use
    pub const fn new() -> Self {
        Self {
            start: 0,
            end: 0,
            free_head: None,
            total_pages: 0,
            free_pages: 0,
        }
    }

    /// Hand the region `[start, start + size)` to the provider.
    ///
    /// The region is trimmed inwards to page boundaries.
    ///
    /// # Safety
    ///
    /// The region must be valid for reads and writes and exclusively owned by
    /// the provider for as long as the provider or any of its pages are alive.
    pub unsafe fn init(&mut self, start: usize, size: usize) {
        let aligned_start = crate::align_up(start, PAGE_SIZE);
        let aligned_end = crate::align_down(start + size, PAGE_SIZE);

        self.start = aligned_start;
        self.end = aligned_end.max(aligned_start);
        self.free_head = None;
        self.total_pages = 0;
        self.free_pages = 0;

        // Push in reverse so the lowest page is handed out first
        let mut page = self.end;
        while page > self.start {
            page -= PAGE_SIZE;
            self.push_free(page);
            self.total_pages += 1;
        }

        debug!(
            "region provider: {} pages in [{:#x}, {:#x})",
            self.total_pages, self.start, self.end
        );
    }

    fn push_free(&mut self, page: usize) {
        unsafe {
            core::ptr::write(page as *mut usize, self.free_head.unwrap_or(0));
        }
        self.free_head = Some(page);
        self.free_pages += 1;
    }

    fn pop_free(&mut self) -> Option<usize> {
        let page = self.free_head?;
        let next = unsafe { core::ptr::read(page as *const usize) };
        self.free_head = if next == 0 { None } else { Some(next) };
        self.free_pages -= 1;
        Some(page)
    }

    /// Whether `addr` lies inside the managed region
    pub fn addr_in_region(&self, addr: usize) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Total number of pages in the region
    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Number of pages not currently handed out
    pub fn free_pages(&self) -> usize {
        self.free_pages
    }
}

impl Default for RegionPageProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PageProvider for RegionPageProvider {
    fn acquire_page(&mut self) -> AllocResult<PageHandle> {
        let page = self.pop_free().ok_or(AllocError::ProviderExhausted)?;
        unsafe { core::ptr::write_bytes(page as *mut u8, 0, PAGE_SIZE) };
        PageHandle::new(page).ok_or(AllocError::ProviderExhausted)
    }

    fn release_page(&mut self, page: PageHandle) {
        if !self.addr_in_region(page.addr()) {
            warn!(
                "region provider: page {:#x} not in region [{:#x}, {:#x})",
                page.addr(),
                self.start,
                self.end
            );
            return;
        }
        self.push_free(page.addr());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::alloc::{alloc, dealloc};
    use core::alloc::Layout;

    const REGION_PAGES: usize = 4;

    #[test]
    fn test_region_hand_out_and_return() {
        let layout = Layout::from_size_align(REGION_PAGES * PAGE_SIZE, PAGE_SIZE).unwrap();
        let region = unsafe { alloc(layout) };
        assert!(!region.is_null());

        let mut provider = RegionPageProvider::new();
        unsafe { provider.init(region as usize, REGION_PAGES * PAGE_SIZE) };
        assert_eq!(provider.total_pages(), REGION_PAGES);

        let first = provider.acquire_page().unwrap();
        assert_eq!(first.addr(), region as usize);

        let mut rest = alloc::vec::Vec::new();
        for _ in 1..REGION_PAGES {
            rest.push(provider.acquire_page().unwrap());
        }
        assert_eq!(provider.acquire_page(), Err(AllocError::ProviderExhausted));
        assert_eq!(provider.free_pages(), 0);

        provider.release_page(first);
        let again = provider.acquire_page().unwrap();
        assert_eq!(again, first);
        let bytes = unsafe { core::slice::from_raw_parts(again.as_ptr(), PAGE_SIZE) };
        assert!(bytes.iter().all(|&b| b == 0));

        provider.release_page(again);
        for page in rest {
            provider.release_page(page);
        }
        assert_eq!(provider.free_pages(), REGION_PAGES);

        unsafe { dealloc(region, layout) };
    }

    #[test]
    fn test_region_trimmed_to_page_boundaries() {
        let layout = Layout::from_size_align(3 * PAGE_SIZE, PAGE_SIZE).unwrap();
        let region = unsafe { alloc(layout) };
        assert!(!region.is_null());

        let mut provider = RegionPageProvider::new();
        unsafe { provider.init(region as usize + 8, 3 * PAGE_SIZE - 8) };
        assert_eq!(provider.total_pages(), 2);

        unsafe { dealloc(region, layout) };
    }
}
