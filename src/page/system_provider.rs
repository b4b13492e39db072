//! Page provider backed by the global heap.

use alloc::alloc::{alloc_zeroed, dealloc};
use core::alloc::Layout;

#[cfg(feature = "log")]
use log::{debug, error};

use super::{PageHandle, PageProvider};
use crate::{AllocError, AllocResult, PAGE_SIZE};

const PAGE_LAYOUT: Layout = match Layout::from_size_align(PAGE_SIZE, PAGE_SIZE) {
    Ok(layout) => layout,
    Err(_) => panic!("invalid page layout"),
};

/// Hands out page-aligned pages from the global allocator.
///
/// An optional limit caps the number of pages held at the same time, which is
/// how callers model a provider running dry.
pub struct SystemPageProvider {
    limit: Option<usize>,
    outstanding: usize,
    total_acquired: usize,
}

impl SystemPageProvider {
    /// Create a provider without a page limit
    pub const fn new() -> Self {
        Self {
            limit: None,
            outstanding: 0,
            total_acquired: 0,
        }
    }

    /// Create a provider that holds at most `max_pages` pages at once
    pub const fn with_limit(max_pages: usize) -> Self {
        Self {
            limit: Some(max_pages),
            outstanding: 0,
            total_acquired: 0,
        }
    }

    /// Number of pages handed out and not yet returned
    pub fn outstanding_pages(&self) -> usize {
        self.outstanding
    }

    /// Number of pages handed out over the provider's lifetime
    pub fn total_acquired(&self) -> usize {
        self.total_acquired
    }
}

impl Default for SystemPageProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PageProvider for SystemPageProvider {
    fn acquire_page(&mut self) -> AllocResult<PageHandle> {
        if let Some(limit) = self.limit {
            if self.outstanding >= limit {
                debug!("system provider: page limit {} reached", limit);
                return Err(AllocError::ProviderExhausted);
            }
        }

        let ptr = unsafe { alloc_zeroed(PAGE_LAYOUT) };
        let Some(page) = PageHandle::new(ptr as usize) else {
            error!("system provider: heap returned no page");
            return Err(AllocError::ProviderExhausted);
        };

        self.outstanding += 1;
        self.total_acquired += 1;
        Ok(page)
    }

    fn release_page(&mut self, page: PageHandle) {
        debug_assert!(self.outstanding > 0, "page released more often than acquired");
        unsafe { dealloc(page.as_ptr(), PAGE_LAYOUT) };
        self.outstanding = self.outstanding.saturating_sub(1);
    }
}
