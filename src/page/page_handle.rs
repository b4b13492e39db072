//! Page handles and address-to-page recovery.

use crate::PAGE_SIZE;

/// Opaque handle to a page obtained from a [`PageProvider`](super::PageProvider).
///
/// Since pages are aligned to their size, the base address alone identifies a
/// page, which lets the allocators rebuild a handle from any block address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageHandle {
    base: usize,
}

impl PageHandle {
    /// Wrap the base address of a page.
    ///
    /// Returns `None` for a null or non page-aligned address.
    pub const fn new(base: usize) -> Option<Self> {
        if base == 0 || !crate::is_aligned(base, PAGE_SIZE) {
            return None;
        }
        Some(Self { base })
    }

    /// Handle of the page containing `addr`.
    pub(crate) const fn containing(addr: usize) -> Self {
        Self {
            base: page_of(addr),
        }
    }

    /// Base address of the page.
    pub const fn addr(&self) -> usize {
        self.base
    }

    /// Page frame number, unique among live pages.
    pub const fn id(&self) -> usize {
        self.base / PAGE_SIZE
    }

    /// Base pointer of the page.
    pub const fn as_ptr(&self) -> *mut u8 {
        self.base as *mut u8
    }

    /// Whether `addr` lies inside this page.
    pub const fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.base + PAGE_SIZE
    }
}

/// Start of the page owning `addr`.
///
/// `page_of(addr) == addr - addr % PAGE_SIZE`
#[inline]
pub const fn page_of(addr: usize) -> usize {
    crate::align_down(addr, PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_of_masks_to_boundary() {
        let base = 16 * PAGE_SIZE;
        assert_eq!(page_of(base), base);
        assert_eq!(page_of(base + 1), base);
        assert_eq!(page_of(base + PAGE_SIZE - 1), base);
        assert_eq!(page_of(base + PAGE_SIZE), base + PAGE_SIZE);
    }

    #[test]
    fn test_handle_rejects_unaligned() {
        assert!(PageHandle::new(0).is_none());
        assert!(PageHandle::new(PAGE_SIZE + 8).is_none());

        let handle = PageHandle::new(3 * PAGE_SIZE).unwrap();
        assert_eq!(handle.id(), 3);
        assert!(handle.contains(3 * PAGE_SIZE + 100));
        assert!(!handle.contains(4 * PAGE_SIZE));
        assert_eq!(PageHandle::containing(3 * PAGE_SIZE + 4000), handle);
    }
}
