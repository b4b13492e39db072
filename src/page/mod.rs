//! Page layer
//!
//! Pages are the unit of memory exchanged with the outside world. Every page is
//! exactly [`PAGE_SIZE`](crate::PAGE_SIZE) bytes, zeroed on hand-out, and aligned
//! to its own size so that the owning page of any block can be recovered by
//! masking the block address.

pub mod page_handle;
pub mod region_provider;
pub mod system_provider;

pub use page_handle::{page_of, PageHandle};
pub use region_provider::RegionPageProvider;
pub use system_provider::SystemPageProvider;

use crate::AllocResult;

/// Source of fixed-size pages for the allocators.
///
/// Implementations must hand out zeroed, `PAGE_SIZE`-aligned regions of
/// exactly `PAGE_SIZE` bytes. Releasing a handle twice, or touching a page
/// after releasing it, is undefined behavior.
pub trait PageProvider {
    /// Acquire a fresh page.
    fn acquire_page(&mut self) -> AllocResult<PageHandle>;

    /// Return a page previously obtained from [`acquire_page`](Self::acquire_page).
    fn release_page(&mut self, page: PageHandle);
}

impl<P: PageProvider + ?Sized> PageProvider for &mut P {
    fn acquire_page(&mut self) -> AllocResult<PageHandle> {
        (**self).acquire_page()
    }

    fn release_page(&mut self, page: PageHandle) {
        (**self).release_page(page)
    }
}
