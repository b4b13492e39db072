//! Kernel memory allocator over fixed-size pages
//!
//! This crate implements a byte-granularity allocator that draws 8 KiB pages
//! from an external [`PageProvider`] and carves them up in place, featuring:
//! - Buddy policy with power-of-two size classes and per-page free lists
//! - Resource-map policy with a global address-ordered first-fit list
//! - In-place block and page headers recoverable from any block address
//! - Automatic return of empty pages to the provider

#![no_std]

extern crate alloc;

use core::fmt;
use core::ptr::NonNull;

// Logging support - conditionally import log crate
#[cfg(feature = "log")]
extern crate log;

// Stub macros when log is disabled - these become no-ops
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! error {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! warn {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! info {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! debug {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

/// Size of every page handed out by a [`PageProvider`].
pub const PAGE_SIZE: usize = 8192;

/// The error type used for allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Invalid `size` (e.g. zero bytes).
    InvalidParam,
    /// The request cannot fit in a single page even when the page is empty.
    OversizeRequest,
    /// The page provider cannot supply another page.
    ProviderExhausted,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::InvalidParam => f.write_str("invalid allocation parameter"),
            AllocError::OversizeRequest => f.write_str("request does not fit in a single page"),
            AllocError::ProviderExhausted => f.write_str("page provider is exhausted"),
        }
    }
}

/// A [`Result`] type with [`AllocError`] as the error type.
pub type AllocResult<T = ()> = Result<T, AllocError>;

/// Byte-granularity allocator built on top of a page provider.
///
/// `release` must be called with the exact `size` passed to the matching
/// `allocate`; the allocator keeps no per-allocation size record.
pub trait KernelAllocator {
    /// Alignment guaranteed for every pointer returned by `allocate`.
    const ALIGN: usize;

    /// Allocate `size` bytes.
    fn allocate(&mut self, size: usize) -> AllocResult<NonNull<u8>>;

    /// Release a block previously returned by [`allocate`](Self::allocate).
    fn release(&mut self, ptr: NonNull<u8>, size: usize);

    /// Returns the number of pages currently held from the provider.
    fn pages_held(&self) -> usize;

    /// Returns the sum of the sizes of all live allocations.
    fn bytes_requested(&self) -> usize;

    /// Returns the number of bytes reserved across all held pages.
    fn bytes_reserved(&self) -> usize {
        self.pages_held() * PAGE_SIZE
    }

    /// Returns reserved bytes not covered by a live request.
    fn wasted_bytes(&self) -> usize {
        self.bytes_reserved().saturating_sub(self.bytes_requested())
    }
}

#[inline]
const fn align_down(pos: usize, align: usize) -> usize {
    pos & !(align - 1)
}

#[inline]
const fn align_up(pos: usize, align: usize) -> usize {
    (pos + align - 1) & !(align - 1)
}

/// Checks whether the address has the demanded alignment.
///
/// Equivalent to `addr % align == 0`, but the alignment must be a power of two.
#[inline]
const fn is_aligned(base_addr: usize, align: usize) -> bool {
    base_addr & (align - 1) == 0
}

pub mod page;
pub use page::{page_of, PageHandle, PageProvider, RegionPageProvider, SystemPageProvider};

pub mod buddy;
#[cfg(feature = "tracking")]
pub use buddy::BuddyStats;
pub use buddy::{BuddyAllocator, SizeClass};

pub mod resource_map;
#[cfg(feature = "tracking")]
pub use resource_map::ResourceMapStats;
pub use resource_map::ResourceMapAllocator;

pub mod locked;
pub use locked::LockedAllocator;
