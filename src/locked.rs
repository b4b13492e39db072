//! Lock-protected allocator usable from shared references.
//!
//! [`LockedAllocator`] wraps any [`KernelAllocator`] in a [`SpinNoIrq`] so a
//! single instance can serve several CPUs, and implements [`GlobalAlloc`]
//! for layouts whose alignment the inner policy guarantees.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::NonNull;

use kspin::{SpinNoIrq, SpinNoIrqGuard};

#[cfg(feature = "log")]
use log::warn;

use crate::{AllocResult, KernelAllocator};

/// A [`KernelAllocator`] behind an IRQ-safe spin lock
pub struct LockedAllocator<A: KernelAllocator> {
    inner: SpinNoIrq<A>,
}

impl<A: KernelAllocator> LockedAllocator<A> {
    pub const fn new(inner: A) -> Self {
        Self {
            inner: SpinNoIrq::new(inner),
        }
    }

    /// Lock the inner allocator for a sequence of operations
    pub fn lock(&self) -> SpinNoIrqGuard<'_, A> {
        self.inner.lock()
    }

    pub fn allocate(&self, size: usize) -> AllocResult<NonNull<u8>> {
        self.inner.lock().allocate(size)
    }

    pub fn release(&self, ptr: NonNull<u8>, size: usize) {
        self.inner.lock().release(ptr, size)
    }

    pub fn pages_held(&self) -> usize {
        self.inner.lock().pages_held()
    }

    pub fn bytes_requested(&self) -> usize {
        self.inner.lock().bytes_requested()
    }

    pub fn wasted_bytes(&self) -> usize {
        self.inner.lock().wasted_bytes()
    }

    fn supports(layout: &Layout) -> bool {
        layout.align() <= A::ALIGN
    }
}

unsafe impl<A: KernelAllocator + Send> GlobalAlloc for LockedAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if !Self::supports(&layout) {
            warn!(
                "locked allocator: alignment {} above {} for layout {:?}",
                layout.align(),
                A::ALIGN,
                layout
            );
            return core::ptr::null_mut();
        }

        match self.allocate(layout.size()) {
            Ok(ptr) => ptr.as_ptr(),
            Err(_e) => {
                warn!("locked allocator: layout {:?} failed: {}", layout, _e);
                core::ptr::null_mut()
            }
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if let Some(ptr) = NonNull::new(ptr) {
            self.release(ptr, layout.size());
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let Ok(new_layout) = Layout::from_size_align(new_size, layout.align()) else {
            return core::ptr::null_mut();
        };
        let new_ptr = unsafe { self.alloc(new_layout) };
        if !new_ptr.is_null() {
            unsafe {
                core::ptr::copy_nonoverlapping(ptr, new_ptr, core::cmp::min(layout.size(), new_size));
                self.dealloc(ptr, layout);
            }
        }
        new_ptr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AllocError, BuddyAllocator, ResourceMapAllocator, SystemPageProvider};

    static BUDDY: LockedAllocator<BuddyAllocator> =
        LockedAllocator::new(BuddyAllocator::new(SystemPageProvider::new()));

    #[test]
    fn test_shared_allocate_release() {
        let a = BUDDY.allocate(100).unwrap();
        let b = BUDDY.allocate(50).unwrap();
        assert!(BUDDY.pages_held() >= 1);
        BUDDY.release(a, 100);
        BUDDY.release(b, 50);
        BUDDY.lock().check_integrity();
        assert_eq!(BUDDY.allocate(0), Err(AllocError::InvalidParam));
    }

    #[test]
    fn test_global_alloc_alignment_limit() {
        let allocator = LockedAllocator::new(ResourceMapAllocator::default());
        unsafe {
            let ok = allocator.alloc(Layout::from_size_align(40, 16).unwrap());
            assert!(!ok.is_null());
            assert_eq!(ok as usize % 16, 0);

            let too_aligned = allocator.alloc(Layout::from_size_align(40, 64).unwrap());
            assert!(too_aligned.is_null());

            allocator.dealloc(ok, Layout::from_size_align(40, 16).unwrap());
        }
        assert_eq!(allocator.pages_held(), 0);
    }

    #[test]
    fn test_global_realloc_copies() {
        let allocator = LockedAllocator::new(ResourceMapAllocator::default());
        let layout = Layout::from_size_align(32, 8).unwrap();
        unsafe {
            let ptr = allocator.alloc(layout);
            core::ptr::write_bytes(ptr, 0xab, 32);
            let grown = allocator.realloc(ptr, layout, 512);
            assert!(!grown.is_null());
            assert_eq!(*grown.add(31), 0xab);
            allocator.dealloc(grown, Layout::from_size_align(512, 8).unwrap());
        }
        assert_eq!(allocator.bytes_requested(), 0);
        assert_eq!(allocator.pages_held(), 0);
    }
}
