//! Integration tests for the allocator crate
//!
//! Exercises both policies against a caller-supplied memory region and
//! through the shared, lock-protected front end.

#![no_std]

extern crate alloc;
extern crate kma_allocator;

use alloc::vec::Vec;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr::NonNull;
use kma_allocator::buddy::BLOCK_HEADER_SIZE;
use kma_allocator::resource_map::PAGE_CAPACITY;
use kma_allocator::{
    page_of, AllocError, BuddyAllocator, KernelAllocator, LockedAllocator, RegionPageProvider,
    ResourceMapAllocator, SizeClass, PAGE_SIZE,
};

const REGION_PAGES: usize = 16;

/// Allocate a page-aligned region using the system allocator
fn alloc_region(pages: usize) -> (*mut u8, Layout) {
    let layout = Layout::from_size_align(pages * PAGE_SIZE, PAGE_SIZE).unwrap();
    let ptr = unsafe { alloc::alloc::alloc(layout) };
    assert!(!ptr.is_null(), "Failed to allocate test region");
    (ptr, layout)
}

fn dealloc_region(ptr: *mut u8, layout: Layout) {
    unsafe { alloc::alloc::dealloc(ptr, layout) };
}

fn region_provider(ptr: *mut u8, pages: usize) -> RegionPageProvider {
    let mut provider = RegionPageProvider::new();
    unsafe { provider.init(ptr as usize, pages * PAGE_SIZE) };
    provider
}

#[test]
fn test_buddy_over_region() {
    let (ptr, layout) = alloc_region(REGION_PAGES);
    let mut allocator = BuddyAllocator::new(region_provider(ptr, REGION_PAGES));

    let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();
    for size in [24, 100, 500, 1000, 2000, 4000, 8000, 7] {
        let block = allocator.allocate(size).unwrap();
        assert!(allocator.provider().addr_in_region(block.as_ptr() as usize));
        assert_eq!(block.as_ptr() as usize % BuddyAllocator::<RegionPageProvider>::ALIGN, 0);
        live.push((block, size));
    }
    allocator.check_integrity();
    assert_eq!(
        allocator.pages_held() + allocator.provider().free_pages(),
        REGION_PAGES
    );

    for (block, size) in live.drain(..).rev() {
        allocator.release(block, size);
        allocator.check_integrity();
    }
    assert_eq!(allocator.pages_held(), 0);
    assert_eq!(allocator.provider().free_pages(), REGION_PAGES);

    dealloc_region(ptr, layout);
}

#[test]
fn test_buddy_region_exhaustion() {
    let (ptr, layout) = alloc_region(2);
    let mut allocator = BuddyAllocator::new(region_provider(ptr, 2));

    let a = allocator.allocate(PAGE_SIZE - BLOCK_HEADER_SIZE).unwrap();
    let b = allocator.allocate(PAGE_SIZE - BLOCK_HEADER_SIZE).unwrap();
    assert_eq!(allocator.allocate(16), Err(AllocError::ProviderExhausted));
    assert_eq!(allocator.pages_held(), 2);

    allocator.release(a, PAGE_SIZE - BLOCK_HEADER_SIZE);
    let c = allocator.allocate(16).unwrap();
    assert_eq!(page_of(c.as_ptr() as usize), page_of(a.as_ptr() as usize));

    allocator.release(b, PAGE_SIZE - BLOCK_HEADER_SIZE);
    allocator.release(c, 16);
    assert_eq!(allocator.pages_held(), 0);

    dealloc_region(ptr, layout);
}

#[test]
fn test_buddy_small_blocks_share_pages() {
    let mut allocator = BuddyAllocator::default();
    let blocks: Vec<NonNull<u8>> = (0..64).map(|_| allocator.allocate(24).unwrap()).collect();

    // 32-byte blocks: a page holds 8192 / 32 minus the 64-byte header block
    let per_page = PAGE_SIZE / SizeClass::Bytes32.size() - 2;
    assert_eq!(allocator.pages_held(), 64usize.div_ceil(per_page));
    allocator.check_integrity();

    for block in blocks {
        allocator.release(block, 24);
    }
    assert_eq!(allocator.pages_held(), 0);
    assert_eq!(allocator.provider().outstanding_pages(), 0);
}

#[test]
fn test_resource_map_over_region() {
    let (ptr, layout) = alloc_region(REGION_PAGES);
    let mut allocator = ResourceMapAllocator::new(region_provider(ptr, REGION_PAGES));

    let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();
    for size in [4000, 4000, 300, 8000, 17, PAGE_CAPACITY, 1] {
        let block = allocator.allocate(size).unwrap();
        assert!(allocator.provider().addr_in_region(block.as_ptr() as usize));
        assert_eq!(block.as_ptr() as usize % 16, 0);
        live.push((block, size));
    }
    allocator.check_integrity();

    // Release in interleaved order to exercise merging on both sides
    for index in [1, 3, 5, 0, 2, 4, 6] {
        let (block, size) = live[index];
        allocator.release(block, size);
        allocator.check_integrity();
    }
    assert_eq!(allocator.pages_held(), 0);
    assert_eq!(allocator.provider().free_pages(), REGION_PAGES);

    dealloc_region(ptr, layout);
}

#[test]
fn test_wasted_bytes_accounting() {
    let mut buddy = BuddyAllocator::default();
    let mut map = ResourceMapAllocator::default();

    let a = buddy.allocate(100).unwrap();
    let b = map.allocate(100).unwrap();
    assert_eq!(buddy.bytes_requested(), 100);
    assert_eq!(map.bytes_requested(), 100);
    assert_eq!(buddy.bytes_reserved(), PAGE_SIZE);
    assert_eq!(buddy.wasted_bytes(), PAGE_SIZE - 100);
    assert_eq!(map.wasted_bytes(), PAGE_SIZE - 100);

    buddy.release(a, 100);
    map.release(b, 100);
    assert_eq!(buddy.wasted_bytes(), 0);
    assert_eq!(map.wasted_bytes(), 0);
}

#[test]
fn test_locked_front_end() {
    let buddy = LockedAllocator::new(BuddyAllocator::default());
    let map = LockedAllocator::new(ResourceMapAllocator::default());
    let layout = Layout::from_size_align(200, 8).unwrap();

    unsafe {
        let a = buddy.alloc(layout);
        let b = map.alloc(layout);
        assert!(!a.is_null() && !b.is_null());
        core::ptr::write_bytes(a, 1, 200);
        core::ptr::write_bytes(b, 2, 200);

        // Buddy only guarantees 8-byte alignment
        assert!(buddy.alloc(Layout::from_size_align(64, 16).unwrap()).is_null());
        assert!(map.alloc(Layout::from_size_align(PAGE_SIZE, 8).unwrap()).is_null());

        buddy.dealloc(a, layout);
        map.dealloc(b, layout);
    }
    assert_eq!(buddy.pages_held(), 0);
    assert_eq!(map.pages_held(), 0);
}

#[test]
fn test_every_size_up_to_page_capacity() {
    let mut buddy = BuddyAllocator::default();
    for size in 1..=PAGE_SIZE - BLOCK_HEADER_SIZE {
        let ptr = buddy.allocate(size).unwrap();
        let addr = ptr.as_ptr() as usize;
        assert_eq!(page_of(addr) % PAGE_SIZE, 0);
        assert!(addr + size <= page_of(addr) + PAGE_SIZE);
        unsafe {
            ptr.as_ptr().write(0x11);
            ptr.as_ptr().add(size - 1).write(0x22);
        }
        assert_eq!(buddy.pages_held(), 1);
        buddy.release(ptr, size);
        assert_eq!(buddy.pages_held(), 0);
    }
    assert_eq!(buddy.allocate(PAGE_SIZE - BLOCK_HEADER_SIZE + 1), Err(AllocError::OversizeRequest));

    let mut map = ResourceMapAllocator::default();
    for size in 1..=PAGE_CAPACITY {
        let ptr = map.allocate(size).unwrap();
        let addr = ptr.as_ptr() as usize;
        assert!(addr + size <= page_of(addr) + PAGE_SIZE);
        unsafe {
            ptr.as_ptr().write(0x33);
            ptr.as_ptr().add(size - 1).write(0x44);
        }
        map.release(ptr, size);
        assert_eq!(map.pages_held(), 0);
    }
    assert_eq!(map.allocate(PAGE_CAPACITY + 1), Err(AllocError::OversizeRequest));
}

#[test]
fn test_buddy_sizes_share_one_page() {
    let mut allocator = BuddyAllocator::default();
    // One request per class from 32 to 2048 bytes, split out of the free
    // blocks around the page header
    let sizes = [24, 56, 120, 248, 504, 1016, 2040];
    let blocks: Vec<NonNull<u8>> = sizes.iter().map(|&size| allocator.allocate(size).unwrap()).collect();
    assert_eq!(allocator.page_count(), 1);
    assert_eq!(allocator.live_blocks(0), Some(sizes.len()));
    allocator.check_integrity();

    for (ptr, size) in blocks.into_iter().zip(sizes) {
        allocator.release(ptr, size);
        allocator.check_integrity();
    }
    assert_eq!(allocator.pages_held(), 0);
}
