//! Statistics and debugging for the buddy allocator
//!
//! Provides per-class free-block counts and failure reporting.

use super::size_class::SizeClass;

/// Buddy allocator statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuddyStats {
    /// Pages held from the provider, whole-page allocations included
    pub pages_held: usize,
    /// Pages dedicated to a single whole-page allocation
    pub whole_pages: usize,
    /// Live allocations on linked pages
    pub live_blocks: usize,
    pub free_bytes: usize,
    pub bytes_requested: usize,
    pub free_blocks_by_class: [usize; SizeClass::COUNT],
}

impl BuddyStats {
    pub const fn new() -> Self {
        Self {
            pages_held: 0,
            whole_pages: 0,
            live_blocks: 0,
            free_bytes: 0,
            bytes_requested: 0,
            free_blocks_by_class: [0; SizeClass::COUNT],
        }
    }
}

/// Detailed memory statistics reporter
pub struct MemoryStatsReporter;

impl MemoryStatsReporter {
    /// Print detailed allocation failure statistics
    #[allow(unused_variables)]
    pub fn print_alloc_failure_stats(stats: &BuddyStats, request_size: usize) {
        #[cfg(feature = "log")]
        use log::error;
        error!("========================================");
        error!("Request: {} bytes", request_size);
        error!(
            "  Pages held: {} ({} KB), whole-page: {}",
            stats.pages_held,
            (stats.pages_held * crate::PAGE_SIZE) / 1024,
            stats.whole_pages
        );
        error!("  Live blocks: {}", stats.live_blocks);
        error!(
            "  Free bytes: {}, requested bytes: {}",
            stats.free_bytes, stats.bytes_requested
        );
        error!("  Free blocks by class:");
        for class in SizeClass::all() {
            let count = stats.free_blocks_by_class[class.to_index()];
            if count > 0 {
                error!(
                    "    {} B: {} blocks ({} B total)",
                    class.size(),
                    count,
                    count * class.size()
                );
            }
        }
        error!("========================================");
    }
}
