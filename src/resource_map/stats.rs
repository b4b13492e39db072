//! Statistics for the resource-map allocator

/// Resource-map allocator statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceMapStats {
    pub pages_held: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
    /// Size of the largest free block; bounds the next request served without growing
    pub largest_free: usize,
    pub bytes_requested: usize,
}

impl ResourceMapStats {
    pub const fn new() -> Self {
        Self {
            pages_held: 0,
            free_blocks: 0,
            free_bytes: 0,
            largest_free: 0,
            bytes_requested: 0,
        }
    }

    /// Free bytes outside the largest block, as a percentage of all free bytes
    pub fn fragmentation_percent(&self) -> usize {
        if self.free_bytes == 0 {
            return 0;
        }
        (self.free_bytes - self.largest_free) * 100 / self.free_bytes
    }
}

/// Detailed memory statistics reporter
pub struct MemoryStatsReporter;

impl MemoryStatsReporter {
    /// Print allocation failure statistics
    #[allow(unused_variables)]
    pub fn print_alloc_failure_stats(stats: &ResourceMapStats, request_size: usize) {
        #[cfg(feature = "log")]
        use log::error;
        error!("========================================");
        error!("Request: {} bytes", request_size);
        error!(
            "  Pages held: {} ({} KB)",
            stats.pages_held,
            (stats.pages_held * crate::PAGE_SIZE) / 1024
        );
        error!(
            "  Free: {} bytes in {} blocks, largest {} ({}% fragmented)",
            stats.free_bytes,
            stats.free_blocks,
            stats.largest_free,
            stats.fragmentation_percent()
        );
        error!("  Requested bytes: {}", stats.bytes_requested);
        error!("========================================");
    }
}
