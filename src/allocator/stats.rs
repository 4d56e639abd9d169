//! Allocator statistics
//!
//! [`AllocatorStats`] is a snapshot taken under the pool lock, so the page
//! counts always add up to `total_pages`.

use serde::Serialize;

/// Counters that only ever grow while the pool is alive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolCounters {
    /// Allocations served from pooled pages
    pub paged_allocations: u64,
    /// Allocations that took the oversized path
    pub oversized_allocations: u64,
    /// Bytes handed out (requested sizes, oversized sizes aligned)
    pub bytes_allocated: u64,
    /// Times the current page overflowed and was replaced
    pub page_rotations: u64,
    /// Pages created by the backend
    pub pages_created: u64,
    /// Page acquisitions served from the available queue
    pub pages_reused: u64,
    /// Retired pages promoted to available
    pub pages_promoted: u64,
    /// Oversized regions released after their marker completed
    pub oversized_released: u64,
    /// `cleanup` calls
    pub frames: u64,
}

/// Snapshot of pool state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AllocatorStats {
    /// Page capacity, 0 while uninitialized
    pub page_size: u64,
    pub total_pages: usize,
    /// 1 while a page is current, else 0
    pub current_pages: usize,
    pub full_pages: usize,
    pub retired_pages: usize,
    pub available_pages: usize,
    /// Bytes consumed in the current page
    pub current_page_used: u64,
    /// Oversized regions allocated since the last `cleanup`
    pub oversized_live: usize,
    /// Oversized regions waiting for their marker to complete
    pub pending_deletions: usize,
    /// Marker passed to the most recent `cleanup`
    pub last_marker: Option<u64>,
    pub counters: PoolCounters,
}

impl AllocatorStats {
    /// Bytes held by pooled pages
    pub fn pooled_bytes(&self) -> u64 {
        self.page_size * self.total_pages as u64
    }

    /// Fraction of page acquisitions served by reuse (0.0 - 1.0)
    pub fn reuse_ratio(&self) -> f64 {
        let acquisitions = self.counters.pages_reused + self.counters.pages_created;
        if acquisitions == 0 {
            return 0.0;
        }
        self.counters.pages_reused as f64 / acquisitions as f64
    }
}
