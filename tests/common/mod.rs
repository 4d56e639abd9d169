//! Shared fixtures for allocator integration tests
//!
//! Every fixture runs the pool over host-backed regions so the tests can
//! inspect live backing memory through the factory's ledger.

#![allow(dead_code)]

use std::sync::Arc;

use pageforge::allocator::{AllocatorConfig, DynamicBufferAllocator};
use pageforge::backend::{HostRegionFactory, RegionLedger};
use pageforge::fence::FenceTimeline;

pub use serial_test::serial;

/// An initialized pool, its fence and the ledger of its backing regions
pub struct PoolFixture {
    pub allocator: DynamicBufferAllocator<HostRegionFactory>,
    pub fence: Arc<FenceTimeline>,
    pub ledger: Arc<RegionLedger>,
}

impl PoolFixture {
    pub fn new(page_size: u64) -> Self {
        Self::with_factory(
            HostRegionFactory::new(),
            AllocatorConfig::new().with_page_size(page_size),
        )
    }

    pub fn with_config(config: AllocatorConfig) -> Self {
        Self::with_factory(HostRegionFactory::new(), config)
    }

    pub fn with_factory(factory: HostRegionFactory, config: AllocatorConfig) -> Self {
        let ledger = factory.ledger();
        let fence = Arc::new(FenceTimeline::new());
        let allocator = DynamicBufferAllocator::new(factory, fence.clone());
        allocator
            .initialize_with_config(&config)
            .expect("pool fixture failed to initialize");
        PoolFixture {
            allocator,
            fence,
            ledger,
        }
    }

    /// Retire the frame under a fresh marker and return it
    pub fn end_frame(&self) -> u64 {
        let marker = self.fence.next_marker();
        self.allocator.cleanup(marker).expect("cleanup failed");
        marker
    }

    /// End a frame and let the GPU finish everything issued so far
    pub fn end_frame_and_drain(&self) -> u64 {
        let marker = self.end_frame();
        self.fence.signal_all();
        marker
    }
}

/// Bytes `0, 1, 2, ...` wrapping at 251 so neighbouring regions differ
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| ((i % 251) as u8).wrapping_add(seed))
        .collect()
}
