//! PageForge - transient GPU memory allocator
//!
//! A page-based arena allocator that hands out short-lived GPU-visible buffer
//! regions without creating a GPU resource per allocation. Memory is reclaimed
//! when the GPU has finished with it, as reported by a completion oracle, not
//! when the CPU lets go.

pub mod allocator;
pub mod backend;
pub mod error;
pub mod fence;
pub mod logging;

pub use allocator::{
    AllocationHandle, AllocationKind, AllocatorConfig, AllocatorStats, DynamicBufferAllocator,
    PageId,
};
pub use backend::{BackingRegion, HostRegionFactory, RegionFactory, RegionId};
pub use error::{ErrorCategory, ForgeResult, PageForgeError};
pub use fence::{CompletionOracle, FenceTimeline};
pub use logging::{init_logging_default, init_with_config, LoggingConfig};
