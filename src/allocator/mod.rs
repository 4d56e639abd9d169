//! Transient GPU upload memory
//!
//! This module implements the page-pool pattern used by real-time renderers
//! for per-frame uploads (constant buffers, dynamic vertex data, scratch):
//! 1. Carve allocations out of a current page with a bump allocator
//! 2. Rotate to another page when the current one is full
//! 3. Stamp the frame's pages with a GPU completion marker at end of frame
//! 4. Reuse a page only after the GPU has passed its marker
//!
//! Requests larger than a page bypass the pool and get a dedicated region
//! that is released once its own marker completes.

pub mod config;
pub mod handle;
pub mod linear;
pub mod page;
pub mod pool;
pub mod stats;

pub use config::{AllocatorConfig, PagePreset, CONSTANT_BUFFER_ALIGNMENT, DEFAULT_PAGE_SIZE};
pub use handle::{AllocationHandle, AllocationKind, PageId};
pub use linear::{align_up, checked_align_up, LinearAllocator, INVALID_ALLOC_OFFSET};
pub use page::DynamicPage;
pub use pool::DynamicBufferAllocator;
pub use stats::{AllocatorStats, PoolCounters};
