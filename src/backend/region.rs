//! Backing-region abstraction shared by every region factory
//!
//! A backing region is a fixed-capacity block of CPU-visible, GPU-addressable
//! memory. Pages and oversized allocations both sit on top of one.

use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::BackendResult;

static NEXT_REGION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a backing region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(u64);

impl RegionId {
    /// Issue a fresh identifier
    pub fn next() -> Self {
        RegionId(NEXT_REGION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

// SAFETY: MappedPtr is Send+Sync because it is only an address. Every
// dereference goes through an unsafe accessor whose caller upholds the
// region's validity window.
unsafe impl Send for MappedPtr {}
unsafe impl Sync for MappedPtr {}

/// CPU address of persistently mapped region memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedPtr(NonNull<u8>);

impl MappedPtr {
    pub fn new(ptr: NonNull<u8>) -> Self {
        MappedPtr(ptr)
    }

    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    pub fn as_non_null(self) -> NonNull<u8> {
        self.0
    }

    /// Pointer `offset` bytes past this one
    ///
    /// # Safety
    /// `offset` must stay within the mapped region this pointer came from.
    pub unsafe fn add(self, offset: u64) -> Self {
        MappedPtr(NonNull::new_unchecked(self.0.as_ptr().add(offset as usize)))
    }
}

/// A fixed-capacity block of GPU-visible memory
///
/// Once [`map`](BackingRegion::map) succeeds the returned pointer stays
/// stable until [`unmap`](BackingRegion::unmap) or drop. Dropping a region
/// releases its memory.
pub trait BackingRegion: Send + Sync + fmt::Debug {
    fn id(&self) -> RegionId;

    /// Capacity in bytes
    fn capacity(&self) -> u64;

    /// Base address the GPU uses to reference this region
    fn device_address(&self) -> u64;

    /// Map the region for CPU writes. Mapping an already mapped region
    /// returns the same pointer.
    fn map(&mut self) -> BackendResult<MappedPtr>;

    fn unmap(&mut self);

    fn is_mapped(&self) -> bool;
}

/// Creates backing regions of a requested size
pub trait RegionFactory: Send + Sync {
    type Region: BackingRegion;

    /// Create a region of exactly `size` bytes, or of the factory's default
    /// size when `size` is 0
    fn create_region(&self, size: u64) -> BackendResult<Self::Region>;
}
