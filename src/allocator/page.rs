//! Dynamic page: one backing region plus a bump allocator over it
//!
//! The region is mapped once when the page is built and stays mapped until
//! the pool shuts down, so handing out CPU pointers never touches the backend.

use crate::backend::{BackendResult, BackingRegion, MappedPtr};

use super::handle::{AllocationHandle, AllocationKind, PageId};
use super::linear::LinearAllocator;

#[derive(Debug)]
pub struct DynamicPage<R: BackingRegion> {
    id: PageId,
    region: R,
    allocator: LinearAllocator,
    mapped: MappedPtr,
}

impl<R: BackingRegion> DynamicPage<R> {
    /// Wrap `region` and map it for the lifetime of the page
    pub fn new(id: PageId, mut region: R) -> BackendResult<Self> {
        let mapped = region.map()?;
        let allocator = LinearAllocator::new(region.capacity());
        Ok(DynamicPage {
            id,
            region,
            allocator,
            mapped,
        })
    }

    /// Sub-allocate `size` bytes aligned to `alignment`
    ///
    /// `None` means the page is full for this request. The caller must move
    /// on to another page instead of retrying here.
    pub fn allocate(&mut self, size: u64, alignment: u64) -> Option<AllocationHandle> {
        let offset = self.allocator.allocate(size, alignment)?;
        // SAFETY: the allocator only returns offsets with offset + size <= capacity.
        let mapped = unsafe { self.mapped.add(offset) };
        Some(AllocationHandle::new(
            self.region.id(),
            AllocationKind::Paged(self.id),
            self.region.device_address() + offset,
            mapped,
            offset,
            size,
        ))
    }

    pub fn reset(&mut self) {
        self.allocator.reset();
    }

    pub fn unmap(&mut self) {
        self.region.unmap();
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn capacity(&self) -> u64 {
        self.allocator.capacity()
    }

    pub fn used_bytes(&self) -> u64 {
        self.allocator.watermark()
    }

    pub fn region(&self) -> &R {
        &self.region
    }
}
