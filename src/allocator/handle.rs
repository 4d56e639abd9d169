//! Allocation handles returned to callers
//!
//! A handle is a transient, non-owning view of a byte range inside a backing
//! region. It stays valid until the allocator resets or releases that region,
//! which can only happen after a `cleanup` whose marker the GPU has finished.
//! Holding a handle longer than that is a caller bug the type cannot catch,
//! so the accessors that dereference the mapped pointer are `unsafe`.

use std::fmt;

use crate::backend::{MappedPtr, RegionId};
use crate::error::{ForgeResult, PageForgeError};

/// Index of a page inside the pool's page arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub(crate) usize);

impl PageId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page#{}", self.0)
    }
}

/// Which producer served an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationKind {
    /// Sub-allocated from a pooled page
    Paged(PageId),
    /// Dedicated region sized to the request
    Oversized,
}

/// Location of one transient allocation
#[derive(Debug, Clone, Copy)]
pub struct AllocationHandle {
    region: RegionId,
    kind: AllocationKind,
    gpu_address: u64,
    mapped: MappedPtr,
    offset: u64,
    size: u64,
}

impl AllocationHandle {
    pub(crate) fn new(
        region: RegionId,
        kind: AllocationKind,
        gpu_address: u64,
        mapped: MappedPtr,
        offset: u64,
        size: u64,
    ) -> Self {
        AllocationHandle {
            region,
            kind,
            gpu_address,
            mapped,
            offset,
            size,
        }
    }

    /// Region the bytes live in
    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn kind(&self) -> AllocationKind {
        self.kind
    }

    /// Page that served this allocation, `None` for oversized allocations
    pub fn page(&self) -> Option<PageId> {
        match self.kind {
            AllocationKind::Paged(page) => Some(page),
            AllocationKind::Oversized => None,
        }
    }

    pub fn is_oversized(&self) -> bool {
        matches!(self.kind, AllocationKind::Oversized)
    }

    /// Device address to bind for GPU reads
    pub fn gpu_address(&self) -> u64 {
        self.gpu_address
    }

    /// CPU address of the first byte
    pub fn mapped_ptr(&self) -> *mut u8 {
        self.mapped.as_ptr()
    }

    /// Byte offset from the start of the region
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Byte range `[offset, offset + size)` within the region
    pub fn range(&self) -> std::ops::Range<u64> {
        self.offset..self.offset + self.size
    }

    fn check_bounds(&self, at: u64, len: usize) -> ForgeResult<()> {
        let len = len as u64;
        match at.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(PageForgeError::AllocationOutOfBounds {
                offset: at,
                len,
                size: self.size,
            }),
        }
    }

    /// Copy `data` to the start of the allocation
    ///
    /// # Safety
    /// The handle must still be valid: no `cleanup` whose marker has since
    /// completed may have retired its page, and the allocator must not have
    /// been shut down.
    pub unsafe fn write(&self, data: &[u8]) -> ForgeResult<()> {
        self.write_at(0, data)
    }

    /// Copy `data` into the allocation starting `at` bytes in
    ///
    /// # Safety
    /// Same validity requirement as [`write`](Self::write).
    pub unsafe fn write_at(&self, at: u64, data: &[u8]) -> ForgeResult<()> {
        self.check_bounds(at, data.len())?;
        std::ptr::copy_nonoverlapping(
            data.as_ptr(),
            self.mapped.as_ptr().add(at as usize),
            data.len(),
        );
        Ok(())
    }

    /// Copy bytes from the start of the allocation into `out`
    ///
    /// # Safety
    /// Same validity requirement as [`write`](Self::write).
    pub unsafe fn read(&self, out: &mut [u8]) -> ForgeResult<()> {
        self.read_at(0, out)
    }

    /// Copy bytes starting `at` bytes into the allocation into `out`
    ///
    /// # Safety
    /// Same validity requirement as [`write`](Self::write).
    pub unsafe fn read_at(&self, at: u64, out: &mut [u8]) -> ForgeResult<()> {
        self.check_bounds(at, out.len())?;
        std::ptr::copy_nonoverlapping(
            self.mapped.as_ptr().add(at as usize),
            out.as_mut_ptr(),
            out.len(),
        );
        Ok(())
    }

    /// Whether two handles share any byte of the same region
    pub fn overlaps(&self, other: &AllocationHandle) -> bool {
        self.region == other.region
            && self.offset < other.offset + other.size
            && other.offset < self.offset + self.size
    }
}
