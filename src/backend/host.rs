//! Host-memory backing regions
//!
//! [`HostRegionFactory`] emulates an upload heap: every region is a block of
//! zeroed host memory that is CPU-visible, with a synthetic device address
//! assigned from a monotonically growing virtual range. It is the default
//! factory for the simulator, the benchmarks, and the test suite.

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::allocator::DEFAULT_PAGE_SIZE;

use super::error::{BackendError, BackendResult};
use super::region::{BackingRegion, MappedPtr, RegionFactory, RegionId};

/// Alignment of the host allocation behind every region
pub const HOST_REGION_ALIGNMENT: usize = 256;

/// Granularity of the synthetic device address space (64KB, like placed resources)
pub const DEVICE_ADDRESS_GRANULARITY: u64 = 64 * 1024;

/// First synthetic device address handed out
pub const DEVICE_ADDRESS_BASE: u64 = 0x1_0000_0000;

/// Live-resource accounting shared by a factory and the regions it created
#[derive(Debug, Default)]
pub struct RegionLedger {
    live_regions: AtomicUsize,
    live_bytes: AtomicU64,
    created_regions: AtomicU64,
    released_regions: AtomicU64,
}

/// Point-in-time copy of a [`RegionLedger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerSnapshot {
    pub live_regions: usize,
    pub live_bytes: u64,
    pub created_regions: u64,
    pub released_regions: u64,
}

impl RegionLedger {
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            live_regions: self.live_regions.load(Ordering::Acquire),
            live_bytes: self.live_bytes.load(Ordering::Acquire),
            created_regions: self.created_regions.load(Ordering::Acquire),
            released_regions: self.released_regions.load(Ordering::Acquire),
        }
    }

    pub fn live_regions(&self) -> usize {
        self.live_regions.load(Ordering::Acquire)
    }

    pub fn live_bytes(&self) -> u64 {
        self.live_bytes.load(Ordering::Acquire)
    }

    /// Reserve `size` bytes, failing if that would exceed `budget`
    fn reserve(&self, size: u64, budget: Option<u64>) -> BackendResult<()> {
        match budget {
            None => {
                self.live_bytes.fetch_add(size, Ordering::AcqRel);
            }
            Some(limit) => {
                self.live_bytes
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                        live.checked_add(size).filter(|total| *total <= limit)
                    })
                    .map_err(|live| BackendError::BudgetExceeded {
                        requested: size,
                        available: limit.saturating_sub(live),
                    })?;
            }
        }
        Ok(())
    }

    fn unreserve(&self, size: u64) {
        self.live_bytes.fetch_sub(size, Ordering::AcqRel);
    }
}

// SAFETY: HostRegion is Send+Sync because it exclusively owns its heap block
// and all mutation goes through &mut self.
// NOTE: HostRegion does NOT implement Clone - two owners would double-free.
unsafe impl Send for HostRegion {}
unsafe impl Sync for HostRegion {}

/// A block of host memory standing in for an upload-heap buffer
#[derive(Debug)]
pub struct HostRegion {
    id: RegionId,
    ptr: NonNull<u8>,
    layout: Layout,
    device_address: u64,
    mapped: bool,
    cpu_visible: bool,
    ledger: Arc<RegionLedger>,
}

impl HostRegion {
    /// Read back `len` bytes at `offset` (test and debugging aid)
    pub fn read_bytes(&self, offset: u64, len: usize) -> BackendResult<Vec<u8>> {
        let end = offset.checked_add(len as u64);
        if end.map_or(true, |end| end > self.capacity()) {
            return Err(BackendError::MappingFailed(format!(
                "read of {} bytes at offset {} exceeds capacity {}",
                len,
                offset,
                self.capacity()
            )));
        }
        let mut out = vec![0u8; len];
        // SAFETY: bounds checked above; the block lives as long as self.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.ptr.as_ptr().add(offset as usize),
                out.as_mut_ptr(),
                len,
            );
        }
        Ok(out)
    }
}

impl BackingRegion for HostRegion {
    fn id(&self) -> RegionId {
        self.id
    }

    fn capacity(&self) -> u64 {
        self.layout.size() as u64
    }

    fn device_address(&self) -> u64 {
        self.device_address
    }

    fn map(&mut self) -> BackendResult<MappedPtr> {
        if !self.cpu_visible {
            return Err(BackendError::MappingFailed(format!(
                "{} is not CPU-visible",
                self.id
            )));
        }
        if !self.mapped {
            tracing::trace!("HostRegion::map: {} ({} bytes)", self.id, self.capacity());
            self.mapped = true;
        }
        Ok(MappedPtr::new(self.ptr))
    }

    fn unmap(&mut self) {
        if self.mapped {
            tracing::trace!("HostRegion::unmap: {}", self.id);
            self.mapped = false;
        }
    }

    fn is_mapped(&self) -> bool {
        self.mapped
    }
}

impl Drop for HostRegion {
    fn drop(&mut self) {
        // SAFETY: ptr was returned by alloc_zeroed with this exact layout.
        unsafe {
            alloc::dealloc(self.ptr.as_ptr(), self.layout);
        }
        self.ledger.unreserve(self.layout.size() as u64);
        self.ledger.live_regions.fetch_sub(1, Ordering::AcqRel);
        self.ledger.released_regions.fetch_add(1, Ordering::AcqRel);
        tracing::trace!("HostRegion::drop: released {}", self.id);
    }
}

/// Factory producing [`HostRegion`]s
///
/// An optional byte budget models device out-of-memory: creating a region
/// that would push live bytes past the budget fails.
#[derive(Debug)]
pub struct HostRegionFactory {
    ledger: Arc<RegionLedger>,
    budget: Option<u64>,
    /// Size used when a region of 0 bytes is requested
    default_size: u64,
    cpu_visible: bool,
    next_device_address: AtomicU64,
}

impl Default for HostRegionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl HostRegionFactory {
    pub fn new() -> Self {
        HostRegionFactory {
            ledger: Arc::new(RegionLedger::default()),
            budget: None,
            default_size: DEFAULT_PAGE_SIZE,
            cpu_visible: true,
            next_device_address: AtomicU64::new(DEVICE_ADDRESS_BASE),
        }
    }

    /// Limit the total live bytes of regions created by this factory
    pub fn with_budget(mut self, budget_bytes: u64) -> Self {
        self.budget = Some(budget_bytes);
        self
    }

    /// Size substituted for zero-byte requests; 0 makes them an error
    pub fn with_default_size(mut self, default_size: u64) -> Self {
        self.default_size = default_size;
        self
    }

    /// Create regions that refuse CPU mapping (device-local memory)
    pub fn device_local(mut self) -> Self {
        self.cpu_visible = false;
        self
    }

    /// Shared live-resource accounting, usable after the factory moves into a pool
    pub fn ledger(&self) -> Arc<RegionLedger> {
        Arc::clone(&self.ledger)
    }

    pub fn budget(&self) -> Option<u64> {
        self.budget
    }
}

impl RegionFactory for HostRegionFactory {
    type Region = HostRegion;

    fn create_region(&self, size: u64) -> BackendResult<HostRegion> {
        let size = if size == 0 { self.default_size } else { size };
        if size == 0 {
            return Err(BackendError::ZeroSizedRegion);
        }
        let byte_size = usize::try_from(size).map_err(|_| {
            BackendError::RegionCreationFailed(format!(
                "{} bytes exceeds the host address space",
                size
            ))
        })?;
        let layout = Layout::from_size_align(byte_size, HOST_REGION_ALIGNMENT).map_err(|e| {
            BackendError::RegionCreationFailed(format!("invalid layout for {} bytes: {}", size, e))
        })?;

        if let Err(e) = self.ledger.reserve(size, self.budget) {
            tracing::warn!("HostRegionFactory: {}", e);
            return Err(e);
        }

        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => {
                self.ledger.unreserve(size);
                tracing::error!("HostRegionFactory: host allocation of {} bytes failed", size);
                return Err(BackendError::RegionCreationFailed(format!(
                    "host allocation of {} bytes returned null",
                    size
                )));
            }
        };

        let span = size.div_ceil(DEVICE_ADDRESS_GRANULARITY) * DEVICE_ADDRESS_GRANULARITY;
        let device_address = self.next_device_address.fetch_add(span, Ordering::AcqRel);

        self.ledger.live_regions.fetch_add(1, Ordering::AcqRel);
        self.ledger.created_regions.fetch_add(1, Ordering::AcqRel);

        let id = RegionId::next();
        tracing::debug!(
            "HostRegionFactory: created {} ({} bytes) at device address 0x{:x}",
            id,
            size,
            device_address
        );

        Ok(HostRegion {
            id,
            ptr,
            layout,
            device_address,
            mapped: false,
            cpu_visible: self.cpu_visible,
            ledger: Arc::clone(&self.ledger),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_region_exact_capacity() {
        let factory = HostRegionFactory::new();
        let region = factory.create_region(70_000).unwrap();
        assert_eq!(region.capacity(), 70_000);
        assert!(!region.is_mapped());
        assert_eq!(factory.ledger().live_regions(), 1);
        assert_eq!(factory.ledger().live_bytes(), 70_000);
    }

    #[test]
    fn test_zero_size_uses_default() {
        let factory = HostRegionFactory::new().with_default_size(4096);
        let region = factory.create_region(0).unwrap();
        assert_eq!(region.capacity(), 4096);
    }

    #[test]
    fn test_zero_sized_region_rejected() {
        let factory = HostRegionFactory::new().with_default_size(0);
        assert_eq!(
            factory.create_region(0).unwrap_err(),
            BackendError::ZeroSizedRegion
        );
    }

    #[test]
    fn test_device_addresses_do_not_overlap() {
        let factory = HostRegionFactory::new();
        let a = factory.create_region(100).unwrap();
        let b = factory.create_region(DEVICE_ADDRESS_GRANULARITY + 1).unwrap();
        let c = factory.create_region(10).unwrap();

        assert_eq!(a.device_address(), DEVICE_ADDRESS_BASE);
        assert_eq!(b.device_address(), a.device_address() + DEVICE_ADDRESS_GRANULARITY);
        assert_eq!(c.device_address(), b.device_address() + 2 * DEVICE_ADDRESS_GRANULARITY);
    }

    #[test]
    fn test_map_is_stable_and_zeroed() {
        let factory = HostRegionFactory::new();
        let mut region = factory.create_region(512).unwrap();
        let first = region.map().unwrap();
        let second = region.map().unwrap();
        assert_eq!(first, second);
        assert!(region.is_mapped());
        assert_eq!(first.as_ptr() as usize % HOST_REGION_ALIGNMENT, 0);
        assert!(region.read_bytes(0, 512).unwrap().iter().all(|b| *b == 0));

        region.unmap();
        assert!(!region.is_mapped());
    }

    #[test]
    fn test_device_local_region_refuses_mapping() {
        let factory = HostRegionFactory::new().device_local();
        let mut region = factory.create_region(64).unwrap();
        assert!(matches!(region.map(), Err(BackendError::MappingFailed(_))));
    }

    #[test]
    fn test_budget_enforced_and_released_on_drop() {
        let factory = HostRegionFactory::new().with_budget(1000);
        let first = factory.create_region(600).unwrap();

        let err = factory.create_region(600).unwrap_err();
        assert_eq!(
            err,
            BackendError::BudgetExceeded {
                requested: 600,
                available: 400
            }
        );

        drop(first);
        let ledger = factory.ledger().snapshot();
        assert_eq!(ledger.live_regions, 0);
        assert_eq!(ledger.live_bytes, 0);
        assert_eq!(ledger.created_regions, 1);
        assert_eq!(ledger.released_regions, 1);

        assert!(factory.create_region(600).is_ok());
    }

    #[test]
    fn test_read_bytes_out_of_bounds() {
        let factory = HostRegionFactory::new();
        let region = factory.create_region(16).unwrap();
        assert!(region.read_bytes(8, 9).is_err());
        assert_eq!(region.read_bytes(8, 8).unwrap().len(), 8);
    }
}
