//! Page-pool allocator for transient GPU upload memory
//!
//! Pages cycle through four disjoint sets:
//!
//! ```text
//! absent -> current -> full -> retired(marker) -> available -> current -> ...
//! ```
//!
//! - *current*: the one page new allocations come from
//! - *full*: pages that overflowed during the active frame
//! - *retired*: pages stamped with the marker of the frame that last wrote them
//! - *available*: pages the GPU is done with, ready to become current
//!
//! A page only moves from retired to available after the completion oracle
//! reports its marker complete. Requests larger than a page get a dedicated
//! region that is released one completed marker later.
//!
//! # Thread Safety
//!
//! One mutex guards all pool state. `allocate`, `upload`, `cleanup`, `stats`
//! and `shutdown` are mutually exclusive and never wait on the GPU.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::backend::{BackingRegion, RegionFactory};
use crate::error::{ForgeResult, PageForgeError};
use crate::fence::CompletionOracle;
use crate::internal_error;

use super::config::{AllocatorConfig, CONSTANT_BUFFER_ALIGNMENT};
use super::handle::{AllocationHandle, AllocationKind, PageId};
use super::linear::checked_align_up;
use super::page::DynamicPage;
use super::stats::{AllocatorStats, PoolCounters};

/// Fence-gated page-pool allocator
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use pageforge::allocator::DynamicBufferAllocator;
/// use pageforge::backend::HostRegionFactory;
/// use pageforge::fence::FenceTimeline;
///
/// let fence = Arc::new(FenceTimeline::new());
/// let allocator = DynamicBufferAllocator::new(HostRegionFactory::new(), fence.clone());
/// allocator.initialize(65536)?;
///
/// let constants = allocator.upload(&[0u8; 64], 256)?;
/// assert_eq!(constants.offset(), 0);
///
/// // Submit GPU work that reads `constants`, then retire the frame
/// let marker = fence.next_marker();
/// allocator.cleanup(marker)?;
/// # Ok::<(), pageforge::PageForgeError>(())
/// ```
pub struct DynamicBufferAllocator<F: RegionFactory> {
    factory: F,
    oracle: Arc<dyn CompletionOracle>,
    state: Mutex<PoolState<F::Region>>,
}

struct PoolState<R: BackingRegion> {
    /// 0 until initialized
    page_size: u64,
    default_alignment: u64,
    /// Every page ever created, indexed by `PageId`
    pages: Vec<DynamicPage<R>>,
    current: Option<PageId>,
    full: Vec<PageId>,
    retired: VecDeque<(u64, PageId)>,
    available: VecDeque<PageId>,
    /// Oversized regions allocated since the last cleanup
    oversized: Vec<R>,
    /// Oversized regions waiting for their marker
    deletion: VecDeque<(u64, R)>,
    last_marker: Option<u64>,
    counters: PoolCounters,
}

impl<R: BackingRegion> PoolState<R> {
    fn new() -> Self {
        PoolState {
            page_size: 0,
            default_alignment: CONSTANT_BUFFER_ALIGNMENT,
            pages: Vec::new(),
            current: None,
            full: Vec::new(),
            retired: VecDeque::new(),
            available: VecDeque::new(),
            oversized: Vec::new(),
            deletion: VecDeque::new(),
            last_marker: None,
            counters: PoolCounters::default(),
        }
    }

    fn is_initialized(&self) -> bool {
        self.page_size != 0
    }

    fn page_mut(&mut self, id: PageId) -> ForgeResult<&mut DynamicPage<R>> {
        self.pages
            .get_mut(id.0)
            .ok_or_else(|| internal_error!("{} missing from page arena", id))
    }

    /// Create a page of `page_size` and add it to the arena
    fn create_page<F>(&mut self, factory: &F) -> ForgeResult<PageId>
    where
        F: RegionFactory<Region = R>,
    {
        let region = factory.create_region(self.page_size)?;
        let id = PageId(self.pages.len());
        let page = DynamicPage::new(id, region)?;
        self.pages.push(page);
        self.counters.pages_created += 1;
        tracing::debug!(
            "DynamicBufferAllocator: created {} ({} bytes, {} pages total)",
            id,
            self.page_size,
            self.pages.len()
        );
        Ok(id)
    }

    /// Promote retired pages whose marker has completed
    ///
    /// Markers are monotonic, so the queue is ordered and the scan stops at the
    /// first incomplete marker.
    fn promote_completed(&mut self, oracle: &dyn CompletionOracle) {
        while let Some(&(marker, id)) = self.retired.front() {
            if !oracle.is_marker_complete(marker) {
                break;
            }
            self.retired.pop_front();
            self.available.push_back(id);
            self.counters.pages_promoted += 1;
            tracing::trace!("DynamicBufferAllocator: {} available (marker {})", id, marker);
        }
    }

    fn acquire_page<F>(&mut self, factory: &F, oracle: &dyn CompletionOracle) -> ForgeResult<PageId>
    where
        F: RegionFactory<Region = R>,
    {
        self.promote_completed(oracle);

        if let Some(id) = self.available.pop_front() {
            self.counters.pages_reused += 1;
            tracing::debug!("DynamicBufferAllocator: reusing {}", id);
            return Ok(id);
        }

        self.create_page(factory)
    }

    fn allocate_paged<F>(
        &mut self,
        factory: &F,
        oracle: &dyn CompletionOracle,
        size: u64,
        alignment: u64,
    ) -> ForgeResult<AllocationHandle>
    where
        F: RegionFactory<Region = R>,
    {
        if let Some(id) = self.current {
            if let Some(handle) = self.page_mut(id)?.allocate(size, alignment) {
                return Ok(handle);
            }
            self.full.push(id);
            self.current = None;
            self.counters.page_rotations += 1;
            tracing::debug!(
                "DynamicBufferAllocator: {} full, rotating ({} bytes requested)",
                id,
                size
            );
        }

        let id = self.acquire_page(factory, oracle)?;
        self.current = Some(id);

        // A fresh or reset page holds page_size bytes and the request was
        // checked against page_size, so this cannot fail.
        self.page_mut(id)?.allocate(size, alignment).ok_or_else(|| {
            internal_error!(
                "{} cannot fit {} bytes (alignment {}) right after acquisition",
                id,
                size,
                alignment
            )
        })
    }

    /// Dedicated region for a request larger than a page
    ///
    /// Deletions whose marker has completed are released first.
    fn allocate_oversized<F>(
        &mut self,
        factory: &F,
        oracle: &dyn CompletionOracle,
        aligned_size: u64,
    ) -> ForgeResult<AllocationHandle>
    where
        F: RegionFactory<Region = R>,
    {
        self.drain_deletions(oracle);

        let mut region = factory.create_region(aligned_size)?;
        let mapped = region.map()?;
        let handle = AllocationHandle::new(
            region.id(),
            AllocationKind::Oversized,
            region.device_address(),
            mapped,
            0,
            aligned_size,
        );
        tracing::debug!(
            "DynamicBufferAllocator: oversized {} ({} bytes > page size {})",
            region.id(),
            aligned_size,
            self.page_size
        );
        self.oversized.push(region);
        Ok(handle)
    }

    fn retire_frame(&mut self, marker: u64) {
        if let Some(id) = self.current.take() {
            self.full.push(id);
        }

        // Only the watermark resets here. The bytes stay intact for GPU reads
        // still in flight; nothing writes them until the page is reacquired.
        for id in std::mem::take(&mut self.full) {
            if let Some(page) = self.pages.get_mut(id.0) {
                page.reset();
            }
            self.retired.push_back((marker, id));
        }
    }

    fn drain_deletions(&mut self, oracle: &dyn CompletionOracle) {
        while self
            .deletion
            .front()
            .is_some_and(|(marker, _)| oracle.is_marker_complete(*marker))
        {
            if let Some((marker, region)) = self.deletion.pop_front() {
                tracing::debug!(
                    "DynamicBufferAllocator: releasing oversized {} (marker {})",
                    region.id(),
                    marker
                );
                drop(region);
                self.counters.oversized_released += 1;
            }
        }
    }

    fn queue_oversized_for_deletion(&mut self, marker: u64) {
        for mut region in self.oversized.drain(..) {
            region.unmap();
            self.deletion.push_back((marker, region));
        }
    }

    fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            page_size: self.page_size,
            total_pages: self.pages.len(),
            current_pages: usize::from(self.current.is_some()),
            full_pages: self.full.len(),
            retired_pages: self.retired.len(),
            available_pages: self.available.len(),
            current_page_used: self
                .current
                .and_then(|id| self.pages.get(id.0))
                .map_or(0, |page| page.used_bytes()),
            oversized_live: self.oversized.len(),
            pending_deletions: self.deletion.len(),
            last_marker: self.last_marker,
            counters: self.counters,
        }
    }

    /// Release everything. Regions are dropped, which frees their memory.
    fn clear(&mut self) {
        self.current = None;
        self.full.clear();
        self.retired.clear();
        self.available.clear();
        for page in &mut self.pages {
            page.unmap();
        }
        self.pages.clear();
        for region in &mut self.oversized {
            region.unmap();
        }
        self.oversized.clear();
        self.deletion.clear();
        self.page_size = 0;
        self.last_marker = None;
    }
}

fn validate_alignment(alignment: u64) -> ForgeResult<()> {
    if alignment > 1 && !alignment.is_power_of_two() {
        return Err(PageForgeError::InvalidAlignment(alignment));
    }
    Ok(())
}

impl<F: RegionFactory> DynamicBufferAllocator<F> {
    /// Create an uninitialized allocator
    ///
    /// `oracle` answers "has the GPU finished everything up to this marker".
    pub fn new(factory: F, oracle: Arc<dyn CompletionOracle>) -> Self {
        DynamicBufferAllocator {
            factory,
            oracle,
            state: Mutex::new(PoolState::new()),
        }
    }

    /// Set the page size and create the first page as current
    ///
    /// # Errors
    /// - `InvalidConfiguration` if `page_size` is zero
    /// - `AlreadyInitialized` if called twice without `shutdown` in between
    /// - `RegionCreationFailed` / `MappingFailed` if the backend refuses the page
    pub fn initialize(&self, page_size: u64) -> ForgeResult<()> {
        self.initialize_with_config(&AllocatorConfig::new().with_page_size(page_size))
    }

    /// Initialize from a configuration, creating `warm_pages` pages up front
    pub fn initialize_with_config(&self, config: &AllocatorConfig) -> ForgeResult<()> {
        config.validate()?;

        let mut state = self.state.lock()?;
        if state.is_initialized() {
            return Err(PageForgeError::AlreadyInitialized(state.page_size));
        }

        state.page_size = config.page_size;
        state.default_alignment = config.default_alignment;

        let first = match state.create_page(&self.factory) {
            Ok(id) => id,
            Err(e) => {
                state.clear();
                return Err(e);
            }
        };
        state.current = Some(first);

        for _ in 1..config.warm_pages {
            match state.create_page(&self.factory) {
                Ok(id) => state.available.push_back(id),
                Err(e) => {
                    state.clear();
                    return Err(e);
                }
            }
        }

        tracing::info!(
            "DynamicBufferAllocator initialized: page size {} KB, {} warm page(s)",
            config.page_size / 1024,
            config.warm_pages
        );
        Ok(())
    }

    /// Allocate `size` bytes aligned to `alignment`
    ///
    /// Requests whose aligned size exceeds the page size get a dedicated
    /// region; everything else is served from the current page, rotating in
    /// another page when it is full.
    ///
    /// # Errors
    /// - `InvalidAlignment` if `alignment` is not 0, 1 or a power of two
    /// - `NotInitialized` before `initialize`
    /// - `RegionCreationFailed` / `MappingFailed` if a new region is refused
    pub fn allocate(&self, size: u64, alignment: u64) -> ForgeResult<AllocationHandle> {
        validate_alignment(alignment)?;

        let mut state = self.state.lock()?;
        if !state.is_initialized() {
            return Err(PageForgeError::NotInitialized);
        }

        let aligned_size = checked_align_up(size, alignment)
            .ok_or(PageForgeError::SizeOverflow { size, alignment })?;
        let handle = if aligned_size > state.page_size {
            let handle =
                state.allocate_oversized(&self.factory, self.oracle.as_ref(), aligned_size)?;
            state.counters.oversized_allocations += 1;
            handle
        } else {
            let handle = state.allocate_paged(&self.factory, self.oracle.as_ref(), size, alignment)?;
            state.counters.paged_allocations += 1;
            handle
        };
        state.counters.bytes_allocated += handle.size();

        tracing::trace!(
            "DynamicBufferAllocator: {} bytes at {}+{} (alignment {})",
            handle.size(),
            handle.region(),
            handle.offset(),
            alignment
        );
        Ok(handle)
    }

    /// Allocate with the configured default alignment
    pub fn allocate_default(&self, size: u64) -> ForgeResult<AllocationHandle> {
        let alignment = self.state.lock()?.default_alignment;
        self.allocate(size, alignment)
    }

    /// Allocate `data.len()` bytes and copy `data` in
    pub fn upload(&self, data: &[u8], alignment: u64) -> ForgeResult<AllocationHandle> {
        let handle = self.allocate(data.len() as u64, alignment)?;
        // SAFETY: the handle was just produced and its page cannot be retired
        // before the caller's next cleanup.
        unsafe { handle.write(data)? };
        Ok(handle)
    }

    /// Retire the frame's pages and oversized regions under `marker`
    ///
    /// Call once per frame, after submitting every GPU command that reads
    /// this frame's allocations, with markers that never decrease.
    pub fn cleanup(&self, marker: u64) -> ForgeResult<()> {
        let mut state = self.state.lock()?;
        if !state.is_initialized() {
            return Err(PageForgeError::NotInitialized);
        }

        if let Some(last) = state.last_marker {
            if marker < last {
                tracing::warn!(
                    "DynamicBufferAllocator::cleanup: marker {} is lower than previous marker {}",
                    marker,
                    last
                );
            }
        }

        state.retire_frame(marker);
        state.drain_deletions(self.oracle.as_ref());
        state.queue_oversized_for_deletion(marker);
        state.promote_completed(self.oracle.as_ref());

        state.last_marker = Some(marker);
        state.counters.frames += 1;

        tracing::debug!(
            "DynamicBufferAllocator::cleanup: marker {} ({} retired, {} available, {} pending deletions)",
            marker,
            state.retired.len(),
            state.available.len(),
            state.deletion.len()
        );
        Ok(())
    }

    /// Unmap and release every region. Safe to call more than once, and on an
    /// allocator that was never initialized.
    ///
    /// The caller must make sure the GPU is idle: regions still waiting on
    /// their marker are released immediately.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.is_initialized() {
            return;
        }
        let pages = state.pages.len();
        let pending = state.deletion.len() + state.oversized.len();
        state.clear();
        tracing::info!(
            "DynamicBufferAllocator shut down: released {} page(s), {} oversized region(s)",
            pages,
            pending
        );
    }

    pub fn stats(&self) -> ForgeResult<AllocatorStats> {
        Ok(self.state.lock()?.stats())
    }

    /// Page size, or `NotInitialized`
    pub fn page_size(&self) -> ForgeResult<u64> {
        let state = self.state.lock()?;
        if !state.is_initialized() {
            return Err(PageForgeError::NotInitialized);
        }
        Ok(state.page_size)
    }

    pub fn is_initialized(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.is_initialized())
            .unwrap_or(false)
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }
}

impl<F: RegionFactory> Drop for DynamicBufferAllocator<F> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state.is_initialized() {
            state.clear();
        }
    }
}
