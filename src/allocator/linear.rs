//! Bump sub-allocator for a single page
//!
//! Hands out offsets by advancing a watermark. Individual allocations are
//! never freed; the whole page is reset at once when the GPU is done with it.

/// Raw-offset sentinel for callers that store offsets without `Option`
pub const INVALID_ALLOC_OFFSET: u64 = u64::MAX;

/// Align `value` up to `alignment`
///
/// An alignment of 0 or 1 returns `value` unchanged. Any other alignment must
/// be a power of two; the result is unspecified otherwise.
///
/// Saturates near `u64::MAX`: when rounding up would overflow, the result is
/// the largest aligned value, which is then smaller than `value`. Use
/// [`checked_align_up`] where that matters.
#[inline]
pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    debug_assert!(
        alignment.is_power_of_two(),
        "alignment {} is not a power of two",
        alignment
    );
    value.saturating_add(alignment - 1) & !(alignment - 1)
}

/// Align `value` up to `alignment`, or `None` if the result overflows `u64`
#[inline]
pub fn checked_align_up(value: u64, alignment: u64) -> Option<u64> {
    if alignment <= 1 {
        return Some(value);
    }
    debug_assert!(
        alignment.is_power_of_two(),
        "alignment {} is not a power of two",
        alignment
    );
    Some(value.checked_add(alignment - 1)? & !(alignment - 1))
}

/// Linear (watermark) allocator over `[0, capacity)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearAllocator {
    capacity: u64,
    watermark: u64,
}

impl LinearAllocator {
    pub fn new(capacity: u64) -> Self {
        LinearAllocator {
            capacity,
            watermark: 0,
        }
    }

    /// Allocate `size` bytes at an offset aligned to `alignment`
    ///
    /// Returns `None` without touching the watermark when the aligned request
    /// does not fit, so the caller can move on to another page.
    #[inline]
    pub fn allocate(&mut self, size: u64, alignment: u64) -> Option<u64> {
        let offset = checked_align_up(self.watermark, alignment)?;
        let end = offset.checked_add(size)?;
        if end > self.capacity {
            return None;
        }
        self.watermark = end;
        Some(offset)
    }

    /// Forget every allocation. The caller guarantees nothing still reads them.
    pub fn reset(&mut self) {
        self.watermark = 0;
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes consumed so far, alignment padding included
    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    pub fn remaining(&self) -> u64 {
        self.capacity - self.watermark
    }
}
