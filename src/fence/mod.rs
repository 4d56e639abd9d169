//! GPU completion tracking
//!
//! The allocator never waits on the GPU. It asks a [`CompletionOracle`]
//! whether all work up to a marker has finished and only reuses memory once
//! the answer is yes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Reports whether GPU work up to a marker has finished
///
/// Implementations must be monotonic: once a marker reports complete, it and
/// every smaller marker stay complete.
pub trait CompletionOracle: Send + Sync {
    fn is_marker_complete(&self, marker: u64) -> bool;
}

impl<T: CompletionOracle + ?Sized> CompletionOracle for Arc<T> {
    fn is_marker_complete(&self, marker: u64) -> bool {
        (**self).is_marker_complete(marker)
    }
}

/// A fence-style timeline of monotonically increasing markers
///
/// The submitting side takes markers with [`next_marker`](Self::next_marker)
/// and the completion side (a GPU queue callback, or a test) advances the
/// completed value with [`signal`](Self::signal). Marker 0 is always complete.
#[derive(Debug)]
pub struct FenceTimeline {
    next: AtomicU64,
    completed: AtomicU64,
}

impl Default for FenceTimeline {
    fn default() -> Self {
        Self::new()
    }
}

impl FenceTimeline {
    pub fn new() -> Self {
        FenceTimeline {
            next: AtomicU64::new(1),
            completed: AtomicU64::new(0),
        }
    }

    /// Issue the marker for the next submission
    pub fn next_marker(&self) -> u64 {
        self.next.fetch_add(1, Ordering::AcqRel)
    }

    /// Last marker issued, or 0 if none
    pub fn last_issued(&self) -> u64 {
        self.next.load(Ordering::Acquire) - 1
    }

    /// Record that all work up to `marker` has finished
    ///
    /// Signalling a value lower than the current one is ignored.
    pub fn signal(&self, marker: u64) {
        let previous = self.completed.fetch_max(marker, Ordering::AcqRel);
        if marker > previous {
            tracing::trace!("FenceTimeline::signal: completed {} -> {}", previous, marker);
        }
    }

    /// Mark every issued marker as complete (device idle)
    pub fn signal_all(&self) {
        self.signal(self.last_issued());
    }

    pub fn completed_value(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }
}

impl CompletionOracle for FenceTimeline {
    fn is_marker_complete(&self, marker: u64) -> bool {
        marker <= self.completed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_zero_always_complete() {
        let fence = FenceTimeline::new();
        assert!(fence.is_marker_complete(0));
        assert!(!fence.is_marker_complete(1));
    }

    #[test]
    fn test_next_marker_is_monotonic() {
        let fence = FenceTimeline::new();
        assert_eq!(fence.last_issued(), 0);
        assert_eq!(fence.next_marker(), 1);
        assert_eq!(fence.next_marker(), 2);
        assert_eq!(fence.last_issued(), 2);
    }

    #[test]
    fn test_signal_never_goes_backwards() {
        let fence = FenceTimeline::new();
        fence.signal(5);
        fence.signal(3);
        assert_eq!(fence.completed_value(), 5);
        assert!(fence.is_marker_complete(4));
        assert!(fence.is_marker_complete(5));
        assert!(!fence.is_marker_complete(6));
    }

    #[test]
    fn test_signal_all_completes_issued_markers() {
        let fence = FenceTimeline::new();
        let a = fence.next_marker();
        let b = fence.next_marker();
        fence.signal_all();
        assert!(fence.is_marker_complete(a));
        assert!(fence.is_marker_complete(b));
    }

    #[test]
    fn test_arc_oracle_delegates() {
        let fence = Arc::new(FenceTimeline::new());
        let oracle: Arc<dyn CompletionOracle> = fence.clone();
        fence.signal(2);
        assert!(oracle.is_marker_complete(2));
        assert!(!oracle.is_marker_complete(3));
    }
}
