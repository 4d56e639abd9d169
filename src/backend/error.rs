//! Backing-region error types

use thiserror::Error;

/// Errors reported by a [`RegionFactory`](super::RegionFactory) or a
/// [`BackingRegion`](super::BackingRegion)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Region creation failed: {0}")]
    RegionCreationFailed(String),
    #[error("Region budget exceeded: requested {requested} bytes, {available} available")]
    BudgetExceeded { requested: u64, available: u64 },
    #[error("Zero-sized region requested")]
    ZeroSizedRegion,
    #[error("Region mapping failed: {0}")]
    MappingFailed(String),
}

/// Backend result type
pub type BackendResult<T> = Result<T, BackendError>;
