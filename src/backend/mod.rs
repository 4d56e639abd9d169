//! Backing-region backends
//!
//! The allocator never creates GPU memory itself. It asks a
//! [`RegionFactory`] for CPU-visible, GPU-addressable regions and maps them
//! once for their whole lifetime.

pub mod error;
pub mod host;
pub mod region;

pub use error::{BackendError, BackendResult};
pub use host::{HostRegion, HostRegionFactory, LedgerSnapshot, RegionLedger};
pub use region::{BackingRegion, MappedPtr, RegionFactory, RegionId};
