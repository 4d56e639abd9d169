//! Unified error handling for PageForge
//!
//! Every fallible allocator operation returns [`ForgeResult`]. Errors are
//! grouped into categories so callers can tell apart:
//! - User errors (bad alignment, bad configuration, out-of-bounds writes)
//! - Recoverable errors (allocator used before it was initialized)
//! - Internal errors (bugs, poisoned locks)
//! - Backend errors (the platform refused to create or map a region)
//!
//! A page filling up is *not* an error. The pool handles it by rotating
//! pages and the caller never observes it.

use std::fmt;

use crate::backend::BackendError;

/// Unified error type for PageForge
#[derive(Debug, thiserror::Error)]
pub enum PageForgeError {
    // ========== Lifecycle Errors ==========
    /// `allocate` or `cleanup` called before `initialize`
    #[error("Allocator not initialized")]
    NotInitialized,

    /// `initialize` called on an allocator that already owns pages
    #[error("Allocator already initialized with page size {0}")]
    AlreadyInitialized(u64),

    // ========== Caller Errors ==========
    /// Alignment is not zero, one, or a power of two
    #[error("Invalid alignment: {0}. Must be a power of two")]
    InvalidAlignment(u64),

    /// Invalid allocator configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Copy through an allocation handle would leave the allocation
    #[error("Access out of bounds: offset {offset} + len {len} > size {size}")]
    AllocationOutOfBounds { offset: u64, len: u64, size: u64 },

    /// Request size rounded up to its alignment does not fit in `u64`
    #[error("Allocation of {size} bytes overflows when aligned to {alignment}")]
    SizeOverflow { size: u64, alignment: u64 },

    // ========== Backend Errors ==========
    /// The platform refused to create a backing region
    #[error("Backing region creation failed: {0}")]
    RegionCreationFailed(String),

    /// The platform refused to map a backing region
    #[error("Backing region mapping failed: {0}")]
    MappingFailed(String),

    // ========== Internal Errors ==========
    /// Internal error (indicates a bug)
    #[error("Internal error: {0}")]
    InternalError(String),

    /// Lock poisoned (a thread panicked while holding the pool lock)
    #[error("Internal lock poisoned: {0}")]
    LockPoisoned(String),
}

impl PageForgeError {
    /// Categorize the error for handling decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            PageForgeError::InvalidAlignment(_)
            | PageForgeError::InvalidConfiguration(_)
            | PageForgeError::AllocationOutOfBounds { .. }
            | PageForgeError::SizeOverflow { .. }
            | PageForgeError::AlreadyInitialized(_) => ErrorCategory::User,

            PageForgeError::NotInitialized => ErrorCategory::Recoverable,

            PageForgeError::RegionCreationFailed(_) | PageForgeError::MappingFailed(_) => {
                ErrorCategory::Backend
            }

            PageForgeError::InternalError(_) | PageForgeError::LockPoisoned(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Check if this error is recoverable (temporary condition)
    ///
    /// Backend failures are not recoverable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Recoverable)
    }

    /// Check if this is a user-facing error (actionable by the caller)
    pub fn is_user_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::User)
    }

    /// Check if this is an internal error (indicates a bug)
    pub fn is_internal_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Internal)
    }

    /// Check if this error came from the backing-region platform
    pub fn is_backend_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Backend)
    }
}

/// Error category for handling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// User error - invalid input or configuration
    User,
    /// Recoverable error - temporary condition
    Recoverable,
    /// Internal error - indicates a bug
    Internal,
    /// Backend error - region creation or mapping failure
    Backend,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::User => write!(f, "User"),
            ErrorCategory::Recoverable => write!(f, "Recoverable"),
            ErrorCategory::Internal => write!(f, "Internal"),
            ErrorCategory::Backend => write!(f, "Backend"),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for PageForgeError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        PageForgeError::LockPoisoned(err.to_string())
    }
}

impl From<BackendError> for PageForgeError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::MappingFailed(msg) => PageForgeError::MappingFailed(msg),
            other => PageForgeError::RegionCreationFailed(other.to_string()),
        }
    }
}

pub type ForgeResult<T> = std::result::Result<T, PageForgeError>;

/// Create an internal error with context
///
/// # Examples
/// ```ignore
/// return Err(internal_error!("page {} missing from arena", id));
/// ```
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::error::PageForgeError::InternalError($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::PageForgeError::InternalError(format!($fmt, $($arg)*))
    };
}
