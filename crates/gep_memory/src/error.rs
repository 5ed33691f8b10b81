//! # Memory Error Types
//!
//! Everything that can go wrong around an allocator *except* exhaustion.
//! Running out of space is an ordinary outcome and is reported as `None`
//! from [`Allocator::allocate`](crate::Allocator::allocate).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while building, auditing or misusing an allocator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// Constructor arguments that cannot describe a usable region.
    #[error("invalid allocator configuration: {0}")]
    InvalidConfig(String),

    /// A budget file could not be read or parsed.
    #[error("failed to load memory configuration: {0}")]
    Config(String),

    /// The parent allocator could not provide the region.
    #[error("parent allocator could not provide {requested} bytes")]
    ParentExhausted {
        /// Size of the region that was requested.
        requested: usize,
    },

    /// A block that lies outside the allocator's region.
    #[error("block {address:#x} does not belong to this allocator")]
    ForeignBlock {
        /// Address of the offending block.
        address: usize,
    },

    /// A pool chunk released while already on the free list.
    #[error("block {address:#x} was freed twice")]
    DoubleFree {
        /// Address of the offending block.
        address: usize,
    },

    /// A stack block released while it is not the top of the stack.
    #[error("out-of-order free of {address:#x}, top block is {}", describe_top(.expected))]
    OutOfOrderFree {
        /// Address of the offending block.
        address: usize,
        /// Address of the block that may legally be freed, if any is live.
        expected: Option<usize>,
    },

    /// A marker that is not a boundary between live allocations.
    #[error("marker {marker:#x} does not match any live allocation boundary")]
    InvalidMarker {
        /// Address stored in the marker.
        marker: usize,
    },

    /// Alloc/free counts of a leak-checking scope do not match.
    #[error("memory leak in '{name}': {allocations} allocations, {frees} frees")]
    LeakDetected {
        /// Name of the audited scope.
        name: String,
        /// Successful allocations made through the scope.
        allocations: usize,
        /// Frees made through the scope.
        frees: usize,
    },

    /// A memory report could not be rendered.
    #[error("failed to write memory report: {0}")]
    Report(String),

    /// The same allocator was registered twice.
    #[error("allocator already registered as '{0}'")]
    DuplicateRegistration(String),
}

fn describe_top(expected: &Option<usize>) -> String {
    match expected {
        Some(address) => format!("{address:#x}"),
        None => "absent".to_owned(),
    }
}

/// Result type for allocator operations.
pub type MemoryResult<T> = Result<T, MemoryError>;

/// What an allocator does when a caller breaks its release discipline.
///
/// Only reached through the capability-level `free`; the checked
/// `try_free` variants always hand the error back to the caller.
///
/// The default is [`ViolationPolicy::Panic`] in builds with debug assertions
/// and [`ViolationPolicy::Log`] otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationPolicy {
    /// Silently treat the call as a no-op.
    Ignore,
    /// Emit a `tracing` warning, then treat the call as a no-op.
    Log,
    /// Stop immediately.
    Panic,
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Panic
        } else {
            Self::Log
        }
    }
}

impl ViolationPolicy {
    /// Applies the policy to a contract violation.
    ///
    /// # Panics
    ///
    /// Panics with the error message under [`ViolationPolicy::Panic`].
    pub fn report(self, error: &MemoryError) {
        match self {
            Self::Ignore => {}
            Self::Log => tracing::warn!(error = %error, "allocator contract violation ignored"),
            Self::Panic => panic!("allocator contract violation: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MemoryError::OutOfOrderFree { address: 0x20, expected: Some(0x40) };
        assert_eq!(err.to_string(), "out-of-order free of 0x20, top block is 0x40");

        let err = MemoryError::LeakDetected { name: "loader".into(), allocations: 3, frees: 1 };
        assert_eq!(err.to_string(), "memory leak in 'loader': 3 allocations, 1 frees");
    }

    #[test]
    fn test_policy_ignore_and_log_return() {
        let err = MemoryError::ForeignBlock { address: 0x10 };
        ViolationPolicy::Ignore.report(&err);
        ViolationPolicy::Log.report(&err);
    }

    #[test]
    fn test_default_policy_follows_build() {
        let expected = if cfg!(debug_assertions) { ViolationPolicy::Panic } else { ViolationPolicy::Log };
        assert_eq!(ViolationPolicy::default(), expected);
    }

    #[test]
    fn test_report_error_message() {
        let err = MemoryError::Report("integer out of range".into());
        assert_eq!(err.to_string(), "failed to write memory report: integer out of range");
    }

    #[test]
    #[should_panic(expected = "allocator contract violation")]
    fn test_policy_panic() {
        ViolationPolicy::Panic.report(&MemoryError::DoubleFree { address: 0x10 });
    }
}
