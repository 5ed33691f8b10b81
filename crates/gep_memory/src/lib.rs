//! # GEP Memory
//!
//! Layered custom allocators for engine subsystems:
//! - Fixed-size pools with O(1) allocate and free
//! - Stacks with markers for per-frame and per-level scratch
//! - Double-ended stacks sharing one budget between two lifetimes
//! - Leak-checking decorators that fail loudly at teardown
//!
//! ## Architecture Rules
//!
//! 1. **Regions are acquired once** - every allocator takes its whole region
//!    from a parent allocator at construction and returns it at drop
//! 2. **Exhaustion is not an error** - `allocate` returns `None`
//! 3. **Misuse is** - out-of-order, foreign and double frees are detected and
//!    handled by a [`ViolationPolicy`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use gep_memory::{Allocator, GrowthDirection, PoolAllocator, StackAllocator};
//!
//! let particles = PoolAllocator::new(64, 4096)?;
//! let frame = StackAllocator::new(GrowthDirection::Upward, 1024 * 1024)?;
//!
//! let start = frame.marker();
//! let scratch = frame.allocate(4096).expect("frame budget exceeded");
//! frame.free_to_marker(start)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod allocator;
pub mod config;
pub mod error;
pub mod memory;
pub mod registry;
pub mod sync;
pub mod typed;

pub use allocator::{align_up, Allocator, AllocatorStatistics, AllocatorStats, ThreadAffinity, MIN_ALIGNMENT};
pub use config::{DoubleEndedConfig, MemoryConfig, PoolConfig, StackConfig};
pub use error::{MemoryError, MemoryResult, ViolationPolicy};
pub use memory::{
    DoubleEndedStackAllocator, GeneralPurposeAllocator, Global, GrowthDirection, LeakCheckingAllocator,
    Marker, PoolAllocator, StackAllocator, StackAllocatorProxy, StackScope,
};
pub use registry::{AllocatorReport, MemoryRegistry, MemoryTotals};
pub use sync::Synchronized;
pub use typed::{delete_in, delete_slice_in, new_in, new_zeroed_slice_in};
