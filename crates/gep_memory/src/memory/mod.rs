//! # Allocator Implementations
//!
//! Every allocator here can sit on top of any other:
//!
//! ```text
//!   GeneralPurposeAllocator (global heap)
//!     ├── PoolAllocator            fixed-size chunks
//!     ├── StackAllocator           LIFO with markers
//!     │     └── StackAllocatorProxy
//!     ├── DoubleEndedStackAllocator
//!     │     ├── front: StackAllocatorProxy
//!     │     └── back:  StackAllocatorProxy
//!     └── LeakCheckingAllocator    decorator, any layer
//! ```
//!
//! Regions are acquired once, at construction, and returned at drop.

mod double_ended;
mod general;
mod leak_check;
mod pool;
mod proxy;
mod stack;

pub use double_ended::DoubleEndedStackAllocator;
pub use general::{GeneralPurposeAllocator, Global};
pub use leak_check::LeakCheckingAllocator;
pub use pool::PoolAllocator;
pub use proxy::StackAllocatorProxy;
pub use stack::{GrowthDirection, Marker, StackAllocator, StackScope};
