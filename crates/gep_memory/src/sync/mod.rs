//! # Thread-Safe Allocator Wrapping
//!
//! Pool and stack allocators keep their bookkeeping in `Cell`s and are
//! therefore confined to one thread. [`Synchronized`] puts any allocator
//! behind a lock so it can be shared.
//!
//! ```text
//!   Thread A ──┐
//!              ├──▶ Synchronized<PoolAllocator> ──▶ parent
//!   Thread B ──┘        (parking_lot::Mutex)
//! ```

mod synchronized;

pub use synchronized::Synchronized;
