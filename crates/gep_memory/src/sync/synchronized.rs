//! # Synchronized Allocator
//!
//! A mutex-guarded wrapper that makes a thread-confined allocator shareable.
//!
//! ## Safety Note
//!
//! `free` forwards the caller's guarantee to the wrapped allocator under the
//! lock; no additional invariants are introduced here.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use parking_lot::{Mutex, MutexGuard};

use crate::allocator::{Allocator, AllocatorStatistics, ThreadAffinity};

/// Serializes every call into the wrapped allocator.
///
/// # Thread Safety
///
/// `Synchronized<A>` is `Sync` whenever `A` is `Send`, which covers every
/// allocator in this crate whose parent is `Send`.
///
/// The parent link is not exposed through [`AllocatorStatistics`], because a
/// reference into the wrapped allocator cannot outlive the lock. Use
/// [`Synchronized::with_inner`] to reach it.
///
/// # Example
///
/// ```rust,ignore
/// let pool = Synchronized::new(PoolAllocator::new(64, 1024)?);
///
/// std::thread::scope(|s| {
///     s.spawn(|| pool.allocate(64));
///     s.spawn(|| pool.allocate(64));
/// });
/// ```
#[derive(Debug, Default)]
pub struct Synchronized<A> {
    inner: Mutex<A>,
}

impl<A> Synchronized<A> {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: A) -> Self {
        Self { inner: Mutex::new(inner) }
    }

    /// Unwraps the allocator.
    #[must_use]
    pub fn into_inner(self) -> A {
        self.inner.into_inner()
    }

    /// Locks the allocator for a sequence of operations.
    ///
    /// Useful for marker-based rollback on a shared stack, which must not
    /// interleave with other threads' allocations.
    pub fn lock(&self) -> MutexGuard<'_, A> {
        self.inner.lock()
    }

    /// Runs `f` with the allocator locked.
    pub fn with_inner<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        f(&self.inner.lock())
    }
}

impl<A: Allocator> Allocator for Synchronized<A> {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.inner.lock().allocate(size)
    }

    unsafe fn free(&self, block: NonNull<u8>) {
        self.inner.lock().free(block);
    }
}

impl<A: AllocatorStatistics> AllocatorStatistics for Synchronized<A> {
    fn num_allocations(&self) -> usize {
        self.inner.lock().num_allocations()
    }

    fn num_frees(&self) -> usize {
        self.inner.lock().num_frees()
    }

    fn bytes_reserved(&self) -> usize {
        self.inner.lock().bytes_reserved()
    }

    fn bytes_used(&self) -> usize {
        self.inner.lock().bytes_used()
    }

    fn parent_allocator(&self) -> Option<&dyn Allocator> {
        None
    }

    fn affinity(&self) -> ThreadAffinity {
        ThreadAffinity::Shared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{GeneralPurposeAllocator, GrowthDirection, PoolAllocator, StackAllocator};

    #[test]
    fn test_pool_shared_across_threads() {
        let heap = GeneralPurposeAllocator::new();
        let pool = Synchronized::new(PoolAllocator::with_parent(32, 64, &heap).unwrap());
        assert_eq!(pool.affinity(), ThreadAffinity::Shared);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..100 {
                        let block = pool.allocate(32).unwrap();
                        unsafe { pool.free(block) };
                    }
                });
            }
        });

        assert_eq!(pool.num_allocations(), 400);
        assert_eq!(pool.num_frees(), 400);
        assert_eq!(pool.bytes_used(), 0);
        assert!(pool.parent_allocator().is_none());
        assert!(pool.with_inner(|inner| inner.parent_allocator().is_some()));
    }

    #[test]
    fn test_lock_allows_marker_rollback() {
        let stack = Synchronized::new(StackAllocator::new(GrowthDirection::Upward, 256).unwrap());
        {
            let guard = stack.lock();
            let marker = guard.marker();
            guard.allocate(64).unwrap();
            guard.allocate(64).unwrap();
            guard.free_to_marker(marker).unwrap();
        }
        assert_eq!(stack.bytes_used(), 0);
        assert_eq!(stack.into_inner().num_frees(), 2);
    }
}
