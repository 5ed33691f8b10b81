//! # Leak-Checking Allocator
//!
//! A decorator that counts its own allocations and frees, independently of
//! the allocator it wraps, and refuses to die while they disagree.
//!
//! Give each subsystem its own checker over the shared heap to get a
//! per-subsystem leak audit at shutdown.

#![allow(unsafe_code)]

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::allocator::{Allocator, AllocatorStatistics, ThreadAffinity};
use crate::error::{MemoryError, MemoryResult};
use crate::memory::general::{GeneralPurposeAllocator, Global};

/// Counts allocations and frees and asserts they match at teardown.
///
/// Only successful allocations are counted. The byte statistics and the
/// parent link are those of the wrapped allocator.
///
/// # Panics
///
/// Dropping the checker while blocks obtained through it are still live
/// panics with a [`MemoryError::LeakDetected`] message.
#[derive(Debug)]
pub struct LeakCheckingAllocator<A = Global> {
    name: String,
    inner: A,
    alloc_count: AtomicUsize,
    free_count: AtomicUsize,
}

impl LeakCheckingAllocator<Global> {
    /// Creates a checker over the default general-purpose allocator.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::wrap(name, GeneralPurposeAllocator::global())
    }
}

impl<A> LeakCheckingAllocator<A> {
    /// Creates a checker over `inner`.
    #[must_use]
    pub fn wrap(name: impl Into<String>, inner: A) -> Self {
        Self {
            name: name.into(),
            inner,
            alloc_count: AtomicUsize::new(0),
            free_count: AtomicUsize::new(0),
        }
    }

    /// Name of the audited scope.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wrapped allocator.
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Allocations made through this checker.
    #[inline]
    #[must_use]
    pub fn alloc_count(&self) -> usize {
        self.alloc_count.load(Ordering::Acquire)
    }

    /// Frees made through this checker.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_count.load(Ordering::Acquire)
    }

    /// Blocks obtained through this checker and not yet released.
    #[inline]
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.alloc_count().saturating_sub(self.free_count())
    }

    /// Audits the counters without tearing the checker down.
    pub fn check(&self) -> MemoryResult<()> {
        let allocations = self.alloc_count();
        let frees = self.free_count();
        if allocations == frees {
            return Ok(());
        }
        Err(MemoryError::LeakDetected {
            name: self.name.clone(),
            allocations,
            frees,
        })
    }
}

impl<A: Allocator> Allocator for LeakCheckingAllocator<A> {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let block = self.inner.allocate(size)?;
        self.alloc_count.fetch_add(1, Ordering::AcqRel);
        Some(block)
    }

    unsafe fn free(&self, block: NonNull<u8>) {
        self.free_count.fetch_add(1, Ordering::AcqRel);
        self.inner.free(block);
    }
}

impl<A: AllocatorStatistics> AllocatorStatistics for LeakCheckingAllocator<A> {
    fn num_allocations(&self) -> usize {
        self.inner.num_allocations()
    }

    fn num_frees(&self) -> usize {
        self.inner.num_frees()
    }

    fn bytes_reserved(&self) -> usize {
        self.inner.bytes_reserved()
    }

    fn bytes_used(&self) -> usize {
        self.inner.bytes_used()
    }

    fn parent_allocator(&self) -> Option<&dyn Allocator> {
        self.inner.parent_allocator()
    }

    fn affinity(&self) -> ThreadAffinity {
        self.inner.affinity()
    }
}

impl<A> Drop for LeakCheckingAllocator<A> {
    fn drop(&mut self) {
        let Err(err) = self.check() else {
            tracing::debug!(scope = %self.name, "leak check passed");
            return;
        };

        tracing::error!(error = %err, "leak check failed");
        // A second panic during unwinding would abort without a message.
        if !std::thread::panicking() {
            panic!("{err}");
        }
    }
}
