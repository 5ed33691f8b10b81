//! # Allocator Capabilities
//!
//! Two contracts shared by every allocator in the crate:
//!
//! - [`Allocator`]: acquire `size` bytes or fail, release what was acquired.
//! - [`AllocatorStatistics`]: optional counters for the diagnostics layer.
//!
//! ## Ownership
//!
//! A block returned by `allocate` is a loan. The caller owns it until it is
//! handed back through `free` on the *same* allocator, in the order that
//! allocator demands (any order for pools, LIFO for stacks).

#![allow(unsafe_code)]

use std::ptr::NonNull;

use serde::Serialize;

/// Alignment guaranteed for every block handed out by this crate.
///
/// Two machine words, the same promise the platform `malloc` makes.
pub const MIN_ALIGNMENT: usize = 2 * std::mem::size_of::<usize>();

/// Rounds `size` up to the next multiple of [`MIN_ALIGNMENT`].
///
/// Returns `None` if the rounded size does not fit in a `usize`.
#[inline]
#[must_use]
pub const fn align_up(size: usize) -> Option<usize> {
    match size.checked_add(MIN_ALIGNMENT - 1) {
        Some(padded) => Some(padded & !(MIN_ALIGNMENT - 1)),
        None => None,
    }
}

/// The minimal allocation contract.
///
/// Implementations take `&self` so one allocator can serve as the parent of
/// several others; any bookkeeping lives behind interior mutability. Whether
/// that bookkeeping may be touched from several threads is expressed by the
/// type's `Sync` implementation (see [`ThreadAffinity`]).
pub trait Allocator {
    /// Reserves `size` bytes aligned to [`MIN_ALIGNMENT`].
    ///
    /// Returns `None` when the request cannot be satisfied. A request is never
    /// partially satisfied.
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// Releases a block previously returned by [`Allocator::allocate`].
    ///
    /// # Safety
    ///
    /// `block` must have been returned by `allocate` on this instance and must
    /// not have been released since. The memory must not be accessed after
    /// this call. Allocators that can recognise foreign or out-of-order blocks
    /// route them to their [`ViolationPolicy`](crate::ViolationPolicy) instead
    /// of corrupting state.
    unsafe fn free(&self, block: NonNull<u8>);
}

/// Whether an allocator may be shared between threads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadAffinity {
    /// Single-owner use only. The type is `!Sync`.
    #[default]
    Confined,
    /// Internally synchronized. The type is `Sync`.
    Shared,
}

/// Optional statistics extension of [`Allocator`].
pub trait AllocatorStatistics: Allocator {
    /// Number of allocations served so far (cumulative).
    fn num_allocations(&self) -> usize;

    /// Number of blocks released so far (cumulative).
    fn num_frees(&self) -> usize;

    /// Bytes this allocator holds on to: its capacity, or its peak usage for
    /// allocators without a fixed region.
    fn bytes_reserved(&self) -> usize;

    /// Bytes currently handed out to live allocations.
    fn bytes_used(&self) -> usize;

    /// The allocator this one draws its region from, if any.
    fn parent_allocator(&self) -> Option<&dyn Allocator>;

    /// Thread affinity of this allocator.
    fn affinity(&self) -> ThreadAffinity {
        ThreadAffinity::Confined
    }

    /// Captures all counters at once.
    fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            num_allocations: self.num_allocations(),
            num_frees: self.num_frees(),
            bytes_reserved: self.bytes_reserved(),
            bytes_used: self.bytes_used(),
            has_parent: self.parent_allocator().is_some(),
            affinity: self.affinity(),
        }
    }
}

/// Point-in-time copy of an allocator's statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AllocatorStats {
    /// Cumulative allocation count.
    pub num_allocations: usize,
    /// Cumulative free count.
    pub num_frees: usize,
    /// Reserved bytes (capacity or peak).
    pub bytes_reserved: usize,
    /// Bytes in live allocations.
    pub bytes_used: usize,
    /// Whether the allocator draws from a parent.
    pub has_parent: bool,
    /// Thread affinity.
    pub affinity: ThreadAffinity,
}

impl AllocatorStats {
    /// Allocations that have not been released yet.
    #[inline]
    #[must_use]
    pub const fn live_allocations(&self) -> usize {
        self.num_allocations.saturating_sub(self.num_frees)
    }
}

impl<A: Allocator + ?Sized> Allocator for &A {
    #[inline]
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        (**self).allocate(size)
    }

    #[inline]
    unsafe fn free(&self, block: NonNull<u8>) {
        (**self).free(block);
    }
}

impl<A: AllocatorStatistics + ?Sized> AllocatorStatistics for &A {
    fn num_allocations(&self) -> usize {
        (**self).num_allocations()
    }

    fn num_frees(&self) -> usize {
        (**self).num_frees()
    }

    fn bytes_reserved(&self) -> usize {
        (**self).bytes_reserved()
    }

    fn bytes_used(&self) -> usize {
        (**self).bytes_used()
    }

    fn parent_allocator(&self) -> Option<&dyn Allocator> {
        (**self).parent_allocator()
    }

    fn affinity(&self) -> ThreadAffinity {
        (**self).affinity()
    }
}
