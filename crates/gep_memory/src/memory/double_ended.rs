//! # Double-Ended Stack Allocator
//!
//! One region, two stacks growing towards each other:
//!
//! ```text
//!  base                                                   base + capacity
//!   │ front ──────────▶            free            ◀────────── back │
//!   └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Typical split: the front holds per-level data, the back per-frame
//! scratch. Both draw from one fixed budget, enforced on every allocation,
//! so the two ends can never overlap.
//!
//! ## Safety Note
//!
//! The two stacks borrow the region through raw pointers. The region is
//! released in `Drop` and the stacks never touch it while being dropped.

#![allow(unsafe_code)]

use std::ptr::NonNull;
use std::sync::Arc;

use crate::allocator::{align_up, Allocator, AllocatorStatistics};
use crate::config::DoubleEndedConfig;
use crate::error::{MemoryError, MemoryResult, ViolationPolicy};
use crate::memory::general::{GeneralPurposeAllocator, Global};
use crate::memory::proxy::StackAllocatorProxy;
use crate::memory::stack::{GrowthDirection, SharedBudget, StackAllocator};

/// Two stack allocators sharing one region and one budget.
///
/// Hand [`front`](Self::front) and [`back`](Self::back) to unrelated
/// consumers; each must free in LIFO order within its own end.
///
/// The allocator itself also implements [`Allocator`] by serving from the
/// front end, and reports the sum of both ends as its statistics.
///
/// # Example
///
/// ```rust,ignore
/// let memory = DoubleEndedStackAllocator::new(16 * 1024 * 1024)?;
///
/// let level = memory.front();
/// let frame = memory.back();
///
/// let mesh = level.allocate(mesh_bytes).expect("level budget exceeded");
/// let scratch = frame.allocate(4096).expect("frame budget exceeded");
/// ```
pub struct DoubleEndedStackAllocator<P: Allocator = Global> {
    parent: P,
    region: NonNull<u8>,
    capacity: usize,
    budget: Arc<SharedBudget>,
    front: StackAllocatorProxy<'static>,
    back: StackAllocatorProxy<'static>,
}

impl DoubleEndedStackAllocator<Global> {
    /// Creates an allocator backed by the default general-purpose allocator.
    pub fn new(capacity: usize) -> MemoryResult<Self> {
        Self::with_parent(capacity, GeneralPurposeAllocator::global())
    }
}

impl<P: Allocator> DoubleEndedStackAllocator<P> {
    /// Creates an allocator whose region is drawn from `parent`.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidConfig`] for a zero or overflowing capacity,
    /// [`MemoryError::ParentExhausted`] if the parent cannot provide it.
    pub fn with_parent(capacity: usize, parent: P) -> MemoryResult<Self> {
        if capacity == 0 {
            return Err(MemoryError::InvalidConfig(
                "double-ended stack capacity must be non-zero".to_owned(),
            ));
        }
        let capacity = align_up(capacity).ok_or_else(|| {
            MemoryError::InvalidConfig(format!("double-ended stack capacity {capacity} overflows"))
        })?;
        let region = parent
            .allocate(capacity)
            .ok_or(MemoryError::ParentExhausted { requested: capacity })?;

        let budget = SharedBudget::new(capacity);
        // SAFETY: the region is MIN_ALIGNMENT-aligned, exclusively ours, and
        // outlives both stacks (it is released in `Drop`, after which the
        // stacks are only dropped, never used).
        let (front, back) = unsafe {
            (
                StackAllocator::from_raw_region(GrowthDirection::Upward, region, capacity, Arc::clone(&budget)),
                StackAllocator::from_raw_region(GrowthDirection::Downward, region, capacity, Arc::clone(&budget)),
            )
        };

        tracing::debug!(capacity, "double-ended stack allocator created");

        Ok(Self {
            parent,
            region,
            capacity,
            budget,
            front: StackAllocatorProxy::new(front),
            back: StackAllocatorProxy::new(back),
        })
    }

    /// Creates an allocator from a configuration entry.
    pub fn from_config(config: &DoubleEndedConfig, parent: P) -> MemoryResult<Self> {
        Ok(Self::with_parent(config.capacity, parent)?.with_violation_policy(config.violation_policy))
    }

    /// Sets how misuse of `free` is handled on both ends.
    #[must_use]
    pub fn with_violation_policy(mut self, policy: ViolationPolicy) -> Self {
        self.front.stack_mut().set_violation_policy(policy);
        self.back.stack_mut().set_violation_policy(policy);
        self
    }

    /// The end growing upward from the low address.
    #[inline]
    #[must_use]
    pub fn front(&self) -> &StackAllocatorProxy<'static> {
        &self.front
    }

    /// The end growing downward from the high address.
    #[inline]
    #[must_use]
    pub fn back(&self) -> &StackAllocatorProxy<'static> {
        &self.back
    }

    /// Total region size in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes used by the front end.
    #[inline]
    #[must_use]
    pub fn front_used(&self) -> usize {
        self.front.stack().used()
    }

    /// Bytes used by the back end.
    #[inline]
    #[must_use]
    pub fn back_used(&self) -> usize {
        self.back.stack().used()
    }

    /// Bytes left between the two ends.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity - self.budget.used()
    }

    /// Whether allocating `size` more bytes from either end would make the
    /// two ends meet or cross.
    ///
    /// Advisory only: every `allocate` performs this check itself and fails
    /// instead of overlapping. Sizes are measured the way the stacks take
    /// them: aligned, with zero counting as one unit.
    #[must_use]
    pub fn is_overlapping(&self, size: usize) -> bool {
        align_up(size.max(1)).map_or(true, |aligned| aligned > self.remaining())
    }

    /// Bytes reserved by the allocation-size logs of both ends.
    #[must_use]
    pub fn log_storage_size(&self) -> usize {
        self.front.stack().log_storage_size() + self.back.stack().log_storage_size()
    }
}

impl<P: Allocator> Allocator for DoubleEndedStackAllocator<P> {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.front.allocate(size)
    }

    unsafe fn free(&self, block: NonNull<u8>) {
        self.front.free(block);
    }
}

impl<P: Allocator> AllocatorStatistics for DoubleEndedStackAllocator<P> {
    fn num_allocations(&self) -> usize {
        self.front.stack().num_allocations() + self.back.stack().num_allocations()
    }

    fn num_frees(&self) -> usize {
        self.front.stack().num_frees() + self.back.stack().num_frees()
    }

    fn bytes_reserved(&self) -> usize {
        self.capacity + self.log_storage_size()
    }

    fn bytes_used(&self) -> usize {
        self.front_used() + self.back_used()
    }

    fn parent_allocator(&self) -> Option<&dyn Allocator> {
        Some(&self.parent)
    }
}

impl<P: Allocator> Drop for DoubleEndedStackAllocator<P> {
    fn drop(&mut self) {
        // SAFETY: the region came from `parent` in the constructor and is
        // released exactly once. The stacks dropped after this only update
        // their own counters.
        unsafe { self.parent.free(self.region) };
        tracing::debug!(capacity = self.capacity, "double-ended stack region released");
    }
}

// SAFETY: the allocator exclusively owns its region; the stacks only point
// into it and move together with it.
unsafe impl<P: Allocator + Send> Send for DoubleEndedStackAllocator<P> {}

impl<P: Allocator> std::fmt::Debug for DoubleEndedStackAllocator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoubleEndedStackAllocator")
            .field("capacity", &self.capacity)
            .field("front_used", &self.front_used())
            .field("back_used", &self.back_used())
            .finish_non_exhaustive()
    }
}
