//! # Stack Allocator
//!
//! A bump allocator over one region that grows from either end. Blocks are
//! released in LIFO order, one at a time or in bulk back to a [`Marker`].
//!
//! ## Safety Note
//!
//! Blocks carry no header. The allocation-size log is the only record of
//! where each live block starts, so every release is checked against it
//! before the bump pointer moves.

#![allow(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::allocator::{align_up, Allocator, AllocatorStatistics, MIN_ALIGNMENT};
use crate::config::StackConfig;
use crate::error::{MemoryError, MemoryResult, ViolationPolicy};
use crate::memory::general::{GeneralPurposeAllocator, Global};

/// End of the region a stack grows from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthDirection {
    /// From the low end towards higher addresses.
    Upward,
    /// From the high end towards lower addresses.
    Downward,
}

/// A captured top-of-stack position.
///
/// Passing it to [`StackAllocator::free_to_marker`] discards every
/// allocation made after it was captured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Marker(usize);

impl Marker {
    /// Address of the top of the stack when the marker was taken.
    #[inline]
    #[must_use]
    pub const fn address(self) -> usize {
        self.0
    }
}

/// Byte budget shared by stacks that carve up the same region.
#[derive(Debug)]
pub(crate) struct SharedBudget {
    capacity: usize,
    used: AtomicUsize,
}

impl SharedBudget {
    pub(crate) fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self { capacity, used: AtomicUsize::new(0) })
    }

    pub(crate) fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    fn try_reserve(&self, size: usize) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(size).filter(|&next| next <= self.capacity)
            })
            .is_ok()
    }

    fn release(&self, size: usize) {
        self.used.fetch_sub(size, Ordering::AcqRel);
    }
}

enum Backing<P> {
    /// Region obtained from and returned to a parent.
    Parent(P),
    /// Region owned by someone else.
    Borrowed,
}

/// Single-ended bump allocator with marker-based rollback.
///
/// `allocate` and `free` are O(1). Only the most recent live block may be
/// freed; anything else is a contract violation reported through
/// [`StackAllocator::try_free`] or the configured [`ViolationPolicy`].
///
/// Sizes are rounded up to [`MIN_ALIGNMENT`]; a zero-size request occupies
/// one full unit.
///
/// # Thread Safety
///
/// This stack is NOT thread-safe. Use one stack per thread (per frame, per
/// loading job) or wrap it in [`Synchronized`](crate::Synchronized).
///
/// # Example
///
/// ```rust,ignore
/// let stack = StackAllocator::new(GrowthDirection::Upward, 1024 * 1024)?;
///
/// let frame_start = stack.marker();
/// let scratch = stack.allocate(4096).expect("frame budget exceeded");
/// // ... per-frame work ...
/// stack.free_to_marker(frame_start)?;
/// ```
pub struct StackAllocator<'buf, P: Allocator = Global> {
    backing: Backing<P>,
    /// Low end of the region.
    base: NonNull<u8>,
    capacity: usize,
    direction: GrowthDirection,
    used: Cell<usize>,
    /// Aligned size of every live allocation, oldest first.
    log: RefCell<Vec<usize>>,
    num_allocations: Cell<usize>,
    num_frees: Cell<usize>,
    budget: Option<Arc<SharedBudget>>,
    policy: ViolationPolicy,
    _buffer: PhantomData<&'buf mut [u8]>,
}

impl StackAllocator<'static, Global> {
    /// Creates a stack backed by the default general-purpose allocator.
    ///
    /// `capacity` is rounded up to [`MIN_ALIGNMENT`].
    pub fn new(direction: GrowthDirection, capacity: usize) -> MemoryResult<Self> {
        Self::with_parent(direction, capacity, GeneralPurposeAllocator::global())
    }

    /// Creates a stack over a region owned by someone else.
    ///
    /// # Safety
    ///
    /// `base..base + capacity` must be valid for reads and writes, aligned to
    /// [`MIN_ALIGNMENT`], not used by anything else, and must outlive every
    /// block handed out by the stack.
    pub(crate) unsafe fn from_raw_region(
        direction: GrowthDirection,
        base: NonNull<u8>,
        capacity: usize,
        budget: Arc<SharedBudget>,
    ) -> Self {
        let mut stack = Self::from_parts(Backing::Borrowed, base, capacity, direction);
        stack.budget = Some(budget);
        stack
    }
}

impl<'buf> StackAllocator<'buf, Global> {
    /// Creates a stack over a caller-supplied buffer.
    ///
    /// The buffer is borrowed for the stack's lifetime and is not released
    /// when the stack is dropped. Leading bytes needed to reach
    /// [`MIN_ALIGNMENT`] and a trailing partial unit are left unused.
    #[must_use]
    pub fn with_buffer(direction: GrowthDirection, buffer: &'buf mut [u8]) -> Self {
        let len = buffer.len();
        let start = buffer.as_mut_ptr();
        let padding = start.align_offset(MIN_ALIGNMENT).min(len);
        let capacity = (len - padding) & !(MIN_ALIGNMENT - 1);

        // SAFETY: `padding <= len`, so the pointer stays inside the buffer
        // or one past its end; slices never start at null.
        let base = unsafe { NonNull::new_unchecked(start.add(padding)) };
        Self::from_parts(Backing::Borrowed, base, capacity, direction)
    }
}

impl<P: Allocator> StackAllocator<'static, P> {
    /// Creates a stack whose region is drawn from `parent`.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidConfig`] for a zero or overflowing capacity,
    /// [`MemoryError::ParentExhausted`] if the parent cannot provide it.
    pub fn with_parent(direction: GrowthDirection, capacity: usize, parent: P) -> MemoryResult<Self> {
        if capacity == 0 {
            return Err(MemoryError::InvalidConfig("stack capacity must be non-zero".to_owned()));
        }
        let capacity = align_up(capacity).ok_or_else(|| {
            MemoryError::InvalidConfig(format!("stack capacity {capacity} overflows"))
        })?;
        let base = parent
            .allocate(capacity)
            .ok_or(MemoryError::ParentExhausted { requested: capacity })?;

        tracing::debug!(?direction, capacity, "stack allocator created");
        Ok(Self::from_parts(Backing::Parent(parent), base, capacity, direction))
    }

    /// Creates a stack from a configuration entry.
    pub fn from_config(config: &StackConfig, parent: P) -> MemoryResult<Self> {
        Ok(Self::with_parent(config.direction, config.capacity, parent)?
            .with_violation_policy(config.violation_policy))
    }
}

impl<'buf, P: Allocator> StackAllocator<'buf, P> {
    fn from_parts(backing: Backing<P>, base: NonNull<u8>, capacity: usize, direction: GrowthDirection) -> Self {
        Self {
            backing,
            base,
            capacity,
            direction,
            used: Cell::new(0),
            log: RefCell::new(Vec::new()),
            num_allocations: Cell::new(0),
            num_frees: Cell::new(0),
            budget: None,
            policy: ViolationPolicy::default(),
            _buffer: PhantomData,
        }
    }

    /// Sets how misuse of [`Allocator::free`] is handled.
    #[must_use]
    pub fn with_violation_policy(mut self, policy: ViolationPolicy) -> Self {
        self.set_violation_policy(policy);
        self
    }

    pub(crate) fn set_violation_policy(&mut self, policy: ViolationPolicy) {
        self.policy = policy;
    }

    /// Growth direction.
    #[inline]
    #[must_use]
    pub const fn direction(&self) -> GrowthDirection {
        self.direction
    }

    /// Region size in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes between the base and the live top.
    #[inline]
    #[must_use]
    pub fn used(&self) -> usize {
        self.used.get()
    }

    /// Bytes still available in this stack's own region.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity - self.used.get()
    }

    /// Number of live allocations.
    #[inline]
    #[must_use]
    pub fn live_allocations(&self) -> usize {
        self.log.borrow().len()
    }

    /// Bytes reserved by the allocation-size log itself.
    #[must_use]
    pub fn log_storage_size(&self) -> usize {
        self.log.borrow().capacity() * mem::size_of::<usize>()
    }

    /// Whether the region is released to a parent on drop.
    #[inline]
    #[must_use]
    pub const fn owns_region(&self) -> bool {
        matches!(self.backing, Backing::Parent(_))
    }

    /// Whether `block` lies inside this stack's region.
    #[must_use]
    pub fn owns(&self, block: NonNull<u8>) -> bool {
        let base = self.base.as_ptr() as usize;
        let address = block.as_ptr() as usize;
        address >= base && address - base <= self.capacity
    }

    /// Captures the current top of the stack.
    #[inline]
    #[must_use]
    pub fn marker(&self) -> Marker {
        Marker(self.top_address(self.used.get()))
    }

    /// Captures the current top and rolls back to it when the scope drops.
    #[must_use]
    pub fn scope(&self) -> StackScope<'_, 'buf, P> {
        StackScope { stack: self, marker: self.marker() }
    }

    /// Releases the most recent allocation, reporting misuse.
    ///
    /// # Errors
    ///
    /// [`MemoryError::ForeignBlock`] if `block` is outside the region,
    /// [`MemoryError::OutOfOrderFree`] if it is not the top block. The stack
    /// is left untouched in both cases.
    pub fn try_free(&self, block: NonNull<u8>) -> MemoryResult<()> {
        let address = block.as_ptr() as usize;
        if !self.owns(block) {
            return Err(MemoryError::ForeignBlock { address });
        }

        let mut log = self.log.borrow_mut();
        let used = self.used.get();
        let expected = log.last().map(|&size| self.block_address(used, size));
        if expected != Some(address) {
            return Err(MemoryError::OutOfOrderFree { address, expected });
        }

        let size = log.pop().unwrap_or_default();
        self.rewind(used, size, 1);
        Ok(())
    }

    /// Discards every allocation made since `marker` was captured.
    ///
    /// A marker equal to the current top is a no-op.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidMarker`] if `marker` is not the top of the stack
    /// as it was before one of the live allocations; the stack is left
    /// untouched.
    pub fn free_to_marker(&self, marker: Marker) -> MemoryResult<()> {
        let mut log = self.log.borrow_mut();
        let used = self.used.get();

        let mut remaining = used;
        let mut popped = 0;
        if self.top_address(remaining) != marker.0 {
            let hit = log.iter().rev().any(|&size| {
                remaining -= size;
                popped += 1;
                self.top_address(remaining) == marker.0
            });
            if !hit {
                return Err(MemoryError::InvalidMarker { marker: marker.0 });
            }
        }

        let keep = log.len() - popped;
        log.truncate(keep);
        self.rewind(used, used - remaining, popped);
        Ok(())
    }

    /// Discards every live allocation.
    pub fn reset(&self) {
        let mut log = self.log.borrow_mut();
        let popped = log.len();
        log.clear();
        self.rewind(self.used.get(), self.used.get(), popped);
    }

    fn rewind(&self, used: usize, bytes: usize, count: usize) {
        self.used.set(used - bytes);
        self.num_frees.set(self.num_frees.get() + count);
        if let Some(budget) = &self.budget {
            budget.release(bytes);
        }
    }

    /// Offset from `base` of the top when `used` bytes are live.
    fn top_offset(&self, used: usize) -> usize {
        match self.direction {
            GrowthDirection::Upward => used,
            GrowthDirection::Downward => self.capacity - used,
        }
    }

    fn top_address(&self, used: usize) -> usize {
        self.base.as_ptr() as usize + self.top_offset(used)
    }

    /// Address of the newest block of `size` bytes when `used` bytes are live.
    fn block_address(&self, used: usize, size: usize) -> usize {
        let offset = match self.direction {
            GrowthDirection::Upward => used - size,
            GrowthDirection::Downward => self.capacity - used,
        };
        self.base.as_ptr() as usize + offset
    }
}

impl<P: Allocator> Allocator for StackAllocator<'_, P> {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        // Zero-size requests still take one unit, so every live block has
        // its own address and its own marker boundary.
        let aligned = align_up(size.max(1))?;
        let used = self.used.get();
        let next = match used.checked_add(aligned) {
            Some(next) if next <= self.capacity => next,
            _ => {
                tracing::trace!(size = aligned, used, capacity = self.capacity, "stack exhausted");
                return None;
            }
        };
        if let Some(budget) = &self.budget {
            if !budget.try_reserve(aligned) {
                tracing::trace!(size = aligned, "shared stack budget exhausted");
                return None;
            }
        }

        let offset = match self.direction {
            GrowthDirection::Upward => used,
            GrowthDirection::Downward => self.capacity - next,
        };
        self.used.set(next);
        self.log.borrow_mut().push(aligned);
        self.num_allocations.set(self.num_allocations.get() + 1);

        // SAFETY: `offset + aligned <= capacity`, so the block lies inside the
        // region, which never starts at null.
        Some(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) })
    }

    unsafe fn free(&self, block: NonNull<u8>) {
        if let Err(err) = self.try_free(block) {
            self.policy.report(&err);
        }
    }
}

impl<P: Allocator> AllocatorStatistics for StackAllocator<'_, P> {
    fn num_allocations(&self) -> usize {
        self.num_allocations.get()
    }

    fn num_frees(&self) -> usize {
        self.num_frees.get()
    }

    fn bytes_reserved(&self) -> usize {
        self.capacity + self.log_storage_size()
    }

    fn bytes_used(&self) -> usize {
        self.used.get()
    }

    fn parent_allocator(&self) -> Option<&dyn Allocator> {
        match &self.backing {
            Backing::Parent(parent) => Some(parent),
            Backing::Borrowed => None,
        }
    }
}

impl<P: Allocator> Drop for StackAllocator<'_, P> {
    fn drop(&mut self) {
        let live = self.log.get_mut().len();
        if live > 0 {
            tracing::debug!(live, used = self.used.get(), "stack dropped with live allocations");
        }
        if let Some(budget) = &self.budget {
            budget.release(self.used.get());
        }
        if let Backing::Parent(parent) = &self.backing {
            // SAFETY: `base` is the block the parent returned in `with_parent`,
            // released exactly once, here.
            unsafe { parent.free(self.base) };
            tracing::debug!(capacity = self.capacity, "stack region released");
        }
    }
}

// SAFETY: the stack exclusively owns (or exclusively borrows) its region;
// moving it to another thread moves that access along with the parent handle.
unsafe impl<P: Allocator + Send> Send for StackAllocator<'_, P> {}

impl<P: Allocator> std::fmt::Debug for StackAllocator<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackAllocator")
            .field("direction", &self.direction)
            .field("capacity", &self.capacity)
            .field("used", &self.used.get())
            .field("live", &self.log.borrow().len())
            .field("owns_region", &self.owns_region())
            .finish_non_exhaustive()
    }
}

/// Rolls a stack back to the position it had when the scope was opened.
///
/// Returned by [`StackAllocator::scope`]. If the position no longer exists
/// because blocks below it were freed, the failure goes to the stack's
/// [`ViolationPolicy`].
pub struct StackScope<'s, 'buf, P: Allocator = Global> {
    stack: &'s StackAllocator<'buf, P>,
    marker: Marker,
}

impl<P: Allocator> StackScope<'_, '_, P> {
    /// The marker this scope rolls back to.
    #[inline]
    #[must_use]
    pub const fn marker(&self) -> Marker {
        self.marker
    }
}

impl<P: Allocator> Drop for StackScope<'_, '_, P> {
    fn drop(&mut self) {
        if let Err(err) = self.stack.free_to_marker(self.marker) {
            self.stack.policy.report(&err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(block: NonNull<u8>) -> usize {
        block.as_ptr() as usize
    }

    #[test]
    fn test_upward_allocations_are_sequential() {
        let stack = StackAllocator::new(GrowthDirection::Upward, 128).unwrap();
        let base = stack.marker().address();

        let a = stack.allocate(32).unwrap();
        let b = stack.allocate(32).unwrap();
        assert_eq!(addr(a), base);
        assert_eq!(addr(b), base + 32);
        assert_eq!(stack.used(), 64);
        assert_eq!(stack.live_allocations(), 2);
    }

    #[test]
    fn test_downward_allocations_descend_from_the_top() {
        let stack = StackAllocator::new(GrowthDirection::Downward, 128).unwrap();
        let end = stack.marker().address();

        let a = stack.allocate(32).unwrap();
        let b = stack.allocate(16).unwrap();
        assert_eq!(addr(a), end - 32);
        assert_eq!(addr(b), end - 48);
        assert_eq!(stack.marker().address(), end - 48);

        stack.try_free(b).unwrap();
        stack.try_free(a).unwrap();
        assert_eq!(stack.marker().address(), end);
    }

    #[test]
    fn test_sizes_are_aligned() {
        let stack = StackAllocator::new(GrowthDirection::Upward, 256).unwrap();
        let _ = stack.allocate(1).unwrap();
        assert_eq!(stack.used(), MIN_ALIGNMENT);
        let block = stack.allocate(3).unwrap();
        assert_eq!(addr(block) % MIN_ALIGNMENT, 0);
    }

    #[test]
    fn test_zero_size_allocation_rolls_back_with_marker() {
        for direction in [GrowthDirection::Upward, GrowthDirection::Downward] {
            let stack = StackAllocator::new(direction, 128).unwrap();
            let a = stack.allocate(16).unwrap();
            let marker = stack.marker();

            stack.allocate(0).unwrap();
            assert_eq!(stack.used(), 16 + MIN_ALIGNMENT);
            assert_ne!(stack.marker(), marker);

            stack.free_to_marker(marker).unwrap();
            assert_eq!(stack.live_allocations(), 1);
            assert_eq!(stack.num_frees(), 1);

            stack.try_free(a).unwrap();
            assert_eq!(stack.used(), 0);
            assert_eq!(stack.num_frees(), 2);
        }
    }

    #[test]
    fn test_zero_size_block_has_its_own_address() {
        for direction in [GrowthDirection::Upward, GrowthDirection::Downward] {
            let stack = StackAllocator::new(direction, 128).unwrap();
            let empty = stack.allocate(0).unwrap();
            let a = stack.allocate(16).unwrap();
            assert_ne!(empty, a);

            assert_eq!(
                stack.try_free(empty),
                Err(MemoryError::OutOfOrderFree { address: addr(empty), expected: Some(addr(a)) })
            );
            assert_eq!(stack.used(), 16 + MIN_ALIGNMENT);

            // The block above stays intact and the next block lands past it.
            let b = stack.allocate(16).unwrap();
            assert!(addr(b).abs_diff(addr(a)) >= 16);

            stack.try_free(b).unwrap();
            stack.try_free(a).unwrap();
            stack.try_free(empty).unwrap();
            assert_eq!(stack.used(), 0);
        }
    }

    #[test]
    fn test_exhaustion_is_exact() {
        let stack = StackAllocator::new(GrowthDirection::Upward, 64).unwrap();
        assert!(stack.allocate(48).is_some());
        assert!(stack.allocate(32).is_none());
        assert!(stack.allocate(16).is_some());
        assert!(stack.allocate(1).is_none());
        assert_eq!(stack.used(), 64);
        assert_eq!(stack.num_allocations(), 2);
    }

    #[test]
    fn test_out_of_order_free_is_rejected() {
        let stack = StackAllocator::new(GrowthDirection::Upward, 128)
            .unwrap()
            .with_violation_policy(ViolationPolicy::Log);
        let a = stack.allocate(16).unwrap();
        let b = stack.allocate(16).unwrap();

        let err = stack.try_free(a).unwrap_err();
        assert_eq!(err, MemoryError::OutOfOrderFree { address: addr(a), expected: Some(addr(b)) });

        // Capability-level free is a no-op under the logging policy.
        unsafe { stack.free(a) };
        assert_eq!(stack.used(), 32);
        assert_eq!(stack.num_frees(), 0);

        unsafe {
            stack.free(b);
            stack.free(a);
        }
        assert_eq!(stack.used(), 0);
        assert_eq!(stack.num_frees(), 2);
    }

    #[test]
    fn test_free_on_empty_stack_is_rejected() {
        let stack = StackAllocator::new(GrowthDirection::Upward, 64).unwrap();
        let a = stack.allocate(16).unwrap();
        stack.try_free(a).unwrap();
        assert_eq!(
            stack.try_free(a),
            Err(MemoryError::OutOfOrderFree { address: addr(a), expected: None })
        );
    }

    #[test]
    fn test_foreign_block_is_rejected() {
        let stack = StackAllocator::new(GrowthDirection::Upward, 64).unwrap();
        let other = StackAllocator::new(GrowthDirection::Upward, 64).unwrap();
        let foreign = other.allocate(16).unwrap();
        assert!(matches!(stack.try_free(foreign), Err(MemoryError::ForeignBlock { .. })));
    }

    #[test]
    fn test_marker_round_trip() {
        for direction in [GrowthDirection::Upward, GrowthDirection::Downward] {
            let stack = StackAllocator::new(direction, 512).unwrap();
            let _keep = stack.allocate(40).unwrap();

            for extra in 0..5 {
                let marker = stack.marker();
                let used = stack.used();
                for _ in 0..extra {
                    stack.allocate(24).unwrap();
                }
                stack.free_to_marker(marker).unwrap();
                assert_eq!(stack.used(), used);
                assert_eq!(stack.marker(), marker);
                assert_eq!(stack.live_allocations(), 1);
            }
        }
    }

    #[test]
    fn test_free_to_marker_counts_frees() {
        let stack = StackAllocator::new(GrowthDirection::Upward, 256).unwrap();
        let marker = stack.marker();
        for _ in 0..3 {
            stack.allocate(16).unwrap();
        }
        stack.free_to_marker(marker).unwrap();
        assert_eq!(stack.num_allocations(), 3);
        assert_eq!(stack.num_frees(), 3);
        assert_eq!(stack.stats().live_allocations(), 0);
    }

    #[test]
    fn test_invalid_marker_leaves_stack_untouched() {
        let stack = StackAllocator::new(GrowthDirection::Upward, 256).unwrap();
        let _a = stack.allocate(32).unwrap();
        let inside = Marker(stack.marker().address() - 16);
        let beyond = Marker(stack.marker().address() + 64);

        assert_eq!(
            stack.free_to_marker(inside),
            Err(MemoryError::InvalidMarker { marker: inside.address() })
        );
        assert!(stack.free_to_marker(beyond).is_err());
        assert_eq!(stack.used(), 32);
    }

    #[test]
    fn test_reset() {
        let stack = StackAllocator::new(GrowthDirection::Downward, 128).unwrap();
        stack.allocate(16).unwrap();
        stack.allocate(16).unwrap();
        stack.reset();
        assert_eq!(stack.used(), 0);
        assert_eq!(stack.live_allocations(), 0);
        assert_eq!(stack.num_frees(), 2);
    }

    #[test]
    fn test_scope_rolls_back() {
        let stack = StackAllocator::new(GrowthDirection::Upward, 256).unwrap();
        let _level = stack.allocate(64).unwrap();
        {
            let scope = stack.scope();
            stack.allocate(32).unwrap();
            stack.allocate(32).unwrap();
            assert_eq!(stack.used(), 128);
            assert_eq!(scope.marker().address(), stack.marker().address() - 64);
        }
        assert_eq!(stack.used(), 64);
    }

    #[test]
    fn test_caller_buffer_is_borrowed() {
        let mut buffer = vec![0u8; 100];
        let stack = StackAllocator::with_buffer(GrowthDirection::Upward, &mut buffer);
        assert!(!stack.owns_region());
        assert!(stack.parent_allocator().is_none());
        assert!(stack.capacity() <= 100);
        assert_eq!(stack.capacity() % MIN_ALIGNMENT, 0);

        let block = stack.allocate(16).unwrap();
        unsafe { block.as_ptr().write_bytes(0xAB, 16) };
        stack.try_free(block).unwrap();
        drop(stack);

        assert!(buffer.iter().any(|&byte| byte == 0xAB));
    }

    #[test]
    fn test_region_comes_from_parent() {
        let heap = GeneralPurposeAllocator::new();
        {
            let stack = StackAllocator::with_parent(GrowthDirection::Upward, 100, &heap).unwrap();
            assert!(stack.owns_region());
            assert_eq!(stack.capacity(), align_up(100).unwrap());
            assert_eq!(heap.bytes_used(), stack.capacity());
        }
        assert_eq!(heap.bytes_used(), 0);
        assert_eq!(heap.num_frees(), 1);
    }

    #[test]
    fn test_invalid_construction() {
        assert!(matches!(
            StackAllocator::new(GrowthDirection::Upward, 0),
            Err(MemoryError::InvalidConfig(_))
        ));
        let tiny = StackAllocator::new(GrowthDirection::Upward, 64).unwrap();
        assert!(matches!(
            StackAllocator::with_parent(GrowthDirection::Upward, 128, &tiny),
            Err(MemoryError::ParentExhausted { requested: 128 })
        ));
    }

    #[test]
    fn test_reserved_bytes_include_log() {
        let stack = StackAllocator::new(GrowthDirection::Upward, 128).unwrap();
        stack.allocate(16).unwrap();
        assert!(stack.log_storage_size() >= mem::size_of::<usize>());
        assert_eq!(stack.bytes_reserved(), 128 + stack.log_storage_size());
    }

    #[test]
    #[should_panic(expected = "allocator contract violation")]
    fn test_strict_policy_panics() {
        let stack = StackAllocator::new(GrowthDirection::Upward, 64)
            .unwrap()
            .with_violation_policy(ViolationPolicy::Panic);
        let a = stack.allocate(16).unwrap();
        let _b = stack.allocate(16).unwrap();
        unsafe { stack.free(a) };
    }
}
