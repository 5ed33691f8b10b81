//! # Pool Allocator
//!
//! Fixed-size chunk allocator for objects that are frequently allocated and
//! freed: particles, packets, scene nodes.
//!
//! ## Safety Note
//!
//! The chunks and the free-index stack both live in raw memory taken from
//! the parent allocator. All pointer arithmetic stays inside those two
//! regions; indices on the free stack are always `< chunk_count`.

#![allow(unsafe_code)]

use std::cell::Cell;
use std::mem;
use std::ptr::NonNull;

use crate::allocator::{align_up, Allocator, AllocatorStatistics};
use crate::config::PoolConfig;
use crate::error::{MemoryError, MemoryResult, ViolationPolicy};
use crate::memory::general::{GeneralPurposeAllocator, Global};

/// A pool of equally sized chunks carved from one region.
///
/// Chunks can be allocated and freed individually and in any order. Free
/// chunks are tracked by index on a stack, so both operations are O(1).
///
/// # Statistics
///
/// `num_allocations` and `num_frees` are cumulative counters. The number of
/// chunks currently in use is [`PoolAllocator::live_chunks`]; `bytes_used`
/// derives from it.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread or wrap it in
/// [`Synchronized`](crate::Synchronized).
///
/// # Example
///
/// ```rust,ignore
/// let pool = PoolAllocator::new(64, 1024)?;
///
/// // Allocate - O(1), no heap allocation
/// let chunk = pool.allocate(48).expect("pool exhausted");
///
/// // Free - O(1), no heap deallocation
/// unsafe { pool.free(chunk) };
/// ```
pub struct PoolAllocator<P: Allocator = Global> {
    parent: P,
    /// First chunk. Chunk `i` starts at `slots + i * chunk_size`.
    slots: NonNull<u8>,
    /// Stack of free chunk indices; the top is at `free_count - 1`.
    free_indices: NonNull<usize>,
    chunk_size: usize,
    chunk_count: usize,
    free_count: Cell<usize>,
    num_allocations: Cell<usize>,
    num_frees: Cell<usize>,
    policy: ViolationPolicy,
}

impl PoolAllocator<Global> {
    /// Creates a pool backed by the default general-purpose allocator.
    ///
    /// `chunk_size` is rounded up to [`MIN_ALIGNMENT`](crate::MIN_ALIGNMENT).
    pub fn new(chunk_size: usize, chunk_count: usize) -> MemoryResult<Self> {
        Self::with_parent(chunk_size, chunk_count, GeneralPurposeAllocator::global())
    }
}

impl<P: Allocator> PoolAllocator<P> {
    /// Creates a pool whose region is drawn from `parent`.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidConfig`] for zero sizes or overflowing totals,
    /// [`MemoryError::ParentExhausted`] if the parent cannot provide the
    /// chunks or the free-index stack.
    pub fn with_parent(chunk_size: usize, chunk_count: usize, parent: P) -> MemoryResult<Self> {
        if chunk_size == 0 || chunk_count == 0 {
            return Err(MemoryError::InvalidConfig(format!(
                "pool needs a non-zero chunk size and count, got {chunk_size} x {chunk_count}"
            )));
        }
        let overflow = || {
            MemoryError::InvalidConfig(format!("pool of {chunk_count} x {chunk_size} bytes overflows"))
        };
        let chunk_size = align_up(chunk_size).ok_or_else(overflow)?;
        let region_size = chunk_size.checked_mul(chunk_count).ok_or_else(overflow)?;
        let index_size = mem::size_of::<usize>().checked_mul(chunk_count).ok_or_else(overflow)?;

        let slots = parent
            .allocate(region_size)
            .ok_or(MemoryError::ParentExhausted { requested: region_size })?;
        let Some(free_indices) = parent.allocate(index_size) else {
            // SAFETY: `slots` was just obtained from `parent` and is unused.
            unsafe { parent.free(slots) };
            return Err(MemoryError::ParentExhausted { requested: index_size });
        };
        let free_indices = free_indices.cast::<usize>();

        // Lowest index on top, so chunks are handed out front to back.
        for position in 0..chunk_count {
            // SAFETY: `position < chunk_count`, the stack holds `chunk_count`
            // words and parent blocks are MIN_ALIGNMENT-aligned.
            unsafe { free_indices.as_ptr().add(position).write(chunk_count - 1 - position) };
        }

        tracing::debug!(chunk_size, chunk_count, region_size, "pool allocator created");

        Ok(Self {
            parent,
            slots,
            free_indices,
            chunk_size,
            chunk_count,
            free_count: Cell::new(chunk_count),
            num_allocations: Cell::new(0),
            num_frees: Cell::new(0),
            policy: ViolationPolicy::default(),
        })
    }

    /// Creates a pool from a configuration entry.
    pub fn from_config(config: &PoolConfig, parent: P) -> MemoryResult<Self> {
        Ok(Self::with_parent(config.chunk_size, config.chunk_count, parent)?
            .with_violation_policy(config.violation_policy))
    }

    /// Sets how misuse of [`Allocator::free`] is handled.
    #[must_use]
    pub fn with_violation_policy(mut self, policy: ViolationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Size of each chunk in bytes (already aligned).
    #[inline]
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Total number of chunks.
    #[inline]
    #[must_use]
    pub const fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Number of chunks available for allocation.
    #[inline]
    #[must_use]
    pub fn free_chunks(&self) -> usize {
        self.free_count.get()
    }

    /// Number of chunks currently handed out.
    #[inline]
    #[must_use]
    pub fn live_chunks(&self) -> usize {
        self.chunk_count - self.free_count.get()
    }

    /// Bytes occupied by the free-index stack.
    #[inline]
    #[must_use]
    pub const fn free_list_size(&self) -> usize {
        self.chunk_count * mem::size_of::<usize>()
    }

    /// Whether `block` points into this pool's chunk region.
    #[must_use]
    pub fn owns(&self, block: NonNull<u8>) -> bool {
        let base = self.slots.as_ptr() as usize;
        let address = block.as_ptr() as usize;
        address >= base && address - base < self.chunk_size * self.chunk_count
    }

    /// Releases a chunk, reporting misuse instead of ignoring it.
    ///
    /// # Errors
    ///
    /// [`MemoryError::ForeignBlock`] if `block` is not the start of a chunk
    /// of this pool, [`MemoryError::DoubleFree`] if the chunk is already free.
    /// The pool is left untouched in both cases.
    pub fn try_free(&self, block: NonNull<u8>) -> MemoryResult<()> {
        let address = block.as_ptr() as usize;
        let index = self
            .chunk_index(address)
            .ok_or(MemoryError::ForeignBlock { address })?;

        let free_count = self.free_count.get();
        if self.free_index_slice().contains(&index) {
            return Err(MemoryError::DoubleFree { address });
        }

        // SAFETY: a live chunk exists, so `free_count < chunk_count` and the
        // slot at `free_count` is inside the free-index stack.
        unsafe { self.free_indices.as_ptr().add(free_count).write(index) };
        self.free_count.set(free_count + 1);
        self.num_frees.set(self.num_frees.get() + 1);
        Ok(())
    }

    fn chunk_index(&self, address: usize) -> Option<usize> {
        let offset = address.checked_sub(self.slots.as_ptr() as usize)?;
        let index = offset / self.chunk_size;
        (offset % self.chunk_size == 0 && index < self.chunk_count).then_some(index)
    }

    fn free_index_slice(&self) -> &[usize] {
        // SAFETY: the first `free_count` words of the stack are initialised
        // and nothing writes to them while the slice is alive.
        unsafe { std::slice::from_raw_parts(self.free_indices.as_ptr(), self.free_count.get()) }
    }
}

impl<P: Allocator> Allocator for PoolAllocator<P> {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if size > self.chunk_size {
            tracing::trace!(size, chunk_size = self.chunk_size, "pool request larger than a chunk");
            return None;
        }
        let free_count = self.free_count.get();
        if free_count == 0 {
            tracing::trace!(chunk_count = self.chunk_count, "pool exhausted");
            return None;
        }

        // SAFETY: `free_count - 1` is the initialised top of the stack and
        // every stored index is `< chunk_count`.
        let block = unsafe {
            let index = self.free_indices.as_ptr().add(free_count - 1).read();
            NonNull::new_unchecked(self.slots.as_ptr().add(index * self.chunk_size))
        };

        self.free_count.set(free_count - 1);
        self.num_allocations.set(self.num_allocations.get() + 1);
        Some(block)
    }

    unsafe fn free(&self, block: NonNull<u8>) {
        if let Err(err) = self.try_free(block) {
            self.policy.report(&err);
        }
    }
}

impl<P: Allocator> AllocatorStatistics for PoolAllocator<P> {
    fn num_allocations(&self) -> usize {
        self.num_allocations.get()
    }

    fn num_frees(&self) -> usize {
        self.num_frees.get()
    }

    fn bytes_reserved(&self) -> usize {
        self.chunk_size * self.chunk_count + self.free_list_size()
    }

    fn bytes_used(&self) -> usize {
        self.chunk_size * self.live_chunks()
    }

    fn parent_allocator(&self) -> Option<&dyn Allocator> {
        Some(&self.parent)
    }
}

impl<P: Allocator> Drop for PoolAllocator<P> {
    fn drop(&mut self) {
        let live = self.live_chunks();
        if live > 0 {
            tracing::warn!(live, chunk_size = self.chunk_size, "pool dropped with live chunks");
        }
        // SAFETY: both regions came from `parent` in the constructor and are
        // released exactly once, here.
        unsafe {
            self.parent.free(self.free_indices.cast());
            self.parent.free(self.slots);
        }
        tracing::debug!(chunk_size = self.chunk_size, chunk_count = self.chunk_count, "pool region released");
    }
}

// SAFETY: the pool exclusively owns both regions; moving it to another thread
// moves that ownership along with the parent handle.
unsafe impl<P: Allocator + Send> Send for PoolAllocator<P> {}

impl<P: Allocator> std::fmt::Debug for PoolAllocator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_count", &self.chunk_count)
            .field("free_chunks", &self.free_count.get())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
