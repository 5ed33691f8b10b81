//! # General-Purpose Allocator
//!
//! Lock-protected wrapper over the global heap. Every allocator tree ends
//! here: pools and stacks take their regions from it unless told otherwise.
//!
//! ## Safety Note
//!
//! The heap needs the original layout to release a block, so each block
//! carries a one-alignment-unit header holding its requested size. The
//! header is invisible to callers and to the byte statistics.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use parking_lot::Mutex;

use crate::allocator::{Allocator, AllocatorStatistics, ThreadAffinity, MIN_ALIGNMENT};

/// Bytes in front of every block, holding the requested size.
const HEADER_SIZE: usize = MIN_ALIGNMENT;

/// The process-wide default instance.
static GLOBAL: GeneralPurposeAllocator = GeneralPurposeAllocator::new();

/// Handle type of the default instance; the default parent of every
/// region-owning allocator.
pub type Global = &'static GeneralPurposeAllocator;

#[derive(Debug)]
struct Counters {
    num_allocations: usize,
    num_frees: usize,
    bytes_used: usize,
    peak_bytes_used: usize,
}

/// Thread-safe allocator backed by the global heap.
///
/// Use [`GeneralPurposeAllocator::global`] for the shared default instance,
/// or construct a private one with [`GeneralPurposeAllocator::new`] and pass it
/// by reference to the subsystems that should be accounted separately.
///
/// # Accounting
///
/// `std::alloc` has no portable query for the usable size of a live block,
/// so the allocator records sizes itself in a [`MIN_ALIGNMENT`]-byte header
/// in front of every block. Byte statistics count the requested sizes; the
/// header and any slack the system allocator adds are not included.
/// [`GeneralPurposeAllocator::allocation_size`] reads the header.
///
/// # Example
///
/// ```rust,ignore
/// let heap = GeneralPurposeAllocator::global();
/// let block = heap.allocate(256).expect("heap exhausted");
/// unsafe { heap.free(block) };
/// ```
#[derive(Debug)]
pub struct GeneralPurposeAllocator {
    counters: Mutex<Counters>,
}

impl GeneralPurposeAllocator {
    /// Creates an allocator with zeroed statistics.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counters: parking_lot::const_mutex(Counters {
                num_allocations: 0,
                num_frees: 0,
                bytes_used: 0,
                peak_bytes_used: 0,
            }),
        }
    }

    /// Returns the shared default instance.
    #[inline]
    #[must_use]
    pub fn global() -> Global {
        &GLOBAL
    }

    /// Returns the requested size of a live block.
    ///
    /// # Safety
    ///
    /// `block` must have been returned by `allocate` on an instance of this
    /// type and must not have been released yet.
    #[must_use]
    pub unsafe fn allocation_size(block: NonNull<u8>) -> usize {
        block.as_ptr().sub(HEADER_SIZE).cast::<usize>().read()
    }

    fn layout_for(size: usize) -> Option<Layout> {
        let total = size.checked_add(HEADER_SIZE)?;
        Layout::from_size_align(total, MIN_ALIGNMENT).ok()
    }
}

impl Default for GeneralPurposeAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator for GeneralPurposeAllocator {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let layout = Self::layout_for(size)?;

        // SAFETY: the layout is never zero-sized, it always covers the header.
        let base = NonNull::new(unsafe { alloc::alloc(layout) })?;

        // SAFETY: the header is the first, MIN_ALIGNMENT-aligned word of the
        // fresh block; the payload starts right behind it, still in bounds.
        let block = unsafe {
            base.as_ptr().cast::<usize>().write(size);
            NonNull::new_unchecked(base.as_ptr().add(HEADER_SIZE))
        };

        let mut counters = self.counters.lock();
        counters.num_allocations += 1;
        counters.bytes_used += size;
        if counters.bytes_used > counters.peak_bytes_used {
            counters.peak_bytes_used = counters.bytes_used;
        }

        Some(block)
    }

    unsafe fn free(&self, block: NonNull<u8>) {
        let size = Self::allocation_size(block);
        let base = block.as_ptr().sub(HEADER_SIZE);
        // The layout was valid when the block was allocated with this size.
        let layout = Layout::from_size_align_unchecked(size + HEADER_SIZE, MIN_ALIGNMENT);
        alloc::dealloc(base, layout);

        let mut counters = self.counters.lock();
        counters.num_frees += 1;
        counters.bytes_used -= size;
    }
}

impl AllocatorStatistics for GeneralPurposeAllocator {
    fn num_allocations(&self) -> usize {
        self.counters.lock().num_allocations
    }

    fn num_frees(&self) -> usize {
        self.counters.lock().num_frees
    }

    fn bytes_reserved(&self) -> usize {
        self.counters.lock().peak_bytes_used
    }

    fn bytes_used(&self) -> usize {
        self.counters.lock().bytes_used
    }

    fn parent_allocator(&self) -> Option<&dyn Allocator> {
        None
    }

    fn affinity(&self) -> ThreadAffinity {
        ThreadAffinity::Shared
    }
}
