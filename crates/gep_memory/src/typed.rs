//! # Typed Construction
//!
//! Places values and zeroed slices in memory obtained from any [`Allocator`],
//! and tears them down again.
//!
//! The allocators only guarantee [`MIN_ALIGNMENT`]; types that need more are
//! refused the same way an exhausted allocator refuses, with `None`.
//!
//! ## Safety Note
//!
//! The returned pointers are raw. The caller owns the value until it hands
//! the pointer back to `delete_in` / `delete_slice_in` on the same allocator.

#![allow(unsafe_code)]

use std::mem;
use std::ptr::{self, NonNull};

use bytemuck::Zeroable;

use crate::allocator::{Allocator, MIN_ALIGNMENT};

#[inline]
const fn fits_alignment<T>() -> bool {
    mem::align_of::<T>() <= MIN_ALIGNMENT
}

/// Moves `value` into a block from `allocator`.
///
/// Returns `None` (dropping `value`) if the allocator is exhausted or `T`
/// needs more than [`MIN_ALIGNMENT`].
///
/// # Example
///
/// ```rust,ignore
/// let pool = PoolAllocator::new(mem::size_of::<Particle>(), 4096)?;
/// let particle = new_in(&pool, Particle::default()).expect("particle pool exhausted");
/// // ...
/// unsafe { delete_in(&pool, particle) };
/// ```
pub fn new_in<T, A: Allocator + ?Sized>(allocator: &A, value: T) -> Option<NonNull<T>> {
    if !fits_alignment::<T>() {
        tracing::trace!(align = mem::align_of::<T>(), "type alignment exceeds allocator guarantee");
        return None;
    }
    let block = allocator.allocate(mem::size_of::<T>())?.cast::<T>();
    // SAFETY: the block is large enough and sufficiently aligned for `T`.
    unsafe { block.as_ptr().write(value) };
    Some(block)
}

/// Drops the value and returns its block to `allocator`.
///
/// # Safety
///
/// `value` must come from [`new_in`] on the same allocator and must not be
/// used afterwards.
pub unsafe fn delete_in<T, A: Allocator + ?Sized>(allocator: &A, value: NonNull<T>) {
    ptr::drop_in_place(value.as_ptr());
    allocator.free(value.cast());
}

/// Allocates `len` zero-initialized elements from `allocator`.
///
/// Returns `None` if the allocator is exhausted, the byte size overflows,
/// or `T` needs more than [`MIN_ALIGNMENT`].
pub fn new_zeroed_slice_in<T: Zeroable, A: Allocator + ?Sized>(
    allocator: &A,
    len: usize,
) -> Option<NonNull<[T]>> {
    if !fits_alignment::<T>() {
        tracing::trace!(align = mem::align_of::<T>(), "type alignment exceeds allocator guarantee");
        return None;
    }
    let bytes = mem::size_of::<T>().checked_mul(len)?;
    let block = allocator.allocate(bytes)?;
    // SAFETY: the block holds `bytes` writable bytes, and all-zero is a valid
    // `T` by the `Zeroable` contract.
    unsafe { block.as_ptr().write_bytes(0, bytes) };
    Some(NonNull::slice_from_raw_parts(block.cast::<T>(), len))
}

/// Drops every element and returns the slice's block to `allocator`.
///
/// # Safety
///
/// `slice` must come from [`new_zeroed_slice_in`] on the same allocator and
/// must not be used afterwards.
pub unsafe fn delete_slice_in<T, A: Allocator + ?Sized>(allocator: &A, slice: NonNull<[T]>) {
    ptr::drop_in_place(slice.as_ptr());
    allocator.free(slice.cast::<u8>());
}
