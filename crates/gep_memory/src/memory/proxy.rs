//! # Stack Allocator Proxy
//!
//! Hands out a stack allocator as a plain [`Allocator`], hiding markers and
//! rollback from code that should not know it shares a region.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use crate::allocator::Allocator;
use crate::memory::general::Global;
use crate::memory::stack::StackAllocator;

/// Restricted view of a [`StackAllocator`]: `allocate` and `free` only.
///
/// Releases must still follow the stack's LIFO discipline.
#[derive(Debug)]
pub struct StackAllocatorProxy<'buf, P: Allocator = Global> {
    stack: StackAllocator<'buf, P>,
}

impl<'buf, P: Allocator> StackAllocatorProxy<'buf, P> {
    /// Wraps `stack`.
    #[must_use]
    pub fn new(stack: StackAllocator<'buf, P>) -> Self {
        Self { stack }
    }

    /// Unwraps the proxy, giving back the full stack interface.
    #[must_use]
    pub fn into_inner(self) -> StackAllocator<'buf, P> {
        self.stack
    }

    pub(crate) const fn stack(&self) -> &StackAllocator<'buf, P> {
        &self.stack
    }

    pub(crate) fn stack_mut(&mut self) -> &mut StackAllocator<'buf, P> {
        &mut self.stack
    }
}

impl<P: Allocator> Allocator for StackAllocatorProxy<'_, P> {
    #[inline]
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.stack.allocate(size)
    }

    #[inline]
    unsafe fn free(&self, block: NonNull<u8>) {
        self.stack.free(block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViolationPolicy;
    use crate::memory::stack::GrowthDirection;

    #[test]
    fn test_proxy_forwards() {
        let stack = StackAllocator::new(GrowthDirection::Upward, 64).unwrap();
        let proxy = StackAllocatorProxy::new(stack);

        let a = proxy.allocate(16).unwrap();
        let b = proxy.allocate(16).unwrap();
        assert!(proxy.allocate(64).is_none());
        assert_eq!(proxy.stack().used(), 32);

        unsafe {
            proxy.free(b);
            proxy.free(a);
        }
        assert_eq!(proxy.into_inner().used(), 0);
    }

    #[test]
    fn test_proxy_keeps_lifo_discipline() {
        let stack = StackAllocator::new(GrowthDirection::Downward, 64)
            .unwrap()
            .with_violation_policy(ViolationPolicy::Log);
        let proxy = StackAllocatorProxy::new(stack);
        let a = proxy.allocate(16).unwrap();
        let _b = proxy.allocate(16).unwrap();

        unsafe { proxy.free(a) };
        assert_eq!(proxy.stack().used(), 32);
    }
}
