//! Chunk-storage capability.
//!
//! The ring acquires chunk buffers through [`BackingAlloc`] and returns
//! them at teardown; nothing else ever touches the backing allocator.
//! The default [`GlobalBacking`] delegates to the global heap. Tests
//! substitute counting or failing backings to observe growth behavior and
//! failure propagation.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;

/// Byte-allocator capability used for chunk storage.
///
/// Implementations only ever see whole-chunk requests: a short series of
/// geometrically growing allocations, each released exactly once when the
/// owning allocator is dropped.
pub trait BackingAlloc {
    /// Allocates a block for `layout`, or `None` when storage is exhausted.
    fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>>;

    /// Releases a block previously returned by [`allocate`](Self::allocate).
    ///
    /// # Safety
    /// `ptr` must have come from `allocate` on this same backing with the
    /// same `layout`, and must not be released twice.
    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout);
}

/// Backing that delegates to the global heap.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalBacking;

impl BackingAlloc for GlobalBacking {
    fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.size() > 0, "chunk layouts are never zero-sized");
        // SAFETY: `layout` has non-zero size.
        NonNull::new(unsafe { alloc(layout) })
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded contract; the pair came from `alloc` above.
        unsafe { dealloc(ptr.as_ptr(), layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_backing_round_trip() {
        let mut backing = GlobalBacking;
        let layout = Layout::from_size_align(64, 16).unwrap();
        let ptr = backing.allocate(layout).unwrap();

        // The block is writable for its full extent.
        for i in 0..64 {
            unsafe { ptr.as_ptr().add(i).write(i as u8) };
        }
        assert_eq!(unsafe { ptr.as_ptr().add(63).read() }, 63);

        unsafe { backing.deallocate(ptr, layout) };
    }
}
