//! Circular allocator facade: alignment handling and per-block trailers.
//!
//! [`RingAlloc`] sits on top of the chunk ring and turns raw ring blocks
//! into aligned payloads. Every allocation reserves a worst-case envelope
//! (`size + trailer + padding bounds`), aligns the payload inside it, and
//! records a fixed-layout trailer beside the payload so a bare pointer can
//! be mapped back to its owning chunk in O(1) on free.
//!
//! # Trailer layout
//! Immediately after the payload, padded to a 4-byte boundary:
//!
//! ```text
//! start_unused: u32   bytes of leading padding before the payload
//! total_unused: u32   raw block length minus payload length
//! chunk_index:  u8    owning chunk within the ring's table
//! ```
//!
//! The layout is fixed so the trailer can be located from any payload
//! pointer and length by arithmetic alone.
//!
//! # Usage contract
//! Blocks must be freed in edge order: `free_left` targets the oldest live
//! block (or a newer one, releasing everything older in a batch),
//! `free_right` the youngest (or an older one, releasing everything newer).
//! Violations are not detected; they are undefined behavior, like any
//! other allocator misuse.

use std::alloc::Layout;
use std::ptr::NonNull;

use crate::backing::{BackingAlloc, GlobalBacking};
use crate::ring::{AllocError, ChunkRing, Geometry, DEFAULT_SEED};

/// Bytes of metadata stored beside every block: two `u32` words plus the
/// owning chunk index.
const TRAILER_SIZE: usize = 9;
/// The trailer begins at the next boundary of this alignment after the
/// payload.
const TRAILER_ALIGN: usize = 4;

/// Growable circular-buffer allocator.
///
/// Serves variable-size, per-request-aligned allocations whose lifetimes
/// end at one of the two edges of the live region. Backing chunks grow
/// geometrically and are only returned to the backing allocator on drop;
/// payloads never move while live.
///
/// Single-threaded; operations never block and never copy payload bytes.
///
/// # Example
/// ```
/// use std::alloc::Layout;
/// use ringbump::RingAlloc;
///
/// let mut ring = RingAlloc::new();
/// let a = ring.alloc(Layout::from_size_align(16, 8).unwrap()).unwrap();
/// let b = ring.alloc(Layout::from_size_align(24, 8).unwrap()).unwrap();
/// assert_eq!(a.len(), 16);
///
/// // Oldest first, or newest first; here: drain from the old edge.
/// unsafe {
///     ring.free_left(a);
///     ring.free_left(b);
/// }
/// assert_eq!(ring.count(), 0);
/// ```
pub struct RingAlloc<B: BackingAlloc = GlobalBacking> {
    ring: ChunkRing<B>,
}

impl RingAlloc<GlobalBacking> {
    /// Creates an allocator backed by the global heap.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(GlobalBacking)
    }
}

impl Default for RingAlloc<GlobalBacking> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: BackingAlloc> RingAlloc<B> {
    /// Creates an allocator that obtains chunk storage from `backing`.
    #[must_use]
    pub fn new_in(backing: B) -> Self {
        Self::with_seed_in(DEFAULT_SEED, backing)
    }

    /// Like [`new_in`](Self::new_in), with a lower bound on the first
    /// chunk's pre-doubling size. Later chunks grow geometrically from
    /// whatever the first request produced.
    #[must_use]
    pub fn with_seed_in(seed: usize, backing: B) -> Self {
        Self {
            ring: ChunkRing::new(seed, backing),
        }
    }

    /// Allocates `layout.size()` bytes aligned to `layout.align()`.
    ///
    /// The returned block has exactly the requested length. Zero-size
    /// requests yield a well-aligned dangling block without touching
    /// allocator state; freeing such a block is a no-op.
    ///
    /// # Errors
    /// - `AllocError::BackingFailed` if the backing allocator refuses a
    ///   new chunk; allocator state is unchanged.
    /// - `AllocError::ChunkTableFull` if growth would exceed the chunk cap.
    /// - `AllocError::LayoutTooLarge` if the envelope arithmetic overflows
    ///   or the alignment padding cannot be encoded in the trailer.
    pub fn alloc(&mut self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        let n = layout.size();
        let align = layout.align();
        if n == 0 {
            // SAFETY: `align` is a non-zero power of two, so the address
            // is non-null and aligned.
            let dangling = unsafe { NonNull::new_unchecked(align as *mut u8) };
            return Ok(NonNull::slice_from_raw_parts(dangling, 0));
        }

        // Worst-case envelope: leading padding to `align`, the payload,
        // padding to the trailer boundary, and the trailer itself.
        let overhead = (align - 1) + (TRAILER_ALIGN - 1) + TRAILER_SIZE;
        if overhead > u32::MAX as usize {
            return Err(AllocError::LayoutTooLarge);
        }
        let raw_len = n.checked_add(overhead).ok_or(AllocError::LayoutTooLarge)?;

        let (chunk, offset) = self.ring.alloc(raw_len)?;
        let raw = self.ring.chunk_ptr(chunk, offset);
        let lead = align_up(raw.as_ptr() as usize, align) - raw.as_ptr() as usize;
        debug_assert!(lead < align);
        debug_assert!(chunk < u8::MAX as usize + 1);

        // SAFETY: `lead + n + trailer padding + TRAILER_SIZE <= raw_len`,
        // so the payload and trailer both lie inside the raw block.
        let payload = unsafe { raw.as_ptr().add(lead) };
        unsafe {
            write_trailer(
                payload,
                n,
                Trailer {
                    start_unused: lead as u32,
                    total_unused: (raw_len - n) as u32,
                    chunk_index: chunk as u8,
                },
            );
        }

        // SAFETY: derived from a non-null chunk pointer by an in-bounds
        // offset.
        let payload = unsafe { NonNull::new_unchecked(payload) };
        Ok(NonNull::slice_from_raw_parts(payload, n))
    }

    /// Frees `block` and every live block older than it.
    ///
    /// # Safety
    /// `block` must have been returned by [`alloc`](Self::alloc) on this
    /// allocator and still be live, and no older block may be used after
    /// the call. Freeing a block that is neither the oldest nor a
    /// batch-release of everything older corrupts the allocator.
    pub unsafe fn free_left(&mut self, block: NonNull<[u8]>) {
        let n = block.len();
        if n == 0 {
            return;
        }
        let payload = block.cast::<u8>().as_ptr();
        // SAFETY: per the contract, the trailer written by `alloc` still
        // follows the payload.
        let trailer = unsafe { read_trailer(payload, n) };
        let chunk = trailer.chunk_index as usize;
        // SAFETY: the raw block spans the payload plus its recorded
        // leading and trailing slack.
        let raw_end = unsafe {
            payload
                .sub(trailer.start_unused as usize)
                .add(n + trailer.total_unused as usize)
        };
        let end_offset = self.ring.chunk_offset(chunk, raw_end);
        self.ring.free_left(chunk, end_offset);
    }

    /// Frees `block` and every live block newer than it.
    ///
    /// # Safety
    /// `block` must have been returned by [`alloc`](Self::alloc) on this
    /// allocator and still be live, and no newer block may be used after
    /// the call.
    pub unsafe fn free_right(&mut self, block: NonNull<[u8]>) {
        let n = block.len();
        if n == 0 {
            return;
        }
        let payload = block.cast::<u8>().as_ptr();
        // SAFETY: per the contract, the trailer written by `alloc` still
        // follows the payload.
        let trailer = unsafe { read_trailer(payload, n) };
        let chunk = trailer.chunk_index as usize;
        // SAFETY: the recorded leading slack lies inside the raw block.
        let raw_start = unsafe { payload.sub(trailer.start_unused as usize) };
        let start_offset = self.ring.chunk_offset(chunk, raw_start);
        self.ring.free_right(chunk, start_offset);
    }

    /// Total live bytes, including per-block trailers and padding.
    #[must_use]
    pub fn count(&self) -> usize {
        self.ring.count()
    }

    /// True when no allocation is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Drops every live block while retaining chunk storage for reuse.
    pub fn reset(&mut self) {
        self.ring.reset();
    }

    /// Current shape of the live region.
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        self.ring.geometry()
    }

    /// Number of chunks acquired so far.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.ring.chunk_count()
    }

    /// Total bytes currently held from the backing allocator.
    #[must_use]
    pub fn footprint(&self) -> usize {
        self.ring.footprint()
    }
}

/// Per-block metadata recorded beside the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Trailer {
    start_unused: u32,
    total_unused: u32,
    chunk_index: u8,
}

#[inline]
fn align_up(addr: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (addr + align - 1) & !(align - 1)
}

/// Writes `t` beside the payload.
///
/// # Safety
/// `payload` must point at `n` bytes with room after them for padding to
/// the trailer boundary plus `TRAILER_SIZE` bytes, all within one chunk.
unsafe fn write_trailer(payload: *mut u8, n: usize, t: Trailer) {
    // SAFETY: the trailer region follows the payload inside the same raw
    // block, and `at` is 4-aligned by construction.
    unsafe {
        let end = payload.add(n);
        let at = end.add(align_up(end as usize, TRAILER_ALIGN) - end as usize);
        at.cast::<u32>().write(t.start_unused);
        at.add(4).cast::<u32>().write(t.total_unused);
        at.add(8).write(t.chunk_index);
    }
}

/// Reads the trailer beside a payload of `n` bytes.
///
/// # Safety
/// A trailer written by [`write_trailer`] for this exact payload and
/// length must still be present.
unsafe fn read_trailer(payload: *const u8, n: usize) -> Trailer {
    // SAFETY: same layout as `write_trailer`; alignment and bounds hold
    // per the caller's contract.
    unsafe {
        let end = payload.add(n);
        let at = end.add(align_up(end as usize, TRAILER_ALIGN) - end as usize);
        Trailer {
            start_unused: at.cast::<u32>().read(),
            total_unused: at.add(4).cast::<u32>().read(),
            chunk_index: at.add(8).read(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(size: usize, align: usize) -> Layout {
        Layout::from_size_align(size, align).unwrap()
    }

    fn envelope(size: usize, align: usize) -> usize {
        size + (align - 1) + (TRAILER_ALIGN - 1) + TRAILER_SIZE
    }

    #[test]
    fn blocks_have_requested_length_and_alignment() {
        let mut ring = RingAlloc::new();
        for (size, align) in [(1, 1), (3, 2), (16, 16), (5, 64), (100, 8)] {
            let block = ring.alloc(layout(size, align)).unwrap();
            assert_eq!(block.len(), size);
            assert_eq!(block.cast::<u8>().as_ptr() as usize % align, 0);
        }
    }

    #[test]
    fn count_includes_padding_and_trailers() {
        let mut ring = RingAlloc::new();
        let a = ring.alloc(layout(4, 1)).unwrap();
        assert_eq!(ring.count(), envelope(4, 1));
        let b = ring.alloc(layout(10, 8)).unwrap();
        assert_eq!(ring.count(), envelope(4, 1) + envelope(10, 8));

        unsafe {
            ring.free_left(a);
            ring.free_left(b);
        }
        assert_eq!(ring.count(), 0);
        assert!(ring.is_empty());
    }

    #[test]
    fn trailer_round_trips_beside_the_payload() {
        let mut ring = RingAlloc::new();
        let block = ring.alloc(layout(1, 64)).unwrap();
        let payload = block.cast::<u8>().as_ptr();
        assert_eq!(payload as usize % 64, 0);

        let t = unsafe { read_trailer(payload, 1) };
        assert_eq!(t.chunk_index, 0);
        assert_eq!(t.total_unused as usize, envelope(1, 64) - 1);
        assert!((t.start_unused as usize) < 64);

        // The recorded chunk owns the whole raw block.
        let raw_start = unsafe { payload.sub(t.start_unused as usize) };
        let raw_len = 1 + t.total_unused as usize;
        let start = ring.ring.chunk_offset(0, raw_start);
        assert_eq!(start + raw_len, ring.count());

        unsafe { ring.free_right(block) };
        assert!(ring.is_empty());
    }

    #[test]
    fn zero_size_allocs_do_not_touch_state() {
        let mut ring = RingAlloc::new();
        let a = ring.alloc(layout(0, 1)).unwrap();
        let b = ring.alloc(layout(0, 32)).unwrap();
        assert_eq!(a.len(), 0);
        assert_eq!(b.cast::<u8>().as_ptr() as usize % 32, 0);
        assert_eq!(ring.chunk_count(), 0);
        assert_eq!(ring.count(), 0);

        // Freeing a zero-size block is a no-op in either direction.
        unsafe {
            ring.free_left(a);
            ring.free_right(b);
        }
        assert_eq!(ring.count(), 0);
    }

    #[test]
    fn alignment_wider_than_any_chunk_still_succeeds() {
        let mut ring = RingAlloc::new();
        let first = ring.alloc(layout(8, 1)).unwrap();
        // The envelope for this request dwarfs the bootstrap chunk, so a
        // fresh chunk must be grown for it.
        let block = ring.alloc(layout(1, 4096)).unwrap();
        assert_eq!(block.cast::<u8>().as_ptr() as usize % 4096, 0);
        assert_eq!(ring.chunk_count(), 2);

        unsafe {
            ring.free_right(block);
            ring.free_right(first);
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn immediate_free_returns_to_empty_in_both_directions() {
        let mut ring = RingAlloc::new();

        let a = ring.alloc(layout(12, 4)).unwrap();
        unsafe { ring.free_left(a) };
        assert_eq!(ring.count(), 0);

        let b = ring.alloc(layout(12, 4)).unwrap();
        unsafe { ring.free_right(b) };
        assert_eq!(ring.count(), 0);
    }

    #[test]
    fn reset_clears_live_data() {
        let mut ring = RingAlloc::new();
        for _ in 0..10 {
            ring.alloc(layout(100, 8)).unwrap();
        }
        let chunks = ring.chunk_count();
        ring.reset();
        assert!(ring.is_empty());
        assert_eq!(ring.chunk_count(), chunks);
        assert_eq!(ring.geometry(), Geometry::Linear);
    }

    #[test]
    fn payloads_and_trailers_never_overlap() {
        // Fill every payload and check the fill survives its neighbors'
        // allocation, trailer writes, and frees.
        let mut ring = RingAlloc::new();
        let mut live = Vec::new();
        for i in 0..64usize {
            let size = 1 + (i * 7) % 40;
            let align = 1 << (i % 5);
            let block = ring.alloc(layout(size, align)).unwrap();
            unsafe {
                std::ptr::write_bytes(block.cast::<u8>().as_ptr(), i as u8, size);
            }
            live.push((block, i as u8, size));
        }
        for (block, fill, size) in live.drain(..) {
            let bytes =
                unsafe { std::slice::from_raw_parts(block.cast::<u8>().as_ptr(), size) };
            assert!(bytes.iter().all(|&b| b == fill), "payload clobbered");
            unsafe { ring.free_left(block) };
        }
        assert!(ring.is_empty());
    }
}
