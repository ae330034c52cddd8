//! Append-only chunk table with a three-run circular geometry.
//!
//! The ring emulates a circular live region on top of chunks that are only
//! ever appended, never moved or removed. Up to three [`ChunkRun`] views
//! tile the table, in index order *left*, then *right*, then *overflow*:
//!
//! - **left** covers the lowest indices and is the bump run: new blocks
//!   land at its tail whenever no overflow run exists. When the region has
//!   wrapped, left holds the youngest data.
//! - **right**, when present, is frozen and holds data older than
//!   everything in left; the oldest live byte is at its head.
//! - **overflow**, when present, is a suffix of the table that absorbs
//!   every push. It exists because a push into the chunk holding the
//!   oldest data would interleave young bytes behind old ones; stapling a
//!   fresh run onto the end of the table sidesteps that. When the older
//!   runs drain, overflow is promoted to become the new right.
//!
//! Age order of live data, oldest to youngest, is therefore always:
//! right, then left, then overflow.
//!
//! # Invariants
//! - The present runs tile `[0, chunks.len())` exactly, in the order left,
//!   right, overflow.
//! - Left is present whenever any chunk exists.
//! - Overflow, when present, ends at the last chunk.
//! - No block ever moves between chunks; frees only clear chunks and
//!   relabel views.
//!
//! # Growth
//! Every new chunk is sized `max(last_size, n) * 2`, so a push can always
//! be satisfied by at most one fresh chunk and total backing stays within
//! a constant factor of the bytes requested. The table is capped at
//! [`MAX_CHUNKS`] entries so a chunk index fits the one-byte field of the
//! per-block trailer.

use std::fmt;

use crate::backing::BackingAlloc;
use crate::chunk::Chunk;
use crate::run::ChunkRun;

/// Hard cap on the chunk table; block trailers store the owning chunk
/// index in a single byte, and geometric growth makes more than this
/// astronomically large anyway.
pub(crate) const MAX_CHUNKS: usize = 64;

/// Default lower bound on the first chunk's pre-doubling size.
pub(crate) const DEFAULT_SEED: usize = 64;

/// Errors surfaced by allocation.
///
/// Frees cannot fail; misuse of the edge-order contract is undefined
/// behavior rather than a reported error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum AllocError {
    /// The backing allocator refused to provide a new chunk. Allocator
    /// state is unchanged.
    BackingFailed,
    /// Creating another chunk would exceed the chunk-table cap.
    ChunkTableFull,
    /// The request size or alignment cannot be represented (arithmetic
    /// overflow, or padding too large for the trailer encoding).
    LayoutTooLarge,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackingFailed => write!(f, "backing allocator refused a new chunk"),
            Self::ChunkTableFull => {
                write!(f, "chunk table is full ({MAX_CHUNKS} chunks)")
            }
            Self::LayoutTooLarge => write!(f, "request size or alignment too large"),
        }
    }
}

impl std::error::Error for AllocError {}

/// Shape of the live region, for introspection and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Geometry {
    /// The live region (possibly empty) sits inside left alone.
    Linear,
    /// The region has wrapped: oldest data in right, youngest in left.
    Wrapped,
    /// An overflow run is absorbing pushes while left drains.
    Overflowing,
    /// Wrapped, and left filled before right drained: all three runs live.
    WrappedOverflowing,
}

/// Which run owns a chunk index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunId {
    Left,
    Right,
    Overflow,
}

pub(crate) struct ChunkRing<B: BackingAlloc> {
    chunks: Vec<Chunk>,
    left: Option<ChunkRun>,
    right: Option<ChunkRun>,
    overflow: Option<ChunkRun>,
    last_size: usize,
    backing: B,
}

impl<B: BackingAlloc> ChunkRing<B> {
    pub(crate) fn new(seed: usize, backing: B) -> Self {
        Self {
            chunks: Vec::new(),
            left: None,
            right: None,
            overflow: None,
            last_size: seed.max(1),
            backing,
        }
    }

    /// Total live bytes across every chunk.
    pub(crate) fn count(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }

    /// Total bytes currently held from the backing allocator.
    pub(crate) fn footprint(&self) -> usize {
        self.chunks.iter().map(Chunk::capacity).sum()
    }

    pub(crate) fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub(crate) fn geometry(&self) -> Geometry {
        match (self.right.is_some(), self.overflow.is_some()) {
            (false, false) => Geometry::Linear,
            (true, false) => Geometry::Wrapped,
            (false, true) => Geometry::Overflowing,
            (true, true) => Geometry::WrappedOverflowing,
        }
    }

    /// Pointer to `offset` within chunk `idx`.
    #[inline]
    pub(crate) fn chunk_ptr(&self, idx: usize, offset: usize) -> std::ptr::NonNull<u8> {
        self.chunks[idx].ptr_at(offset)
    }

    /// Offset of `ptr` within chunk `idx`.
    #[inline]
    pub(crate) fn chunk_offset(&self, idx: usize, ptr: *const u8) -> usize {
        self.chunks[idx].offset_of(ptr)
    }

    /// Allocates `n` raw bytes, returning the owning chunk index and the
    /// block's offset within that chunk.
    ///
    /// # Errors
    /// Fails only when a fresh chunk is needed and cannot be created; no
    /// state changes in that case.
    pub(crate) fn alloc(&mut self, n: usize) -> Result<(usize, usize), AllocError> {
        if self.chunks.is_empty() {
            self.grow_chunk(n)?;
            self.left = Some(ChunkRun::single(0));
        }

        // Overflow, when present, absorbs every push.
        if let Some(mut overflow) = self.overflow {
            if let Some(hit) = overflow.alloc(&mut self.chunks, n) {
                self.overflow = Some(overflow);
                return Ok(hit);
            }
            self.grow_chunk(n)?;
            overflow.widen(1);
            let hit = match overflow.alloc(&mut self.chunks, n) {
                Some(hit) => hit,
                None => unreachable!("fresh chunk sized below request"),
            };
            self.overflow = Some(overflow);
            return Ok(hit);
        }

        let Some(mut left) = self.left else {
            unreachable!("left run exists whenever chunks exist")
        };
        if let Some(hit) = left.alloc(&mut self.chunks, n) {
            self.left = Some(left);
            return Ok(hit);
        }

        // Left's view is exhausted. Right, when present, holds the oldest
        // data and must not receive pushes, so open an overflow run on a
        // fresh chunk either way.
        let idx = self.grow_chunk(n)?;
        let mut overflow = ChunkRun::single(idx);
        let hit = match overflow.alloc(&mut self.chunks, n) {
            Some(hit) => hit,
            None => unreachable!("fresh chunk sized below request"),
        };
        self.overflow = Some(overflow);
        Ok(hit)
    }

    /// Frees every live byte up to and including the block ending at
    /// `end_offset` within chunk `idx`.
    pub(crate) fn free_left(&mut self, idx: usize, end_offset: usize) {
        match self.owner_of(idx) {
            RunId::Overflow => {
                let Some(mut overflow) = self.overflow.take() else {
                    unreachable!("owner_of returned an absent run")
                };
                // Left and right hold strictly older data.
                if let Some(left) = self.left {
                    self.clear_run_chunks(left);
                }
                if let Some(right) = self.right.take() {
                    self.clear_run_chunks(right);
                }
                overflow.free_left(&mut self.chunks, idx, end_offset);
                if overflow.is_empty(&self.chunks) {
                    // Nothing is live anywhere; fall back to one all-empty
                    // linear run over the whole table.
                    self.left = Some(ChunkRun::span(0, self.chunks.len()));
                } else {
                    // Promote: the drained prefix becomes an all-empty
                    // left, the surviving extent becomes the frozen right.
                    let head = overflow.head();
                    self.left = Some(ChunkRun::span(0, head));
                    self.right = Some(ChunkRun::with_extent(
                        head,
                        self.chunks.len() - head,
                        head,
                        overflow.tail(),
                    ));
                }
            }
            RunId::Right => {
                let Some(mut right) = self.right.take() else {
                    unreachable!("owner_of returned an absent run")
                };
                let Some(mut left) = self.left else {
                    unreachable!("left run exists whenever chunks exist")
                };
                right.free_left(&mut self.chunks, idx, end_offset);
                if right.is_empty(&self.chunks) {
                    left.widen(right.len());
                } else {
                    // Left's view grows over the chunks right vacated, so
                    // the bump end can sweep into them.
                    let vacated = right.head() - right.first();
                    right.shrink_front(vacated);
                    left.widen(vacated);
                    self.right = Some(right);
                }
                self.left = Some(left);
            }
            RunId::Left => {
                // Anything in right is older than the freed block.
                if let Some(right) = self.right.take() {
                    self.clear_run_chunks(right);
                }
                let Some(mut left) = self.left else {
                    unreachable!("left run exists whenever chunks exist")
                };
                left.free_left(&mut self.chunks, idx, end_offset);
                let cover = self.overflow.map_or(self.chunks.len(), |ov| ov.first());
                if left.is_empty(&self.chunks) {
                    self.left = Some(ChunkRun::span(0, cover));
                } else if left.head() == 0 {
                    // No wraparound; left re-covers everything before the
                    // overflow run (or the whole table).
                    self.left = Some(ChunkRun::with_extent(0, cover, 0, left.tail()));
                } else {
                    // The live remainder freezes as the new right; the
                    // vacated prefix becomes an all-empty left so pushes
                    // recycle those chunks.
                    let head = left.head();
                    self.right = Some(ChunkRun::with_extent(
                        head,
                        cover - head,
                        head,
                        left.tail(),
                    ));
                    self.left = Some(ChunkRun::span(0, head));
                }
            }
        }
        self.debug_check_partition();
    }

    /// Frees every live byte from the block starting at `start_offset`
    /// within chunk `idx` onward.
    pub(crate) fn free_right(&mut self, idx: usize, start_offset: usize) {
        match self.owner_of(idx) {
            RunId::Overflow => {
                let Some(mut overflow) = self.overflow.take() else {
                    unreachable!("owner_of returned an absent run")
                };
                overflow.free_right(&mut self.chunks, idx, start_offset);
                if overflow.is_empty(&self.chunks) {
                    // Hand the drained chunks to the neighboring view so
                    // they stay available for future growth.
                    if let Some(mut right) = self.right {
                        right.widen(overflow.len());
                        self.right = Some(right);
                    } else if let Some(mut left) = self.left {
                        left.widen(overflow.len());
                        self.left = Some(left);
                    }
                } else {
                    self.overflow = Some(overflow);
                }
            }
            RunId::Right => {
                // Everything in left and overflow is younger than the
                // freed block.
                if let Some(overflow) = self.overflow.take() {
                    self.clear_run_chunks(overflow);
                }
                if let Some(left) = self.left {
                    self.clear_run_chunks(left);
                }
                let Some(mut right) = self.right.take() else {
                    unreachable!("owner_of returned an absent run")
                };
                right.free_right(&mut self.chunks, idx, start_offset);
                self.left = Some(self.flattened(&right));
            }
            RunId::Left => {
                if self.right.is_some() {
                    // The freed block is in the younger half; overflow is
                    // younger still and dies with it. Right absorbs the
                    // drained overflow chunks to keep the tiling exact.
                    if let Some(overflow) = self.overflow.take() {
                        self.clear_run_chunks(overflow);
                        if let Some(mut right) = self.right {
                            right.widen(overflow.len());
                            self.right = Some(right);
                        }
                    }
                    let Some(mut left) = self.left else {
                        unreachable!("left run exists whenever chunks exist")
                    };
                    left.free_right(&mut self.chunks, idx, start_offset);
                    if left.is_empty(&self.chunks) {
                        // Only the frozen right remains; flatten so its
                        // tail becomes the bump position again.
                        let Some(right) = self.right.take() else {
                            unreachable!("wrapped geometry without a right run")
                        };
                        self.left = Some(self.flattened(&right));
                    } else {
                        self.left = Some(left);
                    }
                } else {
                    // Overflow, when present, is younger than all of left.
                    if let Some(overflow) = self.overflow.take() {
                        self.clear_run_chunks(overflow);
                        if let Some(mut left) = self.left {
                            left.widen(overflow.len());
                            self.left = Some(left);
                        }
                    }
                    let Some(mut left) = self.left else {
                        unreachable!("left run exists whenever chunks exist")
                    };
                    left.free_right(&mut self.chunks, idx, start_offset);
                    self.left = Some(left);
                }
            }
        }
        self.debug_check_partition();
    }

    /// Drops all live data while retaining every chunk for reuse.
    pub(crate) fn reset(&mut self) {
        for chunk in &mut self.chunks {
            chunk.clear();
        }
        if !self.chunks.is_empty() {
            self.left = Some(ChunkRun::span(0, self.chunks.len()));
        }
        self.right = None;
        self.overflow = None;
    }

    /// A single linear run over the whole table carrying `src`'s live
    /// extent (or all-empty when `src` drained).
    fn flattened(&self, src: &ChunkRun) -> ChunkRun {
        if src.is_empty(&self.chunks) {
            ChunkRun::span(0, self.chunks.len())
        } else {
            ChunkRun::with_extent(0, self.chunks.len(), src.head(), src.tail())
        }
    }

    fn owner_of(&self, idx: usize) -> RunId {
        debug_assert!(idx < self.chunks.len());
        if self.overflow.is_some_and(|ov| ov.contains(idx)) {
            RunId::Overflow
        } else if self.right.is_some_and(|r| r.contains(idx)) {
            RunId::Right
        } else {
            debug_assert!(self.left.is_some_and(|l| l.contains(idx)));
            RunId::Left
        }
    }

    fn clear_run_chunks(&mut self, run: ChunkRun) {
        for idx in run.first()..run.end() {
            self.chunks[idx].clear();
        }
    }

    /// Appends a fresh chunk sized `max(last_size, n) * 2`.
    ///
    /// Nothing is mutated unless the backing allocation succeeds.
    fn grow_chunk(&mut self, n: usize) -> Result<usize, AllocError> {
        if self.chunks.len() == MAX_CHUNKS {
            return Err(AllocError::ChunkTableFull);
        }
        let size = self
            .last_size
            .max(n)
            .checked_mul(2)
            .ok_or(AllocError::LayoutTooLarge)?;
        let chunk = Chunk::new_in(&mut self.backing, size)?;
        self.chunks.push(chunk);
        self.last_size = size;
        Ok(self.chunks.len() - 1)
    }

    /// Debug check: the present runs tile the chunk table exactly.
    fn debug_check_partition(&self) {
        #[cfg(debug_assertions)]
        {
            let mut next = 0;
            for run in [self.left, self.right, self.overflow].into_iter().flatten() {
                assert_eq!(run.first(), next, "runs out of order or overlapping");
                next = run.end();
            }
            assert_eq!(next, self.chunks.len(), "runs do not cover the table");
        }
    }
}

impl<B: BackingAlloc> Drop for ChunkRing<B> {
    fn drop(&mut self) {
        let mut chunks = std::mem::take(&mut self.chunks);
        for chunk in &mut chunks {
            chunk.release(&mut self.backing);
        }
    }
}
