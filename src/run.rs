//! Contiguous span of chunks treated as one growing region.
//!
//! A run is a view over `[first, first + span)` of the ring's chunk table;
//! it owns nothing. Within the view, live chunks occupy `[head, tail]`:
//! chunks before `head` and after `tail` are empty, and `tail` is the only
//! chunk that receives bump allocations. Allocation order within a run is
//! chunk order, then intra-chunk bump order, so the run's oldest byte sits
//! at the head chunk's left edge and its youngest just before the tail
//! chunk's bump position.
//!
//! The ring widens, splits, and relabels runs as the live region moves;
//! the run itself only moves its own cursors.
//!
//! # Invariants
//! - `span >= 1` and `first <= head <= tail < first + span`.
//! - Chunks in `[first, head)` and `(tail, first + span)` are empty.
//! - An empty run is normalized to `head == tail == first`.

use crate::chunk::Chunk;

#[derive(Clone, Copy, Debug)]
pub(crate) struct ChunkRun {
    first: usize,
    span: usize,
    head: usize,
    tail: usize,
}

impl ChunkRun {
    /// A run viewing exactly one chunk.
    pub(crate) fn single(idx: usize) -> Self {
        Self {
            first: idx,
            span: 1,
            head: idx,
            tail: idx,
        }
    }

    /// An all-empty run viewing `span` chunks starting at `first`.
    pub(crate) fn span(first: usize, span: usize) -> Self {
        debug_assert!(span >= 1, "a run views at least one chunk");
        Self {
            first,
            span,
            head: first,
            tail: first,
        }
    }

    /// A run with explicit live extent, used when the ring relabels runs.
    pub(crate) fn with_extent(first: usize, span: usize, head: usize, tail: usize) -> Self {
        debug_assert!(first <= head && head <= tail && tail < first + span);
        Self {
            first,
            span,
            head,
            tail,
        }
    }

    #[inline]
    pub(crate) fn first(&self) -> usize {
        self.first
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.span
    }

    /// One past the last chunk index in the view.
    #[inline]
    pub(crate) fn end(&self) -> usize {
        self.first + self.span
    }

    #[inline]
    pub(crate) fn head(&self) -> usize {
        self.head
    }

    #[inline]
    pub(crate) fn tail(&self) -> usize {
        self.tail
    }

    #[inline]
    pub(crate) fn contains(&self, idx: usize) -> bool {
        idx >= self.first && idx < self.end()
    }

    /// Extends the view by `extra` chunks on the right.
    pub(crate) fn widen(&mut self, extra: usize) {
        self.span += extra;
    }

    /// Drops `count` chunks from the front of the view.
    ///
    /// The dropped chunks must be empty (they sit before `head`).
    pub(crate) fn shrink_front(&mut self, count: usize) {
        debug_assert!(self.first + count <= self.head);
        self.first += count;
        self.span -= count;
    }

    /// True when the run holds no live bytes.
    #[inline]
    pub(crate) fn is_empty(&self, chunks: &[Chunk]) -> bool {
        self.head == self.tail && chunks[self.head].is_empty()
    }

    /// Bump-allocates `n` bytes, advancing the tail across empty chunks in
    /// the view when the current tail cannot fit the request.
    ///
    /// Returns the owning chunk index and the block's offset within it.
    /// Refusal means the view is exhausted; a run never adds chunks, that
    /// decision belongs to the ring.
    pub(crate) fn alloc(&mut self, chunks: &mut [Chunk], n: usize) -> Option<(usize, usize)> {
        let was_empty = self.is_empty(chunks);
        for idx in self.tail..self.end() {
            debug_assert!(idx == self.tail || chunks[idx].is_empty());
            if let Some(offset) = chunks[idx].alloc(n) {
                self.tail = idx;
                if was_empty {
                    self.head = idx;
                }
                return Some((idx, offset));
            }
        }
        None
    }

    /// Frees everything up to the block ending at `first_kept` in chunk
    /// `idx`: chunks left of `idx` are cleared and the target chunk's left
    /// edge advances.
    pub(crate) fn free_left(&mut self, chunks: &mut [Chunk], idx: usize, first_kept: usize) {
        debug_assert!(idx >= self.head && idx <= self.tail, "free target outside live extent");
        for i in self.head..idx {
            chunks[i].clear();
        }
        chunks[idx].free_left(first_kept);
        self.head = idx;
        while self.head < self.tail && chunks[self.head].is_empty() {
            self.head += 1;
        }
        if self.is_empty(chunks) {
            self.head = self.first;
            self.tail = self.first;
        }
    }

    /// Frees everything from the block starting at `first_removed` in chunk
    /// `idx` onward: chunks right of `idx` are cleared and the target chunk
    /// is truncated.
    pub(crate) fn free_right(&mut self, chunks: &mut [Chunk], idx: usize, first_removed: usize) {
        debug_assert!(idx >= self.head && idx <= self.tail, "free target outside live extent");
        for i in (idx + 1)..=self.tail {
            chunks[i].clear();
        }
        chunks[idx].free_right(first_removed);
        self.tail = idx;
        while self.tail > self.head && chunks[self.tail].is_empty() {
            self.tail -= 1;
        }
        if self.is_empty(chunks) {
            self.head = self.first;
            self.tail = self.first;
        }
    }
}
