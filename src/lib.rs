//! Growable circular-buffer allocator.
//!
//! Serves variable-size allocations in ring order: the caller frees either
//! the oldest or the newest live block, and the vacated space is recycled
//! for new pushes. Backing storage is a table of bump chunks that grows
//! geometrically on demand; payloads never move once handed out.
//!
//! This sits between three familiar shapes. Unlike a fixed ring buffer,
//! capacity grows to fit the workload. Unlike an arena, space is reclaimed
//! incrementally instead of in bulk. Unlike a heap, interior space is never
//! recycled, only the leading and trailing edges of the live region.
//!
//! # Design themes
//! - Append-only chunk table: chunk buffers are address-stable for the
//!   allocator's lifetime and released only at teardown.
//! - Up to three chunk runs (*left*, *right*, *overflow*) emulate a
//!   circular live region over the table, including wraparound and an
//!   escape valve when a wrapped region runs out of room.
//! - A fixed-layout trailer beside every block maps a bare payload pointer
//!   back to its owning chunk in O(1); no lookup structure is needed.
//! - All operations are O(1) amortized, bounded by the chunk-table cap.
//!
//! # Module map
//! - `chunk`: one backing buffer with a monotone live sub-range.
//! - `run`: a contiguous span of chunks acting as one growing region.
//! - `ring`: the chunk table and the three-run circular geometry.
//! - `ring_alloc`: the public facade (alignment, trailers, edge frees).
//! - `backing`: the chunk-storage capability and its global-heap impl.
//!
//! # Threading
//! Single-threaded by design. No operation blocks, suspends, or allocates
//! outside chunk growth.

mod backing;
mod chunk;
mod ring;
mod ring_alloc;
mod run;

pub use backing::{BackingAlloc, GlobalBacking};
pub use ring::{AllocError, Geometry};
pub use ring_alloc::RingAlloc;
