//! Merge-time document reordering for a segment-based index
//!
//! This module decorates an arbitrary merge-planning component so that every
//! merged segment comes out in a configured sort order, and provides the
//! deletion-aware ordinal remapping the merge executor needs to rewrite
//! postings against the reordered segment.
//!
//! # Architecture
//!
//! - `PackedLongBuffer`: append-only bit-packed store for deletion counts
//! - `UnifiedView` / `SortedView`: one logical reader over all merge inputs
//! - `SortingMerge`: per-merge state machine answering ordinal remap queries
//! - `SortingMergePolicy`: decorator wrapping an inner `MergePolicy`

mod types;
mod reader;
mod packed;
mod view;
mod sorter;
mod sorting_merge;
mod policy;

pub use types::*;
pub use reader::*;
pub use packed::*;
pub use view::*;
pub use sorter::*;
pub use sorting_merge::*;
pub use policy::*;
