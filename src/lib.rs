pub mod error;
pub mod segment;

pub use error::{OrdexError, Result};
pub use segment::{
    DocMap, DocNo, DocRemap, MergeContext, MergeInput, MergePolicy, MergeSpecification, OneMerge,
    PackedLongBuffer, Permutation, PlannedMerge, SegmentId, SegmentMeta, SegmentReader,
    SortField, SortOrder, SortSpec, SortedView, Sorter, SortingMerge, SortingMergePolicy,
    UnifiedView,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
