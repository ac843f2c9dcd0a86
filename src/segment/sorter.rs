//! Sorter contract consumed by the sorting merge
//!
//! Sort-key evaluation lives outside this crate; the merge only consumes the
//! resulting permutation. Implementations compare live documents of the
//! unified view under the given specification and either hand back a
//! concrete `DocMap::Permutation` over `[0, live_doc_count)` or the
//! `DocMap::Identity` sentinel when the view is already in order.

use crate::error::Result;

use super::types::SortSpec;
use super::view::{DocMap, UnifiedView};

pub trait Sorter: Send + Sync {
    /// Compute the permutation imposing `spec`'s order on `view`'s live
    /// documents, or `DocMap::Identity` when they are already in order.
    fn sort(&self, spec: &SortSpec, view: &UnifiedView) -> Result<DocMap>;
}
