//! Per-merge document reordering state machine
//!
//! One `SortingMerge` exists per planned merge and owns its unified view,
//! doc map and deletion-count buffer exclusively; nothing here is shared
//! across concurrent merges. The sequence is strictly
//! `fetch_inputs -> assign_target -> map_doc*`; call-order violations are
//! fatal for the merge and surface as `InvalidMergeState`, never retried.

use std::sync::Arc;

use tracing::debug;

use crate::error::{OrdexError, Result};

use super::packed::PackedLongBuffer;
use super::reader::{SegmentMeta, SegmentReader};
use super::sorter::Sorter;
use super::types::{DocNo, SegmentId, SortSpec};
use super::view::{DocMap, Permutation, SortedView, UnifiedView};

/// Diagnostics key carrying the sort signature of a sorted segment
pub const SORT_SIGNATURE_KEY: &str = "sort.signature";

/// Execution-engine seam: supplies raw segment readers for a merge's
/// segment list.
pub trait MergeContext: Send + Sync {
    fn merge_readers(&self, segments: &[SegmentId]) -> Result<Vec<Arc<SegmentReader>>>;
}

/// The execution engine's own write-time ordinal mapping, composed after the
/// sort permutation. Blanket-implemented for closures.
pub trait DocRemap {
    fn remap(&self, doc: DocNo) -> DocNo;
}

impl<F: Fn(DocNo) -> DocNo> DocRemap for F {
    fn remap(&self, doc: DocNo) -> DocNo {
        self(doc)
    }
}

/// Materialized merge input: either one reader in sorted order or the
/// untouched original readers.
#[derive(Debug)]
pub enum MergeInput<'a> {
    Sorted(&'a SortedView),
    Unsorted(&'a [Arc<SegmentReader>]),
}

#[derive(Debug)]
enum MergeState {
    Pending,
    Sorted {
        input: SortedView,
        doc_map: Permutation,
        /// Cumulative deleted-doc counts, built lazily and then frozen
        deletes: Option<PackedLongBuffer>,
    },
    Unsorted {
        readers: Vec<Arc<SegmentReader>>,
    },
}

/// One planned merge wrapped for document reordering
pub struct SortingMerge {
    sort: Arc<SortSpec>,
    sorter: Arc<dyn Sorter>,
    segments: Vec<SegmentId>,
    state: MergeState,
}

impl std::fmt::Debug for SortingMerge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortingMerge")
            .field("sort", &self.sort.signature())
            .field("segments", &self.segments)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SortingMerge {
    pub fn new(segments: Vec<SegmentId>, sort: Arc<SortSpec>, sorter: Arc<dyn Sorter>) -> Self {
        Self {
            sort,
            sorter,
            segments,
            state: MergeState::Pending,
        }
    }

    /// Segments participating in this merge, in concatenation order
    pub fn segments(&self) -> &[SegmentId] {
        &self.segments
    }

    pub fn sort(&self) -> &SortSpec {
        &self.sort
    }

    /// Fetch the raw readers, build the unified view and run the sorter.
    /// Idempotent after the first call.
    pub fn fetch_inputs(&mut self, ctx: &dyn MergeContext) -> Result<()> {
        if !matches!(self.state, MergeState::Pending) {
            return Ok(());
        }
        let readers = ctx.merge_readers(&self.segments)?;
        let view = UnifiedView::new(readers.clone());
        match self.sorter.sort(&self.sort, &view)? {
            DocMap::Identity => {
                debug!(
                    segments = self.segments.len(),
                    sort = %self.sort,
                    "merge inputs already in sort order, passing readers through"
                );
                self.state = MergeState::Unsorted { readers };
            }
            DocMap::Permutation(doc_map) => {
                let live = view.live_doc_count() as usize;
                if doc_map.len() != live {
                    return Err(OrdexError::CorruptDocMap {
                        expected: live,
                        actual: doc_map.len(),
                    });
                }
                debug!(
                    segments = self.segments.len(),
                    live_docs = live,
                    sort = %self.sort,
                    "applying sort permutation to merge inputs"
                );
                let input = SortedView::new(view, &doc_map);
                self.state = MergeState::Sorted {
                    input,
                    doc_map,
                    deletes: None,
                };
            }
        }
        Ok(())
    }

    /// The materialized input the executor should merge from.
    /// Errors until `fetch_inputs` has run.
    pub fn input(&self) -> Result<MergeInput<'_>> {
        match &self.state {
            MergeState::Pending => Err(OrdexError::InvalidMergeState(
                "merge inputs requested before they were fetched",
            )),
            MergeState::Sorted { input, .. } => Ok(MergeInput::Sorted(input)),
            MergeState::Unsorted { readers } => Ok(MergeInput::Unsorted(readers)),
        }
    }

    /// Whether the sorter reordered this merge's documents.
    /// Errors until `fetch_inputs` has run.
    pub fn is_reordered(&self) -> Result<bool> {
        match &self.state {
            MergeState::Pending => Err(OrdexError::InvalidMergeState(
                "sort outcome requested before inputs were fetched",
            )),
            MergeState::Sorted { .. } => Ok(true),
            MergeState::Unsorted { .. } => Ok(false),
        }
    }

    /// Annotate the target segment's diagnostics with the sort signature.
    ///
    /// Call exactly once, after inputs have been fetched, at the point the
    /// execution engine assigns the merge's target segment. The ordering is
    /// documented, not enforced, mirroring physical write order.
    pub fn assign_target(&self, meta: &mut SegmentMeta) {
        meta.diagnostics
            .insert(SORT_SIGNATURE_KEY.to_string(), self.sort.signature());
    }

    /// Build and freeze the deletion-count table: one entry per
    /// with-deletions ordinal of the unified view, holding the number of
    /// deleted documents before that ordinal. No-op for unsorted merges and
    /// on repeated calls.
    pub fn compute_deletion_counts(&mut self) -> Result<()> {
        match &mut self.state {
            MergeState::Pending => Err(OrdexError::InvalidMergeState(
                "deletion counts requested before inputs were fetched",
            )),
            MergeState::Unsorted { .. } => Ok(()),
            MergeState::Sorted { deletes: Some(_), .. } => Ok(()),
            MergeState::Sorted { input, deletes, .. } => {
                let unified = input.unified();
                let mut buffer = PackedLongBuffer::new();
                let mut deleted = 0i64;
                for doc in 0..unified.doc_count() {
                    buffer.append(deleted)?;
                    if !unified.is_live(DocNo::new(doc)) {
                        deleted += 1;
                    }
                }
                buffer.freeze();
                *deletes = Some(buffer);
                Ok(())
            }
        }
    }

    /// Translate a pre-merge concatenated ordinal into the ordinal of the
    /// written segment, for postings rewriting.
    ///
    /// Unsorted merges delegate wholly to the execution engine's own
    /// `write_map`. Sorted merges compose three stages in fixed order:
    /// deletion compaction (the permutation was computed over the live-only
    /// view), then the sort permutation, then `write_map`'s write-time
    /// compaction.
    ///
    /// Precondition: `original` addresses a live document of the unified
    /// view. Errors if inputs were never fetched.
    pub fn map_doc(&mut self, original: DocNo, write_map: &dyn DocRemap) -> Result<DocNo> {
        if matches!(self.state, MergeState::Sorted { deletes: None, .. }) {
            self.compute_deletion_counts()?;
        }
        match &self.state {
            MergeState::Pending => Err(OrdexError::InvalidMergeState(
                "ordinal mapping requested before inputs were fetched",
            )),
            MergeState::Unsorted { .. } => Ok(write_map.remap(original)),
            MergeState::Sorted {
                input,
                doc_map,
                deletes,
            } => {
                let Some(table) = deletes else {
                    return Err(OrdexError::InvalidMergeState(
                        "deletion counts missing for sorted merge",
                    ));
                };
                debug_assert!(input.unified().is_live(original));
                let deleted_before = table.get(original.as_usize()) as u32;
                let live = DocNo::new(original.as_u32() - deleted_before);
                let sorted = doc_map.old_to_new(live);
                Ok(write_map.remap(sorted))
            }
        }
    }

    #[cfg(test)]
    fn deletion_table(&self) -> Option<&PackedLongBuffer> {
        match &self.state {
            MergeState::Sorted { deletes, .. } => deletes.as_ref(),
            _ => None,
        }
    }
}
