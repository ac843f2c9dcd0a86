//! Unified and sorted document views for a merge
//!
//! A merge sees all of its input readers as one logical reader: the
//! concatenation of their ordinal ranges, deleted documents included. The
//! sorter runs over that view; when it returns a permutation the merge input
//! becomes a single `SortedView` presenting live documents in the new order.

use std::sync::Arc;

use crate::error::{OrdexError, Result};

use super::reader::SegmentReader;
use super::types::DocNo;

/// Outcome of the sorter contract: either the canonical "already in order"
/// sentinel or a concrete permutation over the live documents.
#[derive(Debug)]
pub enum DocMap {
    /// No permutation occurred; merge inputs pass through untouched
    Identity,
    Permutation(Permutation),
}

impl DocMap {
    pub fn is_identity(&self) -> bool {
        matches!(self, DocMap::Identity)
    }
}

/// A bijection over `[0, live_doc_count)`, with both directions materialized.
///
/// Immutable once computed; `map_doc` consults it once per rewritten posting.
#[derive(Debug)]
pub struct Permutation {
    old_to_new: Vec<DocNo>,
    new_to_old: Vec<DocNo>,
}

impl Permutation {
    /// Build from the old->new direction, validating bijectivity.
    pub fn from_old_to_new(old_to_new: Vec<DocNo>) -> Result<Self> {
        let n = old_to_new.len();
        let mut new_to_old = vec![DocNo::MAX; n];
        for (old, &new) in old_to_new.iter().enumerate() {
            if new.as_usize() >= n || new_to_old[new.as_usize()] != DocNo::MAX {
                return Err(OrdexError::CorruptDocMap {
                    expected: n,
                    actual: new.as_usize(),
                });
            }
            new_to_old[new.as_usize()] = DocNo::new(old as u32);
        }
        Ok(Self {
            old_to_new,
            new_to_old,
        })
    }

    pub fn len(&self) -> usize {
        self.old_to_new.len()
    }

    pub fn is_empty(&self) -> bool {
        self.old_to_new.is_empty()
    }

    pub fn old_to_new(&self, old: DocNo) -> DocNo {
        self.old_to_new[old.as_usize()]
    }

    pub fn new_to_old(&self, new: DocNo) -> DocNo {
        self.new_to_old[new.as_usize()]
    }
}

/// One logical reader over all of a merge's input readers.
///
/// Documents keep their concatenated with-deletions ordinals: reader `k`'s
/// document `d` appears at ordinal `starts[k] + d`. A single input reader is
/// the view, with no composite indirection.
#[derive(Debug)]
pub enum UnifiedView {
    Single(Arc<SegmentReader>),
    Multi(CompositeView),
}

/// Concatenation of several readers' ordinal ranges behind one liveness view
#[derive(Debug)]
pub struct CompositeView {
    readers: Vec<Arc<SegmentReader>>,
    /// First ordinal of each reader within the concatenation
    starts: Vec<u32>,
    doc_count: u32,
    live_doc_count: u32,
}

impl UnifiedView {
    pub fn new(mut readers: Vec<Arc<SegmentReader>>) -> Self {
        if readers.len() == 1 {
            return UnifiedView::Single(readers.swap_remove(0));
        }
        let mut starts = Vec::with_capacity(readers.len());
        let mut doc_count = 0u32;
        let mut live_doc_count = 0u32;
        for reader in &readers {
            starts.push(doc_count);
            doc_count += reader.doc_count();
            live_doc_count += reader.live_doc_count();
        }
        UnifiedView::Multi(CompositeView {
            readers,
            starts,
            doc_count,
            live_doc_count,
        })
    }

    /// Total documents, deleted ones included
    pub fn doc_count(&self) -> u32 {
        match self {
            UnifiedView::Single(r) => r.doc_count(),
            UnifiedView::Multi(c) => c.doc_count,
        }
    }

    pub fn live_doc_count(&self) -> u32 {
        match self {
            UnifiedView::Single(r) => r.live_doc_count(),
            UnifiedView::Multi(c) => c.live_doc_count,
        }
    }

    /// Flattened liveness over the concatenated ordinal space
    pub fn is_live(&self, doc: DocNo) -> bool {
        match self {
            UnifiedView::Single(r) => r.is_live(doc),
            UnifiedView::Multi(c) => {
                let (reader, local) = c.locate(doc);
                c.readers[reader].is_live(local)
            }
        }
    }

    /// Numeric doc value at a concatenated ordinal
    pub fn sort_value(&self, field: &str, doc: DocNo) -> Option<i64> {
        match self {
            UnifiedView::Single(r) => r.sort_value(field, doc),
            UnifiedView::Multi(c) => {
                let (reader, local) = c.locate(doc);
                c.readers[reader].sort_value(field, local)
            }
        }
    }

    /// The underlying readers, in concatenation order
    pub fn readers(&self) -> &[Arc<SegmentReader>] {
        match self {
            UnifiedView::Single(r) => std::slice::from_ref(r),
            UnifiedView::Multi(c) => &c.readers,
        }
    }

    /// Concatenated ordinals of live documents, in ordinal order
    pub fn live_docs(&self) -> impl Iterator<Item = DocNo> + '_ {
        (0..self.doc_count())
            .map(DocNo::new)
            .filter(move |&doc| self.is_live(doc))
    }
}

impl CompositeView {
    fn locate(&self, doc: DocNo) -> (usize, DocNo) {
        debug_assert!(doc.as_u32() < self.doc_count);
        // partition_point keeps empty readers from shadowing the real owner
        let reader = self.starts.partition_point(|&start| start <= doc.as_u32()) - 1;
        (reader, DocNo::new(doc.as_u32() - self.starts[reader]))
    }
}

/// A singleton reader presenting a merge's live documents in sorted order.
///
/// Document `i` of this view is the live document the sorter placed at new
/// ordinal `i`; access resolves through `new_to_old` back to the original
/// concatenated ordinal.
#[derive(Debug)]
pub struct SortedView {
    view: UnifiedView,
    /// New ordinal -> original with-deletions concatenated ordinal
    new_to_orig: Vec<DocNo>,
}

impl SortedView {
    pub(crate) fn new(view: UnifiedView, permutation: &Permutation) -> Self {
        let live: Vec<DocNo> = view.live_docs().collect();
        debug_assert_eq!(live.len(), permutation.len());
        let new_to_orig = (0..live.len())
            .map(|new| live[permutation.new_to_old(DocNo::new(new as u32)).as_usize()])
            .collect();
        Self { view, new_to_orig }
    }

    /// Number of documents in sorted order (all live)
    pub fn doc_count(&self) -> u32 {
        self.new_to_orig.len() as u32
    }

    /// Original concatenated ordinal backing sorted ordinal `doc`
    pub fn original_ordinal(&self, doc: DocNo) -> DocNo {
        self.new_to_orig[doc.as_usize()]
    }

    /// Numeric doc value at a sorted ordinal
    pub fn sort_value(&self, field: &str, doc: DocNo) -> Option<i64> {
        self.view.sort_value(field, self.original_ordinal(doc))
    }

    pub(crate) fn unified(&self) -> &UnifiedView {
        &self.view
    }
}
