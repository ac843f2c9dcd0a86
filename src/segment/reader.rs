//! Immutable segment metadata and reader
//!
//! Each segment carries a string-keyed diagnostics map alongside its counts;
//! the sorting merge annotates exactly one key in it (the sort signature)
//! and never touches the rest.

use std::collections::{BTreeMap, HashMap};

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use super::types::{DocNo, SegmentId};

/// Metadata for a segment stored in the manifest
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// Unique segment identifier
    pub id: SegmentId,
    /// Number of documents in the segment (including deleted)
    pub doc_count: u32,
    /// Number of live (non-deleted) documents
    pub live_doc_count: u32,
    /// Size in bytes (all segment files combined)
    pub size_bytes: u64,
    /// Creation timestamp
    pub created_at: u64,
    /// String-keyed annotation map persisted with the segment
    pub diagnostics: BTreeMap<String, String>,
}

impl SegmentMeta {
    pub fn new(id: SegmentId, doc_count: u32, live_doc_count: u32) -> Self {
        Self {
            id,
            doc_count,
            live_doc_count,
            size_bytes: 0,
            created_at: 0,
            diagnostics: BTreeMap::new(),
        }
    }

    pub fn delete_ratio(&self) -> f64 {
        if self.doc_count == 0 {
            0.0
        } else {
            1.0 - (self.live_doc_count as f64 / self.doc_count as f64)
        }
    }
}

/// Immutable view over one segment's documents
///
/// Exposes the document count, a per-document liveness bitset and the numeric
/// doc-value columns an external sorter may key on.
#[derive(Debug)]
pub struct SegmentReader {
    meta: SegmentMeta,
    /// Delete bitset: which docnos are deleted
    deleted: RoaringBitmap,
    /// Per-field numeric doc values, one entry per docno
    docvalues: HashMap<String, Vec<i64>>,
}

impl SegmentReader {
    /// Create a segment reader from in-memory data
    ///
    /// Every doc-value column must have exactly `meta.doc_count` entries.
    pub fn from_memory(
        meta: SegmentMeta,
        deleted: RoaringBitmap,
        docvalues: HashMap<String, Vec<i64>>,
    ) -> Self {
        debug_assert!(docvalues
            .values()
            .all(|col| col.len() == meta.doc_count as usize));
        Self {
            meta,
            deleted,
            docvalues,
        }
    }

    /// Get segment metadata
    pub fn meta(&self) -> &SegmentMeta {
        &self.meta
    }

    /// Get segment ID
    pub fn id(&self) -> SegmentId {
        self.meta.id
    }

    /// Get the number of documents (including deleted)
    pub fn doc_count(&self) -> u32 {
        self.meta.doc_count
    }

    /// Get the number of live documents
    pub fn live_doc_count(&self) -> u32 {
        self.meta.live_doc_count
    }

    /// Check if a docno is deleted
    pub fn is_deleted(&self, docno: DocNo) -> bool {
        self.deleted.contains(docno.as_u32())
    }

    /// Check if a docno is live (exists and not deleted)
    pub fn is_live(&self, docno: DocNo) -> bool {
        docno.as_u32() < self.meta.doc_count && !self.deleted.contains(docno.as_u32())
    }

    /// Get the delete ratio
    pub fn delete_ratio(&self) -> f64 {
        self.meta.delete_ratio()
    }

    /// Numeric doc value for a field, if the field has a column
    pub fn sort_value(&self, field: &str, docno: DocNo) -> Option<i64> {
        self.docvalues
            .get(field)
            .and_then(|col| col.get(docno.as_usize()))
            .copied()
    }
}
