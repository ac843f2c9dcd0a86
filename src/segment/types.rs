//! Core types for the segment-based index

use serde::{Deserialize, Serialize};
use std::fmt;

/// Segment identifier (monotonically increasing per shard)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub u64);

impl SegmentId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment_{}", self.0)
    }
}

/// Dense document number within a reader or view (0..doc_count)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocNo(pub u32);

impl DocNo {
    pub const MAX: DocNo = DocNo(u32::MAX);

    pub fn new(n: u32) -> Self {
        Self(n)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Direction of a sort field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => write!(f, "asc"),
            SortOrder::Desc => write!(f, "desc"),
        }
    }
}

/// One (field, direction) comparator within a sort specification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub order: SortOrder,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// Ordered list of sort fields defining a total document order.
///
/// A specification must be idempotent under repeated application: sorting an
/// already-sorted segment again has to reproduce the same order, otherwise
/// the "already sorted" marker written into segment diagnostics is unsound.
/// A spec whose result depends on prior physical order breaks this.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub fields: Vec<SortField>,
}

impl SortSpec {
    pub fn new(fields: Vec<SortField>) -> Self {
        Self { fields }
    }

    pub fn by_field(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            fields: vec![SortField {
                field: field.into(),
                order,
            }],
        }
    }

    /// Stable textual signature used as the idempotence marker in segment
    /// diagnostics. Comparison is textual, never semantic: two specs that
    /// sort identically but serialize differently count as different.
    pub fn signature(&self) -> String {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("{}:{}", f.field, f.order))
            .collect();
        parts.join(",")
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}
