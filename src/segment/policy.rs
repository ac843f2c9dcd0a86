//! Merge-planning contract and the sorting decorator
//!
//! Segment selection lives in an inner planning component behind the
//! `MergePolicy` trait; this module never second-guesses its decisions.
//! `SortingMergePolicy` decorates such a component so that every merge it
//! proposes carries the document reordering machinery.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;

use super::reader::{SegmentMeta, SegmentReader};
use super::sorter::Sorter;
use super::sorting_merge::{MergeContext, SortingMerge, SORT_SIGNATURE_KEY};
use super::types::{SegmentId, SortSpec};

/// A merge as decided by a planning component: just the segment list
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedMerge {
    pub segments: Vec<SegmentId>,
}

impl PlannedMerge {
    pub fn new(segments: Vec<SegmentId>) -> Self {
        Self { segments }
    }
}

/// One unit of a merge specification: either the planner's plain merge or a
/// plain merge wrapped for sorting.
#[derive(Debug)]
pub enum OneMerge {
    Plain(PlannedMerge),
    Sorting(SortingMerge),
}

impl OneMerge {
    pub fn segments(&self) -> &[SegmentId] {
        match self {
            OneMerge::Plain(plan) => &plan.segments,
            OneMerge::Sorting(merge) => merge.segments(),
        }
    }
}

/// The set of merges a planning entry point proposes
#[derive(Debug, Default)]
pub struct MergeSpecification {
    pub merges: Vec<OneMerge>,
}

impl MergeSpecification {
    pub fn new() -> Self {
        Self { merges: Vec::new() }
    }

    pub fn add(&mut self, merge: OneMerge) {
        self.merges.push(merge);
    }

    pub fn len(&self) -> usize {
        self.merges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merges.is_empty()
    }
}

/// Merge-planning component contract.
///
/// Planning entry points return `None` when nothing should merge. The other
/// hooks cover the full planner lifecycle: compound-file decisions, writer
/// registration, deep cloning and disposal.
pub trait MergePolicy: Send + Sync {
    /// Natural merges, triggered by segment churn
    fn find_merges(&self, segments: &[Arc<SegmentReader>]) -> Option<MergeSpecification>;

    /// Merges forced to reach at most `max_segment_count` segments
    fn find_forced_merges(
        &self,
        segments: &[Arc<SegmentReader>],
        max_segment_count: usize,
    ) -> Option<MergeSpecification>;

    /// Merges forced to expunge deleted documents
    fn find_forced_delete_merges(
        &self,
        segments: &[Arc<SegmentReader>],
    ) -> Option<MergeSpecification>;

    /// Whether the merged segment should use a compound file
    fn use_compound_file(&self, segments: &[Arc<SegmentReader>], merged: &SegmentMeta) -> bool;

    /// Called when the owning index writer registers this policy
    fn register_writer(&mut self, ctx: Arc<dyn MergeContext>);

    /// Deep clone of this policy
    fn clone_policy(&self) -> Box<dyn MergePolicy>;

    /// Release any resources held by the policy
    fn close(&mut self);
}

/// Decorator imposing a total document order on every merge the inner
/// planning component proposes.
pub struct SortingMergePolicy {
    inner: Box<dyn MergePolicy>,
    sort: Arc<SortSpec>,
    sorter: Arc<dyn Sorter>,
}

impl SortingMergePolicy {
    pub fn new(inner: Box<dyn MergePolicy>, sort: SortSpec, sorter: Arc<dyn Sorter>) -> Self {
        Self {
            inner,
            sort: Arc::new(sort),
            sorter,
        }
    }

    pub fn sort(&self) -> &SortSpec {
        &self.sort
    }

    /// Whether a segment was written under the given sort specification.
    ///
    /// This compares the diagnostics annotation textually against the spec's
    /// signature. Semantically equivalent specs that serialize differently
    /// are treated as different; preserved as observed behavior.
    pub fn is_sorted(reader: &SegmentReader, sort: &SortSpec) -> bool {
        reader
            .meta()
            .diagnostics
            .get(SORT_SIGNATURE_KEY)
            .map_or(false, |sig| *sig == sort.signature())
    }

    fn wrap(&self, spec: Option<MergeSpecification>) -> Option<MergeSpecification> {
        let spec = spec?;
        debug!(
            merges = spec.merges.len(),
            sort = %self.sort,
            "wrapping planned merges for sorting"
        );
        let merges = spec
            .merges
            .into_iter()
            .map(|merge| match merge {
                OneMerge::Plain(plan) => OneMerge::Sorting(SortingMerge::new(
                    plan.segments,
                    Arc::clone(&self.sort),
                    Arc::clone(&self.sorter),
                )),
                sorting @ OneMerge::Sorting(_) => sorting,
            })
            .collect();
        Some(MergeSpecification { merges })
    }
}

impl MergePolicy for SortingMergePolicy {
    fn find_merges(&self, segments: &[Arc<SegmentReader>]) -> Option<MergeSpecification> {
        self.wrap(self.inner.find_merges(segments))
    }

    fn find_forced_merges(
        &self,
        segments: &[Arc<SegmentReader>],
        max_segment_count: usize,
    ) -> Option<MergeSpecification> {
        self.wrap(self.inner.find_forced_merges(segments, max_segment_count))
    }

    fn find_forced_delete_merges(
        &self,
        segments: &[Arc<SegmentReader>],
    ) -> Option<MergeSpecification> {
        self.wrap(self.inner.find_forced_delete_merges(segments))
    }

    fn use_compound_file(&self, segments: &[Arc<SegmentReader>], merged: &SegmentMeta) -> bool {
        self.inner.use_compound_file(segments, merged)
    }

    fn register_writer(&mut self, ctx: Arc<dyn MergeContext>) {
        self.inner.register_writer(ctx);
    }

    fn clone_policy(&self) -> Box<dyn MergePolicy> {
        Box::new(SortingMergePolicy {
            inner: self.inner.clone_policy(),
            sort: Arc::clone(&self.sort),
            sorter: Arc::clone(&self.sorter),
        })
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as OrdexResult;
    use crate::segment::types::{SortField, SortOrder};
    use crate::segment::view::{DocMap, UnifiedView};
    use roaring::RoaringBitmap;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Inner planner scripted to always propose the same plans
    struct ScriptedPolicy {
        plans: Vec<Vec<SegmentId>>,
        compound: bool,
        closed: Arc<AtomicUsize>,
        registered: Arc<AtomicUsize>,
    }

    impl ScriptedPolicy {
        fn new(plans: Vec<Vec<SegmentId>>) -> Self {
            Self {
                plans,
                compound: true,
                closed: Arc::new(AtomicUsize::new(0)),
                registered: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn spec(&self) -> Option<MergeSpecification> {
            if self.plans.is_empty() {
                return None;
            }
            let mut spec = MergeSpecification::new();
            for plan in &self.plans {
                spec.add(OneMerge::Plain(PlannedMerge::new(plan.clone())));
            }
            Some(spec)
        }
    }

    impl MergePolicy for ScriptedPolicy {
        fn find_merges(&self, _segments: &[Arc<SegmentReader>]) -> Option<MergeSpecification> {
            self.spec()
        }

        fn find_forced_merges(
            &self,
            _segments: &[Arc<SegmentReader>],
            _max_segment_count: usize,
        ) -> Option<MergeSpecification> {
            self.spec()
        }

        fn find_forced_delete_merges(
            &self,
            _segments: &[Arc<SegmentReader>],
        ) -> Option<MergeSpecification> {
            self.spec()
        }

        fn use_compound_file(
            &self,
            _segments: &[Arc<SegmentReader>],
            _merged: &SegmentMeta,
        ) -> bool {
            self.compound
        }

        fn register_writer(&mut self, _ctx: Arc<dyn MergeContext>) {
            self.registered.fetch_add(1, Ordering::SeqCst);
        }

        fn clone_policy(&self) -> Box<dyn MergePolicy> {
            Box::new(ScriptedPolicy {
                plans: self.plans.clone(),
                compound: self.compound,
                closed: Arc::new(AtomicUsize::new(0)),
                registered: Arc::new(AtomicUsize::new(0)),
            })
        }

        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct NoopSorter;

    impl Sorter for NoopSorter {
        fn sort(&self, _spec: &SortSpec, _view: &UnifiedView) -> OrdexResult<DocMap> {
            Ok(DocMap::Identity)
        }
    }

    fn sort_spec() -> SortSpec {
        SortSpec::new(vec![SortField {
            field: "ts".to_string(),
            order: SortOrder::Asc,
        }])
    }

    fn reader_with_diagnostics(diagnostics: &[(&str, &str)]) -> SegmentReader {
        let mut meta = SegmentMeta::new(SegmentId::new(1), 0, 0);
        for (k, v) in diagnostics {
            meta.diagnostics.insert(k.to_string(), v.to_string());
        }
        SegmentReader::from_memory(meta, RoaringBitmap::new(), HashMap::new())
    }

    #[test]
    fn test_every_planned_merge_is_wrapped() {
        let inner = ScriptedPolicy::new(vec![
            vec![SegmentId::new(1), SegmentId::new(2)],
            vec![SegmentId::new(3)],
        ]);
        let policy = SortingMergePolicy::new(Box::new(inner), sort_spec(), Arc::new(NoopSorter));

        let spec = policy.find_merges(&[]).unwrap();
        assert_eq!(spec.len(), 2);
        for merge in &spec.merges {
            assert!(matches!(merge, OneMerge::Sorting(_)));
        }
        // Segment lists pass through unchanged
        assert_eq!(
            spec.merges[0].segments(),
            &[SegmentId::new(1), SegmentId::new(2)]
        );
        assert_eq!(spec.merges[1].segments(), &[SegmentId::new(3)]);
    }

    #[test]
    fn test_empty_plan_passes_through() {
        let inner = ScriptedPolicy::new(vec![]);
        let policy = SortingMergePolicy::new(Box::new(inner), sort_spec(), Arc::new(NoopSorter));
        assert!(policy.find_merges(&[]).is_none());
        assert!(policy.find_forced_merges(&[], 1).is_none());
        assert!(policy.find_forced_delete_merges(&[]).is_none());
    }

    #[test]
    fn test_forced_entry_points_wrap_too() {
        let inner = ScriptedPolicy::new(vec![vec![SegmentId::new(5)]]);
        let policy = SortingMergePolicy::new(Box::new(inner), sort_spec(), Arc::new(NoopSorter));

        let forced = policy.find_forced_merges(&[], 1).unwrap();
        assert!(matches!(forced.merges[0], OneMerge::Sorting(_)));
        let deletes = policy.find_forced_delete_merges(&[]).unwrap();
        assert!(matches!(deletes.merges[0], OneMerge::Sorting(_)));
    }

    #[test]
    fn test_is_sorted_textual_equality() {
        let sort = sort_spec();

        let sorted = reader_with_diagnostics(&[(SORT_SIGNATURE_KEY, "ts:asc")]);
        assert!(SortingMergePolicy::is_sorted(&sorted, &sort));

        let unsorted = reader_with_diagnostics(&[]);
        assert!(!SortingMergePolicy::is_sorted(&unsorted, &sort));

        // Textual comparison only: a differently serialized but semantically
        // identical signature does not match
        let other = reader_with_diagnostics(&[(SORT_SIGNATURE_KEY, "ts:ASC")]);
        assert!(!SortingMergePolicy::is_sorted(&other, &sort));

        let different = reader_with_diagnostics(&[(SORT_SIGNATURE_KEY, "ts:desc")]);
        assert!(!SortingMergePolicy::is_sorted(&different, &sort));
    }

    #[test]
    fn test_pass_throughs() {
        let inner = ScriptedPolicy::new(vec![]);
        let closed = inner.closed.clone();
        let registered = inner.registered.clone();
        let mut policy =
            SortingMergePolicy::new(Box::new(inner), sort_spec(), Arc::new(NoopSorter));

        let merged = SegmentMeta::new(SegmentId::new(9), 0, 0);
        assert!(policy.use_compound_file(&[], &merged));

        struct NoReaders;
        impl MergeContext for NoReaders {
            fn merge_readers(
                &self,
                _segments: &[SegmentId],
            ) -> OrdexResult<Vec<Arc<SegmentReader>>> {
                Ok(Vec::new())
            }
        }
        policy.register_writer(Arc::new(NoReaders));
        assert_eq!(registered.load(Ordering::SeqCst), 1);

        policy.close();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clone_deep_clones_inner_and_shares_sort() {
        let inner = ScriptedPolicy::new(vec![vec![SegmentId::new(1)]]);
        let policy = SortingMergePolicy::new(Box::new(inner), sort_spec(), Arc::new(NoopSorter));

        let clone = policy.clone_policy();
        // The clone plans independently but identically
        let spec = clone.find_merges(&[]).unwrap();
        assert_eq!(spec.len(), 1);
        assert_eq!(spec.merges[0].segments(), &[SegmentId::new(1)]);
    }
}
