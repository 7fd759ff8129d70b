//! Cross-source aggregating merge
//!
//! [`AggregatingMerge`] drives one [`InterpolatingCursor`] per source in
//! lock-step. Every cursor always sits at the same offset, and the merge only
//! visits offsets at which at least one source has a real (not interpolated)
//! bucket. Finding the next such offset is a min-heap lookup on each cursor's
//! next real offset.
//!
//! ```text
//! source A:  x . . x . x
//! source B:  . x . . . x
//! visited:   0 1   3   5
//! ```

use crate::query::interpolate::InterpolatingCursor;
use crate::query::request::Aggregator;

// ============================================================================
// CursorHeap
// ============================================================================

/// Binary min-heap of cursors ordered by next real offset
///
/// Cursors without remaining data sort after every valid cursor and compare
/// equal to each other.
#[derive(Debug, Clone)]
pub struct CursorHeap<'a> {
    cursors: Vec<InterpolatingCursor<'a>>,
}

impl<'a> CursorHeap<'a> {
    /// Wrap cursors without ordering them; call [`init`](Self::init) before use
    pub fn new(cursors: Vec<InterpolatingCursor<'a>>) -> Self {
        Self { cursors }
    }

    /// Number of cursors
    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    /// Returns true if the heap holds no cursors
    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Cursor with the smallest next real offset
    pub fn peek(&self) -> Option<&InterpolatingCursor<'a>> {
        self.cursors.first()
    }

    /// All cursors in heap order
    pub fn cursors(&self) -> &[InterpolatingCursor<'a>] {
        &self.cursors
    }

    /// Establish the heap property over all cursors
    pub fn init(&mut self) {
        let n = self.cursors.len();
        for i in (0..n / 2).rev() {
            self.down(i, n);
        }
    }

    /// Restore the heap property after the cursor at `i` changed
    pub fn fix(&mut self, i: usize) {
        if !self.down(i, self.cursors.len()) {
            self.up(i);
        }
    }

    /// Add a cursor
    pub fn push(&mut self, cursor: InterpolatingCursor<'a>) {
        self.cursors.push(cursor);
        self.up(self.cursors.len() - 1);
    }

    /// Remove and return the cursor with the smallest next real offset
    pub fn pop(&mut self) -> Option<InterpolatingCursor<'a>> {
        if self.cursors.is_empty() {
            return None;
        }
        let n = self.cursors.len() - 1;
        self.cursors.swap(0, n);
        self.down(0, n);
        self.cursors.pop()
    }

    fn less(&self, i: usize, j: usize) -> bool {
        let this = self.cursors[i].next_real();
        let other = self.cursors[j].next_real();
        match (this.is_valid(), other.is_valid()) {
            (false, _) => false,
            (true, false) => true,
            (true, true) => this.offset() < other.offset(),
        }
    }

    fn up(&mut self, mut j: usize) {
        while j > 0 {
            let parent = (j - 1) / 2;
            if !self.less(j, parent) {
                break;
            }
            self.cursors.swap(parent, j);
            j = parent;
        }
    }

    fn down(&mut self, i0: usize, n: usize) -> bool {
        let mut i = i0;
        loop {
            let left = 2 * i + 1;
            if left >= n {
                break;
            }
            let mut child = left;
            let right = left + 1;
            if right < n && self.less(right, left) {
                child = right;
            }
            if !self.less(child, i) {
                break;
            }
            self.cursors.swap(i, child);
            i = child;
        }
        i > i0
    }
}

// ============================================================================
// AggregatingMerge
// ============================================================================

/// Lock-step walk over the union of real offsets of several sources
#[derive(Debug, Clone)]
pub struct AggregatingMerge<'a> {
    heap: CursorHeap<'a>,
}

impl<'a> AggregatingMerge<'a> {
    /// Create a merge over per-source cursors all positioned at offset 0
    pub fn new(cursors: Vec<InterpolatingCursor<'a>>) -> Self {
        Self {
            heap: CursorHeap::new(cursors),
        }
    }

    /// Order the cursors and move to the first offset with real data
    pub fn init(&mut self) {
        self.heap.init();
        if !self.is_valid() {
            return;
        }
        if self.root().next_real().offset() > 0 {
            self.advance();
        }
    }

    /// Returns true while any source has real data at or after the current
    /// offset
    pub fn is_valid(&self) -> bool {
        self.heap.peek().is_some_and(InterpolatingCursor::is_valid)
    }

    /// Returns true if any source has run out of real data
    pub fn any_invalid(&self) -> bool {
        self.heap.cursors().iter().any(|c| !c.is_valid())
    }

    /// Move every cursor to the next offset at which any source has real data
    pub fn advance(&mut self) {
        if !self.is_valid() {
            return;
        }

        // Step every cursor off the current offset
        let current = self.root().offset();
        while self.root().offset() == current {
            self.heap.cursors[0].advance_to(current + 1);
            self.heap.fix(0);
        }

        if !self.is_valid() {
            return;
        }

        let next = self.root().next_real().offset();
        for cursor in &mut self.heap.cursors {
            cursor.advance_to(next);
        }
        self.heap.init();
    }

    /// Mid-period timestamp of the current offset
    pub fn timestamp(&self) -> Option<i64> {
        if !self.is_valid() {
            return None;
        }
        Some(self.root().mid_timestamp())
    }

    /// Sum and count of the sources with a value at the current offset
    pub fn valid_sum_and_count(&self) -> (f64, usize) {
        let mut sum = 0.0;
        let mut count = 0;
        for value in self.heap.cursors().iter().filter_map(InterpolatingCursor::value) {
            sum += value;
            count += 1;
        }
        (sum, count)
    }

    /// Sum across sources
    pub fn sum(&self) -> Option<f64> {
        match self.valid_sum_and_count() {
            (_, 0) => None,
            (sum, _) => Some(sum),
        }
    }

    /// Mean across sources
    pub fn avg(&self) -> Option<f64> {
        match self.valid_sum_and_count() {
            (_, 0) => None,
            (sum, count) => Some(sum / count as f64),
        }
    }

    /// Maximum across sources
    pub fn max(&self) -> Option<f64> {
        self.heap
            .cursors()
            .iter()
            .filter_map(InterpolatingCursor::value)
            .fold(None, |acc, v| match acc {
                Some(m) if m >= v => Some(m),
                _ => Some(v),
            })
    }

    /// Minimum across sources
    pub fn min(&self) -> Option<f64> {
        self.heap
            .cursors()
            .iter()
            .filter_map(InterpolatingCursor::value)
            .fold(None, |acc, v| match acc {
                Some(m) if m <= v => Some(m),
                _ => Some(v),
            })
    }

    /// Evaluate `aggregator` across sources
    pub fn aggregate(&self, aggregator: Aggregator) -> Option<f64> {
        match aggregator {
            Aggregator::Sum => self.sum(),
            Aggregator::Avg => self.avg(),
            Aggregator::Max => self.max(),
            Aggregator::Min => self.min(),
        }
    }

    /// Number of sources being merged
    pub fn source_count(&self) -> usize {
        self.heap.len()
    }

    fn root(&self) -> &InterpolatingCursor<'a> {
        &self.heap.cursors[0]
    }
}

// ============================================================================
// LeadingEdgeFilter
// ============================================================================

/// Suppresses incomplete aggregates near the present
///
/// The newest point is often reported by some sources before others. Past
/// `cutoff_nanos` an aggregate is only emitted once every source has data at
/// or after the current offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadingEdgeFilter {
    aggregator: Aggregator,
    cutoff_nanos: i64,
}

impl LeadingEdgeFilter {
    /// Create a filter around `aggregator`
    pub fn new(aggregator: Aggregator, cutoff_nanos: i64) -> Self {
        Self {
            aggregator,
            cutoff_nanos,
        }
    }

    /// Cutoff timestamp
    pub fn cutoff_nanos(&self) -> i64 {
        self.cutoff_nanos
    }

    /// Aggregate at the merge's current offset, unless suppressed
    pub fn value(&self, merge: &AggregatingMerge<'_>) -> Option<f64> {
        let value = merge.aggregate(self.aggregator)?;
        match merge.timestamp() {
            Some(ts) if ts > self.cutoff_nanos && merge.any_invalid() => None,
            _ => Some(value),
        }
    }
}
