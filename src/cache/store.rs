//! Id-indexed page cache.
//!
//! Records are kept as non-overlapping inclusive spans so that a gap covering
//! millions of snowflake ids costs one entry rather than millions. Every id in
//! a span carries the span's record; lookups behave exactly like a per-id map.

use std::collections::BTreeMap;

use super::record::CacheRecord;

#[derive(Debug, Clone)]
struct Span {
    end: u64,
    record: CacheRecord,
}

/// Everything one feed source has learned about its remote timeline.
///
/// Grows for the life of the source; records are only ever strengthened.
#[derive(Debug, Default)]
pub struct PageCache {
    spans: BTreeMap<u64, Span>,
}

/// A cached record together with the lowest id sharing it.
#[derive(Debug, Clone, Copy)]
pub struct Lookup<'a> {
    pub first_id: u64,
    pub record: &'a CacheRecord,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record known for `id`, if any.
    pub fn get(&self, id: u64) -> Option<&CacheRecord> {
        self.lookup(id).map(|hit| hit.record)
    }

    /// Like [`PageCache::get`], also reporting where the covering span starts
    /// so callers walking downwards can skip the whole span at once.
    pub fn lookup(&self, id: u64) -> Option<Lookup<'_>> {
        let (start, span) = self.spans.range(..=id).next_back()?;
        (span.end >= id).then_some(Lookup {
            first_id: *start,
            record: &span.record,
        })
    }

    /// Merge `record` into whatever is known about `id`.
    pub fn put(&mut self, id: u64, record: CacheRecord) {
        self.put_range(id, id, record);
    }

    /// Merge `record` into every id of the inclusive range `low..=high`.
    pub fn put_range(&mut self, low: u64, high: u64, record: CacheRecord) {
        if low > high {
            return;
        }

        let mut overlapping: Vec<u64> = Vec::new();
        if let Some((start, span)) = self.spans.range(..low).next_back() {
            if span.end >= low {
                overlapping.push(*start);
            }
        }
        overlapping.extend(self.spans.range(low..=high).map(|(start, _)| *start));

        // Next id of the range not yet written; `None` once `high` is covered.
        let mut cursor = Some(low);
        for start in overlapping {
            let Some(span) = self.spans.remove(&start) else {
                continue;
            };

            if start < low {
                self.insert(start, low - 1, span.record.clone());
            }

            let covered_from = start.max(low);
            if let Some(next) = cursor.filter(|next| *next < covered_from) {
                self.insert(next, covered_from - 1, record.clone());
            }

            let covered_to = span.end.min(high);
            if span.end > high {
                self.insert(high + 1, span.end, span.record.clone());
            }
            self.insert(covered_from, covered_to, span.record.merge(record.clone()));

            cursor = covered_to.checked_add(1).filter(|next| *next <= high);
        }

        if let Some(next) = cursor {
            self.insert(next, high, record);
        }
    }

    /// Number of distinct spans held.
    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    fn insert(&mut self, start: u64, end: u64, record: CacheRecord) {
        self.spans.insert(start, Span { end, record });
    }
}
