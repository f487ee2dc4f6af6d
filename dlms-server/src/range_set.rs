//! Non-overlapping half-open ranges with a value each
//!
//! Short names are looked up by point: which object's range contains this
//! variable name. Ranges are kept sorted by start so lookup is a binary search.

use std::ops::Range;

#[derive(Debug, Clone)]
pub struct RangeSet<T> {
    entries: Vec<(Range<u16>, T)>,
}

impl<T> Default for RangeSet<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T> RangeSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `range`, or return the existing range it overlaps.
    ///
    /// Empty ranges cover nothing and are rejected as overlapping themselves.
    pub fn insert(&mut self, range: Range<u16>, value: T) -> Result<(), Range<u16>> {
        if range.is_empty() {
            return Err(range);
        }
        let index = self.entries.partition_point(|(r, _)| r.start < range.start);
        if let Some((before, _)) = index.checked_sub(1).map(|i| &self.entries[i]) {
            if before.end > range.start {
                return Err(before.clone());
            }
        }
        if let Some((after, _)) = self.entries.get(index) {
            if after.start < range.end {
                return Err(after.clone());
            }
        }
        self.entries.insert(index, (range, value));
        Ok(())
    }

    /// Range containing `point`, with its value.
    pub fn get(&self, point: u16) -> Option<(&Range<u16>, &T)> {
        let index = self.entries.partition_point(|(r, _)| r.start <= point);
        let (range, value) = self.entries.get(index.checked_sub(1)?)?;
        range.contains(&point).then_some((range, value))
    }

    pub fn remove(&mut self, start: u16) -> Option<T> {
        let index = self.entries.binary_search_by_key(&start, |(r, _)| r.start).ok()?;
        Some(self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Range<u16>, &T)> {
        self.entries.iter().map(|(r, v)| (r, v))
    }
}
