use std::mem;

use snafu::{ensure, OptionExt as _};
use tracing::trace;

use super::Store;
use crate::error::{InvalidParameterSnafu, NotFoundSnafu, NotMergeableSnafu, SketchError};

const DEFAULT_PAGE_LEN_LOG2: u32 = 5;
const MAX_PAGE_LEN_LOG2: u32 = 16;
const INITIAL_BUFFER_CAPACITY: usize = 4;
const INITIAL_COMPACTION_TRIGGER_LEN: usize = 64;

// The page table grows by one cache line's worth of machine words at a time.
const CACHE_LINE_BYTES: usize = 64;
const PAGE_TABLE_GROWTH: usize = CACHE_LINE_BYTES / mem::size_of::<usize>();

const BUFFER_ENTRY_BYTES: usize = mem::size_of::<i32>();
const PAGE_SLOT_BYTES: usize = mem::size_of::<f64>();

/// A paged store that defers single hits into an unsorted buffer.
///
/// Weights are kept in fixed-size dense pages, addressed through a page table whose base offset can move in either
/// direction, so any part of the `i32` index range can be populated without allocating everything in between. Pages
/// are only allocated on demand.
///
/// Most real-world distributions hit a large number of buckets exactly once, and allocating a whole page for each of
/// those would be wasteful. Adding a weight of exactly one therefore appends the index to a buffer instead, unless the
/// page for that index already exists. Once the buffer fills up, it is compacted: buffered indices are grouped by page,
/// and each group is folded into a dense page only if that page would take less memory than the group itself.
///
/// Merging two stores requires that they use the same page length.
#[derive(Clone, Debug)]
pub struct PagedStore {
    /// Deferred unit-weight increments, in no particular order.
    buffer: Vec<i32>,

    /// Buffer length that must be reached before a full buffer is compacted instead of grown.
    compaction_trigger_len: usize,

    /// Page table. `pages[i]` holds the page with page index `min_page_index + i`.
    pages: Vec<Option<Box<[f64]>>>,

    /// Page index of `pages[0]`, or `None` if no page has ever been allocated.
    min_page_index: Option<i32>,

    page_len_log2: u32,
}

impl PagedStore {
    /// Creates an empty `PagedStore` with 32 buckets per page.
    pub fn new() -> Self {
        Self::with_valid_page_len_log2(DEFAULT_PAGE_LEN_LOG2)
    }

    /// Creates an empty `PagedStore` with `2^page_len_log2` buckets per page.
    ///
    /// # Errors
    ///
    /// If `page_len_log2` is not between 1 and 16, inclusive, an error is returned.
    pub fn with_page_len_log2(page_len_log2: u32) -> Result<Self, SketchError> {
        ensure!(
            (1..=MAX_PAGE_LEN_LOG2).contains(&page_len_log2),
            InvalidParameterSnafu {
                name: "page_len_log2",
                reason: "must be between 1 and 16 (inclusive)",
            }
        );

        Ok(Self::with_valid_page_len_log2(page_len_log2))
    }

    fn with_valid_page_len_log2(page_len_log2: u32) -> Self {
        Self {
            buffer: Vec::with_capacity(INITIAL_BUFFER_CAPACITY),
            compaction_trigger_len: INITIAL_COMPACTION_TRIGGER_LEN,
            pages: Vec::new(),
            min_page_index: None,
            page_len_log2,
        }
    }

    /// Returns the number of buckets per page.
    pub fn page_len(&self) -> usize {
        1 << self.page_len_log2
    }

    /// Returns the number of unit-weight increments currently held in the buffer.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the number of pages currently allocated.
    pub fn allocated_pages(&self) -> usize {
        self.pages.iter().filter(|page| page.is_some()).count()
    }

    #[inline]
    fn page_index(&self, index: i32) -> i32 {
        index >> self.page_len_log2
    }

    #[inline]
    fn line_index(&self, index: i32) -> usize {
        (index & self.line_mask()) as usize
    }

    #[inline]
    fn line_mask(&self) -> i32 {
        (1 << self.page_len_log2) - 1
    }

    #[inline]
    fn index(&self, page_index: i32, line_index: usize) -> i32 {
        (page_index << self.page_len_log2) + line_index as i32
    }

    /// Returns the position of the given page within the page table, if the table covers it.
    fn position(&self, page_index: i32) -> Option<usize> {
        let min_page_index = self.min_page_index?;
        let offset = i64::from(page_index) - i64::from(min_page_index);
        if offset >= 0 && (offset as usize) < self.pages.len() {
            Some(offset as usize)
        } else {
            None
        }
    }

    fn existing_page_mut(&mut self, page_index: i32) -> Option<&mut [f64]> {
        let position = self.position(page_index)?;
        self.pages[position].as_deref_mut()
    }

    /// Returns the page with the given page index, allocating it (and growing the page table) if necessary.
    fn page_mut(&mut self, page_index: i32) -> &mut [f64] {
        let position = match self.position(page_index) {
            Some(position) => position,
            None => self.grow_page_table(page_index),
        };

        let page_len = self.page_len();
        self.pages[position].get_or_insert_with(|| vec![0.0; page_len].into_boxed_slice())
    }

    /// Grows the page table so that it covers the given page index, returning the page's position.
    fn grow_page_table(&mut self, page_index: i32) -> usize {
        let old_len = self.pages.len();
        let min_page_index = match self.min_page_index {
            None => {
                // Center the first allocation on the requested page, since we don't know which way we'll grow next.
                self.pages.resize_with(table_len_for(1), || None);
                page_index - (self.pages.len() / 2) as i32
            }
            Some(min_page_index) if page_index < min_page_index => {
                let required = (i64::from(min_page_index) - i64::from(page_index)) as usize + old_len;
                let new_len = table_len_for(required);
                let added = new_len - old_len;

                // Existing pages shift right by `added`; the new, empty slots go in front of them.
                let mut pages = Vec::with_capacity(new_len);
                pages.resize_with(added, || None);
                pages.append(&mut self.pages);
                self.pages = pages;

                min_page_index - added as i32
            }
            Some(min_page_index) => {
                let required = (i64::from(page_index) - i64::from(min_page_index)) as usize + 1;
                self.pages.resize_with(table_len_for(required), || None);
                min_page_index
            }
        };
        self.min_page_index = Some(min_page_index);

        trace!(
            page_index,
            min_page_index,
            old_len,
            new_len = self.pages.len(),
            "Grew store page table."
        );

        (i64::from(page_index) - i64::from(min_page_index)) as usize
    }

    fn add_single(&mut self, index: i32) {
        let page_index = self.page_index(index);
        let line_index = self.line_index(index);
        if let Some(page) = self.existing_page_mut(page_index) {
            page[line_index] += 1.0;
            return;
        }

        if self.buffer.len() == self.buffer.capacity() && self.buffer.len() >= self.compaction_trigger_len {
            self.compact();
        }
        self.buffer.push(index);
    }

    /// Folds buffered increments into pages wherever a dense page is cheaper than the buffered entries.
    fn compact(&mut self) {
        let page_len = self.page_len();
        let page_len_log2 = self.page_len_log2;
        let line_mask = self.line_mask();

        let mut buffer = mem::take(&mut self.buffer);
        buffer.sort_unstable();

        // Unfolded groups are shifted down over folded ones, so the buffer keeps its allocation.
        let mut retained_len = 0;
        let mut group_start = 0;
        while group_start < buffer.len() {
            let page_index = buffer[group_start] >> page_len_log2;
            let group_len = buffer[group_start..]
                .iter()
                .take_while(|index| (**index >> page_len_log2) == page_index)
                .count();
            let group = group_start..group_start + group_len;

            let worth_paging = group_len * BUFFER_ENTRY_BYTES >= page_len * PAGE_SLOT_BYTES;
            let page = if worth_paging {
                Some(self.page_mut(page_index))
            } else {
                self.existing_page_mut(page_index)
            };

            match page {
                Some(page) => {
                    for index in &buffer[group.clone()] {
                        page[(index & line_mask) as usize] += 1.0;
                    }
                }
                None => {
                    buffer.copy_within(group.clone(), retained_len);
                    retained_len += group_len;
                }
            }
            group_start = group.end;
        }

        let folded = buffer.len() - retained_len;
        buffer.truncate(retained_len);
        self.buffer = buffer;
        self.compaction_trigger_len = self.buffer.len() + page_len;

        trace!(
            folded,
            remaining = self.buffer.len(),
            trigger_len = self.compaction_trigger_len,
            "Compacted store buffer."
        );
    }

    /// Walks buffered entries and page slots in ascending index order, returning the first index at which the
    /// cumulative weight exceeds `rank`.
    fn min_index_with_cumulative_weight(&mut self, rank: f64) -> Option<i32> {
        self.buffer.sort_unstable();

        let mut cumulative = 0.0;
        let mut buffered = self.buffer.iter().copied().peekable();

        if let Some(min_page_index) = self.min_page_index {
            for (offset, page) in self.pages.iter().enumerate() {
                let Some(page) = page else { continue };
                let page_index = min_page_index + offset as i32;

                for (line_index, weight) in page.iter().enumerate() {
                    let index = self.index(page_index, line_index);
                    while let Some(buffered_index) = buffered.next_if(|buffered_index| *buffered_index < index) {
                        cumulative += 1.0;
                        if cumulative > rank {
                            return Some(buffered_index);
                        }
                    }

                    cumulative += weight;
                    if cumulative > rank {
                        return Some(index);
                    }
                }
            }
        }

        for buffered_index in buffered {
            cumulative += 1.0;
            if cumulative > rank {
                return Some(buffered_index);
            }
        }

        None
    }
}

impl Store for PagedStore {
    fn add(&mut self, index: i32, weight: f64) {
        if weight == 0.0 {
            return;
        }

        if weight == 1.0 {
            self.add_single(index);
        } else {
            let page_index = self.page_index(index);
            let line_index = self.line_index(index);
            self.page_mut(page_index)[line_index] += weight;
        }
    }

    fn total_weight(&self) -> f64 {
        let paged = self.pages.iter().flatten().flat_map(|page| page.iter()).sum::<f64>();
        self.buffer.len() as f64 + paged
    }

    fn min_index(&self) -> Option<i32> {
        let buffer_min = self.buffer.iter().copied().min();
        let page_min = self.min_page_index.and_then(|min_page_index| {
            self.pages.iter().enumerate().find_map(|(offset, page)| {
                let page = page.as_ref()?;
                let line_index = page.iter().position(|weight| *weight > 0.0)?;
                Some(self.index(min_page_index + offset as i32, line_index))
            })
        });

        buffer_min.into_iter().chain(page_min).min()
    }

    fn max_index(&self) -> Option<i32> {
        let buffer_max = self.buffer.iter().copied().max();
        let Some(min_page_index) = self.min_page_index else {
            return buffer_max;
        };

        // Pages below the page holding the buffer maximum can't hold anything larger, and on that page itself only the
        // lines at or above the buffer maximum are worth looking at.
        let floor_page_index = buffer_max.map(|index| self.page_index(index));
        for (offset, page) in self.pages.iter().enumerate().rev() {
            let page_index = min_page_index + offset as i32;
            if floor_page_index.is_some_and(|floor_page_index| page_index < floor_page_index) {
                break;
            }

            let Some(page) = page else { continue };
            let first_line_index = match buffer_max {
                Some(index) if self.page_index(index) == page_index => self.line_index(index),
                _ => 0,
            };

            if let Some(line_index) = (first_line_index..page.len()).rev().find(|line_index| page[*line_index] > 0.0) {
                return Some(self.index(page_index, line_index));
            }
        }

        buffer_max
    }

    fn key_at_rank(&mut self, rank: f64) -> Result<i32, SketchError> {
        let rank = rank.max(0.0);
        match self.min_index_with_cumulative_weight(rank) {
            Some(index) => Ok(index),
            None => self.max_index().context(NotFoundSnafu),
        }
    }

    fn is_mergeable(&self, other: &Self) -> bool {
        self.page_len_log2 == other.page_len_log2
    }

    fn merge(&mut self, other: Self) -> Result<(), SketchError> {
        ensure!(
            self.is_mergeable(&other),
            NotMergeableSnafu {
                reason: "stores use different page lengths",
            }
        );

        if let Some(other_min_page_index) = other.min_page_index {
            for (offset, other_page) in other.pages.into_iter().enumerate() {
                let Some(other_page) = other_page else { continue };
                let page_index = other_min_page_index + offset as i32;
                let position = match self.position(page_index) {
                    Some(position) => position,
                    None => self.grow_page_table(page_index),
                };

                // Pages of the other store are taken over as-is when we have nothing at that position yet.
                let slot = &mut self.pages[position];
                if let Some(page) = slot.as_mut() {
                    for (weight, other_weight) in page.iter_mut().zip(other_page.iter()) {
                        *weight += other_weight;
                    }
                } else {
                    *slot = Some(other_page);
                }
            }
        }

        for index in other.buffer {
            self.add_single(index);
        }

        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.buffer.is_empty()
            && self
                .pages
                .iter()
                .flatten()
                .all(|page| page.iter().all(|weight| *weight == 0.0))
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.pages.clear();
        self.min_page_index = None;
        self.compaction_trigger_len = INITIAL_COMPACTION_TRIGGER_LEN;
    }
}

impl Default for PagedStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Rounds the required page table length up to the allocation granularity.
fn table_len_for(required: usize) -> usize {
    required.next_multiple_of(PAGE_TABLE_GROWTH)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::*;

    /// Reference rank lookup over an ordered map of weights.
    fn reference_key_at_rank(weights: &BTreeMap<i32, f64>, rank: f64) -> Option<i32> {
        let rank = rank.max(0.0);
        let mut cumulative = 0.0;
        for (index, weight) in weights {
            cumulative += weight;
            if cumulative > rank {
                return Some(*index);
            }
        }
        weights.keys().next_back().copied()
    }

    #[test]
    fn test_unit_weights_are_buffered() {
        let mut store = PagedStore::new();
        store.add(5, 1.0);
        store.add(5, 1.0);
        store.add(-7, 1.0);

        assert_eq!(store.buffered_len(), 3);
        assert_eq!(store.allocated_pages(), 0);
        assert_eq!(store.min_page_index, None);
        assert_eq!(store.total_weight(), 3.0);
        assert_eq!(store.min_index(), Some(-7));
        assert_eq!(store.max_index(), Some(5));
    }

    #[test]
    fn test_zero_weight_is_ignored() {
        let mut store = PagedStore::new();
        store.add(5, 0.0);

        assert!(store.is_empty());
        assert_eq!(store.buffered_len(), 0);
        assert_eq!(store.allocated_pages(), 0);
    }

    #[test]
    fn test_weighted_add_allocates_page() {
        let mut store = PagedStore::new();
        store.add(5, 2.5);

        assert_eq!(store.allocated_pages(), 1);
        assert_eq!(store.buffered_len(), 0);
        assert_eq!(store.total_weight(), 2.5);

        // Once the page exists, unit weights for it skip the buffer.
        store.add(6, 1.0);
        assert_eq!(store.buffered_len(), 0);
        assert_eq!(store.total_weight(), 3.5);
        assert_eq!(store.max_index(), Some(6));
    }

    #[test]
    fn test_negative_indices() {
        let mut store = PagedStore::new();
        store.add(-1000, 2.0);
        store.add(1000, 3.0);
        store.add(0, 4.0);
        store.add(-1, 1.0);

        assert_eq!(store.total_weight(), 10.0);
        assert_eq!(store.min_index(), Some(-1000));
        assert_eq!(store.max_index(), Some(1000));
        assert_eq!(store.key_at_rank(0.0), Ok(-1000));
        assert_eq!(store.key_at_rank(2.0), Ok(-1));
        assert_eq!(store.key_at_rank(3.0), Ok(0));
        assert_eq!(store.key_at_rank(7.0), Ok(1000));
    }

    #[test]
    fn test_page_table_grows_downward() {
        let mut store = PagedStore::new();
        store.add(100, 2.0);
        let first_min_page_index = store.min_page_index.unwrap();
        assert!(first_min_page_index <= 100 >> 5);
        assert_eq!(store.pages.len() % PAGE_TABLE_GROWTH, 0);

        store.add(-100_000, 3.0);
        let min_page_index = store.min_page_index.unwrap();
        assert!(min_page_index <= -100_000 >> 5);
        assert!(min_page_index < first_min_page_index);
        assert_eq!(store.pages.len() % PAGE_TABLE_GROWTH, 0);
        assert_eq!(store.allocated_pages(), 2);

        // Existing pages keep their contents after the shift.
        assert_eq!(store.key_at_rank(0.0), Ok(-100_000));
        assert_eq!(store.key_at_rank(3.0), Ok(100));
        assert_eq!(store.total_weight(), 5.0);
    }

    #[test]
    fn test_page_table_grows_upward() {
        let mut store = PagedStore::new();
        store.add(-100, 2.0);
        let min_page_index = store.min_page_index.unwrap();

        store.add(100_000, 3.0);
        assert_eq!(store.min_page_index, Some(min_page_index));
        assert_eq!(store.pages.len() % PAGE_TABLE_GROWTH, 0);
        assert_eq!(store.max_index(), Some(100_000));
        assert_eq!(store.min_index(), Some(-100));
    }

    #[test]
    fn test_extreme_indices() {
        let mut lowest = PagedStore::new();
        lowest.add(i32::MIN, 2.0);
        lowest.add(i32::MIN + 40, 1.0);

        assert_eq!(lowest.min_index(), Some(i32::MIN));
        assert_eq!(lowest.max_index(), Some(i32::MIN + 40));
        assert_eq!(lowest.key_at_rank(1.5), Ok(i32::MIN));
        assert_eq!(lowest.key_at_rank(2.0), Ok(i32::MIN + 40));

        let mut highest = PagedStore::new();
        highest.add(i32::MAX, 3.0);
        highest.add(i32::MAX, 1.0);
        highest.add(i32::MAX - 1, 2.0);

        assert_eq!(highest.min_index(), Some(i32::MAX - 1));
        assert_eq!(highest.max_index(), Some(i32::MAX));
        assert_eq!(highest.key_at_rank(1.5), Ok(i32::MAX - 1));
        assert_eq!(highest.key_at_rank(2.0), Ok(i32::MAX));
    }

    #[test]
    fn test_compaction_folds_dense_groups() {
        let mut store = PagedStore::new();
        for _ in 0..1000 {
            store.add(7, 1.0);
        }

        assert_eq!(store.allocated_pages(), 1);
        assert!(store.buffered_len() < 1000);
        assert_eq!(store.total_weight(), 1000.0);
        assert_eq!(store.key_at_rank(500.0), Ok(7));
    }

    #[test]
    fn test_compaction_keeps_scattered_entries_buffered() {
        let mut store = PagedStore::new();
        for i in 0..200 {
            store.add(i * 32, 1.0);
        }

        assert_eq!(store.allocated_pages(), 0);
        assert_eq!(store.buffered_len(), 200);
        assert_eq!(store.total_weight(), 200.0);
        assert_eq!(store.key_at_rank(10.0), Ok(320));
    }

    #[test]
    fn test_compaction_resets_trigger() {
        let mut store = PagedStore::new();
        for i in 0..64 {
            store.add(i % 4, 1.0);
        }
        store.compact();

        assert_eq!(store.buffered_len(), 0);
        assert_eq!(store.compaction_trigger_len, store.page_len());
        assert_eq!(store.total_weight(), 64.0);
    }

    #[test]
    fn test_compaction_reuses_buffer_allocation() {
        // Eight slots per page, so a group of sixteen buffered entries is worth a page.
        let mut store = PagedStore::with_page_len_log2(3).unwrap();
        for _ in 0..20 {
            store.add(3, 1.0);
        }
        for _ in 0..5 {
            store.add(-50, 1.0);
        }
        for i in 0..10 {
            store.add(100 + i * 8, 1.0);
        }

        let buffer_ptr = store.buffer.as_ptr();
        let buffer_capacity = store.buffer.capacity();
        store.compact();

        assert_eq!(store.buffer.as_ptr(), buffer_ptr);
        assert_eq!(store.buffer.capacity(), buffer_capacity);
        assert_eq!(store.allocated_pages(), 1);
        assert_eq!(store.buffered_len(), 15);
        assert_eq!(&store.buffer[..5], &[-50; 5]);
        assert_eq!(&store.buffer[5..], &(0..10).map(|i| 100 + i * 8).collect::<Vec<_>>()[..]);
        assert_eq!(store.compaction_trigger_len, 15 + store.page_len());

        assert_eq!(store.total_weight(), 35.0);
        assert_eq!(store.key_at_rank(4.0), Ok(-50));
        assert_eq!(store.key_at_rank(5.0), Ok(3));
        assert_eq!(store.key_at_rank(25.0), Ok(100));
    }

    #[test]
    fn test_key_at_rank_interleaves_buffer_and_pages() {
        let mut store = PagedStore::new();
        store.add(3, 1.0);
        store.add(5, 1.0);
        store.add(40, 1.0);
        // Allocates page 0 after 3 and 5 were buffered, so they stay in the buffer.
        store.add(5, 3.0);

        assert_eq!(store.buffered_len(), 3);
        assert_eq!(store.key_at_rank(-3.0), Ok(3));
        assert_eq!(store.key_at_rank(0.0), Ok(3));
        assert_eq!(store.key_at_rank(1.0), Ok(5));
        assert_eq!(store.key_at_rank(4.5), Ok(5));
        assert_eq!(store.key_at_rank(5.0), Ok(40));
        assert_eq!(store.key_at_rank(6.0), Ok(40));
        assert_eq!(store.key_at_rank(1e9), Ok(40));
    }

    #[test]
    fn test_key_at_rank_just_below_total_matches_fallback() {
        let mut store = PagedStore::new();
        store.add(10, 1.0);
        store.add(2, 2.0);
        store.add(-64, 1.0);
        store.add(1 << 20, 0.25);

        let total = store.total_weight();
        let max_index = store.max_index().unwrap();
        assert_eq!(max_index, 1 << 20);
        assert_eq!(store.key_at_rank(total - 1e-9), Ok(max_index));
        assert_eq!(store.key_at_rank(total), Ok(max_index));

        let mut fractional = PagedStore::new();
        fractional.add(3, 0.25);
        fractional.add(9, 0.5);
        let total = fractional.total_weight();
        assert_eq!(fractional.key_at_rank(total - 1e-9), Ok(9));
        assert_eq!(fractional.key_at_rank(total), Ok(9));
    }

    #[test]
    fn test_max_index_on_page_holding_buffer_max() {
        let mut store = PagedStore::new();
        store.add(10, 1.0);
        store.add(2, 2.0);

        // Page 0 holds index 2, and index 10 is buffered on that same page.
        assert_eq!(store.buffered_len(), 1);
        assert_eq!(store.max_index(), Some(10));

        store.add(30, 2.0);
        assert_eq!(store.max_index(), Some(30));
        assert_eq!(store.min_index(), Some(2));
    }

    #[test]
    fn test_key_at_rank_empty_store() {
        let mut store = PagedStore::new();
        assert_eq!(store.key_at_rank(0.0), Err(SketchError::NotFound));

        store.add(5, 2.0);
        store.add(6, 1.0);
        store.clear();

        assert!(store.is_empty());
        assert_eq!(store.total_weight(), 0.0);
        assert_eq!(store.key_at_rank(0.0), Err(SketchError::NotFound));
        assert_eq!(store.min_index(), None);
        assert_eq!(store.max_index(), None);
    }

    #[test]
    fn test_invalid_page_len() {
        for page_len_log2 in [0, 17, 31] {
            assert!(matches!(
                PagedStore::with_page_len_log2(page_len_log2),
                Err(SketchError::InvalidParameter { name: "page_len_log2", .. })
            ));
        }

        let store = PagedStore::with_page_len_log2(3).unwrap();
        assert_eq!(store.page_len(), 8);
    }

    #[test]
    fn test_merge() {
        let mut left = PagedStore::new();
        left.add(5, 2.0);
        left.add(500, 1.0);

        let mut right = PagedStore::new();
        right.add(5, 1.0);
        right.add(-300, 3.0);
        right.add(1000, 4.0);
        right.add(77, 1.0);
        right.add(78, 1.0);

        let expected = left.total_weight() + right.total_weight();
        left.merge(right).unwrap();

        assert_eq!(left.total_weight(), expected);
        assert_eq!(left.min_index(), Some(-300));
        assert_eq!(left.max_index(), Some(1000));
        assert_eq!(left.key_at_rank(3.0), Ok(5));
        assert_eq!(left.key_at_rank(5.0), Ok(5));
        assert_eq!(left.key_at_rank(6.0), Ok(77));
    }

    #[test]
    fn test_merge_buffer_only_store() {
        let mut left = PagedStore::new();
        left.add(1, 4.0);
        left.add(2, 4.0);
        left.add(40, 4.0);

        // No pages at all on the right, only buffered entries; each must land exactly once.
        let mut right = PagedStore::new();
        right.add(9, 1.0);
        right.add(100, 1.0);

        left.merge(right).unwrap();
        assert_eq!(left.total_weight(), 14.0);
        assert_eq!(left.max_index(), Some(100));
    }

    #[test]
    fn test_merge_into_empty_store() {
        let mut left = PagedStore::new();

        let mut right = PagedStore::new();
        right.add(-5, 2.0);
        right.add(3, 1.0);

        left.merge(right).unwrap();
        assert_eq!(left.total_weight(), 3.0);
        assert_eq!(left.key_at_rank(0.0), Ok(-5));
        assert_eq!(left.key_at_rank(2.0), Ok(3));
    }

    #[test]
    fn test_merge_mismatched_page_len() {
        let mut left = PagedStore::new();
        left.add(5, 2.0);

        let mut right = PagedStore::with_page_len_log2(4).unwrap();
        right.add(5, 2.0);

        assert!(!left.is_mergeable(&right));
        assert!(matches!(left.merge(right), Err(SketchError::NotMergeable { .. })));
        assert_eq!(left.total_weight(), 2.0);
    }

    fn arb_entries() -> impl Strategy<Value = Vec<(i32, f64)>> {
        let index = prop_oneof![-5000i32..5000, 0i32..40, -200i32..-150];
        let weight = prop_oneof![Just(1.0), Just(1.0), Just(2.0), Just(0.5)];
        prop::collection::vec((index, weight), 0..600)
    }

    fn check_against_reference(store: &mut PagedStore, reference: &BTreeMap<i32, f64>) -> Result<(), TestCaseError> {
        let total = reference.values().sum::<f64>();
        prop_assert_eq!(store.total_weight(), total);
        prop_assert_eq!(store.min_index(), reference.keys().next().copied());
        prop_assert_eq!(store.max_index(), reference.keys().next_back().copied());

        for rank in [0.0, total * 0.25, total * 0.5, total - 1.0, total - 1e-9, total, total + 5.0] {
            prop_assert_eq!(store.key_at_rank(rank).ok(), reference_key_at_rank(reference, rank));
        }
        Ok(())
    }

    proptest! {
        #[test]
        fn property_test_matches_reference(entries in arb_entries()) {
            let mut store = PagedStore::new();
            let mut reference = BTreeMap::new();
            for (index, weight) in entries {
                store.add(index, weight);
                *reference.entry(index).or_insert(0.0) += weight;
            }

            check_against_reference(&mut store, &reference)?;
        }

        #[test]
        fn property_test_merge_matches_reference(left in arb_entries(), right in arb_entries()) {
            let mut reference = BTreeMap::new();
            let mut left_store = PagedStore::new();
            for (index, weight) in left {
                left_store.add(index, weight);
                *reference.entry(index).or_insert(0.0) += weight;
            }

            let mut right_store = PagedStore::new();
            for (index, weight) in right {
                right_store.add(index, weight);
                *reference.entry(index).or_insert(0.0) += weight;
            }

            prop_assert!(left_store.merge(right_store).is_ok());
            check_against_reference(&mut left_store, &reference)?;
        }
    }
}
