use std::cmp::Ordering;
use std::marker::PhantomData;

use tracing::debug;

use crate::directory::{Directory, SortedDirectory};
use crate::error::{IndexError, Result};
use crate::key::{first_unsorted, Key, Pos};
use crate::search::{OptimalSearch, Search};
use crate::segment::Segment;
use crate::segmentation::segment_points;

use super::segment::{BufferedSegment, DataItem, MergedIter};

/// Where a located item lives inside its segment.
enum Slot {
    Keys(usize),
    Buffer(usize),
}

/// Updatable learned index. The total error budget `EPSILON` is split into
/// a segmentation budget `EPSILON - BUFFER` and a per-segment insertion
/// buffer of `BUFFER` slots, so a point query still resolves within
/// `EPSILON` positions after any run of inserts. When a buffer overflows,
/// only that segment is re-segmented and spliced back into the directory.
pub struct BufferedFitingTree<
    K,
    P,
    const EPSILON: usize = 64,
    const BUFFER: usize = 32,
    D = SortedDirectory<K, BufferedSegment<K, P, BUFFER>>,
> where
    K: Key,
    P: Pos,
    D: Directory<K, BufferedSegment<K, P, BUFFER>>,
{
    n: usize,
    first_key: Option<K>,
    directory: D,
    _pos: PhantomData<P>,
}

impl<K, P, const EPSILON: usize, const BUFFER: usize, D>
    BufferedFitingTree<K, P, EPSILON, BUFFER, D>
where
    K: Key,
    P: Pos,
    D: Directory<K, BufferedSegment<K, P, BUFFER>>,
{
    /// Half-width of the guaranteed position window.
    pub const ERROR: usize = EPSILON;

    /// Per-segment insertion buffer capacity.
    pub const BUFFER_CAPACITY: usize = BUFFER;

    /// Builds the index over `data`, which must be sorted in non-decreasing
    /// order. Positions are the ranks of the keys in `data`.
    pub fn new(data: &[K]) -> Result<Self> {
        if EPSILON == 0 {
            return Err(IndexError::InvalidConfig("error bound must be positive"));
        }
        if BUFFER == 0 {
            return Err(IndexError::InvalidConfig(
                "buffer capacity must be positive",
            ));
        }
        if EPSILON <= BUFFER {
            return Err(IndexError::InvalidConfig(
                "error bound must exceed buffer capacity",
            ));
        }
        if let Some(index) = first_unsorted(data) {
            return Err(IndexError::UnsortedInput { index });
        }
        // Bulk-loaded positions are ranks; the largest one must fit `P`.
        if !data.is_empty() && num::cast::<usize, P>(data.len() - 1).is_none() {
            return Err(IndexError::InvalidConfig(
                "position type too narrow for the input length",
            ));
        }

        let mut segments: Vec<BufferedSegment<K, P, BUFFER>> = Vec::new();
        let mut live = 0;
        segment_points(
            data.len(),
            (EPSILON - BUFFER) as u64,
            |i| (data[i], i as u64),
            |segment, range| {
                let items = materialize(data, range);
                live += items.len();
                segments.push(BufferedSegment::new(segment, items));
            },
        );
        debug!(
            keys = live,
            segments = segments.len(),
            "built buffered segmentation"
        );

        Ok(Self {
            n: live,
            first_key: data.first().copied(),
            directory: D::bulk_load(segments),
            _pos: PhantomData,
        })
    }

    fn locate(&self, key: &K) -> Option<(usize, Slot)> {
        if self.n == 0 {
            return None;
        }
        // A key below every segment can only live in the leftmost buffer,
        // where insert routes it.
        let rank = self.directory.predecessor(key).unwrap_or(0);
        let segment = self.directory.get(rank).expect("predecessor rank valid");

        if let Some(i) = segment.find_key(key, EPSILON as u64) {
            if !segment.keys[i].deleted() {
                return Some((rank, Slot::Keys(i)));
            }
            // Tombstoned here; a live copy may have been re-inserted into
            // the buffer since.
        }
        if let Some(i) = segment.find_buffer(key) {
            if !segment.buffer[i].deleted() {
                return Some((rank, Slot::Buffer(i)));
            }
        }
        None
    }

    /// The live item stored under `key`, if any.
    pub fn find(&self, key: &K) -> Option<&DataItem<K, P>> {
        let (rank, slot) = self.locate(key)?;
        let segment = self.directory.get(rank).expect("located rank valid");
        Some(match slot {
            Slot::Keys(i) => &segment.keys[i],
            Slot::Buffer(i) => &segment.buffer[i],
        })
    }

    /// Iterator over live items starting at the first key `>= key`.
    pub fn lower_bound(&self, key: &K) -> Iter<'_, K, P, EPSILON, BUFFER, D> {
        // Below every segment the leftmost one still applies: its buffer may
        // hold keys smaller than its start key.
        let rank = self.directory.predecessor(key).unwrap_or(0);
        let segment = match self.directory.get(rank) {
            Some(segment) => segment,
            None => return self.iter(),
        };

        let key_idx = match OptimalSearch::search_by_key(&segment.keys, key) {
            Ok(i) => i,
            Err(i) => i,
        };
        let buf_idx = match OptimalSearch::search_by_key(&segment.buffer, key) {
            Ok(i) => i,
            Err(i) => i,
        };

        Iter {
            tree: self,
            rank,
            cursor: Some(segment.iter_from(key_idx, buf_idx)),
        }
    }

    /// Insert a key with its position. Inserting a key that is already
    /// present leaves the stored item unchanged.
    pub fn insert(&mut self, key: K, pos: P) {
        if self.directory.is_empty() {
            // First ever key: materialize a fresh single-point segment.
            let segment = Segment::new(key, 0, key, 1.0);
            self.directory
                .insert(BufferedSegment::new(segment, vec![DataItem::new(key, pos)]));
            self.n = 1;
            self.first_key = Some(key);
            return;
        }

        if self.find(&key).is_some() {
            return;
        }

        // A key below every segment lands in the leftmost one.
        let rank = self.directory.predecessor(&key).unwrap_or(0);

        let accepted = {
            let segment = self.directory.get_mut(rank).expect("rank valid");
            segment.insert_buffer(key, pos)
        };
        if accepted {
            self.note_inserted(key);
            return;
        }

        // Buffer overflow: re-segment just this piece and splice the
        // replacements into the directory.
        let (old_start, merged) = {
            let segment = self.directory.get(rank).expect("rank valid");
            (segment.start_key(), segment.merge_with(key, pos))
        };

        // The segmenter is fed the merged ranks, not the stored positions:
        // the probe window of `find` is an index window into `keys`, so the
        // fitted line must track ranks. Stored positions are payload.
        let mut replacements: Vec<BufferedSegment<K, P, BUFFER>> = Vec::new();
        segment_points(
            merged.len(),
            (EPSILON - BUFFER) as u64,
            |i| (merged[i].0, i as u64),
            |segment, range| {
                let items = merged[range].iter().map(|&(k, p)| DataItem::new(k, p)).collect();
                replacements.push(BufferedSegment::new(segment, items));
            },
        );
        debug!(
            start_key = ?old_start,
            merged = merged.len(),
            replacements = replacements.len(),
            "re-segmented overflowing segment"
        );

        self.directory.remove(&old_start);
        for replacement in replacements {
            self.directory.insert(replacement);
        }
        self.note_inserted(key);
    }

    /// Erase a key by tombstoning its item; erasing an absent key is a
    /// no-op. The slot is reclaimed at the segment's next re-segmentation.
    pub fn erase(&mut self, key: &K) {
        if let Some((rank, slot)) = self.locate(key) {
            let segment = self.directory.get_mut(rank).expect("located rank valid");
            match slot {
                Slot::Keys(i) => segment.keys[i].set_deleted(),
                Slot::Buffer(i) => segment.buffer[i].set_deleted(),
            }
            self.n -= 1;
        }
    }

    /// Iterator over all live items in ascending key order.
    pub fn iter(&self) -> Iter<'_, K, P, EPSILON, BUFFER, D> {
        Iter {
            tree: self,
            rank: 0,
            cursor: self.directory.get(0).map(|segment| segment.iter()),
        }
    }

    /// Live items with keys in `low..=high`.
    pub fn range<'a>(
        &'a self,
        low: &K,
        high: &K,
    ) -> impl Iterator<Item = &'a DataItem<K, P>> + 'a {
        let high = *high;
        self.lower_bound(low)
            .take_while(move |item| item.key().order(&high) != Ordering::Greater)
    }

    fn note_inserted(&mut self, key: K) {
        self.n += 1;
        let smaller = self
            .first_key
            .map_or(true, |first| key.order(&first) == Ordering::Less);
        if smaller {
            self.first_key = Some(key);
        }
    }

    /// Count of live keys.
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Number of linear pieces in the directory.
    pub fn segment_count(&self) -> usize {
        self.directory.len()
    }

    /// The smallest key ever indexed, if any.
    pub fn first_key(&self) -> Option<K> {
        self.first_key
    }
}

/// Materialized items for one emitted segment: the covered slice of `data`
/// with ranks as positions, consecutive duplicates collapsed onto their
/// first occurrence. Construction has already checked that every rank fits
/// `P`.
fn materialize<K: Key, P: Pos>(data: &[K], range: std::ops::Range<usize>) -> Vec<DataItem<K, P>> {
    let mut items = Vec::with_capacity(range.len());
    for i in range {
        if i > 0 && data[i].order(&data[i - 1]) == Ordering::Equal {
            continue;
        }
        items.push(DataItem::new(
            data[i],
            num::cast(i).expect("rank checked to fit the position type"),
        ));
    }
    items
}

/// Forward iterator over a buffered tree: walks segments in ascending
/// start-key order, merging each segment's materialized items with its
/// buffer and skipping tombstones. Borrows the tree, so mutations cannot
/// overlap iteration.
pub struct Iter<'a, K, P, const EPSILON: usize, const BUFFER: usize, D>
where
    K: Key,
    P: Pos,
    D: Directory<K, BufferedSegment<K, P, BUFFER>>,
{
    tree: &'a BufferedFitingTree<K, P, EPSILON, BUFFER, D>,
    rank: usize,
    cursor: Option<MergedIter<'a, K, P, BUFFER>>,
}

impl<'a, K, P, const EPSILON: usize, const BUFFER: usize, D> Iterator
    for Iter<'a, K, P, EPSILON, BUFFER, D>
where
    K: Key,
    P: Pos,
    D: Directory<K, BufferedSegment<K, P, BUFFER>>,
{
    type Item = &'a DataItem<K, P>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let cursor = self.cursor.as_mut()?;
            if let Some(item) = cursor.next() {
                return Some(item);
            }

            self.rank += 1;
            self.cursor = self
                .tree
                .directory
                .get(self.rank)
                .map(|segment| segment.iter());
        }
    }
}
