use std::borrow::Borrow;
use std::cmp::Ordering;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::key::{Key, Pos};
use crate::search::{OptimalSearch, Search};
use crate::segment::Segment;

/// A stored key with its position and a tombstone flag. Erased items stay
/// in place as tombstones until their segment is next re-segmented.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DataItem<K, P> {
    key: K,
    pos: P,
    deleted: bool,
}

impl<K: Key, P: Pos> DataItem<K, P> {
    pub(crate) fn new(key: K, pos: P) -> Self {
        Self {
            key,
            pos,
            deleted: false,
        }
    }

    pub fn key(&self) -> K {
        self.key
    }

    pub fn pos(&self) -> P {
        self.pos
    }

    pub fn deleted(&self) -> bool {
        self.deleted
    }

    pub(crate) fn set_deleted(&mut self) {
        self.deleted = true;
    }
}

impl<K, P> Borrow<K> for DataItem<K, P> {
    fn borrow(&self) -> &K {
        &self.key
    }
}

/// A linear piece that absorbs point insertions into a bounded sorted
/// buffer until re-segmentation.
///
/// `keys` holds the items the segment covered at its last
/// (re)segmentation; `buffer` holds up to `B` items inserted since. A key
/// never has a live copy in both at once.
pub struct BufferedSegment<K, P, const B: usize> {
    segment: Segment<K>,
    pub(crate) keys: Vec<DataItem<K, P>>,
    pub(crate) buffer: Vec<DataItem<K, P>>,
}

impl<K: Key, P: Pos, const B: usize> BufferedSegment<K, P, B> {
    pub(crate) fn new(segment: Segment<K>, keys: Vec<DataItem<K, P>>) -> Self {
        Self {
            segment,
            keys,
            buffer: Vec::new(),
        }
    }

    pub fn start_key(&self) -> K {
        self.segment.start_key()
    }

    pub fn segment(&self) -> &Segment<K> {
        &self.segment
    }

    /// Count of live items, materialized and buffered.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Index into `keys` of the item matching `key`, probing only the
    /// `error`-wide window around the predicted offset. The caller checks
    /// the tombstone flag.
    pub(crate) fn find_key(&self, key: &K, error: u64) -> Option<usize> {
        let predicted = self.segment.offset(key) as usize;
        let lo = predicted.saturating_sub(error as usize).min(self.keys.len());
        let hi = (predicted + error as usize + 1).min(self.keys.len());

        OptimalSearch::search_by_key(&self.keys[lo..hi], key)
            .ok()
            .map(|i| i + lo)
    }

    /// Index into `buffer` of the item matching `key`, tombstoned or not.
    pub(crate) fn find_buffer(&self, key: &K) -> Option<usize> {
        OptimalSearch::search_by_key(&self.buffer, key).ok()
    }

    /// Accept `(key, pos)` into the buffer. `false` means the buffer is
    /// full and the segment must be re-segmented. Inserting a key that
    /// already has a live copy is a no-op; re-inserting an erased buffered
    /// key revives its slot.
    pub(crate) fn insert_buffer(&mut self, key: K, pos: P) -> bool {
        if self.buffer.len() >= B {
            return false;
        }

        match OptimalSearch::search_by_key(&self.buffer, &key) {
            Ok(slot) => {
                if self.buffer[slot].deleted() {
                    self.buffer[slot] = DataItem::new(key, pos);
                }
                true
            }
            Err(slot) => {
                if let Ok(i) = OptimalSearch::search_by_key(&self.keys, &key) {
                    if !self.keys[i].deleted() {
                        return true;
                    }
                }
                self.buffer.insert(slot, DataItem::new(key, pos));
                true
            }
        }
    }

    /// Flush the live items plus the pending `(new_key, new_pos)` into one
    /// sorted list, ready to be re-segmented. Tombstones are dropped here
    /// and nowhere else.
    pub(crate) fn merge_with(&self, new_key: K, new_pos: P) -> Vec<(K, P)> {
        let mut merged = Vec::with_capacity(self.keys.len() + self.buffer.len() + 1);
        let mut pending = true;

        for item in self.iter() {
            if pending && new_key.order(&item.key()) == Ordering::Less {
                merged.push((new_key, new_pos));
                pending = false;
            }
            merged.push((item.key(), item.pos()));
        }
        if pending {
            merged.push((new_key, new_pos));
        }

        merged
    }

    /// Live items from `keys` and `buffer` merged in ascending key order.
    pub fn iter(&self) -> MergedIter<'_, K, P, B> {
        self.iter_from(0, 0)
    }

    pub(crate) fn iter_from(&self, key_idx: usize, buf_idx: usize) -> MergedIter<'_, K, P, B> {
        MergedIter {
            segment: self,
            key_idx,
            buf_idx,
        }
    }
}

impl<K: Key, P: Pos, const B: usize> Borrow<K> for BufferedSegment<K, P, B> {
    fn borrow(&self) -> &K {
        self.segment.borrow()
    }
}

/// Two-way merge cursor over a segment's materialized items and its
/// buffer, skipping tombstones on both sides. A key never has a live copy
/// in both, so ties cannot occur.
pub struct MergedIter<'a, K, P, const B: usize> {
    segment: &'a BufferedSegment<K, P, B>,
    key_idx: usize,
    buf_idx: usize,
}

impl<'a, K: Key, P: Pos, const B: usize> Iterator for MergedIter<'a, K, P, B> {
    type Item = &'a DataItem<K, P>;

    fn next(&mut self) -> Option<Self::Item> {
        let keys = &self.segment.keys;
        let buffer = &self.segment.buffer;

        while self.key_idx < keys.len() && keys[self.key_idx].deleted() {
            self.key_idx += 1;
        }
        while self.buf_idx < buffer.len() && buffer[self.buf_idx].deleted() {
            self.buf_idx += 1;
        }

        match (keys.get(self.key_idx), buffer.get(self.buf_idx)) {
            (None, None) => None,
            (Some(item), None) => {
                self.key_idx += 1;
                Some(item)
            }
            (None, Some(item)) => {
                self.buf_idx += 1;
                Some(item)
            }
            (Some(from_keys), Some(from_buffer)) => {
                if from_keys.key().order(&from_buffer.key()) == Ordering::Greater {
                    self.buf_idx += 1;
                    Some(from_buffer)
                } else {
                    self.key_idx += 1;
                    Some(from_keys)
                }
            }
        }
    }
}

#[cfg(test)]
mod buffered_segment_tests {
    use super::*;

    const B: usize = 4;

    fn materialized(keys: &[u64]) -> BufferedSegment<u64, u64, B> {
        let items = keys
            .iter()
            .enumerate()
            .map(|(i, &k)| DataItem::new(k, i as u64))
            .collect();
        BufferedSegment::new(Segment::new(keys[0], 0, *keys.last().unwrap(), 1.0), items)
    }

    #[test]
    fn buffer_rejects_when_full() {
        let mut segment = materialized(&[0, 100]);
        for k in 1..=B as u64 {
            assert!(segment.insert_buffer(k, k));
        }
        assert!(!segment.insert_buffer(50, 50));
        assert_eq!(segment.buffer_len(), B);
    }

    #[test]
    fn buffer_insert_is_idempotent() {
        let mut segment = materialized(&[0, 10, 20]);
        assert!(segment.insert_buffer(5, 5));
        assert!(segment.insert_buffer(5, 99));
        assert_eq!(segment.buffer_len(), 1);
        assert_eq!(segment.buffer[0].pos(), 5);

        // A live materialized copy also makes the insert a no-op.
        assert!(segment.insert_buffer(10, 42));
        assert_eq!(segment.buffer_len(), 1);
    }

    #[test]
    fn erased_buffer_slot_is_revived() {
        let mut segment = materialized(&[0, 100]);
        assert!(segment.insert_buffer(5, 5));
        segment.buffer[0].set_deleted();

        assert!(segment.insert_buffer(5, 7));
        assert_eq!(segment.buffer_len(), 1);
        assert!(!segment.buffer[0].deleted());
        assert_eq!(segment.buffer[0].pos(), 7);
    }

    #[test]
    fn merged_iteration_skips_tombstones() {
        let mut segment = materialized(&[0, 10, 20, 30]);
        segment.insert_buffer(5, 105);
        segment.insert_buffer(25, 125);
        segment.keys[1].set_deleted();

        let keys: Vec<u64> = segment.iter().map(|item| item.key()).collect();
        assert_eq!(keys, vec![0, 5, 20, 25, 30]);
        assert_eq!(segment.len(), 5);
    }

    #[test]
    fn merge_places_new_key_in_order() {
        let mut segment = materialized(&[0, 10, 20]);
        segment.insert_buffer(15, 115);
        segment.keys[0].set_deleted();

        let merged = segment.merge_with(12, 112);
        let keys: Vec<u64> = merged.iter().map(|&(k, _)| k).collect();
        assert_eq!(keys, vec![10, 12, 15, 20]);
    }

    #[test]
    fn merge_appends_largest_new_key() {
        let segment = materialized(&[0, 10]);
        let merged = segment.merge_with(99, 199);
        assert_eq!(merged.last(), Some(&(99, 199)));
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn windowed_probe_finds_materialized_keys() {
        let keys: Vec<u64> = (0..1000).map(|i| i * 3).collect();
        let segment = {
            let items = keys
                .iter()
                .enumerate()
                .map(|(i, &k)| DataItem::new(k, i as u64))
                .collect();
            BufferedSegment::<u64, u64, B>::new(Segment::new(0, 0, 2997, 1.0 / 3.0), items)
        };

        for (i, key) in keys.iter().enumerate() {
            assert_eq!(segment.find_key(key, 8), Some(i));
        }
        assert_eq!(segment.find_key(&4, 8), None);
    }
}
