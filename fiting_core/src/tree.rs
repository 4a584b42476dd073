//! The read-only index: segments sorted data once, bulk-loads the
//! directory, and answers bounded-range position queries.

use tracing::debug;

use crate::directory::{Directory, SortedDirectory};
use crate::error::{IndexError, Result};
use crate::key::{first_unsorted, Key};
use crate::search::{OptimalSearch, Search};
use crate::segment::{ApproxPos, Segment};
use crate::segmentation::segment_points;

/// Learned index over an immutable sorted slice. `EPSILON` bounds how far a
/// predicted position may sit from the true one, so every query resolves to
/// a window of at most `2 * EPSILON + 1` candidate positions.
///
/// The tree stores only the segments, not the data; callers keep the slice
/// and run the final narrow search themselves (or through
/// [`search`](Self::search)).
pub struct FitingTree<K, const EPSILON: usize = 64, D = SortedDirectory<K, Segment<K>>>
where
    K: Key,
    D: Directory<K, Segment<K>>,
{
    n: usize,
    first_key: Option<K>,
    directory: D,
}

impl<K, const EPSILON: usize, D> FitingTree<K, EPSILON, D>
where
    K: Key,
    D: Directory<K, Segment<K>>,
{
    /// Builds the index over `data`, which must be sorted in non-decreasing
    /// order.
    pub fn new(data: &[K]) -> Result<Self> {
        if EPSILON == 0 {
            return Err(IndexError::InvalidConfig("error bound must be positive"));
        }
        if let Some(index) = first_unsorted(data) {
            return Err(IndexError::UnsortedInput { index });
        }

        let n = data.len();
        let mut segments = Vec::new();
        segment_points(
            n,
            EPSILON as u64,
            |i| (data[i], i as u64),
            |segment, _| segments.push(segment),
        );
        debug!(keys = n, segments = segments.len(), "built segmentation");

        Ok(Self {
            n,
            first_key: data.first().copied(),
            directory: D::bulk_load(segments),
        })
    }

    /// Bounded position window for `key`: if the key is present in the
    /// indexed data, its true index lies in `lo..=hi` (with `hi` clamped to
    /// the data length).
    pub fn approx_pos(&self, key: &K) -> ApproxPos {
        if self.n == 0 {
            return ApproxPos {
                pos: 0,
                lo: 0,
                hi: 0,
            };
        }

        let rank = match self.directory.predecessor(key) {
            Some(rank) => rank,
            // Below the smallest indexed key.
            None => {
                return ApproxPos {
                    pos: 0,
                    lo: 0,
                    hi: EPSILON.min(self.n),
                }
            }
        };
        let segment = self.directory.get(rank).expect("predecessor rank valid");

        let predicted = segment.predict(key);
        if predicted > (self.n + EPSILON) as u64 {
            // Beyond the indexed region.
            return ApproxPos {
                pos: self.n - 1,
                lo: self.n - 1,
                hi: self.n,
            };
        }

        let pos = predicted as usize;
        ApproxPos {
            pos,
            lo: pos.saturating_sub(EPSILON),
            hi: (pos + EPSILON).min(self.n),
        }
    }

    /// Resolves `key` to its exact index in `data`, the slice this index
    /// was built over.
    pub fn search(&self, data: &[K], key: &K) -> Option<usize> {
        let approx = self.approx_pos(key);
        let hi = (approx.hi + 1).min(data.len());
        OptimalSearch::search_by_key(&data[approx.lo..hi], key)
            .ok()
            .map(|i| i + approx.lo)
    }

    /// Number of linear pieces covering the data.
    pub fn segment_count(&self) -> usize {
        self.directory.len()
    }

    /// Emitted segments in ascending start-key order.
    pub fn segments(&self) -> impl Iterator<Item = &Segment<K>> {
        (0..self.directory.len()).filter_map(|rank| self.directory.get(rank))
    }

    pub fn first_key(&self) -> Option<K> {
        self.first_key
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }
}
