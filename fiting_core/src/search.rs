//! Slice search strategies shared by the directory and the per-segment
//! probes. Keys are only `PartialOrd` (floats are allowed), so everything
//! routes through [`Key::order`].

use std::borrow::Borrow;
use std::cmp::Ordering;

use crate::key::Key;

/// Some algorithm for searching a sorted slice, e.g. Binary or Linear
pub trait Search {
    /// Looks up `x` in a slice sorted by the borrowed key, assumed free of
    /// duplicates. `Ok(index)` points at a match; `Err(index)` is where
    /// `x` would have to be inserted to keep the slice sorted.
    fn search_by_key<K: Key, T: Borrow<K>>(slice: &[T], x: &K) -> Result<usize, usize>;
}

/// Performs a binary search on a slice, with computational complexity `O(log n)`
/// However, for small searches, a linear search may be faster.
pub struct BinarySearch;

impl Search for BinarySearch {
    fn search_by_key<K: Key, T: Borrow<K>>(slice: &[T], x: &K) -> Result<usize, usize> {
        slice.binary_search_by(|item| item.borrow().order(x))
    }
}

/// Performs a simple linear search on a slice, with computational complexity `O(n)`
pub struct LinearSearch;

impl Search for LinearSearch {
    fn search_by_key<K: Key, T: Borrow<K>>(slice: &[T], x: &K) -> Result<usize, usize> {
        let mut index = 0;
        let size = slice.len();

        while index < size
            && unsafe { slice.get_unchecked(index).borrow() }.order(x) == Ordering::Less
        {
            index += 1;
        }

        if index >= size {
            Err(size)
        } else if unsafe { slice.get_unchecked(index).borrow() }.order(x) == Ordering::Equal {
            Ok(index)
        } else {
            Err(index)
        }
    }
}

/// If a slice has less than `LINEAR_SEARCH_THRESHOLD` bytes, use a linear search
const LINEAR_SEARCH_THRESHOLD: usize = 8 * 64;

/// Decides whether to use a linear or binary search based on some experimentally determined
/// threshold on the size of the given slice.
pub struct OptimalSearch;

impl Search for OptimalSearch {
    fn search_by_key<K: Key, T: Borrow<K>>(slice: &[T], x: &K) -> Result<usize, usize> {
        if slice.len() * std::mem::size_of::<T>() > LINEAR_SEARCH_THRESHOLD {
            BinarySearch::search_by_key(slice, x)
        } else {
            LinearSearch::search_by_key(slice, x)
        }
    }
}
