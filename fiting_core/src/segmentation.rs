//! Streaming shrinking-cone segmentation.
//!
//! Points arrive in key order; the active segment keeps a "cone" of
//! feasible slopes through its anchor point. Every new point narrows the
//! cone with its `±error` band, and the segment closes the moment a point's
//! own slope falls outside the cone. Slopes are kept as exact rational
//! pairs in the key's widened signed domain, so the accept/reject decision
//! never suffers floating round-off; only the final emitted slope (the cone
//! midpoint) is floating.

use std::cmp::Ordering;
use std::ops::Range;

use crate::key::{Key, WideSigned};
use crate::segment::Segment;

/// Exact rational slope kept as a `(dx, dy)` pair in the widened domain.
#[derive(Debug, Clone, Copy)]
struct Slope<W> {
    dx: W,
    dy: W,
}

impl<W: WideSigned> Slope<W> {
    fn flat() -> Self {
        Slope {
            dx: W::from_offset(1),
            dy: W::from_offset(0),
        }
    }

    fn vertical() -> Self {
        Slope {
            dx: W::from_offset(0),
            dy: W::from_offset(1),
        }
    }

    fn cmp(&self, other: &Self) -> Ordering {
        W::cross_cmp(self.dy, self.dx, other.dy, other.dx)
    }

    fn to_f64(self) -> f64 {
        self.dy.to_f64() / self.dx.to_f64()
    }
}

#[derive(Debug, Clone, Copy)]
struct Point<W> {
    x: W,
    y: W,
}

impl<W: WideSigned> Point<W> {
    fn slope_from(&self, anchor: &Point<W>) -> Slope<W> {
        Slope {
            dx: self.x - anchor.x,
            dy: self.y - anchor.y,
        }
    }
}

/// Streaming builder for one segment at a time.
pub struct ShrinkingCone<K: Key> {
    error: i64,
    first: Option<(K, u64)>,
    last_key: Option<K>,
    lower: Slope<K::Wide>,
    upper: Slope<K::Wide>,
    points: usize,
}

impl<K: Key> ShrinkingCone<K> {
    /// # Panics
    ///
    /// Panics if `error` is zero; a zero-width band admits no second point.
    pub fn new(error: u64) -> Self {
        assert!(error > 0, "error bound must be positive");

        Self {
            error: error as i64,
            first: None,
            last_key: None,
            lower: Slope::flat(),
            upper: Slope::vertical(),
            points: 0,
        }
    }

    fn anchor(&self) -> Point<K::Wide> {
        let (key, pos) = self.first.expect("anchor read before any point");
        Point {
            x: key.widen(),
            y: K::Wide::from_offset(pos as i64),
        }
    }

    /// Offer the next point in key order. Returns `false` when the cone
    /// cannot admit it while keeping every accepted point within `error`;
    /// the caller must then emit the segment and re-offer the same point.
    pub fn add(&mut self, key: K, pos: u64) -> bool {
        if self.points == 0 {
            self.first = Some((key, pos));
            self.last_key = Some(key);
            self.lower = Slope::flat();
            self.upper = Slope::vertical();
            self.points = 1;
            return true;
        }

        let y = pos as i64;
        let anchor = self.anchor();
        let band_high = Point {
            x: key.widen(),
            y: K::Wide::from_offset(y + self.error),
        };
        let band_low = Point {
            x: key.widen(),
            y: K::Wide::from_offset(y - self.error),
        };

        if self.points == 1 {
            self.lower = band_low.slope_from(&anchor);
            self.upper = band_high.slope_from(&anchor);
            self.last_key = Some(key);
            self.points = 2;
            return true;
        }

        let slope = Point {
            x: key.widen(),
            y: K::Wide::from_offset(y),
        }
        .slope_from(&anchor);

        if slope.cmp(&self.lower) == Ordering::Less || slope.cmp(&self.upper) == Ordering::Greater {
            self.points = 0;
            return false;
        }

        let high_slope = band_high.slope_from(&anchor);
        if high_slope.cmp(&self.upper) == Ordering::Less {
            self.upper = high_slope;
        }

        let low_slope = band_low.slope_from(&anchor);
        if low_slope.cmp(&self.lower) == Ordering::Greater {
            self.lower = low_slope;
        }

        self.last_key = Some(key);
        self.points += 1;
        true
    }

    /// Emit the segment described by the points accepted so far. Valid once
    /// at least one point was offered, including right after a rejection
    /// (the cone state still describes the segment that just closed).
    pub fn segment(&self) -> Segment<K> {
        let (start_key, start_pos) = self.first.expect("segment emitted before any point");

        if self.points == 1 {
            // Any slope satisfies the bound for a single point; 1 keeps the
            // output deterministic.
            return Segment::new(start_key, start_pos, start_key, 1.0);
        }

        let slope = (self.upper.to_f64() + self.lower.to_f64()) / 2.0;
        let end_key = self.last_key.expect("segment emitted before any point");
        Segment::new(start_key, start_pos, end_key, slope)
    }
}

/// Runs the cone over `n` points supplied by `input` (sorted by key) and
/// hands each finished segment to `emit` together with the half-open input
/// index range it covers. Returns the number of segments.
///
/// Consecutive duplicate keys collapse onto their first occurrence; the
/// duplicate indices still belong to the covering segment's range.
pub fn segment_points<K, In, Emit>(n: usize, error: u64, input: In, mut emit: Emit) -> usize
where
    K: Key,
    In: Fn(usize) -> (K, u64),
    Emit: FnMut(Segment<K>, Range<usize>),
{
    if n == 0 {
        return 0;
    }

    let mut cone = ShrinkingCone::new(error);
    let mut emitted = 0;
    let mut start = 0;

    let (mut prev_key, first_pos) = input(0);
    cone.add(prev_key, first_pos);

    for i in 1..n {
        let (key, pos) = input(i);
        if i != start && key.order(&prev_key) == Ordering::Equal {
            continue;
        }
        prev_key = key;

        if !cone.add(key, pos) {
            emit(cone.segment(), start..i);
            emitted += 1;
            start = i;
            // A reset cone always accepts its anchor.
            let accepted = cone.add(key, pos);
            debug_assert!(accepted);
        }
    }

    emit(cone.segment(), start..n);
    emitted + 1
}

#[cfg(test)]
mod segmentation_tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn collect_segments<K: Key>(data: &[K], error: u64) -> Vec<(Segment<K>, Range<usize>)> {
        let mut out = Vec::new();
        let count = segment_points(
            data.len(),
            error,
            |i| (data[i], i as u64),
            |segment, range| out.push((segment, range)),
        );
        assert_eq!(count, out.len());
        out
    }

    /// Every key's prediction must land within `error + 1` of its index
    /// (the +1 absorbs the floating midpoint rounding), and segment ranges
    /// must partition the input.
    fn check_error_bound<K: Key>(data: &[K], error: u64) {
        let segments = collect_segments(data, error);

        let mut expected_start = 0;
        for (_, range) in &segments {
            assert_eq!(range.start, expected_start);
            expected_start = range.end;
        }
        assert_eq!(expected_start, data.len());

        for (segment, range) in &segments {
            for i in range.clone() {
                if i != range.start && data[i].order(&data[i - 1]) == Ordering::Equal {
                    continue;
                }
                let predicted = segment.predict(&data[i]) as i64;
                let miss = (predicted - i as i64).unsigned_abs();
                assert!(
                    miss <= error + 1,
                    "index {} predicted {} with error bound {}",
                    i,
                    predicted,
                    error
                );
            }
        }
    }

    macro_rules! test_error_bound {
        ($name:ident, $error:expr) => {
            #[test]
            fn $name() {
                let mut rng = StdRng::seed_from_u64(42);
                let mut dense: Vec<u64> = (0..50_000).map(|_| rng.gen_range(0..10_000)).collect();
                dense.sort_unstable();
                check_error_bound(&dense, $error);

                let mut sparse: Vec<u64> =
                    (0..50_000).map(|_| rng.gen_range(0..10_000_000)).collect();
                sparse.sort_unstable();
                check_error_bound(&sparse, $error);
            }
        };
    }

    test_error_bound!(error_bound_32, 32);
    test_error_bound!(error_bound_64, 64);
    test_error_bound!(error_bound_128, 128);

    #[test]
    fn empty_input_emits_nothing() {
        let segments = collect_segments::<u64>(&[], 64);
        assert!(segments.is_empty());
    }

    #[test]
    fn single_point_is_degenerate() {
        let segments = collect_segments(&[42u64], 64);
        assert_eq!(segments.len(), 1);

        let (segment, range) = &segments[0];
        assert_eq!(segment.start_key(), 42);
        assert_eq!(segment.end_key(), 42);
        assert_eq!(segment.slope_intercept(), (1.0, 0));
        assert_eq!(*range, 0..1);
    }

    #[test]
    fn perfect_line_is_one_segment() {
        let data: Vec<u64> = (0..10_000).collect();
        let segments = collect_segments(&data, 1);
        assert_eq!(segments.len(), 1);
        check_error_bound(&data, 1);
    }

    #[test]
    fn duplicate_run_collapses_onto_first() {
        // 100 copies of the same key then a jump; the duplicates must not
        // tighten the cone further and must stay inside the first range.
        let mut data: Vec<u64> = vec![5; 100];
        data.extend((0..1000).map(|i| 10 + i * 3));
        let segments = collect_segments(&data, 8);

        let mut covered = 0;
        for (_, range) in &segments {
            covered += range.len();
        }
        assert_eq!(covered, data.len());

        let (first, range) = &segments[0];
        assert_eq!(first.start_key(), 5);
        assert!(range.len() >= 100);
    }

    #[test]
    fn rejection_reopens_with_same_point() {
        // Two flat runs far apart force a close; the second segment must be
        // anchored exactly at the first rejected key.
        let mut data: Vec<u64> = (0..100).collect();
        data.extend((0..100).map(|i| 1_000_000 + i * 500));
        let segments = collect_segments(&data, 4);
        assert!(segments.len() >= 2);
        assert_eq!(segments[1].0.start_key(), data[segments[1].1.start]);
    }

    #[test]
    fn lognormal_floats_stay_bounded() {
        use rand_distr::{Distribution, LogNormal};

        let mut rng = StdRng::seed_from_u64(42);
        let lognormal = LogNormal::new(0.0, 0.5).expect("valid parameters");
        let mut data: Vec<f64> = (0..50_000).map(|_| lognormal.sample(&mut rng)).collect();
        data.sort_by(|a, b| a.total_cmp(b));
        check_error_bound(&data, 32);
    }
}
