//! Number Pool Generator
//!
//! Uniform sampling over an inclusive integer range with optional exclusions.
//! Excluded values are skipped by index arithmetic over the sorted exclusion
//! set, so neither the range nor the remaining candidates are ever materialised
//! and no resample loop is needed.

use crate::model::{range_span, Number};
use rand::Rng;
use std::collections::BTreeSet;

/// Draws one number from `[min, max]`, avoiding `exclude` where possible.
///
/// If the exclusions cover the whole range the draw falls back to an
/// unconstrained uniform sample (repeats accepted) instead of failing.
/// Bounds given in the wrong order are swapped.
pub fn sample<R: Rng + ?Sized>(
    rng: &mut R,
    min: Number,
    max: Number,
    exclude: &BTreeSet<Number>,
) -> Number {
    let (min, max) = if min <= max { (min, max) } else { (max, min) };
    let span = range_span(min, max);

    let excluded = exclude.range(min..=max).count() as u128;
    let available = span - excluded;

    if available == 0 {
        tracing::trace!(min, max, "Exclusions cover the range, sampling unconstrained");
        return nth_free(min, std::iter::empty::<Number>(), rng.random_range(0..span));
    }

    let index = rng.random_range(0..available);
    nth_free(min, exclude.range(min..=max).copied(), index)
}

/// Returns the `index`-th value (0-based) of `[min, ..]` that is not in `taken`.
///
/// `taken` must be ascending and contain only values `>= min`.
fn nth_free(min: Number, taken: impl Iterator<Item = Number>, index: u128) -> Number {
    let mut value = i128::from(min) + index as i128;
    for t in taken {
        if i128::from(t) <= value {
            value += 1;
        } else {
            break;
        }
    }
    value as Number
}

/// Candidates remaining in a range, drawn without replacement.
///
/// Holds the taken set rather than the free set; a draw picks a uniform index
/// among the free values and marks it taken.
#[derive(Debug, Clone)]
pub struct CandidatePool {
    min: Number,
    max: Number,
    taken: BTreeSet<Number>,
}

impl CandidatePool {
    /// Creates a pool with every value of `[min, max]` available.
    pub fn new(min: Number, max: Number) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            taken: BTreeSet::new(),
        }
    }

    /// Creates a pool with `exclude` already removed. Out-of-range values are ignored.
    pub fn excluding<I>(min: Number, max: Number, exclude: I) -> Self
    where
        I: IntoIterator<Item = Number>,
    {
        let mut pool = Self::new(min, max);
        for n in exclude {
            pool.take(n);
        }
        pool
    }

    /// Number of values still available.
    pub fn remaining(&self) -> u128 {
        range_span(self.min, self.max) - self.taken.len() as u128
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Returns true if `number` is in range and not yet taken.
    pub fn is_available(&self, number: Number) -> bool {
        (self.min..=self.max).contains(&number) && !self.taken.contains(&number)
    }

    /// Marks `number` as taken. Returns false if it was out of range or already taken.
    pub fn take(&mut self, number: Number) -> bool {
        if !(self.min..=self.max).contains(&number) {
            return false;
        }
        self.taken.insert(number)
    }

    /// Removes and returns a uniformly chosen available value.
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Number> {
        let remaining = self.remaining();
        if remaining == 0 {
            return None;
        }

        let index = rng.random_range(0..remaining);
        let value = nth_free(self.min, self.taken.iter().copied(), index);
        self.taken.insert(value);
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_sample_within_range() {
        let mut rng = rng();
        let exclude = BTreeSet::new();
        for _ in 0..500 {
            let n = sample(&mut rng, 1, 10, &exclude);
            assert!((1..=10).contains(&n));
        }
    }

    #[test]
    fn test_sample_avoids_exclusions() {
        let mut rng = rng();
        let exclude: BTreeSet<Number> = (1..=9).collect();
        for _ in 0..100 {
            assert_eq!(sample(&mut rng, 1, 10, &exclude), 10);
        }
    }

    #[test]
    fn test_sample_ignores_out_of_range_exclusions() {
        let mut rng = rng();
        let exclude: BTreeSet<Number> = [-5, 0, 11, 50].into_iter().collect();
        for _ in 0..200 {
            let n = sample(&mut rng, 1, 3, &exclude);
            assert!((1..=3).contains(&n));
        }
    }

    #[test]
    fn test_sample_exhausted_range_falls_back() {
        let mut rng = rng();
        let exclude: BTreeSet<Number> = (1..=5).collect();
        for _ in 0..100 {
            let n = sample(&mut rng, 1, 5, &exclude);
            assert!((1..=5).contains(&n));
        }
    }

    #[test]
    fn test_sample_single_value() {
        let mut rng = rng();
        let excluded: BTreeSet<Number> = [42].into_iter().collect();
        assert_eq!(sample(&mut rng, 42, 42, &BTreeSet::new()), 42);
        assert_eq!(sample(&mut rng, 42, 42, &excluded), 42);
    }

    #[test]
    fn test_sample_reaches_every_free_value() {
        let mut rng = rng();
        let exclude: BTreeSet<Number> = [2, 4, 6].into_iter().collect();
        let mut seen = BTreeSet::new();
        for _ in 0..1000 {
            seen.insert(sample(&mut rng, 1, 7, &exclude));
        }
        assert_eq!(seen, [1, 3, 5, 7].into_iter().collect());
    }

    #[test]
    fn test_nth_free_matches_enumeration() {
        let taken: BTreeSet<Number> = [3, 4, 8, 10].into_iter().collect();
        let free: Vec<Number> = (1..=12).filter(|n| !taken.contains(n)).collect();

        for (i, expected) in free.iter().enumerate() {
            assert_eq!(nth_free(1, taken.iter().copied(), i as u128), *expected);
        }
    }

    #[test]
    fn test_sample_negative_range() {
        let mut rng = rng();
        let exclude: BTreeSet<Number> = [-2, -1].into_iter().collect();
        for _ in 0..100 {
            let n = sample(&mut rng, -3, 0, &exclude);
            assert!(n == -3 || n == 0);
        }
    }

    #[test]
    fn test_pool_draws_without_replacement() {
        let mut rng = rng();
        let mut pool = CandidatePool::new(1, 20);
        let mut drawn = BTreeSet::new();

        while let Some(n) = pool.draw(&mut rng) {
            assert!(drawn.insert(n), "value {n} drawn twice");
        }

        assert_eq!(drawn, (1..=20).collect());
        assert!(pool.is_exhausted());
    }

    #[test]
    fn test_pool_excluding() {
        let mut rng = rng();
        let mut pool = CandidatePool::excluding(1, 10, [1, 2, 3, 4, 5, 99]);
        assert_eq!(pool.remaining(), 5);
        assert!(!pool.is_available(3));
        assert!(pool.is_available(6));

        let mut drawn: Vec<Number> = std::iter::from_fn(|| pool.draw(&mut rng)).collect();
        drawn.sort();
        assert_eq!(drawn, vec![6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_pool_take() {
        let mut pool = CandidatePool::new(1, 3);
        assert!(pool.take(2));
        assert!(!pool.take(2));
        assert!(!pool.take(4));
        assert_eq!(pool.remaining(), 2);
    }

    #[test]
    fn test_pool_wide_range() {
        let mut rng = rng();
        let mut pool = CandidatePool::new(i64::MIN, i64::MAX);
        let a = pool.draw(&mut rng).unwrap();
        let b = pool.draw(&mut rng).unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.remaining(), (1u128 << 64) - 2);
    }
}
