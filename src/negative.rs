//! The unigram table for negative sampling.

use crate::rng::Rng;

/// Default number of slots in the table.
pub const NEGATIVE_TABLE_SIZE: usize = 100_000_000;

/// Counts are raised to this power before filling the table, which flattens
/// the distribution so rare words get drawn more often than their frequency.
const POWER: f64 = 0.75;

/// A negative draw that hits the positive target is redrawn at most this many
/// times before the sample is skipped.
const MAX_REDRAWS: usize = 16;

/// A table of vocabulary indices. Entry `i` fills a share of the slots
/// proportional to `count[i]^0.75`, so drawing a uniform slot samples the
/// smoothed unigram distribution.
#[derive(Debug, Clone)]
pub struct NegativeTable {
    table: Vec<u32>,
}

impl NegativeTable {
    /// # Panics
    ///
    /// If `counts` is empty or `size` is zero.
    pub fn new(counts: &[u64], size: usize) -> Self {
        assert!(!counts.is_empty(), "negative table needs a vocabulary");
        assert!(size > 0, "negative table needs at least one slot");

        let last = counts.len() - 1;
        let train_words_pow = counts.iter().map(|&c| (c as f64).powf(POWER)).sum::<f64>();
        let mut table = Vec::with_capacity(size);
        if train_words_pow == 0.0 {
            table.extend((0..size).map(|a| (a * counts.len() / size) as u32));
            return NegativeTable { table };
        }

        let mut i = 0;
        let mut d1 = (counts[i] as f64).powf(POWER) / train_words_pow;
        for a in 0..size {
            table.push(i as u32);
            if (a as f64 / size as f64) > d1 && i < last {
                i += 1;
                d1 += (counts[i] as f64).powf(POWER) / train_words_pow;
            }
        }
        NegativeTable { table }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn sample(&self, rng: &mut Rng) -> u32 {
        let slot = (rng.rand_u64() >> 16) % self.table.len() as u64;
        self.table[slot as usize]
    }

    /// Draw an index other than `positive`. Returns `None` if every redraw
    /// came back equal to it, which happens when the table is dominated by
    /// that one entry.
    pub fn sample_excluding(&self, rng: &mut Rng, positive: u32) -> Option<u32> {
        (0..MAX_REDRAWS)
            .map(|_| self.sample(rng))
            .find(|&target| target != positive)
    }

    /// Fraction of slots holding `index`.
    pub fn share(&self, index: u32) -> f64 {
        self.table.iter().filter(|&&t| t == index).count() as f64 / self.table.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected_shares(counts: &[u64]) -> Vec<f64> {
        let total: f64 = counts.iter().map(|&c| (c as f64).powf(POWER)).sum();
        counts.iter().map(|&c| (c as f64).powf(POWER) / total).collect()
    }

    #[test]
    fn shares_follow_smoothed_counts() {
        let counts = [1000, 100, 10];
        let table = NegativeTable::new(&counts, 1_000_000);
        for (i, expected) in expected_shares(&counts).into_iter().enumerate() {
            let got = table.share(i as u32);
            assert!((got - expected).abs() < 0.001, "entry {i}: {got} vs {expected}");
        }
    }

    #[test]
    fn sampling_converges() {
        let counts = [50, 30, 20, 0, 5];
        let table = NegativeTable::new(&counts, 100_000);
        let mut rng = Rng(9);
        let mut hist = [0usize; 5];
        let draws = 200_000;
        for _ in 0..draws {
            hist[table.sample(&mut rng) as usize] += 1;
        }
        for (i, expected) in expected_shares(&counts).into_iter().enumerate() {
            let got = hist[i] as f64 / draws as f64;
            assert!((got - expected).abs() < 0.01, "entry {i}: {got} vs {expected}");
        }
    }

    #[test]
    fn indices_stay_in_range() {
        let table = NegativeTable::new(&[1, 1, 1], 10);
        assert_eq!(table.len(), 10);
        assert!(table.table.iter().all(|&t| t < 3));
        assert!(table.table.contains(&2));
    }

    #[test]
    fn all_zero_counts_fill_uniformly() {
        let table = NegativeTable::new(&[0, 0], 4);
        assert_eq!(table.table, vec![0, 0, 1, 1]);
    }

    #[test]
    fn excluding_never_returns_positive() {
        let table = NegativeTable::new(&[10, 10, 10], 1000);
        let mut rng = Rng(1);
        for _ in 0..1000 {
            assert_ne!(table.sample_excluding(&mut rng, 1), Some(1));
        }
        let single = NegativeTable::new(&[7], 10);
        assert_eq!(single.sample_excluding(&mut rng, 0), None);
    }
}
