use std::sync::atomic::{AtomicU64, Ordering};

use crate::real;

const MULTIPLIER: u64 = 25214903917;
const INCREMENT: u64 = 11;

/// The linear congruential generator word2vec has always used. Each worker
/// owns one, seeded from the run seed and its worker id.
#[derive(Debug, Clone)]
pub struct Rng(pub u64);

impl Rng {
    pub fn rand_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(MULTIPLIER).wrapping_add(INCREMENT);
        self.0
    }

    /// Get a uniformly distributed random number in `0.0 .. 1.0`.
    pub fn rand_real(&mut self) -> real {
        (self.rand_u64() & 0xFFFF) as real / 65536.0
    }
}

/// One generator shared by every worker of a training run.
///
/// The state is advanced with a relaxed load followed by a relaxed store, not a
/// compare-and-swap. Two workers drawing at the same moment can see the same
/// value; that only affects which window sizes get picked. With a single
/// worker the sequence is fully deterministic.
#[derive(Debug)]
pub struct SharedRng {
    state: AtomicU64,
}

impl SharedRng {
    pub fn new(seed: u64) -> Self {
        SharedRng {
            state: AtomicU64::new(seed),
        }
    }

    pub fn reseed(&self, seed: u64) {
        self.state.store(seed, Ordering::Relaxed);
    }

    pub fn rand_u64(&self) -> u64 {
        let next = self
            .state
            .load(Ordering::Relaxed)
            .wrapping_mul(MULTIPLIER)
            .wrapping_add(INCREMENT);
        self.state.store(next, Ordering::Relaxed);
        next
    }

    /// Uniform draw from `1..=max`. `max` must be at least 1.
    pub fn one_to(&self, max: usize) -> usize {
        debug_assert!(max >= 1);
        // The low bits of an LCG are weak; use the high half.
        (self.rand_u64() >> 16) as usize % max + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lcg_matches_word2vec_sequence() {
        let mut rng = Rng(1);
        assert_eq!(rng.rand_u64(), 25214903928);
        assert_eq!(
            rng.rand_u64(),
            25214903928u64.wrapping_mul(25214903917).wrapping_add(11)
        );
    }

    #[test]
    fn rand_real_in_unit_interval() {
        let mut rng = Rng(7);
        for _ in 0..10_000 {
            let x = rng.rand_real();
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn shared_draws_cover_range() {
        let rng = SharedRng::new(3);
        let mut seen = [false; 6];
        for _ in 0..1000 {
            let b = rng.one_to(5);
            assert!((1..=5).contains(&b));
            seen[b] = true;
        }
        assert!(seen[1..].iter().all(|&s| s));
    }

    #[test]
    fn shared_rng_is_deterministic_single_threaded() {
        let a = SharedRng::new(42);
        let b = SharedRng::new(42);
        for _ in 0..100 {
            assert_eq!(a.rand_u64(), b.rand_u64());
        }
        b.reseed(42);
        a.reseed(42);
        assert_eq!(a.one_to(10), b.one_to(10));
    }
}
