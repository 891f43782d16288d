//! Seeded host-side randomness for minibatch selection.
//!
//! Keys are u64 seeds; [`RngKey::fold_in`] derives one independent stream per
//! resumption point so a resumed run does not replay the minibatches of the
//! run it continues. Tensor noise comes from the backend generator.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// An RNG key for deterministic random number generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RngKey(pub u64);

impl RngKey {
    /// Create a new RNG key from a seed.
    pub fn new(seed: u64) -> Self {
        RngKey(seed)
    }

    /// Derive the key of stream `index` without materializing the earlier ones.
    pub fn fold_in(self, index: u64) -> RngKey {
        let mut rng = ChaCha8Rng::seed_from_u64(self.0 ^ index.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        RngKey(rng.next_u64())
    }

    /// A seeded generator for host-side sampling.
    pub fn rng(self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.0)
    }
}

/// Draw `amount` distinct indices uniformly from `0..length`.
///
/// `amount` is clamped to `length`, matching a truncated random permutation.
pub fn sample_without_replacement<R: rand::Rng + ?Sized>(
    rng: &mut R,
    length: usize,
    amount: usize,
) -> Vec<usize> {
    rand::seq::index::sample(rng, length, amount.min(length)).into_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_fold_in_streams() {
        let a: Vec<u64> = (0..4).map(|i| RngKey::new(42).fold_in(i).0).collect();
        let unique: HashSet<_> = a.iter().copied().collect();
        assert_eq!(unique.len(), 4);

        let mut r1 = RngKey::new(42).fold_in(9).rng();
        let mut r2 = RngKey::new(42).fold_in(9).rng();
        assert_eq!(r1.next_u64(), r2.next_u64());

        assert_eq!(RngKey::new(7).fold_in(3), RngKey::new(7).fold_in(3));
        assert_ne!(RngKey::new(7).fold_in(3), RngKey::new(7).fold_in(4));
    }

    #[test]
    fn test_sample_without_replacement() {
        let mut rng = RngKey::new(1).rng();
        let idx = sample_without_replacement(&mut rng, 20, 8);
        assert_eq!(idx.len(), 8);
        let unique: HashSet<_> = idx.iter().copied().collect();
        assert_eq!(unique.len(), 8);
        assert!(idx.iter().all(|&i| i < 20));

        // Larger than the population: every row exactly once
        let idx = sample_without_replacement(&mut rng, 5, 8);
        let unique: HashSet<_> = idx.iter().copied().collect();
        assert_eq!(unique.len(), 5);
    }
}
