//! Seeded randomness for reproducible training
//!
//! Every random stream (the test split, the k-fold shuffle, each tree's
//! bootstrap) gets its own generator, seeded from the run seed and a stream id.
//! Parallel tree construction therefore draws the same samples no matter which
//! thread builds which tree.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Stream id of the train/test shuffle.
pub const SPLIT_STREAM: u64 = 0x5350_4c49_5400_0000;
/// Stream id of the k-fold shuffle.
pub const KFOLD_STREAM: u64 = 0x4b46_4f4c_4400_0000;

/// Mix a run seed and a stream id into a 64-bit generator seed.
pub fn derive_seed(seed: u64, stream: u64) -> u64 {
    const PRIME1: u64 = 0x9E37_79B1_85EB_CA87;
    const PRIME2: u64 = 0xC2B2_AE3D_27D4_EB4F;
    const PRIME3: u64 = 0x1656_67B1_9E37_79F9;
    const PRIME5: u64 = 0x85EB_CA77_C2B2_AE63;

    let mut h = seed.wrapping_add(PRIME5);
    for word in [seed, stream] {
        h = h.wrapping_add(word.wrapping_mul(PRIME3));
        h = h.rotate_left(17).wrapping_mul(PRIME2);
    }

    h ^= h >> 33;
    h = h.wrapping_mul(PRIME1);
    h ^= h >> 29;
    h = h.wrapping_mul(PRIME2);
    h ^= h >> 32;
    h
}

pub fn seeded_rng(seed: u64, stream: u64) -> StdRng {
    StdRng::seed_from_u64(derive_seed(seed, stream))
}

/// Fisher-Yates permutation of `0..n`.
pub fn permutation(n: usize, seed: u64, stream: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut seeded_rng(seed, stream));
    indices
}
