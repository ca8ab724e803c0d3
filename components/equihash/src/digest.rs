//! The BLAKE2b digests that Equihash searches for collisions.
//!
//! A single keyed BLAKE2b state absorbs the puzzle `input || nonce`. Index `i` is
//! then derived by hashing `le32(i / indices_per_hash_output)` and taking the
//! `(i % indices_per_hash_output)`th `n`-bit slice of the output.

use blake2b_simd::{Hash as Blake2bHash, Params as Blake2bParams, State as Blake2bState};

#[cfg(feature = "solver")]
use {crate::params::Params, memuse::DynamicUsage, rayon::prelude::*};

pub(crate) fn initialise_state(n: u32, k: u32, digest_len: u8) -> Blake2bState {
    let mut personalization = [0u8; 16];
    personalization[..8].copy_from_slice(b"ZcashPoW");
    personalization[8..12].copy_from_slice(&n.to_le_bytes());
    personalization[12..].copy_from_slice(&k.to_le_bytes());

    Blake2bParams::new()
        .hash_length(digest_len as usize)
        .personal(&personalization)
        .to_state()
}

pub(crate) fn generate_hash(base_state: &Blake2bState, i: u32) -> Blake2bHash {
    let mut state = base_state.clone();
    state.update(&i.to_le_bytes());
    state.finalize()
}

/// Splits an `n`-bit digest into `out.len()` big-endian words of `bit_len` bits each.
#[cfg(feature = "solver")]
fn split_words(digest: &[u8], bit_len: usize, out: &mut [u32]) {
    let bit_len_mask: u64 = (1 << bit_len) - 1;

    // The acc_bits least-significant bits of acc_value represent a bit sequence
    // in big-endian order.
    let mut acc_bits = 0;
    let mut acc_value: u64 = 0;

    let mut words = out.iter_mut();
    for b in digest {
        acc_value = (acc_value << 8) | u64::from(*b);
        acc_bits += 8;

        if acc_bits >= bit_len {
            acc_bits -= bit_len;
            if let Some(word) = words.next() {
                *word = ((acc_value >> acc_bits) & bit_len_mask) as u32;
            }
        }
    }
}

/// Every digest for one `(input, nonce)`, each split into its `k + 1` collision words.
///
/// Word `j` of a digest holds bits `j * c .. (j + 1) * c` of the digest, where `c` is the
/// collision bit length; round `j + 1` of the solver collides on it.
#[cfg(feature = "solver")]
pub(crate) struct Digests {
    words_per_digest: usize,
    words: Vec<u32>,
}

#[cfg(feature = "solver")]
impl Digests {
    /// Computes the digests of every index, statically splitting the hash groups into
    /// `threads` contiguous ranges.
    ///
    /// Runs on the current rayon pool, so callers should be inside `ThreadPool::install`.
    pub(crate) fn generate(p: &Params, state: &Blake2bState, threads: usize) -> Self {
        let words_per_digest = p.k as usize + 1;
        let digest_bytes = p.n as usize / 8;
        let per_hash = p.indices_per_hash_output() as usize;
        let index_count = p.index_count();

        let groups = (index_count + per_hash - 1) / per_hash;
        let groups_per_thread = (groups + threads - 1) / threads;
        let group_words = per_hash * words_per_digest;

        let mut words = vec![0u32; index_count * words_per_digest];
        words
            .par_chunks_mut(groups_per_thread * group_words)
            .enumerate()
            .for_each(|(thread, slice)| {
                let first_group = thread * groups_per_thread;
                for (g, out) in slice.chunks_mut(group_words).enumerate() {
                    let hash = generate_hash(state, (first_group + g) as u32);
                    // The final group may be truncated, if `per_hash` does not divide
                    // the index count.
                    for (digest, digest_words) in hash
                        .as_bytes()
                        .chunks_exact(digest_bytes)
                        .zip(out.chunks_exact_mut(words_per_digest))
                    {
                        split_words(digest, p.collision_bit_length(), digest_words);
                    }
                }
            });

        Digests {
            words_per_digest,
            words,
        }
    }

    /// The number of digests.
    pub(crate) fn len(&self) -> usize {
        self.words.len() / self.words_per_digest
    }

    /// The collision words of the digest for `index`.
    pub(crate) fn get(&self, index: usize) -> &[u32] {
        let start = index * self.words_per_digest;
        &self.words[start..start + self.words_per_digest]
    }
}

#[cfg(feature = "solver")]
impl DynamicUsage for Digests {
    fn dynamic_usage(&self) -> usize {
        self.words.dynamic_usage()
    }

    fn dynamic_usage_bounds(&self) -> (usize, Option<usize>) {
        self.words.dynamic_usage_bounds()
    }
}
