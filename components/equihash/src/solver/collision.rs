//! Finding collisions between the entries of one round.

use std::ops::Range;

use super::bucket::{BucketStore, Bucketed};
use crate::digest::Digests;

/// Maps a collision word onto its bucket and the bits left to compare within it.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Keying {
    rest_bits: usize,
}

impl Keying {
    /// Buckets on the top `bucket_bits` of each `collision_bits`-bit word.
    pub(crate) fn new(collision_bits: usize, bucket_bits: usize) -> Self {
        debug_assert!(bucket_bits <= collision_bits);
        Keying {
            rest_bits: collision_bits - bucket_bits,
        }
    }

    pub(crate) fn bucket_of(&self, word: u32) -> usize {
        (word >> self.rest_bits) as usize
    }

    pub(crate) fn rest_of(&self, word: u32) -> u32 {
        word & ((1 << self.rest_bits) - 1)
    }
}

/// The location of two colliding entries in the same bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TreeRef {
    pub(crate) bucket: usize,
    pub(crate) first: usize,
    pub(crate) second: usize,
}

/// Bitfield layout packing a [`TreeRef`] into a `u32`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RefPacking {
    slot_bits: usize,
}

impl RefPacking {
    /// The packing for buckets holding at most `capacity` entries.
    pub(crate) fn for_capacity(capacity: usize) -> Self {
        RefPacking {
            slot_bits: (usize::BITS - capacity.saturating_sub(1).leading_zeros()) as usize,
        }
    }

    /// The number of bits needed to pack a reference into one of `2^bucket_bits`
    /// buckets.
    pub(crate) fn packed_bits(&self, bucket_bits: usize) -> usize {
        bucket_bits + 2 * self.slot_bits
    }

    pub(crate) fn pack(&self, r: &TreeRef) -> u32 {
        let packed = ((r.bucket as u64) << (2 * self.slot_bits))
            | ((r.first as u64) << self.slot_bits)
            | (r.second as u64);
        packed as u32
    }

    pub(crate) fn unpack(&self, packed: u32) -> TreeRef {
        let slot_mask = (1u64 << self.slot_bits) - 1;
        let packed = u64::from(packed);
        TreeRef {
            bucket: (packed >> (2 * self.slot_bits)) as usize,
            first: ((packed >> self.slot_bits) & slot_mask) as usize,
            second: (packed & slot_mask) as usize,
        }
    }

    /// Whether two packed references point at a common entry.
    fn share_child(&self, a: u32, b: u32) -> bool {
        let (a, b) = (self.unpack(a), self.unpack(b));
        a.bucket == b.bucket
            && (a.first == b.first
                || a.first == b.second
                || a.second == b.first
                || a.second == b.second)
    }
}

/// Inserts the digests of every base index in `indices` into the first store.
pub(crate) fn bucket_digests(
    digests: &Digests,
    store: &BucketStore,
    keying: &Keying,
    indices: Range<usize>,
) -> usize {
    let mut dropped = 0;
    for index in indices {
        let words = digests.get(index);
        if !store.insert(keying.bucket_of(words[0]), words, index as u32) {
            dropped += 1;
        }
    }
    dropped
}

/// Calls `f` with every pair of slots in `bucket` whose first words collide.
///
/// Pairs built from a common entry of the previous round are skipped when
/// `packing` is given: they can only expand to repeated indices.
fn for_each_pair(
    prev: &Bucketed,
    bucket: usize,
    keying: &Keying,
    packing: Option<&RefPacking>,
    scratch: &mut Vec<(u32, u32)>,
    mut f: impl FnMut(usize, usize),
) {
    scratch.clear();
    scratch.extend(
        prev.entries_of(bucket)
            .map(|slot| (keying.rest_of(prev.word(bucket, slot, 0)), slot as u32)),
    );
    scratch.sort_unstable();

    for run in scratch.chunk_by(|a, b| a.0 == b.0) {
        for (i, &(_, a)) in run.iter().enumerate() {
            for &(_, b) in &run[i + 1..] {
                let (a, b) = (a as usize, b as usize);
                if let Some(packing) = packing {
                    if packing.share_child(prev.tree_ref(bucket, a), prev.tree_ref(bucket, b)) {
                        continue;
                    }
                }
                f(a, b);
            }
        }
    }
}

/// Runs one intermediate round over `buckets` of `prev`, inserting the combined
/// entries into `next`.
///
/// `prev_refs` gives the packing of `prev`'s own references, or `None` if they are
/// base indices.
pub(crate) fn collide_buckets(
    prev: &Bucketed,
    next: &BucketStore,
    keying: &Keying,
    packing: &RefPacking,
    prev_refs: Option<&RefPacking>,
    buckets: Range<usize>,
) -> usize {
    let mut scratch = vec![];
    let mut remainder = vec![0; prev.width() - 1];
    let mut dropped = 0;

    for bucket in buckets {
        for_each_pair(prev, bucket, keying, prev_refs, &mut scratch, |a, b| {
            for (w, out) in remainder.iter_mut().enumerate() {
                *out = prev.word(bucket, a, w + 1) ^ prev.word(bucket, b, w + 1);
            }
            // Short of a full n-bit collision, an all-zero remainder comes from two
            // subtrees over the same indices.
            if remainder.iter().all(|&w| w == 0) {
                return;
            }

            let tree_ref = packing.pack(&TreeRef {
                bucket,
                first: a,
                second: b,
            });
            if !next.insert(keying.bucket_of(remainder[0]), &remainder, tree_ref) {
                dropped += 1;
            }
        });
    }

    dropped
}

/// Runs the final round over `buckets` of `prev`, returning the pairs whose remainders
/// are equal in full.
pub(crate) fn find_candidates(
    prev: &Bucketed,
    keying: &Keying,
    prev_refs: &RefPacking,
    buckets: Range<usize>,
) -> Vec<TreeRef> {
    let mut scratch = vec![];
    let mut candidates = vec![];

    for bucket in buckets {
        for_each_pair(prev, bucket, keying, Some(prev_refs), &mut scratch, |a, b| {
            if (1..prev.width()).all(|w| prev.word(bucket, a, w) == prev.word(bucket, b, w)) {
                candidates.push(TreeRef {
                    bucket,
                    first: a,
                    second: b,
                });
            }
        });
    }

    candidates
}
