//! Fixed-capacity bucket stores, one per collision round.
//!
//! A store is written concurrently during its round and read during the next one. The
//! two phases are separate types: [`BucketStore`] only supports appending, and
//! [`BucketStore::freeze`] turns it into a read-only [`Bucketed`] once every worker has
//! finished inserting. Entries are addressed by `(bucket, slot)`, which is also how the
//! next round refers back to them.

use std::mem;
use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};

use memuse::DynamicUsage;

fn atomic_vec(len: usize) -> Vec<AtomicU32> {
    std::iter::repeat_with(|| AtomicU32::new(0))
        .take(len)
        .collect()
}

fn atomic_usage(v: &Vec<AtomicU32>) -> usize {
    v.capacity() * mem::size_of::<AtomicU32>()
}

/// A set of buckets accepting concurrent appends.
///
/// Each entry is a remainder of `width` collision words, plus a 32-bit reference to the
/// entries it was built from.
pub(crate) struct BucketStore {
    capacity: usize,
    width: usize,
    counts: Vec<AtomicU32>,
    remainders: Vec<AtomicU32>,
    refs: Vec<AtomicU32>,
}

impl BucketStore {
    pub(crate) fn new(num_buckets: usize, capacity: usize, width: usize) -> Self {
        BucketStore {
            capacity,
            width,
            counts: atomic_vec(num_buckets),
            remainders: atomic_vec(num_buckets * capacity * width),
            refs: atomic_vec(num_buckets * capacity),
        }
    }

    /// Appends an entry to `bucket`.
    ///
    /// Returns `false` if the bucket is already full, in which case the entry is
    /// dropped. Each call claims a distinct slot, so concurrent inserts never write to
    /// the same entry.
    pub(crate) fn insert(&self, bucket: usize, remainder: &[u32], tree_ref: u32) -> bool {
        debug_assert_eq!(remainder.len(), self.width);

        let slot = self.counts[bucket].fetch_add(1, Ordering::Relaxed) as usize;
        if slot >= self.capacity {
            return false;
        }

        let entry = bucket * self.capacity + slot;
        let start = entry * self.width;
        for (dst, word) in self.remainders[start..start + self.width]
            .iter()
            .zip(remainder)
        {
            dst.store(*word, Ordering::Relaxed);
        }
        self.refs[entry].store(tree_ref, Ordering::Relaxed);
        true
    }

    /// Ends the insert phase.
    ///
    /// Callers must only freeze a store after every insert into it has returned; the
    /// solver does this by joining its workers first.
    pub(crate) fn freeze(self) -> Bucketed {
        let capacity = self.capacity;
        let mut overflow = 0;
        let counts = self
            .counts
            .into_iter()
            .map(|count| {
                let count = count.into_inner() as usize;
                overflow += count.saturating_sub(capacity);
                count.min(capacity) as u32
            })
            .collect();

        Bucketed {
            capacity,
            width: self.width,
            counts,
            overflow,
            remainders: self.remainders,
            refs: self.refs,
        }
    }
}

impl DynamicUsage for BucketStore {
    fn dynamic_usage(&self) -> usize {
        atomic_usage(&self.counts) + atomic_usage(&self.remainders) + atomic_usage(&self.refs)
    }

    fn dynamic_usage_bounds(&self) -> (usize, Option<usize>) {
        let usage = self.dynamic_usage();
        (usage, Some(usage))
    }
}

/// A [`BucketStore`] whose insert phase has ended.
pub(crate) struct Bucketed {
    capacity: usize,
    width: usize,
    counts: Vec<u32>,
    overflow: usize,
    remainders: Vec<AtomicU32>,
    refs: Vec<AtomicU32>,
}

impl Bucketed {
    pub(crate) fn num_buckets(&self) -> usize {
        self.counts.len()
    }

    /// The number of collision words in each remainder.
    pub(crate) fn width(&self) -> usize {
        self.width
    }

    /// The total number of stored entries.
    pub(crate) fn len(&self) -> usize {
        self.counts.iter().map(|&c| c as usize).sum()
    }

    /// The number of entries that were dropped because their bucket was full.
    pub(crate) fn overflow(&self) -> usize {
        self.overflow
    }

    /// The occupied slots of `bucket`.
    pub(crate) fn entries_of(&self, bucket: usize) -> Range<usize> {
        0..self.counts[bucket] as usize
    }

    /// Word `word` of the remainder stored at `(bucket, slot)`.
    pub(crate) fn word(&self, bucket: usize, slot: usize, word: usize) -> u32 {
        let entry = bucket * self.capacity + slot;
        self.remainders[entry * self.width + word].load(Ordering::Relaxed)
    }

    pub(crate) fn tree_ref(&self, bucket: usize, slot: usize) -> u32 {
        self.refs[bucket * self.capacity + slot].load(Ordering::Relaxed)
    }

    /// Discards the remainders, keeping the references needed to expand solutions.
    pub(crate) fn into_layer(self) -> TreeLayer {
        TreeLayer {
            capacity: self.capacity,
            refs: self.refs.into_iter().map(AtomicU32::into_inner).collect(),
        }
    }
}

impl DynamicUsage for Bucketed {
    fn dynamic_usage(&self) -> usize {
        self.counts.dynamic_usage() + atomic_usage(&self.remainders) + atomic_usage(&self.refs)
    }

    fn dynamic_usage_bounds(&self) -> (usize, Option<usize>) {
        let usage = self.dynamic_usage();
        (usage, Some(usage))
    }
}

/// The references of one finished round.
///
/// In the first layer each reference is a base index; in later layers it is a packed
/// [`TreeRef`](super::collision::TreeRef) into the layer below.
pub(crate) struct TreeLayer {
    capacity: usize,
    refs: Vec<u32>,
}

impl TreeLayer {
    pub(crate) fn get(&self, bucket: usize, slot: usize) -> u32 {
        self.refs[bucket * self.capacity + slot]
    }
}

impl DynamicUsage for TreeLayer {
    fn dynamic_usage(&self) -> usize {
        self.refs.dynamic_usage()
    }

    fn dynamic_usage_bounds(&self) -> (usize, Option<usize>) {
        self.refs.dynamic_usage_bounds()
    }
}
