//! Expanding collision references back into base indices.

use super::{
    bucket::TreeLayer,
    collision::{RefPacking, TreeRef},
};

/// The outcome of expanding one subtree.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Expansion {
    /// The subtree's indices, in canonical order.
    Expanded(Vec<u32>),
    /// The subtree repeats an index.
    Rejected,
}

fn intersect(a: &[u32], b: &[u32]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_unstable();
    b.sort_unstable();

    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => return true,
        }
    }
    false
}

/// Joins two sibling subtrees.
///
/// The subtree holding the smaller first index goes first. Since every expanded
/// subtree starts with its smallest index, this orders siblings by their minimum.
pub(crate) fn merge(left: Vec<u32>, right: Vec<u32>) -> Expansion {
    if intersect(&left, &right) {
        return Expansion::Rejected;
    }

    let (mut first, second) = if left.first() < right.first() {
        (left, right)
    } else {
        (right, left)
    };
    first.extend(second);
    Expansion::Expanded(first)
}

/// Expands the two entries of `layers[level]` that `pair` points at.
pub(crate) fn expand_pair(
    layers: &[TreeLayer],
    packing: &RefPacking,
    level: usize,
    pair: &TreeRef,
) -> Expansion {
    let left = match expand(layers, packing, level, pair.bucket, pair.first) {
        Expansion::Expanded(indices) => indices,
        Expansion::Rejected => return Expansion::Rejected,
    };
    let right = match expand(layers, packing, level, pair.bucket, pair.second) {
        Expansion::Expanded(indices) => indices,
        Expansion::Rejected => return Expansion::Rejected,
    };
    merge(left, right)
}

/// Expands the entry at `(bucket, slot)` of `layers[level]` into its base indices.
///
/// Entries of the first layer refer to a base index directly.
pub(crate) fn expand(
    layers: &[TreeLayer],
    packing: &RefPacking,
    level: usize,
    bucket: usize,
    slot: usize,
) -> Expansion {
    let tree_ref = layers[level].get(bucket, slot);
    if level == 0 {
        Expansion::Expanded(vec![tree_ref])
    } else {
        expand_pair(layers, packing, level - 1, &packing.unpack(tree_ref))
    }
}
