//! A native multithreaded Equihash solver.
//!
//! The solver runs Wagner's algorithm over fixed-capacity bucket stores:
//!
//! - Round 0 computes every digest and buckets it on the top bits of its first
//!   collision word.
//! - Rounds `1..k` pair the entries of each bucket whose current collision word is
//!   equal, and bucket the XOR of their remaining words on the next collision word.
//! - Round `k` pairs entries whose remaining two words are both equal. Each such pair
//!   is a candidate, which is expanded back into its `2^k` base indices and kept if
//!   none of them repeat.
//!
//! Each round is split statically across the worker threads, by bucket range, and
//! finishes before the next one starts. A bucket that fills up drops further entries,
//! which may lose solutions but never produces invalid ones.

use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use memuse::DynamicUsage;
use rayon::prelude::*;
use tracing::{debug, info_span};

use crate::{
    digest::{initialise_state, Digests},
    minimal::minimal_from_indices,
    params::Params,
};

mod bucket;
mod collision;
mod tree;

use bucket::{BucketStore, Bucketed, TreeLayer};
use collision::{bucket_digests, collide_buckets, find_candidates, Keying, RefPacking};
use tree::{expand_pair, Expansion};

/// The largest collision bit length the solver supports.
///
/// With the default bucket shape, a reference to two slots of a bucket takes
/// `collision_bits + 12` bits, and references are stored as `u32`.
const MAX_COLLISION_BITS: usize = 20;

/// Errors that prevent a [`Solver`] from being constructed.
#[derive(Debug)]
pub enum SolverError {
    /// The solver cannot handle these parameters: too many collision bits, or `n` above
    /// the 512-bit BLAKE2b output.
    UnsupportedParams(Params),
    /// The configuration is inconsistent with the parameters.
    InvalidConfig(&'static str),
    /// The worker thread pool could not be started.
    ThreadPool(rayon::ThreadPoolBuildError),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::UnsupportedParams(p) => write!(
                f,
                "unsupported Equihash parameters ({}, {}): n above 512 or over {} collision bits",
                p.n(),
                p.k(),
                MAX_COLLISION_BITS,
            ),
            SolverError::InvalidConfig(e) => write!(f, "invalid solver configuration: {}", e),
            SolverError::ThreadPool(e) => write!(f, "failed to start solver threads: {}", e),
        }
    }
}

impl std::error::Error for SolverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SolverError::ThreadPool(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for SolverError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        SolverError::ThreadPool(e)
    }
}

/// Tuning for a [`Solver`].
///
/// None of these settings affect which solutions are valid. Smaller buckets use less
/// memory, but drop more entries and so find fewer solutions.
#[derive(Clone, Debug)]
pub struct SolverConfig {
    threads: usize,
    bucket_bits: Option<usize>,
    bucket_capacity: Option<usize>,
    max_solutions: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            threads: 1,
            bucket_bits: None,
            bucket_capacity: None,
            max_solutions: 8,
        }
    }
}

impl SolverConfig {
    /// Sets the number of worker threads. Defaults to 1.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Sets how many leading bits of each collision word select its bucket.
    ///
    /// Defaults to all but the last 8 collision bits.
    pub fn bucket_bits(mut self, bucket_bits: usize) -> Self {
        self.bucket_bits = Some(bucket_bits);
        self
    }

    /// Sets the number of entries each bucket can hold.
    ///
    /// Defaults to twice the expected number of entries per bucket.
    pub fn bucket_capacity(mut self, capacity: usize) -> Self {
        self.bucket_capacity = Some(capacity);
        self
    }

    /// Sets the number of solutions after which a solve attempt stops expanding
    /// candidates. Defaults to 8.
    pub fn max_solutions(mut self, max_solutions: usize) -> Self {
        self.max_solutions = max_solutions;
        self
    }
}

/// An Equihash solution found by a [`Solver`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Solution {
    indices: Vec<u32>,
    minimal: Vec<u8>,
}

impl Solution {
    /// The `2^k` distinct base indices, in canonical order.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// The minimal encoding of the indices, as it appears in a block header.
    pub fn minimal(&self) -> &[u8] {
        &self.minimal
    }

    /// Consumes the solution, returning its indices.
    pub fn into_indices(self) -> Vec<u32> {
        self.indices
    }
}

/// The statically assigned share of `0..len` for worker `thread` of `threads`.
fn thread_slice(len: usize, threads: usize, thread: usize) -> Range<usize> {
    let per_thread = len.div_ceil(threads);
    (thread * per_thread).min(len)..((thread + 1) * per_thread).min(len)
}

/// An Equihash solver for one set of parameters.
///
/// The worker threads are started once and reused by every call to
/// [`Solver::solve`]. No other state is kept between calls.
#[derive(Debug)]
pub struct Solver {
    params: Params,
    threads: usize,
    bucket_bits: usize,
    capacity: usize,
    max_solutions: usize,
    keying: Keying,
    packing: RefPacking,
    pool: rayon::ThreadPool,
}

impl Solver {
    /// Validates `config` against `params` and starts the worker threads.
    pub fn new(params: Params, config: SolverConfig) -> Result<Self, SolverError> {
        let collision_bits = params.collision_bit_length();
        // Digests wider than one BLAKE2b output (n > 512) cannot be generated.
        if collision_bits > MAX_COLLISION_BITS || params.indices_per_hash_output() == 0 {
            return Err(SolverError::UnsupportedParams(params));
        }

        let bucket_bits = config
            .bucket_bits
            .unwrap_or(collision_bits - collision_bits.min(8));
        if bucket_bits > collision_bits {
            return Err(SolverError::InvalidConfig(
                "bucket bits exceed the collision bit length",
            ));
        }
        let capacity = config
            .bucket_capacity
            .unwrap_or(2 << (params.index_bit_length() - bucket_bits));
        if capacity == 0 {
            return Err(SolverError::InvalidConfig("bucket capacity must be non-zero"));
        }
        let packing = RefPacking::for_capacity(capacity);
        if packing.packed_bits(bucket_bits) > 32 {
            return Err(SolverError::InvalidConfig(
                "bucket references do not fit in 32 bits",
            ));
        }
        if config.threads == 0 {
            return Err(SolverError::InvalidConfig("thread count must be non-zero"));
        }
        if config.max_solutions == 0 {
            return Err(SolverError::InvalidConfig(
                "maximum solution count must be non-zero",
            ));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("equihash-{}", i))
            .build()?;

        Ok(Solver {
            params,
            threads: config.threads,
            bucket_bits,
            capacity,
            max_solutions: config.max_solutions,
            keying: Keying::new(collision_bits, bucket_bits),
            packing,
            pool,
        })
    }

    /// The parameters this solver was built for.
    pub fn params(&self) -> Params {
        self.params
    }

    /// The number of leading bits of each collision word that select a bucket.
    pub fn bucket_bits(&self) -> usize {
        self.bucket_bits
    }

    /// An upper bound on the bucket memory held at once by [`Solver::solve`], in bytes.
    ///
    /// During each round the previous and next stores are alive, along with the
    /// reference layers of every earlier round. Digests and the final candidates are
    /// not counted.
    pub fn memory_estimate(&self) -> usize {
        let k = self.params.k as usize;
        let slots = self.num_buckets() * self.capacity;
        // Counters, remainders and references of a store with `width` words per entry.
        let store = |width: usize| 4 * (self.num_buckets() + slots * (width + 1));

        (1..=k)
            .map(|round| {
                let next = if round < k { store(k + 1 - round) } else { 0 };
                store(k + 2 - round) + next + 4 * slots * (round - 1)
            })
            .max()
            .unwrap_or(0)
    }

    fn num_buckets(&self) -> usize {
        1 << self.bucket_bits
    }

    fn log_round(&self, round: u32, store: &Bucketed, dropped: usize) {
        debug!(
            round,
            entries = store.len(),
            dropped,
            bytes = store.dynamic_usage(),
            "Finished collision round"
        );
    }

    /// Searches for solutions to the puzzle `input || nonce`.
    ///
    /// Returns at most the configured maximum number of solutions, sorted and without
    /// duplicates. The result does not depend on the number of threads, unless that
    /// maximum is reached.
    pub fn solve(&self, input: &[u8], nonce: &[u8]) -> Vec<Solution> {
        let p = self.params;
        let span = info_span!("equihash_solve", n = p.n, k = p.k, threads = self.threads);
        let _enter = span.enter();

        let mut state = initialise_state(p.n, p.k, p.hash_output());
        state.update(input);
        state.update(nonce);

        let mut solutions = self.pool.install(|| {
            let prev = self.round_zero(&Digests::generate(&p, &state, self.threads));

            let mut layers = Vec::with_capacity(p.k as usize);
            let prev = (1..p.k).fold(prev, |prev, round| {
                let next = self.round(&prev, round);
                layers.push(prev.into_layer());
                next
            });

            let candidates = self.final_round(&prev);
            layers.push(prev.into_layer());
            debug!(
                candidates = candidates.len(),
                bytes = layers.dynamic_usage(),
                "Finished final round"
            );

            self.expand(&layers, &candidates)
        });

        solutions.sort();
        solutions.dedup();
        solutions.truncate(self.max_solutions);
        debug!(solutions = solutions.len(), "Finished solve attempt");

        solutions
            .into_iter()
            .map(|indices| Solution {
                minimal: minimal_from_indices(p, &indices),
                indices,
            })
            .collect()
    }

    /// Buckets every digest by its first collision word.
    fn round_zero(&self, digests: &Digests) -> Bucketed {
        debug!(bytes = digests.dynamic_usage(), "Generated digests");

        let store = BucketStore::new(
            self.num_buckets(),
            self.capacity,
            self.params.k as usize + 1,
        );
        let dropped: usize = (0..self.threads)
            .into_par_iter()
            .map(|t| {
                let indices = thread_slice(digests.len(), self.threads, t);
                bucket_digests(digests, &store, &self.keying, indices)
            })
            .sum();

        let store = store.freeze();
        self.log_round(0, &store, dropped);
        store
    }

    /// Collides the entries of `prev` on their next collision word.
    fn round(&self, prev: &Bucketed, round: u32) -> Bucketed {
        // First-round entries refer to base indices, which are always distinct.
        let prev_refs = (round > 1).then_some(&self.packing);

        let next = BucketStore::new(self.num_buckets(), self.capacity, prev.width() - 1);
        let dropped: usize = (0..self.threads)
            .into_par_iter()
            .map(|t| {
                let buckets = thread_slice(prev.num_buckets(), self.threads, t);
                collide_buckets(prev, &next, &self.keying, &self.packing, prev_refs, buckets)
            })
            .sum();

        let next = next.freeze();
        self.log_round(round, &next, dropped);
        next
    }

    /// Finds the pairs of `prev` whose remaining words match in full.
    fn final_round(&self, prev: &Bucketed) -> Vec<collision::TreeRef> {
        (0..self.threads)
            .into_par_iter()
            .map(|t| {
                let buckets = thread_slice(prev.num_buckets(), self.threads, t);
                find_candidates(prev, &self.keying, &self.packing, buckets)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    }

    /// Expands candidates into solutions until enough have been found.
    fn expand(&self, layers: &[TreeLayer], candidates: &[collision::TreeRef]) -> Vec<Vec<u32>> {
        let found = AtomicUsize::new(0);
        let last = layers.len() - 1;

        (0..self.threads)
            .into_par_iter()
            .map(|t| {
                let mut solutions = vec![];
                for candidate in &candidates[thread_slice(candidates.len(), self.threads, t)] {
                    if found.load(Ordering::Relaxed) >= self.max_solutions {
                        break;
                    }
                    if let Expansion::Expanded(indices) =
                        expand_pair(layers, &self.packing, last, candidate)
                    {
                        found.fetch_add(1, Ordering::Relaxed);
                        solutions.push(indices);
                    }
                }
                solutions
            })
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Performs multiple equihash solver runs with equihash parameters `200, 9`, initialising
/// the hash with the supplied partial `input`. Between each run, generates a new nonce of
/// length `N` using the `next_nonce` function.
///
/// Returns the solutions for the first nonce that has any, or no solutions if
/// `next_nonce` runs out first.
pub fn solve_200_9<const N: usize>(
    input: &[u8],
    mut next_nonce: impl FnMut() -> Option<[u8; N]>,
) -> Result<Vec<Vec<u32>>, SolverError> {
    let p = Params { n: 200, k: 9 };
    let solver = Solver::new(p, SolverConfig::default())?;

    while let Some(nonce) = next_nonce() {
        let solutions = solver.solve(input, &nonce);
        if !solutions.is_empty() {
            return Ok(solutions.into_iter().map(Solution::into_indices).collect());
        }
    }
    Ok(vec![])
}

/// As [`solve_200_9`], returning the solutions in their minimal encoding.
pub fn solve_200_9_compressed<const N: usize>(
    input: &[u8],
    next_nonce: impl FnMut() -> Option<[u8; N]>,
) -> Result<Vec<Vec<u8>>, SolverError> {
    let p = Params { n: 200, k: 9 };
    let solutions = solve_200_9(input, next_nonce)?;

    Ok(solutions
        .iter()
        .map(|solution| minimal_from_indices(p, solution))
        .collect())
}
