//! Equihash is a Proof-of-Work algorithm, based on a generalization of the Birthday
//! problem which finds colliding hash values. It was designed to be memory-hard; more
//! specifically, the bottle-neck for parallel implementations of Equihash solvers would
//! be memory bandwidth.
//!
//! This crate implements Equihash as specified for the Zcash consensus rules. It can
//! verify solutions for any valid `(n, k)` parameters, as long as the row indices are no
//! larger than 32 bits (that is, `ceiling(((n / (k + 1)) + 1) / 8) <= 4`). With the
//! `solver` feature it can also find solutions, for parameters with at most 20 collision
//! bits (including Zcash's `(200, 9)`).
//!
//! ## Feature flags
#![doc = document_features::document_features!()]
//!
//! References
//! ==========
//! - [Section 7.6.1: Equihash.] Zcash Protocol Specification, version 2020.1.10 or later.
//! - Alex Biryukov and Dmitry Khovratovich.
//!   [*Equihash: Asymmetric Proof-of-Work Based on the Generalized Birthday Problem.*][BK16]
//!   NDSS ’16.
//!
//! [Section 7.6.1: Equihash.]: https://zips.z.cash/protocol/protocol.pdf#equihash
//! [BK16]: https://www.internetsociety.org/sites/default/files/blogs-media/equihash-asymmetric-proof-of-work-based-generalized-birthday-problem.pdf

// Catch documentation errors caused by code changes.
#![deny(rustdoc::broken_intra_doc_links)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, doc(auto_cfg))]

mod digest;
mod minimal;
mod params;
mod verify;


pub use minimal::{indices_from_minimal, minimal_from_indices};
pub use params::Params;
pub use verify::{is_valid_indices, is_valid_solution, Error};

#[cfg(feature = "solver")]
mod solver;
#[cfg(feature = "solver")]
pub use solver::{
    solve_200_9, solve_200_9_compressed, Solution, Solver, SolverConfig, SolverError,
};
