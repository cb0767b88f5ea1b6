//! Content-defined chunking with a Rabin fingerprint over GF(2) polynomials.
//!
//! [`Chunker`] splits a [`std::io::Read`] source into variable-length chunks whose boundaries
//! depend on the data's content rather than fixed offsets, so a local edit only perturbs the
//! chunks around it. The cut points are found by a sliding-window Rabin fingerprint
//! ([`rolling_hash`]) evaluated over a chunking polynomial from GF(2)[x] ([`poly`]).
//!
//! This crate does not hash the chunks it produces; see [`hashing`] for optional, decoupled
//! helpers callers can apply to `Chunk::data` themselves.

pub mod chunker;
pub mod error;
pub mod hashing;
pub mod poly;
pub mod rolling_hash;

pub use chunker::{Chunk, Chunker};
pub use error::ChunkerError;
pub use poly::{random_polynomial, Polynomial};
