// Error types for the chunking pipeline.
//
// Kept as a single flat enum (rather than rustic_core's nested `RusticError` /
// `RusticErrorKind` wrapping) since this crate has exactly one fallible surface: turning a byte
// stream into chunks. A flat enum is all `thiserror` needs to express it.

use thiserror::Error;

/// Everything that can go wrong while building or running a [`crate::chunker::Chunker`].
#[derive(Error, Debug)]
pub enum ChunkerError {
    /// The underlying reader failed.
    #[error("i/o error while reading source data")]
    Io(#[from] std::io::Error),

    /// A `u64` was supplied as a chunking polynomial but does not have the required degree.
    #[error("chunking polynomial must have degree {}, got {degree}", crate::poly::POLY_DEGREE)]
    InvalidPolynomial { degree: i32 },

    /// Could not find an irreducible polynomial within the retry budget.
    #[error("exhausted retries searching for a random irreducible polynomial")]
    RandomnessUnavailable,
}
