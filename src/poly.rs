// GF(2) polynomial arithmetic: the algebra chunk boundaries are built on.
//
// Polynomials live in the bits of a `u64`: bit `i` is the coefficient of `x^i`. Addition and
// subtraction both collapse to XOR in this field, which is what makes the arithmetic below cheap.

use std::convert::TryFrom;
use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::ChunkerError;

/// Degree every chunking polynomial accepted by this crate must have.
pub const POLY_DEGREE: i32 = 53;

const RANDOM_POLY_MAX_TRIES: u32 = 1_000_000;

/// GF(2) polynomial arithmetic on the raw `u64` representation.
///
/// This is kept as an extension trait on `u64`, rather than folded into [`Polynomial`], because
/// several of these operations (most of all [`Gf2Poly::gf2_mod`] and the irreducibility test) are
/// needed on *intermediate* values that are not themselves valid degree-53 chunking polynomials.
pub trait Gf2Poly: Sized + Copy {
    /// Index of the highest set bit, or -1 for the zero polynomial.
    fn degree(self) -> i32;

    /// GF(2) addition (and subtraction, its own inverse): bitwise XOR.
    fn gf2_add(self, other: Self) -> Self;

    /// Remainder of division by `modulus`. `modulus` must be nonzero.
    fn gf2_mod(self, modulus: Self) -> Self;

    /// `(self * other) mod modulus`, without ever materializing the full (possibly >64-bit)
    /// product.
    fn gf2_mulmod(self, other: Self, modulus: Self) -> Self;

    /// Greatest common divisor via the Euclidean algorithm over GF(2)[x].
    fn gf2_gcd(self, other: Self) -> Self;

    /// Ben-Or irreducibility test.
    fn is_irreducible(self) -> bool;
}

impl Gf2Poly for u64 {
    fn degree(self) -> i32 {
        if self == 0 {
            -1
        } else {
            63 - self.leading_zeros() as i32
        }
    }

    fn gf2_mod(self, modulus: Self) -> Self {
        assert_ne!(modulus, 0, "cannot reduce modulo the zero polynomial");
        let mut p = self;
        let md = modulus.degree();
        while p.degree() >= md {
            p ^= modulus << (p.degree() - md);
        }
        p
    }

    fn gf2_add(self, other: Self) -> Self {
        self ^ other
    }

    fn gf2_mulmod(self, other: Self, modulus: Self) -> Self {
        if self == 0 || other == 0 {
            return 0;
        }

        let mut res: u64 = 0;
        let mut a = self;
        let mut b = other;

        if b & 1 > 0 {
            res = res.gf2_add(a).gf2_mod(modulus);
        }
        while b != 0 {
            a = (a << 1).gf2_mod(modulus);
            b >>= 1;
            if b & 1 > 0 {
                res = res.gf2_add(a).gf2_mod(modulus);
            }
        }

        res
    }

    fn gf2_gcd(self, other: Self) -> Self {
        let (mut a, mut b) = (self, other);
        loop {
            if b == 0 {
                return a;
            }
            if a == 0 {
                return b;
            }
            if a.degree() < b.degree() {
                std::mem::swap(&mut a, &mut b);
            }
            let r = a.gf2_mod(b);
            a = b;
            b = r;
        }
    }

    // For details see "Tests and Constructions of Irreducible Polynomials over Finite Fields".
    // Go reference: https://github.com/restic/chunker/blob/master/polynomials.go
    fn is_irreducible(self) -> bool {
        let d = self.degree();
        if d <= 0 {
            return false;
        }
        for k in 1..=(d / 2) {
            if self.gf2_gcd(qp(k, self)) != 1 {
                return false;
            }
        }
        true
    }
}

/// Computes `x^(2^p) - x mod g` (equivalently `+`, over GF(2)) by repeated squaring, starting
/// from `x` itself. Only needed up to `p <= degree/2` for the irreducibility test.
fn qp(p: i32, g: u64) -> u64 {
    let mut res: u64 = 2; // x
    for _ in 0..p {
        res = res.gf2_mulmod(res, g);
    }
    res.gf2_add(2).gf2_mod(g)
}

/// A GF(2) polynomial known to have degree exactly [`POLY_DEGREE`], the shape required of a
/// modulus for the rolling fingerprint in [`crate::chunker::Chunker`].
///
/// Construction (via [`TryFrom<u64>`]) only checks the degree; it does not re-verify
/// irreducibility. Callers are expected to supply either a polynomial obtained from
/// [`random_polynomial`] or a known-good fixed constant.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Polynomial(u64);

impl Polynomial {
    /// The raw bit pattern: bit `i` is the coefficient of `x^i`.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for Polynomial {
    type Error = ChunkerError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        let degree = value.degree();
        if degree != POLY_DEGREE {
            return Err(ChunkerError::InvalidPolynomial { degree });
        }
        Ok(Polynomial(value))
    }
}

impl fmt::Debug for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Polynomial(0x{:016x})", self.0)
    }
}

/// Draws a random irreducible polynomial of degree [`POLY_DEGREE`] from a cryptographic RNG.
///
/// Forces bit 53 (the degree) and bit 0 (so the constant term is nonzero, a necessary condition
/// for irreducibility of anything but `x` itself), then retries against [`Gf2Poly::is_irreducible`]
/// until a hit or the retry budget is exhausted.
pub fn random_polynomial() -> Result<Polynomial, ChunkerError> {
    let mut rng = OsRng;
    for attempt in 0..RANDOM_POLY_MAX_TRIES {
        let mut candidate = rng.next_u64();
        candidate &= (1u64 << (POLY_DEGREE + 1)) - 1;
        candidate |= (1u64 << POLY_DEGREE) | 1;

        if candidate.is_irreducible() {
            log::debug!(
                "random_polynomial: found irreducible candidate 0x{:016x} after {} attempt(s)",
                candidate,
                attempt + 1
            );
            return Polynomial::try_from(candidate);
        }
    }
    Err(ChunkerError::RandomnessUnavailable)
}
