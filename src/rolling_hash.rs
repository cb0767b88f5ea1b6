// Precomputed per-polynomial lookup tables and the sliding-window Rabin fingerprint built on
// top of them.
//
// This goes along the same lines as restic/chunker's `rabinkarp64.go` and rustic_core's
// `cdc::rolling_hash::Rabin64`: a fixed-size ring buffer of the last [`WINDOW_SIZE`] bytes, plus a
// pair of 256-entry tables that let both "push a byte in" and "push a byte out" be done in O(1)
// regardless of window size.

use std::rc::Rc;

use crate::poly::{Gf2Poly, Polynomial};

/// Number of trailing bytes the rolling fingerprint is sensitive to.
pub const WINDOW_SIZE: usize = 64;
const WINDOW_MASK: usize = WINDOW_SIZE - 1;

/// Lookup tables derived once from a [`Polynomial`].
///
/// Shared (read-only) across chunkers, and across `reset` calls that keep the same polynomial, via
/// `Rc` so recomputing 512 table entries only happens when the polynomial actually changes.
pub struct Tables {
    polynomial: Polynomial,
    polynomial_shift: i32,
    out_table: [u64; 256],
    mod_table: [u64; 256],
}

impl Tables {
    pub fn new(polynomial: Polynomial) -> Rc<Self> {
        let p = polynomial.value();
        let k = p.degree();
        let mod_table = Self::calculate_mod_table(p, k);
        let out_table = Self::calculate_out_table(p, &mod_table);

        log::trace!("rolling_hash: derived tables for {:?}", polynomial);
        Rc::new(Tables {
            polynomial,
            polynomial_shift: k - 8,
            out_table,
            mod_table,
        })
    }

    /// `mod_table[b] = (b * x^k) mod p`, folded together with the high bits it cancels so a
    /// single XOR in [`RollingFingerprint::slide`] both inserts a byte and reduces mod `p`.
    fn calculate_mod_table(p: u64, k: i32) -> [u64; 256] {
        let mut mod_table = [0u64; 256];
        for (b, entry) in mod_table.iter_mut().enumerate() {
            let shifted = (b as u64) << k;
            *entry = shifted.gf2_mod(p) | shifted;
        }
        mod_table
    }

    /// `out_table[b] = b * x^(8*(W-1)) mod p`: what a byte still contributes to the digest by
    /// the time it is about to leave the trailing edge of the window.
    ///
    /// Built once per polynomial, so there's no need for the O(1) `mod_table` trick here: each
    /// step just reduces with a plain (if O(degree)) `gf2_mod`.
    fn calculate_out_table(p: u64, _mod_table: &[u64; 256]) -> [u64; 256] {
        let mut out_table = [0u64; 256];
        for (b, entry) in out_table.iter_mut().enumerate() {
            let mut hash = (b as u64).gf2_mod(p);
            for _ in 0..WINDOW_SIZE - 1 {
                hash = (hash << 8).gf2_mod(p);
            }
            *entry = hash;
        }
        out_table
    }

    pub fn polynomial(&self) -> Polynomial {
        self.polynomial
    }
}

/// The sliding-window Rabin fingerprint of the most recent [`WINDOW_SIZE`] bytes fed to it.
///
/// Bundles the ring buffer, the write cursor into it, and the running digest together, per the
/// "keep tightly coupled state in one struct" design guidance: these three fields only ever
/// change in lockstep.
pub struct RollingFingerprint {
    tables: Rc<Tables>,
    window: [u8; WINDOW_SIZE],
    window_pos: usize,
    digest: u64,
}

impl RollingFingerprint {
    pub fn new(tables: Rc<Tables>) -> Self {
        RollingFingerprint {
            tables,
            window: [0; WINDOW_SIZE],
            window_pos: 0,
            digest: 0,
        }
    }

    /// Resets the digest and window to their just-constructed state, keeping the same tables.
    pub fn reset(&mut self) {
        self.window = [0; WINDOW_SIZE];
        self.window_pos = 0;
        self.digest = 0;
    }

    pub fn tables(&self) -> &Rc<Tables> {
        &self.tables
    }

    pub fn digest(&self) -> u64 {
        self.digest
    }

    /// Feeds a byte into the window during priming: no byte has left the window yet, so only
    /// the insert-and-reduce half of the slide step applies.
    pub fn prime(&mut self, byte: u8) {
        let mod_index = (self.digest >> self.tables.polynomial_shift) & 0xff;
        self.digest <<= 8;
        self.digest |= u64::from(byte);
        self.digest ^= self.tables.mod_table[mod_index as usize];

        self.window[self.window_pos] = byte;
        self.window_pos = (self.window_pos + 1) & WINDOW_MASK;
    }

    /// Slides the window forward by one byte: the oldest byte in the window leaves, `byte`
    /// enters, and the digest is updated in O(1) using the precomputed tables.
    #[inline]
    pub fn slide(&mut self, byte: u8) {
        let leaving = self.window[self.window_pos];
        self.digest ^= self.tables.out_table[leaving as usize];

        let mod_index = (self.digest >> self.tables.polynomial_shift) & 0xff;
        self.digest <<= 8;
        self.digest |= u64::from(byte);
        self.digest ^= self.tables.mod_table[mod_index as usize];

        self.window[self.window_pos] = byte;
        self.window_pos = (self.window_pos + 1) & WINDOW_MASK;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryFrom;

    const TEST_POLYNOMIAL: u64 = 0x3DA3358B4DC173;

    fn tables() -> Rc<Tables> {
        Tables::new(Polynomial::try_from(TEST_POLYNOMIAL).unwrap())
    }

    #[test]
    fn tables_are_a_pure_function_of_the_polynomial() {
        let a = tables();
        let b = tables();
        assert_eq!(a.out_table.to_vec(), b.out_table.to_vec());
        assert_eq!(a.mod_table.to_vec(), b.mod_table.to_vec());
        assert_eq!(a.polynomial(), b.polynomial());
    }

    #[test]
    fn priming_then_sliding_matches_priming_the_shifted_window_directly() {
        // The digest after priming with bytes [0..64) and then sliding one more byte in must
        // equal the digest of priming directly with bytes [1..65): both represent "the
        // fingerprint of the last 64 bytes fed in".
        let data: Vec<u8> = (0..65u32).map(|i| (i % 251) as u8).collect();

        let mut rolled = RollingFingerprint::new(tables());
        for &b in &data[0..WINDOW_SIZE] {
            rolled.prime(b);
        }
        rolled.slide(data[WINDOW_SIZE]);

        let mut fresh = RollingFingerprint::new(tables());
        for &b in &data[1..WINDOW_SIZE + 1] {
            fresh.prime(b);
        }

        assert_eq!(rolled.digest(), fresh.digest());
    }

    #[test]
    fn reset_returns_to_zero_digest() {
        let mut fp = RollingFingerprint::new(tables());
        for b in 0..200u32 {
            fp.slide(b as u8);
        }
        assert_ne!(fp.digest(), 0);
        fp.reset();
        assert_eq!(fp.digest(), 0);
    }

    #[test]
    fn all_zero_bytes_keep_digest_at_zero() {
        let mut fp = RollingFingerprint::new(tables());
        for _ in 0..1000 {
            fp.prime(0);
        }
        assert_eq!(fp.digest(), 0);
        fp.slide(0);
        assert_eq!(fp.digest(), 0);
    }
}
