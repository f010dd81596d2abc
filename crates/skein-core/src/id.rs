//! 512-bit ring identifiers.
//!
//! A [`SwarmId`] names both a position on the overlay ring and a piece of
//! content (the SHA3-512 of the content bytes). The ring is the cyclic group
//! of 512-bit integers under addition mod 2^512; all routing decisions are
//! phrased through [`SwarmId::in_range`].

use std::cmp::Ordering;
use std::fmt;

use crate::error::IdError;

/// A 512-bit ring identifier, stored as 64 bytes little-endian.
///
/// The all-zero identifier is reserved: it addresses the pool's service
/// node, marks "unknown" in wire responses, and stands in for bootstrap
/// peers whose real identifier has not been learned yet.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwarmId(pub [u8; 64]);

impl SwarmId {
    /// Serialized size in bytes.
    pub const BYTES: usize = 64;

    /// Ring width in bits.
    pub const BITS: u32 = 512;

    /// The reserved all-zero identifier.
    pub const ZERO: Self = Self([0u8; 64]);

    /// Create an identifier from raw little-endian bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Return the underlying little-endian bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Check if this is the reserved zero identifier.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 64]
    }

    /// Parse an identifier from exactly 128 hex digits.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        if s.len() != Self::BYTES * 2 {
            return Err(IdError::InvalidLength {
                got: s.len(),
                expected: Self::BYTES * 2,
            });
        }
        let mut bytes = [0u8; 64];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| IdError::InvalidHex)?;
        Ok(Self(bytes))
    }

    /// Format the full identifier as 128 lowercase hex digits.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Advance by a signed offset modulo 2^512.
    ///
    /// `advance(-1)` yields the ring-predecessor of `self`.
    pub fn advance(&self, delta: i64) -> Self {
        if delta >= 0 {
            self.wrapping_add_small(delta as u64)
        } else {
            self.wrapping_sub_small(delta.unsigned_abs())
        }
    }

    /// Advance by 2^bit modulo 2^512. `bit` must be below 512.
    ///
    /// Finger ideals are `self + 2^(502+i)`, which no small integer covers.
    pub fn advance_pow2(&self, bit: u32) -> Self {
        debug_assert!(bit < Self::BITS);
        let mut limbs = self.limbs();
        let idx = (bit / 64) as usize;
        let (r, mut carry) = limbs[idx].overflowing_add(1u64 << (bit % 64));
        limbs[idx] = r;
        for limb in limbs.iter_mut().skip(idx + 1) {
            if !carry {
                break;
            }
            let (r, c) = limb.overflowing_add(1);
            *limb = r;
            carry = c;
        }
        Self::from_limbs(limbs)
    }

    /// True iff `self` lies strictly between `left` and `right` moving
    /// clockwise, excluding both endpoints.
    ///
    /// With `d(x, y) = (y - x) mod 2^512`, this is
    /// `d(left, self) < d(left, right)` with both equalities excluded.
    /// The interval degenerates to empty when `left == right`.
    pub fn in_range(&self, left: &SwarmId, right: &SwarmId) -> bool {
        self != left && self != right && self.wrapping_sub(left) < right.wrapping_sub(left)
    }

    /// Clockwise distance `(self - other) mod 2^512`.
    fn wrapping_sub(&self, other: &SwarmId) -> SwarmId {
        let a = self.limbs();
        let b = other.limbs();
        let mut out = [0u64; 8];
        let mut borrow = false;
        for i in 0..8 {
            let (r1, b1) = a[i].overflowing_sub(b[i]);
            let (r2, b2) = r1.overflowing_sub(borrow as u64);
            out[i] = r2;
            borrow = b1 || b2;
        }
        Self::from_limbs(out)
    }

    fn wrapping_add_small(&self, v: u64) -> Self {
        let mut limbs = self.limbs();
        let (r, mut carry) = limbs[0].overflowing_add(v);
        limbs[0] = r;
        for limb in limbs.iter_mut().skip(1) {
            if !carry {
                break;
            }
            let (r, c) = limb.overflowing_add(1);
            *limb = r;
            carry = c;
        }
        Self::from_limbs(limbs)
    }

    fn wrapping_sub_small(&self, v: u64) -> Self {
        let mut limbs = self.limbs();
        let (r, mut borrow) = limbs[0].overflowing_sub(v);
        limbs[0] = r;
        for limb in limbs.iter_mut().skip(1) {
            if !borrow {
                break;
            }
            let (r, b) = limb.overflowing_sub(1);
            *limb = r;
            borrow = b;
        }
        Self::from_limbs(limbs)
    }

    fn limbs(&self) -> [u64; 8] {
        let mut limbs = [0u64; 8];
        for (i, chunk) in self.0.chunks_exact(8).enumerate() {
            limbs[i] = u64::from_le_bytes(chunk.try_into().expect("8-byte chunk"));
        }
        limbs
    }

    fn from_limbs(limbs: [u64; 8]) -> Self {
        let mut bytes = [0u8; 64];
        for (i, limb) in limbs.iter().enumerate() {
            bytes[i * 8..(i + 1) * 8].copy_from_slice(&limb.to_le_bytes());
        }
        Self(bytes)
    }
}

impl Ord for SwarmId {
    /// Numeric order: most significant byte is last in memory.
    fn cmp(&self, other: &Self) -> Ordering {
        for i in (0..Self::BYTES).rev() {
            match self.0[i].cmp(&other.0[i]) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for SwarmId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SwarmId {
    /// Abbreviated form: first and last three bytes, e.g. `a1b2c3...d4e5f6`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}...{}",
            hex::encode(&self.0[..3]),
            hex::encode(&self.0[Self::BYTES - 3..])
        )
    }
}

impl fmt::Debug for SwarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SwarmId({self})")
    }
}

impl From<[u8; 64]> for SwarmId {
    fn from(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for SwarmId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
