//! Fixed-width modular integers shared by all protocol suites.
//!
//! A [`Ring`] is either `Z/2^k` for `1 <= k <= 128` or `Z/m` for a small modulus `2 <= m < 2^64`.
//! Arithmetic wraps around the modulus; there is no overflow signalling. Elements of different
//! rings are never combined implicitly, every binary operation checks that both operands live in
//! the same ring and conversions go through [`RingElement::convert`].

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Errors caused by operating on ring elements outside of their domain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
    /// The operands of a binary operation live in different rings.
    #[error("cannot combine elements of {left} and {right}")]
    Mismatch {
        /// The ring of the left operand.
        left: Ring,
        /// The ring of the right operand.
        right: Ring,
    },
    /// Power-of-two rings must have a bit width between 1 and 128.
    #[error("invalid bit width {0}, expected 1..=128")]
    InvalidWidth(u32),
    /// Small moduli must be at least 2.
    #[error("invalid modulus {0}, expected at least 2")]
    InvalidModulus(u64),
    /// A bit index was not smaller than the bit width of the ring.
    #[error("bit index {index} is out of range for a {width}-bit ring")]
    BitIndexOutOfRange {
        /// The requested bit index.
        index: u32,
        /// The bit width of the ring.
        width: u32,
    },
    /// A serialized element did not have the exact byte length of its ring.
    #[error("expected {expected} bytes, but got {actual}")]
    WrongByteLength {
        /// Number of bytes required by the ring.
        expected: usize,
        /// Number of bytes actually found.
        actual: usize,
    },
    /// A serialized element is not reduced modulo its ring.
    #[error("value is not a reduced element of {0}")]
    ValueOutOfRange(Ring),
    /// The operation is only defined for `Z/2^k`.
    #[error("{0} is not a power-of-two ring")]
    NotPowerOfTwo(Ring),
    /// A split position must lie strictly inside the bit width.
    #[error("cannot split a {width}-bit element at bit {at}")]
    SplitOutOfRange {
        /// The requested split position.
        at: u32,
        /// The bit width of the ring.
        width: u32,
    },
}

/// The modulus of a [`Ring`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modulus {
    /// `Z/2^k`, holding the bit width `k`.
    PowerOfTwo(u32),
    /// `Z/m` for a modulus that is not a power of two.
    Small(u64),
}

/// A ring of integers modulo a power of two or a small modulus.
///
/// Deserialization goes through [`Ring::power_of_two`] and [`Ring::modulo`], so invalid widths
/// and moduli are rejected and powers of two are normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRing")]
pub struct Ring {
    modulus: Modulus,
}

#[derive(Deserialize)]
struct RawRing {
    modulus: Modulus,
}

impl TryFrom<RawRing> for Ring {
    type Error = RingError;

    fn try_from(raw: RawRing) -> Result<Self, Self::Error> {
        match raw.modulus {
            Modulus::PowerOfTwo(bits) => Ring::power_of_two(bits),
            Modulus::Small(m) => Ring::modulo(m),
        }
    }
}

impl fmt::Display for Ring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.modulus {
            Modulus::PowerOfTwo(k) => write!(f, "Z/2^{k}"),
            Modulus::Small(m) => write!(f, "Z/{m}"),
        }
    }
}

impl Ring {
    /// The ring `Z/2^bits`.
    pub fn power_of_two(bits: u32) -> Result<Self, RingError> {
        if bits == 0 || bits > 128 {
            return Err(RingError::InvalidWidth(bits));
        }
        Ok(Self {
            modulus: Modulus::PowerOfTwo(bits),
        })
    }

    /// The ring `Z/m`.
    ///
    /// Powers of two are normalized, so `Ring::modulo(256) == Ring::power_of_two(8)`.
    pub fn modulo(m: u64) -> Result<Self, RingError> {
        if m < 2 {
            return Err(RingError::InvalidModulus(m));
        }
        if m.is_power_of_two() {
            return Self::power_of_two(m.trailing_zeros());
        }
        Ok(Self {
            modulus: Modulus::Small(m),
        })
    }

    /// The modulus of this ring.
    pub fn modulus(&self) -> Modulus {
        self.modulus
    }

    /// Returns true for `Z/2^k`.
    pub fn is_power_of_two(&self) -> bool {
        matches!(self.modulus, Modulus::PowerOfTwo(_))
    }

    /// The number of bits needed to represent every element.
    pub fn bit_width(&self) -> u32 {
        match self.modulus {
            Modulus::PowerOfTwo(k) => k,
            Modulus::Small(m) => u64::BITS - (m - 1).leading_zeros(),
        }
    }

    /// The number of bytes of a serialized element, `ceil(bit_width / 8)`.
    pub fn byte_len(&self) -> usize {
        self.bit_width().div_ceil(8) as usize
    }

    /// Reduces an arbitrary value into the canonical range of the ring.
    pub fn reduce(&self, value: u128) -> u128 {
        match self.modulus {
            Modulus::PowerOfTwo(128) => value,
            Modulus::PowerOfTwo(k) => value & ((1u128 << k) - 1),
            Modulus::Small(m) => value % m as u128,
        }
    }

    fn contains(&self, value: u128) -> bool {
        self.reduce(value) == value
    }

    /// Creates an element, reducing the value modulo the ring.
    pub fn element(&self, value: u128) -> RingElement {
        RingElement {
            value: self.reduce(value),
            ring: *self,
        }
    }

    /// The additive identity.
    pub fn zero(&self) -> RingElement {
        self.element(0)
    }

    /// The multiplicative identity.
    pub fn one(&self) -> RingElement {
        self.element(1)
    }

    /// The element `2`, which is `0` in `Z/2`.
    pub fn two(&self) -> RingElement {
        self.element(2)
    }

    /// Maps a signed integer to its residue class.
    pub fn from_signed(&self, value: i128) -> RingElement {
        match self.modulus {
            // two's complement already is the residue modulo 2^128
            Modulus::PowerOfTwo(_) => self.element(value as u128),
            Modulus::Small(m) => self.element(value.rem_euclid(m as i128) as u128),
        }
    }

    /// Deserializes an element from exactly [`Ring::byte_len`] big-endian bytes.
    pub fn from_bytes(&self, bytes: &[u8]) -> Result<RingElement, RingError> {
        let expected = self.byte_len();
        if bytes.len() != expected {
            return Err(RingError::WrongByteLength {
                expected,
                actual: bytes.len(),
            });
        }
        let mut buf = [0u8; 16];
        buf[16 - expected..].copy_from_slice(bytes);
        let value = u128::from_be_bytes(buf);
        if !self.contains(value) {
            return Err(RingError::ValueOutOfRange(*self));
        }
        Ok(RingElement { value, ring: *self })
    }

    /// Recomposes an element from bits in most-significant-first order.
    ///
    /// This is the inverse of [`RingElement::to_bits`].
    pub fn from_bits(&self, bits: &[RingElement]) -> Result<RingElement, RingError> {
        let two = self.two();
        let mut acc = self.zero();
        for bit in bits {
            acc = acc.mul(&two)?.add(bit)?;
        }
        Ok(acc)
    }

    /// The table `[1, 2, 4, ..., 2^(n-1)]` reduced modulo the ring.
    pub fn powers_of_two(&self, n: usize) -> Vec<RingElement> {
        let mut powers = Vec::with_capacity(n);
        let mut current = self.one();
        for _ in 0..n {
            powers.push(current);
            current = current.double();
        }
        powers
    }

    /// Samples a uniformly random element.
    pub fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> RingElement {
        match self.modulus {
            Modulus::PowerOfTwo(_) => self.element(rng.random::<u128>()),
            Modulus::Small(m) => self.element(rng.random_range(0..m) as u128),
        }
    }
}

/// An element of a [`Ring`], always stored in its canonical reduced form.
///
/// Deserializing a value that is not reduced fails with [`RingError::ValueOutOfRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawElement")]
pub struct RingElement {
    value: u128,
    ring: Ring,
}

#[derive(Deserialize)]
struct RawElement {
    value: u128,
    ring: Ring,
}

impl TryFrom<RawElement> for RingElement {
    type Error = RingError;

    fn try_from(raw: RawElement) -> Result<Self, Self::Error> {
        if !raw.ring.contains(raw.value) {
            return Err(RingError::ValueOutOfRange(raw.ring));
        }
        Ok(RingElement {
            value: raw.value,
            ring: raw.ring,
        })
    }
}

impl fmt::Display for RingElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (mod {})", self.value, self.ring)
    }
}

impl RingElement {
    /// The canonical representative in `0..modulus`.
    pub fn value(&self) -> u128 {
        self.value
    }

    /// The ring this element lives in.
    pub fn ring(&self) -> Ring {
        self.ring
    }

    fn check(&self, other: &Self) -> Result<(), RingError> {
        if self.ring == other.ring {
            Ok(())
        } else {
            Err(RingError::Mismatch {
                left: self.ring,
                right: other.ring,
            })
        }
    }

    /// Modular addition.
    pub fn add(&self, other: &Self) -> Result<Self, RingError> {
        self.check(other)?;
        let value = match self.ring.modulus {
            Modulus::PowerOfTwo(_) => self.value.wrapping_add(other.value),
            // both operands are below 2^64, so the sum cannot overflow
            Modulus::Small(_) => self.value + other.value,
        };
        Ok(self.ring.element(value))
    }

    /// Modular subtraction.
    pub fn sub(&self, other: &Self) -> Result<Self, RingError> {
        self.check(other)?;
        let value = match self.ring.modulus {
            Modulus::PowerOfTwo(_) => self.value.wrapping_sub(other.value),
            Modulus::Small(m) => self.value + m as u128 - other.value,
        };
        Ok(self.ring.element(value))
    }

    /// Modular multiplication.
    pub fn mul(&self, other: &Self) -> Result<Self, RingError> {
        self.check(other)?;
        // 2^k divides 2^128, and small moduli keep the product below 2^128
        Ok(self.ring.element(self.value.wrapping_mul(other.value)))
    }

    /// The additive inverse.
    pub fn neg(&self) -> Self {
        match self.ring.modulus {
            Modulus::PowerOfTwo(_) => self.ring.element(self.value.wrapping_neg()),
            Modulus::Small(m) => self.ring.element(m as u128 - self.value),
        }
    }

    fn double(&self) -> Self {
        match self.ring.modulus {
            Modulus::PowerOfTwo(_) => self.ring.element(self.value << 1),
            Modulus::Small(_) => self.ring.element(self.value * 2),
        }
    }

    /// Returns bit `index` of the canonical representative, counting from the least significant.
    pub fn test_bit(&self, index: u32) -> Result<bool, RingError> {
        let width = self.ring.bit_width();
        if index >= width {
            return Err(RingError::BitIndexOutOfRange { index, width });
        }
        Ok((self.value >> index) & 1 == 1)
    }

    /// Decomposes the lowest `n` bits into ring elements `0` or `1`.
    ///
    /// Bits are extracted least significant first and then reversed, so the returned vector is
    /// in most-significant-first order.
    pub fn to_bits(&self, n: u32) -> Result<Vec<RingElement>, RingError> {
        let width = self.ring.bit_width();
        if n > width {
            return Err(RingError::BitIndexOutOfRange { index: n, width });
        }
        let mut bits = Vec::with_capacity(n as usize);
        for i in 0..n {
            let bit = self.test_bit(i)?;
            bits.push(self.ring.element(bit as u128));
        }
        bits.reverse();
        Ok(bits)
    }

    /// Serializes to exactly [`Ring::byte_len`] big-endian, zero-padded bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.ring.byte_len();
        self.value.to_be_bytes()[16 - len..].to_vec()
    }

    /// Splits an element of `Z/2^w` into `(low, high)` with `low` in `Z/2^at` and `high` in
    /// `Z/2^(w - at)`, such that `self = high * 2^at + low`.
    pub fn split(&self, at: u32) -> Result<(RingElement, RingElement), RingError> {
        let Modulus::PowerOfTwo(width) = self.ring.modulus else {
            return Err(RingError::NotPowerOfTwo(self.ring));
        };
        if at == 0 || at >= width {
            return Err(RingError::SplitOutOfRange { at, width });
        }
        let low = Ring::power_of_two(at)?.element(self.value);
        let high = Ring::power_of_two(width - at)?.element(self.value >> at);
        Ok((low, high))
    }

    /// The lowest `bits` bits as an element of `Z/2^bits`.
    pub fn low(&self, bits: u32) -> Result<RingElement, RingError> {
        self.split(bits).map(|(low, _)| low)
    }

    /// The bits above position `at` as an element of `Z/2^(w - at)`.
    pub fn high(&self, at: u32) -> Result<RingElement, RingError> {
        self.split(at).map(|(_, high)| high)
    }

    /// Reinterprets the canonical representative in another ring, reducing it if necessary.
    pub fn convert(&self, ring: Ring) -> RingElement {
        ring.element(self.value)
    }

    /// The centered representative in `[-floor(m/2), ceil(m/2))` for modulus `m`.
    ///
    /// For even moduli, `m/2` maps to `-m/2`.
    pub fn to_signed(&self) -> i128 {
        match self.ring.modulus {
            Modulus::PowerOfTwo(128) => self.value as i128,
            Modulus::PowerOfTwo(k) => {
                if self.value >> (k - 1) == 1 {
                    self.value as i128 - (1i128 << k)
                } else {
                    self.value as i128
                }
            }
            Modulus::Small(m) => {
                if self.value > (m as u128 - 1) / 2 {
                    self.value as i128 - m as i128
                } else {
                    self.value as i128
                }
            }
        }
    }
}
