//! Hash-based commitments to byte strings.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// The number of random bytes mixed into every commitment.
pub const NONCE_LEN: usize = 32;

/// Represents a cryptographic commitment as a fixed-size 32-byte array (a BLAKE3 hash).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commitment(pub(crate) [u8; 32]);

/// The data revealed to open a [`Commitment`]: the committed value and the nonce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Opening {
    value: Vec<u8>,
    nonce: [u8; NONCE_LEN],
}

fn digest(nonce: &[u8; NONCE_LEN], value: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(nonce);
    hasher.update(value);
    hasher.finalize().into()
}

/// Commits to a value, drawing the nonce from `rng`.
pub fn commit(rng: &mut impl RngCore, value: &[u8]) -> (Commitment, Opening) {
    let mut nonce = [0; NONCE_LEN];
    rng.fill_bytes(&mut nonce);
    let commitment = Commitment(digest(&nonce, value));
    let opening = Opening {
        value: value.to_vec(),
        nonce,
    };
    (commitment, opening)
}

impl Commitment {
    /// Returns true if `opening` reveals the committed value.
    pub fn verify(&self, opening: &Opening) -> bool {
        let expected = digest(&opening.nonce, &opening.value);
        expected.as_slice().ct_eq(self.0.as_slice()).into()
    }

    /// Returns the committed value if `opening` matches this commitment.
    pub fn open(&self, opening: Opening) -> Option<Vec<u8>> {
        self.verify(&opening).then_some(opening.value)
    }

    /// The 32 bytes of the hash.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Parses a commitment, which must be exactly 32 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Commitment)
    }
}

impl Opening {
    /// The committed value.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Serializes as the value followed by the nonce.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.value.len() + NONCE_LEN);
        bytes.extend_from_slice(&self.value);
        bytes.extend_from_slice(&self.nonce);
        bytes
    }

    /// Parses an opening serialized with [`Opening::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let split = bytes.len().checked_sub(NONCE_LEN)?;
        let (value, nonce) = bytes.split_at(split);
        Some(Self {
            value: value.to_vec(),
            nonce: nonce.try_into().ok()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn commitment_opens_to_its_value() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let (commitment, opening) = commit(&mut rng, b"hello");
        let parsed = Opening::from_bytes(&opening.to_bytes()).unwrap();
        assert_eq!(parsed, opening);
        assert_eq!(commitment.open(parsed), Some(b"hello".to_vec()));
        assert_eq!(
            Commitment::from_bytes(&commitment.to_bytes()),
            Some(commitment)
        );
        assert_eq!(Commitment::from_bytes(&[0; 31]), None);
        assert_eq!(Opening::from_bytes(&[0; 31]), None);
    }

    #[test]
    fn commitments_hide_equal_values() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let (a, _) = commit(&mut rng, b"same");
        let (b, _) = commit(&mut rng, b"same");
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn commitment_is_binding(seed: u64, b1: Vec<u8>, b2: Vec<u8>) {
            prop_assume!(b1 != b2);
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let (commitment, opening) = commit(&mut rng, &b1);
            let (_, other) = commit(&mut rng, &b2);
            let forged = Opening { value: b2.clone(), nonce: opening.nonce };
            prop_assert!(!commitment.verify(&other));
            prop_assert_eq!(commitment.open(forged), None);
            prop_assert_eq!(commitment.open(opening), Some(b1));
        }
    }
}
