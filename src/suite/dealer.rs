//! A trusted dealer simulated by every party from a common seed.
//!
//! All parties construct a [`FakeDealer`] from the same seed and draw from it in the same order,
//! so they agree on the correlated randomness without communicating. Every party can compute
//! every other party's shares, which makes this useful for tests and simulations only.

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::{
    error::{Error, StateError},
    ring::{Ring, RingElement, RingError},
};

/// One party's shares of a multiplication triple `c = a * b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triple {
    /// Share of `a`.
    pub a: RingElement,
    /// Share of `b`.
    pub b: RingElement,
    /// Share of `a * b`.
    pub c: RingElement,
}

/// One party's share of a random input mask, plus the mask itself for its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputMask {
    /// This party's share of the mask.
    pub share: RingElement,
    /// The mask, only known to the owner of the input.
    pub mask: Option<RingElement>,
}

/// Deals additive shares, triples and input masks from a seeded generator.
#[derive(Debug, Clone)]
pub struct FakeDealer {
    rng: ChaCha20Rng,
    ring: Ring,
    parties: usize,
}

impl FakeDealer {
    /// A dealer for `parties` parties over `ring`.
    pub fn new(seed: [u8; 32], ring: Ring, parties: usize) -> Self {
        Self {
            rng: ChaCha20Rng::from_seed(seed),
            ring,
            parties,
        }
    }

    /// The ring all dealt values live in.
    pub fn ring(&self) -> Ring {
        self.ring
    }

    /// Splits `value` into one additive share per party.
    pub fn share(&mut self, value: RingElement) -> Result<Vec<RingElement>, RingError> {
        let mut shares = Vec::with_capacity(self.parties);
        let mut rest = value.convert(self.ring);
        for _ in 1..self.parties {
            let share = self.ring.random(&mut self.rng);
            rest = rest.sub(&share)?;
            shares.push(share);
        }
        shares.push(rest);
        Ok(shares)
    }

    /// Draws a random element and shares it.
    fn random_shared(&mut self) -> Result<(RingElement, Vec<RingElement>), RingError> {
        let value = self.ring.random(&mut self.rng);
        let shares = self.share(value)?;
        Ok((value, shares))
    }

    /// The number of parties shares are dealt to.
    pub fn parties(&self) -> usize {
        self.parties
    }

    fn check_party(&self, party: usize) -> Result<(), StateError> {
        if party < self.parties {
            Ok(())
        } else {
            Err(StateError::InvalidParty {
                party,
                parties: self.parties,
            })
        }
    }

    /// The next multiplication triple, as seen by `party`.
    pub fn next_triple(&mut self, party: usize) -> Result<Triple, Error> {
        self.check_party(party)?;
        let (a, a_shares) = self.random_shared()?;
        let (b, b_shares) = self.random_shared()?;
        let c_shares = self.share(a.mul(&b)?)?;
        Ok(Triple {
            a: a_shares[party],
            b: b_shares[party],
            c: c_shares[party],
        })
    }

    /// The next input mask for an input of `owner`, as seen by `party`.
    pub fn next_input_mask(&mut self, party: usize, owner: usize) -> Result<InputMask, Error> {
        self.check_party(party)?;
        let (mask, shares) = self.random_shared()?;
        Ok(InputMask {
            share: shares[party],
            mask: (party == owner).then_some(mask),
        })
    }
}
