//! Broadcast among all parties, with validation and commit-then-open.
//!
//! [`AllBroadcast`] naively sends a value to every party. A malicious sender may send different
//! values to different parties, so for more than two parties [`broadcast`] follows it with a
//! [`BroadcastValidation`], in which every party echoes a hash of what it received. On top of
//! this, [`commit_and_open`] makes every party commit to its value before any value is revealed,
//! which [`coin_toss`] uses to derive shared randomness.

use subtle::ConstantTimeEq;
use tracing::debug;

use crate::{
    builder::{Builder, Deferred},
    channel::{self, ErrorKind},
    commitment::{Commitment, Opening, commit},
    error::{ConsistencyError, Error, StateError},
    protocol::{EvaluationStatus, NativeProtocol, Output, Protocol, RoundContext, Suite},
};

/// Sends a byte string to all parties and receives one from each, in party order.
///
/// Takes two rounds: the value is sent in round 0 and the values of all parties are read in
/// round 1.
#[derive(Debug)]
pub struct AllBroadcast {
    input: Deferred<Vec<u8>>,
    state: AllBroadcastState,
}

#[derive(Debug)]
enum AllBroadcastState {
    Send,
    Receive,
    Done(Option<Vec<Vec<u8>>>),
}

impl AllBroadcast {
    /// Broadcasts the value of `input`.
    pub fn new(input: Deferred<Vec<u8>>) -> Self {
        Self {
            input,
            state: AllBroadcastState::Send,
        }
    }
}

impl<S: Suite> NativeProtocol<S> for AllBroadcast {
    fn evaluate(
        &mut self,
        _round: usize,
        ctx: &mut RoundContext<'_, S>,
    ) -> Result<EvaluationStatus, Error> {
        match self.state {
            AllBroadcastState::Send => {
                let value = ctx.value(self.input)?.clone();
                ctx.network().send_to_all(value);
                self.state = AllBroadcastState::Receive;
                Ok(EvaluationStatus::HasMoreRounds)
            }
            AllBroadcastState::Receive => {
                let values = ctx.network().receive_from_all()?;
                self.state = AllBroadcastState::Done(Some(values));
                Ok(EvaluationStatus::IsDone)
            }
            AllBroadcastState::Done(_) => Err(StateError::AlreadyDone.into()),
        }
    }

    fn out(&mut self) -> Result<Output, Error> {
        match &mut self.state {
            AllBroadcastState::Done(values) => {
                let values = values.take().ok_or(StateError::OutputNotReady)?;
                Ok(Box::new(values))
            }
            _ => Err(StateError::OutputNotReady.into()),
        }
    }
}

/// Checks that every party received the same broadcast values, outputting them unchanged.
///
/// In round 0 every party sends a hash of the values it received to all; in round 1 it compares
/// the hashes of all other parties against its own.
#[derive(Debug)]
pub struct BroadcastValidation {
    input: Deferred<Vec<Vec<u8>>>,
    state: ValidationState,
}

#[derive(Debug)]
enum ValidationState {
    Send,
    Compare { own: [u8; 32], values: Vec<Vec<u8>> },
    Done(Option<Vec<Vec<u8>>>),
}

impl BroadcastValidation {
    /// Validates the broadcast values of `input`.
    pub fn new(input: Deferred<Vec<Vec<u8>>>) -> Self {
        Self {
            input,
            state: ValidationState::Send,
        }
    }
}

fn broadcast_digest(values: &[Vec<u8>]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for value in values {
        hasher.update(&(value.len() as u64).to_be_bytes());
        hasher.update(value);
    }
    hasher.finalize().into()
}

impl<S: Suite> NativeProtocol<S> for BroadcastValidation {
    fn evaluate(
        &mut self,
        _round: usize,
        ctx: &mut RoundContext<'_, S>,
    ) -> Result<EvaluationStatus, Error> {
        match &mut self.state {
            ValidationState::Send => {
                let values = ctx.value(self.input)?.clone();
                let own = broadcast_digest(&values);
                ctx.network().send_to_all(own.to_vec());
                self.state = ValidationState::Compare { own, values };
                Ok(EvaluationStatus::HasMoreRounds)
            }
            ValidationState::Compare { own, values } => {
                let digests = ctx.network().receive_from_all()?;
                for (party, digest) in digests.iter().enumerate() {
                    if digest.len() != own.len() {
                        return Err(channel::Error::new(
                            format!("broadcast validation from party {party}"),
                            ErrorKind::InvalidLength,
                        )
                        .into());
                    }
                    if !bool::from(digest.as_slice().ct_eq(own.as_slice())) {
                        debug!(party, "inconsistent broadcast");
                        return Err(ConsistencyError::InconsistentBroadcast { party }.into());
                    }
                }
                let values = std::mem::take(values);
                self.state = ValidationState::Done(Some(values));
                Ok(EvaluationStatus::IsDone)
            }
            ValidationState::Done(_) => Err(StateError::AlreadyDone.into()),
        }
    }

    fn out(&mut self) -> Result<Output, Error> {
        match &mut self.state {
            ValidationState::Done(values) => {
                let values = values.take().ok_or(StateError::OutputNotReady)?;
                Ok(Box::new(values))
            }
            _ => Err(StateError::OutputNotReady.into()),
        }
    }
}

/// Broadcasts `value` and returns the values of all parties in party order.
///
/// With more than two parties, the received values are validated before they are returned.
pub fn broadcast<S: Suite>(
    b: &mut Builder<'_, S>,
    value: Deferred<Vec<u8>>,
) -> Result<Deferred<Vec<Vec<u8>>>, Error> {
    b.seq(|b| {
        let values: Deferred<Vec<Vec<u8>>> = b.append(
            Protocol::AllBroadcast(AllBroadcast::new(value)),
            &[value.node()],
        );
        if b.parties() > 2 {
            Ok(b.append(
                Protocol::BroadcastValidation(BroadcastValidation::new(values)),
                &[values.node()],
            ))
        } else {
            Ok(values)
        }
    })
}

/// Commits to `value`, broadcasts the commitments, and only then broadcasts and verifies the
/// openings. Returns the values of all parties in party order.
///
/// An opening that does not match its commitment aborts with
/// [`ConsistencyError::CommitmentMismatch`].
pub fn commit_and_open<S: Suite>(
    b: &mut Builder<'_, S>,
    value: Deferred<Vec<u8>>,
) -> Result<Deferred<Vec<Vec<u8>>>, Error> {
    b.seq(|b| {
        let committed = b.local(&[value.node()], move |ctx| {
            let value = ctx.value(value)?.clone();
            Ok(commit(ctx.pool().secure_rng(), &value))
        });
        let commitment = b.map(committed, |(c, _): (Commitment, Opening)| {
            Ok(c.to_bytes().to_vec())
        });
        let commitments = broadcast(b, commitment)?;
        let opening = b.map(committed, |(_, o): (Commitment, Opening)| Ok(o.to_bytes()));
        let openings: Deferred<Vec<Vec<u8>>> = b.append(
            Protocol::AllBroadcast(AllBroadcast::new(opening)),
            &[opening.node()],
        );
        Ok(b.map2(commitments, openings, |commitments, openings| {
            open_all(&commitments, &openings)
        }))
    })
}

/// Checks every party's opening against its commitment, both given in party order, and returns
/// the committed values.
///
/// This is the final step of [`commit_and_open`], for protocols that broadcast commitments and
/// openings themselves.
pub fn open_all(commitments: &[Vec<u8>], openings: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, Error> {
    if commitments.len() != openings.len() {
        return Err(channel::Error::new("openings", ErrorKind::InvalidLength).into());
    }
    commitments
        .iter()
        .zip(openings)
        .enumerate()
        .map(|(party, (commitment, opening))| -> Result<Vec<u8>, Error> {
            let mismatch = ConsistencyError::CommitmentMismatch { party };
            let commitment = Commitment::from_bytes(commitment).ok_or_else(|| {
                channel::Error::new(
                    format!("commitment of party {party}"),
                    ErrorKind::InvalidLength,
                )
            })?;
            let opening = Opening::from_bytes(opening).ok_or(mismatch.clone())?;
            Ok(commitment.open(opening).ok_or(mismatch)?)
        })
        .collect()
}

/// Jointly tosses 32 random bytes: every party contributes a committed random seed and the
/// result is the XOR of all contributions.
///
/// The result is suitable as the seed of a [`rand_chacha::ChaCha20Rng`] shared by all parties.
pub fn coin_toss<S: Suite>(b: &mut Builder<'_, S>) -> Result<Deferred<[u8; 32]>, Error> {
    b.seq(|b| {
        let seed = b.local(&[], |ctx| {
            let mut seed = vec![0; 32];
            rand::RngCore::fill_bytes(ctx.pool().secure_rng(), &mut seed);
            Ok(seed)
        });
        let seeds = commit_and_open(b, seed)?;
        Ok(b.map(seeds, |seeds: Vec<Vec<u8>>| {
            let mut coin = [0u8; 32];
            for (party, seed) in seeds.iter().enumerate() {
                if seed.len() != coin.len() {
                    return Err(channel::Error::new(
                        format!("coin toss seed of party {party}"),
                        ErrorKind::InvalidLength,
                    )
                    .into());
                }
                for (c, s) in coin.iter_mut().zip(seed) {
                    *c ^= s;
                }
            }
            Ok(coin)
        }))
    })
}
