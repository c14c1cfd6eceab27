//! Passively secure additive secret sharing.
//!
//! Secrets are elements of `Z/2^k`; shares live in `Z/2^(k+s)` where `s` is a statistical
//! security margin, so that inputs masked with random elements of the larger ring hide the
//! secret. Preprocessed triples and input masks come from a [`FakeDealer`].
//!
//! | protocol | rounds | messages per party |
//! |----------|--------|--------------------|
//! | known, add, sub | 0 | none |
//! | input | 1 | the owner sends `x - r` to all |
//! | mult | 1 | `x_i - a_i` and `y_i - b_i` to all |
//! | open | 1, or 0 if already opened | the low `k` bits of the share to all |

use tracing::trace;

use crate::{
    dag::Deferred,
    error::{Error, StateError},
    protocol::{EvaluationStatus, NativeProtocol, Output, RoundContext, Suite},
    ring::{Ring, RingElement, RingError},
    suite::{
        Numeric,
        dealer::{FakeDealer, Triple},
    },
};

/// The additive suite.
#[derive(Debug, Clone, Copy)]
pub struct AdditiveSuite;

/// Ring parameters and the preprocessing dealer of an [`AdditiveSuite`] run.
#[derive(Debug, Clone)]
pub struct AdditiveState {
    output_ring: Ring,
    share_ring: Ring,
    dealer: FakeDealer,
}

impl AdditiveState {
    /// Computes on `k`-bit secrets with `s` bits of statistical security, using preprocessing
    /// drawn from a dealer seeded with `dealer_seed` (identical at all parties).
    pub fn new(k: u32, s: u32, dealer_seed: [u8; 32], parties: usize) -> Result<Self, RingError> {
        let output_ring = Ring::power_of_two(k)?;
        let share_ring = Ring::power_of_two(k.saturating_add(s))?;
        Ok(Self {
            output_ring,
            share_ring,
            dealer: FakeDealer::new(dealer_seed, share_ring, parties),
        })
    }

    /// The ring secrets live in, `Z/2^k`.
    pub fn output_ring(&self) -> Ring {
        self.output_ring
    }

    /// The ring shares live in, `Z/2^(k+s)`.
    pub fn share_ring(&self) -> Ring {
        self.share_ring
    }
}

impl Suite for AdditiveSuite {
    type Native = AdditiveProtocol;
    type State = AdditiveState;

    fn ring(state: &AdditiveState) -> Option<Ring> {
        Some(state.output_ring)
    }
}

/// One party's additive share of a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdditiveShare(RingElement);

impl AdditiveShare {
    /// The share as an element of the share ring.
    pub fn element(&self) -> RingElement {
        self.0
    }
}

fn expect_ring(ring: Ring, value: RingElement) -> Result<RingElement, RingError> {
    if value.ring() == ring {
        Ok(value)
    } else {
        Err(RingError::Mismatch {
            left: ring,
            right: value.ring(),
        })
    }
}

#[derive(Debug)]
enum InputState {
    Mask,
    Delta { mask_share: RingElement },
}

#[derive(Debug)]
enum MultState {
    Mask,
    Combine { triple: Triple },
}

#[derive(Debug)]
enum OpenState {
    Send,
    Reconstruct,
}

#[derive(Debug)]
enum Kind {
    Known(RingElement),
    Input {
        owner: usize,
        value: Option<RingElement>,
        state: InputState,
    },
    Add(Deferred<AdditiveShare>, Deferred<AdditiveShare>),
    Sub(Deferred<AdditiveShare>, Deferred<AdditiveShare>),
    Mult {
        left: Deferred<AdditiveShare>,
        right: Deferred<AdditiveShare>,
        state: MultState,
    },
    Open {
        share: Deferred<AdditiveShare>,
        state: OpenState,
    },
}

#[derive(Debug)]
enum Outcome {
    Share(AdditiveShare),
    Opened(RingElement),
}

/// A protocol of the [`AdditiveSuite`].
#[derive(Debug)]
pub struct AdditiveProtocol {
    kind: Kind,
    done: bool,
    output: Option<Outcome>,
}

impl AdditiveProtocol {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            done: false,
            output: None,
        }
    }

    fn finish(&mut self, outcome: Outcome) -> EvaluationStatus {
        self.done = true;
        self.output = Some(outcome);
        EvaluationStatus::IsDone
    }
}

impl NativeProtocol<AdditiveSuite> for AdditiveProtocol {
    fn evaluate(
        &mut self,
        _round: usize,
        ctx: &mut RoundContext<'_, AdditiveSuite>,
    ) -> Result<EvaluationStatus, Error> {
        if self.done {
            return Err(StateError::AlreadyDone.into());
        }
        let me = ctx.party_id();
        let output_ring = ctx.pool().state().output_ring;
        let share_ring = ctx.pool().state().share_ring;
        match &mut self.kind {
            Kind::Known(value) => {
                let value = expect_ring(output_ring, *value)?.convert(share_ring);
                let share = if me == 0 { value } else { share_ring.zero() };
                Ok(self.finish(Outcome::Share(AdditiveShare(share))))
            }
            Kind::Input {
                owner,
                value,
                state,
            } => match state {
                InputState::Mask => {
                    let owner = *owner;
                    let mask = ctx.pool().state_mut().dealer.next_input_mask(me, owner)?;
                    if let Some(r) = mask.mask {
                        let x = value.ok_or(StateError::MissingInput { owner })?;
                        let x = expect_ring(output_ring, x)?.convert(share_ring);
                        ctx.network().send_elements_to_all(&[x.sub(&r)?]);
                    }
                    *state = InputState::Delta {
                        mask_share: mask.share,
                    };
                    Ok(EvaluationStatus::HasMoreRounds)
                }
                InputState::Delta { mask_share } => {
                    let owner = *owner;
                    let mask_share = *mask_share;
                    let delta = ctx.network().receive_elements(owner, share_ring, 1)?[0];
                    let share = if me == 0 {
                        mask_share.add(&delta)?
                    } else {
                        mask_share
                    };
                    Ok(self.finish(Outcome::Share(AdditiveShare(share))))
                }
            },
            Kind::Add(a, b) => {
                let sum = ctx.value(*a)?.0.add(&ctx.value(*b)?.0)?;
                Ok(self.finish(Outcome::Share(AdditiveShare(sum))))
            }
            Kind::Sub(a, b) => {
                let diff = ctx.value(*a)?.0.sub(&ctx.value(*b)?.0)?;
                Ok(self.finish(Outcome::Share(AdditiveShare(diff))))
            }
            Kind::Mult { left, right, state } => match state {
                MultState::Mask => {
                    let triple = ctx.pool().state_mut().dealer.next_triple(me)?;
                    let e = ctx.value(*left)?.0.sub(&triple.a)?;
                    let d = ctx.value(*right)?.0.sub(&triple.b)?;
                    ctx.network().send_elements_to_all(&[e, d]);
                    *state = MultState::Combine { triple };
                    Ok(EvaluationStatus::HasMoreRounds)
                }
                MultState::Combine { triple } => {
                    let triple = *triple;
                    let mut e = share_ring.zero();
                    let mut d = share_ring.zero();
                    for masked in ctx.network().receive_elements_from_all(share_ring, 2)? {
                        e = e.add(&masked[0])?;
                        d = d.add(&masked[1])?;
                    }
                    // x * y = c + e * b + d * a + e * d, where only party 0 adds e * d
                    let mut z = triple.c.add(&e.mul(&triple.b)?)?.add(&d.mul(&triple.a)?)?;
                    if me == 0 {
                        z = z.add(&e.mul(&d)?)?;
                    }
                    Ok(self.finish(Outcome::Share(AdditiveShare(z))))
                }
            },
            Kind::Open { share, state } => match state {
                OpenState::Send => {
                    let share = *share;
                    if let Some(opened) = ctx.pool().opened().get(share.node()) {
                        trace!(node = %share.node(), "reusing opened value");
                        return Ok(self.finish(Outcome::Opened(opened)));
                    }
                    let low = ctx.value(share)?.0.convert(output_ring);
                    ctx.network().send_elements_to_all(&[low]);
                    *state = OpenState::Reconstruct;
                    Ok(EvaluationStatus::HasMoreRounds)
                }
                OpenState::Reconstruct => {
                    let share = *share;
                    let mut value = output_ring.zero();
                    for low in ctx.network().receive_elements_from_all(output_ring, 1)? {
                        value = value.add(&low[0])?;
                    }
                    ctx.pool().opened_mut().push(share.node(), value)?;
                    Ok(self.finish(Outcome::Opened(value)))
                }
            },
        }
    }

    fn out(&mut self) -> Result<Output, Error> {
        match self.output.take().ok_or(StateError::OutputNotReady)? {
            Outcome::Share(share) => Ok(Box::new(share)),
            Outcome::Opened(value) => Ok(Box::new(value)),
        }
    }
}

impl Numeric for AdditiveSuite {
    type Share = AdditiveShare;

    fn known(value: RingElement) -> AdditiveProtocol {
        AdditiveProtocol::new(Kind::Known(value))
    }

    fn input(owner: usize, value: Option<RingElement>) -> AdditiveProtocol {
        AdditiveProtocol::new(Kind::Input {
            owner,
            value,
            state: InputState::Mask,
        })
    }

    fn add(a: Deferred<AdditiveShare>, b: Deferred<AdditiveShare>) -> AdditiveProtocol {
        AdditiveProtocol::new(Kind::Add(a, b))
    }

    fn sub(a: Deferred<AdditiveShare>, b: Deferred<AdditiveShare>) -> AdditiveProtocol {
        AdditiveProtocol::new(Kind::Sub(a, b))
    }

    fn mult(a: Deferred<AdditiveShare>, b: Deferred<AdditiveShare>) -> AdditiveProtocol {
        AdditiveProtocol::new(Kind::Mult {
            left: a,
            right: b,
            state: MultState::Mask,
        })
    }

    fn open(a: Deferred<AdditiveShare>) -> AdditiveProtocol {
        AdditiveProtocol::new(Kind::Open {
            share: a,
            state: OpenState::Send,
        })
    }
}
