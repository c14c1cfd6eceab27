//! An insecure suite where every "share" is the value itself.
//!
//! Arithmetic is local and takes zero rounds. Inputs are sent in the clear from their owner to
//! all other parties, which takes one round unless there is only a single party.

use crate::{
    dag::Deferred,
    error::{Error, StateError},
    protocol::{EvaluationStatus, NativeProtocol, Output, RoundContext, Suite},
    ring::{Ring, RingElement, RingError},
    suite::Numeric,
};

/// The dummy arithmetic suite.
#[derive(Debug, Clone, Copy)]
pub struct DummySuite;

/// The ring all values of a [`DummySuite`] run live in.
#[derive(Debug, Clone)]
pub struct DummyState {
    ring: Ring,
}

impl DummyState {
    /// Computes over `ring`.
    pub fn new(ring: Ring) -> Self {
        Self { ring }
    }

    /// The ring of this run.
    pub fn ring(&self) -> Ring {
        self.ring
    }
}

impl Suite for DummySuite {
    type Native = DummyProtocol;
    type State = DummyState;

    fn ring(state: &DummyState) -> Option<Ring> {
        Some(state.ring)
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Add,
    Sub,
    Mult,
}

#[derive(Debug)]
enum Kind {
    Known(RingElement),
    Input {
        owner: usize,
        value: Option<RingElement>,
    },
    Arithmetic {
        op: Op,
        left: Deferred<RingElement>,
        right: Deferred<RingElement>,
    },
    Open(Deferred<RingElement>),
}

/// A protocol of the [`DummySuite`].
#[derive(Debug)]
pub struct DummyProtocol {
    kind: Kind,
    done: bool,
    output: Option<RingElement>,
}

impl DummyProtocol {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            done: false,
            output: None,
        }
    }

    fn finish(&mut self, value: RingElement) -> EvaluationStatus {
        self.done = true;
        self.output = Some(value);
        EvaluationStatus::IsDone
    }
}

fn in_ring(ring: Ring, value: RingElement) -> Result<RingElement, RingError> {
    if value.ring() == ring {
        Ok(value)
    } else {
        Err(RingError::Mismatch {
            left: ring,
            right: value.ring(),
        })
    }
}

impl NativeProtocol<DummySuite> for DummyProtocol {
    fn evaluate(
        &mut self,
        round: usize,
        ctx: &mut RoundContext<'_, DummySuite>,
    ) -> Result<EvaluationStatus, Error> {
        if self.done {
            return Err(StateError::AlreadyDone.into());
        }
        let ring = ctx.pool().state().ring();
        match &self.kind {
            Kind::Known(value) => {
                let value = in_ring(ring, *value)?;
                Ok(self.finish(value))
            }
            Kind::Input { owner, value } => {
                let owner = *owner;
                let me = ctx.party_id();
                if round == 0 {
                    let value = if owner == me {
                        let value = value.ok_or(StateError::MissingInput { owner })?;
                        Some(in_ring(ring, value)?)
                    } else {
                        None
                    };
                    match value {
                        Some(value) if ctx.parties() == 1 => Ok(self.finish(value)),
                        Some(value) => {
                            ctx.network().send_elements_to_all(&[value]);
                            Ok(EvaluationStatus::HasMoreRounds)
                        }
                        None => Ok(EvaluationStatus::HasMoreRounds),
                    }
                } else {
                    let received = ctx.network().receive_elements(owner, ring, 1)?;
                    Ok(self.finish(received[0]))
                }
            }
            Kind::Arithmetic { op, left, right } => {
                let left = ctx.value(*left)?;
                let right = ctx.value(*right)?;
                let result = match op {
                    Op::Add => left.add(right)?,
                    Op::Sub => left.sub(right)?,
                    Op::Mult => left.mul(right)?,
                };
                Ok(self.finish(result))
            }
            Kind::Open(share) => {
                let share = *share;
                let value = *ctx.value(share)?;
                ctx.pool().opened_mut().push(share.node(), value)?;
                Ok(self.finish(value))
            }
        }
    }

    fn out(&mut self) -> Result<Output, Error> {
        let output = self.output.take().ok_or(StateError::OutputNotReady)?;
        Ok(Box::new(output))
    }
}

impl Numeric for DummySuite {
    type Share = RingElement;

    fn known(value: RingElement) -> DummyProtocol {
        DummyProtocol::new(Kind::Known(value))
    }

    fn input(owner: usize, value: Option<RingElement>) -> DummyProtocol {
        DummyProtocol::new(Kind::Input { owner, value })
    }

    fn add(a: Deferred<RingElement>, b: Deferred<RingElement>) -> DummyProtocol {
        DummyProtocol::new(Kind::Arithmetic {
            op: Op::Add,
            left: a,
            right: b,
        })
    }

    fn sub(a: Deferred<RingElement>, b: Deferred<RingElement>) -> DummyProtocol {
        DummyProtocol::new(Kind::Arithmetic {
            op: Op::Sub,
            left: a,
            right: b,
        })
    }

    fn mult(a: Deferred<RingElement>, b: Deferred<RingElement>) -> DummyProtocol {
        DummyProtocol::new(Kind::Arithmetic {
            op: Op::Mult,
            left: a,
            right: b,
        })
    }

    fn open(a: Deferred<RingElement>) -> DummyProtocol {
        DummyProtocol::new(Kind::Open(a))
    }
}
