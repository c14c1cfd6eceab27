//! The round-based state machine every protocol implements.
//!
//! A protocol is evaluated round by round, starting at round 0. In every round it may read the
//! messages sent to it in the previous round and queue messages for the next one. Once
//! [`NativeProtocol::evaluate`] returns [`EvaluationStatus::IsDone`] the evaluator takes the
//! output with [`NativeProtocol::out`] and never evaluates the protocol again.

use std::any::Any;

use crate::{
    broadcast::{AllBroadcast, BroadcastValidation},
    dag::{Deferred, NodeId, Values},
    error::{Error, StateError},
    network::RoundNetwork,
    pool::ResourcePool,
    ring::Ring,
};

/// Whether a protocol needs another round after the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationStatus {
    /// Messages have to be exchanged before the protocol can continue.
    HasMoreRounds,
    /// The protocol has finished and its output is available.
    IsDone,
}

/// The type-erased output of a protocol.
pub type Output = Box<dyn Any + Send>;

/// A protocol evaluated in rounds.
pub trait NativeProtocol<S: Suite>: Send {
    /// Evaluates round `round`.
    ///
    /// Evaluating a protocol that already returned [`EvaluationStatus::IsDone`] fails with
    /// [`StateError::AlreadyDone`].
    fn evaluate(
        &mut self,
        round: usize,
        ctx: &mut RoundContext<'_, S>,
    ) -> Result<EvaluationStatus, Error>;

    /// Moves the output out of a finished protocol, failing with [`StateError::OutputNotReady`]
    /// if it has not finished yet.
    fn out(&mut self) -> Result<Output, Error>;
}

/// A family of protocols sharing the same share representation and resources.
pub trait Suite: Sized + Send + 'static {
    /// The suite's own protocols.
    type Native: NativeProtocol<Self>;
    /// Suite-specific state kept in the [`ResourcePool`].
    type State: Send;

    /// The ring cleartext values of this suite live in, if any.
    fn ring(_state: &Self::State) -> Option<Ring> {
        None
    }
}

/// Everything a protocol can access while evaluating a round.
pub struct RoundContext<'a, S: Suite> {
    pub(crate) pool: &'a mut ResourcePool<S::State>,
    pub(crate) network: &'a mut RoundNetwork,
    pub(crate) values: &'a Values,
    pub(crate) node: NodeId,
}

impl<S: Suite> RoundContext<'_, S> {
    /// The value of a finished dependency.
    pub fn value<T: 'static>(&self, handle: Deferred<T>) -> Result<&T, Error> {
        Ok(self.values.get(handle)?)
    }

    /// The node being evaluated.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The messages of the current round.
    pub fn network(&mut self) -> &mut RoundNetwork {
        self.network
    }

    /// The resources of this party.
    pub fn pool(&mut self) -> &mut ResourcePool<S::State> {
        self.pool
    }

    /// The index of this party.
    pub fn party_id(&self) -> usize {
        self.pool.party_id()
    }

    /// The total number of parties.
    pub fn parties(&self) -> usize {
        self.pool.parties()
    }
}

type LocalFn<S> = Box<dyn FnOnce(&mut RoundContext<'_, S>) -> Result<Output, Error> + Send>;

/// A zero-round computation over the values of its dependencies.
pub struct LocalProtocol<S: Suite> {
    run: Option<LocalFn<S>>,
    output: Option<Output>,
}

impl<S: Suite> LocalProtocol<S> {
    pub(crate) fn new<T, F>(f: F) -> Self
    where
        T: Send + 'static,
        F: FnOnce(&mut RoundContext<'_, S>) -> Result<T, Error> + Send + 'static,
    {
        Self {
            run: Some(Box::new(move |ctx| Ok(Box::new(f(ctx)?) as Output))),
            output: None,
        }
    }
}

impl<S: Suite> NativeProtocol<S> for LocalProtocol<S> {
    fn evaluate(
        &mut self,
        _round: usize,
        ctx: &mut RoundContext<'_, S>,
    ) -> Result<EvaluationStatus, Error> {
        let run = self.run.take().ok_or(StateError::AlreadyDone)?;
        self.output = Some(run(ctx)?);
        Ok(EvaluationStatus::IsDone)
    }

    fn out(&mut self) -> Result<Output, Error> {
        Ok(self.output.take().ok_or(StateError::OutputNotReady)?)
    }
}

/// The closed set of protocols a graph node can run.
pub enum Protocol<S: Suite> {
    /// A protocol of the suite.
    Suite(S::Native),
    /// Sends a byte string to every party and receives theirs.
    AllBroadcast(AllBroadcast),
    /// Checks that all parties received the same broadcast.
    BroadcastValidation(BroadcastValidation),
    /// A local computation without communication.
    Local(LocalProtocol<S>),
}

impl<S: Suite> NativeProtocol<S> for Protocol<S> {
    fn evaluate(
        &mut self,
        round: usize,
        ctx: &mut RoundContext<'_, S>,
    ) -> Result<EvaluationStatus, Error> {
        match self {
            Protocol::Suite(p) => p.evaluate(round, ctx),
            Protocol::AllBroadcast(p) => p.evaluate(round, ctx),
            Protocol::BroadcastValidation(p) => p.evaluate(round, ctx),
            Protocol::Local(p) => p.evaluate(round, ctx),
        }
    }

    fn out(&mut self) -> Result<Output, Error> {
        match self {
            Protocol::Suite(p) => p.out(),
            Protocol::AllBroadcast(p) => NativeProtocol::<S>::out(p),
            Protocol::BroadcastValidation(p) => NativeProtocol::<S>::out(p),
            Protocol::Local(p) => p.out(),
        }
    }
}
