//! The single error type every failed computation is reported with.

use crate::{channel, config::ConfigError, dag::NodeId, ring::RingError};

/// Aborts a computation. There is no partial success: any error invalidates the whole run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message could not be sent, received or decoded in time.
    #[error("connectivity failure: {0}")]
    Connectivity(#[from] channel::Error),
    /// Another party sent data that contradicts what it committed to or what others received.
    #[error("consistency failure: {0}")]
    Consistency(#[from] ConsistencyError),
    /// The engine or a protocol was driven in a way that violates its contract.
    #[error("protocol state violation: {0}")]
    State(#[from] StateError),
    /// Ring elements were used outside of their domain.
    #[error("arithmetic domain error: {0}")]
    Ring(#[from] RingError),
    /// The engine configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// The coarse category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// See [`Error::Connectivity`].
    Connectivity,
    /// See [`Error::Consistency`].
    Consistency,
    /// See [`Error::State`].
    ProtocolState,
    /// See [`Error::Ring`].
    ArithmeticDomain,
    /// See [`Error::Config`].
    Configuration,
}

impl Error {
    /// The category of this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Connectivity(_) => FailureKind::Connectivity,
            Error::Consistency(_) => FailureKind::Consistency,
            Error::State(_) => FailureKind::ProtocolState,
            Error::Ring(_) => FailureKind::ArithmeticDomain,
            Error::Config(_) => FailureKind::Configuration,
        }
    }
}

/// Evidence of a corrupted or actively malicious party.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsistencyError {
    /// The opening sent by a party does not match its commitment.
    #[error("the opening of party {party} does not match its commitment")]
    CommitmentMismatch {
        /// The party whose commitment failed to open.
        party: usize,
    },
    /// A party received a different broadcast than this party.
    #[error("party {party} received a different broadcast")]
    InconsistentBroadcast {
        /// The party whose view of the broadcast differs.
        party: usize,
    },
    /// A different value was already opened for the same share.
    #[error("conflicting opened values for {node}")]
    OpenedValueConflict {
        /// The node producing the opened share.
        node: NodeId,
    },
}

/// Misuse of the engine, a protocol or a deferred handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// The output of a protocol was requested before it finished.
    #[error("output requested before the protocol finished")]
    OutputNotReady,
    /// A finished protocol was evaluated again.
    #[error("protocol evaluated after it finished")]
    AlreadyDone,
    /// A handle was resolved before its producer finished.
    #[error("{node} has not been evaluated yet")]
    Unresolved {
        /// The node producing the handle.
        node: NodeId,
    },
    /// A handle was resolved with a different type than its producer returned.
    #[error("{node} does not hold a value of the requested type")]
    TypeMismatch {
        /// The node producing the handle.
        node: NodeId,
    },
    /// The value of a handle was already moved out.
    #[error("the value of {node} has already been taken")]
    OutputTaken {
        /// The node producing the handle.
        node: NodeId,
    },
    /// Nodes remain unfinished but none of them can run.
    #[error("{pending} nodes are pending, but none of them is ready")]
    Deadlock {
        /// The number of unfinished nodes.
        pending: usize,
    },
    /// Messages were queued in a round that is not followed by an exchange.
    #[error("messages for party {party} were queued in a final round")]
    SentInFinalRound {
        /// A party with queued messages.
        party: usize,
    },
    /// Messages from a party were not read in the round after they were sent.
    #[error("messages from party {party} were never read")]
    UnconsumedMessages {
        /// A party whose messages were left unread.
        party: usize,
    },
    /// A party index was not smaller than the number of parties.
    #[error("party {party} does not exist among {parties} parties")]
    InvalidParty {
        /// The invalid party index.
        party: usize,
        /// The number of parties.
        parties: usize,
    },
    /// The resource pool and the network belong to different parties.
    #[error("the resource pool of party {pool} cannot be used with the network of party {network}")]
    PartyMismatch {
        /// The party of the resource pool.
        pool: usize,
        /// The party of the network.
        network: usize,
    },
    /// The owner of an input did not provide a value.
    #[error("party {owner} owns an input but did not provide a value")]
    MissingInput {
        /// The owner of the input.
        owner: usize,
    },
    /// The protocol suite has no ring to interpret numbers in.
    #[error("the protocol suite does not define a ring")]
    MissingRing,
}
