//! Per-party resources handed to every protocol during evaluation.

use std::collections::BTreeMap;

use rand_chacha::ChaCha20Rng;

use crate::{
    dag::NodeId,
    error::{ConsistencyError, StateError},
    ring::RingElement,
};

/// Opened (publicly reconstructed) values, keyed by the node that produced the opened share.
///
/// Node ids are only unique within one run of the engine, so every entry is also tagged with the
/// run it was opened in. Lookups only see values of the current run. Every key holds at most one
/// value for the lifetime of the resource pool.
#[derive(Debug, Clone, Default)]
pub struct OpenedValueStore {
    run: u64,
    values: BTreeMap<(u64, NodeId), RingElement>,
}

impl OpenedValueStore {
    /// Starts a new run: values opened so far stay stored but are no longer visible.
    pub(crate) fn start_run(&mut self) {
        self.run += 1;
    }

    /// The number of runs started on this store.
    pub fn runs(&self) -> u64 {
        self.run
    }

    /// Records the opened value of a share of the current run.
    ///
    /// Pushing the same value twice is a no-op, pushing a different one is a consistency error.
    pub fn push(&mut self, share: NodeId, value: RingElement) -> Result<(), ConsistencyError> {
        let key = (self.run, share);
        match self.values.get(&key) {
            Some(existing) if *existing != value => {
                Err(ConsistencyError::OpenedValueConflict { node: share })
            }
            Some(_) => Ok(()),
            None => {
                self.values.insert(key, value);
                Ok(())
            }
        }
    }

    /// The opened value of a share, if it was opened before in the current run.
    pub fn get(&self, share: NodeId) -> Option<RingElement> {
        self.values.get(&(self.run, share)).copied()
    }

    /// The number of opened values across all runs.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing has been opened yet.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Identity, randomness and suite-specific state of one party.
///
/// The generators are supplied by the caller; the engine never seeds them itself.
#[derive(Debug)]
pub struct ResourcePool<St> {
    party_id: usize,
    parties: usize,
    secure_rng: ChaCha20Rng,
    prg: ChaCha20Rng,
    opened: OpenedValueStore,
    state: St,
}

impl<St> ResourcePool<St> {
    /// Creates the resources of party `party_id` among `parties` parties.
    pub fn new(
        party_id: usize,
        parties: usize,
        secure_rng: ChaCha20Rng,
        prg: ChaCha20Rng,
        state: St,
    ) -> Result<Self, StateError> {
        if party_id >= parties {
            return Err(StateError::InvalidParty {
                party: party_id,
                parties,
            });
        }
        Ok(Self {
            party_id,
            parties,
            secure_rng,
            prg,
            opened: OpenedValueStore::default(),
            state,
        })
    }

    /// The index of this party.
    pub fn party_id(&self) -> usize {
        self.party_id
    }

    /// The total number of parties.
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// The cryptographically secure generator, used for commitments and coin tossing.
    pub fn secure_rng(&mut self) -> &mut ChaCha20Rng {
        &mut self.secure_rng
    }

    /// The pseudo-random generator (possibly deterministic).
    pub fn prg(&mut self) -> &mut ChaCha20Rng {
        &mut self.prg
    }

    /// Values opened so far.
    pub fn opened(&self) -> &OpenedValueStore {
        &self.opened
    }

    /// Values opened so far, for recording new ones.
    pub fn opened_mut(&mut self) -> &mut OpenedValueStore {
        &mut self.opened
    }

    /// The suite-specific state.
    pub fn state(&self) -> &St {
        &self.state
    }

    /// The suite-specific state, mutably.
    pub fn state_mut(&mut self) -> &mut St {
        &mut self.state
    }
}
