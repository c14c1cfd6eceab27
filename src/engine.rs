//! Runs applications for a single party.

use std::marker::PhantomData;

use tracing::{Level, debug, instrument};

use crate::{
    builder::{Builder, Context, Deferred},
    channel::Channel,
    config::EngineConfig,
    dag::Dag,
    error::{Error, StateError},
    evaluator::{EvaluationStats, Evaluator},
    network::Network,
    pool::ResourcePool,
    protocol::Suite,
};

/// Builds and evaluates applications of a protocol suite `S`.
///
/// Every party runs its own engine with the same configuration and the same application; only
/// private inputs and the resource pool differ between parties.
#[derive(Debug, Clone)]
pub struct Engine<S> {
    config: EngineConfig,
    _suite: PhantomData<fn() -> S>,
}

impl<S: Suite> Engine<S> {
    /// Creates an engine after validating its configuration.
    pub fn new(config: EngineConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            _suite: PhantomData,
        })
    }

    /// The configuration of this engine.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Builds the protocol graph with `app` and evaluates it, returning the value of the handle
    /// `app` returns.
    pub async fn run<C, T, F>(
        &self,
        app: F,
        pool: &mut ResourcePool<S::State>,
        network: &Network<C>,
    ) -> Result<T, Error>
    where
        C: Channel,
        T: 'static,
        F: FnOnce(&mut Builder<'_, S>) -> Result<Deferred<T>, Error>,
    {
        let (output, _) = self.run_with_stats(app, pool, network).await?;
        Ok(output)
    }

    /// Like [`Engine::run`], but also returns statistics about the evaluation.
    #[instrument(level = Level::DEBUG, skip_all, fields(party = pool.party_id()), err)]
    pub async fn run_with_stats<C, T, F>(
        &self,
        app: F,
        pool: &mut ResourcePool<S::State>,
        network: &Network<C>,
    ) -> Result<(T, EvaluationStats), Error>
    where
        C: Channel,
        T: 'static,
        F: FnOnce(&mut Builder<'_, S>) -> Result<Deferred<T>, Error>,
    {
        if pool.party_id() != network.party_id() || pool.parties() != network.parties() {
            return Err(StateError::PartyMismatch {
                pool: pool.party_id(),
                network: network.party_id(),
            }
            .into());
        }
        pool.opened_mut().start_run();
        let ctx = Context::new(pool.party_id(), pool.parties(), S::ring(pool.state()));
        let mut dag = Dag::new();
        let output = app(&mut Builder::root(&mut dag, &ctx))?;
        debug!(nodes = dag.len(), "built protocol graph");

        let stats = Evaluator::new(&mut dag, &ctx, pool, network, &self.config)
            .run()
            .await?;
        let output = dag.values.take(output)?;
        Ok((output, stats))
    }
}
