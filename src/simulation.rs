//! Runs all parties of a computation in a single process, connected by in-memory channels.

use futures::future::try_join_all;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::{
    builder::{Builder, Deferred},
    channel::SimpleChannel,
    config::EngineConfig,
    engine::Engine,
    error::Error,
    evaluator::EvaluationStats,
    network::Network,
    pool::ResourcePool,
    protocol::Suite,
};

/// Creates one resource pool per party with generators derived deterministically from `seed`.
///
/// Every party gets distinct generators, so that the outcome of a simulation is reproducible.
/// `state` is called with the index of each party.
pub fn seeded_pools<St>(
    parties: usize,
    seed: u64,
    mut state: impl FnMut(usize) -> St,
) -> Result<Vec<ResourcePool<St>>, Error> {
    (0..parties)
        .map(|party| {
            let mut base = ChaCha20Rng::seed_from_u64(seed);
            base.set_stream(party as u64);
            let secure_rng = ChaCha20Rng::from_rng(&mut base);
            let prg = ChaCha20Rng::from_rng(&mut base);
            Ok(ResourcePool::new(party, parties, secure_rng, prg, state(party))?)
        })
        .collect()
}

/// Runs `app` for every party concurrently and returns the output of each party.
///
/// The number of parties is the number of pools. All parties use the same configuration.
pub async fn simulate<S, T, A>(
    config: &EngineConfig,
    pools: Vec<ResourcePool<S::State>>,
    app: A,
) -> Result<Vec<T>, Error>
where
    S: Suite,
    T: 'static,
    A: Fn(&mut Builder<'_, S>) -> Result<Deferred<T>, Error>,
{
    let results = simulate_with_stats(config, pools, app).await?;
    Ok(results.into_iter().map(|(output, _)| output).collect())
}

/// Like [`simulate`], but also returns the evaluation statistics of every party.
pub async fn simulate_with_stats<S, T, A>(
    config: &EngineConfig,
    pools: Vec<ResourcePool<S::State>>,
    app: A,
) -> Result<Vec<(T, EvaluationStats)>, Error>
where
    S: Suite,
    T: 'static,
    A: Fn(&mut Builder<'_, S>) -> Result<Deferred<T>, Error>,
{
    let parties = pools.len();
    let engine = Engine::<S>::new(config.clone())?;
    let networks = SimpleChannel::channels(parties)
        .into_iter()
        .enumerate()
        .map(|(party, channel)| {
            Network::new(channel, party, parties)
                .map(|network| network.with_timeout(config.round_timeout()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let app = &app;
    let engine = &engine;
    let runs = pools
        .into_iter()
        .zip(networks)
        .map(|(mut pool, network)| async move {
            engine
                .run_with_stats(|b| app(b), &mut pool, &network)
                .await
        });
    try_join_all(runs).await
}
