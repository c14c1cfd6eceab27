use futures::future::try_join_all;

use conclave::{
    EvaluationStats,
    builder::Deferred,
    channel::{self, ErrorKind, SimpleChannel},
    config::{
        EngineConfig,
        EvaluationStrategy::{self, Sequential, SequentialBatched},
    },
    engine::Engine,
    error::{Error, FailureKind, StateError},
    network::Network,
    ring::{Ring, RingElement},
    simulation::{seeded_pools, simulate, simulate_with_stats},
    suite::{
        additive::{AdditiveState, AdditiveSuite},
        dummy::{DummyState, DummySuite},
    },
};

const STRATEGIES: [EvaluationStrategy; 2] = [Sequential, SequentialBatched];

fn dummy_pools(parties: usize, modulus: u64) -> Vec<conclave::pool::ResourcePool<DummyState>> {
    let ring = Ring::modulo(modulus).unwrap();
    seeded_pools(parties, 1, |_| DummyState::new(ring)).unwrap()
}

fn additive_pools(
    parties: usize,
    k: u32,
    seed: u64,
) -> Vec<conclave::pool::ResourcePool<AdditiveState>> {
    let dealer_seed = [seed as u8; 32];
    seeded_pools(parties, seed, |_| {
        AdditiveState::new(k, 40.min(128 - k), dealer_seed, parties).unwrap()
    })
    .unwrap()
}

#[tokio::test]
async fn dummy_multiply_mod_13() -> Result<(), Error> {
    for strategy in STRATEGIES {
        let outputs = simulate::<DummySuite, _, _>(
            &EngineConfig::with_strategy(strategy),
            dummy_pools(1, 13),
            |b| {
                let left = b.input(0, Some(7))?;
                let right = b.input(0, Some(6))?;
                let product = b.mult(left, right);
                Ok(b.open(product))
            },
        )
        .await?;
        assert_eq!(outputs, vec![Ring::modulo(13)?.element(3)]);
    }
    Ok(())
}

#[tokio::test]
async fn dummy_subtraction_wraps_around() -> Result<(), Error> {
    let outputs = simulate::<DummySuite, _, _>(&EngineConfig::default(), dummy_pools(1, 13), |b| {
        let left = b.known(3)?;
        let right = b.known(5)?;
        let diff = b.sub(left, right);
        Ok(b.open(diff))
    })
    .await?;
    assert_eq!(outputs[0].value(), 11);
    Ok(())
}

#[tokio::test]
async fn dummy_inputs_from_several_parties() -> Result<(), Error> {
    for strategy in STRATEGIES {
        let outputs = simulate::<DummySuite, _, _>(
            &EngineConfig::with_strategy(strategy),
            dummy_pools(3, 1_000_003),
            |b| {
                let me = b.party_id();
                let inputs = (0..3)
                    .map(|owner| b.input(owner, (owner == me).then_some(owner as u128 + 10)))
                    .collect::<Result<Vec<_>, _>>()?;
                let sum = b.add(inputs[0], inputs[1]);
                let result = b.mult(sum, inputs[2]);
                Ok(b.open(result))
            },
        )
        .await?;
        for output in outputs {
            assert_eq!(output.value(), (10 + 11) * 12);
        }
    }
    Ok(())
}

/// Every party inputs a value; the sum of all inputs is opened.
fn sum_of_inputs(
    b: &mut conclave::builder::Builder<'_, AdditiveSuite>,
    inputs: &[u128],
) -> Result<Deferred<RingElement>, Error> {
    let me = b.party_id();
    let shares = b.par(|b| {
        (0..inputs.len())
            .map(|owner| b.input(owner, (owner == me).then_some(inputs[owner])))
            .collect::<Result<Vec<_>, _>>()
    })?;
    let mut sum = shares[0];
    for share in &shares[1..] {
        sum = b.add(sum, *share);
    }
    Ok(b.open(sum))
}

#[tokio::test]
async fn additive_reconstruction_for_all_widths() -> Result<(), Error> {
    for k in [1, 7, 8, 32, 64, 88] {
        for parties in [2, 3, 4] {
            let inputs: Vec<u128> = (0..parties as u128)
                .map(|p| (p + 1) * 0x1234_5678_9abc)
                .collect();
            let expected = Ring::power_of_two(k)?.element(inputs.iter().sum());
            let outputs = simulate::<AdditiveSuite, _, _>(
                &EngineConfig::default(),
                additive_pools(parties, k, 3),
                |b| sum_of_inputs(b, &inputs),
            )
            .await?;
            for output in outputs {
                assert_eq!(output, expected, "k = {k}, parties = {parties}");
            }
        }
    }
    Ok(())
}

#[tokio::test]
async fn additive_arithmetic() -> Result<(), Error> {
    let k = 32;
    let ring = Ring::power_of_two(k)?;
    for strategy in STRATEGIES {
        let outputs = simulate::<AdditiveSuite, _, _>(
            &EngineConfig::with_strategy(strategy),
            additive_pools(3, k, 5),
            |b| {
                let me = b.party_id();
                let x = b.input(0, (me == 0).then_some(123_456))?;
                let y = b.input(1, (me == 1).then_some(654_321))?;
                let z = b.input(2, (me == 2).then_some(1 << 31))?;
                let c = b.known(9)?;
                let xy = b.mult(x, y);
                let xyz = b.mult(xy, z);
                let sum = b.add(xyz, c);
                let result = b.sub(sum, x);
                Ok(b.open(result))
            },
        )
        .await?;
        let expected = ring
            .element(123_456)
            .mul(&ring.element(654_321))?
            .mul(&ring.element(1 << 31))?
            .add(&ring.element(9))?
            .sub(&ring.element(123_456))?;
        for output in outputs {
            assert_eq!(output, expected);
        }
    }
    Ok(())
}

/// Squares independent inputs in parallel and opens all results.
async fn parallel_squares(
    config: EngineConfig,
    seed: u64,
) -> Result<Vec<(Vec<RingElement>, EvaluationStats)>, Error> {
    let values: Vec<u128> = (0..10).map(|i| 1000 + i).collect();
    simulate_with_stats::<AdditiveSuite, _, _>(
        &config,
        additive_pools(2, 64, seed),
        move |b| {
            let me = b.party_id();
            let opened = b.par(|b| {
                values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| {
                        b.seq(|b| {
                            let owner = i % 2;
                            let x = b.input(owner, (owner == me).then_some(*v))?;
                            let square = b.mult(x, x);
                            Ok(b.open(square))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })?;
            Ok(b.collect(opened))
        },
    )
    .await
}

#[tokio::test]
async fn strategies_agree() -> Result<(), Error> {
    let sequential = parallel_squares(EngineConfig::with_strategy(Sequential), 7).await?;
    let batched = parallel_squares(EngineConfig::with_strategy(SequentialBatched), 7).await?;
    let expected: Vec<u128> = (0..10).map(|i| (1000 + i) * (1000 + i)).collect();
    for ((seq_out, seq_stats), (batch_out, batch_stats)) in sequential.iter().zip(&batched) {
        assert_eq!(seq_out, batch_out);
        let values: Vec<u128> = seq_out.iter().map(RingElement::value).collect();
        assert_eq!(values, expected);
        assert_eq!(seq_stats.nodes, batch_stats.nodes);
        // 10 inputs, 10 mults and 10 opens need one exchange each when run one by one
        assert_eq!(seq_stats.exchanges, 30);
        assert_eq!(batch_stats.exchanges, 3);
    }
    Ok(())
}

#[tokio::test]
async fn batch_size_limits_fresh_protocols() -> Result<(), Error> {
    let unlimited = parallel_squares(EngineConfig::default(), 13).await?;
    for (max_batch_size, exchanges) in [(1, 30), (3, 12), (10, 3)] {
        let config = EngineConfig {
            max_batch_size,
            ..EngineConfig::default()
        };
        let limited = parallel_squares(config, 13).await?;
        for ((out, stats), (expected, _)) in limited.iter().zip(&unlimited) {
            assert_eq!(out, expected, "max_batch_size = {max_batch_size}");
            // chains are admitted in groups of `max_batch_size`, each needing 3 exchanges
            assert_eq!(stats.exchanges, exchanges, "max_batch_size = {max_batch_size}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn evaluation_is_deterministic() -> Result<(), Error> {
    for strategy in STRATEGIES {
        let first = parallel_squares(EngineConfig::with_strategy(strategy), 11).await?;
        let second = parallel_squares(EngineConfig::with_strategy(strategy), 11).await?;
        assert_eq!(first, second);
    }
    Ok(())
}

#[tokio::test]
async fn opened_values_are_reused() -> Result<(), Error> {
    let results = simulate_with_stats::<AdditiveSuite, _, _>(
        &EngineConfig::with_strategy(Sequential),
        additive_pools(2, 16, 1),
        |b| {
            let x = b.input(1, (b.party_id() == 1).then_some(77))?;
            let first = b.open(x);
            let second = b.open(x);
            Ok(b.collect(vec![first, second]))
        },
    )
    .await?;
    for (opened, stats) in results {
        assert_eq!(opened[0], opened[1]);
        assert_eq!(opened[0].value(), 77);
        // one exchange for the input, one for the first opening
        assert_eq!(stats.exchanges, 2);
    }
    Ok(())
}

#[tokio::test]
async fn silent_party_times_out() {
    let mut channels = SimpleChannel::channels(2);
    let _silent = channels.pop();
    let network = Network::new(channels.remove(0), 0, 2).unwrap();
    let mut pool = dummy_pools(2, 13).remove(0);
    let config = EngineConfig {
        round_timeout_ms: 50,
        ..EngineConfig::default()
    };
    let engine = Engine::<DummySuite>::new(config).unwrap();
    let err = engine
        .run(
            |b| {
                let x = b.input(0, Some(3))?;
                Ok(b.open(x))
            },
            &mut pool,
            &network,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Connectivity);
    assert!(matches!(
        err,
        Error::Connectivity(channel::Error {
            reason: ErrorKind::Timeout,
            ..
        })
    ));
}

#[tokio::test]
async fn messages_in_final_round_are_rejected() {
    let err = simulate::<DummySuite, _, _>(&EngineConfig::default(), dummy_pools(1, 13), |b| {
        Ok(b.local(&[], |ctx| {
            ctx.network().send_to_all(vec![1]);
            Ok(())
        }))
    })
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        Error::State(StateError::SentInFinalRound { party: 0 })
    ));
}

#[tokio::test]
async fn unread_messages_are_rejected() {
    let err = simulate::<DummySuite, _, _>(&EngineConfig::default(), dummy_pools(1, 13), |b| {
        b.par(|b| {
            let value = b.value(vec![1u8]);
            let all = conclave::broadcast::broadcast(b, value)?;
            b.local(&[], |ctx| {
                ctx.network().send_to_all(vec![2]);
                Ok(())
            });
            Ok(all)
        })
    })
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        Error::State(StateError::UnconsumedMessages { party: 0 })
    ));
}

#[tokio::test]
async fn pools_can_be_reused_across_runs() -> Result<(), Error> {
    let mut pools = additive_pools(2, 32, 21);
    let networks = SimpleChannel::channels(2)
        .into_iter()
        .enumerate()
        .map(|(party, channel)| Network::new(channel, party, 2))
        .collect::<Result<Vec<_>, _>>()?;
    let engine = Engine::<AdditiveSuite>::new(EngineConfig::default())?;

    for value in [10, 20] {
        let runs = pools.iter_mut().zip(&networks).map(|(pool, network)| {
            let engine = &engine;
            async move {
                engine
                    .run(
                        |b| {
                            let x = b.input(0, (b.party_id() == 0).then_some(value))?;
                            Ok(b.open(x))
                        },
                        pool,
                        network,
                    )
                    .await
            }
        });
        let outputs = try_join_all(runs).await?;
        for output in outputs {
            assert_eq!(output.value(), value);
        }
    }
    for pool in &pools {
        assert_eq!(pool.opened().len(), 2);
        assert_eq!(pool.opened().runs(), 2);
    }
    Ok(())
}

#[tokio::test]
async fn dummy_pool_reuse_opens_new_values() -> Result<(), Error> {
    let mut pool = dummy_pools(1, 13).remove(0);
    let network = Network::new(SimpleChannel::channels(1).remove(0), 0, 1)?;
    let engine = Engine::<DummySuite>::new(EngineConfig::default())?;
    for value in [3, 4] {
        let opened = engine
            .run(
                |b| {
                    let x = b.known(value)?;
                    Ok(b.open(x))
                },
                &mut pool,
                &network,
            )
            .await?;
        assert_eq!(opened.value(), value);
    }
    Ok(())
}
