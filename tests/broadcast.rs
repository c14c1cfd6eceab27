use conclave::{
    broadcast::{BroadcastValidation, broadcast, coin_toss, commit_and_open, open_all},
    commitment::{Commitment, Opening, commit},
    config::{EngineConfig, EvaluationStrategy},
    error::{ConsistencyError, Error, FailureKind},
    protocol::Protocol,
    ring::Ring,
    simulation::{seeded_pools, simulate},
    suite::dummy::{DummyState, DummySuite},
};

fn pools(parties: usize) -> Vec<conclave::pool::ResourcePool<DummyState>> {
    let ring = Ring::power_of_two(64).unwrap();
    seeded_pools(parties, 99, |_| DummyState::new(ring)).unwrap()
}

fn contribution(party: usize) -> Vec<u8> {
    (0..32).map(|i| (party * 32 + i) as u8).collect()
}

#[tokio::test]
async fn broadcast_returns_values_in_party_order() -> Result<(), Error> {
    for parties in [1, 2, 3, 5] {
        for strategy in [EvaluationStrategy::Sequential, EvaluationStrategy::SequentialBatched] {
            let outputs = simulate::<DummySuite, _, _>(
                &EngineConfig::with_strategy(strategy),
                pools(parties),
                |b| {
                    let value = b.value(contribution(b.party_id()));
                    broadcast(b, value)
                },
            )
            .await?;
            let expected: Vec<Vec<u8>> = (0..parties).map(contribution).collect();
            assert_eq!(outputs, vec![expected; parties]);
        }
    }
    Ok(())
}

#[tokio::test]
async fn committed_values_are_opened_to_everyone() -> Result<(), Error> {
    let outputs = simulate::<DummySuite, _, _>(&EngineConfig::default(), pools(3), |b| {
        let value = b.value(contribution(b.party_id()));
        commit_and_open(b, value)
    })
    .await?;
    let expected: Vec<Vec<u8>> = (0..3).map(contribution).collect();
    for output in outputs {
        assert_eq!(output, expected);
    }
    Ok(())
}

#[tokio::test]
async fn coin_toss_agrees() -> Result<(), Error> {
    let config = EngineConfig::default();
    let outputs = simulate::<DummySuite, _, _>(&config, pools(4), coin_toss).await?;
    assert!(outputs.windows(2).all(|w| w[0] == w[1]));
    assert_ne!(outputs[0], [0; 32]);

    let again = simulate::<DummySuite, _, _>(&config, pools(4), coin_toss).await?;
    assert_eq!(outputs, again);
    Ok(())
}

#[tokio::test]
async fn parallel_broadcasts_share_rounds() -> Result<(), Error> {
    let outputs = simulate::<DummySuite, _, _>(&EngineConfig::default(), pools(3), |b| {
        let me = b.party_id();
        let all = b.par(|b| {
            (0..4)
                .map(|i| {
                    let value = b.value(vec![me as u8, i]);
                    broadcast(b, value)
                })
                .collect::<Result<Vec<_>, _>>()
        })?;
        Ok(b.collect(all))
    })
    .await?;
    for output in outputs {
        for (i, values) in output.iter().enumerate() {
            let expected: Vec<Vec<u8>> = (0..3).map(|p| vec![p as u8, i as u8]).collect();
            assert_eq!(values, &expected);
        }
    }
    Ok(())
}

#[tokio::test]
async fn inconsistent_views_are_detected() {
    let err = simulate::<DummySuite, _, _>(&EngineConfig::default(), pools(3), |b| {
        // party 1 claims to have received something different from party 0
        let view = if b.party_id() == 1 {
            vec![vec![7], vec![1], vec![2]]
        } else {
            vec![vec![0], vec![1], vec![2]]
        };
        let view = b.value(view);
        Ok(b.append::<Vec<Vec<u8>>>(
            Protocol::BroadcastValidation(BroadcastValidation::new(view)),
            &[view.node()],
        ))
    })
    .await
    .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Consistency);
    assert!(matches!(
        err,
        Error::Consistency(ConsistencyError::InconsistentBroadcast { .. })
    ));
}

#[tokio::test]
async fn tampered_opening_is_detected() {
    let err = simulate::<DummySuite, _, _>(&EngineConfig::default(), pools(3), |b| {
        let me = b.party_id();
        let committed = b.local(&[], move |ctx| {
            Ok(commit(ctx.pool().secure_rng(), &contribution(me)))
        });
        let commitment = b.map(committed, |(c, _): (Commitment, Opening)| {
            Ok(c.to_bytes().to_vec())
        });
        let commitments = broadcast(b, commitment)?;
        // party 1 changes its value after committing to it
        let opening = b.map(committed, move |(_, o): (Commitment, Opening)| {
            let mut bytes = o.to_bytes();
            if me == 1 {
                bytes[0] ^= 1;
            }
            Ok(bytes)
        });
        let openings = broadcast(b, opening)?;
        Ok(b.map2(commitments, openings, |c: Vec<Vec<u8>>, o: Vec<Vec<u8>>| {
            open_all(&c, &o)
        }))
    })
    .await
    .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Consistency);
    assert!(matches!(
        err,
        Error::Consistency(ConsistencyError::CommitmentMismatch { party: 1 })
    ));
}
