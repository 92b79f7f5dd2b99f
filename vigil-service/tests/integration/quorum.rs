use crate::harness::{block, chain, TestNetwork};
use std::time::Instant;
use vigil_core::domain::block::Step;
use vigil_core::VigilError;

#[tokio::test]
async fn insufficient_quorum_fails_within_the_grace_window() {
    let mut net = TestNetwork::start(2, 3, 500).await;
    net.node_mut(2).kill();
    net.node_mut(3).kill();

    let started = Instant::now();
    let err = net.node(1).state.validator.sign_block(&chain(), &block(1, 0, Step::Propose, b"p")).await.expect_err("no quorum");
    let elapsed = started.elapsed();

    assert!(matches!(err, VigilError::NoQuorum { required: 2, reachable: 1 }));
    assert!(elapsed.as_millis() < 2_000, "failed after {elapsed:?}, expected within the grace window");
}

#[tokio::test]
async fn quorum_survives_one_dead_cosigner() {
    let mut net = TestNetwork::start(2, 3, 2_000).await;
    net.node_mut(3).kill();

    let signature =
        net.node(1).state.validator.sign_block(&chain(), &block(2, 0, Step::Prevote, b"two of three")).await.expect("sign");
    assert_eq!(signature.len(), 64);
}
