use crate::harness::{block, chain, verify_group_signature, TestNetwork};
use std::time::Duration;
use vigil_core::domain::block::Step;
use vigil_core::domain::sign_state::SignState;
use vigil_core::foundation::ShardId;
use vigil_core::infrastructure::transport::RemoteCosigner;
use vigil_core::VigilError;

fn stored_state(net: &TestNetwork, shard_id: u8) -> SignState {
    let path = net.node(shard_id).config.state_dir().join(format!("{}_priv_validator_state.json", chain()));
    let raw = std::fs::read(path).expect("state file");
    serde_json::from_slice(&raw).expect("state json")
}

#[tokio::test]
async fn happy_path_two_of_three() {
    let net = TestNetwork::start(2, 3, 2_000).await;
    let leader = &net.node(1).state;

    let request = block(100, 0, Step::Prevote, b"abc");
    let signature = leader.validator.sign_block(&chain(), &request).await.expect("sign");

    assert_eq!(signature.len(), 64);
    verify_group_signature(&net.group_pubkey, b"abc", &signature);

    let state = stored_state(&net, 1);
    assert_eq!((state.height, state.round, state.step), (100, 0, 2));
}

#[tokio::test]
async fn replay_returns_identical_signature() {
    let net = TestNetwork::start(2, 3, 2_000).await;
    let leader = &net.node(1).state;

    let request = block(100, 0, Step::Prevote, b"abc");
    let first = leader.validator.sign_block(&chain(), &request).await.expect("sign");
    let second = leader.validator.sign_block(&chain(), &request).await.expect("replay");
    assert_eq!(first, second);
}

#[tokio::test]
async fn double_sign_refused_and_state_unchanged() {
    let net = TestNetwork::start(2, 3, 2_000).await;
    let leader = &net.node(1).state;

    let request = block(100, 0, Step::Prevote, b"abc");
    leader.validator.sign_block(&chain(), &request).await.expect("sign");
    let before = stored_state(&net, 1);

    let conflicting = block(100, 0, Step::Prevote, b"DIFFERENT");
    let err = leader.validator.sign_block(&chain(), &conflicting).await.expect_err("must refuse");
    assert!(matches!(err, VigilError::DoubleSign { height: 100, round: 0, step: 2, .. }));

    assert_eq!(stored_state(&net, 1), before);
}

#[tokio::test]
async fn state_advances_monotonically() {
    let net = TestNetwork::start(2, 3, 2_000).await;
    let leader = &net.node(1).state;

    leader.validator.sign_block(&chain(), &block(100, 0, Step::Prevote, b"abc")).await.expect("prevote");
    leader.validator.sign_block(&chain(), &block(100, 0, Step::Precommit, b"xyz")).await.expect("precommit");
    assert_eq!(stored_state(&net, 1).step, 3);

    let err = leader.validator.sign_block(&chain(), &block(100, 0, Step::Prevote, b"late")).await.expect_err("must refuse");
    assert!(matches!(err, VigilError::DoubleSign { .. }));
}

#[tokio::test]
async fn get_nonces_is_idempotent_over_the_wire() {
    let net = TestNetwork::start(2, 3, 2_000).await;
    let peer = RemoteCosigner::new(ShardId::new(2).expect("shard id"), net.node(2).base_url(), Duration::from_secs(1))
        .expect("client");

    let hrst = block(42, 0, Step::Propose, b"p").hrst();
    let first = peer.get_nonces(&chain(), hrst).await.expect("nonces");
    let second = peer.get_nonces(&chain(), hrst).await.expect("nonces again");
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}
