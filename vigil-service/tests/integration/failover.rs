use crate::harness::{block, chain, verify_group_signature, TestNetwork};
use std::time::Duration;
use vigil_core::domain::block::Step;
use vigil_core::foundation::ShardId;
use vigil_core::infrastructure::transport::RemoteCosigner;
use vigil_core::VigilError;

#[tokio::test]
async fn follower_rejects_with_leader_address() {
    let net = TestNetwork::start(2, 3, 2_000).await;
    let follower = &net.node(2).state;

    let err = follower.validator.sign_block(&chain(), &block(5, 0, Step::Propose, b"p")).await.expect_err("not leader");
    match err {
        VigilError::NotLeader { leader: Some(address) } => assert_eq!(address, net.node(1).base_url()),
        other => panic!("expected NotLeader with address, got {other:?}"),
    }
}

#[tokio::test]
async fn follower_gateway_forwards_to_leader() {
    let net = TestNetwork::start(2, 3, 2_000).await;
    let follower = &net.node(3).state;

    let request = block(7, 0, Step::Prevote, b"forwarded");
    let signature = follower.gateway.sign_block(&chain(), &request).await.expect("forwarded sign");
    verify_group_signature(&net.group_pubkey, b"forwarded", &signature);
}

#[tokio::test]
async fn new_leader_completes_an_interrupted_attempt() {
    let mut net = TestNetwork::start(2, 3, 2_000).await;
    let attempt = block(200, 0, Step::Precommit, b"interrupted");

    // The old leader finished round 1 with shards 2 and 3 and then died
    // before dispatching round 2 or committing anything.
    for shard_id in [2u8, 3u8] {
        let peer = RemoteCosigner::new(ShardId::new(shard_id).expect("shard id"), net.node(shard_id).base_url(), Duration::from_secs(1))
            .expect("client");
        peer.get_nonces(&chain(), attempt.hrst()).await.expect("round 1");
    }
    net.node_mut(1).kill();
    net.set_leader(Some(2));

    // The upstream re-request lands on the new leader and must succeed with
    // the surviving cosigners; the fleet state advances exactly once.
    let signature = net.node(2).state.validator.sign_block(&chain(), &attempt).await.expect("re-sign");
    verify_group_signature(&net.group_pubkey, b"interrupted", &signature);

    let shared = net.shared.lock().expect("fleet state");
    let state = shared.states.get(&chain()).expect("replicated state");
    assert_eq!((state.height, state.round, state.step), (200, 0, 3));
    assert_eq!(state.signature, signature);
}

#[tokio::test]
async fn deposed_leader_cannot_sign_or_advance_fleet_state() {
    let net = TestNetwork::start(2, 3, 2_000).await;
    let leader = net.node(1).state.validator.clone();

    let first = leader.sign_block(&chain(), &block(10, 0, Step::Prevote, b"a")).await.expect("baseline sign");
    verify_group_signature(&net.group_pubkey, b"a", &first);

    net.set_leader(Some(3));
    let err = leader.sign_block(&chain(), &block(11, 0, Step::Prevote, b"b")).await.expect_err("no longer leader");
    assert!(matches!(err, VigilError::NotLeader { .. }));

    let shared = net.shared.lock().expect("fleet state");
    let state = shared.states.get(&chain()).expect("replicated state");
    assert_eq!(state.height, 10);
}

#[tokio::test]
async fn leadership_transfer_rpc_moves_the_leader() {
    let net = TestNetwork::start(2, 3, 2_000).await;
    let leader = &net.node(1).state;

    let next = leader.validator.transfer_leadership(Some(ShardId::new(3).expect("shard id"))).await.expect("transfer");
    let (next_shard, next_address) = next.expect("new leader");
    assert_eq!(next_shard.get(), 3);
    assert_eq!(next_address, net.node(3).base_url());
    assert!(!leader.validator.is_leader());
    assert!(net.node(3).state.validator.is_leader());
}
