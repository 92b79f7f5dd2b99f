use crate::harness::{chain, verify_group_signature, TestNetwork};
use serde_json::json;
use vigil_core::foundation::util::encoding::decode_base64;

#[tokio::test]
async fn sign_vote_through_a_follower_reaches_the_leader() {
    let net = TestNetwork::start(2, 3, 2_000).await;
    let client = reqwest::Client::new();

    // The chain node talks to cosigner 2, which is not the leader; its
    // gateway forwards to cosigner 1 and hands back the full signature.
    let body = json!({
        "type": "sign_vote",
        "chain_id": chain().as_str(),
        "vote": {
            "height": 300,
            "round": 0,
            "step": 2,
            "sign_bytes": "dm90ZSBwYXlsb2Fk",
            "timestamp_nanos": 1_700_000_000_000_000_300u64,
        }
    });
    let response = client
        .post(format!("{}/v1/privval", net.node(2).base_url()))
        .json(&body)
        .send()
        .await
        .expect("request");
    assert!(response.status().is_success(), "privval sign failed: {}", response.status());

    let payload: serde_json::Value = response.json().await.expect("json");
    assert_eq!(payload["type"], "signature");
    let signature = decode_base64(payload["signature"].as_str().expect("signature field")).expect("base64");
    verify_group_signature(&net.group_pubkey, b"vote payload", &signature);
}

#[tokio::test]
async fn pub_key_request_returns_the_group_key() {
    let net = TestNetwork::start(2, 3, 2_000).await;
    let client = reqwest::Client::new();

    let body = json!({ "type": "pub_key", "chain_id": chain().as_str() });
    let response = client
        .post(format!("{}/v1/privval", net.node(1).base_url()))
        .json(&body)
        .send()
        .await
        .expect("request");
    let payload: serde_json::Value = response.json().await.expect("json");
    assert_eq!(payload["type"], "pub_key");
    assert_eq!(payload["pub_key"].as_str().expect("pub_key field"), hex::encode(net.group_pubkey));
}
