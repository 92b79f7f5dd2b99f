//! End-to-end exercise of the two-round protocol through real share files
//! and local cosigners, without any transport in between.

use rand::rngs::OsRng;
use secrecy::SecretString;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use vigil_core::application::LocalCosigner;
use vigil_core::domain::block::{Hrs, Hrst, Step};
use vigil_core::domain::sign_state::Advance;
use vigil_core::domain::threshold::nonce::{NonceEnvelope, PeerEncryptionKey};
use vigil_core::domain::threshold::sign::{aggregate_commitments, combine_partials, verify_signature, PartialSignature};
use vigil_core::domain::threshold::{deal, Dealing};
use vigil_core::foundation::{ChainId, ShardId};
use vigil_core::infrastructure::keys::ShareStore;
use vigil_core::infrastructure::storage::{SignStateStore, StateKind};
use vigil_core::infrastructure::transport::messages::SignShareRequest;
use vigil_core::VigilError;

const PASSPHRASE: &str = "test-passphrase";

struct Fleet {
    dealing: Dealing,
    cosigners: Vec<Arc<LocalCosigner>>,
    _home: TempDir,
}

fn fleet(threshold: u8, total: u8) -> Fleet {
    let home = TempDir::new().expect("temp dir");
    let dealing = deal(threshold, total, &mut OsRng).expect("deal");
    let roster: Vec<(ShardId, PeerEncryptionKey)> = dealing
        .shards
        .iter()
        .map(|shard| (shard.shard_id, PeerEncryptionKey::from(shard.encryption_public)))
        .collect();
    let passphrase = SecretString::new(PASSPHRASE.to_string());
    let cosigners = dealing
        .shards
        .iter()
        .map(|shard| Arc::new(spawn_cosigner(home.path(), shard, &dealing, &roster, threshold, &passphrase)))
        .collect();
    Fleet { dealing, cosigners, _home: home }
}

fn spawn_cosigner(
    home: &Path,
    shard: &vigil_core::domain::threshold::DealtShard,
    dealing: &Dealing,
    roster: &[(ShardId, PeerEncryptionKey)],
    threshold: u8,
    passphrase: &SecretString,
) -> LocalCosigner {
    let id = shard.shard_id.get();
    let share_path = home.join(format!("share_{id}.json"));
    if !share_path.exists() {
        ShareStore::write(&share_path, shard, dealing.group_pubkey, roster, passphrase).expect("write share");
    }
    let key_share = ShareStore::load(&share_path, passphrase).expect("load share");
    LocalCosigner::new(key_share, threshold, format!("http://cosigner-{id}:2222"), &home.join(format!("state_{id}")), 10_000)
}

fn hrst(height: u64, round: u64, step: Step) -> Hrst {
    Hrst { height, round, step, timestamp_nanos: 99 }
}

/// Run both rounds over a chosen participant subset and return the verified
/// signature.
async fn sign_round(fleet: &Fleet, participants: &[u8], chain: &ChainId, attempt: Hrst, sign_bytes: &[u8]) -> Result<Vec<u8>, VigilError> {
    let mut dealings: Vec<(ShardId, Vec<NonceEnvelope>)> = Vec::new();
    for &id in participants {
        let cosigner = &fleet.cosigners[(id - 1) as usize];
        dealings.push((cosigner.shard_id(), cosigner.get_nonces(chain, attempt).await?));
    }

    let mut partials = Vec::new();
    for &id in participants {
        let cosigner = &fleet.cosigners[(id - 1) as usize];
        let bundle: Vec<NonceEnvelope> = dealings
            .iter()
            .map(|(_, envelopes)| envelopes.iter().find(|e| e.dest_id == cosigner.shard_id()).expect("envelope").clone())
            .collect();
        let request =
            SignShareRequest { chain_id: chain.clone(), hrst: attempt, sign_bytes: sign_bytes.to_vec(), encrypted_secrets: bundle };
        let response = cosigner.set_nonces_and_sign(&request).await?;
        let scalar: [u8; 32] = response.signature.as_slice().try_into().expect("32-byte partial");
        partials.push(PartialSignature { shard_id: cosigner.shard_id(), scalar });
    }

    let commitments: Vec<[u8; 32]> = dealings.iter().map(|(_, envelopes)| envelopes[0].commitment).collect();
    let aggregate = aggregate_commitments(&commitments)?;
    let signature = combine_partials(&partials, &aggregate, &fleet.dealing.group_pubkey, sign_bytes)?;
    verify_signature(&fleet.dealing.group_pubkey, sign_bytes, &signature)?;
    Ok(signature.to_vec())
}

#[tokio::test]
async fn every_quorum_of_a_three_of_five_fleet_signs() {
    let fleet = fleet(3, 5);
    let chain = ChainId::new("proto-1");
    let mut height = 10;
    for participants in [[1u8, 2, 3], [1, 4, 5], [2, 3, 5], [3, 4, 5]] {
        let attempt = hrst(height, 0, Step::Precommit);
        sign_round(&fleet, &participants, &chain, attempt, b"payload").await.expect("quorum signs");
        height += 1;
    }
}

#[tokio::test]
async fn partials_are_single_use_per_attempt() {
    let fleet = fleet(2, 3);
    let chain = ChainId::new("proto-1");
    let attempt = hrst(20, 0, Step::Prevote);
    sign_round(&fleet, &[1, 2], &chain, attempt, b"first").await.expect("sign");

    // The same attempt with a different payload must die at the cosigners.
    let err = sign_round(&fleet, &[1, 2], &chain, attempt, b"second").await.expect_err("must refuse");
    assert!(matches!(err, VigilError::NonceReused { height: 20, .. } | VigilError::DoubleSign { .. }));
}

#[tokio::test]
async fn restarted_cosigner_fails_closed_on_unknown_nonces() {
    let home = TempDir::new().expect("temp dir");
    let dealing = deal(2, 3, &mut OsRng).expect("deal");
    let roster: Vec<(ShardId, PeerEncryptionKey)> = dealing
        .shards
        .iter()
        .map(|shard| (shard.shard_id, PeerEncryptionKey::from(shard.encryption_public)))
        .collect();
    let passphrase = SecretString::new(PASSPHRASE.to_string());

    let chain = ChainId::new("proto-1");
    let attempt = hrst(30, 0, Step::Prevote);
    let cosigner = spawn_cosigner(home.path(), &dealing.shards[0], &dealing, &roster, 2, &passphrase);
    let envelopes = cosigner.get_nonces(&chain, attempt).await.expect("nonces");

    // Restart: same share and state files, empty nonce cache.
    drop(cosigner);
    let cosigner = spawn_cosigner(home.path(), &dealing.shards[0], &dealing, &roster, 2, &passphrase);
    let bundle: Vec<NonceEnvelope> = envelopes.iter().filter(|e| e.dest_id.get() == 1).cloned().collect();
    let request = SignShareRequest {
        chain_id: chain.clone(),
        hrst: attempt,
        sign_bytes: b"payload".to_vec(),
        encrypted_secrets: bundle,
    };
    let err = cosigner.set_nonces_and_sign(&request).await.expect_err("must fail closed");
    assert!(matches!(err, VigilError::NonceNotFound { height: 30, .. } | VigilError::CryptoError { .. }));
}

#[tokio::test]
async fn crash_recovery_replays_committed_state_and_resigns_uncommitted() {
    let dir = TempDir::new().expect("temp dir");
    let chain = ChainId::new("proto-1");

    // Committed before the crash: identical input replays the stored bytes.
    {
        let store = SignStateStore::new(dir.path(), StateKind::Validator);
        let mut session = store.begin(&chain).await.expect("begin");
        session.commit(Hrs::new(40, 0, Step::Prevote), b"abc", &[5u8; 64]).expect("commit");
    }
    let store = SignStateStore::new(dir.path(), StateKind::Validator);
    let session = store.begin(&chain).await.expect("begin");
    match session.check_and_advance(Hrs::new(40, 0, Step::Prevote), b"abc").expect("decision") {
        Advance::Replay(signature) => assert_eq!(signature, vec![5u8; 64]),
        other => panic!("expected replay, got {other:?}"),
    }

    // Never committed: the next attempt proceeds to a fresh signature.
    assert_eq!(session.check_and_advance(Hrs::new(40, 0, Step::Precommit), b"next").expect("decision"), Advance::Proceed);
}
