use crate::application::nonce_cache::{NonceCache, NonceEntry, SealedPartial};
use crate::domain::block::Hrst;
use crate::domain::sign_state::Advance;
use crate::domain::threshold::nonce::{seal_nonce_shares, Nonce, NonceEnvelope};
use crate::domain::threshold::sign::{aggregate_commitments, challenge, partial_sign};
use crate::foundation::util::time::current_timestamp_nanos;
use crate::foundation::{ChainId, Hash32, ShardId, VigilError, NANOS_PER_MILLI};
use crate::infrastructure::keys::KeyShare;
use crate::infrastructure::storage::{SignStateStore, StateKind};
use crate::infrastructure::transport::messages::{SignShareRequest, SignShareResponse};
use curve25519_dalek::scalar::Scalar;
use log::{debug, info, warn};
use rand::rngs::OsRng;
use std::path::Path;

/// The share-holding half of a cosigner: deals nonces on request and turns a
/// complete nonce bundle into one partial signature, exactly once per HRS.
///
/// Its own sign-state file guards the shard even against a buggy
/// orchestrator: no two conflicting partials ever leave this process.
pub struct LocalCosigner {
    key_share: KeyShare,
    threshold: u8,
    address: String,
    cache: NonceCache,
    share_state: SignStateStore,
}

impl LocalCosigner {
    pub fn new(key_share: KeyShare, threshold: u8, address: impl Into<String>, state_dir: &Path, nonce_ttl_ms: u64) -> Self {
        Self {
            key_share,
            threshold,
            address: address.into(),
            cache: NonceCache::new(nonce_ttl_ms.saturating_mul(NANOS_PER_MILLI)),
            share_state: SignStateStore::new(state_dir, StateKind::Shard),
        }
    }

    pub fn shard_id(&self) -> ShardId {
        self.key_share.shard_id()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn group_pubkey(&self) -> [u8; 32] {
        self.key_share.group_pubkey()
    }

    /// Round 1: deal (or replay) this shard's nonce for the given attempt.
    /// Idempotent per HRS: a repeat call returns byte-identical envelopes.
    pub async fn get_nonces(&self, chain_id: &ChainId, hrst: Hrst) -> Result<Vec<NonceEnvelope>, VigilError> {
        let hrs = hrst.hrs();
        let now = current_timestamp_nanos()?;
        let slot = self.cache.get_or_create(chain_id, hrs, now);
        let mut entry = slot.lock().await;
        if let Some(entry) = entry.as_ref() {
            debug!("replaying cached nonces chain_id={} hrs={}", chain_id, hrs);
            return Ok(entry.envelopes.clone());
        }

        let nonce = Nonce::generate(&mut OsRng);
        let envelopes = seal_nonce_shares(&nonce, self.shard_id(), self.threshold, &self.key_share.roster(), &mut OsRng)?;
        debug!("dealt nonces chain_id={} hrs={} envelopes={}", chain_id, hrs, envelopes.len());
        *entry = Some(NonceEntry { nonce, envelopes: envelopes.clone(), sealed: None, created_at_nanos: now });
        Ok(envelopes)
    }

    /// Round 2: decrypt the bundle, emit the partial and seal the entry.
    pub async fn set_nonces_and_sign(&self, request: &SignShareRequest) -> Result<SignShareResponse, VigilError> {
        let hrs = request.hrst.hrs();
        let slot = self.cache.lookup(&request.chain_id, hrs).ok_or(VigilError::NonceNotFound {
            height: hrs.height,
            round: hrs.round,
            step: hrs.step.as_u8(),
        })?;
        let mut entry_guard = slot.lock().await;
        let entry = entry_guard.as_mut().ok_or(VigilError::NonceNotFound {
            height: hrs.height,
            round: hrs.round,
            step: hrs.step.as_u8(),
        })?;

        self.validate_bundle(&request.encrypted_secrets)?;
        let session_digest = session_digest(&request.sign_bytes, &request.encrypted_secrets);

        if let Some(sealed) = entry.sealed.as_ref() {
            if sealed.session_digest == session_digest {
                debug!("replaying sealed partial chain_id={} hrs={}", request.chain_id, hrs);
                return Ok(SignShareResponse { timestamp_nanos: sealed.timestamp_nanos, signature: sealed.partial.to_vec() });
            }
            warn!("refusing conflicting reuse of consumed nonce chain_id={} hrs={}", request.chain_id, hrs);
            return Err(VigilError::NonceReused { height: hrs.height, round: hrs.round, step: hrs.step.as_u8() });
        }

        // Shard-level double-sign guard, independent of the validator's.
        let mut state = self.share_state.begin(&request.chain_id).await?;
        match state.check_and_advance(hrs, &request.sign_bytes)? {
            Advance::Proceed => {}
            Advance::Replay(partial) => {
                // A partial for this exact attempt was committed before a
                // restart; hand it back rather than ever signing twice.
                debug!("replaying committed partial chain_id={} hrs={}", request.chain_id, hrs);
                return Ok(SignShareResponse { timestamp_nanos: state.state().timestamp_nanos, signature: partial });
            }
        }

        let mut contribution = Scalar::ZERO;
        for envelope in &request.encrypted_secrets {
            contribution += self.key_share.open(envelope)?;
        }

        let commitments: Vec<[u8; 32]> = request.encrypted_secrets.iter().map(|e| e.commitment).collect();
        let aggregate = aggregate_commitments(&commitments)?;
        let challenge = challenge(&aggregate, &self.key_share.group_pubkey(), &request.sign_bytes);
        let partial = partial_sign(&contribution, self.key_share.scalar(), &challenge);

        state.commit(hrs, &request.sign_bytes, &partial)?;
        let timestamp_nanos = current_timestamp_nanos()?;
        entry.sealed = Some(SealedPartial { session_digest, partial, timestamp_nanos });
        drop(entry_guard);
        let evicted = self.cache.evict_below(&request.chain_id, hrs);
        if evicted > 0 {
            debug!("evicted {} stale nonce entries chain_id={}", evicted, request.chain_id);
        }

        info!("signed with shard chain_id={} shard_id={} hrs={}", request.chain_id, self.shard_id(), hrs);
        Ok(SignShareResponse { timestamp_nanos, signature: partial.to_vec() })
    }

    fn validate_bundle(&self, envelopes: &[NonceEnvelope]) -> Result<(), VigilError> {
        if envelopes.len() != usize::from(self.threshold) {
            return Err(VigilError::CryptoError {
                operation: "set_nonces".to_string(),
                details: format!("expected {} envelopes, got {}", self.threshold, envelopes.len()),
            });
        }
        let mut sources: Vec<ShardId> = envelopes.iter().map(|e| e.source_id).collect();
        sources.sort_unstable();
        sources.dedup();
        if sources.len() != envelopes.len() {
            return Err(VigilError::CryptoError {
                operation: "set_nonces".to_string(),
                details: "duplicate source shard in bundle".to_string(),
            });
        }
        for envelope in envelopes {
            if envelope.dest_id != self.shard_id() {
                return Err(VigilError::CryptoError {
                    operation: "set_nonces".to_string(),
                    details: format!("envelope addressed to shard {}, we are {}", envelope.dest_id, self.shard_id()),
                });
            }
        }
        Ok(())
    }

    /// TTL sweep hook for the background tick.
    pub fn sweep_nonces(&self) -> usize {
        match current_timestamp_nanos() {
            Ok(now) => self.cache.sweep(now),
            Err(_) => 0,
        }
    }
}

/// Digest of everything a partial commits to: the payload and the
/// participating nonce set. An identical request replays; anything else at
/// the same HRS is a reuse attempt.
fn session_digest(sign_bytes: &[u8], envelopes: &[NonceEnvelope]) -> Hash32 {
    let mut commitments: Vec<(u8, [u8; 32])> = envelopes.iter().map(|e| (e.source_id.get(), e.commitment)).collect();
    commitments.sort_unstable();
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(sign_bytes.len() as u64).to_le_bytes());
    hasher.update(sign_bytes);
    for (source, commitment) in &commitments {
        hasher.update(&[*source]);
        hasher.update(commitment);
    }
    *hasher.finalize().as_bytes()
}
