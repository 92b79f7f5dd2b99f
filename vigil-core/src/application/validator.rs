use crate::application::cosigner::Cosigner;
use crate::application::local_cosigner::LocalCosigner;
use crate::domain::block::{Block, Hrst};
use crate::domain::sign_state::{Advance, SignState};
use crate::domain::threshold::nonce::NonceEnvelope;
use crate::domain::threshold::sign::{aggregate_commitments, combine_partials, verify_signature, PartialSignature};
use crate::foundation::util::time::current_timestamp_nanos;
use crate::foundation::{ChainId, ShardId, VigilError, MAX_IN_FLIGHT_PER_CHAIN};
use crate::infrastructure::config::VigilConfig;
use crate::infrastructure::rsm::{ReplicatedLog, SignStateEntry};
use crate::infrastructure::storage::{SignStateStore, StateKind};
use crate::infrastructure::transport::messages::SignShareRequest;
use futures_util::stream::{FuturesUnordered, StreamExt};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};

/// Frozen orchestration parameters, derived from config at startup and passed
/// explicitly instead of living in process-wide state.
#[derive(Clone, Debug)]
pub struct ValidatorCtx {
    pub threshold: u8,
    pub total: u8,
    pub self_shard: ShardId,
    pub grace_window: Duration,
    pub peer_timeout: Duration,
    pub raft_timeout: Duration,
    pub max_in_flight: usize,
}

impl ValidatorCtx {
    pub fn from_config(config: &VigilConfig) -> Result<Self, VigilError> {
        Ok(Self {
            threshold: config.threshold,
            total: config.cosigners.len() as u8,
            self_shard: ShardId::new(config.shard_id)?,
            grace_window: Duration::from_millis(config.grace_window_ms),
            peer_timeout: Duration::from_millis(config.peer_timeout_ms),
            raft_timeout: Duration::from_millis(config.raft_timeout_ms),
            max_in_flight: MAX_IN_FLIGHT_PER_CHAIN,
        })
    }
}

struct Participant {
    shard_id: ShardId,
    envelopes: Vec<NonceEnvelope>,
}

/// Top-level orchestrator: turns one block into one threshold signature by
/// coordinating a quorum of cosigners, with the validator-level sign state as
/// the per-chain serialization point.
pub struct ThresholdValidator {
    ctx: ValidatorCtx,
    cosigners: Vec<Cosigner>,
    local: Arc<LocalCosigner>,
    state: SignStateStore,
    rsm: Arc<dyn ReplicatedLog>,
    group_pubkey: [u8; 32],
    in_flight: Arc<StdMutex<HashMap<ChainId, usize>>>,
}

impl ThresholdValidator {
    pub fn new(
        ctx: ValidatorCtx,
        local: Arc<LocalCosigner>,
        peers: Vec<Cosigner>,
        state_dir: &Path,
        rsm: Arc<dyn ReplicatedLog>,
    ) -> Result<Self, VigilError> {
        let group_pubkey = local.group_pubkey();
        let mut cosigners = vec![Cosigner::Local(local.clone())];
        cosigners.extend(peers);
        cosigners.sort_by_key(Cosigner::id);
        if cosigners.len() != usize::from(ctx.total) {
            return Err(VigilError::ConfigError(format!("expected {} cosigners, wired {}", ctx.total, cosigners.len())));
        }
        Ok(Self {
            ctx,
            cosigners,
            local,
            state: SignStateStore::new(state_dir, StateKind::Validator),
            rsm,
            group_pubkey,
            in_flight: Arc::new(StdMutex::new(HashMap::new())),
        })
    }

    pub fn group_pubkey(&self) -> [u8; 32] {
        self.group_pubkey
    }

    pub fn local(&self) -> &Arc<LocalCosigner> {
        &self.local
    }

    pub fn rsm(&self) -> &Arc<dyn ReplicatedLog> {
        &self.rsm
    }

    pub fn cosigner(&self, shard_id: ShardId) -> Option<&Cosigner> {
        self.cosigners.iter().find(|cosigner| cosigner.id() == shard_id)
    }

    /// Produce (or replay) the signature for one block. The seven-step path:
    /// leader check, state check, quorum selection, nonce exchange, partial
    /// dispatch, aggregation, replicated commit.
    pub async fn sign_block(&self, chain_id: &ChainId, block: &Block) -> Result<Vec<u8>, VigilError> {
        if !self.rsm.is_leader() {
            return Err(VigilError::NotLeader { leader: self.rsm.leader().map(|leader| leader.address) });
        }
        let _slot = InFlightSlot::acquire(&self.in_flight, chain_id, self.ctx.max_in_flight)?;

        let hrs = block.hrs();
        let mut state = self.state.begin(chain_id).await?;

        // A fresh leader may hold stale local state; the replicated log is
        // the fleet's authority.
        if let Ok(Ok(Some(replicated))) = timeout(self.ctx.raft_timeout, self.rsm.get(chain_id)).await {
            state.sync_from_replicated(replicated)?;
        }

        match state.check_and_advance(hrs, &block.sign_bytes)? {
            Advance::Proceed => {}
            Advance::Replay(signature) => {
                info!("serving replayed signature chain_id={} hrs={}", chain_id, hrs);
                return Ok(signature);
            }
        }

        let deadline = Instant::now() + self.ctx.grace_window;
        let hrst = block.hrst();
        let participants = self.gather_nonces(chain_id, hrst, deadline).await?;
        let partials = self.dispatch_sign(chain_id, hrst, &block.sign_bytes, &participants, deadline).await?;

        let commitments: Vec<[u8; 32]> = participants
            .iter()
            .map(|participant| {
                participant.envelopes.first().map(|envelope| envelope.commitment).ok_or_else(|| VigilError::CryptoError {
                    operation: "aggregate".to_string(),
                    details: format!("shard {} dealt no envelopes", participant.shard_id),
                })
            })
            .collect::<Result<_, _>>()?;
        let aggregate = aggregate_commitments(&commitments)?;
        let signature = combine_partials(&partials, &aggregate, &self.group_pubkey, &block.sign_bytes)?;
        verify_signature(&self.group_pubkey, &block.sign_bytes, &signature)?;

        // Replicate before answering; a signature that never reached the
        // fleet's log must not reach the chain either.
        let committed = SignState {
            height: hrs.height,
            round: hrs.round,
            step: hrs.step.as_u8(),
            signature: signature.to_vec(),
            sign_bytes: block.sign_bytes.clone(),
            timestamp_nanos: current_timestamp_nanos()?,
        };
        let entry = SignStateEntry { chain_id: chain_id.clone(), state: committed };
        match timeout(self.ctx.raft_timeout, self.rsm.apply(entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!("replicated commit failed chain_id={} hrs={} error={}", chain_id, hrs, err);
                return Err(match err {
                    VigilError::NotLeader { leader } => VigilError::NotLeader { leader },
                    other => other,
                });
            }
            Err(_) => {
                warn!("replicated commit deadline missed chain_id={} hrs={}", chain_id, hrs);
                return Err(VigilError::NotLeader { leader: self.rsm.leader().map(|leader| leader.address) });
            }
        }
        state.commit(hrs, &block.sign_bytes, &signature)?;

        info!("signed block chain_id={} hrs={} participants={}", chain_id, hrs, participants.len());
        Ok(signature.to_vec())
    }

    /// Round 1: ask every peer for nonces, keep the first t responders (self
    /// always participates), and give stragglers one more chance before the
    /// deadline expires.
    async fn gather_nonces(&self, chain_id: &ChainId, hrst: Hrst, deadline: Instant) -> Result<Vec<Participant>, VigilError> {
        let threshold = usize::from(self.ctx.threshold);
        let own = self.local.get_nonces(chain_id, hrst).await?;
        let mut participants = vec![Participant { shard_id: self.ctx.self_shard, envelopes: own }];

        let mut remaining: Vec<&Cosigner> = self.cosigners.iter().filter(|cosigner| !cosigner.is_local()).collect();
        for pass in 0..2 {
            if participants.len() >= threshold || remaining.is_empty() {
                break;
            }
            let mut pending = FuturesUnordered::new();
            for cosigner in remaining.drain(..) {
                let per_call = self.ctx.peer_timeout;
                pending.push(async move {
                    let result = timeout_at(deadline.min(Instant::now() + per_call), cosigner.get_nonces(chain_id, hrst)).await;
                    (cosigner, result)
                });
            }
            let mut failed = Vec::new();
            while let Some((cosigner, result)) = pending.next().await {
                match result {
                    Ok(Ok(envelopes)) => {
                        debug!("nonces received chain_id={} shard_id={} pass={}", chain_id, cosigner.id(), pass);
                        participants.push(Participant { shard_id: cosigner.id(), envelopes });
                        if participants.len() >= threshold {
                            break;
                        }
                    }
                    Ok(Err(err)) => {
                        warn!("nonce request failed chain_id={} shard_id={} error={}", chain_id, cosigner.id(), err);
                        failed.push(cosigner);
                    }
                    Err(_) => {
                        warn!("nonce request timed out chain_id={} shard_id={}", chain_id, cosigner.id());
                        failed.push(cosigner);
                    }
                }
            }
            remaining = failed;
            if Instant::now() >= deadline {
                break;
            }
        }

        if participants.len() < threshold {
            return Err(VigilError::NoQuorum { required: self.ctx.threshold, reachable: participants.len() as u8 });
        }
        participants.truncate(threshold);
        participants.sort_by_key(|participant| participant.shard_id);
        Ok(participants)
    }

    /// Round 2: hand every participant the envelopes addressed to it and
    /// collect the partials. The participant set is fixed now; a failure here
    /// burns the nonces for this HRS.
    async fn dispatch_sign(
        &self,
        chain_id: &ChainId,
        hrst: Hrst,
        sign_bytes: &[u8],
        participants: &[Participant],
        deadline: Instant,
    ) -> Result<Vec<PartialSignature>, VigilError> {
        let mut pending = FuturesUnordered::new();
        for participant in participants {
            let cosigner = self.cosigner(participant.shard_id).ok_or_else(|| VigilError::InvalidShardId {
                shard_id: participant.shard_id.get(),
                reason: "participant not in roster".to_string(),
            })?;
            let request = SignShareRequest {
                chain_id: chain_id.clone(),
                hrst,
                sign_bytes: sign_bytes.to_vec(),
                encrypted_secrets: bundle_for(participants, participant.shard_id)?,
            };
            pending.push(async move {
                let mut result =
                    timeout_at(deadline, cosigner.set_nonces_and_sign(&request)).await.unwrap_or_else(|_| Err(sign_timeout()));
                // One retry for transient transport failures; protocol
                // refusals are final.
                if result.as_ref().err().map(VigilError::is_transient).unwrap_or(false) && Instant::now() < deadline {
                    result =
                        timeout_at(deadline, cosigner.set_nonces_and_sign(&request)).await.unwrap_or_else(|_| Err(sign_timeout()));
                }
                (cosigner.id(), result)
            });
        }

        let mut partials = Vec::with_capacity(participants.len());
        while let Some((shard_id, result)) = pending.next().await {
            let response = result.map_err(|err| {
                error!("partial sign failed chain_id={} shard_id={} error={}", chain_id, shard_id, err);
                err
            })?;
            let scalar: [u8; 32] = response.signature.as_slice().try_into().map_err(|_| VigilError::BadPartial {
                details: format!("shard {} returned a {}-byte partial", shard_id, response.signature.len()),
            })?;
            partials.push(PartialSignature { shard_id, scalar });
        }
        partials.sort_by_key(|partial| partial.shard_id);
        Ok(partials)
    }

    pub fn is_leader(&self) -> bool {
        self.rsm.is_leader()
    }

    pub fn leader_address(&self) -> Option<String> {
        self.rsm.leader().map(|leader| leader.address)
    }

    pub async fn transfer_leadership(&self, target: Option<ShardId>) -> Result<Option<(ShardId, String)>, VigilError> {
        let next = self.rsm.transfer_leadership(target).await?;
        Ok(next.map(|leader| (leader.shard_id, leader.address)))
    }
}

/// Assemble the round-2 bundle for `dest`: every participant's envelope
/// addressed to that shard, the destination's own included.
fn bundle_for(participants: &[Participant], dest: ShardId) -> Result<Vec<NonceEnvelope>, VigilError> {
    participants
        .iter()
        .map(|participant| {
            participant
                .envelopes
                .iter()
                .find(|envelope| envelope.dest_id == dest)
                .cloned()
                .ok_or_else(|| VigilError::CryptoError {
                    operation: "dispatch".to_string(),
                    details: format!("shard {} dealt no envelope for shard {}", participant.shard_id, dest),
                })
        })
        .collect()
}

fn sign_timeout() -> VigilError {
    VigilError::Timeout { operation: "set_nonces_and_sign".to_string(), timeout_ms: 0 }
}

/// Bounded in-flight accounting per chain; drops decrement.
struct InFlightSlot {
    map: Arc<StdMutex<HashMap<ChainId, usize>>>,
    chain_id: ChainId,
}

impl InFlightSlot {
    fn acquire(map: &Arc<StdMutex<HashMap<ChainId, usize>>>, chain_id: &ChainId, limit: usize) -> Result<Self, VigilError> {
        let mut chains = map.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = chains.entry(chain_id.clone()).or_insert(0);
        if *count >= limit {
            return Err(VigilError::Busy { chain_id: chain_id.to_string(), in_flight: *count });
        }
        *count += 1;
        Ok(Self { map: map.clone(), chain_id: chain_id.clone() })
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        if let Ok(mut chains) = self.map.lock() {
            if let Some(count) = chains.get_mut(&self.chain_id) {
                *count = count.saturating_sub(1);
            }
        }
    }
}
