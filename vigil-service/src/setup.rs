use crate::api::AppState;
use crate::gateway::Gateway;
use log::{debug, info};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use vigil_core::application::{Cosigner, LocalCosigner, ThresholdValidator, ValidatorCtx};
use vigil_core::foundation::{ShardId, NONCE_SWEEP_INTERVAL_MS};
use vigil_core::infrastructure::config::{validate_config, VigilConfig};
use vigil_core::infrastructure::keys::ShareStore;
use vigil_core::infrastructure::rsm::{LeaderInfo, MemoryLog, ReplicatedLog};
use vigil_core::infrastructure::transport::RemoteCosigner;
use vigil_core::VigilError;

/// Wire the whole cosigner from a validated config: share file, local
/// cosigner, peer stubs, replicated log and orchestrator.
///
/// The replicated log defaults to the in-process implementation; clustered
/// deployments inject any `ReplicatedLog` satisfying the contract.
pub fn build_state(config: &VigilConfig, passphrase: &SecretString) -> Result<AppState, VigilError> {
    build_state_with_log(config, passphrase, None)
}

pub fn build_state_with_log(
    config: &VigilConfig,
    passphrase: &SecretString,
    rsm: Option<Arc<dyn ReplicatedLog>>,
) -> Result<AppState, VigilError> {
    validate_config(config)?;

    let key_share = ShareStore::load(&config.share_file(), passphrase)?;
    if key_share.shard_id().get() != config.shard_id {
        return Err(VigilError::ConfigError(format!(
            "share file holds shard {}, config says {}",
            key_share.shard_id(),
            config.shard_id
        )));
    }
    if key_share.total_shards() != config.cosigners.len() as u8 {
        return Err(VigilError::ConfigError(format!(
            "share file knows {} peers, config lists {}",
            key_share.total_shards(),
            config.cosigners.len()
        )));
    }
    info!(
        "loaded key share shard_id={} cosigners={} threshold={}",
        key_share.shard_id(),
        config.cosigners.len(),
        config.threshold
    );

    let own_peer = config
        .peer(config.shard_id)
        .ok_or_else(|| VigilError::ConfigError(format!("own shard {} missing from roster", config.shard_id)))?;
    let local = Arc::new(LocalCosigner::new(
        key_share,
        config.threshold,
        own_peer.p2p_addr.clone(),
        &config.state_dir(),
        config.nonce_ttl_ms,
    ));

    let peer_timeout = Duration::from_millis(config.peer_timeout_ms);
    let mut peers = Vec::new();
    for peer in config.cosigners.iter().filter(|peer| peer.shard_id != config.shard_id) {
        peers.push(Cosigner::Remote(RemoteCosigner::new(ShardId::new(peer.shard_id)?, peer.p2p_addr.clone(), peer_timeout)?));
    }

    let rsm = match rsm {
        Some(rsm) => rsm,
        None => {
            let roster: Vec<LeaderInfo> = config
                .cosigners
                .iter()
                .map(|peer| Ok(LeaderInfo { shard_id: ShardId::new(peer.shard_id)?, address: peer.p2p_addr.clone() }))
                .collect::<Result<_, VigilError>>()?;
            let own = LeaderInfo { shard_id: ShardId::new(config.shard_id)?, address: own_peer.p2p_addr.clone() };
            Arc::new(MemoryLog::new(own, roster)) as Arc<dyn ReplicatedLog>
        }
    };

    let ctx = ValidatorCtx::from_config(config)?;
    let validator = Arc::new(ThresholdValidator::new(ctx, local, peers, &config.state_dir(), rsm)?);
    let roster = config
        .cosigners
        .iter()
        .map(|peer| Ok((ShardId::new(peer.shard_id)?, peer.p2p_addr.clone())))
        .collect::<Result<_, VigilError>>()?;
    let gateway = Arc::new(Gateway::new(validator.clone(), roster, peer_timeout));
    Ok(AppState { validator, gateway })
}

/// Background TTL sweep of the nonce cache.
pub fn spawn_nonce_sweeper(validator: Arc<ThresholdValidator>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(NONCE_SWEEP_INTERVAL_MS));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            let swept = validator.local().sweep_nonces();
            if swept > 0 {
                debug!("swept {} expired nonce entries", swept);
            }
        }
    })
}
