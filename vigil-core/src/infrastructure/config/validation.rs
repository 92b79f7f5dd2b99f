use crate::foundation::{VigilError, MAX_COSIGNERS, MIN_THRESHOLD};
use crate::infrastructure::config::VigilConfig;

/// Reject configurations that could never assemble a safe quorum. Shard ids
/// must be dense 1..=N, and the signing threshold must be a strict majority
/// so two disjoint quorums cannot both sign.
pub fn validate_config(config: &VigilConfig) -> Result<(), VigilError> {
    let total = config.cosigners.len();
    if total < 2 {
        return Err(VigilError::ConfigError(format!("at least 2 cosigners required, got {total}")));
    }
    if total > usize::from(MAX_COSIGNERS) {
        return Err(VigilError::ConfigError(format!("at most {MAX_COSIGNERS} cosigners supported, got {total}")));
    }

    let mut ids: Vec<u8> = config.cosigners.iter().map(|peer| peer.shard_id).collect();
    ids.sort_unstable();
    let expected: Vec<u8> = (1..=total as u8).collect();
    if ids != expected {
        return Err(VigilError::ConfigError(format!("shard ids must be dense 1..={total}, got {ids:?}")));
    }

    if config.threshold < MIN_THRESHOLD {
        return Err(VigilError::ConfigError(format!("threshold must be at least {MIN_THRESHOLD}, got {}", config.threshold)));
    }
    if usize::from(config.threshold) > total {
        return Err(VigilError::ConfigError(format!("threshold {} exceeds cosigner count {total}", config.threshold)));
    }
    if usize::from(config.threshold) * 2 <= total {
        return Err(VigilError::ConfigError(format!(
            "threshold {} is not a majority of {total} cosigners; two disjoint quorums could sign",
            config.threshold
        )));
    }

    if config.peer(config.shard_id).is_none() {
        return Err(VigilError::ConfigError(format!("own shard id {} is not in the cosigner roster", config.shard_id)));
    }

    for peer in &config.cosigners {
        if peer.p2p_addr.trim().is_empty() || peer.raft_addr.trim().is_empty() {
            return Err(VigilError::ConfigError(format!("cosigner {} has an empty address", peer.shard_id)));
        }
    }

    Ok(())
}
