use crate::foundation::{DEFAULT_GRACE_WINDOW_MS, DEFAULT_NONCE_TTL_MS, DEFAULT_PEER_TIMEOUT_MS, DEFAULT_RAFT_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One cosigner in the roster, ours included.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CosignerPeerConfig {
    pub shard_id: u8,
    /// Peer RPC endpoint, e.g. `http://cosigner-2:2222`.
    pub p2p_addr: String,
    /// Replicated-log endpoint for the same peer.
    pub raft_addr: String,
    /// Identity from the share ceremony; informational at runtime.
    #[serde(default)]
    pub dkg_id: String,
}

/// Frozen service configuration. The loader (service crate) fills this from
/// TOML plus environment overrides; after `validate_config` passes it is
/// never mutated.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VigilConfig {
    /// Signing threshold t. Must be at least 2 and a majority of the roster.
    pub threshold: u8,
    pub cosigners: Vec<CosignerPeerConfig>,
    /// Our own shard id; must appear in `cosigners`.
    pub shard_id: u8,
    /// Peer RPC listen address.
    pub p2p_listen: String,
    /// Privval endpoints of the chain nodes this validator serves.
    #[serde(default)]
    pub chain_nodes: Vec<String>,
    pub home_dir: PathBuf,
    #[serde(default = "default_grace_window_ms")]
    pub grace_window_ms: u64,
    #[serde(default = "default_nonce_ttl_ms")]
    pub nonce_ttl_ms: u64,
    #[serde(default = "default_raft_timeout_ms")]
    pub raft_timeout_ms: u64,
    #[serde(default = "default_peer_timeout_ms")]
    pub peer_timeout_ms: u64,
}

impl VigilConfig {
    pub fn state_dir(&self) -> PathBuf {
        self.home_dir.join("state")
    }

    pub fn share_file(&self) -> PathBuf {
        self.home_dir.join(format!("share_{}.json", self.shard_id))
    }

    pub fn peer(&self, shard_id: u8) -> Option<&CosignerPeerConfig> {
        self.cosigners.iter().find(|peer| peer.shard_id == shard_id)
    }
}

fn default_grace_window_ms() -> u64 {
    DEFAULT_GRACE_WINDOW_MS
}

fn default_nonce_ttl_ms() -> u64 {
    DEFAULT_NONCE_TTL_MS
}

fn default_raft_timeout_ms() -> u64 {
    DEFAULT_RAFT_TIMEOUT_MS
}

fn default_peer_timeout_ms() -> u64 {
    DEFAULT_PEER_TIMEOUT_MS
}
