//! In-process cosigner fleet for integration tests: real share files, real
//! HTTP peer RPC on loopback, and a shared replicated log whose leadership
//! the tests can move around.

use async_trait::async_trait;
use rand::rngs::OsRng;
use secrecy::SecretString;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use vigil_core::domain::block::{Block, Step};
use vigil_core::domain::sign_state::SignState;
use vigil_core::domain::threshold::deal;
use vigil_core::domain::threshold::nonce::PeerEncryptionKey;
use vigil_core::foundation::{ChainId, ShardId};
use vigil_core::infrastructure::config::{CosignerPeerConfig, VigilConfig};
use vigil_core::infrastructure::keys::ShareStore;
use vigil_core::infrastructure::rsm::{LeaderInfo, ReplicatedLog, SignStateEntry};
use vigil_core::VigilError;
use vigil_service::api::{build_router, AppState};
use vigil_service::setup::build_state_with_log;

pub const TEST_PASSPHRASE: &str = "test-passphrase";

pub struct FleetState {
    pub states: HashMap<ChainId, SignState>,
    pub leader: Option<ShardId>,
}

/// Per-node handle onto the fleet-shared log.
pub struct FleetLog {
    shared: Arc<Mutex<FleetState>>,
    own: LeaderInfo,
    roster: Vec<LeaderInfo>,
}

#[async_trait]
impl ReplicatedLog for FleetLog {
    async fn apply(&self, entry: SignStateEntry) -> Result<(), VigilError> {
        let mut shared = self.shared.lock().expect("fleet log lock");
        if shared.leader != Some(self.own.shard_id) {
            return Err(VigilError::NotLeader { leader: self.leader_address_locked(&shared) });
        }
        let stale = shared
            .states
            .get(&entry.chain_id)
            .map(|current| entry.state.hrs_key() <= current.hrs_key())
            .unwrap_or(false);
        if !stale {
            shared.states.insert(entry.chain_id, entry.state);
        }
        Ok(())
    }

    async fn get(&self, chain_id: &ChainId) -> Result<Option<SignState>, VigilError> {
        Ok(self.shared.lock().expect("fleet log lock").states.get(chain_id).cloned())
    }

    fn is_leader(&self) -> bool {
        self.shared.lock().expect("fleet log lock").leader == Some(self.own.shard_id)
    }

    fn leader(&self) -> Option<LeaderInfo> {
        let shared = self.shared.lock().expect("fleet log lock");
        let leader = shared.leader?;
        self.roster.iter().find(|info| info.shard_id == leader).cloned()
    }

    async fn transfer_leadership(&self, target: Option<ShardId>) -> Result<Option<LeaderInfo>, VigilError> {
        let mut shared = self.shared.lock().expect("fleet log lock");
        if shared.leader != Some(self.own.shard_id) {
            let leader = shared.leader;
            return Ok(leader.and_then(|id| self.roster.iter().find(|info| info.shard_id == id).cloned()));
        }
        let next = match target {
            Some(shard_id) => self.roster.iter().find(|info| info.shard_id == shard_id).cloned(),
            None => self.roster.iter().find(|info| info.shard_id != self.own.shard_id).cloned(),
        };
        if let Some(next) = &next {
            shared.leader = Some(next.shard_id);
        }
        Ok(next)
    }
}

impl FleetLog {
    fn leader_address_locked(&self, shared: &FleetState) -> Option<String> {
        let leader = shared.leader?;
        self.roster.iter().find(|info| info.shard_id == leader).map(|info| info.address.clone())
    }
}

pub struct TestNode {
    pub shard_id: u8,
    pub addr: SocketAddr,
    pub state: AppState,
    pub config: VigilConfig,
    server: Option<JoinHandle<()>>,
}

impl TestNode {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Simulate a crash: the peer RPC endpoint goes dark.
    pub fn kill(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

pub struct TestNetwork {
    pub nodes: Vec<TestNode>,
    pub group_pubkey: [u8; 32],
    pub shared: Arc<Mutex<FleetState>>,
    _home: TempDir,
}

impl TestNetwork {
    pub async fn start(threshold: u8, total: u8, grace_window_ms: u64) -> Self {
        let home = TempDir::new().expect("temp dir");
        let dealing = deal(threshold, total, &mut OsRng).expect("deal");
        let roster_keys: Vec<(ShardId, PeerEncryptionKey)> = dealing
            .shards
            .iter()
            .map(|shard| (shard.shard_id, PeerEncryptionKey::from(shard.encryption_public)))
            .collect();
        let passphrase = SecretString::new(TEST_PASSPHRASE.to_string());

        // Bind first so every node's config can name every peer's port.
        let mut listeners = Vec::new();
        for _ in 0..total {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
            let addr = listener.local_addr().expect("local addr");
            listeners.push((listener, addr));
        }

        let cosigners: Vec<CosignerPeerConfig> = (0..total)
            .map(|idx| CosignerPeerConfig {
                shard_id: idx + 1,
                p2p_addr: format!("http://{}", listeners[idx as usize].1),
                raft_addr: format!("http://{}", listeners[idx as usize].1),
                dkg_id: String::new(),
            })
            .collect();

        let shared = Arc::new(Mutex::new(FleetState { states: HashMap::new(), leader: Some(shard(1)) }));
        let leader_roster: Vec<LeaderInfo> = cosigners
            .iter()
            .map(|peer| LeaderInfo { shard_id: shard(peer.shard_id), address: peer.p2p_addr.clone() })
            .collect();

        let mut nodes = Vec::new();
        for (idx, (listener, addr)) in listeners.into_iter().enumerate() {
            let shard_id = idx as u8 + 1;
            let node_home = home.path().join(format!("node-{shard_id}"));
            std::fs::create_dir_all(&node_home).expect("node home");
            let config = VigilConfig {
                threshold,
                cosigners: cosigners.clone(),
                shard_id,
                p2p_listen: addr.to_string(),
                chain_nodes: vec![],
                home_dir: node_home.clone(),
                grace_window_ms,
                nonce_ttl_ms: 10_000,
                raft_timeout_ms: 1_000,
                peer_timeout_ms: 1_000,
            };
            ShareStore::write(
                &config.share_file(),
                &dealing.shards[idx],
                dealing.group_pubkey,
                &roster_keys,
                &passphrase,
            )
            .expect("write share");

            let log = Arc::new(FleetLog {
                shared: shared.clone(),
                own: leader_roster[idx].clone(),
                roster: leader_roster.clone(),
            }) as Arc<dyn ReplicatedLog>;
            let state = build_state_with_log(&config, &passphrase, Some(log)).expect("build state");

            let router = build_router(state.clone());
            let server = tokio::spawn(async move {
                let _ = axum::serve(listener, router.into_make_service()).await;
            });
            nodes.push(TestNode { shard_id, addr, state, config, server: Some(server) });
        }

        Self { nodes, group_pubkey: dealing.group_pubkey, shared, _home: home }
    }

    pub fn set_leader(&self, shard_id: Option<u8>) {
        self.shared.lock().expect("fleet log lock").leader = shard_id.map(shard);
    }

    pub fn node(&self, shard_id: u8) -> &TestNode {
        self.nodes.iter().find(|node| node.shard_id == shard_id).expect("node")
    }

    pub fn node_mut(&mut self, shard_id: u8) -> &mut TestNode {
        self.nodes.iter_mut().find(|node| node.shard_id == shard_id).expect("node")
    }
}

pub fn shard(id: u8) -> ShardId {
    ShardId::new(id).expect("shard id")
}

pub fn chain() -> ChainId {
    ChainId::new("vigil-test-1")
}

pub fn block(height: u64, round: u64, step: Step, sign_bytes: &[u8]) -> Block {
    Block { height, round, step, sign_bytes: sign_bytes.to_vec(), timestamp_nanos: 1_700_000_000_000_000_000 + height }
}

pub fn verify_group_signature(group_pubkey: &[u8; 32], sign_bytes: &[u8], signature: &[u8]) {
    let key = ed25519_dalek::VerifyingKey::from_bytes(group_pubkey).expect("group key");
    let signature = ed25519_dalek::Signature::from_slice(signature).expect("signature bytes");
    key.verify_strict(sign_bytes, &signature).expect("signature verifies under group key");
}
