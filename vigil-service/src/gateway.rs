use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use vigil_core::application::ThresholdValidator;
use vigil_core::domain::block::Block;
use vigil_core::foundation::{ChainId, ShardId};
use vigil_core::infrastructure::transport::messages::SignBlockRequest;
use vigil_core::infrastructure::transport::RemoteCosigner;
use vigil_core::VigilError;

/// Leader-follower front door for block signing. Leaders sign locally;
/// followers forward the request to the current leader exactly once, so two
/// nodes with stale leader views cannot bounce a request between each other.
pub struct Gateway {
    validator: Arc<ThresholdValidator>,
    roster: Vec<(ShardId, String)>,
    forward_timeout: Duration,
}

impl Gateway {
    pub fn new(validator: Arc<ThresholdValidator>, roster: Vec<(ShardId, String)>, forward_timeout: Duration) -> Self {
        Self { validator, roster, forward_timeout }
    }

    pub async fn sign_block(&self, chain_id: &ChainId, block: &Block) -> Result<Vec<u8>, VigilError> {
        match self.validator.sign_block(chain_id, block).await {
            Err(VigilError::NotLeader { leader: Some(leader_address) }) => {
                info!("forwarding sign request to leader chain_id={} leader={}", chain_id, leader_address);
                self.forward(chain_id, block, &leader_address).await
            }
            Err(VigilError::NotLeader { leader: None }) => {
                warn!("no leader elected, dropping sign request chain_id={}", chain_id);
                Err(VigilError::NotLeader { leader: None })
            }
            other => other,
        }
    }

    async fn forward(&self, chain_id: &ChainId, block: &Block, leader_address: &str) -> Result<Vec<u8>, VigilError> {
        let (shard_id, address) = self
            .roster
            .iter()
            .find(|(_, address)| address == leader_address)
            .ok_or_else(|| VigilError::NotLeader { leader: Some(leader_address.to_string()) })?;
        let leader = RemoteCosigner::new(*shard_id, address.clone(), self.forward_timeout)?;
        let request = SignBlockRequest { chain_id: chain_id.clone(), block: block.clone() };
        let response = leader.sign_block(&request).await?;
        Ok(response.signature)
    }
}
