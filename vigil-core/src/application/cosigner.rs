use crate::application::local_cosigner::LocalCosigner;
use crate::domain::block::Hrst;
use crate::domain::threshold::nonce::NonceEnvelope;
use crate::foundation::{ChainId, ShardId, VigilError};
use crate::infrastructure::transport::messages::{SignShareRequest, SignShareResponse};
use crate::infrastructure::transport::RemoteCosigner;
use std::sync::Arc;

/// One participant in the signing quorum: either this process's own share
/// holder, or an RPC stub to a peer. A tagged sum rather than a trait object
/// so call sites can still reach variant-specific behavior.
#[derive(Clone)]
pub enum Cosigner {
    Local(Arc<LocalCosigner>),
    Remote(RemoteCosigner),
}

impl Cosigner {
    pub fn id(&self) -> ShardId {
        match self {
            Cosigner::Local(local) => local.shard_id(),
            Cosigner::Remote(remote) => remote.shard_id(),
        }
    }

    pub fn address(&self) -> &str {
        match self {
            Cosigner::Local(local) => local.address(),
            Cosigner::Remote(remote) => remote.address(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Cosigner::Local(_))
    }

    pub async fn get_nonces(&self, chain_id: &ChainId, hrst: Hrst) -> Result<Vec<NonceEnvelope>, VigilError> {
        match self {
            Cosigner::Local(local) => local.get_nonces(chain_id, hrst).await,
            Cosigner::Remote(remote) => remote.get_nonces(chain_id, hrst).await,
        }
    }

    pub async fn set_nonces_and_sign(&self, request: &SignShareRequest) -> Result<SignShareResponse, VigilError> {
        match self {
            Cosigner::Local(local) => local.set_nonces_and_sign(request).await,
            Cosigner::Remote(remote) => remote.set_nonces_and_sign(request).await,
        }
    }

    pub async fn pub_key(&self, chain_id: &ChainId) -> Result<[u8; 32], VigilError> {
        match self {
            Cosigner::Local(local) => Ok(local.group_pubkey()),
            Cosigner::Remote(remote) => remote.pub_key(chain_id).await,
        }
    }
}
