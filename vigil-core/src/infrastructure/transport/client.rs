use crate::domain::block::Hrst;
use crate::domain::threshold::nonce::NonceEnvelope;
use crate::foundation::{ChainId, ShardId, VigilError};
use crate::infrastructure::transport::messages::{
    ErrorBody, GetLeaderResponse, GetNoncesRequest, GetNoncesResponse, PubKeyQuery, PubKeyResponse, SignBlockRequest,
    SignBlockResponse, SignShareRequest, SignShareResponse, TransferLeadershipRequest, TransferLeadershipResponse, ROUTE_BLOCK,
    ROUTE_LEADER, ROUTE_NONCES, ROUTE_PUBKEY, ROUTE_SIGN, ROUTE_TRANSFER_LEADERSHIP,
};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// RPC stub for one remote cosigner. Cheap to clone; the underlying reqwest
/// client pools connections per peer.
#[derive(Clone)]
pub struct RemoteCosigner {
    shard_id: ShardId,
    address: String,
    client: reqwest::Client,
}

impl RemoteCosigner {
    pub fn new(shard_id: ShardId, address: impl Into<String>, timeout: Duration) -> Result<Self, VigilError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { shard_id, address: address.into().trim_end_matches('/').to_string(), client })
    }

    pub fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn get_nonces(&self, chain_id: &ChainId, hrst: Hrst) -> Result<Vec<NonceEnvelope>, VigilError> {
        let request = GetNoncesRequest { chain_id: chain_id.clone(), hrst };
        let response: GetNoncesResponse = self.post(ROUTE_NONCES, &request, Some(hrst)).await?;
        Ok(response.encrypted_secrets)
    }

    pub async fn set_nonces_and_sign(&self, request: &SignShareRequest) -> Result<SignShareResponse, VigilError> {
        self.post(ROUTE_SIGN, request, Some(request.hrst)).await
    }

    pub async fn sign_block(&self, request: &SignBlockRequest) -> Result<SignBlockResponse, VigilError> {
        self.post(ROUTE_BLOCK, request, Some(request.block.hrst())).await
    }

    pub async fn transfer_leadership(&self, request: &TransferLeadershipRequest) -> Result<TransferLeadershipResponse, VigilError> {
        self.post(ROUTE_TRANSFER_LEADERSHIP, request, None).await
    }

    pub async fn leader(&self) -> Result<GetLeaderResponse, VigilError> {
        let url = format!("{}{}", self.address, ROUTE_LEADER);
        let response = self.client.get(&url).send().await?;
        Self::decode(response, None).await
    }

    pub async fn pub_key(&self, chain_id: &ChainId) -> Result<[u8; 32], VigilError> {
        let url = format!("{}{}", self.address, ROUTE_PUBKEY);
        let response = self.client.get(&url).query(&PubKeyQuery { chain_id: chain_id.clone() }).send().await?;
        let body: PubKeyResponse = Self::decode(response, None).await?;
        crate::foundation::util::encoding::parse_hex_fixed::<32>(&body.pub_key)
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        route: &str,
        request: &Req,
        hrst: Option<Hrst>,
    ) -> Result<Resp, VigilError> {
        let url = format!("{}{}", self.address, route);
        debug!("peer rpc shard_id={} route={}", self.shard_id, route);
        let response = self.client.post(&url).json(request).send().await?;
        Self::decode(response, hrst).await
    }

    async fn decode<Resp: DeserializeOwned>(response: reqwest::Response, hrst: Option<Hrst>) -> Result<Resp, VigilError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => Err(parsed.into_error(hrst)),
            Err(_) => Err(VigilError::TransportError {
                operation: "peer rpc".to_string(),
                details: format!("http {status}: {body}"),
            }),
        }
    }
}
