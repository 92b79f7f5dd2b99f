//! Peer RPC message shapes, shared by the axum server and the reqwest client.

use crate::domain::block::{Block, Hrst};
use crate::domain::threshold::nonce::NonceEnvelope;
use crate::foundation::{ChainId, VigilError};
use serde::{Deserialize, Serialize};

pub const ROUTE_NONCES: &str = "/v1/nonces";
pub const ROUTE_SIGN: &str = "/v1/sign";
pub const ROUTE_BLOCK: &str = "/v1/block";
pub const ROUTE_LEADER: &str = "/v1/leader";
pub const ROUTE_TRANSFER_LEADERSHIP: &str = "/v1/leadership/transfer";
pub const ROUTE_PUBKEY: &str = "/v1/pubkey";
pub const ROUTE_HEALTH: &str = "/health";

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GetNoncesRequest {
    pub chain_id: ChainId,
    pub hrst: Hrst,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GetNoncesResponse {
    pub encrypted_secrets: Vec<NonceEnvelope>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SignShareRequest {
    pub chain_id: ChainId,
    pub hrst: Hrst,
    #[serde(with = "crate::foundation::util::encoding::base64_bytes")]
    pub sign_bytes: Vec<u8>,
    /// Every participating cosigner's envelope addressed to the recipient,
    /// the recipient's own included.
    pub encrypted_secrets: Vec<NonceEnvelope>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SignShareResponse {
    pub timestamp_nanos: u64,
    /// The 32-byte partial signature scalar.
    #[serde(with = "crate::foundation::util::encoding::base64_bytes")]
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SignBlockRequest {
    pub chain_id: ChainId,
    pub block: Block,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SignBlockResponse {
    #[serde(with = "crate::foundation::util::encoding::base64_bytes")]
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TransferLeadershipRequest {
    #[serde(default)]
    pub leader_id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TransferLeadershipResponse {
    #[serde(default)]
    pub leader_id: Option<String>,
    #[serde(default)]
    pub leader_address: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct GetLeaderResponse {
    #[serde(default)]
    pub leader: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PubKeyQuery {
    pub chain_id: ChainId,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PubKeyResponse {
    /// Hex-encoded 32-byte group public key.
    pub pub_key: String,
}

/// Error payload carried on non-2xx responses.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<String>,
}

pub mod error_codes {
    pub const NOT_LEADER: &str = "not_leader";
    pub const NO_QUORUM: &str = "no_quorum";
    pub const DOUBLE_SIGN: &str = "double_sign";
    pub const NONCE_REUSED: &str = "nonce_reused";
    pub const NONCE_NOT_FOUND: &str = "nonce_not_found";
    pub const BAD_PARTIAL: &str = "bad_partial";
    pub const BAD_SIGNATURE: &str = "bad_signature";
    pub const BUSY: &str = "busy";
    pub const TIMEOUT: &str = "timeout";
    pub const INTERNAL: &str = "internal";
}

impl ErrorBody {
    pub fn from_error(err: &VigilError) -> Self {
        use error_codes::*;
        let (code, leader) = match err {
            VigilError::NotLeader { leader } => (NOT_LEADER, leader.clone()),
            VigilError::NoQuorum { .. } => (NO_QUORUM, None),
            VigilError::DoubleSign { .. } => (DOUBLE_SIGN, None),
            VigilError::NonceReused { .. } => (NONCE_REUSED, None),
            VigilError::NonceNotFound { .. } => (NONCE_NOT_FOUND, None),
            VigilError::BadPartial { .. } => (BAD_PARTIAL, None),
            VigilError::BadSignature => (BAD_SIGNATURE, None),
            VigilError::Busy { .. } => (BUSY, None),
            VigilError::Timeout { .. } => (TIMEOUT, None),
            _ => (INTERNAL, None),
        };
        Self { code: code.to_string(), message: err.to_string(), leader }
    }

    /// Reconstruct the error on the client side. The HRS-bearing refusals are
    /// rebuilt from the request the caller sent, since the wire only carries
    /// the code.
    pub fn into_error(self, hrst: Option<Hrst>) -> VigilError {
        use error_codes::*;
        let hrs = hrst.map(|h| (h.height, h.round, h.step.as_u8())).unwrap_or_default();
        match self.code.as_str() {
            NOT_LEADER => VigilError::NotLeader { leader: self.leader },
            NO_QUORUM => VigilError::NoQuorum { required: 0, reachable: 0 },
            DOUBLE_SIGN => VigilError::DoubleSign { chain_id: String::new(), height: hrs.0, round: hrs.1, step: hrs.2 },
            NONCE_REUSED => VigilError::NonceReused { height: hrs.0, round: hrs.1, step: hrs.2 },
            NONCE_NOT_FOUND => VigilError::NonceNotFound { height: hrs.0, round: hrs.1, step: hrs.2 },
            BAD_PARTIAL => VigilError::BadPartial { details: self.message },
            BAD_SIGNATURE => VigilError::BadSignature,
            BUSY => VigilError::Busy { chain_id: String::new(), in_flight: 0 },
            TIMEOUT => VigilError::Timeout { operation: "peer rpc".to_string(), timeout_ms: 0 },
            _ => VigilError::TransportError { operation: "peer rpc".to_string(), details: self.message },
        }
    }
}
