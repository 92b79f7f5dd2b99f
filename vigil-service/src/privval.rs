//! Upstream block-source mapping.
//!
//! The chain node speaks the classic remote-privval vocabulary: sign this
//! vote, sign this proposal, tell me your key. Votes become blocks at steps
//! 2 (prevote) or 3 (precommit), proposals at step 1. Sign bytes are opaque
//! here; the chain dictates their layout and the replay path only needs them
//! bit-exact.

use crate::gateway::Gateway;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vigil_core::application::ThresholdValidator;
use vigil_core::domain::block::{Block, Step};
use vigil_core::foundation::util::encoding::base64_bytes;
use vigil_core::foundation::ChainId;
use vigil_core::VigilError;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VoteMsg {
    pub height: u64,
    pub round: u64,
    /// 2 = prevote, 3 = precommit.
    pub step: u8,
    #[serde(with = "base64_bytes")]
    pub sign_bytes: Vec<u8>,
    pub timestamp_nanos: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProposalMsg {
    pub height: u64,
    pub round: u64,
    #[serde(with = "base64_bytes")]
    pub sign_bytes: Vec<u8>,
    pub timestamp_nanos: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrivvalRequest {
    SignVote { chain_id: ChainId, vote: VoteMsg },
    SignProposal { chain_id: ChainId, proposal: ProposalMsg },
    PubKey { chain_id: ChainId },
    Ping,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrivvalResponse {
    Signature {
        #[serde(with = "base64_bytes")]
        signature: Vec<u8>,
    },
    PubKey {
        pub_key: String,
    },
    Pong,
}

pub fn vote_to_block(vote: VoteMsg) -> Result<Block, VigilError> {
    let step = Step::try_from(vote.step)?;
    if step == Step::Propose {
        return Err(VigilError::Message("votes sign at steps 2 or 3, not propose".to_string()));
    }
    Ok(Block { height: vote.height, round: vote.round, step, sign_bytes: vote.sign_bytes, timestamp_nanos: vote.timestamp_nanos })
}

pub fn proposal_to_block(proposal: ProposalMsg) -> Block {
    Block {
        height: proposal.height,
        round: proposal.round,
        step: Step::Propose,
        sign_bytes: proposal.sign_bytes,
        timestamp_nanos: proposal.timestamp_nanos,
    }
}

pub async fn handle_request(
    gateway: &Arc<Gateway>,
    validator: &Arc<ThresholdValidator>,
    request: PrivvalRequest,
) -> Result<PrivvalResponse, VigilError> {
    match request {
        PrivvalRequest::SignVote { chain_id, vote } => {
            let block = vote_to_block(vote)?;
            let signature = gateway.sign_block(&chain_id, &block).await?;
            Ok(PrivvalResponse::Signature { signature })
        }
        PrivvalRequest::SignProposal { chain_id, proposal } => {
            let block = proposal_to_block(proposal);
            let signature = gateway.sign_block(&chain_id, &block).await?;
            Ok(PrivvalResponse::Signature { signature })
        }
        PrivvalRequest::PubKey { chain_id } => {
            let _ = chain_id;
            Ok(PrivvalResponse::PubKey { pub_key: hex::encode(validator.group_pubkey()) })
        }
        PrivvalRequest::Ping => Ok(PrivvalResponse::Pong),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn votes_map_to_their_consensus_step() {
        let vote = VoteMsg { height: 7, round: 0, step: 2, sign_bytes: b"v".to_vec(), timestamp_nanos: 1 };
        assert_eq!(vote_to_block(vote).expect("block").step, Step::Prevote);

        let vote = VoteMsg { height: 7, round: 0, step: 3, sign_bytes: b"v".to_vec(), timestamp_nanos: 1 };
        assert_eq!(vote_to_block(vote).expect("block").step, Step::Precommit);

        let vote = VoteMsg { height: 7, round: 0, step: 1, sign_bytes: b"v".to_vec(), timestamp_nanos: 1 };
        assert!(vote_to_block(vote).is_err());
    }

    #[test]
    fn proposals_map_to_step_one() {
        let proposal = ProposalMsg { height: 7, round: 2, sign_bytes: b"p".to_vec(), timestamp_nanos: 1 };
        let block = proposal_to_block(proposal);
        assert_eq!(block.step, Step::Propose);
        assert_eq!(block.round, 2);
    }

    #[test]
    fn privval_requests_round_trip_as_json() {
        let request = PrivvalRequest::SignVote {
            chain_id: ChainId::new("test-1"),
            vote: VoteMsg { height: 7, round: 0, step: 2, sign_bytes: b"v".to_vec(), timestamp_nanos: 1 },
        };
        let json = serde_json::to_string(&request).expect("serialize");
        assert!(json.contains("\"type\":\"sign_vote\""));
        let back: PrivvalRequest = serde_json::from_str(&json).expect("deserialize");
        assert!(matches!(back, PrivvalRequest::SignVote { .. }));
    }
}
