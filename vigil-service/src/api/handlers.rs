use super::state::AppState;
use crate::privval::{PrivvalRequest, PrivvalResponse};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{error, info, warn};
use vigil_core::foundation::ShardId;
use vigil_core::infrastructure::transport::messages::{
    error_codes, ErrorBody, GetLeaderResponse, GetNoncesRequest, GetNoncesResponse, PubKeyQuery, PubKeyResponse, SignBlockRequest,
    SignBlockResponse, SignShareRequest, SignShareResponse, TransferLeadershipRequest, TransferLeadershipResponse,
};
use vigil_core::VigilError;

pub async fn handle_get_nonces(State(state): State<AppState>, Json(request): Json<GetNoncesRequest>) -> Response {
    match state.validator.local().get_nonces(&request.chain_id, request.hrst).await {
        Ok(encrypted_secrets) => Json(GetNoncesResponse { encrypted_secrets }).into_response(),
        Err(err) => error_response(&err),
    }
}

pub async fn handle_sign_share(State(state): State<AppState>, Json(request): Json<SignShareRequest>) -> Response {
    let chain_id = request.chain_id.clone();
    let hrst = request.hrst;
    match state.validator.local().set_nonces_and_sign(&request).await {
        Ok(response) => {
            info!(
                "signed with shard chain_id={} height={} round={} step={}",
                chain_id,
                hrst.height,
                hrst.round,
                hrst.step.as_u8()
            );
            Json::<SignShareResponse>(response).into_response()
        }
        Err(err) => {
            error!(
                "failed to sign with shard chain_id={} height={} round={} step={} error={}",
                chain_id,
                hrst.height,
                hrst.round,
                hrst.step.as_u8(),
                err
            );
            error_response(&err)
        }
    }
}

pub async fn handle_sign_block(State(state): State<AppState>, Json(request): Json<SignBlockRequest>) -> Response {
    // Peer-forwarded requests land here; a non-leader answers with the
    // current leader instead of forwarding again.
    match state.validator.sign_block(&request.chain_id, &request.block).await {
        Ok(signature) => Json(SignBlockResponse { signature }).into_response(),
        Err(err) => error_response(&err),
    }
}

pub async fn handle_privval(State(state): State<AppState>, Json(request): Json<PrivvalRequest>) -> Response {
    match crate::privval::handle_request(&state.gateway, &state.validator, request).await {
        Ok(response) => Json::<PrivvalResponse>(response).into_response(),
        Err(err) => error_response(&err),
    }
}

pub async fn handle_get_leader(State(state): State<AppState>) -> Response {
    Json(GetLeaderResponse { leader: state.validator.leader_address() }).into_response()
}

pub async fn handle_transfer_leadership(
    State(state): State<AppState>,
    Json(request): Json<TransferLeadershipRequest>,
) -> Response {
    let target = match request.leader_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        Some(raw) => match raw.parse::<u8>().ok().and_then(|id| ShardId::new(id).ok()) {
            Some(shard_id) => Some(shard_id),
            None => {
                return error_response(&VigilError::ConfigError(format!("invalid leader id {raw:?}")));
            }
        },
        None => None,
    };
    match state.validator.transfer_leadership(target).await {
        Ok(next) => {
            if let Some((shard_id, address)) = &next {
                info!("transferring leadership leader_id={} leader_address={}", shard_id, address);
            }
            Json(TransferLeadershipResponse {
                leader_id: next.as_ref().map(|(shard_id, _)| shard_id.to_string()),
                leader_address: next.map(|(_, address)| address),
            })
            .into_response()
        }
        Err(err) => error_response(&err),
    }
}

pub async fn handle_pub_key(State(state): State<AppState>, Query(query): Query<PubKeyQuery>) -> Response {
    let _ = query.chain_id;
    Json(PubKeyResponse { pub_key: hex::encode(state.validator.group_pubkey()) }).into_response()
}

pub async fn handle_health() -> Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

fn error_response(err: &VigilError) -> Response {
    let body = ErrorBody::from_error(err);
    let status = match body.code.as_str() {
        error_codes::NOT_LEADER => StatusCode::MISDIRECTED_REQUEST,
        error_codes::DOUBLE_SIGN | error_codes::NONCE_REUSED | error_codes::NONCE_NOT_FOUND => StatusCode::CONFLICT,
        error_codes::BAD_PARTIAL | error_codes::BAD_SIGNATURE => StatusCode::CONFLICT,
        error_codes::NO_QUORUM | error_codes::BUSY | error_codes::TIMEOUT => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if matches!(body.code.as_str(), error_codes::DOUBLE_SIGN) {
        error!("refusing to double sign: {}", body.message);
    } else {
        warn!("request failed code={} message={}", body.code, body.message);
    }
    (status, Json(body)).into_response()
}
