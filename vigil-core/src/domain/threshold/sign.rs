use crate::domain::threshold::shamir;
use crate::foundation::{ShardId, VigilError, ED25519_SIGNATURE_SIZE};
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

/// One cosigner's 32-byte contribution to the threshold signature, bound to a
/// specific HRS and payload by construction.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct PartialSignature {
    pub shard_id: ShardId,
    pub scalar: [u8; 32],
}

/// Standard Ed25519 challenge `c = SHA-512(R || A || M) mod l`. Matches what
/// `ed25519-dalek` recomputes during verification, so a correctly aggregated
/// `(R, s)` passes strict verification.
pub fn challenge(aggregate_commitment: &[u8; 32], group_pubkey: &[u8; 32], sign_bytes: &[u8]) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(aggregate_commitment);
    hasher.update(group_pubkey);
    hasher.update(sign_bytes);
    let digest: [u8; 64] = hasher.finalize().into();
    Scalar::from_bytes_mod_order_wide(&digest)
}

/// Round 2 share arithmetic: `s_j = z_j + c * x_j`, where `z_j` is the summed
/// nonce contribution and `x_j` the long-lived key share.
pub fn partial_sign(nonce_contribution: &Scalar, key_share: &Scalar, challenge: &Scalar) -> [u8; 32] {
    (nonce_contribution + challenge * key_share).to_bytes()
}

/// Sum the per-participant public commitments into the aggregate `R`.
pub fn aggregate_commitments(commitments: &[[u8; 32]]) -> Result<[u8; 32], VigilError> {
    if commitments.is_empty() {
        return Err(VigilError::CryptoError { operation: "aggregate".to_string(), details: "no commitments".to_string() });
    }
    let mut sum = EdwardsPoint::default();
    for bytes in commitments {
        let point = CompressedEdwardsY(*bytes)
            .decompress()
            .ok_or_else(|| VigilError::CryptoError { operation: "aggregate".to_string(), details: "invalid commitment point".to_string() })?;
        sum += point;
    }
    Ok(sum.compress().to_bytes())
}

/// Lagrange-combine t partials into the final `(R, s)` signature.
///
/// The group equation `s*B == R + c*A` is checked before returning; a failure
/// means at least one partial was wrong and the nonce set is burned.
pub fn combine_partials(
    partials: &[PartialSignature],
    aggregate_commitment: &[u8; 32],
    group_pubkey: &[u8; 32],
    sign_bytes: &[u8],
) -> Result<[u8; ED25519_SIGNATURE_SIZE], VigilError> {
    let participants: Vec<ShardId> = partials.iter().map(|p| p.shard_id).collect();
    let mut s = Scalar::ZERO;
    for partial in partials {
        let share = Option::<Scalar>::from(Scalar::from_canonical_bytes(partial.scalar)).ok_or_else(|| VigilError::BadPartial {
            details: format!("shard {} produced a non-canonical scalar", partial.shard_id),
        })?;
        s += shamir::lagrange_coefficient(&participants, partial.shard_id)? * share;
    }

    let challenge = challenge(aggregate_commitment, group_pubkey, sign_bytes);
    let commitment = CompressedEdwardsY(*aggregate_commitment)
        .decompress()
        .ok_or_else(|| VigilError::CryptoError { operation: "combine".to_string(), details: "invalid aggregate commitment".to_string() })?;
    let pubkey = CompressedEdwardsY(*group_pubkey)
        .decompress()
        .ok_or_else(|| VigilError::CryptoError { operation: "combine".to_string(), details: "invalid group public key".to_string() })?;
    if EdwardsPoint::mul_base(&s) != commitment + challenge * pubkey {
        return Err(VigilError::BadPartial { details: "group equation does not hold".to_string() });
    }

    let mut signature = [0u8; ED25519_SIGNATURE_SIZE];
    signature[..32].copy_from_slice(aggregate_commitment);
    signature[32..].copy_from_slice(&s.to_bytes());
    Ok(signature)
}

/// Final check against the group key, independent of the aggregation path.
pub fn verify_signature(group_pubkey: &[u8; 32], sign_bytes: &[u8], signature: &[u8]) -> Result<(), VigilError> {
    let key = ed25519_dalek::VerifyingKey::from_bytes(group_pubkey)?;
    let signature = ed25519_dalek::Signature::from_slice(signature)?;
    key.verify_strict(sign_bytes, &signature).map_err(|_| VigilError::BadSignature)
}
