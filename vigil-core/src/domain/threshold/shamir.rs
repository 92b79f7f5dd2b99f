use crate::foundation::{ShardId, VigilError};
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

/// Shamir-split `secret` into `shares` points on a random polynomial of
/// degree `threshold - 1` over the Ed25519 scalar field. The share for shard
/// j is the polynomial evaluated at x = j, which is why shard ids double as
/// x-coordinates and must be unique and nonzero.
pub fn split<R: RngCore + CryptoRng>(
    secret: &Scalar,
    threshold: u8,
    shares: u8,
    rng: &mut R,
) -> Result<Vec<(ShardId, Scalar)>, VigilError> {
    if threshold == 0 || threshold > shares {
        return Err(VigilError::CryptoError {
            operation: "shamir_split".to_string(),
            details: format!("invalid threshold {threshold} for {shares} shares"),
        });
    }
    let mut coefficients = Vec::with_capacity(threshold as usize);
    coefficients.push(*secret);
    for _ in 1..threshold {
        coefficients.push(Scalar::random(rng));
    }

    let mut out = Vec::with_capacity(shares as usize);
    for id in 1..=shares {
        let shard_id = ShardId::new(id)?;
        out.push((shard_id, evaluate(&coefficients, Scalar::from(u64::from(id)))));
    }
    for coefficient in coefficients.iter_mut() {
        coefficient.zeroize();
    }
    Ok(out)
}

fn evaluate(coefficients: &[Scalar], x: Scalar) -> Scalar {
    // Horner, highest degree first.
    let mut acc = Scalar::ZERO;
    for coefficient in coefficients.iter().rev() {
        acc = acc * x + coefficient;
    }
    acc
}

/// Lagrange coefficient at x = 0 for `target` among `participants`.
pub fn lagrange_coefficient(participants: &[ShardId], target: ShardId) -> Result<Scalar, VigilError> {
    if !participants.contains(&target) {
        return Err(VigilError::CryptoError {
            operation: "lagrange".to_string(),
            details: format!("shard {target} is not among the participants"),
        });
    }
    let x_j = Scalar::from(u64::from(target.get()));
    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;
    for &other in participants {
        if other == target {
            continue;
        }
        let x_m = Scalar::from(u64::from(other.get()));
        numerator *= x_m;
        denominator *= x_m - x_j;
    }
    if denominator == Scalar::ZERO {
        return Err(VigilError::CryptoError { operation: "lagrange".to_string(), details: "duplicate participant ids".to_string() });
    }
    Ok(numerator * denominator.invert())
}

/// Reconstruct the polynomial constant term from any t shares.
pub fn reconstruct(shares: &[(ShardId, Scalar)]) -> Result<Scalar, VigilError> {
    let ids: Vec<ShardId> = shares.iter().map(|(id, _)| *id).collect();
    let mut secret = Scalar::ZERO;
    for (id, share) in shares {
        secret += lagrange_coefficient(&ids, *id)? * share;
    }
    Ok(secret)
}
