use crate::domain::threshold::shamir;
use crate::foundation::{ShardId, VigilError};
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// One shard as produced by the trusted dealer: the Shamir share of the
/// signing scalar plus this shard's static encryption keypair for nonce
/// transport.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DealtShard {
    #[zeroize(skip)]
    pub shard_id: ShardId,
    pub key_share: Scalar,
    pub encryption_secret: [u8; 32],
    #[zeroize(skip)]
    pub encryption_public: [u8; 32],
}

/// Output of a dealing ceremony. Shards are distributed to cosigners and the
/// dealer's copy of the signing scalar is destroyed with this value.
pub struct Dealing {
    pub group_pubkey: [u8; 32],
    pub shards: Vec<DealtShard>,
}

/// Generate a fresh group key and deal t-of-n shards. Stands in for the DKG
/// ceremony when a trusted dealer is acceptable.
pub fn deal<R: RngCore + CryptoRng>(threshold: u8, total: u8, rng: &mut R) -> Result<Dealing, VigilError> {
    let mut secret = Scalar::random(rng);
    let group_pubkey = EdwardsPoint::mul_base(&secret).compress().to_bytes();
    let key_shares = shamir::split(&secret, threshold, total, rng)?;
    secret.zeroize();

    let shards = key_shares
        .into_iter()
        .map(|(shard_id, key_share)| {
            let encryption_secret = x25519_dalek::StaticSecret::random_from_rng(&mut *rng);
            let encryption_public = x25519_dalek::PublicKey::from(&encryption_secret);
            DealtShard {
                shard_id,
                key_share,
                encryption_secret: encryption_secret.to_bytes(),
                encryption_public: encryption_public.to_bytes(),
            }
        })
        .collect();

    Ok(Dealing { group_pubkey, shards })
}
