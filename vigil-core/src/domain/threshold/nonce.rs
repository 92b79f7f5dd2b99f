use crate::domain::threshold::shamir;
use crate::foundation::{ShardId, VigilError};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

const ENVELOPE_KDF_CONTEXT: &str = "vigil-signer nonce envelope v1";
const EPHEMERAL_PUBKEY_LEN: usize = 32;
const XNONCE_LEN: usize = 24;

pub type PeerEncryptionKey = x25519_dalek::PublicKey;

/// Ephemeral signing nonce: a secret scalar and its public commitment
/// `R_i = r_i * B`. Lives in RAM for one HRS and is discarded after use.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Nonce {
    secret: Scalar,
    #[zeroize(skip)]
    commitment: [u8; 32],
}

impl Nonce {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = Scalar::random(rng);
        let commitment = EdwardsPoint::mul_base(&secret).compress().to_bytes();
        Self { secret, commitment }
    }

    pub fn commitment(&self) -> [u8; 32] {
        self.commitment
    }
}

/// Wire form of one dealt nonce share: produced by `source_id`, readable only
/// by `dest_id`, carrying the producer's public commitment alongside.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct NonceEnvelope {
    pub source_id: ShardId,
    pub dest_id: ShardId,
    #[serde(with = "crate::foundation::util::encoding::base64_bytes")]
    pub ciphertext: Vec<u8>,
    pub commitment: [u8; 32],
}

/// Round 1 dealing: Shamir-split the nonce scalar across all peers and seal
/// each share to its destination. The share for the producer itself is sealed
/// too, so the dealing is uniform and idempotent re-sends stay byte-identical.
pub fn seal_nonce_shares<R: RngCore + CryptoRng>(
    nonce: &Nonce,
    source_id: ShardId,
    threshold: u8,
    peers: &[(ShardId, PeerEncryptionKey)],
    rng: &mut R,
) -> Result<Vec<NonceEnvelope>, VigilError> {
    let total = u8::try_from(peers.len())
        .map_err(|_| VigilError::CryptoError { operation: "seal_nonce".to_string(), details: "too many peers".to_string() })?;
    let mut shares = shamir::split(&nonce.secret, threshold, total, rng)?;

    let mut envelopes = Vec::with_capacity(peers.len());
    for (dest_id, dest_key) in peers {
        let (_, share) = shares
            .iter()
            .find(|(id, _)| id == dest_id)
            .ok_or_else(|| VigilError::InvalidShardId { shard_id: dest_id.get(), reason: "not in dealt share set".to_string() })?;
        let ciphertext = seal(share, source_id, *dest_id, dest_key, &nonce.commitment, rng)?;
        envelopes.push(NonceEnvelope { source_id, dest_id: *dest_id, ciphertext, commitment: nonce.commitment });
    }
    for (_, share) in shares.iter_mut() {
        share.zeroize();
    }
    Ok(envelopes)
}

fn seal<R: RngCore + CryptoRng>(
    share: &Scalar,
    source_id: ShardId,
    dest_id: ShardId,
    dest_key: &PeerEncryptionKey,
    commitment: &[u8; 32],
    rng: &mut R,
) -> Result<Vec<u8>, VigilError> {
    let ephemeral = x25519_dalek::EphemeralSecret::random_from_rng(&mut *rng);
    let ephemeral_pub = x25519_dalek::PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(dest_key);

    let cipher = XChaCha20Poly1305::new(&derive_envelope_key(shared.as_bytes(), ephemeral_pub.as_bytes(), dest_key.as_bytes()).into());
    let mut xnonce_bytes = [0u8; XNONCE_LEN];
    rng.fill_bytes(&mut xnonce_bytes);
    let xnonce = XNonce::from(xnonce_bytes);

    let aad = envelope_aad(source_id, dest_id, commitment);
    let mut plaintext = share.to_bytes();
    let sealed = cipher
        .encrypt(&xnonce, Payload { msg: &plaintext, aad: &aad })
        .map_err(|_| VigilError::CryptoError { operation: "seal_nonce".to_string(), details: "aead encrypt failed".to_string() })?;
    plaintext.zeroize();

    let mut out = Vec::with_capacity(EPHEMERAL_PUBKEY_LEN + XNONCE_LEN + sealed.len());
    out.extend_from_slice(ephemeral_pub.as_bytes());
    out.extend_from_slice(&xnonce_bytes);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt an envelope addressed to this shard and recover the scalar share.
pub fn open_envelope(secret: &x25519_dalek::StaticSecret, envelope: &NonceEnvelope) -> Result<Scalar, VigilError> {
    let fail = || VigilError::ShareDecryptFailed { source_id: envelope.source_id.get() };
    if envelope.ciphertext.len() < EPHEMERAL_PUBKEY_LEN + XNONCE_LEN {
        return Err(fail());
    }
    let (head, sealed) = envelope.ciphertext.split_at(EPHEMERAL_PUBKEY_LEN + XNONCE_LEN);
    let ephemeral_pub_bytes: [u8; 32] = head[..EPHEMERAL_PUBKEY_LEN].try_into().map_err(|_| fail())?;
    let xnonce_bytes: [u8; XNONCE_LEN] = head[EPHEMERAL_PUBKEY_LEN..].try_into().map_err(|_| fail())?;

    let ephemeral_pub = x25519_dalek::PublicKey::from(ephemeral_pub_bytes);
    let own_pub = x25519_dalek::PublicKey::from(secret);
    let shared = secret.diffie_hellman(&ephemeral_pub);

    let cipher = XChaCha20Poly1305::new(&derive_envelope_key(shared.as_bytes(), ephemeral_pub.as_bytes(), own_pub.as_bytes()).into());
    let aad = envelope_aad(envelope.source_id, envelope.dest_id, &envelope.commitment);
    let mut plaintext = cipher
        .decrypt(&XNonce::from(xnonce_bytes), Payload { msg: sealed, aad: &aad })
        .map_err(|_| fail())?;
    if plaintext.len() != 32 {
        plaintext.zeroize();
        return Err(fail());
    }
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();
    let share = Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes)).ok_or_else(fail);
    bytes.zeroize();
    share
}

fn derive_envelope_key(shared: &[u8; 32], ephemeral_pub: &[u8; 32], dest_pub: &[u8; 32]) -> [u8; 32] {
    let mut material = [0u8; 96];
    material[..32].copy_from_slice(shared);
    material[32..64].copy_from_slice(ephemeral_pub);
    material[64..].copy_from_slice(dest_pub);
    let key = blake3::derive_key(ENVELOPE_KDF_CONTEXT, &material);
    material.zeroize();
    key
}

fn envelope_aad(source_id: ShardId, dest_id: ShardId, commitment: &[u8; 32]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(2 + 32);
    aad.push(source_id.get());
    aad.push(dest_id.get());
    aad.extend_from_slice(commitment);
    aad
}
