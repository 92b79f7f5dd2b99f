use crate::domain::threshold::nonce::{open_envelope, NonceEnvelope, PeerEncryptionKey};
use crate::domain::threshold::DealtShard;
use crate::foundation::util::encoding::parse_hex_fixed;
use crate::foundation::{ShardId, VigilError, STATE_FILE_MODE};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use curve25519_dalek::scalar::Scalar;
use log::info;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use zeroize::{Zeroize, ZeroizeOnDrop};

const SHARE_KDF_CONTEXT: &str = "vigil-signer share file v1";
const SALT_LEN: usize = 32;
const XNONCE_LEN: usize = 24;

/// This cosigner's share of the group key, held in memory after unlocking
/// the share file. Read-only for the life of the process.
#[derive(ZeroizeOnDrop)]
pub struct KeyShare {
    #[zeroize(skip)]
    shard_id: ShardId,
    key_share: Scalar,
    encryption_secret: [u8; 32],
    #[zeroize(skip)]
    group_pubkey: [u8; 32],
    #[zeroize(skip)]
    peers: BTreeMap<ShardId, PeerEncryptionKey>,
}

impl std::fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyShare")
            .field("shard_id", &self.shard_id)
            .field("key_share", &"<redacted>")
            .field("encryption_secret", &"<redacted>")
            .field("group_pubkey", &self.group_pubkey)
            .field("peers", &self.peers)
            .finish()
    }
}

impl KeyShare {
    pub fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    pub fn group_pubkey(&self) -> [u8; 32] {
        self.group_pubkey
    }

    pub fn total_shards(&self) -> u8 {
        self.peers.len() as u8
    }

    /// Peer encryption keys in shard order, self included.
    pub fn roster(&self) -> Vec<(ShardId, PeerEncryptionKey)> {
        self.peers.iter().map(|(id, key)| (*id, *key)).collect()
    }

    pub fn scalar(&self) -> &Scalar {
        &self.key_share
    }

    /// Decrypt a nonce share addressed to this shard.
    pub fn open(&self, envelope: &NonceEnvelope) -> Result<Scalar, VigilError> {
        if envelope.dest_id != self.shard_id {
            return Err(VigilError::CryptoError {
                operation: "open_envelope".to_string(),
                details: format!("envelope addressed to shard {}, we are {}", envelope.dest_id, self.shard_id),
            });
        }
        let secret = x25519_dalek::StaticSecret::from(self.encryption_secret);
        open_envelope(&secret, envelope)
    }
}

/// Plaintext header + sealed secrets, as serialized to the share file.
#[derive(Deserialize, Serialize)]
struct ShareFile {
    shard_id: ShardId,
    group_pubkey: String,
    peers: BTreeMap<u8, String>,
    #[serde(with = "crate::foundation::util::encoding::base64_bytes")]
    sealed: Vec<u8>,
}

#[derive(Deserialize, Serialize, Zeroize, ZeroizeOnDrop)]
struct ShareSecrets {
    key_share: [u8; 32],
    encryption_secret: [u8; 32],
}

/// Loads and writes the encrypted share file. The signing share and transport
/// secret are sealed under a passphrase-derived key; shard id, group key and
/// the peer table stay in the clear so operators can audit a roster without
/// unlocking anything.
pub struct ShareStore;

impl ShareStore {
    pub fn write(
        path: &Path,
        shard: &DealtShard,
        group_pubkey: [u8; 32],
        peers: &[(ShardId, PeerEncryptionKey)],
        passphrase: &SecretString,
    ) -> Result<(), VigilError> {
        let mut secrets = ShareSecrets { key_share: shard.key_share.to_bytes(), encryption_secret: shard.encryption_secret };
        let mut plaintext = serde_json::to_vec(&secrets)?;
        secrets.zeroize();

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut xnonce_bytes = [0u8; XNONCE_LEN];
        OsRng.fill_bytes(&mut xnonce_bytes);

        let cipher = XChaCha20Poly1305::new(&derive_file_key(passphrase, &salt).into());
        let ciphertext = cipher
            .encrypt(&XNonce::from(xnonce_bytes), plaintext.as_slice())
            .map_err(|_| VigilError::CryptoError { operation: "seal_share_file".to_string(), details: "aead encrypt failed".to_string() })?;
        plaintext.zeroize();

        let mut sealed = Vec::with_capacity(SALT_LEN + XNONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&salt);
        sealed.extend_from_slice(&xnonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        let file = ShareFile {
            shard_id: shard.shard_id,
            group_pubkey: hex::encode(group_pubkey),
            peers: peers.iter().map(|(id, key)| (id.get(), hex::encode(key.as_bytes()))).collect(),
            sealed,
        };
        fs::write(path, serde_json::to_vec_pretty(&file)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(STATE_FILE_MODE))?;
        }
        info!("wrote share file shard_id={} path={}", shard.shard_id, path.display());
        Ok(())
    }

    pub fn load(path: &Path, passphrase: &SecretString) -> Result<KeyShare, VigilError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(path)?.permissions().mode() & 0o777;
            if mode != STATE_FILE_MODE {
                return Err(VigilError::InsecureFilePermissions { path: path.display().to_string(), mode });
            }
        }
        let raw = fs::read(path)?;
        let file: ShareFile = serde_json::from_slice(&raw)?;
        if file.sealed.len() < SALT_LEN + XNONCE_LEN {
            return Err(VigilError::CryptoError { operation: "open_share_file".to_string(), details: "sealed blob truncated".to_string() });
        }
        let (salt, rest) = file.sealed.split_at(SALT_LEN);
        let (xnonce_bytes, ciphertext) = rest.split_at(XNONCE_LEN);
        let salt: [u8; SALT_LEN] = salt.try_into().expect("salt length checked");
        let xnonce: [u8; XNONCE_LEN] = xnonce_bytes.try_into().expect("nonce length checked");

        let cipher = XChaCha20Poly1305::new(&derive_file_key(passphrase, &salt).into());
        let mut plaintext = cipher.decrypt(&XNonce::from(xnonce), ciphertext).map_err(|_| VigilError::CryptoError {
            operation: "open_share_file".to_string(),
            details: "decryption failed (wrong passphrase?)".to_string(),
        })?;
        let mut secrets: ShareSecrets = serde_json::from_slice(&plaintext)?;
        plaintext.zeroize();

        let key_share = Option::<Scalar>::from(Scalar::from_canonical_bytes(secrets.key_share)).ok_or_else(|| {
            VigilError::CryptoError { operation: "open_share_file".to_string(), details: "non-canonical key share".to_string() }
        })?;
        let encryption_secret = secrets.encryption_secret;
        secrets.zeroize();

        let mut peers = BTreeMap::new();
        for (id, key_hex) in &file.peers {
            peers.insert(ShardId::new(*id)?, PeerEncryptionKey::from(parse_hex_fixed::<32>(key_hex)?));
        }
        if !peers.contains_key(&file.shard_id) {
            return Err(VigilError::ConfigError(format!("share file peer table is missing own shard {}", file.shard_id)));
        }

        Ok(KeyShare {
            shard_id: file.shard_id,
            key_share,
            encryption_secret,
            group_pubkey: parse_hex_fixed::<32>(&file.group_pubkey)?,
            peers,
        })
    }
}

fn derive_file_key(passphrase: &SecretString, salt: &[u8; SALT_LEN]) -> [u8; 32] {
    let phrase = passphrase.expose_secret().as_bytes();
    let mut material = Vec::with_capacity(phrase.len() + SALT_LEN);
    material.extend_from_slice(phrase);
    material.extend_from_slice(salt);
    let key = blake3::derive_key(SHARE_KDF_CONTEXT, &material);
    material.zeroize();
    key
}
