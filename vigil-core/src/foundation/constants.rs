//! System-wide constants for the Vigil threshold signer.

/// Nanoseconds per second (10^9).
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Nanoseconds per millisecond (10^6).
pub const NANOS_PER_MILLI: u64 = 1_000_000;

/// Default window for assembling a signing quorum (500 ms).
///
/// A block that cannot gather nonces from t cosigners within this window is
/// abandoned; the upstream consensus engine re-requests on its own schedule.
pub const DEFAULT_GRACE_WINDOW_MS: u64 = 500;

/// Default time-to-live for cached nonces (10 s).
///
/// Entries older than this are swept whether or not they were consumed.
pub const DEFAULT_NONCE_TTL_MS: u64 = 10_000;

/// Interval of the background nonce-cache sweep tick (1 s).
pub const NONCE_SWEEP_INTERVAL_MS: u64 = 1_000;

/// Default deadline for a replicated-log commit (3 s).
///
/// A commit that misses this deadline is treated as lost leadership.
pub const DEFAULT_RAFT_TIMEOUT_MS: u64 = 3_000;

/// Default per-peer RPC deadline (1 s).
pub const DEFAULT_PEER_TIMEOUT_MS: u64 = 1_000;

/// Bound on concurrently processed sign requests per chain.
pub const MAX_IN_FLIGHT_PER_CHAIN: usize = 8;

/// Ed25519 signature size in bytes.
pub const ED25519_SIGNATURE_SIZE: usize = 64;

/// Ed25519 compressed point / scalar size in bytes.
pub const ED25519_SCALAR_SIZE: usize = 32;

/// Minimum signing threshold. A 1-of-N "threshold" is a plain signer.
pub const MIN_THRESHOLD: u8 = 2;

/// Maximum cosigner count; shard ids are u8 and dense from 1.
pub const MAX_COSIGNERS: u8 = 32;

/// Unix permissions for the state directory.
pub const STATE_DIR_MODE: u32 = 0o700;

/// Unix permissions for state and key files.
pub const STATE_FILE_MODE: u32 = 0o600;
