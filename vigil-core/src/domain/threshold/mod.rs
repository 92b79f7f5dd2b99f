//! Two-round interactive threshold Ed25519 over t-of-N Shamir shares.
//!
//! Round 1: every participant generates an ephemeral nonce, commits to it
//! publicly and deals encrypted Shamir shares of it to all peers.
//! Round 2: every participant sums the nonce shares addressed to it, derives
//! the standard Ed25519 challenge from the aggregate commitment and emits a
//! 32-byte partial. Lagrange interpolation over any t partials yields a
//! signature that verifies under the single group key.

pub mod dealer;
pub mod nonce;
pub mod shamir;
pub mod sign;

pub use dealer::{deal, DealtShard, Dealing};
pub use nonce::{open_envelope, seal_nonce_shares, Nonce, NonceEnvelope, PeerEncryptionKey};
pub use sign::{aggregate_commitments, challenge, combine_partials, partial_sign, verify_signature, PartialSignature};
