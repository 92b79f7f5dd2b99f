use crate::domain::block::Hrs;
use crate::foundation::{ChainId, VigilError};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Durable record of the highest consensus attempt ever signed for one chain.
///
/// Serialized form matches the on-disk JSON contract: `height`, `round`,
/// `step`, `signature` and `signbytes` as base64, plus the wall-clock commit
/// timestamp.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct SignState {
    pub height: u64,
    pub round: u64,
    pub step: u8,
    #[serde(default, with = "crate::foundation::util::encoding::base64_bytes")]
    pub signature: Vec<u8>,
    #[serde(default, rename = "signbytes", with = "crate::foundation::util::encoding::base64_bytes")]
    pub sign_bytes: Vec<u8>,
    #[serde(default)]
    pub timestamp_nanos: u64,
}

impl SignState {
    pub fn hrs_key(&self) -> (u64, u64, u8) {
        (self.height, self.round, self.step)
    }

    /// True before the first commit; a fresh state never refuses an attempt.
    pub fn is_empty(&self) -> bool {
        self.height == 0 && self.round == 0 && self.step == 0
    }
}

/// Outcome of checking an incoming attempt against the stored state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Advance {
    /// Strictly greater than anything signed before; the caller may sign.
    Proceed,
    /// Exact replay of the committed attempt; serve the stored signature.
    Replay(Vec<u8>),
}

/// The double-sign rule: (H,R,S) may only move forward, and an equal attempt
/// is served idempotently only when the payload is bit-identical.
pub fn check_advance(state: &SignState, chain_id: &ChainId, hrs: Hrs, sign_bytes: &[u8]) -> Result<Advance, VigilError> {
    if state.is_empty() {
        return Ok(Advance::Proceed);
    }
    let incoming = (hrs.height, hrs.round, hrs.step.as_u8());
    let stored = state.hrs_key();
    if incoming > stored {
        return Ok(Advance::Proceed);
    }
    if incoming == stored && bool::from(sign_bytes.ct_eq(&state.sign_bytes)) {
        return Ok(Advance::Replay(state.signature.clone()));
    }
    Err(VigilError::DoubleSign { chain_id: chain_id.to_string(), height: hrs.height, round: hrs.round, step: hrs.step.as_u8() })
}

/// Guard for `commit`: writing a value at or below the current state is an
/// in-process bug, not a protocol refusal.
pub fn check_regression(state: &SignState, chain_id: &ChainId, hrs: Hrs) -> Result<(), VigilError> {
    let incoming = (hrs.height, hrs.round, hrs.step.as_u8());
    if !state.is_empty() && incoming <= state.hrs_key() {
        return Err(VigilError::StateRegression {
            chain_id: chain_id.to_string(),
            stored: format!("{}/{}/{}", state.height, state.round, state.step),
            attempted: hrs.to_string(),
        });
    }
    Ok(())
}
