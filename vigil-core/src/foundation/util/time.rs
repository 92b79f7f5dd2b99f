use crate::foundation::{VigilError, NANOS_PER_SECOND};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn current_timestamp_nanos() -> Result<u64, VigilError> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).map_err(|err| VigilError::Message(err.to_string()))?;
    Ok(now.as_secs().saturating_mul(NANOS_PER_SECOND).saturating_add(u64::from(now.subsec_nanos())))
}
