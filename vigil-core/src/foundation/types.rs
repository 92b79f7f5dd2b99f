use crate::foundation::VigilError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

pub type Hash32 = [u8; 32];

/// Chain identifier, e.g. `cosmoshub-4`. One validator may serve several chains;
/// every piece of persistent state is keyed by this.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ChainId(String);

impl ChainId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deref for ChainId {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl From<String> for ChainId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ChainId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Cosigner shard identifier. Dense small integers 1..=N; doubles as the
/// x-coordinate of this cosigner's Shamir shares, so zero is never valid.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ShardId(u8);

impl ShardId {
    pub fn new(value: u8) -> Result<Self, VigilError> {
        if value == 0 {
            return Err(VigilError::InvalidShardId { shard_id: 0, reason: "shard ids start at 1".to_string() });
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for ShardId {
    type Error = VigilError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
