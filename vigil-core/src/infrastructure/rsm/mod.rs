//! Replicated last-sign-state contract.
//!
//! The fleet-wide sign state lives in a crash-fault-tolerant, linearizable
//! log with single-leader election (replication quorum floor(N/2)+1,
//! independent of the signing threshold). Vigil consumes that log through
//! this trait; it does not implement consensus itself.

use crate::domain::sign_state::SignState;
use crate::foundation::{ChainId, ShardId, VigilError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// One committed last-sign-state record.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SignStateEntry {
    pub chain_id: ChainId,
    pub state: SignState,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LeaderInfo {
    pub shard_id: ShardId,
    pub address: String,
}

#[async_trait]
pub trait ReplicatedLog: Send + Sync {
    /// Commit an entry. Returns only after the entry is durable on a
    /// replication quorum; fails with `NotLeader` when this node cannot
    /// commit.
    async fn apply(&self, entry: SignStateEntry) -> Result<(), VigilError>;

    /// Read the latest committed state for a chain.
    async fn get(&self, chain_id: &ChainId) -> Result<Option<SignState>, VigilError>;

    fn is_leader(&self) -> bool;

    fn leader(&self) -> Option<LeaderInfo>;

    /// Hand leadership to `target`, or to the next candidate when `None`.
    /// No-op when called on a non-leader.
    async fn transfer_leadership(&self, target: Option<ShardId>) -> Result<Option<LeaderInfo>, VigilError>;
}

struct MemoryLogInner {
    states: HashMap<ChainId, SignState>,
    leader: Option<LeaderInfo>,
}

/// In-process `ReplicatedLog`: a single node is trivially linearizable.
/// Backs single-cosigner deployments and the test harness, where leadership
/// is toggled to exercise failover paths.
pub struct MemoryLog {
    own: LeaderInfo,
    roster: Vec<LeaderInfo>,
    inner: Mutex<MemoryLogInner>,
}

impl MemoryLog {
    pub fn new(own: LeaderInfo, roster: Vec<LeaderInfo>) -> Self {
        let leader = Some(own.clone());
        Self { own, roster, inner: Mutex::new(MemoryLogInner { states: HashMap::new(), leader }) }
    }

    /// Test/failover hook: force the current leader.
    pub fn set_leader(&self, leader: Option<LeaderInfo>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.leader = leader;
        }
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, MemoryLogInner>, VigilError> {
        self.inner
            .lock()
            .map_err(|_| VigilError::StorageError { operation: "rsm".to_string(), details: "memory log lock poisoned".to_string() })
    }
}

#[async_trait]
impl ReplicatedLog for MemoryLog {
    async fn apply(&self, entry: SignStateEntry) -> Result<(), VigilError> {
        let mut inner = self.lock_inner()?;
        if inner.leader.as_ref() != Some(&self.own) {
            return Err(VigilError::NotLeader { leader: inner.leader.as_ref().map(|l| l.address.clone()) });
        }
        let current = inner.states.get(&entry.chain_id);
        if let Some(current) = current {
            if entry.state.hrs_key() <= current.hrs_key() {
                return Ok(());
            }
        }
        inner.states.insert(entry.chain_id, entry.state);
        Ok(())
    }

    async fn get(&self, chain_id: &ChainId) -> Result<Option<SignState>, VigilError> {
        Ok(self.lock_inner()?.states.get(chain_id).cloned())
    }

    fn is_leader(&self) -> bool {
        self.inner.lock().map(|inner| inner.leader.as_ref() == Some(&self.own)).unwrap_or(false)
    }

    fn leader(&self) -> Option<LeaderInfo> {
        self.inner.lock().ok().and_then(|inner| inner.leader.clone())
    }

    async fn transfer_leadership(&self, target: Option<ShardId>) -> Result<Option<LeaderInfo>, VigilError> {
        let mut inner = self.lock_inner()?;
        if inner.leader.as_ref() != Some(&self.own) {
            return Ok(inner.leader.clone());
        }
        let next = match target {
            Some(shard_id) => self.roster.iter().find(|info| info.shard_id == shard_id).cloned(),
            None => self.roster.iter().find(|info| **info != self.own).cloned(),
        };
        if let Some(next) = next {
            inner.leader = Some(next.clone());
            return Ok(Some(next));
        }
        Ok(inner.leader.clone())
    }
}
