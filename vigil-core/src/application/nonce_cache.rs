use crate::domain::block::Hrs;
use crate::domain::threshold::nonce::{Nonce, NonceEnvelope};
use crate::foundation::{ChainId, Hash32};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex as AsyncMutex;

/// One prepared signing attempt: the nonce this cosigner dealt for an HRS,
/// and, once a partial has been emitted, the sealed result.
pub struct NonceEntry {
    pub nonce: Nonce,
    /// Our full dealing, kept so repeated GetNonces responses are
    /// byte-identical.
    pub envelopes: Vec<NonceEnvelope>,
    pub sealed: Option<SealedPartial>,
    pub created_at_nanos: u64,
}

/// A partial is single-use: after emission the entry only ever replays the
/// exact same session or refuses.
pub struct SealedPartial {
    /// Digest binding the session: sign bytes plus the participating
    /// commitment set.
    pub session_digest: Hash32,
    pub partial: [u8; 32],
    pub timestamp_nanos: u64,
}

type EntrySlot = Arc<AsyncMutex<Option<NonceEntry>>>;

/// Cosigner-local map `(chain, HRS) -> nonce entry` with per-entry locks.
///
/// The outer map lock is only held for lookups; generation and signing run
/// under the entry lock so concurrent calls for the same HRS serialize
/// without blocking other attempts.
pub struct NonceCache {
    ttl_nanos: u64,
    entries: StdMutex<HashMap<(ChainId, Hrs), EntrySlot>>,
}

impl NonceCache {
    pub fn new(ttl_nanos: u64) -> Self {
        Self { ttl_nanos, entries: StdMutex::new(HashMap::new()) }
    }

    /// Slot for `(chain, hrs)`, creating an empty one on first touch.
    /// Expired entries are swept opportunistically on the way in.
    pub fn get_or_create(&self, chain_id: &ChainId, hrs: Hrs, now_nanos: u64) -> EntrySlot {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Self::sweep_locked(&mut entries, self.ttl_nanos, now_nanos);
        entries.entry((chain_id.clone(), hrs)).or_default().clone()
    }

    /// Slot for `(chain, hrs)` if one was ever prepared.
    pub fn lookup(&self, chain_id: &ChainId, hrs: Hrs) -> Option<EntrySlot> {
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.get(&(chain_id.clone(), hrs)).cloned()
    }

    /// Drop entries the chain has moved past. Called after a partial commits
    /// at `hrs`; anything strictly below it can never be signed again.
    pub fn evict_below(&self, chain_id: &ChainId, hrs: Hrs) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = entries.len();
        entries.retain(|(chain, key_hrs), _| chain != chain_id || *key_hrs >= hrs);
        before - entries.len()
    }

    /// TTL sweep, called from the background tick.
    pub fn sweep(&self, now_nanos: u64) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Self::sweep_locked(&mut entries, self.ttl_nanos, now_nanos)
    }

    fn sweep_locked(entries: &mut HashMap<(ChainId, Hrs), EntrySlot>, ttl_nanos: u64, now_nanos: u64) -> usize {
        let before = entries.len();
        entries.retain(|_, slot| match slot.try_lock() {
            Ok(entry) => match entry.as_ref() {
                Some(entry) => now_nanos.saturating_sub(entry.created_at_nanos) < ttl_nanos,
                None => true,
            },
            // Locked entries are in active use; never sweep under a signer.
            Err(_) => true,
        });
        before - entries.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }
}
