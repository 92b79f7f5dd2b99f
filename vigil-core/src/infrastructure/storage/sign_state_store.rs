use crate::domain::block::Hrs;
use crate::domain::sign_state::{self, Advance, SignState};
use crate::foundation::util::time::current_timestamp_nanos;
use crate::foundation::{ChainId, VigilError, STATE_DIR_MODE, STATE_FILE_MODE};
use log::{info, warn};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Which of the two per-chain guard files this store owns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StateKind {
    /// `{chain_id}_priv_validator_state.json`, the validator-level record.
    Validator,
    /// `{chain_id}_share_sign_state.json`, this shard's partial-emission record.
    Shard,
}

impl StateKind {
    fn file_suffix(&self) -> &'static str {
        match self {
            StateKind::Validator => "priv_validator_state",
            StateKind::Shard => "share_sign_state",
        }
    }
}

/// Durable, single-writer store of the highest signed HRS per chain.
///
/// Each chain gets an async mutex held across the whole
/// check-and-advance .. commit critical section, which makes the store the
/// serialization point for all sign attempts on that chain.
pub struct SignStateStore {
    dir: PathBuf,
    kind: StateKind,
    chains: StdMutex<HashMap<ChainId, Arc<AsyncMutex<SignState>>>>,
}

impl SignStateStore {
    pub fn new(dir: impl Into<PathBuf>, kind: StateKind) -> Self {
        Self { dir: dir.into(), kind, chains: StdMutex::new(HashMap::new()) }
    }

    pub fn state_file_path(&self, chain_id: &ChainId) -> PathBuf {
        self.dir.join(format!("{}_{}.json", chain_id, self.kind.file_suffix()))
    }

    /// Open or create the state file for `chain_id`. A file that exists but
    /// does not parse fails hard; silently resetting it would reopen the
    /// double-sign window.
    pub fn load_or_create(&self, chain_id: &ChainId) -> Result<SignState, VigilError> {
        let entry = self.chain_entry(chain_id)?;
        let state = entry
            .try_lock()
            .map_err(|_| VigilError::StorageError { operation: "load".to_string(), details: "chain state busy".to_string() })?;
        Ok(state.clone())
    }

    /// Enter the per-chain critical section. The returned session owns the
    /// chain lock until dropped.
    pub async fn begin(&self, chain_id: &ChainId) -> Result<ChainStateSession, VigilError> {
        let entry = self.chain_entry(chain_id)?;
        let guard = entry.lock_owned().await;
        Ok(ChainStateSession { chain_id: chain_id.clone(), path: self.state_file_path(chain_id), guard })
    }

    fn chain_entry(&self, chain_id: &ChainId) -> Result<Arc<AsyncMutex<SignState>>, VigilError> {
        let mut chains = self
            .chains
            .lock()
            .map_err(|_| VigilError::StorageError { operation: "lock".to_string(), details: "chain map poisoned".to_string() })?;
        if let Some(entry) = chains.get(chain_id) {
            return Ok(entry.clone());
        }
        let state = self.load_from_disk(chain_id)?;
        let entry = Arc::new(AsyncMutex::new(state));
        chains.insert(chain_id.clone(), entry.clone());
        Ok(entry)
    }

    fn load_from_disk(&self, chain_id: &ChainId) -> Result<SignState, VigilError> {
        ensure_state_dir(&self.dir)?;
        let path = self.state_file_path(chain_id);
        if !path.exists() {
            let state = SignState::default();
            write_atomic(&path, &state)?;
            info!("initialized sign state file chain_id={} path={}", chain_id, path.display());
            return Ok(state);
        }
        let raw = fs::read(&path)?;
        serde_json::from_slice(&raw).map_err(|err| VigilError::CorruptStateFile {
            path: path.display().to_string(),
            details: err.to_string(),
        })
    }
}

/// Exclusive access to one chain's sign state for the duration of a sign
/// attempt.
pub struct ChainStateSession {
    chain_id: ChainId,
    path: PathBuf,
    guard: OwnedMutexGuard<SignState>,
}

impl ChainStateSession {
    pub fn state(&self) -> &SignState {
        &self.guard
    }

    pub fn check_and_advance(&self, hrs: Hrs, sign_bytes: &[u8]) -> Result<Advance, VigilError> {
        sign_state::check_advance(&self.guard, &self.chain_id, hrs, sign_bytes)
    }

    /// Persist a newly produced signature. Atomic temp-file + rename in the
    /// state directory; the in-memory state only advances after the rename
    /// lands, so a crash leaves either the old or the new file, never a
    /// half-written one.
    pub fn commit(&mut self, hrs: Hrs, sign_bytes: &[u8], signature: &[u8]) -> Result<(), VigilError> {
        sign_state::check_regression(&self.guard, &self.chain_id, hrs)?;
        let next = SignState {
            height: hrs.height,
            round: hrs.round,
            step: hrs.step.as_u8(),
            signature: signature.to_vec(),
            sign_bytes: sign_bytes.to_vec(),
            timestamp_nanos: current_timestamp_nanos()?,
        };
        write_atomic(&self.path, &next)?;
        *self.guard = next;
        Ok(())
    }

    /// Replace the in-memory and on-disk state with a snapshot from the
    /// replicated log, used when taking over leadership. Regressions are
    /// ignored: the replicated state can only be equal or newer, and an older
    /// snapshot must never roll the local guard back.
    pub fn sync_from_replicated(&mut self, replicated: SignState) -> Result<(), VigilError> {
        if replicated.hrs_key() <= self.guard.hrs_key() {
            return Ok(());
        }
        info!(
            "syncing sign state from replicated log chain_id={} stored={:?} replicated={:?}",
            self.chain_id,
            self.guard.hrs_key(),
            replicated.hrs_key()
        );
        write_atomic(&self.path, &replicated)?;
        *self.guard = replicated;
        Ok(())
    }
}

fn ensure_state_dir(dir: &Path) -> Result<(), VigilError> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = fs::metadata(dir)?;
        let mut permissions = metadata.permissions();
        if permissions.mode() & 0o777 != STATE_DIR_MODE {
            permissions.set_mode(STATE_DIR_MODE);
            fs::set_permissions(dir, permissions)?;
        }
    }
    Ok(())
}

fn write_atomic(path: &Path, state: &SignState) -> Result<(), VigilError> {
    let parent = path
        .parent()
        .ok_or_else(|| VigilError::StorageError { operation: "write".to_string(), details: "state path has no parent".to_string() })?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::OpenOptions::new().create(true).write(true).truncate(true).open(&tmp)?;
        file.write_all(&serde_json::to_vec_pretty(state)?)?;
        file.sync_all()?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(STATE_FILE_MODE))?;
    }
    if let Err(err) = fs::rename(&tmp, path) {
        warn!("atomic rename failed path={} error={}", path.display(), err);
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }
    // Rename durability needs the directory entry flushed too.
    if let Ok(dir) = fs::File::open(parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}
