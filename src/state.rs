use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::dedup::DedupStore;
use crate::wallet_age::WalletAgeCache;

const WALLET_AGES_FILE: &str = "wallet_ages.json";
const SEEN_TRADES_FILE: &str = "seen_trades.json";

/// On-disk home of the two stores that carry over between runs.
///
/// Loading never fails: a missing file is a cold start and an unreadable one
/// is logged and treated the same way. Saving replaces each file atomically.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn wallet_ages_path(&self) -> PathBuf {
        self.dir.join(WALLET_AGES_FILE)
    }

    pub fn seen_trades_path(&self) -> PathBuf {
        self.dir.join(SEEN_TRADES_FILE)
    }

    pub fn load_wallet_ages(&self) -> WalletAgeCache {
        load_or_default(&self.wallet_ages_path())
    }

    pub fn load_seen_trades(&self) -> DedupStore {
        load_or_default(&self.seen_trades_path())
    }

    /// Persist both stores. Either file may already be replaced when the
    /// second write fails, but neither is ever left truncated.
    pub fn save(&self, wallet_ages: &WalletAgeCache, seen: &DedupStore) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        write_atomic(&self.dir, &self.wallet_ages_path(), wallet_ages)?;
        write_atomic(&self.dir, &self.seen_trades_path(), seen)?;
        debug!(
            "Saved state: {} wallet ages, {} seen trades",
            wallet_ages.len(),
            seen.len()
        );
        Ok(())
    }
}

fn load_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No state at {}, starting empty", path.display());
            return T::default();
        }
        Err(e) => {
            warn!("Failed to read {}: {e}; starting empty", path.display());
            return T::default();
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => value,
        Err(e) => {
            warn!("Corrupt state in {}: {e}; starting empty", path.display());
            T::default()
        }
    }
}

/// Write to a uniquely named temp file in `dir`, fsync, then rename it over
/// `path` and fsync `dir` so the rename itself is durable.
fn write_atomic<T: Serialize>(dir: &Path, path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    tmp.write_all(&json)
        .and_then(|()| tmp.as_file().sync_all())
        .with_context(|| format!("failed to write temp file for {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;

    sync_dir(dir)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)
        .and_then(|d| d.sync_all())
        .with_context(|| format!("failed to sync {}", dir.display()))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
