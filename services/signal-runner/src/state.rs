//! State persistence - JSON snapshot of history, statistics and cooldown

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::signal::Signal;
use crate::stats::Statistics;
use crate::trade::Trade;

const STATE_FILE: &str = "state.json";

/// Everything needed to resume after a restart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    /// Newest first
    pub trade_history: Vec<Trade>,
    pub statistics: Statistics,
    pub cooldown_end: Option<DateTime<Utc>>,
    pub active_trade: Option<Trade>,
    pub last_signal: Option<Signal>,
    pub saved_at: Option<DateTime<Utc>>,
}

/// Best-effort storage; callers log failures and carry on
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    /// `None` when nothing has been saved yet
    async fn load(&self) -> Result<Option<PersistedState>>;

    async fn save(&self, state: &PersistedState) -> Result<()>;
}

/// Writes `state.json` under a directory
pub struct JsonStateStore {
    state_dir: PathBuf,
}

impl JsonStateStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    async fn read(&self) -> anyhow::Result<Option<PersistedState>> {
        let path = self.path();
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };

        let state = serde_json::from_str(&raw)
            .with_context(|| format!("decoding {}", path.display()))?;
        Ok(Some(state))
    }

    async fn write(&self, state: &PersistedState) -> anyhow::Result<()> {
        fs::create_dir_all(&self.state_dir)
            .await
            .with_context(|| format!("creating {}", self.state_dir.display()))?;

        let path = self.path();
        let tmp = temp_path(&path);
        let json = serde_json::to_string_pretty(state)?;

        fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("replacing {}", path.display()))?;

        debug!("Wrote {}", path.display());
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

#[async_trait::async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> Result<Option<PersistedState>> {
        self.read()
            .await
            .map_err(|e| EngineError::Persistence(format!("{:#}", e)))
    }

    async fn save(&self, state: &PersistedState) -> Result<()> {
        self.write(state)
            .await
            .map_err(|e| EngineError::Persistence(format!("{:#}", e)))
    }
}
