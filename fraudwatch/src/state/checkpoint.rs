// fraudwatch/src/state/checkpoint.rs
//
// File-backed state persistence.
//
// On a timer and on graceful shutdown: serialize the Entity State Store to a
// JSON checkpoint so per-entity history survives process restarts.
// On startup: restore the checkpoint before accepting events.
//
// This prevents the cold-start problem where every restart forgets all card
// and user history, making each entity look brand-new until traffic rebuilds
// the aggregates.
//
// Write path is atomic-by-rename: serialize to `<path>.tmp`, then rename over
// the live file. A failed write is logged and skipped — in-memory state stays
// authoritative and the previous checkpoint remains intact.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::state::entity::{AccountState, CardState, MerchantState, UserState};
use crate::state::store::EntityStateStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointFile {
    pub saved_at_unix: i64,
    pub cards: Vec<(String, CardState)>,
    pub users: Vec<(String, UserState)>,
    pub merchants: Vec<(String, MerchantState)>,
    pub accounts: Vec<(String, AccountState)>,
}

pub struct Checkpointer {
    path: PathBuf,
    interval: Duration,
    store: Arc<EntityStateStore>,
}

impl Checkpointer {
    pub fn new(path: impl Into<PathBuf>, interval: Duration, store: Arc<EntityStateStore>) -> Self {
        Self {
            path: path.into(),
            interval,
            store,
        }
    }

    /// Background loop — periodically persists the store until cancelled.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.save().await {
                        warn!("checkpoint failed: {e:#}");
                    }
                }
                changed = shutdown.changed() => {
                    // Sender gone or shutdown flagged — either way, stop;
                    // main writes the final checkpoint itself.
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// Serialize the full store. Called from the loop and once on shutdown.
    pub async fn save(&self) -> Result<()> {
        let file = CheckpointFile {
            saved_at_unix: chrono::Utc::now().timestamp(),
            cards: self.store.export_cards(),
            users: self.store.export_users(),
            merchants: self.store.export_merchants(),
            accounts: self.store.export_accounts(),
        };
        let json = serde_json::to_vec(&file)?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        info!(
            cards = file.cards.len(),
            users = file.users.len(),
            merchants = file.merchants.len(),
            accounts = file.accounts.len(),
            "checkpoint saved"
        );
        Ok(())
    }

    /// Restore a previous checkpoint into the store. Missing file is a clean
    /// cold start, not an error. Returns the number of records restored.
    pub async fn restore(&self) -> Result<usize> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no checkpoint at {} — cold start", self.path.display());
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };
        let file: CheckpointFile = serde_json::from_slice(&bytes)?;

        let n = file.cards.len() + file.users.len() + file.merchants.len() + file.accounts.len();
        for (k, v) in file.cards {
            self.store.restore_card(k, v);
        }
        for (k, v) in file.users {
            self.store.restore_user(k, v);
        }
        for (k, v) in file.merchants {
            self.store.restore_merchant(k, v);
        }
        for (k, v) in file.accounts {
            self.store.restore_account(k, v);
        }
        info!(records = n, "checkpoint restored");
        Ok(n)
    }
}
