// fraudwatch/src/encodings.rs
//
// Static target-encoding cache.
//
// The training pipeline exports a table of (feature, value) → fraud-rate
// rows plus one global row, as NDJSON:
//
//   {"feature": "merchant", "value": "Acme Corp", "fraud_rate": 0.0156}
//   {"feature": "_global",  "value": "fraud_mean", "fraud_rate": 0.0029}
//
// Loaded once at startup; read-only in steady state. `reload()` swaps the
// whole snapshot — there is no per-entry invalidation path.
//
// Lookup never fails: any (feature, value) pair unseen at training time
// resolves to the global fraud mean, never to an error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{info, warn};

/// Default global fraud mean, matching the training export's fallback when
/// the `_global` row is absent.
pub const DEFAULT_GLOBAL_FRAUD_MEAN: f64 = 0.0029;

#[derive(Debug, Deserialize)]
struct EncodingRow {
    feature: String,
    value: String,
    fraud_rate: f64,
}

#[derive(Debug, Default)]
struct Snapshot {
    maps: HashMap<String, HashMap<String, f64>>,
    global_mean: f64,
}

pub struct EncodingCache {
    path: Option<PathBuf>,
    snapshot: RwLock<Snapshot>,
}

impl EncodingCache {
    /// Load from an NDJSON table. A missing file is not fatal — the cache
    /// starts empty and every lookup returns the default global mean.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = read_table(&path).await;
        Ok(Self {
            path: Some(path),
            snapshot: RwLock::new(snapshot),
        })
    }

    /// An empty cache with the default global mean. Used when no table is
    /// configured, and by tests.
    pub fn empty() -> Self {
        Self {
            path: None,
            snapshot: RwLock::new(Snapshot {
                maps: HashMap::new(),
                global_mean: DEFAULT_GLOBAL_FRAUD_MEAN,
            }),
        }
    }

    /// Insert one entry directly. Test fixture path.
    pub fn insert(&self, feature: &str, value: &str, fraud_rate: f64) {
        self.snapshot
            .write()
            .maps
            .entry(feature.to_string())
            .or_default()
            .insert(value.to_string(), fraud_rate);
    }

    /// `encode(feature, value)` — the global mean when the pair is absent.
    pub fn encode(&self, feature: &str, value: &str) -> f64 {
        let snap = self.snapshot.read();
        snap.maps
            .get(feature)
            .and_then(|m| m.get(value))
            .copied()
            .unwrap_or(snap.global_mean)
    }

    pub fn global_mean(&self) -> f64 {
        self.snapshot.read().global_mean
    }

    /// Re-read the table from disk and swap the snapshot in one step.
    /// The only mutation path after startup.
    pub async fn reload(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot = read_table(path).await;
        *self.snapshot.write() = snapshot;
        Ok(())
    }

    pub fn n_features(&self) -> usize {
        self.snapshot.read().maps.len()
    }
}

async fn read_table(path: &Path) -> Snapshot {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) => {
            warn!(
                "no encoding table at {} ({e}) — using global mean for all encodings",
                path.display()
            );
            return Snapshot {
                maps: HashMap::new(),
                global_mean: DEFAULT_GLOBAL_FRAUD_MEAN,
            };
        }
    };

    let mut maps: HashMap<String, HashMap<String, f64>> = HashMap::new();
    let mut global_mean = DEFAULT_GLOBAL_FRAUD_MEAN;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row: EncodingRow = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                warn!("skipping malformed encoding row: {e}");
                continue;
            }
        };
        if row.feature == "_global" {
            if row.value == "fraud_mean" {
                global_mean = row.fraud_rate;
            }
            continue;
        }
        maps.entry(row.feature).or_default().insert(row.value, row.fraud_rate);
    }

    for (feature, map) in &maps {
        info!("loaded {feature} encoding map ({} entries)", map.len());
    }
    info!("global fraud mean: {global_mean:.6}");

    Snapshot { maps, global_mean }
}
