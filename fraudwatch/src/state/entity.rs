// fraudwatch/src/state/entity.rs
//
// Per-entity state records: card, user, merchant, account-group.
// Each record knows its own zero state and how to fold one transaction in
// (`observe`). Folding happens only after that transaction has been scored —
// the store enforces the ordering, the records just apply deltas.
//
// All records are serde types so the checkpoint module can snapshot them
// verbatim.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::events::Transaction;

// ── Window horizons ───────────────────────────────────────────────────────────

pub const W_15MIN: i64 = 15 * 60;
pub const W_1HR: i64 = 60 * 60;
pub const W_24HR: i64 = 24 * 60 * 60;

// Retained-length caps per window; bounds memory per card regardless of rate.
const CAP_15MIN: usize = 100;
const CAP_1HR: usize = 100;
const CAP_24HR: usize = 200;

/// How many trailing amounts the user record retains.
const LAST_AMOUNTS: usize = 5;

// ── Sliding timestamp window ──────────────────────────────────────────────────

/// Bounded list of recent event timestamps for one horizon.
///
/// `pruned(now)` is the read path: entries strictly before `now` and younger
/// than the horizon. Strictness is what keeps a transaction's own timestamp
/// (or a same-second concurrent one already applied) out of its own
/// feature vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidingWindow {
    horizon_secs: i64,
    cap: usize,
    timestamps: VecDeque<i64>,
}

impl SlidingWindow {
    pub fn new(horizon_secs: i64, cap: usize) -> Self {
        Self {
            horizon_secs,
            cap,
            timestamps: VecDeque::new(),
        }
    }

    /// Count of entries with `ts < now` and `now - ts < horizon`.
    pub fn count_before(&self, now: i64) -> usize {
        self.timestamps
            .iter()
            .filter(|&&t| t < now && now - t < self.horizon_secs)
            .count()
    }

    /// Append `ts`, dropping entries that have aged out relative to it,
    /// then trim to the retained-length cap (oldest first).
    pub fn push(&mut self, ts: i64) {
        while self
            .timestamps
            .front()
            .map(|&t| ts - t >= self.horizon_secs)
            .unwrap_or(false)
        {
            self.timestamps.pop_front();
        }
        self.timestamps.push_back(ts);
        while self.timestamps.len() > self.cap {
            self.timestamps.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

// ── Card ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardState {
    pub last_seen: i64, // unix seconds; 0 = never
    pub txn_count: u64,
    pub total_amount: f64,
    pub window_15min: SlidingWindow,
    pub window_1hr: SlidingWindow,
    pub window_24hr: SlidingWindow,
}

impl Default for CardState {
    fn default() -> Self {
        Self {
            last_seen: 0,
            txn_count: 0,
            total_amount: 0.0,
            window_15min: SlidingWindow::new(W_15MIN, CAP_15MIN),
            window_1hr: SlidingWindow::new(W_1HR, CAP_1HR),
            window_24hr: SlidingWindow::new(W_24HR, CAP_24HR),
        }
    }
}

impl CardState {
    pub fn avg_amount(&self) -> f64 {
        if self.txn_count == 0 {
            0.0
        } else {
            self.total_amount / self.txn_count as f64
        }
    }

    pub fn observe(&mut self, txn: &Transaction) {
        self.last_seen = txn.unix_time;
        self.txn_count += 1;
        self.total_amount += txn.amt;
        self.window_15min.push(txn.unix_time);
        self.window_1hr.push(txn.unix_time);
        self.window_24hr.push(txn.unix_time);
    }
}

// ── User ──────────────────────────────────────────────────────────────────────

/// Running per-category aggregate inside the user record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryAggregate {
    pub count: u64,
    pub total_amount: f64,
}

impl CategoryAggregate {
    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_amount / self.count as f64
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserState {
    pub last_seen: i64,
    pub txn_count: u64,
    pub total_amount: f64,
    pub max_amount: f64,
    pub last_amounts: VecDeque<f64>,
    pub category_aggs: HashMap<String, CategoryAggregate>,
    pub merchant_visits: HashMap<String, u64>,
    pub last_region: Option<String>,
}

impl UserState {
    pub fn avg_amount(&self) -> f64 {
        if self.txn_count == 0 {
            0.0
        } else {
            self.total_amount / self.txn_count as f64
        }
    }

    pub fn avg_last_amounts(&self) -> Option<f64> {
        if self.last_amounts.is_empty() {
            None
        } else {
            Some(self.last_amounts.iter().sum::<f64>() / self.last_amounts.len() as f64)
        }
    }

    pub fn merchant_visit_count(&self, merchant: &str) -> u64 {
        self.merchant_visits.get(merchant).copied().unwrap_or(0)
    }

    pub fn category_avg(&self, category: &str) -> Option<f64> {
        self.category_aggs
            .get(category)
            .filter(|a| a.count > 0)
            .map(|a| a.avg())
    }

    pub fn observe(&mut self, txn: &Transaction) {
        self.last_seen = txn.unix_time;
        self.txn_count += 1;
        self.total_amount += txn.amt;
        if txn.amt > self.max_amount {
            self.max_amount = txn.amt;
        }
        self.last_amounts.push_back(txn.amt);
        while self.last_amounts.len() > LAST_AMOUNTS {
            self.last_amounts.pop_front();
        }
        let agg = self.category_aggs.entry(txn.category.clone()).or_default();
        agg.count += 1;
        agg.total_amount += txn.amt;
        *self.merchant_visits.entry(txn.merchant.clone()).or_default() += 1;
        if let Some(region) = txn.region() {
            self.last_region = Some(region.to_string());
        }
    }
}

// ── Merchant ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MerchantState {
    pub txn_count: u64,
    pub total_amount: f64,
    pub cards_seen: HashSet<String>,
}

impl MerchantState {
    pub fn avg_amount(&self) -> f64 {
        if self.txn_count == 0 {
            0.0
        } else {
            self.total_amount / self.txn_count as f64
        }
    }

    pub fn observe(&mut self, txn: &Transaction) {
        self.txn_count += 1;
        self.total_amount += txn.amt;
        self.cards_seen.insert(txn.cc_num.clone());
    }
}

// ── Account group ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountState {
    pub cards: HashSet<String>,
}

impl AccountState {
    pub fn observe(&mut self, txn: &Transaction) {
        self.cards.insert(txn.cc_num.clone());
    }
}
