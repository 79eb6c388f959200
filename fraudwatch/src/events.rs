// fraudwatch/src/events.rs
//
// Domain types flowing through the pipeline: the inbound transaction record,
// the decision produced for it, and the outbound/audit envelopes.
// Transaction mirrors the feed's JSON payload and is never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One transaction event from the feed. Immutable once parsed.
///
/// Coordinates and region labels are optional — the feed occasionally ships
/// partial records, and feature computation resolves every gap with a
/// defined fallback rather than an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub trans_num: String,
    pub cc_num: String,
    pub user_id: String,
    pub acct_num: String,
    pub merchant: String,
    pub amt: f64,
    pub category: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default, rename = "long")]
    pub lon: Option<f64>,
    #[serde(default)]
    pub merch_lat: Option<f64>,
    #[serde(default)]
    pub merch_long: Option<f64>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    pub unix_time: i64,
}

impl Transaction {
    /// Region label used for the new-region indicator and the user's
    /// last-region tracking. None when the feed omitted it.
    pub fn region(&self) -> Option<&str> {
        self.state.as_deref().filter(|s| !s.is_empty())
    }
}

// ── Decisions ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Legitimate,
    Fraudulent,
}

impl Decision {
    /// Wire value expected by the flag endpoint: 0 = legitimate, 1 = fraud.
    pub fn flag_value(self) -> u8 {
        match self {
            Self::Legitimate => 0,
            Self::Fraudulent => 1,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Legitimate => write!(f, "LEGITIMATE"),
            Self::Fraudulent => write!(f, "FRAUDULENT"),
        }
    }
}

/// A transaction together with its scored outcome. Built once per event,
/// after feature computation and scoring, before state update.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredTransaction {
    pub trans_num: String,
    pub decision: Decision,
    pub probability: f64,
}

// ── Outbound / audit envelopes ────────────────────────────────────────────────

/// Payload for the best-effort flag endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct FlagRequest {
    pub trans_num: String,
    pub flag_value: u8,
}

impl From<&ScoredTransaction> for FlagRequest {
    fn from(s: &ScoredTransaction) -> Self {
        Self {
            trans_num: s.trans_num.clone(),
            flag_value: s.decision.flag_value(),
        }
    }
}

/// Append-only audit line: the raw transaction plus what we decided about it.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub transaction: Transaction,
    pub decision: Decision,
    pub probability: f64,
    pub processed_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(transaction: Transaction, decision: Decision, probability: f64) -> Self {
        Self {
            transaction,
            decision,
            probability,
            processed_at: Utc::now(),
        }
    }

    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
