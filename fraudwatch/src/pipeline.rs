// fraudwatch/src/pipeline.rs
//
// Per-transaction processing, end to end:
//
//   snapshot entity state → compute features → score → classify
//   → notify (async, best-effort) → audit (async, best-effort)
//   → apply state update (must happen)
//
// The ordering contract lives here: the feature vector is computed from a
// pre-update snapshot, and the state update runs strictly after scoring.
// Nothing in this path can fail a transaction — every collaborator degrades
// to a defined fallback.

use std::sync::Arc;

use tracing::{debug, info};

use crate::audit::AuditLog;
use crate::encodings::EncodingCache;
use crate::events::{AuditRecord, Decision, FlagRequest, ScoredTransaction, Transaction};
use crate::features;
use crate::health::HealthState;
use crate::model::ScoringModel;
use crate::notifier::Notifier;
use crate::state::store::EntityStateStore;

pub struct Pipeline {
    pub store: Arc<EntityStateStore>,
    pub encodings: Arc<EncodingCache>,
    pub model: Arc<ScoringModel>,
    pub notifier: Notifier,
    pub audit: AuditLog,
    pub health: Arc<HealthState>,
}

impl Pipeline {
    /// Process one transaction. Infallible: every error path inside has
    /// already been collapsed to a fallback value or a best-effort side
    /// channel.
    pub fn process(&self, txn: Transaction) -> ScoredTransaction {
        // Point-in-time snapshot, before this transaction touches anything.
        let snapshots = self.store.snapshot_for(&txn);

        let vector = features::compute(&txn, &snapshots, &self.encodings);
        let probability = self.model.score(&vector);
        let decision = self.model.classify(probability);

        if decision == Decision::Fraudulent {
            info!(
                trans_num = %txn.trans_num,
                probability,
                "transaction flagged FRAUDULENT"
            );
        } else {
            debug!(trans_num = %txn.trans_num, probability, "transaction scored");
        }

        let scored = ScoredTransaction {
            trans_num: txn.trans_num.clone(),
            decision,
            probability,
        };

        // Off the critical path; both swallow their own failures.
        self.notifier.notify(FlagRequest::from(&scored));
        self.audit
            .record(AuditRecord::new(txn.clone(), decision, probability));

        // The decision is made — commit this transaction to history.
        self.store.apply_transaction(&txn);
        self.health.record_event(txn.unix_time);

        scored
    }
}
