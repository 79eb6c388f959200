// fraudwatch/src/state/store.rs
//
// Entity State Store — sharded concurrent per-key records.
// DashMap = sharded concurrent HashMap — safe across tokio tasks with no mutex.
//
// Contract:
//   get_*(key)            — owned snapshot; zero state on miss, never fails,
//                           no side effects (a read does not create a record).
//   apply_transaction(tx) — folds the event into all four referenced records.
//
// Atomicity: each per-kind update runs inside the map's entry guard, so two
// concurrent transactions on the same key serialize on the shard lock and no
// increment is lost. Updates to different keys proceed fully in parallel.
// The store never serializes whole-transaction processing per entity —
// feature reads for one transaction may interleave with state updates for
// another on the same key. That bounded race is intentional.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::events::Transaction;
use crate::state::entity::{AccountState, CardState, MerchantState, UserState};

pub struct EntityStateStore {
    cards: DashMap<String, CardState>,
    users: DashMap<String, UserState>,
    merchants: DashMap<String, MerchantState>,
    accounts: DashMap<String, AccountState>,

    pub total_updates: AtomicU64,
}

impl EntityStateStore {
    pub fn new() -> Self {
        Self {
            cards: DashMap::new(),
            users: DashMap::new(),
            merchants: DashMap::new(),
            accounts: DashMap::new(),
            total_updates: AtomicU64::new(0),
        }
    }

    // ── Reads — zero state on miss ───────────────────────────────────────────

    pub fn get_card(&self, cc_num: &str) -> CardState {
        self.cards
            .get(cc_num)
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn get_user(&self, user_id: &str) -> UserState {
        self.users
            .get(user_id)
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn get_merchant(&self, merchant: &str) -> MerchantState {
        self.merchants
            .get(merchant)
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn get_account(&self, acct_num: &str) -> AccountState {
        self.accounts
            .get(acct_num)
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// All four snapshots a feature computation needs, read up front.
    pub fn snapshot_for(&self, txn: &Transaction) -> EntitySnapshots {
        EntitySnapshots {
            card: self.get_card(&txn.cc_num),
            user: self.get_user(&txn.user_id),
            merchant: self.get_merchant(&txn.merchant),
            account: self.get_account(&txn.acct_num),
        }
    }

    // ── Update protocol ──────────────────────────────────────────────────────

    /// Apply the transaction's effect to every referenced entity.
    /// Must be called strictly after the transaction's feature vector has
    /// been computed from a snapshot.
    pub fn apply_transaction(&self, txn: &Transaction) {
        self.cards
            .entry(txn.cc_num.clone())
            .or_default()
            .observe(txn);
        self.users
            .entry(txn.user_id.clone())
            .or_default()
            .observe(txn);
        self.merchants
            .entry(txn.merchant.clone())
            .or_default()
            .observe(txn);
        self.accounts
            .entry(txn.acct_num.clone())
            .or_default()
            .observe(txn);
        self.total_updates.fetch_add(1, Ordering::Relaxed);
    }

    // ── Counters ─────────────────────────────────────────────────────────────

    pub fn n_cards(&self) -> usize {
        self.cards.len()
    }

    pub fn n_users(&self) -> usize {
        self.users.len()
    }

    pub fn n_merchants(&self) -> usize {
        self.merchants.len()
    }

    pub fn n_accounts(&self) -> usize {
        self.accounts.len()
    }

    // ── Checkpoint access ────────────────────────────────────────────────────
    // Iteration snapshots for the checkpoint writer, and bulk restore.

    pub fn export_cards(&self) -> Vec<(String, CardState)> {
        self.cards
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn export_users(&self) -> Vec<(String, UserState)> {
        self.users
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn export_merchants(&self) -> Vec<(String, MerchantState)> {
        self.merchants
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn export_accounts(&self) -> Vec<(String, AccountState)> {
        self.accounts
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn restore_card(&self, key: String, state: CardState) {
        self.cards.insert(key, state);
    }

    pub fn restore_user(&self, key: String, state: UserState) {
        self.users.insert(key, state);
    }

    pub fn restore_merchant(&self, key: String, state: MerchantState) {
        self.merchants.insert(key, state);
    }

    pub fn restore_account(&self, key: String, state: AccountState) {
        self.accounts.insert(key, state);
    }
}

impl Default for EntityStateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned pre-update snapshots of every entity a transaction references.
#[derive(Debug, Clone)]
pub struct EntitySnapshots {
    pub card: CardState,
    pub user: UserState,
    pub merchant: MerchantState,
    pub account: AccountState,
}
