//! Entity State Store: zero-state reads, update round-trips, and the
//! lost-update guarantee under concurrent same-key writes.

use std::sync::Arc;

use fraudwatch::events::Transaction;
use fraudwatch::state::store::EntityStateStore;

fn txn(cc: &str, user: &str, amt: f64, unix_time: i64) -> Transaction {
    Transaction {
        trans_num: format!("t-{cc}-{unix_time}"),
        cc_num: cc.to_string(),
        user_id: user.to_string(),
        acct_num: format!("acct-{user}"),
        merchant: "fraud_Acme".to_string(),
        amt,
        category: "grocery_pos".to_string(),
        lat: None,
        lon: None,
        merch_lat: None,
        merch_long: None,
        city: None,
        state: Some("CA".to_string()),
        unix_time,
    }
}

/// `get` on a never-seen key returns the documented zero state, repeatedly,
/// with no side effects.
#[test]
fn zero_state_is_deterministic_and_side_effect_free() {
    let store = EntityStateStore::new();

    for _ in 0..3 {
        let card = store.get_card("ghost");
        assert_eq!(card.txn_count, 0);
        assert_eq!(card.last_seen, 0);
        assert_eq!(card.total_amount, 0.0);
        assert!(card.window_1hr.is_empty());

        let user = store.get_user("ghost");
        assert_eq!(user.txn_count, 0);
        assert_eq!(user.max_amount, 0.0);
        assert!(user.last_amounts.is_empty());
        assert!(user.last_region.is_none());

        assert!(store.get_merchant("ghost").cards_seen.is_empty());
        assert!(store.get_account("ghost").cards.is_empty());
    }

    // Reads must not create records.
    assert_eq!(store.n_cards(), 0);
    assert_eq!(store.n_users(), 0);
    assert_eq!(store.n_merchants(), 0);
    assert_eq!(store.n_accounts(), 0);
}

/// Applying one transaction and reading the key back reflects exactly the
/// documented deltas.
#[test]
fn apply_then_get_round_trip() {
    let store = EntityStateStore::new();
    let t = txn("card-1", "user-1", 42.5, 1_700_000_000);
    store.apply_transaction(&t);

    let card = store.get_card("card-1");
    assert_eq!(card.txn_count, 1);
    assert_eq!(card.last_seen, 1_700_000_000);
    assert_eq!(card.total_amount, 42.5);
    assert_eq!(card.avg_amount(), 42.5);
    // The window holds the applied timestamp: visible to a later event...
    assert_eq!(card.window_15min.count_before(1_700_000_001), 1);
    // ...but never to one at the same instant.
    assert_eq!(card.window_15min.count_before(1_700_000_000), 0);

    let user = store.get_user("user-1");
    assert_eq!(user.txn_count, 1);
    assert_eq!(user.max_amount, 42.5);
    assert_eq!(user.avg_amount(), 42.5);
    assert_eq!(user.last_amounts.len(), 1);
    assert_eq!(user.merchant_visit_count("fraud_Acme"), 1);
    assert_eq!(user.last_region.as_deref(), Some("CA"));
    assert_eq!(user.category_avg("grocery_pos"), Some(42.5));

    let merchant = store.get_merchant("fraud_Acme");
    assert_eq!(merchant.txn_count, 1);
    assert!(merchant.cards_seen.contains("card-1"));

    assert!(store.get_account("acct-user-1").cards.contains("card-1"));
}

/// Running average recomputes correctly across several updates.
#[test]
fn running_average_tracks_all_updates() {
    let store = EntityStateStore::new();
    for (i, amt) in [10.0, 20.0, 60.0].into_iter().enumerate() {
        store.apply_transaction(&txn("card-a", "user-a", amt, 1_700_000_000 + i as i64));
    }
    let card = store.get_card("card-a");
    assert_eq!(card.txn_count, 3);
    assert!((card.avg_amount() - 30.0).abs() < 1e-9);

    let user = store.get_user("user-a");
    assert_eq!(user.max_amount, 60.0);
    assert_eq!(user.last_amounts.len(), 3);
}

/// The user's bounded amount list retains only the trailing five.
#[test]
fn last_amounts_bounded_to_five() {
    let store = EntityStateStore::new();
    for i in 0..8 {
        store.apply_transaction(&txn("card-b", "user-b", i as f64, 1_700_000_000 + i));
    }
    let user = store.get_user("user-b");
    assert_eq!(user.last_amounts.len(), 5);
    // Oldest retained is amount 3.0 (amounts 0..=2 trimmed).
    assert_eq!(user.last_amounts.front().copied(), Some(3.0));
    assert_eq!(user.last_amounts.back().copied(), Some(7.0));
}

/// N concurrent updates to the same card must produce a final count of
/// exactly N — the read-modify-write race the store exists to prevent.
#[test]
fn concurrent_same_card_updates_lose_nothing() {
    for n in [10usize, 100, 1000] {
        let store = Arc::new(EntityStateStore::new());
        let mut handles = Vec::with_capacity(n);
        for i in 0..n {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store.apply_transaction(&txn("hot-card", "hot-user", 1.0, 1_700_000_000 + i as i64));
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let card = store.get_card("hot-card");
        assert_eq!(card.txn_count as usize, n, "lost updates at n={n}");
        assert_eq!(store.get_user("hot-user").txn_count as usize, n);
        assert_eq!(store.get_merchant("fraud_Acme").txn_count as usize, n);
    }
}

/// Updates to distinct keys are independent.
#[test]
fn cross_key_updates_are_independent() {
    let store = EntityStateStore::new();
    store.apply_transaction(&txn("card-x", "user-x", 5.0, 1_700_000_000));
    store.apply_transaction(&txn("card-y", "user-y", 7.0, 1_700_000_000));

    assert_eq!(store.get_card("card-x").txn_count, 1);
    assert_eq!(store.get_card("card-y").txn_count, 1);
    assert_eq!(store.n_cards(), 2);
}

/// Window retention caps bound memory per card no matter the rate.
#[test]
fn windows_trim_to_retention_cap() {
    let store = EntityStateStore::new();
    // 300 transactions inside one 15-minute span (cap is 100).
    for i in 0..300 {
        store.apply_transaction(&txn("burst-card", "burst-user", 1.0, 1_700_000_000 + i / 2));
    }
    let card = store.get_card("burst-card");
    assert!(card.window_15min.len() <= 100);
    assert!(card.window_1hr.len() <= 100);
    assert!(card.window_24hr.len() <= 200);
    assert_eq!(card.txn_count, 300);
}
