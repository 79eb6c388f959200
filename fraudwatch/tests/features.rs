//! Feature computation: causality of windowed counts, no-history fallbacks,
//! encoding fallbacks, and the end-to-end scenario vectors.

use fraudwatch::encodings::{EncodingCache, DEFAULT_GLOBAL_FRAUD_MEAN};
use fraudwatch::events::Transaction;
use fraudwatch::features::{self, FALLBACK_DISTANCE_KM, NO_HISTORY_SECS};
use fraudwatch::state::store::EntityStateStore;

const T0: i64 = 1_700_000_000;

fn grocery_txn(amt: f64, unix_time: i64) -> Transaction {
    Transaction {
        trans_num: format!("t-{unix_time}"),
        cc_num: "4111-test".to_string(),
        user_id: "user-77".to_string(),
        acct_num: "acct-77".to_string(),
        merchant: "fraud_Corner Grocer".to_string(),
        amt,
        category: "grocery".to_string(),
        lat: None,
        lon: None,
        merch_lat: None,
        merch_long: None,
        city: Some("Sacramento".to_string()),
        state: Some("CA".to_string()),
        unix_time,
    }
}

fn compute(store: &EntityStateStore, enc: &EncodingCache, txn: &Transaction) -> features::FeatureVector {
    features::compute(txn, &store.snapshot_for(txn), enc)
}

/// A card with one prior transaction at t0 scoring a new one at t0+1 must
/// see a velocity count of 1 — never 2. The current transaction's own
/// timestamp can never leak into its own vector.
#[test]
fn window_counts_exclude_the_scored_transaction() {
    let store = EntityStateStore::new();
    let enc = EncodingCache::empty();

    store.apply_transaction(&grocery_txn(20.0, T0));

    let next = grocery_txn(30.0, T0 + 1);
    let v = compute(&store, &enc, &next);

    assert_eq!(v.get("velocity_15min_card"), Some(1.0));
    assert_eq!(v.get("velocity_1h_card"), Some(1.0));
    assert_eq!(v.get("velocity_24h_card"), Some(1.0));

    // Same-instant arrival: the prior event at exactly t0 is not "before".
    let same_instant = grocery_txn(30.0, T0);
    let v = compute(&store, &enc, &same_instant);
    assert_eq!(v.get("velocity_15min_card"), Some(0.0));
}

/// End-to-end scenario: a card with no history submits $50 at "grocery".
#[test]
fn no_history_vector_uses_documented_fallbacks() {
    let store = EntityStateStore::new();
    let enc = EncodingCache::empty();

    let txn = grocery_txn(50.0, T0);
    let v = compute(&store, &enc, &txn);

    assert_eq!(v.get("time_since_last_card_trans"), Some(NO_HISTORY_SECS));
    assert_eq!(v.get("time_since_last_user_trans"), Some(NO_HISTORY_SECS));
    assert_eq!(v.get("velocity_1h_card"), Some(0.0));
    assert_eq!(v.get("amt_vs_user_avg_ratio"), Some(1.0));
    assert_eq!(v.get("amt_vs_card_avg_ratio"), Some(1.0));
    assert_eq!(v.get("amt_vs_merchant_avg_ratio"), Some(1.0));
    assert_eq!(v.get("amt_vs_user_category_avg"), Some(1.0));
    assert_eq!(v.get("is_new_merchant_for_user"), Some(1.0));
    assert_eq!(v.get("is_over_user_max_amt"), Some(0.0));
    assert_eq!(v.get("user_trans_count"), Some(0.0));
    assert_eq!(v.get("user_avg_amt_so_far"), Some(50.0));
    assert_eq!(v.get("user_max_amt_so_far"), Some(50.0));
    assert_eq!(v.get("user_avg_amt_last_5_trans"), Some(50.0));
    // No prior region on file — counts as a region change.
    assert_eq!(v.get("is_new_state"), Some(1.0));
    // Distinct-count features read pre-update state: the current card is
    // not folded in yet, so a never-seen account/merchant counts 0.
    assert_eq!(v.get("cards_per_account"), Some(0.0));
    assert_eq!(v.get("cards_per_merchant"), Some(0.0));
    // Missing coordinates resolve to the distance fallback, not an error.
    assert_eq!(v.get("distance_km"), Some(FALLBACK_DISTANCE_KM));
    // Whole-dollar amount.
    assert_eq!(v.get("is_amt_round_number"), Some(1.0));
}

/// End-to-end scenario: the same card again 10 minutes later.
#[test]
fn second_transaction_ten_minutes_later() {
    let store = EntityStateStore::new();
    let enc = EncodingCache::empty();

    store.apply_transaction(&grocery_txn(50.0, T0));

    let second = grocery_txn(80.0, T0 + 600);
    let v = compute(&store, &enc, &second);

    assert_eq!(v.get("velocity_15min_card"), Some(1.0));
    assert_eq!(v.get("time_since_last_card_trans"), Some(600.0));
    assert_eq!(v.get("time_since_last_user_trans"), Some(600.0));
    assert_eq!(v.get("user_trans_count"), Some(1.0));
    // History now: avg = 50, so 80 / 50.
    assert_eq!(v.get("amt_vs_user_avg_ratio"), Some(1.6));
    assert_eq!(v.get("is_over_user_max_amt"), Some(1.0));
    assert_eq!(v.get("is_new_merchant_for_user"), Some(0.0));
    // Same region as last time.
    assert_eq!(v.get("is_new_state"), Some(0.0));
    // The first transaction's card is on file now.
    assert_eq!(v.get("cards_per_account"), Some(1.0));
    assert_eq!(v.get("cards_per_merchant"), Some(1.0));
}

/// A 16-minute-old entry leaves the 15-minute window but stays in the wider
/// horizons.
#[test]
fn velocity_windows_age_out_independently() {
    let store = EntityStateStore::new();
    let enc = EncodingCache::empty();

    store.apply_transaction(&grocery_txn(10.0, T0));

    let later = grocery_txn(10.0, T0 + 16 * 60);
    let v = compute(&store, &enc, &later);
    assert_eq!(v.get("velocity_15min_card"), Some(0.0));
    assert_eq!(v.get("velocity_1h_card"), Some(1.0));
    assert_eq!(v.get("velocity_24h_card"), Some(1.0));
}

/// Encoding lookups: a seen value returns its trained rate; an unseen value
/// returns exactly the global mean, never zero and never an error.
#[test]
fn encoding_fallback_is_exact() {
    let enc = EncodingCache::empty();
    enc.insert("merchant", "fraud_Corner Grocer", 0.0417);

    assert_eq!(enc.encode("merchant", "fraud_Corner Grocer"), 0.0417);
    assert_eq!(
        enc.encode("merchant", "never seen this one"),
        DEFAULT_GLOBAL_FRAUD_MEAN
    );
    assert_eq!(enc.encode("city", "Atlantis"), DEFAULT_GLOBAL_FRAUD_MEAN);

    let store = EntityStateStore::new();
    let v = compute(&store, &enc, &grocery_txn(12.5, T0));
    assert_eq!(v.get("merchant_encoded"), Some(0.0417));
    assert_eq!(v.get("category_encoded"), Some(DEFAULT_GLOBAL_FRAUD_MEAN));
}

/// Region changes flip the indicator; a missing region counts as new.
#[test]
fn region_change_indicator() {
    let store = EntityStateStore::new();
    let enc = EncodingCache::empty();

    store.apply_transaction(&grocery_txn(10.0, T0));

    let mut moved = grocery_txn(10.0, T0 + 60);
    moved.state = Some("NV".to_string());
    assert_eq!(compute(&store, &enc, &moved).get("is_new_state"), Some(1.0));

    let mut unknown = grocery_txn(10.0, T0 + 60);
    unknown.state = None;
    assert_eq!(compute(&store, &enc, &unknown).get("is_new_state"), Some(1.0));
}

/// Real coordinates produce a real great-circle distance.
#[test]
fn distance_from_real_coordinates() {
    let store = EntityStateStore::new();
    let enc = EncodingCache::empty();

    let mut txn = grocery_txn(10.0, T0);
    txn.lat = Some(38.58);
    txn.lon = Some(-121.49);
    txn.merch_lat = Some(38.58);
    txn.merch_long = Some(-121.49);
    let v = compute(&store, &enc, &txn);
    assert_eq!(v.get("distance_km"), Some(0.0));

    // Out-of-range latitude falls back rather than erroring.
    txn.merch_lat = Some(123.0);
    let v = compute(&store, &enc, &txn);
    assert_eq!(v.get("distance_km"), Some(FALLBACK_DISTANCE_KM));
}

/// Non-whole amounts are not round numbers.
#[test]
fn round_number_indicator() {
    let store = EntityStateStore::new();
    let enc = EncodingCache::empty();

    let v = compute(&store, &enc, &grocery_txn(49.99, T0));
    assert_eq!(v.get("is_amt_round_number"), Some(0.0));
}

/// Category averages are tracked per category; a ratio against a different
/// category's history falls back to 1.0.
#[test]
fn category_average_is_per_category() {
    let store = EntityStateStore::new();
    let enc = EncodingCache::empty();

    store.apply_transaction(&grocery_txn(40.0, T0));

    // Same category: ratio against the 40.0 average.
    let same = grocery_txn(80.0, T0 + 60);
    assert_eq!(
        compute(&store, &enc, &same).get("amt_vs_user_category_avg"),
        Some(2.0)
    );

    // Different category: no history there yet.
    let mut other = grocery_txn(80.0, T0 + 60);
    other.category = "travel".to_string();
    assert_eq!(
        compute(&store, &enc, &other).get("amt_vs_user_category_avg"),
        Some(1.0)
    );
}
