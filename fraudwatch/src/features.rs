// fraudwatch/src/features.rs
//
// Feature computation — pure function of (transaction, entity snapshots,
// encoding cache). No I/O, no mutation; independently testable against
// fixed fixtures.
//
// The field order and every fallback value here are frozen against the
// offline training definitions. The loaded scoring artifact declares its own
// feature order and is validated against FIELD_NAMES at startup; changing
// either side alone silently degrades accuracy, so a mismatch disables
// scoring instead.
//
// Causality: all aggregates come from pre-update snapshots, and window counts
// admit only timestamps strictly before the transaction being scored.

use chrono::{Datelike, Timelike};

use crate::encodings::EncodingCache;
use crate::events::Transaction;
use crate::state::store::EntitySnapshots;

/// Recency sentinel when an entity has no prior transaction: 30 days.
pub const NO_HISTORY_SECS: f64 = 30.0 * 24.0 * 60.0 * 60.0;

/// Ratio divisors are clipped here before dividing.
const RATIO_DIVISOR_FLOOR: f64 = 0.01;

/// Non-finite ratio results collapse to this sentinel.
const NON_FINITE_SENTINEL: f64 = 999_999.0;

/// Great-circle distance fallback (km) when coordinates are missing or out
/// of range. Matches the training run's median fill; documented alongside
/// the artifact's feature order.
pub const FALLBACK_DISTANCE_KM: f64 = 78.0;

const EARTH_RADIUS_KM: f64 = 6371.0;

pub const NUM_FEATURES: usize = 29;

/// Frozen feature contract — the exact order the scoring artifact was fit on.
pub const FIELD_NAMES: [&str; NUM_FEATURES] = [
    "amt",
    "hour_of_day",
    "day_of_week",
    "is_amt_round_number",
    "distance_km",
    "velocity_15min_card",
    "velocity_1h_card",
    "velocity_24h_card",
    "time_since_last_card_trans",
    "amt_vs_card_avg_ratio",
    "cards_per_account",
    "cards_per_merchant",
    "time_since_last_user_trans",
    "user_trans_count",
    "user_avg_amt_so_far",
    "user_max_amt_so_far",
    "amt_vs_user_avg_ratio",
    "is_over_user_max_amt",
    "user_avg_amt_last_5_trans",
    "is_new_merchant_for_user",
    "amt_vs_user_category_avg",
    "is_new_state",
    "amt_vs_merchant_avg_ratio",
    "merchant_encoded",
    "category_encoded",
    "city_encoded",
    "state_encoded",
    "acct_num_encoded",
    "user_id_encoded",
];

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub values: [f64; NUM_FEATURES],
}

impl FeatureVector {
    /// Named lookup, mostly for tests and debug output.
    pub fn get(&self, name: &str) -> Option<f64> {
        FIELD_NAMES
            .iter()
            .position(|&n| n == name)
            .map(|i| self.values[i])
    }
}

/// Compute the full vector for one transaction from pre-update snapshots.
pub fn compute(txn: &Transaction, snap: &EntitySnapshots, enc: &EncodingCache) -> FeatureVector {
    let now = txn.unix_time;
    let amt = txn.amt;

    // Calendar features, UTC.
    let (hour, dow) = match chrono::DateTime::from_timestamp(now, 0) {
        Some(dt) => (
            dt.hour() as f64,
            dt.weekday().num_days_from_monday() as f64,
        ),
        None => (0.0, 0.0),
    };

    let is_round = if amt > 0.0 && (amt % 1.0).abs() < 1e-9 {
        1.0
    } else {
        0.0
    };

    let distance = haversine_km(txn.lat, txn.lon, txn.merch_lat, txn.merch_long)
        .unwrap_or(FALLBACK_DISTANCE_KM);

    // Card velocity — windows pruned to strictly-prior timestamps.
    let v15 = snap.card.window_15min.count_before(now) as f64;
    let v1h = snap.card.window_1hr.count_before(now) as f64;
    let v24 = snap.card.window_24hr.count_before(now) as f64;

    let t_card = recency(snap.card.last_seen, now);
    let card_ratio = ratio_vs_avg(amt, snap.card.txn_count, snap.card.avg_amount());

    // Pre-update distinct counts: a never-seen account or merchant reads 0 —
    // the current transaction's card has not been folded in yet.
    let cards_acct = snap.account.cards.len() as f64;
    let cards_merch = snap.merchant.cards_seen.len() as f64;

    let t_user = recency(snap.user.last_seen, now);
    let u_count = snap.user.txn_count as f64;

    // No-history fallback for the running user aggregates is the current
    // amount, which pins the derived ratio/indicator features to their
    // trained no-history values (ratio 1.0, over-max 0).
    let (u_avg, u_max) = if snap.user.txn_count == 0 {
        (amt, amt)
    } else {
        (snap.user.avg_amount(), snap.user.max_amount)
    };
    let u_ratio = ratio_vs_avg(amt, snap.user.txn_count, snap.user.avg_amount());
    let over_max = if amt > u_max { 1.0 } else { 0.0 };
    let u_last5 = snap.user.avg_last_amounts().unwrap_or(amt);

    let new_merchant = if snap.user.merchant_visit_count(&txn.merchant) == 0 {
        1.0
    } else {
        0.0
    };

    let cat_ratio = match snap.user.category_avg(&txn.category) {
        Some(avg) => clipped_ratio(amt, avg),
        None => 1.0,
    };

    // Unknown on either side counts as a region change.
    let new_state = match (txn.region(), snap.user.last_region.as_deref()) {
        (Some(cur), Some(last)) if cur == last => 0.0,
        _ => 1.0,
    };

    let merch_ratio = ratio_vs_avg(amt, snap.merchant.txn_count, snap.merchant.avg_amount());

    let city = txn.city.as_deref().unwrap_or("");
    let state = txn.state.as_deref().unwrap_or("");

    FeatureVector {
        values: [
            amt,
            hour,
            dow,
            is_round,
            distance,
            v15,
            v1h,
            v24,
            t_card,
            card_ratio,
            cards_acct,
            cards_merch,
            t_user,
            u_count,
            u_avg,
            u_max,
            u_ratio,
            over_max,
            u_last5,
            new_merchant,
            cat_ratio,
            new_state,
            merch_ratio,
            enc.encode("merchant", &txn.merchant),
            enc.encode("category", &txn.category),
            enc.encode("city", city),
            enc.encode("state", state),
            enc.encode("acct_num", &txn.acct_num),
            enc.encode("user_id", &txn.user_id),
        ],
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Seconds since the entity's last transaction; the 30-day sentinel when it
/// has none. Clamped at zero for same-second races.
fn recency(last_seen: i64, now: i64) -> f64 {
    if last_seen > 0 {
        ((now - last_seen) as f64).max(0.0)
    } else {
        NO_HISTORY_SECS
    }
}

/// amt / running-average with the training clipping policy:
/// no history → 1.0; divisor floored at 0.01; non-finite → sentinel.
fn ratio_vs_avg(amt: f64, count: u64, avg: f64) -> f64 {
    if count == 0 {
        1.0
    } else {
        clipped_ratio(amt, avg)
    }
}

fn clipped_ratio(amt: f64, divisor: f64) -> f64 {
    let r = amt / divisor.max(RATIO_DIVISOR_FLOOR);
    if r.is_finite() {
        r
    } else {
        NON_FINITE_SENTINEL
    }
}

/// Great-circle distance. None when any coordinate is missing or outside
/// valid latitude/longitude range — callers substitute the fallback.
fn haversine_km(
    lat1: Option<f64>,
    lon1: Option<f64>,
    lat2: Option<f64>,
    lon2: Option<f64>,
) -> Option<f64> {
    let (lat1, lon1, lat2, lon2) = (lat1?, lon1?, lat2?, lon2?);
    if !coord_valid(lat1, lon1) || !coord_valid(lat2, lon2) {
        return None;
    }
    let (rlat1, rlat2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + rlat1.cos() * rlat2.cos() * (dlon / 2.0).sin().powi(2);
    let a = a.clamp(0.0, 1.0);
    Some(2.0 * a.sqrt().asin() * EARTH_RADIUS_KM)
}

fn coord_valid(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_known_pair() {
        // JFK → LAX, great-circle ≈ 3974 km
        let d = haversine_km(
            Some(40.6413),
            Some(-73.7781),
            Some(33.9416),
            Some(-118.4085),
        )
        .unwrap();
        assert!((d - 3974.0).abs() < 15.0, "got {d}");
    }

    #[test]
    fn haversine_rejects_bad_coords() {
        assert!(haversine_km(Some(91.0), Some(0.0), Some(0.0), Some(0.0)).is_none());
        assert!(haversine_km(None, Some(0.0), Some(0.0), Some(0.0)).is_none());
        assert!(haversine_km(Some(0.0), Some(181.0), Some(0.0), Some(0.0)).is_none());
    }

    #[test]
    fn ratio_clipping_policy() {
        // near-zero divisor clips to 0.01 rather than exploding
        assert_eq!(clipped_ratio(1.0, 0.0), 100.0);
        assert_eq!(ratio_vs_avg(50.0, 0, 0.0), 1.0);
        assert_eq!(clipped_ratio(f64::INFINITY, 1.0), NON_FINITE_SENTINEL);
    }

    #[test]
    fn field_names_match_vector_len() {
        assert_eq!(FIELD_NAMES.len(), NUM_FEATURES);
    }
}
