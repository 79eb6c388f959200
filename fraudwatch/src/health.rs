// fraudwatch/src/health.rs
//
// Process health state for an outer readiness surface.
//
// Reflects feed-connection state and store reachability, not per-transaction
// errors — a dropped event or a failed flag call never flips health.
// All fields are atomics; `snapshot()` is the read API.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct HealthState {
    feed_connected: AtomicBool,
    last_event_unix: AtomicI64,
    events_processed: AtomicU64,
    events_dropped: AtomicU64,
    reconnects: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_feed_connected(&self, up: bool) {
        self.feed_connected.store(up, Ordering::Relaxed);
    }

    pub fn record_event(&self, unix_time: i64) {
        self.last_event_unix.store(unix_time, Ordering::Relaxed);
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            feed_connected: self.feed_connected.load(Ordering::Relaxed),
            last_event_unix: self.last_event_unix.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HealthSnapshot {
    pub feed_connected: bool,
    pub last_event_unix: i64,
    pub events_processed: u64,
    pub events_dropped: u64,
    pub reconnects: u64,
}

impl HealthSnapshot {
    pub fn ready(&self) -> bool {
        self.feed_connected
    }
}
