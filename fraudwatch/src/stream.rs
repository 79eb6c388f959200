// fraudwatch/src/stream.rs
//
// Live feed ingestion — a long-lived SSE connection to the transaction
// stream, with resilient reconnection.
//
// Connection state machine:
//
//   Disconnected → Connecting → Streaming
//        ↑                          │ (connection failure / read stall)
//        └────── Reconnecting ←─────┘
//
// Reconnects back off exponentially: seeded small, doubled per consecutive
// failure, capped, reset to the seed after any successful connect. After a
// bounded number of consecutive failures the loop surfaces a fatal error to
// the supervisor instead of spinning forever.
//
// Parsed transactions are sent into a bounded channel; a full channel blocks
// the HTTP read, so backpressure reaches the feed instead of growing a queue.
// Malformed payloads are dropped and logged — they never tear the
// connection down.

use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::events::Transaction;
use crate::health::HealthState;

/// A chunk gap longer than this counts as a dead connection.
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("feed reconnect attempts exhausted after {attempts} consecutive failures")]
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Streaming,
    Reconnecting,
}

impl std::fmt::Display for ConnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Streaming => write!(f, "streaming"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

// ── Backoff ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub seed: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            seed: Duration::from_secs(1),
            cap: Duration::from_secs(60),
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (0-based): seed doubled per
    /// attempt, capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(31);
        self.seed
            .saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX))
            .min(self.cap)
    }
}

// ── SSE frame parsing ─────────────────────────────────────────────────────────

/// Accumulates raw bytes and yields complete SSE `data:` payloads.
/// Frames are blank-line delimited; multiple `data:` lines within one frame
/// join with newlines; comment and non-data fields are ignored.
#[derive(Debug, Default)]
pub struct SseFrameBuffer {
    buf: String,
}

impl SseFrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the data payloads of every frame completed
    /// by it. Partial frames stay buffered for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
        // Normalize CRLF once the pair is fully buffered; a \r split off at
        // a chunk boundary is completed by the next push.
        if self.buf.contains('\r') {
            self.buf = self.buf.replace("\r\n", "\n");
        }

        let mut payloads = Vec::new();
        while let Some(pos) = self.buf.find("\n\n") {
            let frame: String = self.buf.drain(..pos + 2).collect();
            if let Some(data) = Self::frame_data(&frame) {
                payloads.push(data);
            }
        }
        payloads
    }

    fn frame_data(frame: &str) -> Option<String> {
        let mut data_lines = Vec::new();
        for line in frame.lines() {
            if let Some(rest) = line.strip_prefix("data:") {
                data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
            }
        }
        if data_lines.is_empty() {
            None
        } else {
            Some(data_lines.join("\n"))
        }
    }
}

// ── Ingestor ──────────────────────────────────────────────────────────────────

pub struct StreamIngestor {
    stream_url: String,
    api_key: String,
    backoff: BackoffPolicy,
    client: reqwest::Client,
    health: std::sync::Arc<HealthState>,
    state: parking_lot::Mutex<ConnState>,
}

impl StreamIngestor {
    pub fn new(
        stream_url: String,
        api_key: String,
        backoff: BackoffPolicy,
        health: std::sync::Arc<HealthState>,
    ) -> Self {
        // No total-request timeout — the stream is long-lived. Liveness
        // comes from the per-chunk idle timeout in stream_once.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            stream_url,
            api_key,
            backoff,
            client,
            health,
            state: parking_lot::Mutex::new(ConnState::Disconnected),
        }
    }

    /// Current connection state, for health/readiness surfaces.
    pub fn state(&self) -> ConnState {
        *self.state.lock()
    }

    fn set_state(&self, next: ConnState) {
        *self.state.lock() = next;
        self.health.set_feed_connected(next == ConnState::Streaming);
    }

    /// Connect-read-reconnect until shutdown or attempt exhaustion.
    /// Every parsed transaction goes out through `tx`; a closed receiver
    /// ends the loop cleanly.
    pub async fn run(
        &self,
        tx: mpsc::Sender<Transaction>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), IngestError> {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                self.set_state(ConnState::Disconnected);
                return Ok(());
            }

            self.set_state(ConnState::Connecting);
            info!(url = %self.stream_url, "connecting to transaction feed");

            match self.stream_once(&tx, &mut shutdown, &mut attempt).await {
                StreamOutcome::Shutdown | StreamOutcome::ReceiverGone => {
                    self.set_state(ConnState::Disconnected);
                    return Ok(());
                }
                StreamOutcome::ConnectionLost(reason) => {
                    self.set_state(ConnState::Reconnecting);
                    self.health.record_reconnect();

                    attempt += 1;
                    if attempt >= self.backoff.max_attempts {
                        self.set_state(ConnState::Disconnected);
                        return Err(IngestError::Exhausted { attempts: attempt });
                    }
                    let delay = self.backoff.delay(attempt - 1);
                    warn!(
                        attempt,
                        delay_secs = delay.as_secs(),
                        "feed connection lost ({reason}), backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => {
                            self.set_state(ConnState::Disconnected);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// One connection lifetime. Resets the backoff counter once streaming.
    async fn stream_once(
        &self,
        tx: &mpsc::Sender<Transaction>,
        shutdown: &mut watch::Receiver<bool>,
        attempt: &mut u32,
    ) -> StreamOutcome {
        let response = match self
            .client
            .get(&self.stream_url)
            .header("X-API-Key", &self.api_key)
            .header("Accept", "text/event-stream")
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return StreamOutcome::ConnectionLost(format!("connect: {e}")),
        };
        if !response.status().is_success() {
            return StreamOutcome::ConnectionLost(format!("status {}", response.status()));
        }

        // Connected — a successful connect resets the backoff schedule.
        *attempt = 0;
        self.set_state(ConnState::Streaming);
        info!("feed streaming");

        let mut chunks = response.bytes_stream();
        let mut frames = SseFrameBuffer::new();

        loop {
            let next = tokio::select! {
                c = tokio::time::timeout(IDLE_TIMEOUT, chunks.next()) => c,
                _ = shutdown.changed() => return StreamOutcome::Shutdown,
            };

            let chunk = match next {
                Err(_) => return StreamOutcome::ConnectionLost("read timeout".into()),
                Ok(None) => return StreamOutcome::ConnectionLost("stream closed".into()),
                Ok(Some(Err(e))) => return StreamOutcome::ConnectionLost(format!("read: {e}")),
                Ok(Some(Ok(bytes))) => bytes,
            };

            for payload in frames.push(&chunk) {
                match serde_json::from_str::<Transaction>(&payload) {
                    Ok(txn) => {
                        // Blocks when downstream is full, so the feed is
                        // never read faster than workers can absorb.
                        if tx.send(txn).await.is_err() {
                            return StreamOutcome::ReceiverGone;
                        }
                    }
                    Err(e) => {
                        self.health.record_dropped();
                        warn!("dropping malformed event: {e}");
                    }
                }
            }
        }
    }
}

enum StreamOutcome {
    ConnectionLost(String),
    Shutdown,
    ReceiverGone,
}
