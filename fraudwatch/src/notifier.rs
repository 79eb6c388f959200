// fraudwatch/src/notifier.rs
//
// Best-effort flag notifier.
//
// Carries {trans_num, flag_value} to the outbound endpoint. Isolated from
// the decision path: a bounded queue feeds a single worker that POSTs with a
// short timeout. Timeouts are swallowed, other errors are logged and never
// retried past the current attempt. A full queue drops the notification.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::FlagRequest;

const QUEUE_CAP: usize = 512;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<FlagRequest>,
}

impl Notifier {
    /// Spawn the outbound worker. `api_key` rides the X-API-Key header on
    /// every call, matching the feed's auth scheme.
    pub fn spawn(flag_url: String, api_key: String) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAP);
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        tokio::spawn(worker_loop(client, flag_url, api_key, rx));
        Self { tx }
    }

    /// Fire-and-forget dispatch. Never blocks the caller.
    pub fn notify(&self, flag: FlagRequest) {
        if self.tx.try_send(flag).is_err() {
            warn!("notifier queue full, dropping flag");
        }
    }
}

async fn worker_loop(
    client: reqwest::Client,
    flag_url: String,
    api_key: String,
    mut rx: mpsc::Receiver<FlagRequest>,
) {
    while let Some(flag) = rx.recv().await {
        let result = client
            .post(&flag_url)
            .header("X-API-Key", &api_key)
            .json(&flag)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!("flagged {} value={}", flag.trans_num, flag.flag_value);
            }
            Ok(resp) => {
                warn!("flag endpoint returned {} for {}", resp.status(), flag.trans_num);
            }
            Err(e) if e.is_timeout() => {
                debug!("flag call timed out for {}", flag.trans_num);
            }
            Err(e) => {
                warn!("flag call failed for {}: {e}", flag.trans_num);
            }
        }
    }
}
