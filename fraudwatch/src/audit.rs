// fraudwatch/src/audit.rs
//
// Append-only audit persistence: one JSONL line per decided transaction,
// for offline analysis and replay.
//
// Writes go through a bounded channel to a single writer task, so worker
// lines never interleave mid-record and a slow disk never stalls the
// decision path. Write failures are logged and dropped — auditing is never
// fatal to a decision already made.

use std::path::PathBuf;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::warn;

use crate::events::AuditRecord;

const QUEUE_CAP: usize = 1024;

#[derive(Clone)]
pub struct AuditLog {
    tx: mpsc::Sender<AuditRecord>,
}

impl AuditLog {
    /// Spawn the writer task. The returned handle is cheap to clone into
    /// every worker; dropping all handles ends the writer.
    pub fn spawn(path: impl Into<PathBuf>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAP);
        tokio::spawn(writer_loop(path.into(), rx));
        Self { tx }
    }

    /// Enqueue one record. Full queue drops the record with a warning —
    /// auditing is best-effort behind the decision path.
    pub fn record(&self, record: AuditRecord) {
        if let Err(e) = self.tx.try_send(record) {
            warn!("audit queue full, dropping record: {e}");
        }
    }
}

async fn writer_loop(path: PathBuf, mut rx: mpsc::Receiver<AuditRecord>) {
    while let Some(record) = rx.recv().await {
        let line = record.to_jsonl() + "\n";
        let res = async {
            let mut f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            f.write_all(line.as_bytes()).await
        }
        .await;
        if let Err(e) = res {
            warn!("audit write failed ({}): {e}", path.display());
        }
    }
}
