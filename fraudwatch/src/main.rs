// fraudwatch/src/main.rs
//
// Fraudwatch — real-time stateful fraud decisioning.
//
// Wiring order matters and is explicit: encoding cache and scoring artifact
// load first (both degrade rather than fail), then the entity state store is
// restored from its last checkpoint, then the outbound side channels spawn,
// and only then does an event source start feeding the worker pool.
//
// Usage:
//   fraudwatch --mode stream --stream-url https://feed.example/stream
//   fraudwatch --mode tail --path /var/log/txn/feed.jsonl
//   fraudwatch --mode replay --path captured.jsonl --speed 10.0

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fraudwatch::audit::AuditLog;
use fraudwatch::config::{Cli, Mode};
use fraudwatch::encodings::EncodingCache;
use fraudwatch::events::Transaction;
use fraudwatch::health::HealthState;
use fraudwatch::model::ScoringModel;
use fraudwatch::notifier::Notifier;
use fraudwatch::pipeline::Pipeline;
use fraudwatch::state::checkpoint::Checkpointer;
use fraudwatch::state::store::EntityStateStore;
use fraudwatch::stream::{BackoffPolicy, StreamIngestor};

const EVENT_CHANNEL_CAP: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("fraudwatch=info".parse()?),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    tokio::fs::create_dir_all(&cli.output).await?;

    // ── Construct-and-inject, in initialization order ─────────────────────────
    let encodings = Arc::new(EncodingCache::load(&cli.encodings).await?);
    let scoring = Arc::new(ScoringModel::load(&cli.model).await);
    let store = Arc::new(EntityStateStore::new());
    let health = Arc::new(HealthState::new());

    let checkpointer = Arc::new(Checkpointer::new(
        cli.output.join("state_checkpoint.json"),
        Duration::from_secs(cli.checkpoint_secs),
        Arc::clone(&store),
    ));
    if let Err(e) = checkpointer.restore().await {
        warn!("checkpoint restore failed, starting cold: {e:#}");
    }

    let pipeline = Arc::new(Pipeline {
        store: Arc::clone(&store),
        encodings: Arc::clone(&encodings),
        model: Arc::clone(&scoring),
        notifier: Notifier::spawn(cli.flag_url.clone(), cli.api_key.clone()),
        audit: AuditLog::spawn(cli.output.join("decisions.jsonl")),
        health: Arc::clone(&health),
    });

    info!(
        workers = cli.workers,
        model = scoring.version().unwrap_or("absent"),
        encodings = encodings.n_features(),
        "fraudwatch starting"
    );

    // Encoding refresh is restart-or-reload: SIGHUP swaps the table snapshot
    // without touching anything else.
    #[cfg(unix)]
    {
        let encodings = Arc::clone(&encodings);
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let Ok(mut hup) = signal(SignalKind::hangup()) else {
                return;
            };
            while hup.recv().await.is_some() {
                info!("SIGHUP received — reloading encoding table");
                if let Err(e) = encodings.reload().await {
                    warn!("encoding reload failed: {e:#}");
                }
            }
        });
    }

    // ── Shutdown signal ───────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn({
        let shutdown_tx = shutdown_tx.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received, draining");
                let _ = shutdown_tx.send(true);
            }
        }
    });

    // ── Background loops ──────────────────────────────────────────────────────
    tokio::spawn(Arc::clone(&checkpointer).run(shutdown_rx.clone()));
    tokio::spawn(stats_loop(
        Arc::clone(&store),
        Arc::clone(&health),
        Instant::now(),
    ));

    // ── Event source ──────────────────────────────────────────────────────────
    let (tx, mut rx) = mpsc::channel::<Transaction>(EVENT_CHANNEL_CAP);

    let source: tokio::task::JoinHandle<Result<()>> = match cli.mode {
        Mode::Stream => {
            let ingestor = StreamIngestor::new(
                cli.stream_url.clone(),
                cli.api_key.clone(),
                BackoffPolicy::default(),
                Arc::clone(&health),
            );
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move { Ok(ingestor.run(tx, shutdown).await?) })
        }
        Mode::Tail => {
            info!(path = %cli.path.display(), "tailing transaction log");
            let path = cli.path.clone();
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move { tail_jsonl(path, tx, shutdown).await })
        }
        Mode::Replay => {
            info!(path = %cli.path.display(), speed = cli.speed, "replaying transaction log");
            let path = cli.path.clone();
            let speed = cli.speed;
            tokio::spawn(async move { replay_jsonl(path, tx, speed).await })
        }
    };

    // ── Worker pool ───────────────────────────────────────────────────────────
    // One permit per in-flight transaction; a full pool blocks dispatch, and
    // that backpressure propagates through the bounded channel to the source.
    let worker_count = cli.workers.max(1);
    let workers = Arc::new(Semaphore::new(worker_count));
    let mut shutdown = shutdown_rx.clone();

    loop {
        let txn = tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(t) => t,
                None => break, // source finished or died
            },
            _ = shutdown.changed() => break,
        };

        let permit = match Arc::clone(&workers).acquire_owned().await {
            Ok(p) => p,
            Err(_) => break,
        };
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            pipeline.process(txn);
            drop(permit);
        });
    }

    // Let in-flight transactions finish their state updates before anything
    // is torn down — nothing may end scored-but-not-applied.
    let _ = workers.acquire_many(worker_count as u32).await;

    if let Err(e) = checkpointer.save().await {
        warn!("final checkpoint failed: {e:#}");
    }

    // Surface a fatal source failure (e.g. reconnect exhaustion) to the
    // supervisor via exit status.
    match source.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("event source failed: {e:#}");
            return Err(e);
        }
        Err(e) if e.is_cancelled() => {}
        Err(e) => return Err(e.into()),
    }

    info!("fraudwatch stopped cleanly");
    Ok(())
}

// ── Stats ─────────────────────────────────────────────────────────────────────

async fn stats_loop(store: Arc<EntityStateStore>, health: Arc<HealthState>, start: Instant) {
    loop {
        tokio::time::sleep(Duration::from_secs(30)).await;
        let snap = health.snapshot();
        let elapsed = start.elapsed().as_secs_f64().max(1.0);
        let eps = snap.events_processed as f64 / elapsed;
        info!(
            uptime_s = start.elapsed().as_secs(),
            events = snap.events_processed,
            eps,
            dropped = snap.events_dropped,
            reconnects = snap.reconnects,
            cards = store.n_cards(),
            users = store.n_users(),
            merchants = store.n_merchants(),
            feed_up = snap.feed_connected,
            "stats"
        );
    }
}

// ── File-backed event sources ─────────────────────────────────────────────────

async fn tail_jsonl(
    path: PathBuf,
    tx: mpsc::Sender<Transaction>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let file = tokio::fs::File::open(&path).await?;
    let mut lines = BufReader::new(file).lines();

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }
        match lines.next_line().await? {
            Some(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Transaction>(line) {
                    Ok(txn) => {
                        if tx.send(txn).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(e) => warn!("dropping malformed line: {e}"),
                }
            }
            None => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
}

async fn replay_jsonl(path: PathBuf, tx: mpsc::Sender<Transaction>, speed: f64) -> Result<()> {
    let content = tokio::fs::read_to_string(&path).await?;
    let mut events: Vec<Transaction> = content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            serde_json::from_str::<Transaction>(line).ok()
        })
        .collect();

    if events.is_empty() {
        return Ok(());
    }
    events.sort_by_key(|e| e.unix_time);

    let base_ts = events[0].unix_time;
    let base_wall = Instant::now();
    let speed = if speed > 0.0 { speed } else { 1.0 };

    for event in events {
        let offset = (event.unix_time - base_ts) as f64 / speed;
        let target = base_wall + Duration::from_secs_f64(offset);
        let now = Instant::now();
        if target > now {
            tokio::select! {
                _ = tokio::time::sleep(target - now) => {}
                _ = tx.closed() => return Ok(()),
            }
        }
        if tx.send(event).await.is_err() {
            break;
        }
    }
    Ok(())
}
