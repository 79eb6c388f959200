// fraudwatch/src/config.rs
//
// CLI + environment configuration.
//
// Three operational modes:
//   stream  — live SSE transaction feed (production)
//   tail    — follow a JSONL file of transactions (staging)
//   replay  — replay a captured JSONL file at scaled speed (testing/research)

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name    = "fraudwatch",
    about   = "Real-time stateful fraud decisioning over a streaming transaction feed",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    #[arg(long, value_enum, default_value = "stream")]
    pub mode: Mode,

    #[arg(
        long,
        env = "FW_STREAM_URL",
        default_value = "https://localhost:8443/stream",
        help = "SSE transaction feed endpoint (stream mode)"
    )]
    pub stream_url: String,

    #[arg(
        long,
        env = "FW_FLAG_URL",
        default_value = "https://localhost:8443/api/flag",
        help = "Outbound flag endpoint"
    )]
    pub flag_url: String,

    #[arg(long, env = "FW_API_KEY", default_value = "", hide_env_values = true)]
    pub api_key: String,

    #[arg(long, default_value = "/tmp/fraudwatch_feed.jsonl",
          help = "JSONL transaction path (tail/replay modes)")]
    pub path: PathBuf,

    #[arg(long, default_value = "1.0", help = "Replay speed multiplier")]
    pub speed: f64,

    #[arg(long, default_value = "encodings.ndjson",
          help = "Target-encoding table (NDJSON)")]
    pub encodings: PathBuf,

    #[arg(long, default_value = "model.json", help = "Scoring artifact path")]
    pub model: PathBuf,

    #[arg(long, default_value = "/tmp/fraudwatch_output",
          help = "Output directory (audit log + state checkpoint)")]
    pub output: PathBuf,

    #[arg(long, default_value = "8", help = "Worker pool size")]
    pub workers: usize,

    #[arg(long, default_value = "300", help = "State checkpoint interval, seconds")]
    pub checkpoint_secs: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Mode {
    Stream, // live SSE feed
    Tail,   // follow a live JSONL file
    Replay, // replay a static JSONL file at scaled speed
}
