// fraudwatch — real-time stateful feature store + streaming fraud decisioning.
//
// Module map:
//   events     — transaction/decision domain types
//   state      — per-entity state records, concurrent store, checkpointing
//   encodings  — static target-encoding cache
//   features   — pure feature computation (frozen serving contract)
//   model      — opaque scoring artifact
//   pipeline   — per-transaction end-to-end processing
//   stream     — SSE feed ingestion with reconnect/backoff
//   notifier   — best-effort outbound flag calls
//   audit      — append-only decision log
//   health     — process health snapshot
//   config     — CLI/environment configuration

pub mod audit;
pub mod config;
pub mod encodings;
pub mod events;
pub mod features;
pub mod health;
pub mod model;
pub mod notifier;
pub mod pipeline;
pub mod state;
pub mod stream;
