//! fleece-core: git-backed issue tracking.
//!
//! Issues live in `.fleece/issues.jsonl` inside the repository they track.
//! Several working copies edit them concurrently and reconcile through git
//! without textual merge conflicts:
//!
//! - [`crdt`]: per-field last-writer-wins clocks and the issue merge.
//! - [`graph`]: parent/child DAG validation.
//! - [`store`]: the JSON-lines store and the per-project read cache.
//! - [`queue`]: the single-writer queue in front of the store.
//! - [`service`]: issue operations built from the pieces above.
//! - [`sync`]: the git reconciliation protocol.
//!
//! # Conventions
//!
//! - **Errors**: [`error::FleeceError`] for library operations,
//!   [`sync::SyncFailure`] inside [`sync::SyncResult`], `anyhow` only for
//!   configuration loading.
//! - **Logging**: `tracing` macros; git commands at `debug`, sync outcomes
//!   and queue lifecycle at `info`, retries at `warn`.

pub mod config;
pub mod crdt;
pub mod error;
pub mod graph;
pub mod history;
pub mod lock;
pub mod model;
pub mod queue;
pub mod service;
pub mod sort_order;
pub mod store;
pub mod sync;
