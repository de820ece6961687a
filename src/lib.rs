// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod delta;
pub mod fetch;
pub mod identity;
pub mod notify;
pub mod run;
pub mod sources;
pub mod state;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::delta::{compute_delta, DeltaOutcome, DEFAULT_PER_RUN_LIMIT, DEFAULT_RETENTION_CAP};
pub use crate::identity::identify;
pub use crate::run::{run_once, FetcherSet, RunConfig, RunReport};
pub use crate::state::{LoadState, Snapshot, SnapshotStore};
pub use crate::types::{CacheTokens, EntryId, FetchOutcome, Fetcher, Item, Notifier};
