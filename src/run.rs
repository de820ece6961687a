// src/run.rs
//! One batch run: load the snapshot, fetch every configured source, compute
//! per-source deltas, deliver the aggregate, persist the updated snapshot.
//! Per-source failures are values in the report, never aborts; only snapshot
//! load/persist is run-fatal.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::delta::{compute_delta, DEFAULT_PER_RUN_LIMIT, DEFAULT_RETENTION_CAP};
use crate::notify::Digest;
use crate::sources::{SourceConfig, SourceKind};
use crate::state::SnapshotStore;
use crate::types::{Fetcher, Item, Notifier};

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Max EntryIds retained per source in the snapshot.
    pub retention_cap: usize,
    /// Max fetched items considered per source per run.
    pub per_run_limit: usize,
    /// Politeness delay between endpoint fetches.
    pub request_delay: Duration,
    /// When the sink does not confirm delivery: persist the updated snapshot
    /// anyway (risking lost posts) instead of rolling back (risking
    /// duplicate posts next run). Default off.
    pub persist_on_notify_failure: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            retention_cap: DEFAULT_RETENTION_CAP,
            per_run_limit: DEFAULT_PER_RUN_LIMIT,
            request_delay: Duration::from_secs(2),
            persist_on_notify_failure: false,
        }
    }
}

/// A fetch failure for one source, isolated from the rest of the run.
#[derive(Debug, Clone)]
pub struct SourceFailure {
    pub source_key: String,
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub new_items: usize,
    pub failures: Vec<SourceFailure>,
    /// Snapshot was missing or corrupt and the run started fresh.
    pub recovered_state: bool,
    /// Sink confirmed delivery (true also when there was nothing to send).
    pub notified: bool,
    /// Updated snapshot reached the durable location.
    pub persisted: bool,
}

impl RunReport {
    /// A run is clean when delivery was confirmed and state was persisted.
    pub fn is_clean(&self) -> bool {
        self.notified && self.persisted
    }
}

/// Dispatches each source to the fetcher for its kind.
pub struct FetcherSet<'a> {
    pub feed: &'a dyn Fetcher,
    pub page: &'a dyn Fetcher,
}

impl<'a> FetcherSet<'a> {
    fn for_kind(&self, kind: &SourceKind) -> &'a dyn Fetcher {
        match kind {
            SourceKind::Feed { .. } => self.feed,
            SourceKind::Page { .. } => self.page,
        }
    }
}

/// Execute one run end to end.
pub async fn run_once(
    cfg: &RunConfig,
    sources: &BTreeMap<String, SourceConfig>,
    fetchers: &FetcherSet<'_>,
    store: &SnapshotStore,
    notifier: &dyn Notifier,
) -> Result<RunReport> {
    let (prior, load_state) = store.load();
    if load_state.is_fresh() {
        tracing::warn!(?load_state, "starting from an empty snapshot");
    }

    let mut report = RunReport {
        recovered_state: load_state.is_fresh(),
        ..RunReport::default()
    };

    // All per-source updates land in one working copy; merge is serialized
    // here even though fetches could in principle run concurrently.
    let mut updated = prior.clone();
    let mut all_new: Vec<Item> = Vec::new();
    let mut first_fetch = true;

    for (key, source) in sources {
        let fetcher = fetchers.for_kind(&source.kind);
        let mut fetched: Vec<Item> = Vec::new();

        for url in &source.urls {
            if !first_fetch && !cfg.request_delay.is_zero() {
                tokio::time::sleep(cfg.request_delay).await;
            }
            first_fetch = false;

            let endpoint_key = format!("{key}_{url}");
            let tokens = updated.cache_tokens(&endpoint_key);
            match fetcher.fetch(source, url, &tokens).await {
                Ok(outcome) => {
                    updated.set_cache_tokens(&endpoint_key, &outcome.cache);
                    fetched.extend(outcome.items);
                }
                Err(e) => {
                    tracing::warn!(source = %key, url = %url, error = %e, "source fetch failed");
                    report.failures.push(SourceFailure {
                        source_key: key.clone(),
                        url: url.clone(),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }

        fetched.truncate(cfg.per_run_limit);
        let outcome = compute_delta(&fetched, updated.seen(key), cfg.retention_cap);
        if !outcome.new_items.is_empty() {
            tracing::info!(source = %key, count = outcome.new_items.len(), "new entries");
        }
        updated.set_seen(key, outcome.updated_seen);
        all_new.extend(outcome.new_items);
    }

    report.new_items = all_new.len();
    updated.touch_last_checked();

    // Delivery before persist: unseen-until-delivered. If the sink does not
    // confirm, the durable snapshot stays at its prior value so the next run
    // recomputes and retries the same delta.
    let digest = Digest::from_items(all_new);
    if digest.is_empty() {
        report.notified = true;
    } else {
        match notifier.notify(&digest).await {
            Ok(()) => {
                tracing::info!(total = digest.total, "digest delivered");
                report.notified = true;
            }
            Err(e) => {
                tracing::warn!(error = %e, "digest delivery failed");
                if !cfg.persist_on_notify_failure {
                    return Ok(report);
                }
            }
        }
    }

    // A failed persist is surfaced, not fatal: the notification already went
    // out and the only cost of lost state is re-notification next run.
    match store.persist(&updated).context("persisting updated snapshot") {
        Ok(()) => report.persisted = true,
        Err(e) => tracing::warn!(error = %e, path = %store.path().display(), "snapshot persist failed"),
    }
    Ok(report)
}
