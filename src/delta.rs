// src/delta.rs
//! The delta engine: given one source's freshly fetched items and the
//! previously recorded seen-list, decide which items are genuinely new and
//! produce the updated, capped seen-list. Pure computation — no I/O, no
//! clock, never fails on malformed items (identity falls back instead).

use std::collections::HashSet;

use crate::identity::identify;
use crate::types::{EntryId, Item};

/// Default retention cap per source.
pub const DEFAULT_RETENTION_CAP: usize = 200;

/// Default number of fetched items considered per source per run.
pub const DEFAULT_PER_RUN_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaOutcome {
    /// Fetched items not present in the prior seen-list, in fetch order.
    pub new_items: Vec<Item>,
    /// Prior seen-list with this run's new ids appended, trimmed to the cap.
    pub updated_seen: Vec<EntryId>,
}

/// Partition `fetched` against `prior_seen` and build the updated seen-list.
///
/// Prior ids keep their relative order; new ids are appended in fetch order.
/// Trimming evicts oldest-first and never drops an id added this run.
/// Idempotent: feeding `updated_seen` back in with the same `fetched` yields
/// an empty `new_items`.
pub fn compute_delta(fetched: &[Item], prior_seen: &[EntryId], cap: usize) -> DeltaOutcome {
    let mut known: HashSet<&str> = prior_seen.iter().map(String::as_str).collect();

    let mut new_items = Vec::new();
    let mut new_ids: Vec<EntryId> = Vec::new();
    for item in fetched {
        let id = identify(item);
        // A duplicate within the same batch is reported once.
        if known.contains(id.as_str()) || new_ids.iter().any(|n| *n == id) {
            continue;
        }
        new_items.push(item.clone());
        new_ids.push(id);
    }
    for id in &new_ids {
        known.insert(id.as_str());
    }

    let added = new_ids.len();
    let mut updated_seen: Vec<EntryId> = prior_seen.to_vec();
    updated_seen.append(&mut new_ids);

    if updated_seen.len() > cap {
        // Evict oldest first, but entries added this run are untouchable even
        // if that leaves the list over the cap (only possible when a single
        // run adds more than `cap` ids).
        let evictable = updated_seen.len() - added;
        let excess = (updated_seen.len() - cap).min(evictable);
        updated_seen.drain(0..excess);
    }

    DeltaOutcome {
        new_items,
        updated_seen,
    }
}
