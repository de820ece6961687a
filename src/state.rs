// src/state.rs
//! Durable snapshot of previously-seen entries plus conditional-fetch
//! validators, stored as a single JSON file. One run = load once, mutate in
//! memory, persist once; no concurrent writers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CacheTokens, EntryId};

/// The durable record. Field set matches the on-disk `state.json` format:
/// `last_checked`, `seen_entries`, `etags`, `last_modified`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub last_checked: Option<String>,
    #[serde(default)]
    pub seen_entries: BTreeMap<String, Vec<EntryId>>,
    #[serde(default)]
    pub etags: BTreeMap<String, String>,
    #[serde(default)]
    pub last_modified: BTreeMap<String, String>,
}

impl Snapshot {
    /// Seen-list for a source; absent means never fetched.
    pub fn seen(&self, source_key: &str) -> &[EntryId] {
        self.seen_entries
            .get(source_key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn set_seen(&mut self, source_key: &str, ids: Vec<EntryId>) {
        self.seen_entries.insert(source_key.to_string(), ids);
    }

    /// Cache validators for one endpoint, keyed `"{source_key}_{url}"`.
    pub fn cache_tokens(&self, endpoint_key: &str) -> CacheTokens {
        CacheTokens {
            etag: self.etags.get(endpoint_key).cloned(),
            last_modified: self.last_modified.get(endpoint_key).cloned(),
        }
    }

    pub fn set_cache_tokens(&mut self, endpoint_key: &str, tokens: &CacheTokens) {
        if let Some(etag) = &tokens.etag {
            self.etags.insert(endpoint_key.to_string(), etag.clone());
        }
        if let Some(lm) = &tokens.last_modified {
            self.last_modified.insert(endpoint_key.to_string(), lm.clone());
        }
    }

    pub fn touch_last_checked(&mut self) {
        self.last_checked = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
    }
}

/// What `load` found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Parsed an existing snapshot.
    Existing,
    /// No file at the path; starting fresh.
    Missing,
    /// File existed but did not parse; starting fresh. May re-report
    /// previously-seen items once.
    Corrupt,
}

impl LoadState {
    pub fn is_fresh(&self) -> bool {
        !matches!(self, LoadState::Existing)
    }
}

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot. Never fails fatally: a missing or unparseable file
    /// yields an empty snapshot and a flag saying so.
    pub fn load(&self) -> (Snapshot, LoadState) {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return (Snapshot::default(), LoadState::Missing);
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "could not read snapshot, starting fresh");
                return (Snapshot::default(), LoadState::Corrupt);
            }
        };
        match serde_json::from_str::<Snapshot>(&raw) {
            Ok(snapshot) => (snapshot, LoadState::Existing),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "snapshot did not parse, starting fresh");
                (Snapshot::default(), LoadState::Corrupt)
            }
        }
    }

    /// Persist the full snapshot atomically: write a temp file next to the
    /// target, then rename over it, so a concurrent reader sees either the
    /// old complete snapshot or the new one, never a partial write.
    pub fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let body = serde_json::to_string_pretty(snapshot).context("serializing snapshot")?;

        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating snapshot directory {}", dir.display()))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body.as_bytes())
            .with_context(|| format!("writing temp snapshot {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path).with_context(|| {
            format!(
                "renaming temp snapshot {} -> {}",
                tmp.display(),
                self.path.display()
            )
        })?;
        Ok(())
    }
}
