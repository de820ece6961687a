// src/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Stable identifier derived from an [`Item`], used for deduplication.
pub type EntryId = String;

/// One fetched news/changelog entry. Ephemeral: produced fresh each run by a
/// fetcher, identity derivable without further network I/O.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Item {
    pub source_key: String,  // configured key, e.g. "openai"
    pub source_name: String, // display name, e.g. "OpenAI"
    pub title: String,
    pub link: String,
    pub description: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Opaque cache-validator tokens for conditional GET. The core passes these
/// through to fetchers and stores whatever comes back; the dedup logic never
/// reads them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheTokens {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Result of one endpoint fetch: the parsed items plus refreshed validators.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub items: Vec<Item>,
    pub cache: CacheTokens,
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch one endpoint of a source. A 304 (feed unchanged) is success with
    /// zero items and the prior tokens echoed back.
    async fn fetch(
        &self,
        source: &crate::sources::SourceConfig,
        url: &str,
        cache: &CacheTokens,
    ) -> Result<FetchOutcome>;
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one run's digest. Fire-and-forget from the core's standpoint;
    /// retries are the sink's own concern.
    async fn notify(&self, digest: &crate::notify::Digest) -> Result<()>;
}
