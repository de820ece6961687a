// src/sources.rs
//! Static source configuration: which feeds and pages to watch. Loaded from
//! TOML once at startup, validated into a tagged variant per source kind,
//! read-only afterwards.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

const ENV_PATH: &str = "NEWS_SOURCES_PATH";
const DEFAULT_PATH: &str = "config/sources.toml";

/// One configured source.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    /// Stable source key; filled from the map key at load time.
    #[serde(skip)]
    pub key: String,
    /// Display name used in notifications, e.g. "OpenAI".
    pub name: String,
    /// Endpoint URLs (a source may expose several feeds/pages).
    pub urls: Vec<String>,
    #[serde(flatten)]
    pub kind: SourceKind,
}

/// Per-kind options with a fixed, validated field set.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceKind {
    /// RSS/Atom feed endpoint.
    Feed {
        /// Keep only items whose title or description contains this
        /// (case-insensitive), e.g. "ai" for a general company blog.
        #[serde(default)]
        filter_keyword: Option<String>,
    },
    /// HTML page scraped with CSS selectors.
    Page { selectors: PageSelectors },
}

/// CSS selector groups for page sources. Each accepts a comma-separated
/// selector list; the first match wins.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PageSelectors {
    pub article: String,
    pub title: String,
    pub link: String,
    #[serde(default = "default_description_selector")]
    pub description: String,
    #[serde(default = "default_date_selector")]
    pub date: String,
}

fn default_description_selector() -> String {
    "p".to_string()
}

fn default_date_selector() -> String {
    "time".to_string()
}

#[derive(Debug, Deserialize)]
struct SourcesFile {
    sources: BTreeMap<String, SourceConfig>,
}

/// Load sources from an explicit TOML path.
pub fn load_sources_from(path: &Path) -> Result<BTreeMap<String, SourceConfig>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    parse_sources(&content)
}

/// Load sources using env var + fallback:
/// 1) $NEWS_SOURCES_PATH
/// 2) config/sources.toml
pub fn load_sources_default() -> Result<BTreeMap<String, SourceConfig>> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        }
        return Err(anyhow!("NEWS_SOURCES_PATH points to non-existent path"));
    }
    load_sources_from(Path::new(DEFAULT_PATH))
}

fn parse_sources(s: &str) -> Result<BTreeMap<String, SourceConfig>> {
    let mut file: SourcesFile = toml::from_str(s).context("parsing sources TOML")?;
    for (key, cfg) in &mut file.sources {
        cfg.key = key.clone();
        if cfg.name.trim().is_empty() {
            return Err(anyhow!("source '{key}' has an empty display name"));
        }
        if cfg.urls.is_empty() || cfg.urls.iter().any(|u| u.trim().is_empty()) {
            return Err(anyhow!("source '{key}' needs at least one non-empty url"));
        }
    }
    Ok(file.sources)
}
