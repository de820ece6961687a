// src/fetch/feed.rs
//! RSS/Atom feed fetcher with conditional GET. Parsing is separated from
//! HTTP so fixtures exercise it directly.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use reqwest::header;
use reqwest::StatusCode;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::fetch::{clean_description, normalize_text};
use crate::sources::{SourceConfig, SourceKind};
use crate::types::{CacheTokens, FetchOutcome, Fetcher, Item};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    guid: Option<RssGuid>,
}

/// `<guid>` carries an `isPermaLink` attribute; only the text matters here.
#[derive(Debug, Deserialize)]
struct RssGuid {
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Atom {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    id: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<AtomText>,
}

/// Atom text constructs carry a `type` attribute; only the text matters here.
#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn parse_date(ts: &str) -> Option<DateTime<Utc>> {
    parse_rfc2822(ts).or_else(|| parse_rfc3339(ts))
}

/// Parse one feed document (RSS 2.0 or Atom) into items.
pub fn parse_feed(xml: &str, source_key: &str, source_name: &str) -> Result<Vec<Item>> {
    if looks_like_atom(xml) {
        parse_atom(xml, source_key, source_name)
    } else {
        parse_rss(xml, source_key, source_name)
    }
}

fn looks_like_atom(xml: &str) -> bool {
    let rss = xml.find("<rss");
    let atom = xml.find("<feed");
    match (rss, atom) {
        (Some(r), Some(a)) => a < r,
        (None, Some(_)) => true,
        _ => false,
    }
}

fn parse_rss(xml: &str, source_key: &str, source_name: &str) -> Result<Vec<Item>> {
    let rss: Rss = from_str(xml).context("parsing rss xml")?;
    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let title = normalize_text(it.title.as_deref().unwrap_or_default());
        // Original behavior: a missing <link> falls back to the guid.
        let link = it
            .link
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .or(it.guid.as_ref().and_then(|g| g.value.as_deref()))
            .unwrap_or_default()
            .trim()
            .to_string();
        if title.is_empty() && link.is_empty() {
            continue;
        }
        out.push(Item {
            source_key: source_key.to_string(),
            source_name: source_name.to_string(),
            title,
            link,
            description: clean_description(it.description.as_deref().unwrap_or_default()),
            published_at: it.pub_date.as_deref().and_then(parse_date),
        });
    }
    Ok(out)
}

fn parse_atom(xml: &str, source_key: &str, source_name: &str) -> Result<Vec<Item>> {
    let feed: Atom = from_str(xml).context("parsing atom xml")?;
    let mut out = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        let title = normalize_text(
            entry
                .title
                .as_ref()
                .and_then(|t| t.value.as_deref())
                .unwrap_or_default(),
        );
        let link = pick_atom_link(&entry.links)
            .or(entry.id.as_deref())
            .unwrap_or_default()
            .trim()
            .to_string();
        if title.is_empty() && link.is_empty() {
            continue;
        }
        out.push(Item {
            source_key: source_key.to_string(),
            source_name: source_name.to_string(),
            title,
            link,
            description: clean_description(
                entry
                    .summary
                    .as_ref()
                    .and_then(|s| s.value.as_deref())
                    .unwrap_or_default(),
            ),
            published_at: entry
                .published
                .as_deref()
                .or(entry.updated.as_deref())
                .and_then(parse_date),
        });
    }
    Ok(out)
}

/// Prefer the `alternate` (or untyped) link, as feed readers do.
fn pick_atom_link(links: &[AtomLink]) -> Option<&str> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .and_then(|l| l.href.as_deref())
}

/// Case-insensitive keyword filter over title + description.
pub fn filter_by_keyword(items: Vec<Item>, keyword: Option<&str>) -> Vec<Item> {
    let Some(kw) = keyword.map(str::to_lowercase).filter(|k| !k.is_empty()) else {
        return items;
    };
    items
        .into_iter()
        .filter(|it| {
            it.title.to_lowercase().contains(&kw) || it.description.to_lowercase().contains(&kw)
        })
        .collect()
}

pub struct FeedFetcher {
    client: reqwest::Client,
}

impl FeedFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for FeedFetcher {
    async fn fetch(
        &self,
        source: &SourceConfig,
        url: &str,
        cache: &CacheTokens,
    ) -> Result<FetchOutcome> {
        let SourceKind::Feed { filter_keyword } = &source.kind else {
            return Err(anyhow!("feed fetcher invoked for non-feed source"));
        };

        let mut req = self.client.get(url);
        if let Some(etag) = &cache.etag {
            req = req.header(header::IF_NONE_MATCH, etag.as_str());
        }
        if let Some(lm) = &cache.last_modified {
            req = req.header(header::IF_MODIFIED_SINCE, lm.as_str());
        }

        let resp = req.send().await.with_context(|| format!("GET {url}"))?;
        if resp.status() == StatusCode::NOT_MODIFIED {
            tracing::debug!(url, "feed not modified since last check (304)");
            return Ok(FetchOutcome {
                items: Vec::new(),
                cache: cache.clone(),
            });
        }
        let resp = resp
            .error_for_status()
            .with_context(|| format!("feed {url} returned error status"))?;

        let fresh = CacheTokens {
            etag: header_string(resp.headers(), header::ETAG),
            last_modified: header_string(resp.headers(), header::LAST_MODIFIED),
        };

        let body = resp.text().await.with_context(|| format!("reading {url}"))?;
        let items = parse_feed(&body, &source.key, &source.name)?;
        let items = filter_by_keyword(items, filter_keyword.as_deref());
        tracing::debug!(url, count = items.len(), "parsed feed");

        Ok(FetchOutcome { items, cache: fresh })
    }
}

fn header_string(headers: &header::HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
