// src/fetch/page.rs
//! HTML page fetcher for sources without a feed: select article elements via
//! configured CSS selector groups and pull title/link/description/date out of
//! each. Parsing is separated from HTTP so fixtures exercise it directly.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};

use crate::fetch::{clean_description, normalize_text};
use crate::sources::{PageSelectors, SourceConfig, SourceKind};
use crate::types::{CacheTokens, FetchOutcome, Fetcher, Item};

/// Upper bound on article elements considered per page.
const PAGE_ARTICLE_CAP: usize = 20;

/// Parse one fetched page into items. `base_url` resolves relative links.
pub fn parse_page(
    html: &str,
    base_url: &str,
    selectors: &PageSelectors,
    source_key: &str,
    source_name: &str,
) -> Result<Vec<Item>> {
    let article_sel = compile(&selectors.article)?;
    let title_sel = compile(&selectors.title)?;
    let link_sel = compile(&selectors.link)?;
    let description_sel = compile(&selectors.description)?;
    let date_sel = compile(&selectors.date)?;

    let document = Html::parse_document(html);
    let articles: Vec<ElementRef> = document.select(&article_sel).collect();
    if articles.is_empty() {
        tracing::warn!(
            url = base_url,
            selector = %selectors.article,
            "no article elements matched"
        );
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for article in articles.into_iter().take(PAGE_ARTICLE_CAP) {
        let title = first_text(&article, &title_sel);
        if title.is_empty() {
            continue;
        }
        let Some(link) = first_link(&article, &link_sel, base_url) else {
            continue;
        };
        let description = article
            .select(&description_sel)
            .next()
            .map(|n| clean_description(&n.text().collect::<String>()))
            .unwrap_or_default();

        out.push(Item {
            source_key: source_key.to_string(),
            source_name: source_name.to_string(),
            title,
            link,
            description,
            published_at: first_date(&article, &date_sel),
        });
    }
    Ok(out)
}

fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("bad selector '{selector}': {e}"))
}

fn first_text(scope: &ElementRef, sel: &Selector) -> String {
    scope
        .select(sel)
        .map(|n| normalize_text(&n.text().collect::<String>()))
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

fn first_link(scope: &ElementRef, sel: &Selector, base_url: &str) -> Option<String> {
    let href = scope.select(sel).find_map(|n| n.value().attr("href"))?;
    match reqwest::Url::parse(base_url).and_then(|base| base.join(href)) {
        Ok(url) => Some(url.to_string()),
        Err(_) => Some(href.to_string()),
    }
}

fn first_date(scope: &ElementRef, sel: &Selector) -> Option<DateTime<Utc>> {
    for node in scope.select(sel) {
        if let Some(dt) = node.value().attr("datetime").and_then(parse_loose_date) {
            return Some(dt);
        }
        let text = normalize_text(&node.text().collect::<String>());
        if let Some(dt) = parse_loose_date(&text) {
            return Some(dt);
        }
    }
    None
}

/// Sites publish dates in whatever shape; accept the common ones.
fn parse_loose_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(dt) = crate::fetch::feed::parse_date(s) {
        return Some(dt);
    }
    for fmt in ["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
        }
    }
    None
}

pub struct PageFetcher {
    client: reqwest::Client,
}

impl PageFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for PageFetcher {
    async fn fetch(
        &self,
        source: &SourceConfig,
        url: &str,
        _cache: &CacheTokens,
    ) -> Result<FetchOutcome> {
        let SourceKind::Page { selectors } = &source.kind else {
            return Err(anyhow!("page fetcher invoked for non-page source"));
        };

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("page {url} returned error status"))?;
        let body = resp.text().await.with_context(|| format!("reading {url}"))?;

        let items = parse_page(&body, url, selectors, &source.key, &source.name)?;
        tracing::debug!(url, count = items.len(), "parsed page");

        // Pages are not conditionally fetched; no validators to carry.
        Ok(FetchOutcome {
            items,
            cache: CacheTokens::default(),
        })
    }
}
