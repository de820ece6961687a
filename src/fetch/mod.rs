// src/fetch/mod.rs
pub mod feed;
pub mod page;

use std::time::Duration;

use anyhow::{Context, Result};

/// Browser-like UA; several of the watched sites refuse obvious bots.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Descriptions longer than this are cut to 297 chars + "...".
const DESCRIPTION_MAX: usize = 300;

/// Shared client for all fetchers and the Slack webhook.
pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("building http client")
}

/// Normalize text: decode HTML entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// Normalize a description and truncate it for the notification body.
pub fn clean_description(s: &str) -> String {
    let out = normalize_text(s);
    if out.chars().count() > DESCRIPTION_MAX {
        let cut: String = out.chars().take(DESCRIPTION_MAX - 3).collect();
        format!("{cut}...")
    } else {
        out
    }
}
