// src/identity.rs
//! Stable entry identity. `identify` is pure and total: structurally equal
//! items always map to the same EntryId, and an item with every
//! identity-bearing field empty still gets a deterministic id instead of an
//! error.

use sha2::{Digest, Sha256};

use crate::types::{EntryId, Item};

/// Query parameters stripped during link normalization. Always stripped, so
/// the same article with and without campaign tags dedups to one id.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid"];

/// Derive the stable id for an item.
///
/// Preference chain: normalized link, then a hash of source_key + title,
/// then a hash of the whole item. Never consults the clock or any external
/// state.
pub fn identify(item: &Item) -> EntryId {
    let link = item.link.trim();
    if !link.is_empty() {
        return normalize_link(link);
    }

    let title = item.title.trim();
    if !title.is_empty() {
        return hashed(&format!("{}\n{}", item.source_key, title));
    }

    // Nothing identity-bearing left; hash every field we have.
    hashed(&format!(
        "{}\n{}\n{}\n{}\n{}",
        item.source_key,
        item.title,
        item.link,
        item.description,
        item.published_at.map(|t| t.to_rfc3339()).unwrap_or_default()
    ))
}

/// Deterministic link cleanup: drop the fragment, strip tracking query
/// parameters (and `utm_*`), trim one trailing slash from the path.
/// Falls back to the trimmed raw string when the link is not a parseable URL.
pub fn normalize_link(link: &str) -> String {
    let Ok(mut url) = reqwest::Url::parse(link) else {
        return link.trim().to_string();
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let mut out = url.to_string();
    if out.ends_with('/') && url.path() != "/" {
        out.pop();
    }
    out
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

fn hashed(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(7 + 32);
    out.push_str("sha256:");
    // 16 bytes of digest is plenty for a per-source seen-list.
    for b in &digest[..16] {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
