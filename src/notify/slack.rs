// src/notify/slack.rs
//! Slack webhook sink. Builds a Block Kit message: dated header, one section
//! per source, one section per item, context footer.

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};

use super::Digest;
use crate::types::{Item, Notifier};

/// Slack rejects messages beyond ~50 blocks; truncate before sending.
const MAX_BLOCKS: usize = 50;

pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: String, client: Client) -> Self {
        Self {
            webhook_url,
            client,
        }
    }

    pub fn from_env(client: Client) -> Option<Self> {
        std::env::var("SLACK_WEBHOOK_URL")
            .ok()
            .map(|url| Self::new(url, client))
    }

    /// Post a short error block so a broken run is visible in the channel.
    pub async fn send_error_notification(&self, error_message: &str) -> Result<()> {
        let blocks = vec![section(&format!(
            ":warning: *AI News Bot Error*\n```{error_message}```"
        ))];
        self.post(blocks).await
    }

    async fn post(&self, blocks: Vec<Value>) -> Result<()> {
        let blocks = truncate_blocks(blocks);
        let body = json!({ "blocks": blocks });
        self.client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, digest: &Digest) -> Result<()> {
        if digest.is_empty() {
            return Ok(());
        }
        self.post(build_blocks(digest)).await
    }
}

/// Block Kit layout for one digest.
pub fn build_blocks(digest: &Digest) -> Vec<Value> {
    let mut blocks = Vec::new();

    let today = Utc::now().format("%B %d, %Y");
    let plural = if digest.total == 1 { "" } else { "s" };
    blocks.push(section(&format!(
        ":robot_face: *AI News Update - {today}*\n_{} new update{plural} found_",
        digest.total
    )));
    blocks.push(divider());

    for group in &digest.groups {
        let plural = if group.items.len() == 1 { "" } else { "s" };
        blocks.push(section(&format!(
            "*{}* ({} update{plural})",
            group.source_name,
            group.items.len()
        )));
        for item in &group.items {
            blocks.push(section(&format_item(item)));
        }
        blocks.push(divider());
    }

    blocks.push(json!({
        "type": "context",
        "elements": [
            { "type": "mrkdwn", "text": "_Updates delivered by AI News Bot_ :robot_face:" }
        ]
    }));
    blocks
}

fn format_item(item: &Item) -> String {
    let date_str = item
        .published_at
        .map(|d| format!(" • {}", d.format("%b %d, %Y")))
        .unwrap_or_default();

    let mut text = format!("• *<{}|{}>*{date_str}", item.link, item.title);
    if !item.description.is_empty() {
        let mut desc = item.description.clone();
        if desc.chars().count() > 200 {
            desc = desc.chars().take(197).collect();
            desc.push_str("...");
        }
        text.push_str(&format!("\n  _{desc}_"));
    }
    text
}

/// Keep header and footer, cut the middle when over the block limit.
fn truncate_blocks(blocks: Vec<Value>) -> Vec<Value> {
    if blocks.len() <= MAX_BLOCKS {
        return blocks;
    }
    tracing::warn!(blocks = blocks.len(), "message exceeds Slack block limit, truncating");
    let tail = blocks[blocks.len() - 2..].to_vec();
    let mut out = blocks;
    out.truncate(MAX_BLOCKS - 3);
    out.push(section(
        "_... and more updates. Check the sources for the complete list._",
    ));
    out.extend(tail);
    out
}

fn section(text: &str) -> Value {
    json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": text }
    })
}

fn divider() -> Value {
    json!({ "type": "divider" })
}
