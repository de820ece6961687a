//! AI News Scraper — batch entrypoint.
//!
//! One invocation = one run: fetch the configured feeds/pages, diff against
//! the durable snapshot, post new items to Slack, persist the snapshot.
//! Scheduling and mutual exclusion belong to the caller (cron, CI job).

use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ai_news_scraper::fetch::{build_client, feed::FeedFetcher, page::PageFetcher};
use ai_news_scraper::notify::slack::SlackNotifier;
use ai_news_scraper::run::{run_once, FetcherSet, RunConfig};
use ai_news_scraper::sources::load_sources_default;
use ai_news_scraper::state::SnapshotStore;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ai_news_scraper=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

fn state_path() -> PathBuf {
    std::env::var("NEWS_STATE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("state.json"))
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let client = match build_client() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "could not build http client");
            return ExitCode::FAILURE;
        }
    };

    let Some(slack) = SlackNotifier::from_env(client.clone()) else {
        tracing::error!("SLACK_WEBHOOK_URL environment variable not set");
        return ExitCode::FAILURE;
    };

    let sources = match load_sources_default() {
        Ok(s) if !s.is_empty() => s,
        Ok(_) => {
            tracing::error!("source configuration is empty");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            tracing::error!(error = %e, "could not load source configuration");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(sources = sources.len(), "ai news scraper starting");

    let feed = FeedFetcher::new(client.clone());
    let page = PageFetcher::new(client);
    let fetchers = FetcherSet {
        feed: &feed,
        page: &page,
    };
    let store = SnapshotStore::new(state_path());
    let cfg = RunConfig::default();

    let report = match run_once(&cfg, &sources, &fetchers, &store, &slack).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            let _ = slack.send_error_notification(&format!("{e:#}")).await;
            return ExitCode::FAILURE;
        }
    };

    for failure in &report.failures {
        tracing::warn!(
            source = %failure.source_key,
            url = %failure.url,
            reason = %failure.reason,
            "source skipped this run"
        );
    }
    tracing::info!(
        new_items = report.new_items,
        failed_sources = report.failures.len(),
        recovered_state = report.recovered_state,
        notified = report.notified,
        persisted = report.persisted,
        "run finished"
    );

    if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
