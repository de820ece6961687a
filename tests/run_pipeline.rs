// tests/run_pipeline.rs
//! End-to-end orchestrator tests with a mock fetcher and a mock sink.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use ai_news_scraper::notify::Digest;
use ai_news_scraper::run::{run_once, FetcherSet, RunConfig};
use ai_news_scraper::sources::{SourceConfig, SourceKind};
use ai_news_scraper::state::SnapshotStore;
use ai_news_scraper::types::{CacheTokens, FetchOutcome, Fetcher, Item, Notifier};

fn test_config() -> RunConfig {
    RunConfig {
        request_delay: Duration::ZERO,
        ..RunConfig::default()
    }
}

fn feed_source(key: &str, name: &str) -> (String, SourceConfig) {
    (
        key.to_string(),
        SourceConfig {
            key: key.to_string(),
            name: name.to_string(),
            urls: vec![format!("https://{key}.example/feed.xml")],
            kind: SourceKind::Feed {
                filter_keyword: None,
            },
        },
    )
}

fn item(key: &str, name: &str, slug: &str) -> Item {
    Item {
        source_key: key.to_string(),
        source_name: name.to_string(),
        title: format!("{name}: {slug}"),
        link: format!("https://{key}.example/{slug}"),
        description: String::new(),
        published_at: None,
    }
}

/// Serves canned items per source key; optionally fails a key; records the
/// cache tokens each call received and echoes configured fresh tokens back.
#[derive(Default)]
struct MockFetcher {
    items: BTreeMap<String, Vec<Item>>,
    fail_keys: Vec<String>,
    fresh_etag: Option<String>,
    seen_tokens: Mutex<Vec<(String, CacheTokens)>>,
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(
        &self,
        source: &SourceConfig,
        _url: &str,
        cache: &CacheTokens,
    ) -> Result<FetchOutcome> {
        self.seen_tokens
            .lock()
            .unwrap()
            .push((source.key.clone(), cache.clone()));
        if self.fail_keys.contains(&source.key) {
            return Err(anyhow!("connection refused"));
        }
        Ok(FetchOutcome {
            items: self.items.get(&source.key).cloned().unwrap_or_default(),
            cache: CacheTokens {
                etag: self.fresh_etag.clone(),
                last_modified: None,
            },
        })
    }
}

/// Records delivered digests; optionally refuses them.
#[derive(Default)]
struct MockNotifier {
    fail: bool,
    delivered: Mutex<Vec<usize>>,
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, digest: &Digest) -> Result<()> {
        if self.fail {
            return Err(anyhow!("webhook returned 500"));
        }
        self.delivered.lock().unwrap().push(digest.total);
        Ok(())
    }
}

#[tokio::test]
async fn first_run_delivers_everything_second_run_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("state.json"));
    let sources: BTreeMap<_, _> = [
        feed_source("openai", "OpenAI"),
        feed_source("cohere", "Cohere"),
    ]
    .into();

    let fetcher = MockFetcher {
        items: BTreeMap::from([
            (
                "openai".to_string(),
                vec![item("openai", "OpenAI", "a"), item("openai", "OpenAI", "b")],
            ),
            ("cohere".to_string(), vec![item("cohere", "Cohere", "c")]),
        ]),
        ..MockFetcher::default()
    };
    let notifier = MockNotifier::default();
    let fetchers = FetcherSet {
        feed: &fetcher,
        page: &fetcher,
    };

    let report = run_once(&test_config(), &sources, &fetchers, &store, &notifier)
        .await
        .unwrap();
    assert_eq!(report.new_items, 3);
    assert!(report.is_clean());
    assert!(report.recovered_state); // no state file yet
    assert_eq!(*notifier.delivered.lock().unwrap(), vec![3]);

    let (snap, _) = store.load();
    assert_eq!(snap.seen("openai").len(), 2);
    assert_eq!(snap.seen("cohere").len(), 1);
    assert!(snap.last_checked.is_some());

    // Identical fetch next run: nothing new, nothing delivered.
    let report = run_once(&test_config(), &sources, &fetchers, &store, &notifier)
        .await
        .unwrap();
    assert_eq!(report.new_items, 0);
    assert!(report.is_clean());
    assert!(!report.recovered_state);
    assert_eq!(*notifier.delivered.lock().unwrap(), vec![3]);
}

#[tokio::test]
async fn one_failing_source_does_not_abort_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("state.json"));
    let sources: BTreeMap<_, _> = [
        feed_source("openai", "OpenAI"),
        feed_source("meta_research", "Meta AI Research"),
    ]
    .into();

    let fetcher = MockFetcher {
        items: BTreeMap::from([(
            "openai".to_string(),
            vec![item("openai", "OpenAI", "a")],
        )]),
        fail_keys: vec!["meta_research".to_string()],
        ..MockFetcher::default()
    };
    let notifier = MockNotifier::default();
    let fetchers = FetcherSet {
        feed: &fetcher,
        page: &fetcher,
    };

    let report = run_once(&test_config(), &sources, &fetchers, &store, &notifier)
        .await
        .unwrap();
    assert_eq!(report.new_items, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].source_key, "meta_research");
    assert!(report.is_clean());

    // The failed source contributed zero items but kept its (empty) slot.
    let (snap, _) = store.load();
    assert_eq!(snap.seen("openai").len(), 1);
    assert!(snap.seen("meta_research").is_empty());
}

#[tokio::test]
async fn unconfirmed_delivery_rolls_back_the_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("state.json"));
    let sources: BTreeMap<_, _> = [feed_source("openai", "OpenAI")].into();

    let fetcher = MockFetcher {
        items: BTreeMap::from([(
            "openai".to_string(),
            vec![item("openai", "OpenAI", "a")],
        )]),
        fresh_etag: Some("\"v2\"".to_string()),
        ..MockFetcher::default()
    };
    let failing = MockNotifier {
        fail: true,
        ..MockNotifier::default()
    };
    let fetchers = FetcherSet {
        feed: &fetcher,
        page: &fetcher,
    };

    let report = run_once(&test_config(), &sources, &fetchers, &store, &failing)
        .await
        .unwrap();
    assert_eq!(report.new_items, 1);
    assert!(!report.notified);
    assert!(!report.persisted);
    // Nothing durable: neither seen ids nor the fresh etag were written.
    assert!(!store.path().exists());

    // Next run with a healthy sink retries the identical delta.
    let notifier = MockNotifier::default();
    let report = run_once(&test_config(), &sources, &fetchers, &store, &notifier)
        .await
        .unwrap();
    assert_eq!(report.new_items, 1);
    assert!(report.is_clean());
    assert_eq!(*notifier.delivered.lock().unwrap(), vec![1]);

    // The retry run must not have been conditioned on the rolled-back etag.
    let tokens = fetcher.seen_tokens.lock().unwrap();
    assert!(tokens.iter().all(|(_, t)| t.etag.is_none()));
}

#[tokio::test]
async fn persist_on_notify_failure_knob_marks_seen_anyway() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("state.json"));
    let sources: BTreeMap<_, _> = [feed_source("openai", "OpenAI")].into();

    let fetcher = MockFetcher {
        items: BTreeMap::from([(
            "openai".to_string(),
            vec![item("openai", "OpenAI", "a")],
        )]),
        ..MockFetcher::default()
    };
    let failing = MockNotifier {
        fail: true,
        ..MockNotifier::default()
    };
    let fetchers = FetcherSet {
        feed: &fetcher,
        page: &fetcher,
    };

    let cfg = RunConfig {
        persist_on_notify_failure: true,
        ..test_config()
    };
    let report = run_once(&cfg, &sources, &fetchers, &store, &failing)
        .await
        .unwrap();
    assert!(!report.notified);
    assert!(report.persisted);

    let (snap, _) = store.load();
    assert_eq!(snap.seen("openai").len(), 1);
}

#[tokio::test]
async fn cache_tokens_round_trip_per_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("state.json"));
    let sources: BTreeMap<_, _> = [feed_source("openai", "OpenAI")].into();

    let fetcher = MockFetcher {
        fresh_etag: Some("\"v1\"".to_string()),
        ..MockFetcher::default()
    };
    let notifier = MockNotifier::default();
    let fetchers = FetcherSet {
        feed: &fetcher,
        page: &fetcher,
    };

    run_once(&test_config(), &sources, &fetchers, &store, &notifier)
        .await
        .unwrap();

    // Stored under "{source_key}_{url}" and handed back on the next run.
    let (snap, _) = store.load();
    let endpoint_key = "openai_https://openai.example/feed.xml";
    assert_eq!(snap.cache_tokens(endpoint_key).etag.as_deref(), Some("\"v1\""));

    run_once(&test_config(), &sources, &fetchers, &store, &notifier)
        .await
        .unwrap();
    let tokens = fetcher.seen_tokens.lock().unwrap();
    assert_eq!(tokens.len(), 2);
    assert!(tokens[0].1.etag.is_none());
    assert_eq!(tokens[1].1.etag.as_deref(), Some("\"v1\""));
}

#[tokio::test]
async fn per_run_limit_truncates_oversized_fetches() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("state.json"));
    let sources: BTreeMap<_, _> = [feed_source("openai", "OpenAI")].into();

    let many: Vec<Item> = (0..50)
        .map(|i| item("openai", "OpenAI", &format!("post-{i}")))
        .collect();
    let fetcher = MockFetcher {
        items: BTreeMap::from([("openai".to_string(), many)]),
        ..MockFetcher::default()
    };
    let notifier = MockNotifier::default();
    let fetchers = FetcherSet {
        feed: &fetcher,
        page: &fetcher,
    };

    let report = run_once(&test_config(), &sources, &fetchers, &store, &notifier)
        .await
        .unwrap();
    assert_eq!(report.new_items, 20); // DEFAULT_PER_RUN_LIMIT
}
