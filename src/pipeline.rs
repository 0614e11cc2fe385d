//! One polling pass: ingest every enabled feed, drop entries already seen,
//! filter and prioritize the rest, optionally enrich them, then notify the
//! sorted batch and prune the seen store.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::FeedSource;
use crate::db::SeenStore;
use crate::enrich::Enricher;
use crate::feed::{CanonicalEntry, FeedIngestor, DEFAULT_ENTRY_LIMIT};
use crate::filter::FilterEvaluator;
use crate::notify::Notifier;
use crate::TARGET_DB;

pub const DEFAULT_CLEANUP_DAYS: u32 = 30;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Entries taken per feed unless the feed sets its own limit.
    pub limit: usize,
    pub cleanup_days: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_ENTRY_LIMIT,
            cleanup_days: DEFAULT_CLEANUP_DAYS,
        }
    }
}

/// What happened during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub fetched: usize,
    pub skipped_seen: usize,
    pub rejected: usize,
    pub store_errors: usize,
    pub notified: usize,
    pub enriched: usize,
    pub notify_failed: bool,
    pub cleaned_up: u64,
}

pub struct Pipeline {
    ingestor: FeedIngestor,
    store: Box<dyn SeenStore>,
    filter: Box<dyn FilterEvaluator>,
    notifier: Box<dyn Notifier>,
    enricher: Option<Enricher>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        ingestor: FeedIngestor,
        store: Box<dyn SeenStore>,
        filter: Box<dyn FilterEvaluator>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            ingestor,
            store,
            filter,
            notifier,
            enricher: None,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_enricher(mut self, enricher: Enricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Entries of every enabled feed, in feed order, tagged with the feed's
    /// name and category.
    pub async fn ingest_all(&self, feeds: &[FeedSource]) -> Vec<CanonicalEntry> {
        let mut all = Vec::new();
        for feed in feeds {
            if !feed.enabled {
                debug!("Skipping disabled feed {}", feed.name);
                continue;
            }
            info!("Fetching: {}", feed.name);
            let limit = feed.limit.unwrap_or(self.options.limit);
            for mut entry in self.ingestor.fetch(feed, limit).await {
                entry.category = feed.category.clone();
                entry.feed_name = feed.name.clone();
                all.push(entry);
            }
        }
        all
    }

    /// Keeps unseen entries that pass the filter, marking each one seen.
    async fn select_new(&self, entries: Vec<CanonicalEntry>, report: &mut RunReport) -> Vec<CanonicalEntry> {
        let mut selected = Vec::new();
        for mut entry in entries {
            match self.store.is_seen(&entry.id).await {
                Ok(true) => {
                    report.skipped_seen += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    // An entry with unknown seen state is never notified
                    warn!(target: TARGET_DB, "Seen check failed for {}: {}", entry.id, e);
                    report.store_errors += 1;
                    continue;
                }
            }

            let outcome = self.filter.evaluate(&entry);
            if !outcome.passed {
                report.rejected += 1;
                continue;
            }
            entry.priority = outcome.priority;
            entry.matched_keywords = outcome.matched_keywords;

            if let Err(e) = self.store.mark_seen(&entry.id).await {
                warn!(target: TARGET_DB, "Failed to mark {} as seen: {}", entry.id, e);
                report.store_errors += 1;
            }
            selected.push(entry);
        }
        selected
    }

    async fn enrich_all(&self, entries: &mut [CanonicalEntry], report: &mut RunReport) {
        let Some(enricher) = &self.enricher else {
            return;
        };
        if entries.is_empty() {
            return;
        }
        if !enricher.is_available().await {
            warn!("LLM backend unavailable, sending entries without enrichment");
            return;
        }
        for entry in entries.iter_mut() {
            enricher.enrich(entry).await;
            report.enriched += 1;
        }
    }

    pub async fn run(&self, feeds: &[FeedSource]) -> RunReport {
        let mut report = RunReport::default();
        info!("Starting feed check...");

        let entries = self.ingest_all(feeds).await;
        report.fetched = entries.len();

        let mut batch = self.select_new(entries, &mut report).await;
        self.enrich_all(&mut batch, &mut report).await;

        if batch.is_empty() {
            info!("No new entries");
        } else {
            info!("Found {} new entries", batch.len());
            // Stable: ties keep feed-then-entry order
            batch.sort_by(|a, b| b.priority.cmp(&a.priority));
            match self.notifier.send_batch(&batch).await {
                Ok(()) => report.notified = batch.len(),
                Err(e) => {
                    warn!("Notification failed: {}", e);
                    report.notify_failed = true;
                }
            }
        }

        match self.store.cleanup(self.options.cleanup_days).await {
            Ok(removed) => report.cleaned_up = removed,
            Err(e) => warn!(target: TARGET_DB, "Seen store cleanup failed: {}", e),
        }

        info!("Done: {:?}", report);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::enrich::EnricherConfig;
    use crate::extract::ContentExtractor;
    use crate::filter::{FilterEngine, FilterOutcome, PassAll};
    use crate::test_support::{rss_document, serve_feed, serve_ollama};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tokio::time::Duration;

    #[derive(Clone, Default)]
    struct CapturingNotifier {
        batches: Arc<Mutex<Vec<Vec<CanonicalEntry>>>>,
    }

    #[async_trait]
    impl Notifier for CapturingNotifier {
        async fn send_batch(&self, entries: &[CanonicalEntry]) -> Result<()> {
            self.batches.lock().unwrap().push(entries.to_vec());
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send_batch(&self, _entries: &[CanonicalEntry]) -> Result<()> {
            anyhow::bail!("webhook down")
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl SeenStore for BrokenStore {
        async fn is_seen(&self, _id: &str) -> Result<bool> {
            anyhow::bail!("disk on fire")
        }
        async fn mark_seen(&self, _id: &str) -> Result<()> {
            anyhow::bail!("disk on fire")
        }
        async fn cleanup(&self, _days: u32) -> Result<u64> {
            anyhow::bail!("disk on fire")
        }
    }

    /// Priority comes from a "P<n>" marker in the title.
    struct TitlePriority;

    impl FilterEvaluator for TitlePriority {
        fn evaluate(&self, entry: &CanonicalEntry) -> FilterOutcome {
            let priority = entry
                .title
                .split_whitespace()
                .find_map(|w| w.strip_prefix('P').and_then(|n| n.parse().ok()));
            match priority {
                Some(priority) => FilterOutcome {
                    passed: true,
                    priority,
                    ..FilterOutcome::default()
                },
                None => FilterOutcome::rejected(),
            }
        }
    }

    fn items(prefix: &str, n: usize) -> Vec<(String, String, String)> {
        (0..n)
            .map(|i| {
                (
                    format!("{} {}", prefix, i),
                    format!("https://example.com/{}/{}", prefix, i),
                    "Mon, 01 Jan 2024 00:00:00 GMT".to_string(),
                )
            })
            .collect()
    }

    fn pipeline(
        store: Box<dyn SeenStore>,
        filter: Box<dyn FilterEvaluator>,
        notifier: Box<dyn Notifier>,
    ) -> Pipeline {
        let ingestor = FeedIngestor::new()
            .unwrap()
            .with_timeout(Duration::from_secs(5));
        Pipeline::new(ingestor, store, filter, notifier)
    }

    #[tokio::test]
    async fn healthy_feed_and_refused_feed_yield_five_entries() {
        let url = serve_feed(rss_document(&items("Story", 6))).await;
        let feeds = vec![
            FeedSource::new("Good", &url, "news"),
            FeedSource::new("Down", "http://127.0.0.1:1/", "news"),
        ];
        let notifier = CapturingNotifier::default();
        let p = pipeline(
            Box::new(Database::in_memory().await.unwrap()),
            Box::new(PassAll),
            Box::new(notifier.clone()),
        );

        let report = p.run(&feeds).await;

        assert_eq!(report.fetched, 5);
        assert_eq!(report.notified, 5);
        let batches = notifier.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 5);
        assert!(batches[0].iter().all(|e| e.feed_name == "Good" && e.category == "news"));
    }

    #[tokio::test]
    async fn higher_priority_goes_first() {
        let feed = vec![
            ("Minor P3".to_string(), "https://example.com/minor".to_string(), String::new()),
            ("Other P3".to_string(), "https://example.com/other".to_string(), String::new()),
            ("Major P10".to_string(), "https://example.com/major".to_string(), String::new()),
        ];
        let url = serve_feed(rss_document(&feed)).await;
        let notifier = CapturingNotifier::default();
        let p = pipeline(
            Box::new(Database::in_memory().await.unwrap()),
            Box::new(TitlePriority),
            Box::new(notifier.clone()),
        );

        p.run(&[FeedSource::new("F", &url, "security")]).await;

        let batches = notifier.batches.lock().unwrap();
        let titles: Vec<&str> = batches[0].iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Major P10", "Minor P3", "Other P3"]);
        assert_eq!(batches[0][0].priority, 10);
    }

    #[tokio::test]
    async fn seen_entries_are_not_notified_twice() {
        let url = serve_feed(rss_document(&items("Story", 3))).await;
        let feeds = vec![FeedSource::new("Good", &url, "news")];
        let notifier = CapturingNotifier::default();
        let p = pipeline(
            Box::new(Database::in_memory().await.unwrap()),
            Box::new(PassAll),
            Box::new(notifier.clone()),
        );

        let first = p.run(&feeds).await;
        let second = p.run(&feeds).await;

        assert_eq!(first.notified, 3);
        assert_eq!(second.skipped_seen, 3);
        assert_eq!(second.notified, 0);
        assert_eq!(notifier.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejected_entries_stay_unseen() {
        let url = serve_feed(rss_document(&items("Story", 2))).await;
        let feeds = vec![FeedSource::new("Good", &url, "news")];
        let db = Database::in_memory().await.unwrap();
        let rules = FilterEngine::from_toml("[[rules]]\nname = \"never\"\nkeywords = [\"no-such-word\"]\n").unwrap();
        let p = pipeline(
            Box::new(db.clone()),
            Box::new(rules),
            Box::new(CapturingNotifier::default()),
        );

        let report = p.run(&feeds).await;
        assert_eq!(report.rejected, 2);
        assert_eq!(db.count_seen().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn disabled_feeds_and_per_feed_limits() {
        let url = serve_feed(rss_document(&items("Story", 6))).await;
        let mut limited = FeedSource::new("Limited", &url, "news");
        limited.limit = Some(2);
        let mut disabled = FeedSource::new("Off", &url, "news");
        disabled.enabled = false;

        let p = pipeline(
            Box::new(Database::in_memory().await.unwrap()),
            Box::new(PassAll),
            Box::new(CapturingNotifier::default()),
        );

        let entries = p.ingest_all(&[limited, disabled]).await;
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.feed_name == "Limited"));
    }

    #[tokio::test]
    async fn store_and_notifier_failures_do_not_abort_the_run() {
        let url = serve_feed(rss_document(&items("Story", 2))).await;
        let feeds = vec![FeedSource::new("Good", &url, "news")];

        let p = pipeline(Box::new(BrokenStore), Box::new(PassAll), Box::new(FailingNotifier));
        let report = p.run(&feeds).await;
        assert_eq!(report.store_errors, 2);
        assert_eq!(report.notified, 0);

        let p = pipeline(
            Box::new(Database::in_memory().await.unwrap()),
            Box::new(PassAll),
            Box::new(FailingNotifier),
        );
        let report = p.run(&feeds).await;
        assert!(report.notify_failed);
    }

    #[tokio::test]
    async fn enrichment_skipped_when_backend_is_down() {
        let url = serve_feed(rss_document(&items("Story", 2))).await;
        let notifier = CapturingNotifier::default();
        let config = EnricherConfig {
            base_url: "http://127.0.0.1:1".into(),
            probe_timeout: Duration::from_secs(1),
            ..EnricherConfig::default()
        };
        let enricher = Enricher::new(&config, ContentExtractor::new().unwrap()).unwrap();
        let p = pipeline(
            Box::new(Database::in_memory().await.unwrap()),
            Box::new(PassAll),
            Box::new(notifier.clone()),
        )
        .with_enricher(enricher);

        let report = p.run(&[FeedSource::new("Good", &url, "news")]).await;
        assert_eq!(report.enriched, 0);
        assert_eq!(report.notified, 2);
    }

    #[tokio::test]
    async fn enrichment_applied_when_backend_is_up() {
        let feed = vec![(
            "Story".to_string(),
            "http://127.0.0.1:1/story".to_string(),
            String::new(),
        )];
        let url = serve_feed(rss_document(&feed)).await;
        let (ollama_url, _) = serve_ollama("翻訳されたタイトル", Duration::ZERO).await;
        let notifier = CapturingNotifier::default();
        let config = EnricherConfig {
            base_url: ollama_url,
            model: "test".into(),
            ..EnricherConfig::default()
        };
        let extractor = ContentExtractor::new()
            .unwrap()
            .with_timeout(Duration::from_secs(2));
        let enricher = Enricher::new(&config, extractor).unwrap();
        let p = pipeline(
            Box::new(Database::in_memory().await.unwrap()),
            Box::new(PassAll),
            Box::new(notifier.clone()),
        )
        .with_enricher(enricher);

        let report = p.run(&[FeedSource::new("Good", &url, "news")]).await;
        assert_eq!(report.enriched, 1);
        let batches = notifier.batches.lock().unwrap();
        // Title falls back to the feed summary when the page is unreachable
        assert_eq!(batches[0][0].localized_title.as_deref(), Some("翻訳されたタイトル"));
    }
}
