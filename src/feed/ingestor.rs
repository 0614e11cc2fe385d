//! Turns one feed source into canonical entries.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use super::client::{create_http_client, fetch_feed};
use super::date::resolve_published;
use super::identifier::{entry_id, hash_key};
use super::parser::parse_feed;
use super::types::{
    CanonicalEntry, FeedError, RawEntry, DEFAULT_TITLE, REQUEST_TIMEOUT, SUMMARY_MAX_CHARS,
};
use super::util::{non_empty, truncate_chars};
use crate::config::FeedSource;
use crate::TARGET_WEB_REQUEST;

pub struct FeedIngestor {
    client: reqwest::Client,
    timeout: Duration,
}

impl FeedIngestor {
    pub fn new() -> Result<Self, FeedError> {
        Ok(Self {
            client: create_http_client()?,
            timeout: REQUEST_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Up to `limit` entries from `source`, in feed order.
    ///
    /// Never fails: a source that cannot be fetched or parsed is logged and
    /// contributes nothing.
    pub async fn fetch(&self, source: &FeedSource, limit: usize) -> Vec<CanonicalEntry> {
        let ingested_at = Utc::now();
        match self.fetch_raw(source).await {
            Ok(raw) => {
                let total = raw.len();
                let entries: Vec<CanonicalEntry> = raw
                    .into_iter()
                    .take(limit)
                    .enumerate()
                    .map(|(ordinal, entry)| canonicalize(entry, ordinal, &source.url, ingested_at))
                    .collect();
                info!(target: TARGET_WEB_REQUEST, "Fetched {}: {} entries ({} in feed)", source.name, entries.len(), total);
                entries
            }
            Err(err) => {
                warn!(target: TARGET_WEB_REQUEST, "Error fetching {}: {}", source.name, err);
                Vec::new()
            }
        }
    }

    async fn fetch_raw(&self, source: &FeedSource) -> Result<Vec<RawEntry>, FeedError> {
        let fetched = fetch_feed(&self.client, &source.url, self.timeout).await?;
        let entries = parse_feed(&fetched.body, fetched.content_type.as_deref())?;
        debug!(target: TARGET_WEB_REQUEST, "Parsed {} raw entries from {}", entries.len(), source.url);
        Ok(entries)
    }
}

/// Applies id, timestamp, defaults and truncation to one parsed entry.
///
/// `ordinal` and `source_url` only matter for entries with no id, link or
/// title; `ingested_at` stands in for a timestamp that cannot be resolved.
pub fn canonicalize(
    raw: RawEntry,
    ordinal: usize,
    source_url: &str,
    ingested_at: DateTime<Utc>,
) -> CanonicalEntry {
    let id = entry_id(&raw).unwrap_or_else(|| hash_key(&format!("{}#{}", source_url, ordinal)));
    let published = resolve_published(&raw).unwrap_or(ingested_at);

    let title = non_empty(raw.title.as_deref())
        .unwrap_or(DEFAULT_TITLE)
        .to_string();
    let link = non_empty(raw.link.as_deref()).unwrap_or_default().to_string();
    let summary = truncate_chars(raw.summary.as_deref().unwrap_or_default(), SUMMARY_MAX_CHARS)
        .to_string();

    CanonicalEntry {
        id,
        title,
        link,
        summary,
        published,
        category: String::new(),
        feed_name: String::new(),
        priority: 0,
        matched_keywords: BTreeSet::new(),
        localized_title: None,
        llm_summary: None,
    }
}
