//! Type definitions for the feed module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tokio::time::Duration;

/// Default number of entries taken from each feed per run.
pub const DEFAULT_ENTRY_LIMIT: usize = 5;
pub const SUMMARY_MAX_CHARS: usize = 500;
pub const DEFAULT_TITLE: &str = "No title";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Why a whole feed could not be turned into entries.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("invalid feed url: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("feed parse error: {0}")]
    Parse(#[from] feed_rs::parser::ParseFeedError),

    #[error("malformed JSON feed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document is not RSS or Atom, content preview: {0}")]
    NotAFeed(String),
}

/// A feed item as parsed, before any normalization.
///
/// Every field is optional because feeds disagree on which ones they carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub id: Option<String>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub published: Option<String>,
    pub updated: Option<String>,
    pub created: Option<String>,
}

/// The normalized record that flows through filtering, enrichment and
/// notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalEntry {
    pub id: String,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published: DateTime<Utc>,
    pub category: String,
    pub feed_name: String,
    pub priority: i64,
    pub matched_keywords: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub localized_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_summary: Option<String>,
}

impl CanonicalEntry {
    /// Title to show a reader: the localized one when enrichment produced it.
    pub fn display_title(&self) -> &str {
        self.localized_title.as_deref().unwrap_or(&self.title)
    }
}

/// JSON Feed document (https://jsonfeed.org/version/1.1)
#[derive(Debug, Deserialize)]
pub struct JsonFeed {
    #[serde(default)]
    pub items: Vec<JsonFeedItem>,
}

/// JSON Feed item
#[derive(Debug, Deserialize)]
pub struct JsonFeedItem {
    pub id: Option<serde_json::Value>,
    pub url: Option<String>,
    pub external_url: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content_text: Option<String>,
    pub content_html: Option<String>,
    pub date_published: Option<String>,
    pub date_modified: Option<String>,
}

impl From<JsonFeedItem> for RawEntry {
    fn from(item: JsonFeedItem) -> Self {
        // Version 1.0 feeds sometimes publish numeric ids
        let id = match item.id {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        RawEntry {
            id,
            link: item.url.or(item.external_url),
            title: item.title,
            summary: item
                .summary
                .or(item.content_text)
                .or(item.content_html),
            published: item.date_published,
            updated: item.date_modified,
            created: None,
        }
    }
}
