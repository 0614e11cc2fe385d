//! Feed list loading and environment helpers.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// One configured feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Overrides the run-wide per-feed entry limit.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Any other keys in the table, kept so the file round-trips.
    #[serde(flatten)]
    pub extra: toml::Table,
}

fn default_enabled() -> bool {
    true
}

impl FeedSource {
    pub fn new(name: &str, url: &str, category: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            category: category.to_string(),
            enabled: true,
            limit: None,
            extra: toml::Table::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FeedsFile {
    #[serde(default)]
    feeds: Vec<FeedSource>,
}

/// Loads `[[feeds]]` tables from a TOML file.
pub fn load_feeds(path: &Path) -> Result<Vec<FeedSource>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feed list from {}", path.display()))?;
    parse_feeds(&content).with_context(|| format!("parsing feed list {}", path.display()))
}

pub fn parse_feeds(s: &str) -> Result<Vec<FeedSource>> {
    let file: FeedsFile = toml::from_str(s)?;
    for feed in &file.feeds {
        anyhow::ensure!(!feed.url.trim().is_empty(), "feed '{}' has no url", feed.name);
    }
    Ok(file.feeds)
}

/// Returns the variable's value, or `default` when it is unset or blank.
pub fn env_var_or(var: &str, default: &str) -> String {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Like [`env_var_or`] but with no default.
pub fn env_var_opt(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
