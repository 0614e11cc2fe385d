//! Keyword and category rules deciding which entries are worth notifying.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::feed::CanonicalEntry;

/// Verdict for one entry. `priority` and `matched_keywords` only mean
/// something when `passed` is true.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    pub passed: bool,
    pub priority: i64,
    pub matched_keywords: BTreeSet<String>,
}

impl FilterOutcome {
    pub fn rejected() -> Self {
        Self::default()
    }
}

/// Decides pass/fail and priority. `category` and `feed_name` are set on
/// the entry before this is called.
pub trait FilterEvaluator: Send + Sync {
    fn evaluate(&self, entry: &CanonicalEntry) -> FilterOutcome;
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeywordRule {
    pub name: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub priority: i64,
    /// Empty applies the rule to every category.
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Every entry of a listed category passes.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    #[serde(default)]
    pub priority: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterEngine {
    #[serde(default)]
    pub exclude_keywords: Vec<String>,
    #[serde(default)]
    pub rules: Vec<KeywordRule>,
    #[serde(default)]
    pub categories: Vec<CategoryRule>,
}

impl FilterEngine {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading filter rules from {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing filter rules {}", path.display()))
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        let engine: FilterEngine = toml::from_str(s)?;
        for rule in &engine.rules {
            anyhow::ensure!(
                rule.keywords.iter().any(|k| !k.trim().is_empty()),
                "rule '{}' has no keywords",
                rule.name
            );
        }
        Ok(engine)
    }

    /// An engine that lets everything through at priority 0.
    pub fn pass_all() -> PassAll {
        PassAll
    }
}

fn haystack(entry: &CanonicalEntry) -> String {
    format!("{}\n{}", entry.title, entry.summary).to_lowercase()
}

fn matches(haystack: &str, keyword: &str) -> bool {
    let needle = keyword.trim().to_lowercase();
    !needle.is_empty() && haystack.contains(&needle)
}

impl FilterEvaluator for FilterEngine {
    fn evaluate(&self, entry: &CanonicalEntry) -> FilterOutcome {
        let text = haystack(entry);

        if self.exclude_keywords.iter().any(|k| matches(&text, k)) {
            return FilterOutcome::rejected();
        }

        let mut outcome = FilterOutcome::rejected();
        let mut priority: Option<i64> = None;

        for rule in &self.rules {
            if !rule.categories.is_empty() && !rule.categories.iter().any(|c| c == &entry.category) {
                continue;
            }
            let hits: Vec<&String> = rule.keywords.iter().filter(|k| matches(&text, k)).collect();
            if hits.is_empty() {
                continue;
            }
            priority = Some(priority.map_or(rule.priority, |p| p.max(rule.priority)));
            outcome
                .matched_keywords
                .extend(hits.into_iter().map(|k| k.trim().to_string()));
        }

        if let Some(category) = self.categories.iter().find(|c| c.name == entry.category) {
            priority = Some(priority.map_or(category.priority, |p| p.max(category.priority)));
        }

        if let Some(priority) = priority {
            outcome.passed = true;
            outcome.priority = priority;
        }
        outcome
    }
}

/// Lets every entry through.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassAll;

impl FilterEvaluator for PassAll {
    fn evaluate(&self, _entry: &CanonicalEntry) -> FilterOutcome {
        FilterOutcome {
            passed: true,
            ..FilterOutcome::default()
        }
    }
}
