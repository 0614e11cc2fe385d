//! LLM enrichment: Japanese titles and summaries for feed entries.
//!
//! Every step has a fallback, so enrichment can only ever make an entry
//! better: a failed title keeps the original, a failed summary is empty.

use tokio::time::Duration;
use tracing::{debug, info};

use crate::config::env_var_or;
use crate::extract::ContentExtractor;
use crate::feed::{cap_with_ellipsis, CanonicalEntry};
use crate::llm::{GenerationError, GenerationParams, OllamaGenerator};
use crate::prompts::{japanese_summary_prompt, japanese_title_prompt};
use crate::TARGET_LLM_REQUEST;

pub const DEFAULT_MODEL: &str = "gemma2:9b";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const TITLE_CONTENT_CHARS: usize = 1000;
const SUMMARY_CONTENT_CHARS: usize = 2000;

const TITLE_PARAMS: GenerationParams = GenerationParams {
    temperature: 0.3,
    num_predict: 50,
};
const SUMMARY_PARAMS: GenerationParams = GenerationParams {
    temperature: 0.3,
    num_predict: 200,
};

/// Backend settings, resolved once at startup.
#[derive(Debug, Clone)]
pub struct EnricherConfig {
    pub model: String,
    pub base_url: String,
    pub generate_timeout: Duration,
    pub probe_timeout: Duration,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            generate_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(3),
        }
    }
}

impl EnricherConfig {
    /// `OLLAMA_MODEL` and `OLLAMA_URL`, falling back to the defaults.
    pub fn from_env() -> Self {
        Self {
            model: env_var_or("OLLAMA_MODEL", DEFAULT_MODEL),
            base_url: env_var_or("OLLAMA_URL", DEFAULT_OLLAMA_URL),
            ..Self::default()
        }
    }
}

/// True when the text contains Hiragana, Katakana or CJK ideographs.
pub fn contains_japanese(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(c,
            '\u{3040}'..='\u{309F}' | // hiragana
            '\u{30A0}'..='\u{30FF}' | // katakana
            '\u{4E00}'..='\u{9FFF}'   // CJK unified ideographs
        )
    })
}

/// Single line, without the quotes models like to wrap titles in.
pub fn clean_generated_title(raw: &str) -> String {
    let single_line = raw.trim().replace(['\r', '\n'], " ");
    single_line
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '「' | '」' | '“' | '”' | '『' | '』'))
        .trim()
        .to_string()
}

pub struct Enricher {
    generator: OllamaGenerator,
    extractor: ContentExtractor,
    probe_timeout: Duration,
}

impl Enricher {
    pub fn new(config: &EnricherConfig, extractor: ContentExtractor) -> Result<Self, GenerationError> {
        let generator =
            OllamaGenerator::new(&config.base_url, &config.model, config.generate_timeout)?;
        Ok(Self {
            generator,
            extractor,
            probe_timeout: config.probe_timeout,
        })
    }

    pub async fn is_available(&self) -> bool {
        self.generator.is_available(self.probe_timeout).await
    }

    /// A Japanese title for the entry, or its original title.
    pub async fn localized_title(&self, entry: &CanonicalEntry) -> String {
        if contains_japanese(&entry.title) {
            return entry.title.clone();
        }
        let article = self.article_text(entry).await;
        self.title_from(entry, &article).await
    }

    /// A short Japanese summary of the linked article, or empty.
    pub async fn summary(&self, entry: &CanonicalEntry) -> String {
        let article = self.article_text(entry).await;
        self.summary_from(entry, &article).await
    }

    /// Fills `localized_title` and `llm_summary` where enrichment produced
    /// something new. The article is fetched once for both.
    pub async fn enrich(&self, entry: &mut CanonicalEntry) {
        let article = self.article_text(entry).await;

        if !contains_japanese(&entry.title) {
            let title = self.title_from(entry, &article).await;
            if title != entry.title {
                entry.localized_title = Some(title);
            }
        }
        let summary = self.summary_from(entry, &article).await;
        if !summary.is_empty() {
            entry.llm_summary = Some(summary);
        }
        info!(target: TARGET_LLM_REQUEST, "Enriched '{}' (title: {}, summary: {})", entry.title, entry.localized_title.is_some(), entry.llm_summary.is_some());
    }

    async fn article_text(&self, entry: &CanonicalEntry) -> String {
        if entry.link.is_empty() {
            String::new()
        } else {
            self.extractor.extract(&entry.link).await
        }
    }

    /// Title generation from the article text, or the feed summary when the
    /// article gave nothing.
    async fn title_from(&self, entry: &CanonicalEntry, article: &str) -> String {
        let source_text = if article.is_empty() { entry.summary.as_str() } else { article };
        if source_text.trim().is_empty() {
            debug!(target: TARGET_LLM_REQUEST, "No text to translate title from for {}", entry.id);
            return entry.title.clone();
        }

        let capped = cap_with_ellipsis(source_text, TITLE_CONTENT_CHARS);
        let prompt = japanese_title_prompt(&entry.title, &capped);
        match self.generator.generate(&prompt, TITLE_PARAMS).await {
            Ok(raw) => {
                let title = clean_generated_title(&raw);
                if title.is_empty() {
                    entry.title.clone()
                } else {
                    title
                }
            }
            Err(_) => entry.title.clone(),
        }
    }

    async fn summary_from(&self, entry: &CanonicalEntry, article: &str) -> String {
        if article.is_empty() {
            return String::new();
        }

        let capped = cap_with_ellipsis(article, SUMMARY_CONTENT_CHARS);
        let prompt = japanese_summary_prompt(&entry.title, &capped);
        match self.generator.generate(&prompt, SUMMARY_PARAMS).await {
            Ok(raw) => raw.trim().to_string(),
            Err(_) => String::new(),
        }
    }
}
