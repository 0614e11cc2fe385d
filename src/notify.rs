//! Batch notification transports.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::extract::fragment_text;
use crate::feed::{truncate_chars, CanonicalEntry};
use crate::TARGET_WEB_REQUEST;

/// Delivers one run's batch, already sorted by priority.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_batch(&self, entries: &[CanonicalEntry]) -> Result<()>;
}

// Discord webhook limits
const MAX_EMBEDS_PER_MESSAGE: usize = 10;
const MAX_MESSAGE_CHARS: usize = 6000;
const MAX_TITLE_CHARS: usize = 256;
const MAX_DESCRIPTION_CHARS: usize = 4096;
const MAX_FIELD_CHARS: usize = 1024;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiscordEmbed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub description: String,
    pub timestamp: String,
    pub color: u32,
    pub footer: EmbedFooter,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

impl DiscordEmbed {
    fn char_len(&self) -> usize {
        self.title.chars().count()
            + self.description.chars().count()
            + self.footer.text.chars().count()
            + self
                .fields
                .iter()
                .map(|f| f.name.chars().count() + f.value.chars().count())
                .sum::<usize>()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiscordWebhookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embeds: Vec<DiscordEmbed>,
}

fn priority_color(priority: i64) -> u32 {
    match priority {
        p if p >= 10 => 0xE74C3C,
        p if p >= 5 => 0xE67E22,
        p if p > 0 => 0x3498DB,
        _ => 0x95A5A6,
    }
}

/// The text a reader sees under the title: the model's summary when there
/// is one, otherwise the feed summary without markup.
pub fn entry_description(entry: &CanonicalEntry) -> String {
    let text = match entry.llm_summary.as_deref() {
        Some(summary) => summary.to_string(),
        None => fragment_text(&entry.summary),
    };
    truncate_chars(&text, MAX_DESCRIPTION_CHARS).to_string()
}

pub fn build_embed(entry: &CanonicalEntry) -> DiscordEmbed {
    let mut fields = Vec::new();
    if !entry.matched_keywords.is_empty() {
        let keywords = entry
            .matched_keywords
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        fields.push(EmbedField {
            name: "Keywords".to_string(),
            value: truncate_chars(&keywords, MAX_FIELD_CHARS).to_string(),
            inline: true,
        });
    }
    if entry.localized_title.is_some() {
        fields.push(EmbedField {
            name: "Original title".to_string(),
            value: truncate_chars(&entry.title, MAX_FIELD_CHARS).to_string(),
            inline: false,
        });
    }

    let footer = if entry.category.is_empty() {
        entry.feed_name.clone()
    } else {
        format!("{} / {}", entry.feed_name, entry.category)
    };

    DiscordEmbed {
        title: truncate_chars(entry.display_title(), MAX_TITLE_CHARS).to_string(),
        url: (!entry.link.is_empty()).then(|| entry.link.clone()),
        description: entry_description(entry),
        timestamp: entry.published.to_rfc3339(),
        color: priority_color(entry.priority),
        footer: EmbedFooter { text: footer },
        fields,
    }
}

/// Splits the batch into webhook messages, keeping order and staying within
/// the per-message embed count and size.
pub fn build_payloads(entries: &[CanonicalEntry]) -> Vec<DiscordWebhookPayload> {
    let mut payloads = Vec::new();
    let mut embeds: Vec<DiscordEmbed> = Vec::new();
    let mut size = 0;

    for entry in entries {
        let embed = build_embed(entry);
        let len = embed.char_len();
        if !embeds.is_empty()
            && (embeds.len() == MAX_EMBEDS_PER_MESSAGE || size + len > MAX_MESSAGE_CHARS)
        {
            payloads.push(DiscordWebhookPayload {
                content: None,
                embeds: std::mem::take(&mut embeds),
            });
            size = 0;
        }
        size += len;
        embeds.push(embed);
    }
    if !embeds.is_empty() {
        payloads.push(DiscordWebhookPayload {
            content: None,
            embeds,
        });
    }
    payloads
}

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    async fn post(&self, payload: &DiscordWebhookPayload) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await;

            let failure = match res {
                Ok(rsp) => match rsp.error_for_status() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("Discord webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("Discord webhook request failed: {e}"),
            };

            if attempt >= self.max_retries {
                return Err(failure);
            }
            warn!(target: TARGET_WEB_REQUEST, "{} (attempt {}/{})", failure, attempt, self.max_retries);
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send_batch(&self, entries: &[CanonicalEntry]) -> Result<()> {
        if entries.is_empty() {
            info!(target: TARGET_WEB_REQUEST, "Nothing to notify");
            return Ok(());
        }

        let payloads = build_payloads(entries);
        let total = payloads.len();
        for (i, payload) in payloads.iter().enumerate() {
            if let Err(e) = self.post(payload).await {
                error!(target: TARGET_WEB_REQUEST, "Failed to send message {}/{}: {}", i + 1, total, e);
                return Err(e);
            }
        }
        info!(target: TARGET_WEB_REQUEST, "Sent {} entries to Discord in {} messages", entries.len(), total);
        Ok(())
    }
}

/// Prints the batch instead of posting it.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutNotifier;

pub fn format_entry_line(entry: &CanonicalEntry) -> String {
    let mut line = format!(
        "[{}] {} ({} / {})",
        entry.priority,
        entry.display_title(),
        entry.feed_name,
        entry.category
    );
    if !entry.link.is_empty() {
        line.push_str("\n    ");
        line.push_str(&entry.link);
    }
    let description = entry_description(entry);
    if !description.is_empty() {
        line.push_str("\n    ");
        line.push_str(&description.replace('\n', " "));
    }
    line
}

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn send_batch(&self, entries: &[CanonicalEntry]) -> Result<()> {
        println!("{} new entries", entries.len());
        for entry in entries {
            println!("{}", format_entry_line(entry));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{canonicalize, RawEntry};
    use crate::test_support::serve;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::Utc;
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    fn entry(i: usize, priority: i64) -> CanonicalEntry {
        let mut e = canonicalize(
            RawEntry {
                title: Some(format!("Entry {}", i)),
                link: Some(format!("https://example.com/{}", i)),
                summary: Some("<p>Some <b>markup</b></p>".into()),
                ..Default::default()
            },
            i,
            "https://feed",
            Utc::now(),
        );
        e.feed_name = "Feed".into();
        e.category = "security".into();
        e.priority = priority;
        e
    }

    #[test]
    fn embed_prefers_enriched_text() {
        let mut e = entry(1, 10);
        e.matched_keywords.insert("RCE".into());
        let embed = build_embed(&e);
        assert_eq!(embed.title, "Entry 1");
        assert_eq!(embed.description, "Some markup");
        assert_eq!(embed.footer.text, "Feed / security");
        assert_eq!(embed.color, 0xE74C3C);
        assert_eq!(embed.fields[0].value, "RCE");

        e.localized_title = Some("エントリ".into());
        e.llm_summary = Some("要約".into());
        let embed = build_embed(&e);
        assert_eq!(embed.title, "エントリ");
        assert_eq!(embed.description, "要約");
        assert!(embed.fields.iter().any(|f| f.value == "Entry 1"));
    }

    #[test]
    fn description_is_capped_at_embed_limit() {
        let mut e = entry(1, 0);
        e.llm_summary = Some("あ".repeat(5000));
        assert_eq!(build_embed(&e).description.chars().count(), 4096);

        e.llm_summary = Some("あ".repeat(4096));
        assert_eq!(build_embed(&e).description, "あ".repeat(4096));
    }

    #[test]
    fn payloads_hold_at_most_ten_embeds_in_order() {
        let entries: Vec<_> = (0..23).map(|i| entry(i, 0)).collect();
        let payloads = build_payloads(&entries);
        assert_eq!(payloads.len(), 3);
        assert_eq!(payloads[0].embeds.len(), 10);
        assert_eq!(payloads[2].embeds.len(), 3);
        assert_eq!(payloads[1].embeds[0].title, "Entry 10");
    }

    #[test]
    fn payloads_respect_message_size() {
        let entries: Vec<_> = (0..8)
            .map(|i| {
                let mut e = entry(i, 0);
                e.llm_summary = Some("x".repeat(MAX_DESCRIPTION_CHARS));
                e
            })
            .collect();
        let payloads = build_payloads(&entries);
        assert!(payloads.len() > 1);
        for payload in &payloads {
            let size: usize = payload.embeds.iter().map(DiscordEmbed::char_len).sum();
            assert!(size <= MAX_MESSAGE_CHARS);
        }
    }

    #[derive(Clone, Default)]
    struct Webhook {
        bodies: Arc<Mutex<Vec<Value>>>,
        failures_left: Arc<Mutex<u32>>,
    }

    async fn receive(State(hook): State<Webhook>, Json(body): Json<Value>) -> StatusCode {
        let mut failures = hook.failures_left.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        hook.bodies.lock().unwrap().push(body);
        StatusCode::NO_CONTENT
    }

    async fn webhook(failures: u32) -> (String, Webhook) {
        let hook = Webhook::default();
        *hook.failures_left.lock().unwrap() = failures;
        let router = Router::new()
            .route("/hook", post(receive))
            .with_state(hook.clone());
        (format!("{}/hook", serve(router).await), hook)
    }

    #[tokio::test]
    async fn posts_every_chunk() {
        let (url, hook) = webhook(0).await;
        let notifier = DiscordNotifier::new(url);
        let entries: Vec<_> = (0..12).map(|i| entry(i, 0)).collect();

        notifier.send_batch(&entries).await.unwrap();

        let bodies = hook.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0]["embeds"].as_array().unwrap().len(), 10);
        assert_eq!(bodies[1]["embeds"][0]["title"], "Entry 10");
    }

    #[tokio::test]
    async fn retries_server_errors() {
        let (url, hook) = webhook(1).await;
        let notifier = DiscordNotifier::new(url);
        notifier.send_batch(&[entry(0, 0)]).await.unwrap();
        assert_eq!(hook.bodies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_retries() {
        let (url, hook) = webhook(10).await;
        let notifier = DiscordNotifier::new(url).with_retries(2);
        assert!(notifier.send_batch(&[entry(0, 0)]).await.is_err());
        assert!(hook.bodies.lock().unwrap().is_empty());
    }

    #[test]
    fn stdout_line_format() {
        let line = format_entry_line(&entry(3, 5));
        assert!(line.starts_with("[5] Entry 3 (Feed / security)"));
        assert!(line.contains("https://example.com/3"));
    }
}
