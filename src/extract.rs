//! Article text extraction.
//!
//! Fetches the page behind an entry's link and reduces it to readable plain
//! text: page chrome (navigation, headers, footers, asides) and scripts are
//! dropped, the main content container is chosen, and the result is one
//! trimmed line per block of text.

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tokio::time::Duration;
use tracing::{debug, warn};

use crate::feed::{create_http_client, fetch_page, FeedError};
use crate::TARGET_WEB_REQUEST;

pub const PAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Subtrees that never contribute text.
const EXCLUDED_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "noscript", "template",
];

/// Tried in order; the first match outside an excluded region wins.
const CONTAINER_TAGS: &[&str] = &["article", "main", "body"];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "blockquote", "dd", "div", "dl", "dt", "figcaption", "figure", "form",
    "h1", "h2", "h3", "h4", "h5", "h6", "hr", "li", "main", "ol", "p", "pre", "section", "table",
    "td", "th", "tr", "ul",
];

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("entry has no link")]
    NoLink,

    #[error(transparent)]
    Fetch(#[from] FeedError),
}

pub struct ContentExtractor {
    client: reqwest::Client,
    timeout: Duration,
}

impl ContentExtractor {
    pub fn new() -> Result<Self, FeedError> {
        Ok(Self {
            client: create_http_client()?,
            timeout: PAGE_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Plain text of the article at `url`; empty when anything goes wrong.
    pub async fn extract(&self, url: &str) -> String {
        match self.try_extract(url).await {
            Ok(text) => text,
            Err(err) => {
                warn!(target: TARGET_WEB_REQUEST, "Article extraction failed for {}: {}", url, err);
                String::new()
            }
        }
    }

    pub async fn try_extract(&self, url: &str) -> Result<String, ExtractError> {
        if url.trim().is_empty() {
            return Err(ExtractError::NoLink);
        }
        let page = fetch_page(&self.client, url, self.timeout).await?;
        let text = extract_text(&page.body);
        debug!(target: TARGET_WEB_REQUEST, "Extracted {} chars of article text from {}", text.chars().count(), url);
        Ok(text)
    }
}

fn is_excluded(name: &str) -> bool {
    EXCLUDED_TAGS.contains(&name)
}

fn inside_excluded(element: &ElementRef) -> bool {
    element
        .ancestors()
        .filter_map(|node| node.value().as_element())
        .any(|el| is_excluded(el.name()))
}

fn find_container<'a>(document: &'a Html) -> Option<ElementRef<'a>> {
    CONTAINER_TAGS.iter().find_map(|tag| {
        let selector = Selector::parse(tag).ok()?;
        document.select(&selector).find(|el| !inside_excluded(el))
    })
}

/// Appends `text` with internal whitespace runs collapsed to one space.
fn push_collapsed(out: &mut String, text: &str) {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        if !text.is_empty() {
            out.push(' ');
        }
        return;
    }
    if text.starts_with(char::is_whitespace) {
        out.push(' ');
    }
    out.push_str(&words.join(" "));
    if text.ends_with(char::is_whitespace) {
        out.push(' ');
    }
}

fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_collapsed(out, &text.text),
            Node::Element(el) => {
                let name = el.name();
                if is_excluded(name) {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push('\n');
                }
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, out);
                }
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Readable text of an HTML document: one trimmed, non-blank line per
/// block, taken from the first `article`, else `main`, else `body`.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let Some(container) = find_container(&document) else {
        return String::new();
    };

    let mut raw = String::new();
    collect_text(container, &mut raw);

    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Plain text of an HTML fragment, for feed summaries.
pub fn fragment_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut raw = String::new();
    collect_text(fragment.root_element(), &mut raw);
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{serve_bytes, serve_page};

    #[test]
    fn nav_is_dropped_and_article_kept() {
        let html = "<html><body><nav>Menu</nav><article>Hello World</article></body></html>";
        assert_eq!(extract_text(html), "Hello World");
    }

    #[test]
    fn falls_back_to_main_then_body() {
        let main = "<html><body><header>Site</header><main><p>Main text</p></main><footer>c</footer></body></html>";
        assert_eq!(extract_text(main), "Main text");

        let body = "<html><body><script>var x = 1;</script><p>One</p><p>Two</p><aside>ad</aside></body></html>";
        assert_eq!(extract_text(body), "One\nTwo");
    }

    #[test]
    fn article_inside_excluded_region_is_skipped() {
        let html = "<html><body><aside><article>Related</article></aside><article>Real story</article></body></html>";
        assert_eq!(extract_text(html), "Real story");
    }

    #[test]
    fn blocks_become_lines_and_inline_text_joins() {
        let html = "<article><h1>Title</h1>\n  <p>Some <b>bold</b>\n   text.</p><p>Line<br>break</p><style>p{}</style></article>";
        assert_eq!(extract_text(html), "Title\nSome bold text.\nLine\nbreak");
    }

    #[test]
    fn empty_document_gives_empty_text() {
        assert_eq!(extract_text(""), "");
    }

    #[test]
    fn fragment_text_strips_tags() {
        assert_eq!(fragment_text("<p>Hello <b>there</b></p>"), "Hello there");
    }

    #[tokio::test]
    async fn extracts_from_served_page() {
        let url = serve_page("<html><body><nav>Menu</nav><article><p>Hello World</p></article></body></html>").await;
        let extractor = ContentExtractor::new().unwrap();
        assert_eq!(extractor.extract(&url).await, "Hello World");
    }

    #[tokio::test]
    async fn shift_jis_page_is_decoded_from_meta_charset() {
        let html = "<html><head><meta charset=\"Shift_JIS\"><title>JP</title></head>\
            <body><article><p>脆弱性情報</p></article></body></html>";
        let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode(html);
        let url = serve_bytes("/article", "text/html", bytes.into_owned()).await;
        let extractor = ContentExtractor::new().unwrap();
        assert_eq!(extractor.extract(&url).await, "脆弱性情報");
    }

    #[tokio::test]
    async fn failures_give_empty_text() {
        let extractor = ContentExtractor::new()
            .unwrap()
            .with_timeout(Duration::from_secs(2));
        assert_eq!(extractor.extract("").await, "");
        assert_eq!(extractor.extract("not a url").await, "");
        assert_eq!(extractor.extract("http://127.0.0.1:1/article").await, "");
    }
}
