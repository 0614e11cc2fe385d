//! HTTP client creation and request handling for feeds and article pages.

use reqwest::{cookie::Jar, header};
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::types::FeedError;
use super::util::{decode_body, is_valid_url};
use crate::TARGET_WEB_REQUEST;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const FEED_ACCEPT: &str = "application/feed+json, application/json, application/rss+xml, application/atom+xml, application/xml, text/xml, */*;q=0.9";
const PAGE_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Client with a cookie jar, transparent gzip and default redirects.
pub fn create_http_client() -> Result<reqwest::Client, FeedError> {
    let cookie_store = Jar::default();
    let client = reqwest::Client::builder()
        .cookie_store(true)
        .cookie_provider(Arc::new(cookie_store))
        .gzip(true)
        .redirect(reqwest::redirect::Policy::default())
        .build()?;
    Ok(client)
}

/// A fetched body decoded to text, with the response's content type
/// (lowercased) and the name of the encoding it was decoded from.
#[derive(Debug)]
pub struct FetchedBody {
    pub body: String,
    pub content_type: Option<String>,
    pub encoding: &'static str,
}

/// Single GET with browser headers. Non-success statuses are errors.
///
/// The body is read as bytes and decoded by [`decode_body`], so a charset
/// declared only inside the document is honoured.
pub async fn fetch_body(
    client: &reqwest::Client,
    url: &str,
    accept: &str,
    limit: Duration,
) -> Result<FetchedBody, FeedError> {
    if !is_valid_url(url) {
        return Err(FeedError::InvalidUrl(url.to_string()));
    }

    debug!(target: TARGET_WEB_REQUEST, "GET {}", url);

    let request = async {
        let response = client
            .get(url)
            .header(header::USER_AGENT, BROWSER_USER_AGENT)
            .header(header::ACCEPT, accept)
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9,ja;q=0.8")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|s| s.to_lowercase());

        let bytes = response.bytes().await?;
        let (body, encoding) = decode_body(&bytes, content_type.as_deref());
        Ok::<_, FeedError>(FetchedBody {
            body,
            content_type,
            encoding: encoding.name(),
        })
    };

    match timeout(limit, request).await {
        Ok(result) => {
            if let Ok(fetched) = &result {
                debug!(target: TARGET_WEB_REQUEST, "GET {} returned {} bytes ({:?}, {})", url, fetched.body.len(), fetched.content_type, fetched.encoding);
            }
            result
        }
        Err(_) => Err(FeedError::Timeout(limit)),
    }
}

pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    limit: Duration,
) -> Result<FetchedBody, FeedError> {
    fetch_body(client, url, FEED_ACCEPT, limit).await
}

pub async fn fetch_page(
    client: &reqwest::Client,
    url: &str,
    limit: Duration,
) -> Result<FetchedBody, FeedError> {
    fetch_body(client, url, PAGE_ACCEPT, limit).await
}
