//! In-process HTTP servers for tests.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Serves an RSS body at `/feed` and returns that URL.
pub async fn serve_feed(xml: String) -> String {
    let router = Router::new().route(
        "/feed",
        get(move || {
            let xml = xml.clone();
            async move { ([(header::CONTENT_TYPE, "application/rss+xml")], xml) }
        }),
    );
    format!("{}/feed", serve(router).await)
}

/// Serves an HTML page at `/article` and returns that URL.
pub async fn serve_page(html: &str) -> String {
    let html = html.to_string();
    let router = Router::new().route(
        "/article",
        get(move || {
            let html = html.clone();
            async move { ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html) }
        }),
    );
    format!("{}/article", serve(router).await)
}

/// Serves raw bytes at `path` with the given content type and returns
/// that URL.
pub async fn serve_bytes(path: &'static str, content_type: &'static str, body: Vec<u8>) -> String {
    let router = Router::new().route(
        path,
        get(move || {
            let body = body.clone();
            async move { ([(header::CONTENT_TYPE, content_type)], body) }
        }),
    );
    format!("{}{}", serve(router).await, path)
}

/// RSS 2.0 document from `(title, link, pubDate)` triples.
pub fn rss_document(items: &[(String, String, String)]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\"><channel><title>Test</title>\n",
    );
    for (title, link, date) in items {
        xml.push_str(&format!(
            "<item><title>{}</title><link>{}</link><description>About {}</description><pubDate>{}</pubDate></item>\n",
            title, link, title, date
        ));
    }
    xml.push_str("</channel></rss>\n");
    xml
}

#[derive(Clone)]
struct OllamaState {
    hits: Arc<AtomicUsize>,
    response: String,
    delay: Duration,
}

/// Fake Ollama API: `/api/generate` answers `response` after `delay`,
/// `/api/tags` lists no models. Every request bumps the returned counter.
pub async fn serve_ollama(response: &str, delay: Duration) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = OllamaState {
        hits: hits.clone(),
        response: response.to_string(),
        delay,
    };
    let router = Router::new()
        .route("/api/generate", post(generate))
        .route("/api/tags", get(tags))
        .with_state(state);
    (serve(router).await, hits)
}

async fn generate(State(state): State<OllamaState>, _body: Bytes) -> Json<Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(state.delay).await;
    Json(json!({
        "model": "test",
        "created_at": "2024-01-01T00:00:00Z",
        "response": state.response,
        "done": true
    }))
}

async fn tags(State(state): State<OllamaState>) -> Json<Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "models": [] }))
}

#[derive(Clone)]
struct BrokenOllamaState {
    hits: Arc<AtomicUsize>,
    status_error: bool,
}

/// Ollama stand-in whose `/api/generate` fails: HTTP 500 when
/// `status_error`, otherwise 200 with a body that is not JSON. `/api/tags`
/// answers normally.
pub async fn serve_broken_ollama(status_error: bool) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = BrokenOllamaState {
        hits: hits.clone(),
        status_error,
    };
    let router = Router::new()
        .route("/api/generate", post(broken_generate))
        .route("/api/tags", get(|| async { Json(json!({ "models": [] })) }))
        .with_state(state);
    (serve(router).await, hits)
}

async fn broken_generate(State(state): State<BrokenOllamaState>, _body: Bytes) -> (StatusCode, String) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if state.status_error {
        (StatusCode::INTERNAL_SERVER_ERROR, "model runner crashed".to_string())
    } else {
        (StatusCode::OK, "<html>upstream proxy error</html>".to_string())
    }
}
