//! Feed parsing for RSS 2.0, RSS 1.0 (RDF), Atom and JSON Feed.

use feed_rs::model::{Entry, Link};
use feed_rs::parser;
use tracing::debug;

use super::date::parse_datetime;
use super::types::{FeedError, JsonFeed, RawEntry};
use super::util::{cleanup_xml, non_empty};
use crate::TARGET_WEB_REQUEST;

const FEED_ROOT_MARKERS: &[&str] = &["<rss", "<feed", "<rdf:RDF", "<RDF"];

/// Parse a feed body, choosing JSON Feed or XML from the content type and
/// the body itself.
pub fn parse_feed(body: &str, content_type: Option<&str>) -> Result<Vec<RawEntry>, FeedError> {
    let looks_json = content_type.is_some_and(|ct| ct.contains("json"))
        || body.trim_start_matches('\u{FEFF}').trim_start().starts_with('{');
    if looks_json {
        return parse_json_feed(body);
    }

    match parse_xml_feed(body) {
        Ok(entries) => Ok(entries),
        Err(first_err) => {
            let cleaned = cleanup_xml(body);
            if !FEED_ROOT_MARKERS.iter().any(|marker| cleaned.contains(marker)) {
                return Err(FeedError::NotAFeed(preview(body)));
            }
            debug!(target: TARGET_WEB_REQUEST, "Feed parse failed ({}), retrying on cleaned copy", first_err);
            parse_xml_feed(&cleaned)
        }
    }
}

pub fn parse_json_feed(body: &str) -> Result<Vec<RawEntry>, FeedError> {
    let feed: JsonFeed = serde_json::from_str(body.trim_start_matches('\u{FEFF}'))?;
    Ok(feed.items.into_iter().map(RawEntry::from).collect())
}

/// Parses RSS, RDF or Atom with feed-rs.
///
/// Timestamps go through [`parse_datetime`], so zone abbreviations resolve
/// through the same table everywhere. Entries without a guid/id keep `id`
/// empty rather than getting a generated one.
pub fn parse_xml_feed(xml: &str) -> Result<Vec<RawEntry>, FeedError> {
    let parser = parser::Builder::new()
        .timestamp_parser(parse_datetime)
        .id_generator(|_links, _title, _uri| String::new())
        .build();
    let feed = parser.parse(xml.trim_start_matches('\u{FEFF}').as_bytes())?;
    Ok(feed.entries.into_iter().map(raw_entry).collect())
}

fn raw_entry(entry: Entry) -> RawEntry {
    let summary = entry
        .summary
        .map(|text| text.content)
        .filter(|s| !s.trim().is_empty())
        .or_else(|| entry.content.and_then(|content| content.body));

    RawEntry {
        id: non_empty(Some(entry.id.as_str())).map(str::to_string),
        link: preferred_link(&entry.links),
        title: entry.title.map(|text| text.content),
        summary,
        published: entry.published.map(|date| date.to_rfc3339()),
        updated: entry.updated.map(|date| date.to_rfc3339()),
        created: None,
    }
}

/// The alternate (or rel-less) link, else whatever link comes first.
fn preferred_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|link| matches!(link.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .and_then(|link| non_empty(Some(link.href.as_str())))
        .map(str::to_string)
}

fn preview(body: &str) -> String {
    let head: String = body.trim().chars().take(100).collect();
    if head.chars().all(|c| !c.is_control() || c.is_whitespace()) {
        head
    } else {
        "[binary data]".to_string()
    }
}
