//! Utility functions for feed processing.

use encoding_rs::{Encoding, UTF_8};
use std::borrow::Cow;

/// How far into a body to look for an XML declaration or `<meta charset>`.
const SNIFF_BYTES: usize = 1024;

/// Helper function to validate a URL
pub fn is_valid_url(url: &str) -> bool {
    if let Ok(parsed) = url::Url::parse(url) {
        parsed.scheme() == "http" || parsed.scheme() == "https"
    } else {
        false
    }
}

/// Absent or whitespace-only counts as empty.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Keeps at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Like [`truncate_chars`] but marks the cut with `...`.
pub fn cap_with_ellipsis(s: &str, max: usize) -> String {
    let head = truncate_chars(s, max);
    if head.len() < s.len() {
        format!("{}...", head)
    } else {
        head.to_string()
    }
}

/// Clean up malformed XML so the parser gets a second chance.
pub fn cleanup_xml(xml: &str) -> String {
    let mut cleaned = xml.trim().trim_start_matches('\u{FEFF}').to_string();

    // Drop anything in front of the document proper
    if let Some(xml_start) = cleaned.find("<?xml") {
        cleaned = cleaned[xml_start..].to_string();
    } else if let Some(rss_start) = cleaned.find("<rss") {
        cleaned = cleaned[rss_start..].to_string();
    } else if let Some(feed_start) = cleaned.find("<feed") {
        cleaned = cleaned[feed_start..].to_string();
    }

    // HTML named entities are undefined in XML
    cleaned = cleaned
        .replace("&nbsp;", "&#160;")
        .replace("&ndash;", "&#8211;")
        .replace("&mdash;", "&#8212;")
        .replace("&rsquo;", "&#8217;")
        .replace("&lsquo;", "&#8216;")
        .replace("&rdquo;", "&#8221;")
        .replace("&ldquo;", "&#8220;")
        .replace("&hellip;", "&#8230;")
        .replace("&copy;", "&#169;")
        .replace("&reg;", "&#174;")
        .replace("&trade;", "&#8482;")
        .replace("&amp;amp;", "&amp;");

    cleaned
        .chars()
        .filter(|&c| {
            matches!(c,
                '\u{0009}' | // tab
                '\u{000A}' | // newline
                '\u{000D}' | // carriage return
                '\u{0020}'..='\u{D7FF}' |
                '\u{E000}'..='\u{FFFD}' |
                '\u{10000}'..='\u{10FFFF}'
            )
        })
        .collect()
}

/// `charset` parameter of a Content-Type header value.
pub fn charset_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').find_map(|part| {
        let (name, value) = part.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches(|c: char| c == '"' || c == '\'');
        (!value.is_empty()).then_some(value)
    })
}

/// Encoding named by an XML declaration or an HTML `<meta>` tag near the
/// start of the document.
fn sniff_declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(SNIFF_BYTES)]).to_ascii_lowercase();
    for marker in ["encoding=", "charset="] {
        let Some(pos) = head.find(marker) else {
            continue;
        };
        let label: String = head[pos + marker.len()..]
            .trim_start_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace())
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(*c, '-' | '_' | '.' | ':'))
            .collect();
        if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
            // A document that could be read as ASCII this far is not UTF-16
            return Some(encoding.output_encoding());
        }
    }
    None
}

/// Decodes a response body to text.
///
/// The encoding comes from the Content-Type charset, else a byte order mark,
/// else the document's own declaration, else UTF-8. Returns the text and
/// the encoding used. The XML declaration, if any, is rewritten to name
/// UTF-8 to match the returned text.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> (String, &'static Encoding) {
    let encoding = content_type
        .and_then(charset_from_content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| Encoding::for_bom(bytes).map(|(encoding, _)| encoding))
        .or_else(|| sniff_declared_encoding(bytes))
        .unwrap_or(UTF_8);

    let (text, used, _) = encoding.decode(bytes);
    let text = declare_utf8(&text).into_owned();
    (text, used)
}

/// Replaces the `encoding` pseudo-attribute of a leading XML declaration
/// with `UTF-8`.
pub fn declare_utf8(text: &str) -> Cow<'_, str> {
    let Some(start) = text.find("<?xml") else {
        return Cow::Borrowed(text);
    };
    if !text[..start].trim().is_empty() {
        return Cow::Borrowed(text);
    }
    let Some(decl_len) = text[start..].find("?>") else {
        return Cow::Borrowed(text);
    };
    let decl = &text[start..start + decl_len];
    let Some(attr) = decl.find("encoding=") else {
        return Cow::Borrowed(text);
    };
    let value_start = start + attr + "encoding=".len();
    let Some(quote) = text[value_start..].chars().next().filter(|c| *c == '"' || *c == '\'') else {
        return Cow::Borrowed(text);
    };
    let Some(value_len) = text[value_start + 1..].find(quote) else {
        return Cow::Borrowed(text);
    };
    let value_end = value_start + 1 + value_len;
    Cow::Owned(format!("{}UTF-8{}", &text[..value_start + 1], &text[value_end..]))
}
