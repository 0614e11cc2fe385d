//! Feed ingestion.
//!
//! This module handles fetching feed documents, parsing RSS/Atom/JSON Feed
//! items and normalizing them into [`CanonicalEntry`] records.

mod client;
pub mod date;
pub mod identifier;
mod ingestor;
mod parser;
mod types;
mod util;

pub use self::client::{create_http_client, fetch_feed, fetch_page, FetchedBody, BROWSER_USER_AGENT};
pub use self::date::{parse_datetime, resolve_published};
pub use self::identifier::entry_id;
pub use self::ingestor::{canonicalize, FeedIngestor};
pub use self::parser::{parse_feed, parse_json_feed, parse_xml_feed};
pub use self::types::*;
pub use self::util::{cap_with_ellipsis, decode_body, is_valid_url, truncate_chars};
