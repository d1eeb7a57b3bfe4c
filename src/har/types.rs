//! HAR 1.2 data model
//!
//! In-memory representation of captured HTTP transactions and the archive
//! container, serialized in the camelCase layout the HAR spec defines.
//! Optional fields are omitted on the wire, matching archives produced by
//! browser devtools.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// HAR schema version emitted by this crate
pub const HAR_VERSION: &str = "1.2";

/// Sentinel status for an entry whose response was never observed
pub const STATUS_UNRESOLVED: i64 = -1;

/// Top-level HTTP Archive object: `{"log": {...}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Har {
    /// The log of recorded network activity
    pub log: Log,
}

/// The recorded network activity: pages visited and HTTP transactions seen
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Log {
    /// HAR schema version (always "1.2")
    pub version: String,
    /// Tool that produced the archive
    pub creator: Creator,
    /// Browser targets that were listened to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<Page>,
    /// Finalized transactions, in completion order
    #[serde(default)]
    pub entries: Vec<Entry>,
}

/// Tool metadata, required by the HAR 1.2 spec
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    /// Producing tool name
    pub name: String,
    /// Producing tool version
    pub version: String,
}

impl Creator {
    /// Creator record for this crate
    pub fn this_crate() -> Self {
        Self {
            name: crate::NAME.to_string(),
            version: crate::VERSION.to_string(),
        }
    }
}

/// One browser target/tab that entries may reference via `pageref`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Target identifier, referenced by `Entry::pageref`
    pub id: String,
    /// When the recorder attached to the target (RFC3339, UTC)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub started_date_time: String,
    /// Page title
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Page-level timings (unpopulated by the recorder)
    #[serde(default)]
    pub page_timings: PageTimings,
}

/// Page-level load timings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTimings {
    /// Milliseconds until `DOMContentLoaded`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_content_load: Option<f64>,
    /// Milliseconds until the load event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_load: Option<f64>,
}

/// One finalized HTTP transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Request start (RFC3339 with nanosecond precision, UTC)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub started_date_time: String,
    /// Total elapsed time in milliseconds
    #[serde(default, skip_serializing_if = "is_zero")]
    pub time: f64,
    /// Weak reference to the originating page, resolved by id lookup only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pageref: Option<String>,
    /// The outgoing request
    pub request: Request,
    /// The observed response, sentinel until one arrives
    pub response: Response,
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

/// The outgoing HTTP request line, headers, and optional body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// HTTP method
    pub method: String,
    /// Full request URL
    pub url: String,
    /// Protocol version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub http_version: String,
    /// Request headers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
    /// Request body, when one was sent and buffered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_data: Option<PostData>,
}

/// The incoming HTTP response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// HTTP status code, or [`STATUS_UNRESOLVED`] if none arrived
    pub status: i64,
    /// Status text
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status_text: String,
    /// Protocol version reported by the browser
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub http_version: String,
    /// Response headers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
    /// Response body metadata and, when fetched, its content
    #[serde(default)]
    pub content: Content,
}

impl Default for Response {
    fn default() -> Self {
        Self::unresolved()
    }
}

impl Response {
    /// A placeholder response for a request that has not been answered yet
    pub fn unresolved() -> Self {
        Self {
            status: STATUS_UNRESOLVED,
            status_text: String::new(),
            http_version: String::new(),
            headers: Vec::new(),
            content: Content::default(),
        }
    }

    /// Whether a real response was recorded for this entry
    pub fn is_resolved(&self) -> bool {
        self.status != STATUS_UNRESOLVED
    }
}

/// A single HTTP header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Header name, case preserved as delivered by the browser
    pub name: String,
    /// Header value
    pub value: String,
}

impl Header {
    /// Create a header pair
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Look up a header value by case-insensitive name
pub fn header_value<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Request body data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostData {
    /// MIME type taken from the request `content-type` header
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mime_type: String,
    /// Reassembled body text
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
}

/// Response body metadata and content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    /// Encoded body size in bytes as reported by the browser
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub size: i64,
    /// Response MIME type
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mime_type: String,
    /// Body content, present only when the fetch succeeded
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    /// Body text encoding, `"base64"` when captured by this crate
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub encoding: String,
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

/// Format a timestamp the way HAR entries expect: RFC3339, nanosecond
/// precision, UTC with a trailing `Z`.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

impl Har {
    /// Build an archive from captured pages and entries
    pub fn from_capture(creator: Creator, pages: Vec<Page>, entries: Vec<Entry>) -> Self {
        Self {
            log: Log {
                version: HAR_VERSION.to_string(),
                creator,
                pages,
                entries,
            },
        }
    }
}
