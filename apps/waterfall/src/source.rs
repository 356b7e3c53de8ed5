//! Data source boundary — fetching raw pages and reading items out of them.
//!
//! Transport (`DataSource`) and interpretation (`PageCodec`) are separate seams:
//! the same HTTP source serves any response shape, and tests substitute an
//! in-memory source without touching the codec.

use std::borrow::Cow;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::pagination::PageRequest;

/// How a page response body is decoded before it reaches the codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Body is decoded as JSON.
    #[default]
    Json,
    /// Body is handed over verbatim as a JSON string.
    Text,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Data source returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Data source unavailable: {0}")]
    Unavailable(String),
}

// ────────────────────────────────────────────────────────────────────────────
// Traits
// ────────────────────────────────────────────────────────────────────────────

/// Fetches one raw page. Failures here are transport failures: the page is
/// retried by a later `load_next_page` call.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Value, SourceError>;
}

/// Interprets a raw page response.
pub trait PageCodec: Send + Sync {
    /// Items of the page, or `None` when the response is not a well-formed list.
    fn parse(&self, raw: &Value) -> Option<Vec<Value>>;

    /// Asset URL of one item. `None` or an empty string marks the item malformed.
    fn extract_url(&self, item: &Value) -> Option<String>;

    /// Whether this response is the final page.
    fn is_last_page(&self, raw: &Value) -> bool;
}

// ────────────────────────────────────────────────────────────────────────────
// HttpDataSource
// ────────────────────────────────────────────────────────────────────────────

/// GET-based data source over reqwest.
#[derive(Clone)]
pub struct HttpDataSource {
    client: Client,
    format: ResponseFormat,
}

impl HttpDataSource {
    /// Timeouts and other transport policy come from `client`.
    pub fn new(client: Client, format: ResponseFormat) -> Self {
        Self { client, format }
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Value, SourceError> {
        debug!(url = %request.url, page = request.page_index, "Fetching page");

        let response = self
            .client
            .get(&request.url)
            .query(&request.query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        match self.format {
            ResponseFormat::Json => Ok(response.json::<Value>().await?),
            ResponseFormat::Text => Ok(Value::String(response.text().await?)),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// JsonPageCodec
// ────────────────────────────────────────────────────────────────────────────

/// Codec for JSON page responses addressed by JSON pointers.
///
/// Defaults match the simplest source: the response itself is the item array,
/// every item carries its asset under `url`, and there is no last-page marker.
/// A text response is parsed as JSON first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JsonPageCodec {
    /// Pointer to the item array; empty for the root.
    pub items_pointer: String,
    /// Field name of the asset URL, or a pointer when it starts with `/`.
    pub url_field: String,
    /// Pointer to a boolean that is `true` on the last page.
    pub last_page_pointer: Option<String>,
}

impl Default for JsonPageCodec {
    fn default() -> Self {
        Self {
            items_pointer: String::new(),
            url_field: "url".to_string(),
            last_page_pointer: None,
        }
    }
}

/// Unwraps a text-format response into JSON. Non-JSON text stays a string.
fn as_json(raw: &Value) -> Cow<'_, Value> {
    match raw {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed) => Cow::Owned(parsed),
            Err(_) => Cow::Borrowed(raw),
        },
        _ => Cow::Borrowed(raw),
    }
}

impl PageCodec for JsonPageCodec {
    fn parse(&self, raw: &Value) -> Option<Vec<Value>> {
        let raw = as_json(raw);
        raw.pointer(&self.items_pointer)
            .and_then(Value::as_array)
            .cloned()
    }

    fn extract_url(&self, item: &Value) -> Option<String> {
        let url = if self.url_field.starts_with('/') {
            item.pointer(&self.url_field)
        } else {
            item.get(&self.url_field)
        };
        url.and_then(Value::as_str)
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
    }

    fn is_last_page(&self, raw: &Value) -> bool {
        let Some(pointer) = &self.last_page_pointer else {
            return false;
        };
        as_json(raw)
            .pointer(pointer)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
