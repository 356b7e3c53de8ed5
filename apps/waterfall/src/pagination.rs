//! Pagination Controller — the load lock, page cursor and exhaustion flag.
//!
//! ```text
//!   Idle ──begin_load──▶ Loading ──complete_page──▶ Idle
//!                          │  └──abort_load───────▶ Idle      (cursor unchanged)
//!                          └──(last page seen)────▶ Exhausted (sticky)
//! ```
//!
//! The controller owns no I/O. It builds the request for the current cursor
//! and records what happened; the orchestrator performs the fetch.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{WaterfallConfig, PAGE_INDEX_PLACEHOLDER};
use crate::source::SourceError;

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    Idle,
    Loading,
    Exhausted,
}

/// Why `load_next_page` did not produce a page.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Another page load is in progress")]
    Busy,

    #[error("No more pages")]
    Exhausted,

    #[error("Page {page} could not be fetched: {source}")]
    Transport {
        page: u64,
        #[source]
        source: SourceError,
    },

    #[error("Page {page} response is not a list of items")]
    Parse { page: u64 },

    #[error("Page {page} task failed: {message}")]
    Internal { page: u64, message: String },
}

/// A fully built request for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub page_index: u64,
    pub url: String,
    /// Query parameters, empty for template URLs.
    pub query: Vec<(String, String)>,
}

/// How page requests are addressed.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestStrategy {
    /// Every `{{pno}}` (any case) in the template is replaced by the page index.
    UrlTemplate(String),
    /// Fixed URL plus parameters, with the page index under `page_index_param`.
    Params {
        url: String,
        params: serde_json::Map<String, Value>,
        page_index_param: String,
    },
}

impl RequestStrategy {
    /// Template wins when it actually contains the placeholder.
    pub fn from_config(config: &WaterfallConfig) -> Self {
        if find_placeholder(&config.url_template, 0).is_some() {
            RequestStrategy::UrlTemplate(config.url_template.clone())
        } else {
            RequestStrategy::Params {
                url: config.request_url.clone(),
                params: config.request_params.clone(),
                page_index_param: config.page_index_param.clone(),
            }
        }
    }

    pub fn build(&self, page_index: u64) -> PageRequest {
        match self {
            RequestStrategy::UrlTemplate(template) => PageRequest {
                page_index,
                url: substitute_page_index(template, page_index),
                query: Vec::new(),
            },
            RequestStrategy::Params {
                url,
                params,
                page_index_param,
            } => {
                let mut params = params.clone();
                params.insert(page_index_param.clone(), Value::from(page_index));
                PageRequest {
                    page_index,
                    url: url.clone(),
                    query: params
                        .into_iter()
                        .map(|(k, v)| (k, query_value(v)))
                        .collect(),
                }
            }
        }
    }
}

/// One completed page, kept for the layout's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRecord {
    pub page_index: u64,
    pub item_count: usize,
    pub placed: usize,
    pub failed: usize,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationSnapshot {
    pub state: PageState,
    pub cursor: u64,
    pub history: Vec<PageRecord>,
}

// ────────────────────────────────────────────────────────────────────────────
// Controller
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PaginationController {
    strategy: RequestStrategy,
    state: PageState,
    cursor: u64,
    /// Set as soon as a response reports the last page; applied when the cycle ends.
    last_page_seen: bool,
    history: Vec<PageRecord>,
}

impl PaginationController {
    pub fn new(strategy: RequestStrategy, start_page_index: u64) -> Self {
        Self {
            strategy,
            state: PageState::Idle,
            cursor: start_page_index,
            last_page_seen: false,
            history: Vec::new(),
        }
    }

    pub fn from_config(config: &WaterfallConfig) -> Self {
        Self::new(RequestStrategy::from_config(config), config.start_page_index)
    }

    /// Takes the load lock and builds the request for the current cursor.
    pub fn begin_load(&mut self) -> Result<PageRequest, LoadError> {
        match self.state {
            PageState::Loading => {
                warn!(page = self.cursor, "Another page load is in progress, request ignored");
                Err(LoadError::Busy)
            }
            PageState::Exhausted => {
                info!("No more pages to load");
                Err(LoadError::Exhausted)
            }
            PageState::Idle => {
                self.state = PageState::Loading;
                Ok(self.strategy.build(self.cursor))
            }
        }
    }

    /// Records that the in-flight response is the final page.
    pub fn mark_last_page(&mut self) {
        self.last_page_seen = true;
    }

    /// Ends a successful cycle: advances the cursor and releases the lock.
    pub fn complete_page(&mut self, item_count: usize, placed: usize, failed: usize) {
        self.history.push(PageRecord {
            page_index: self.cursor,
            item_count,
            placed,
            failed,
            completed_at: Utc::now(),
        });
        self.cursor += 1;
        self.release();
    }

    /// Ends a failed cycle without moving the cursor, so the page can be retried.
    pub fn abort_load(&mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.state = if self.last_page_seen {
            PageState::Exhausted
        } else {
            PageState::Idle
        };
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn snapshot(&self) -> PaginationSnapshot {
        PaginationSnapshot {
            state: self.state,
            cursor: self.cursor,
            history: self.history.clone(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ────────────────────────────────────────────────────────────────────────────

/// Byte offset of the next `{{pno}}` at or after `from`, ignoring ASCII case.
fn find_placeholder(template: &str, from: usize) -> Option<usize> {
    let needle = PAGE_INDEX_PLACEHOLDER.as_bytes();
    let haystack = template.as_bytes();
    if haystack.len() < needle.len() {
        return None;
    }
    (from..=haystack.len() - needle.len())
        .find(|&i| haystack[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

pub(crate) fn substitute_page_index(template: &str, page_index: u64) -> String {
    let index = page_index.to_string();
    let mut out = String::with_capacity(template.len());
    let mut rest = 0;
    while let Some(at) = find_placeholder(template, rest) {
        out.push_str(&template[rest..at]);
        out.push_str(&index);
        rest = at + PAGE_INDEX_PLACEHOLDER.len();
    }
    out.push_str(&template[rest..]);
    out
}

fn query_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
