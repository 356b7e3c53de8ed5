use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::layout::{ColumnPolicy, Spacing};
use crate::source::ResponseFormat;

/// Service configuration loaded from environment variables.
/// Every variable is optional; malformed values fail startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub rust_log: String,
    /// Timeout for page fetches and asset probes.
    pub http_timeout: Duration,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(ServiceConfig {
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            http_timeout: Duration::from_secs(parse_env("HTTP_TIMEOUT_SECS", 30)?),
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Per-layout configuration
// ────────────────────────────────────────────────────────────────────────────

pub const DEFAULT_REFLOW_INTERVAL_MS: u64 = 300;
pub const PAGE_INDEX_PLACEHOLDER: &str = "{{pno}}";

/// Every recognized option of one waterfall layout, with its default.
/// Unknown keys are rejected at deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaterfallConfig {
    /// Gap between tiles and around the container edge, in pixels.
    pub margin: f64,
    pub horizontal_offset: f64,
    pub vertical_offset: f64,
    /// Blank space under the tallest column so freshly loaded tiles are visible.
    pub bottom_padding: f64,
    /// `> 0` pins the column count and disables `min_tile_width`.
    pub fixed_column_count: u32,
    pub min_tile_width: f64,
    /// Query parameter that carries the page index.
    pub page_index_param: String,
    /// First page index; some sources count from 1.
    pub start_page_index: u64,
    /// When it contains `{{pno}}`, overrides `request_url` and `request_params`.
    pub url_template: String,
    pub request_url: String,
    pub request_params: serde_json::Map<String, serde_json::Value>,
    pub request_data_format: ResponseFormat,
    /// Element tag that wraps each rendered tile.
    pub tile_tag: String,
    pub reflow_interval_ms: u64,
}

impl Default for WaterfallConfig {
    fn default() -> Self {
        Self {
            margin: 0.0,
            horizontal_offset: 0.0,
            vertical_offset: 0.0,
            bottom_padding: 50.0,
            fixed_column_count: 0,
            min_tile_width: 100.0,
            page_index_param: "pno".to_string(),
            start_page_index: 0,
            url_template: String::new(),
            request_url: String::new(),
            request_params: serde_json::Map::new(),
            request_data_format: ResponseFormat::Json,
            tile_tag: "li".to_string(),
            reflow_interval_ms: DEFAULT_REFLOW_INTERVAL_MS,
        }
    }
}

impl WaterfallConfig {
    pub fn column_policy(&self) -> ColumnPolicy {
        if self.fixed_column_count > 0 {
            ColumnPolicy::Fixed(self.fixed_column_count)
        } else {
            ColumnPolicy::MinTileWidth(self.min_tile_width)
        }
    }

    pub fn spacing(&self) -> Spacing {
        Spacing {
            horizontal_offset: self.horizontal_offset,
            vertical_offset: self.vertical_offset,
            bottom_padding: self.bottom_padding,
        }
    }

    pub fn reflow_interval(&self) -> Duration {
        Duration::from_millis(self.reflow_interval_ms.max(1))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = WaterfallConfig::default();
        assert_eq!(config.bottom_padding, 50.0);
        assert_eq!(config.min_tile_width, 100.0);
        assert_eq!(config.page_index_param, "pno");
        assert_eq!(config.tile_tag, "li");
        assert_eq!(config.reflow_interval_ms, 300);
        assert_eq!(config.column_policy(), ColumnPolicy::MinTileWidth(100.0));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: WaterfallConfig =
            serde_json::from_value(json!({ "margin": 10, "fixed_column_count": 3 })).unwrap();
        assert_eq!(config.margin, 10.0);
        assert_eq!(config.column_policy(), ColumnPolicy::Fixed(3));
        assert_eq!(config.bottom_padding, 50.0);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result: Result<WaterfallConfig, _> =
            serde_json::from_value(json!({ "margn": 10 }));
        assert!(result.is_err());
    }

    #[test]
    fn test_request_data_format_parses() {
        let config: WaterfallConfig =
            serde_json::from_value(json!({ "request_data_format": "text" })).unwrap();
        assert_eq!(config.request_data_format, ResponseFormat::Text);
    }

    #[test]
    fn test_reflow_interval_never_zero() {
        let config = WaterfallConfig {
            reflow_interval_ms: 0,
            ..WaterfallConfig::default()
        };
        assert_eq!(config.reflow_interval(), Duration::from_millis(1));
    }
}
