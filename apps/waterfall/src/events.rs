//! Lifecycle callbacks of a waterfall layout.

use serde_json::Value;
use tracing::{debug, info, warn};

/// Observer of page and tile lifecycle events. Every method defaults to a no-op.
///
/// Callbacks run on the loading task, sometimes with the layout locked, so they
/// must not call back into the same `Waterfall`.
pub trait WaterfallEvents: Send + Sync {
    /// A page and all of its probes have resolved.
    fn on_page_loaded(&self, _raw: &Value) {}

    /// One tile was placed and inserted into the container.
    fn on_item_rendered(&self, _item: &Value) {}

    /// One item produced no tile (malformed item or failed probe).
    fn on_item_failed(&self, _item: &Value, _reason: &str) {}

    /// `load_next_page` was called after the last page.
    fn on_no_more_pages(&self) {}
}

/// Logs every event through `tracing`, tagged with a layout label.
pub struct TracingEvents {
    label: String,
}

impl TracingEvents {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl WaterfallEvents for TracingEvents {
    fn on_page_loaded(&self, _raw: &Value) {
        info!(layout = %self.label, "Page loaded");
    }

    fn on_item_rendered(&self, item: &Value) {
        debug!(layout = %self.label, %item, "Tile rendered");
    }

    fn on_item_failed(&self, item: &Value, reason: &str) {
        warn!(layout = %self.label, %item, reason, "Tile skipped");
    }

    fn on_no_more_pages(&self) {
        info!(layout = %self.label, "No more pages");
    }
}
