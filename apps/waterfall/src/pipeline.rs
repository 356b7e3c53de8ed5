//! Probe Pipeline — turns one raw page into placed tiles.
//!
//! # Protocol
//! 1. `codec.parse` the response. Not a list ⇒ `ParseFailure`, nothing dispatched.
//! 2. Items without a usable URL count as failed immediately.
//! 3. Every other item is probed as its own task in a `JoinSet`.
//! 4. Completions are drained one at a time in the order they finish; each
//!    success is placed under the canvas lock, so placement order is
//!    completion order.
//! 5. `process_page` returns once every item is accounted for. Returning is the
//!    page-complete signal: it happens exactly once, after the last probe, and
//!    immediately for an empty page.
//!
//! No probe is ever cancelled. A failed or panicking probe only bumps the
//! failure count.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::canvas::SharedCanvas;
use crate::events::WaterfallEvents;
use crate::probe::{AssetProbe, Dimensions, ProbeError};
use crate::render::RenderHost;
use crate::source::PageCodec;

/// Collaborators one page needs.
pub struct PipelineContext<H> {
    pub codec: Arc<dyn PageCodec>,
    pub probe: Arc<dyn AssetProbe>,
    pub events: Arc<dyn WaterfallEvents>,
    pub canvas: SharedCanvas<H>,
}

impl<H> Clone for PipelineContext<H> {
    fn clone(&self) -> Self {
        Self {
            codec: Arc::clone(&self.codec),
            probe: Arc::clone(&self.probe),
            events: Arc::clone(&self.events),
            canvas: Arc::clone(&self.canvas),
        }
    }
}

/// Result of a completed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageOutcome {
    pub item_count: usize,
    pub placed: usize,
    pub failed: usize,
}

/// The page response was not a list of items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseFailure;

// ────────────────────────────────────────────────────────────────────────────
// Completion tracking
// ────────────────────────────────────────────────────────────────────────────

/// Per-page completion counter. The page is complete exactly when
/// `placed + failed == item_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionTracker {
    item_count: usize,
    placed: usize,
    failed: usize,
}

impl CompletionTracker {
    pub fn new(item_count: usize) -> Self {
        Self {
            item_count,
            placed: 0,
            failed: 0,
        }
    }

    pub fn record_placed(&mut self) {
        debug_assert!(!self.is_complete(), "completion recorded past item count");
        self.placed += 1;
    }

    pub fn record_failed(&mut self) {
        debug_assert!(!self.is_complete(), "completion recorded past item count");
        self.failed += 1;
    }

    pub fn resolved(&self) -> usize {
        self.placed + self.failed
    }

    pub fn is_complete(&self) -> bool {
        self.resolved() == self.item_count
    }

    pub fn outcome(&self) -> PageOutcome {
        PageOutcome {
            item_count: self.item_count,
            placed: self.placed,
            failed: self.failed,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Page processing
// ────────────────────────────────────────────────────────────────────────────

/// Probes and places every item of one raw page.
pub async fn process_page<H: RenderHost>(
    raw: &Value,
    ctx: &PipelineContext<H>,
) -> Result<PageOutcome, ParseFailure> {
    let items = ctx.codec.parse(raw).ok_or(ParseFailure)?;
    let mut tracker = CompletionTracker::new(items.len());
    let mut probes: JoinSet<(Value, Result<Dimensions, ProbeError>)> = JoinSet::new();

    for item in items {
        let url = if item.is_null() {
            None
        } else {
            ctx.codec.extract_url(&item)
        };
        let Some(url) = url else {
            warn!(%item, "Item has no asset URL, skipping");
            ctx.events.on_item_failed(&item, "missing asset url");
            tracker.record_failed();
            continue;
        };

        let probe = Arc::clone(&ctx.probe);
        probes.spawn(async move {
            let result = probe.probe(&url).await;
            (item, result)
        });
    }

    debug!(
        items = tracker.outcome().item_count,
        probes = probes.len(),
        "Dispatched page probes"
    );

    while let Some(joined) = probes.join_next().await {
        match joined {
            Ok((item, Ok(dims))) if dims.is_placeable() => {
                ctx.canvas.lock().place_item(item.clone(), dims);
                ctx.events.on_item_rendered(&item);
                tracker.record_placed();
            }
            Ok((item, Ok(dims))) => {
                warn!(%item, width = dims.width, height = dims.height, "Asset has zero width");
                ctx.events.on_item_failed(&item, "asset has zero width");
                tracker.record_failed();
            }
            Ok((item, Err(e))) => {
                warn!(%item, error = %e, "Asset probe failed");
                ctx.events.on_item_failed(&item, &e.to_string());
                tracker.record_failed();
            }
            Err(e) => {
                let e = ProbeError::Task(e.to_string());
                warn!(error = %e, "Asset probe task did not finish");
                ctx.events.on_item_failed(&Value::Null, &e.to_string());
                tracker.record_failed();
            }
        }
    }

    debug_assert!(tracker.is_complete());
    Ok(tracker.outcome())
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use crate::canvas::Canvas;
    use crate::layout::{ColumnPolicy, LayoutEngine, Spacing};
    use crate::render::{MarkupTemplate, MemoryContainer};
    use crate::source::JsonPageCodec;

    /// Answers from a URL table after a per-URL delay; unknown URLs fail and
    /// the URL "crash" panics.
    struct TableProbe {
        table: HashMap<String, (Dimensions, u64)>,
    }

    #[async_trait]
    impl AssetProbe for TableProbe {
        async fn probe(&self, url: &str) -> Result<Dimensions, ProbeError> {
            if url == "crash" {
                panic!("decoder crashed on {url}");
            }
            match self.table.get(url) {
                Some((dims, delay_ms)) => {
                    tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                    Ok(*dims)
                }
                None => Err(ProbeError::Status(404)),
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        rendered: Mutex<Vec<Value>>,
        failed: Mutex<Vec<String>>,
    }

    impl WaterfallEvents for Recorder {
        fn on_item_rendered(&self, item: &Value) {
            self.rendered.lock().push(item.clone());
        }

        fn on_item_failed(&self, _item: &Value, reason: &str) {
            self.failed.lock().push(reason.to_string());
        }
    }

    fn context(
        table: &[(&str, u32, u32, u64)],
        events: Arc<Recorder>,
    ) -> PipelineContext<MemoryContainer> {
        let mut engine = LayoutEngine::new(Spacing::default());
        engine
            .configure_geometry(310.0, 10.0, ColumnPolicy::Fixed(3))
            .unwrap();
        let canvas = Canvas::new(
            engine,
            MemoryContainer::new(310.0, MarkupTemplate::default()),
            "li",
        );
        let table = table
            .iter()
            .map(|&(url, width, height, delay)| {
                (url.to_string(), (Dimensions { width, height }, delay))
            })
            .collect();
        PipelineContext {
            codec: Arc::new(JsonPageCodec::default()),
            probe: Arc::new(TableProbe { table }),
            events,
            canvas: canvas.into_shared(),
        }
    }

    #[test]
    fn test_tracker_completes_exactly_at_item_count() {
        let mut tracker = CompletionTracker::new(3);
        assert!(!tracker.is_complete());
        tracker.record_placed();
        tracker.record_failed();
        assert!(!tracker.is_complete());
        tracker.record_placed();
        assert!(tracker.is_complete());
        assert_eq!(
            tracker.outcome(),
            PageOutcome {
                item_count: 3,
                placed: 2,
                failed: 1
            }
        );
    }

    #[test]
    fn test_empty_tracker_is_complete() {
        assert!(CompletionTracker::new(0).is_complete());
    }

    #[tokio::test]
    async fn test_empty_page_completes_immediately() {
        let events = Arc::new(Recorder::default());
        let ctx = context(&[], events);
        let outcome = process_page(&json!([]), &ctx).await.unwrap();
        assert_eq!(outcome.item_count, 0);
        assert_eq!(outcome.placed, 0);
    }

    #[tokio::test]
    async fn test_parse_failure_dispatches_nothing() {
        let events = Arc::new(Recorder::default());
        let ctx = context(&[("a", 100, 100, 0)], events.clone());
        let result = process_page(&json!({ "not": "a list" }), &ctx).await;
        assert_eq!(result, Err(ParseFailure));
        assert!(events.rendered.lock().is_empty());
        assert!(ctx.canvas.lock().engine.tiles().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tiles_placed_in_completion_order() {
        let events = Arc::new(Recorder::default());
        let ctx = context(
            &[("slow", 100, 100, 30), ("fast", 100, 100, 10), ("mid", 100, 100, 20)],
            events.clone(),
        );
        let raw = json!([{ "url": "slow" }, { "url": "fast" }, { "url": "mid" }]);
        let outcome = process_page(&raw, &ctx).await.unwrap();
        assert_eq!(outcome.placed, 3);

        let canvas = ctx.canvas.lock();
        let order: Vec<&str> = canvas
            .engine
            .tiles()
            .iter()
            .map(|t| t.item["url"].as_str().unwrap())
            .collect();
        assert_eq!(order, vec!["fast", "mid", "slow"]);
        assert_eq!(events.rendered.lock().len(), 3);
        assert_eq!(canvas.host.fragments().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_counted_without_tiles() {
        let events = Arc::new(Recorder::default());
        let ctx = context(
            &[("ok", 100, 200, 5), ("flat", 0, 50, 1)],
            events.clone(),
        );
        let raw = json!([
            { "url": "ok" },
            { "url": "missing" },
            { "title": "no url" },
            null,
            { "url": "flat" }
        ]);
        let outcome = process_page(&raw, &ctx).await.unwrap();
        assert_eq!(
            outcome,
            PageOutcome {
                item_count: 5,
                placed: 1,
                failed: 4
            }
        );
        assert_eq!(ctx.canvas.lock().engine.tiles().len(), 1);
        assert_eq!(events.failed.lock().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_item_page_resolves_all() {
        let events = Arc::new(Recorder::default());
        let table: Vec<(String, u32, u32, u64)> = (0..5)
            .map(|i| (format!("img{i}"), 100, 50 + i * 10, (5 - i) as u64))
            .collect();
        let borrowed: Vec<(&str, u32, u32, u64)> = table
            .iter()
            .map(|(u, w, h, d)| (u.as_str(), *w, *h, *d))
            .collect();
        let ctx = context(&borrowed, events);
        let raw = Value::Array(
            (0..5)
                .map(|i| json!({ "url": format!("img{i}") }))
                .collect(),
        );
        let outcome = process_page(&raw, &ctx).await.unwrap();
        assert_eq!(outcome.item_count, 5);
        assert_eq!(outcome.placed, 5);
        assert_eq!(ctx.canvas.lock().engine.column_heights().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_asset_task_counts_as_failure() {
        let events = Arc::new(Recorder::default());
        let ctx = context(&[("ok", 100, 100, 5)], events.clone());
        let raw = json!([{ "url": "crash" }, { "url": "ok" }]);

        let outcome = process_page(&raw, &ctx).await.unwrap();
        assert_eq!(
            outcome,
            PageOutcome {
                item_count: 2,
                placed: 1,
                failed: 1
            }
        );
        assert_eq!(ctx.canvas.lock().engine.tiles().len(), 1);
        assert_eq!(events.failed.lock().len(), 1);
    }
}
