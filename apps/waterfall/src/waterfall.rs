//! Waterfall — one independent masonry layout instance.
//!
//! # Flow of `load_next_page`
//! 1. Pagination takes the load lock (or rejects: busy / exhausted).
//! 2. The page cycle is spawned as its own task: fetch → last-page check →
//!    probe pipeline → `on_page_loaded` → cursor advance → lock release.
//! 3. The caller awaits that task. Dropping the caller's future does not
//!    cancel a page that is already in flight.
//!
//! Transport and parse failures release the lock without advancing the
//! cursor; the next `load_next_page` retries the same page.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::canvas::{Canvas, SharedCanvas};
use crate::config::WaterfallConfig;
use crate::events::WaterfallEvents;
use crate::layout::{LayoutEngine, LayoutError, LayoutSnapshot};
use crate::pagination::{
    LoadError, PageRequest, PageState, PaginationController, PaginationSnapshot,
};
use crate::pipeline::{process_page, PageOutcome, ParseFailure, PipelineContext};
use crate::probe::AssetProbe;
use crate::reflow::{spawn_reflow_monitor, GeometryTrigger, IntervalTrigger, ReflowHandle, ReflowMonitor};
use crate::render::RenderHost;
use crate::source::{DataSource, PageCodec};

/// External collaborators of a layout.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn DataSource>,
    pub codec: Arc<dyn PageCodec>,
    pub probe: Arc<dyn AssetProbe>,
    pub events: Arc<dyn WaterfallEvents>,
}

/// Layout and pagination state in one serializable view.
#[derive(Debug, Clone, Serialize)]
pub struct WaterfallSnapshot {
    pub layout: LayoutSnapshot,
    pub pagination: PaginationSnapshot,
}

struct Shared<H> {
    config: WaterfallConfig,
    source: Arc<dyn DataSource>,
    pipeline: PipelineContext<H>,
    pager: Mutex<PaginationController>,
    monitor: Arc<ReflowMonitor<H>>,
}

/// Handle to one layout. Clones share the same instance.
pub struct Waterfall<H> {
    shared: Arc<Shared<H>>,
}

impl<H> Clone for Waterfall<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<H: RenderHost> Waterfall<H> {
    /// Builds a layout over `host`, sized to its current width.
    /// No page is requested until `load_next_page` is called.
    pub fn create(
        host: H,
        config: WaterfallConfig,
        collaborators: Collaborators,
    ) -> Result<Self, LayoutError> {
        let policy = config.column_policy();
        let mut engine = LayoutEngine::new(config.spacing());
        engine.configure_geometry(host.container_width(), config.margin, policy)?;

        let canvas: SharedCanvas<H> = Canvas::new(engine, host, config.tile_tag.clone()).into_shared();
        let monitor = Arc::new(ReflowMonitor::new(
            Arc::clone(&canvas),
            config.margin,
            policy,
        ));
        let Collaborators {
            source,
            codec,
            probe,
            events,
        } = collaborators;

        Ok(Self {
            shared: Arc::new(Shared {
                pager: Mutex::new(PaginationController::from_config(&config)),
                config,
                source,
                pipeline: PipelineContext {
                    codec,
                    probe,
                    events,
                    canvas,
                },
                monitor,
            }),
        })
    }

    /// Loads, probes and places the next page.
    ///
    /// Returns `LoadError::Busy` when a page is already in flight and
    /// `LoadError::Exhausted` after the last page; neither issues a request.
    pub async fn load_next_page(&self) -> Result<PageOutcome, LoadError> {
        let begun = self.shared.pager.lock().begin_load();
        let request = match begun {
            Ok(request) => request,
            Err(LoadError::Exhausted) => {
                self.shared.pipeline.events.on_no_more_pages();
                return Err(LoadError::Exhausted);
            }
            Err(e) => return Err(e),
        };

        let page = request.page_index;
        let shared = Arc::clone(&self.shared);
        match tokio::spawn(async move { shared.run_page(request).await }).await {
            Ok(result) => result,
            Err(e) => {
                warn!(page, error = %e, "Page task did not finish, releasing load lock");
                self.shared.pager.lock().abort_load();
                Err(LoadError::Internal {
                    page,
                    message: e.to_string(),
                })
            }
        }
    }

    /// See [`ReflowMonitor::reset`].
    pub fn reset(&self, column_count: Option<u32>) -> Result<bool, LayoutError> {
        self.shared.monitor.reset(column_count)
    }

    /// See [`ReflowMonitor::check_geometry`].
    pub fn check_geometry(&self) -> Result<bool, LayoutError> {
        self.shared.monitor.check_geometry()
    }

    /// Starts polling the container at the configured reflow interval.
    pub fn start_reflow(&self) -> ReflowHandle {
        self.start_reflow_with(IntervalTrigger::new(self.shared.config.reflow_interval()))
    }

    /// Starts a reflow monitor driven by `trigger`.
    pub fn start_reflow_with<T: GeometryTrigger>(&self, trigger: T) -> ReflowHandle {
        spawn_reflow_monitor(Arc::clone(&self.shared.monitor), trigger)
    }

    /// Runs `f` with the layout locked. Do not call back into this layout from `f`.
    pub fn with_canvas<R>(&self, f: impl FnOnce(&mut Canvas<H>) -> R) -> R {
        f(&mut self.shared.pipeline.canvas.lock())
    }

    pub fn page_state(&self) -> PageState {
        self.shared.pager.lock().state()
    }

    pub fn cursor(&self) -> u64 {
        self.shared.pager.lock().cursor()
    }

    pub fn snapshot(&self) -> WaterfallSnapshot {
        let layout = self.shared.pipeline.canvas.lock().engine.snapshot();
        let pagination = self.shared.pager.lock().snapshot();
        WaterfallSnapshot { layout, pagination }
    }
}

impl<H: RenderHost> Shared<H> {
    /// One page cycle. Always leaves the load lock released.
    async fn run_page(&self, request: PageRequest) -> Result<PageOutcome, LoadError> {
        let page = request.page_index;

        let raw = match self.source.fetch_page(&request).await {
            Ok(raw) => raw,
            Err(source) => {
                warn!(page, error = %source, "Page fetch failed, page can be retried");
                self.pager.lock().abort_load();
                return Err(LoadError::Transport { page, source });
            }
        };

        if self.pipeline.codec.is_last_page(&raw) {
            info!(page, "Data source reported the last page");
            self.pager.lock().mark_last_page();
        }

        match process_page(&raw, &self.pipeline).await {
            Ok(outcome) => {
                self.pipeline.events.on_page_loaded(&raw);
                self.pager
                    .lock()
                    .complete_page(outcome.item_count, outcome.placed, outcome.failed);
                info!(
                    page,
                    items = outcome.item_count,
                    placed = outcome.placed,
                    failed = outcome.failed,
                    "Page complete"
                );
                Ok(outcome)
            }
            Err(ParseFailure) => {
                warn!(page, "Page response is not a list of items, page can be retried");
                self.pager.lock().abort_load();
                Err(LoadError::Parse { page })
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
