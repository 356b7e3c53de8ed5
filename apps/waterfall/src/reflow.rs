//! Reflow Monitor — notices container geometry changes and relays the layout.
//!
//! A check measures the container, resolves the column count under the current
//! policy and, if width or count moved, reconfigures the engine and replays
//! every tile. Checks are driven by a `GeometryTrigger`: a fixed polling
//! interval by default, or explicit resize notifications.
//!
//! The monitor ignores the load lock. It only replays tiles already in the
//! list, and the canvas mutex keeps it from overlapping a placement.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::canvas::SharedCanvas;
use crate::layout::{ColumnPolicy, LayoutError};
use crate::render::RenderHost;

pub struct ReflowMonitor<H> {
    canvas: SharedCanvas<H>,
    margin: f64,
    policy: Mutex<ColumnPolicy>,
}

impl<H: RenderHost> ReflowMonitor<H> {
    pub fn new(canvas: SharedCanvas<H>, margin: f64, policy: ColumnPolicy) -> Self {
        Self {
            canvas,
            margin,
            policy: Mutex::new(policy),
        }
    }

    pub fn policy(&self) -> ColumnPolicy {
        *self.policy.lock()
    }

    /// Measures the container and relays the layout if its geometry changed.
    /// Returns whether a relayout happened.
    pub fn check_geometry(&self) -> Result<bool, LayoutError> {
        let policy = self.policy();
        let mut canvas = self.canvas.lock();
        let width = canvas.host.container_width();
        let changed = canvas.reflow(width, self.margin, policy)?;
        if changed {
            debug!(
                width,
                columns = canvas.engine.column_count(),
                tiles = canvas.engine.tiles().len(),
                "Container geometry changed, relayout done"
            );
        }
        Ok(changed)
    }

    /// `Some(n)` pins the layout to `n` columns from now on and relays it;
    /// `None` runs a check under the current policy.
    pub fn reset(&self, column_count: Option<u32>) -> Result<bool, LayoutError> {
        if let Some(n) = column_count {
            let fixed = ColumnPolicy::Fixed(n);
            // validate before switching so a bad count leaves the mode alone
            fixed.column_count(0.0, self.margin)?;
            *self.policy.lock() = fixed;
        }
        self.check_geometry()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Triggers
// ────────────────────────────────────────────────────────────────────────────

/// Source of "check the geometry now" moments.
#[async_trait]
pub trait GeometryTrigger: Send + 'static {
    /// Waits for the next check. `false` means the trigger is closed for good.
    async fn next(&mut self) -> bool;
}

/// Polls on a fixed period. The first tick fires immediately.
pub struct IntervalTrigger {
    interval: Interval,
}

impl IntervalTrigger {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl GeometryTrigger for IntervalTrigger {
    async fn next(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Fires when a `ResizeNotifier` reports a resize. Bursts collapse into one check.
pub struct NotifyTrigger {
    rx: mpsc::Receiver<()>,
}

#[async_trait]
impl GeometryTrigger for NotifyTrigger {
    async fn next(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

/// Sender half of an event-driven trigger.
#[derive(Clone)]
pub struct ResizeNotifier {
    tx: mpsc::Sender<()>,
}

impl ResizeNotifier {
    /// Requests a geometry check. Returns `false` once the monitor is gone.
    pub fn notify(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

pub fn resize_channel() -> (ResizeNotifier, NotifyTrigger) {
    let (tx, rx) = mpsc::channel(1);
    (ResizeNotifier { tx }, NotifyTrigger { rx })
}

// ────────────────────────────────────────────────────────────────────────────
// Background task
// ────────────────────────────────────────────────────────────────────────────

/// Running monitor task. Dropping the handle stops the task at its next wakeup.
pub struct ReflowHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReflowHandle {
    /// Stops the monitor and waits for the task to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Runs `monitor.check_geometry()` on every trigger until stopped.
pub fn spawn_reflow_monitor<H, T>(monitor: Arc<ReflowMonitor<H>>, mut trigger: T) -> ReflowHandle
where
    H: RenderHost,
    T: GeometryTrigger,
{
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                alive = trigger.next() => {
                    if !alive {
                        break;
                    }
                    if let Err(e) = monitor.check_geometry() {
                        warn!(error = %e, "Reflow check failed");
                    }
                }
            }
        }
        debug!("Reflow monitor stopped");
    });
    ReflowHandle { shutdown, task }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
