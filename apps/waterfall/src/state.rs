use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use uuid::Uuid;

use crate::reflow::{ReflowHandle, ResizeNotifier};
use crate::render::MemoryContainer;
use crate::waterfall::Waterfall;

/// One hosted layout: the instance plus its running reflow monitor.
pub struct LayoutEntry {
    pub waterfall: Waterfall<MemoryContainer>,
    /// Present when the layout is driven by resize notifications rather than polling.
    pub notifier: Option<ResizeNotifier>,
    pub reflow: Mutex<Option<ReflowHandle>>,
}

impl LayoutEntry {
    /// Stops the reflow monitor, if still running.
    pub async fn shutdown(&self) {
        let handle = self.reflow.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }
}

/// Shared service state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// One HTTP client for page fetches and asset probes of every layout.
    pub http: Client,
    pub layouts: Arc<RwLock<HashMap<Uuid, Arc<LayoutEntry>>>>,
}

impl AppState {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            layouts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn layout(&self, id: Uuid) -> Option<Arc<LayoutEntry>> {
        self.layouts.read().get(&id).cloned()
    }
}
