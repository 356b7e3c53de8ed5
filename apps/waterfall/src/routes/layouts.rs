use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::WaterfallConfig;
use crate::errors::AppError;
use crate::events::TracingEvents;
use crate::pipeline::PageOutcome;
use crate::probe::HttpAssetProbe;
use crate::reflow::resize_channel;
use crate::render::{Fragment, MarkupTemplate, MemoryContainer};
use crate::source::{HttpDataSource, JsonPageCodec};
use crate::state::{AppState, LayoutEntry};
use crate::waterfall::{Collaborators, Waterfall, WaterfallSnapshot};

/// How a hosted layout notices container resizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Relayout as soon as a new width is reported.
    #[default]
    Notify,
    /// Poll the reported width every `reflow_interval_ms`.
    Interval,
}

fn default_autoload() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateLayoutRequest {
    pub container_width: f64,
    #[serde(default)]
    pub config: WaterfallConfig,
    #[serde(default)]
    pub codec: JsonPageCodec,
    /// Fragment template with `{{field}}` placeholders.
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub trigger: TriggerKind,
    /// Load the first page right after creation.
    #[serde(default = "default_autoload")]
    pub autoload: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetRequest {
    #[serde(default)]
    pub columns: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResizeRequest {
    pub width: f64,
}

#[derive(Serialize)]
pub struct LayoutView {
    pub id: Uuid,
    #[serde(flatten)]
    pub snapshot: WaterfallSnapshot,
    pub fragments: Vec<Fragment>,
    pub rendered_height: f64,
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub relayout: bool,
    #[serde(flatten)]
    pub view: LayoutView,
}

fn view(id: Uuid, waterfall: &Waterfall<MemoryContainer>) -> LayoutView {
    let (fragments, rendered_height) = waterfall
        .with_canvas(|canvas| (canvas.host.fragments().to_vec(), canvas.host.height()));
    LayoutView {
        id,
        snapshot: waterfall.snapshot(),
        fragments,
        rendered_height,
    }
}

fn find(state: &AppState, id: Uuid) -> Result<Arc<LayoutEntry>, AppError> {
    state
        .layout(id)
        .ok_or_else(|| AppError::NotFound(format!("Layout {id} not found")))
}

fn validate_width(width: f64) -> Result<(), AppError> {
    if width.is_finite() && width >= 0.0 {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Container width must be a non-negative number, got {width}"
        )))
    }
}

/// POST /api/v1/layouts
pub async fn handle_create(
    State(state): State<AppState>,
    Json(req): Json<CreateLayoutRequest>,
) -> Result<(StatusCode, Json<LayoutView>), AppError> {
    validate_width(req.container_width)?;
    if req.config.url_template.is_empty() && req.config.request_url.is_empty() {
        return Err(AppError::Validation(
            "Either request_url or url_template must be set".to_string(),
        ));
    }

    let id = Uuid::new_v4();
    let collaborators = Collaborators {
        source: Arc::new(HttpDataSource::new(
            state.http.clone(),
            req.config.request_data_format,
        )),
        codec: Arc::new(req.codec),
        probe: Arc::new(HttpAssetProbe::new(state.http.clone())),
        events: Arc::new(TracingEvents::new(id.to_string())),
    };
    let container = MemoryContainer::new(req.container_width, MarkupTemplate::new(req.template));
    let waterfall = Waterfall::create(container, req.config, collaborators)?;

    let (notifier, reflow) = match req.trigger {
        TriggerKind::Notify => {
            let (notifier, trigger) = resize_channel();
            (Some(notifier), waterfall.start_reflow_with(trigger))
        }
        TriggerKind::Interval => (None, waterfall.start_reflow()),
    };

    let entry = Arc::new(LayoutEntry {
        waterfall: waterfall.clone(),
        notifier,
        reflow: Mutex::new(Some(reflow)),
    });
    state.layouts.write().insert(id, entry);
    info!(%id, trigger = ?req.trigger, "Layout created");

    if req.autoload {
        let first = waterfall.clone();
        tokio::spawn(async move {
            if let Err(e) = first.load_next_page().await {
                warn!(%id, error = %e, "Initial page load failed");
            }
        });
    }

    Ok((StatusCode::CREATED, Json(view(id, &waterfall))))
}

/// GET /api/v1/layouts/:id
pub async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LayoutView>, AppError> {
    let entry = find(&state, id)?;
    Ok(Json(view(id, &entry.waterfall)))
}

/// POST /api/v1/layouts/:id/next
pub async fn handle_next_page(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PageOutcome>, AppError> {
    let entry = find(&state, id)?;
    let outcome = entry.waterfall.load_next_page().await?;
    Ok(Json(outcome))
}

/// POST /api/v1/layouts/:id/reset
pub async fn handle_reset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResetRequest>,
) -> Result<Json<ResetResponse>, AppError> {
    let entry = find(&state, id)?;
    let relayout = entry.waterfall.reset(req.columns)?;
    Ok(Json(ResetResponse {
        relayout,
        view: view(id, &entry.waterfall),
    }))
}

/// PUT /api/v1/layouts/:id/container
pub async fn handle_resize(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResizeRequest>,
) -> Result<StatusCode, AppError> {
    validate_width(req.width)?;
    let entry = find(&state, id)?;
    entry
        .waterfall
        .with_canvas(|canvas| canvas.host.set_width(req.width));
    if let Some(notifier) = &entry.notifier {
        if !notifier.notify() {
            warn!(%id, "Reflow monitor is no longer running");
        }
    }
    Ok(StatusCode::ACCEPTED)
}

/// DELETE /api/v1/layouts/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let removed = state.layouts.write().remove(&id);
    let entry = removed.ok_or_else(|| AppError::NotFound(format!("Layout {id} not found")))?;
    entry.shutdown().await;
    info!(%id, "Layout removed");
    Ok(StatusCode::NO_CONTENT)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::routes::build_router;
    use crate::state::AppState;

    fn state() -> AppState {
        AppState::new(reqwest::Client::new())
    }

    async fn send(
        state: &AppState,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (axum::http::StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(b) => Body::from(b.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = build_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&state(), Method::GET, "/health", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_layout_lifecycle() {
        let state = state();
        let (status, created) = send(
            &state,
            Method::POST,
            "/api/v1/layouts",
            Some(json!({
                "container_width": 310,
                "config": { "margin": 10, "fixed_column_count": 3, "request_url": "http://127.0.0.1:9/feed" },
                "template": "<img src=\"{{url}}\">",
                "autoload": false
            })),
        )
        .await;
        assert_eq!(status, 201);
        assert_eq!(created["layout"]["column_count"], 3);
        assert_eq!(created["layout"]["tile_width"], 90.0);
        assert_eq!(created["pagination"]["state"], "idle");
        let id = created["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &state,
            Method::PUT,
            &format!("/api/v1/layouts/{id}/container"),
            Some(json!({ "width": 610 })),
        )
        .await;
        assert_eq!(status, 202);

        let (status, reset) = send(
            &state,
            Method::POST,
            &format!("/api/v1/layouts/{id}/reset"),
            Some(json!({ "columns": 2 })),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(reset["layout"]["column_count"], 2);
        assert_eq!(reset["layout"]["container_width"], 610.0);

        let (status, _) = send(&state, Method::DELETE, &format!("/api/v1/layouts/{id}"), None).await;
        assert_eq!(status, 204);

        let (status, body) = send(&state, Method::GET, &format!("/api/v1/layouts/{id}"), None).await;
        assert_eq!(status, 404);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_config_keys() {
        let (status, _) = send(
            &state(),
            Method::POST,
            "/api/v1/layouts",
            Some(json!({
                "container_width": 310,
                "config": { "colums": 3, "request_url": "/x" }
            })),
        )
        .await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_create_requires_a_request_target() {
        let (status, body) = send(
            &state(),
            Method::POST,
            "/api/v1/layouts",
            Some(json!({ "container_width": 310, "autoload": false })),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_reset_with_out_of_range_columns_is_validation_error() {
        let state = state();
        let (_, created) = send(
            &state,
            Method::POST,
            "/api/v1/layouts",
            Some(json!({
                "container_width": 500,
                "config": { "url_template": "http://127.0.0.1:9/{{pno}}" },
                "autoload": false
            })),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &state,
            Method::POST,
            &format!("/api/v1/layouts/{id}/reset"),
            Some(json!({ "columns": 0 })),
        )
        .await;
        assert_eq!(status, 400);

        let (status, body) = send(
            &state,
            Method::POST,
            &format!("/api/v1/layouts/{id}/reset"),
            Some(json!({ "columns": u32::MAX })),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }
}
