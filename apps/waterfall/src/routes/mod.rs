pub mod health;
pub mod layouts;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/layouts", post(layouts::handle_create))
        .route(
            "/api/v1/layouts/:id",
            get(layouts::handle_get).delete(layouts::handle_delete),
        )
        .route("/api/v1/layouts/:id/next", post(layouts::handle_next_page))
        .route("/api/v1/layouts/:id/reset", post(layouts::handle_reset))
        .route(
            "/api/v1/layouts/:id/container",
            put(layouts::handle_resize),
        )
        .with_state(state)
}
