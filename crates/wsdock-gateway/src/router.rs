//! Axum router wiring (HTTP -> WS upgrade, ops endpoints).

use axum::routing::{any, get};
use axum::Router;

use crate::{app_state::AppState, ops, transport};

pub fn build_router(state: AppState) -> Router {
    let path = state.cfg().gateway.path.clone();
    Router::new()
        .route(&path, any(transport::ws::ws_upgrade))
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .with_state(state)
}
