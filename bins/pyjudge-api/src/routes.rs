use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/run-code", post(handlers::run_code))
        .route("/get-result/:job_id", get(handlers::get_result))
        .route("/status", get(handlers::health_check))
        .route("/metrics", get(handlers::export_metrics))
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new().merge(routes()).with_state(state)
}
