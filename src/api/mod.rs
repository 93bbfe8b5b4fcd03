//! HTTP surface: one endpoint per invocation, same contract as the CLI.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::errors::RotationError;
use crate::models::RotationEvent;
use crate::rotation::{Outcome, Rotator};

pub fn router(rotator: Arc<Rotator>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/rotate", post(rotate_handler))
        .with_state(rotator)
}

async fn rotate_handler(
    State(rotator): State<Arc<Rotator>>,
    Json(event): Json<RotationEvent>,
) -> Result<Json<Outcome>, RotationError> {
    rotator.rotate(&event).await.map(Json)
}
