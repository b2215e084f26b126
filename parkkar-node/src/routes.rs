//! HTTP surface: lot listing, detect trigger and MJPEG stream.

use crate::lots::LotRegistry;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::error;
use parkkar_bridge::{frame, start_detection, BridgeConfig, FrameStream, JobPool, Launcher};
use parkkar_notify::HttpNotifier;
use serde_json::json;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub launcher: Arc<Launcher>,
    pub lots: Arc<LotRegistry>,
    pub notifier: Arc<HttpNotifier>,
    pub pool: Arc<JobPool>,
    pub bridge: BridgeConfig,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/parking-lots", get(parking_lots))
        .route("/detect/{parking_id}", get(detect))
        .route("/stream/{parking_id}", get(stream))
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "ParkKar Slot Detection API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "parkkar-detection",
        "activeJobs": state.pool.running_total(),
    }))
}

async fn parking_lots(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "parking_lots": state.lots.ids(),
        "total": state.lots.len(),
    }))
}

async fn detect(State(state): State<AppState>, Path(parking_id): Path<String>) -> Response {
    let Some(script) = state.lots.resolve(&parking_id) else {
        return unknown_lot();
    };

    match start_detection(
        &state.launcher,
        &state.pool,
        parking_id.as_str(),
        script,
        state.notifier.clone(),
        &state.bridge,
    ) {
        // the relay is owned by the pool from here on
        Ok(_detached) => Json(json!({ "status": "Detection started" })).into_response(),
        Err(err) => {
            error!("[{parking_id}] detection launch failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": err.to_string() })),
            )
                .into_response()
        }
    }
}

async fn stream(State(state): State<AppState>, Path(parking_id): Path<String>) -> Response {
    let Some(script) = state.lots.resolve(&parking_id) else {
        return unknown_lot();
    };

    let frames = FrameStream::open(&state.launcher, parking_id.as_str(), script, &state.bridge);

    (
        [
            (header::CONTENT_TYPE, frame::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

fn unknown_lot() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "detail": "Invalid parking lot ID" })),
    )
        .into_response()
}
