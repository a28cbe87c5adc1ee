//! HTTP routes
//!
//! The roster refresh handlers only acknowledge the request; the actual
//! re-ingest runs in the background workers fed by the dispatch hooks.

use crate::dispatch::{dispatch_on_success, path_id, DispatchHook, TaskDispatcher};
use crate::service::app::AppState;
use crate::service::health::HealthCheck;
use crate::types::{ClanRequest, PlayerRequest, CLAN_REQUESTS_QUEUE, PLAYER_REQUESTS_QUEUE};
use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Build the service router around `state`
pub fn router(state: Arc<AppState>) -> Router {
    let dispatcher: Arc<dyn TaskDispatcher> = Arc::new(state.dispatcher().clone());

    let players = Router::new()
        .route("/players/{membership_id}/refresh", post(refresh_player))
        .route_layer(middleware::from_fn_with_state(
            DispatchHook::new(dispatcher.clone(), PLAYER_REQUESTS_QUEUE, player_payload),
            dispatch_on_success,
        ));

    let clans = Router::new()
        .route("/clans/{group_id}/refresh", post(refresh_clan))
        .route_layer(middleware::from_fn_with_state(
            DispatchHook::new(dispatcher, CLAN_REQUESTS_QUEUE, clan_payload),
            dispatch_on_success,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(state)
        .merge(players)
        .merge(clans)
}

fn player_payload(request: &Request) -> Option<Value> {
    let membership_id = path_id(request.uri().path(), "players")?;
    serde_json::to_value(PlayerRequest { membership_id }).ok()
}

fn clan_payload(request: &Request) -> Option<Value> {
    let group_id = path_id(request.uri().path(), "clans")?;
    serde_json::to_value(ClanRequest { group_id }).ok()
}

async fn refresh_player(Path(membership_id): Path<String>) -> impl IntoResponse {
    match membership_id.parse::<i64>() {
        Ok(membership_id) => {
            debug!(membership_id, "Player refresh accepted");
            (
                StatusCode::OK,
                Json(json!({ "status": "accepted", "membershipId": membership_id })),
            )
        }
        Err(_) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "membership id must be numeric" })),
        ),
    }
}

async fn refresh_clan(Path(group_id): Path<String>) -> impl IntoResponse {
    match group_id.parse::<i64>() {
        Ok(group_id) => {
            debug!(group_id, "Clan refresh accepted");
            (
                StatusCode::OK,
                Json(json!({ "status": "accepted", "groupId": group_id })),
            )
        }
        Err(_) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "group id must be numeric" })),
        ),
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthCheck::check(&state))
}

/// Ready as soon as the process serves; the broker is not a dependency
async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let check = HealthCheck::check(&state);
    (
        StatusCode::OK,
        Json(json!({ "ready": true, "status": check.status, "broker": check.broker })),
    )
}
