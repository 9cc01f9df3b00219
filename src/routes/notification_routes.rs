// src/routes/notification_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, Notification, NotificationStatus, OkData},
    scheduling::ledger,
};

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub status: Option<NotificationStatus>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(feed))
        .route("/notifications/{notification_id}", delete(delete_notification))
        .route("/notifications/{notification_id}/approve", post(approve))
        .route("/notifications/{notification_id}/decline", post(decline))
}

/// GET /api/v1/notifications
/// Newest first; old entries are purged before reading.
pub async fn feed(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<FeedQuery>,
) -> Result<Json<ApiOk<Vec<Notification>>>, ApiError> {
    let rows = ledger::feed(
        state.store.as_ref(),
        &auth.caller(),
        q.status,
        Utc::now(),
        state.notification_retention_days,
    )
    .await?;
    Ok(Json(ApiOk { data: rows }))
}

pub async fn approve(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<ApiOk<Notification>>, ApiError> {
    let n = ledger::approve(state.store.as_ref(), &auth.caller(), notification_id).await?;
    Ok(Json(ApiOk { data: n }))
}

pub async fn decline(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<ApiOk<Notification>>, ApiError> {
    let n = ledger::decline(state.store.as_ref(), &auth.caller(), notification_id).await?;
    Ok(Json(ApiOk { data: n }))
}

/// DELETE /api/v1/notifications/{id}
/// Reverts a still-pending edit request before removing it.
pub async fn delete_notification(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    ledger::delete_notification(state.store.as_ref(), &auth.caller(), notification_id).await?;
    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}
