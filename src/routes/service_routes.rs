// src/routes/service_routes.rs

use axum::{Json, Router, extract::State, routing::get};

use crate::{
    error::{ApiError, ScheduleError},
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, Service},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_services))
}

pub async fn list_services(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ApiOk<Vec<Service>>>, ApiError> {
    let services = state
        .store
        .list_services()
        .await
        .map_err(ScheduleError::from)?;
    Ok(Json(ApiOk { data: services }))
}
