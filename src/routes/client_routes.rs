// src/routes/client_routes.rs

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, ClientProfile, OkData},
    scheduling::clients::{self, ClientPatch, NewClientInput},
};

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    #[serde(flatten)]
    pub client: NewClientInput,
    /// Admins may assign the client to an employee.
    pub employee_id: Option<Uuid>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/clients", get(list_clients).post(create_client))
        .route(
            "/clients/{client_id}",
            get(get_client).patch(update_client).delete(delete_client),
        )
}

pub async fn list_clients(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<ClientProfile>>>, ApiError> {
    let rows = clients::list_clients(state.store.as_ref(), &auth.caller()).await?;
    Ok(Json(ApiOk { data: rows }))
}

pub async fn create_client(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateClientRequest>,
) -> Result<Json<ApiOk<ClientProfile>>, ApiError> {
    let client = clients::create_client(
        state.store.as_ref(),
        &auth.caller(),
        req.client,
        req.employee_id,
    )
    .await?;
    Ok(Json(ApiOk { data: client }))
}

pub async fn get_client(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<ApiOk<ClientProfile>>, ApiError> {
    let client = clients::get_client(state.store.as_ref(), &auth.caller(), client_id).await?;
    Ok(Json(ApiOk { data: client }))
}

pub async fn update_client(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(client_id): Path<Uuid>,
    Json(patch): Json<ClientPatch>,
) -> Result<Json<ApiOk<ClientProfile>>, ApiError> {
    let client = clients::update_client(state.store.as_ref(), &auth.caller(), client_id, patch).await?;
    Ok(Json(ApiOk { data: client }))
}

pub async fn delete_client(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    clients::delete_client(state.store.as_ref(), &auth.caller(), client_id).await?;
    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}
