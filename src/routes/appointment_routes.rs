// src/routes/appointment_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, Appointment, AppointmentStatus},
    scheduling::lifecycle::{
        self, AppointmentPatch, AppointmentQuery, AvailabilityQuery, Booking, CreateAppointment,
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route("/appointments/availability", get(availability))
        .route(
            "/appointments/{appointment_id}",
            get(get_appointment).patch(patch_appointment),
        )
        .route("/appointments/{appointment_id}/status", post(set_status))
}

/* ============================================================
   Request DTOs
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityData {
    pub available: bool,
}

/* ============================================================
   GET /appointments
   ============================================================ */

pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<AppointmentQuery>,
) -> Result<Json<ApiOk<Vec<Appointment>>>, ApiError> {
    let today = Utc::now().date_naive();
    let rows = lifecycle::list_appointments(state.store.as_ref(), &auth.caller(), &q, today).await?;
    Ok(Json(ApiOk { data: rows }))
}

/* ============================================================
   GET /appointments/availability
   ============================================================ */

pub async fn availability(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<AvailabilityQuery>,
) -> Result<Json<ApiOk<AvailabilityData>>, ApiError> {
    let available = lifecycle::check_availability(state.store.as_ref(), &auth.caller(), &q).await?;
    Ok(Json(ApiOk {
        data: AvailabilityData { available },
    }))
}

/* ============================================================
   GET /appointments/{appointment_id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let appointment =
        lifecycle::get_appointment(state.store.as_ref(), &auth.caller(), appointment_id).await?;
    Ok(Json(ApiOk { data: appointment }))
}

/* ============================================================
   POST /appointments
   ============================================================ */

pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateAppointment>,
) -> Result<Json<ApiOk<Booking>>, ApiError> {
    let booking = lifecycle::create_appointment(state.store.as_ref(), &auth.caller(), req).await?;
    Ok(Json(ApiOk { data: booking }))
}

/* ============================================================
   PATCH /appointments/{appointment_id}
   ============================================================ */

pub async fn patch_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(patch): Json<AppointmentPatch>,
) -> Result<Json<ApiOk<Booking>>, ApiError> {
    let booking =
        lifecycle::update_appointment(state.store.as_ref(), &auth.caller(), appointment_id, patch)
            .await?;
    Ok(Json(ApiOk { data: booking }))
}

/* ============================================================
   POST /appointments/{appointment_id}/status
   ============================================================ */

pub async fn set_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<ApiOk<Booking>>, ApiError> {
    let booking = lifecycle::transition_status(
        state.store.as_ref(),
        &auth.caller(),
        appointment_id,
        req.status,
    )
    .await?;
    Ok(Json(ApiOk { data: booking }))
}
