// src/routes/user_routes.rs

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::hash_password,
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, Role},
};

#[derive(Debug, sqlx::FromRow)]
struct StaffRow {
    user_id: Uuid,
    username: String,
    display_name: String,
    role: String,
    is_active: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct StaffMember {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<StaffRow> for StaffMember {
    type Error = ApiError;

    fn try_from(r: StaffRow) -> Result<Self, Self::Error> {
        Ok(StaffMember {
            user_id: r.user_id,
            username: r.username,
            display_name: r.display_name,
            role: r
                .role
                .parse()
                .map_err(|e| ApiError::Internal(format!("row decode error: {e}")))?,
            is_active: r.is_active,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StaffList {
    pub users: Vec<StaffMember>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub display_name: String,
    pub password: String,
    pub role: Role,
    pub is_active: Option<bool>, // default true
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        // /api/v1/users
        .route("/", get(list_users).post(create_user))
        // /api/v1/users/{user_id}
        .route("/{user_id}", get(get_user).patch(update_user))
}

fn db_err(e: sqlx::Error) -> ApiError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return ApiError::Conflict("USERNAME_TAKEN", "username is already in use".into());
        }
    }
    ApiError::Internal(format!("db error: {e}"))
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<StaffList>>, ApiError> {
    auth.ensure_admin()?;

    let rows: Vec<StaffRow> = sqlx::query_as::<_, StaffRow>(
        r#"
        SELECT user_id, username, display_name, role, is_active, created_at
        FROM studio_user
        ORDER BY created_at DESC
        LIMIT 200
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(db_err)?;

    let users = rows
        .into_iter()
        .map(StaffMember::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(ApiOk {
        data: StaffList { users },
    }))
}

async fn load_user(state: &AppState, user_id: Uuid) -> Result<StaffMember, ApiError> {
    sqlx::query_as::<_, StaffRow>(
        r#"
        SELECT user_id, username, display_name, role, is_active, created_at
        FROM studio_user
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(db_err)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "user not found".into()))?
    .try_into()
}

pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiOk<StaffMember>>, ApiError> {
    auth.ensure_admin()?;
    let user = load_user(&state, user_id).await?;
    Ok(Json(ApiOk { data: user }))
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    let u = username.trim();
    if u.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "username is required".into(),
        ));
    }
    if u.len() < 3 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "username must be at least 3 characters".into(),
        ));
    }
    Ok(())
}

fn validate_display_name(display_name: &str) -> Result<(), ApiError> {
    if display_name.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "display_name is required".into(),
        ));
    }
    Ok(())
}

fn validate_password(pw: &str) -> Result<(), ApiError> {
    if pw.trim().len() < 8 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "password must be at least 8 characters".into(),
        ));
    }
    Ok(())
}

pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<ApiOk<StaffMember>>, ApiError> {
    auth.ensure_admin()?;

    validate_username(&req.username)?;
    validate_display_name(&req.display_name)?;
    validate_password(&req.password)?;

    let pw_hash = hash_password(req.password.trim()).map_err(ApiError::Internal)?;

    let user: StaffMember = sqlx::query_as::<_, StaffRow>(
        r#"
        INSERT INTO studio_user (username, display_name, password_hash, role, is_active)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING user_id, username, display_name, role, is_active, created_at
        "#,
    )
    .bind(req.username.trim())
    .bind(req.display_name.trim())
    .bind(&pw_hash)
    .bind(req.role.as_str())
    .bind(req.is_active.unwrap_or(true))
    .fetch_one(&state.db)
    .await
    .map_err(db_err)?
    .try_into()?;

    tracing::info!(user_id = %user.user_id, role = user.role.as_str(), "staff account created");
    Ok(Json(ApiOk { data: user }))
}

pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<ApiOk<StaffMember>>, ApiError> {
    auth.ensure_admin()?;

    if user_id == auth.user_id && (req.role == Some(Role::Employee) || req.is_active == Some(false)) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "admins cannot demote or disable themselves".into(),
        ));
    }

    let existing = load_user(&state, user_id).await?;

    let display_name = match req.display_name.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => existing.display_name,
    };
    let role = req.role.unwrap_or(existing.role);
    let is_active = req.is_active.unwrap_or(existing.is_active);

    let updated: StaffMember = sqlx::query_as::<_, StaffRow>(
        r#"
        UPDATE studio_user
        SET display_name = $1,
            role = $2,
            is_active = $3
        WHERE user_id = $4
        RETURNING user_id, username, display_name, role, is_active, created_at
        "#,
    )
    .bind(&display_name)
    .bind(role.as_str())
    .bind(is_active)
    .bind(user_id)
    .fetch_one(&state.db)
    .await
    .map_err(db_err)?
    .try_into()?;

    if !is_active {
        // A disabled account loses its sessions right away.
        sqlx::query(
            r#"
            UPDATE session_token
            SET revoked_at = now()
            WHERE user_id = $1
              AND revoked_at IS NULL
            "#,
        )
        .bind(user_id)
        .execute(&state.db)
        .await
        .map_err(db_err)?;
    }

    tracing::info!(%user_id, role = role.as_str(), is_active, "staff account updated");
    Ok(Json(ApiOk { data: updated }))
}
