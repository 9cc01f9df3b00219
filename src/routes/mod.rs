use crate::models::AppState;
use axum::Router;

pub mod appointment_routes;
pub mod auth_routes;
pub mod client_routes;
pub mod notification_routes;
pub mod report_routes;
pub mod service_routes;
pub mod user_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/auth", auth_routes::router())
        .nest("/api/v1/users", user_routes::router())
        .nest("/api/v1/services", service_routes::router())
        .nest("/api/v1", client_routes::router())
        .nest("/api/v1", appointment_routes::router())
        .nest("/api/v1", notification_routes::router())
        .nest("/api/v1", report_routes::router())
        .with_state(state)
}
