use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scheduling::reporting::FeeModel;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub store: Arc<dyn Store>,
    pub session_ttl_hours: i64,
    pub notification_retention_days: i64,
    pub default_fee: FeeModel,
}

/* -------------------------
   API DTOs
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub device_name: Option<String>,
    pub remember_me: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponseData {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct MeResponseData {
    pub user: UserProfile,
    pub session: SessionInfo,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SessionTokenRow {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/* -------------------------
   Roles and callers
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Employee,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Employee => "employee",
        }
    }
}

/// Identity of whoever is driving the current operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn admin(user_id: Uuid) -> Self {
        Self { user_id, role: Role::Admin }
    }

    pub fn employee(user_id: Uuid) -> Self {
        Self { user_id, role: Role::Employee }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/* -------------------------
   Studio entities
--------------------------*/

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientProfile {
    pub client_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub employee_id: Option<Uuid>,
}

impl ClientProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone)]
pub struct NewClient {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub employee_id: Option<Uuid>,
}

/// Fixed service catalog offered by the studio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceName {
    CustomTattoo,
    FlashTattoo,
    CoverUp,
    TouchUp,
    Piercing,
    Consultation,
}

impl ServiceName {
    pub const ALL: [ServiceName; 6] = [
        ServiceName::CustomTattoo,
        ServiceName::FlashTattoo,
        ServiceName::CoverUp,
        ServiceName::TouchUp,
        ServiceName::Piercing,
        ServiceName::Consultation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceName::CustomTattoo => "custom_tattoo",
            ServiceName::FlashTattoo => "flash_tattoo",
            ServiceName::CoverUp => "cover_up",
            ServiceName::TouchUp => "touch_up",
            ServiceName::Piercing => "piercing",
            ServiceName::Consultation => "consultation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    pub service_id: Uuid,
    pub name: ServiceName,
    pub description: String,
    pub price_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Canceled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Canceled => "canceled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    /// Completed, canceled and no-show appointments no longer move.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Canceled | AppointmentStatus::NoShow
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Appointment {
    pub appointment_id: Uuid,
    pub client_id: Uuid,
    pub employee_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub price_cents: i64,
    pub status: AppointmentStatus,
    pub requires_approval: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub client_id: Uuid,
    pub employee_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub price_cents: i64,
    pub status: AppointmentStatus,
    pub requires_approval: bool,
    pub notes: Option<String>,
}

/* -------------------------
   Change notifications
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    Created,
    Updated,
    Canceled,
    NoShow,
    PendingApproval,
    Approved,
    Denied,
}

impl NotificationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationAction::Created => "created",
            NotificationAction::Updated => "updated",
            NotificationAction::Canceled => "canceled",
            NotificationAction::NoShow => "no_show",
            NotificationAction::PendingApproval => "pending_approval",
            NotificationAction::Approved => "approved",
            NotificationAction::Denied => "denied",
        }
    }

    /// Actions whose outcome depends on an admin decision. The rest are
    /// audit records of something that already took effect.
    pub fn awaits_decision(self) -> bool {
        matches!(
            self,
            NotificationAction::Created
                | NotificationAction::Updated
                | NotificationAction::PendingApproval
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Approved,
    Denied,
}

impl NotificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Approved => "approved",
            NotificationStatus::Denied => "denied",
        }
    }
}

/// Appointment fields tracked by change requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentField {
    Date,
    StartTime,
    EndTime,
    Price,
    Service,
    Notes,
    Status,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: serde_json::Value,
    pub new: serde_json::Value,
}

pub type ChangeSet = BTreeMap<AppointmentField, FieldChange>;

/// Values of an appointment captured before an edit, enough to put it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentSnapshot {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub price_cents: i64,
    pub service: ServiceName,
    pub notes: Option<String>,
}

impl AppointmentSnapshot {
    pub fn capture(appointment: &Appointment, service: ServiceName) -> Self {
        Self {
            date: appointment.date,
            start_time: appointment.start_time,
            end_time: appointment.end_time,
            price_cents: appointment.price_cents,
            service,
            notes: appointment.notes.clone(),
        }
    }

    fn field_values(&self) -> [(AppointmentField, serde_json::Value); 6] {
        [
            (AppointmentField::Date, serde_json::json!(self.date)),
            (AppointmentField::StartTime, serde_json::json!(self.start_time)),
            (AppointmentField::EndTime, serde_json::json!(self.end_time)),
            (AppointmentField::Price, serde_json::json!(self.price_cents)),
            (AppointmentField::Service, serde_json::json!(self.service)),
            (AppointmentField::Notes, serde_json::json!(self.notes)),
        ]
    }

    /// Field-level diff from `self` to `next`; unchanged fields are left out.
    pub fn diff(&self, next: &AppointmentSnapshot) -> ChangeSet {
        self.field_values()
            .into_iter()
            .zip(next.field_values())
            .filter(|((_, old), (_, new))| old != new)
            .map(|((field, old), (_, new))| (field, FieldChange { old, new }))
            .collect()
    }

    /// Every field as a change from nothing, used to describe a new booking.
    pub fn as_submission(&self) -> ChangeSet {
        self.field_values()
            .into_iter()
            .map(|(field, new)| {
                (
                    field,
                    FieldChange {
                        old: serde_json::Value::Null,
                        new,
                    },
                )
            })
            .collect()
    }
}

/// Where a declined request sends the appointment back to.
#[derive(Debug, Clone, PartialEq)]
pub enum RevertPoint {
    Snapshot(AppointmentSnapshot),
    NoSnapshot,
}

impl RevertPoint {
    pub fn snapshot(&self) -> Option<&AppointmentSnapshot> {
        match self {
            RevertPoint::Snapshot(snapshot) => Some(snapshot),
            RevertPoint::NoSnapshot => None,
        }
    }
}

impl From<Option<AppointmentSnapshot>> for RevertPoint {
    fn from(value: Option<AppointmentSnapshot>) -> Self {
        value.map_or(RevertPoint::NoSnapshot, RevertPoint::Snapshot)
    }
}

impl Serialize for RevertPoint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub notification_id: Uuid,
    pub employee_id: Uuid,
    pub action: NotificationAction,
    pub appointment_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
    pub status: NotificationStatus,
    pub changes: ChangeSet,
    pub previous_details: RevertPoint,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub employee_id: Uuid,
    pub action: NotificationAction,
    pub appointment_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
    pub changes: ChangeSet,
    pub previous_details: RevertPoint,
}

/* -------------------------
   Text encodings
--------------------------*/

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

fn unknown(kind: &'static str, value: &str) -> UnknownVariant {
    UnknownVariant {
        kind,
        value: value.to_string(),
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "employee" => Ok(Role::Employee),
            other => Err(unknown("role", other)),
        }
    }
}

impl FromStr for ServiceName {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| unknown("service", s))
    }
}

impl FromStr for AppointmentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "completed" => Ok(AppointmentStatus::Completed),
            "canceled" => Ok(AppointmentStatus::Canceled),
            "no_show" => Ok(AppointmentStatus::NoShow),
            other => Err(unknown("appointment status", other)),
        }
    }
}

impl FromStr for NotificationAction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(NotificationAction::Created),
            "updated" => Ok(NotificationAction::Updated),
            "canceled" => Ok(NotificationAction::Canceled),
            "no_show" => Ok(NotificationAction::NoShow),
            "pending_approval" => Ok(NotificationAction::PendingApproval),
            "approved" => Ok(NotificationAction::Approved),
            "denied" => Ok(NotificationAction::Denied),
            other => Err(unknown("notification action", other)),
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "approved" => Ok(NotificationStatus::Approved),
            "denied" => Ok(NotificationStatus::Denied),
            other => Err(unknown("notification status", other)),
        }
    }
}
