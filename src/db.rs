use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use uuid::Uuid;

use crate::{
    models::{
        Appointment, AppointmentSnapshot, ChangeSet, ClientProfile, NewAppointment, NewClient,
        NewNotification, Notification, NotificationAction, NotificationStatus, Service, ServiceName,
        User,
    },
    store::{AppointmentFilter, AppointmentTotals, NotificationFilter, Store, StoreError},
};

pub async fn connect_pg(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/* ============================================================
   Errors
   ============================================================ */

fn store_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        // 23505 unique_violation, 23P01 exclusion_violation
        if db.code().is_some_and(|c| matches!(&*c, "23505" | "23P01")) {
            return StoreError::Constraint(format!(
                "constraint {} rejected the write",
                db.constraint().unwrap_or("unknown")
            ));
        }
    }
    StoreError::Backend(format!("db error: {e}"))
}

fn decode_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("row decode error: {e}"))
}

/* ============================================================
   Rows
   ============================================================ */

#[derive(Debug, sqlx::FromRow)]
struct StudioUserRow {
    user_id: Uuid,
    username: String,
    display_name: String,
    role: String,
    is_active: bool,
}

impl TryFrom<StudioUserRow> for User {
    type Error = StoreError;

    fn try_from(r: StudioUserRow) -> Result<Self, Self::Error> {
        Ok(User {
            user_id: r.user_id,
            username: r.username,
            display_name: r.display_name,
            role: r.role.parse().map_err(decode_err)?,
            is_active: r.is_active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ClientRow {
    client_id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    employee_id: Option<Uuid>,
}

impl From<ClientRow> for ClientProfile {
    fn from(r: ClientRow) -> Self {
        ClientProfile {
            client_id: r.client_id,
            first_name: r.first_name,
            last_name: r.last_name,
            email: r.email,
            phone: r.phone,
            employee_id: r.employee_id,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ServiceRow {
    service_id: Uuid,
    name: String,
    description: String,
    price_cents: i64,
}

impl TryFrom<ServiceRow> for Service {
    type Error = StoreError;

    fn try_from(r: ServiceRow) -> Result<Self, Self::Error> {
        Ok(Service {
            service_id: r.service_id,
            name: r.name.parse().map_err(decode_err)?,
            description: r.description,
            price_cents: r.price_cents,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AppointmentRow {
    appointment_id: Uuid,
    client_id: Uuid,
    employee_id: Uuid,
    service_id: Uuid,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    price_cents: i64,
    status: String,
    requires_approval: bool,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = StoreError;

    fn try_from(r: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(Appointment {
            appointment_id: r.appointment_id,
            client_id: r.client_id,
            employee_id: r.employee_id,
            service_id: r.service_id,
            date: r.date,
            start_time: r.start_time,
            end_time: r.end_time,
            price_cents: r.price_cents,
            status: r.status.parse().map_err(decode_err)?,
            requires_approval: r.requires_approval,
            notes: r.notes,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    notification_id: Uuid,
    employee_id: Uuid,
    action: String,
    appointment_id: Option<Uuid>,
    recorded_at: DateTime<Utc>,
    status: String,
    changes: Json<ChangeSet>,
    previous_details: Option<Json<AppointmentSnapshot>>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(r: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Notification {
            notification_id: r.notification_id,
            employee_id: r.employee_id,
            action: r.action.parse().map_err(decode_err)?,
            appointment_id: r.appointment_id,
            recorded_at: r.recorded_at,
            status: r.status.parse().map_err(decode_err)?,
            changes: r.changes.0,
            previous_details: r.previous_details.map(|j| j.0).into(),
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

const USER_COLUMNS: &str = "user_id, username, display_name, role, is_active";
const CLIENT_COLUMNS: &str = "client_id, first_name, last_name, email, phone, employee_id";
const SERVICE_COLUMNS: &str = "service_id, name, description, price_cents";
const APPOINTMENT_COLUMNS: &str = "appointment_id, client_id, employee_id, service_id, date, \
     start_time, end_time, price_cents, status, requires_approval, notes, created_at, updated_at";
const NOTIFICATION_COLUMNS: &str = "notification_id, employee_id, action, appointment_id, \
     recorded_at, status, changes, previous_details";

// Shared WHERE clause for appointment filters; NULL parameters disable a condition.
const APPOINTMENT_FILTER: &str = r#"
    WHERE ($1::uuid IS NULL OR employee_id = $1)
      AND ($2::uuid IS NULL OR client_id = $2)
      AND ($3::text IS NULL OR status = $3)
      AND ($4::date IS NULL OR date >= $4)
      AND ($5::date IS NULL OR date <= $5)
"#;

/* ============================================================
   PgStore
   ============================================================ */

/// [`Store`] backed by Postgres. Overlap and duplicate-request races are
/// closed by the exclusion constraint and partial unique index in the schema;
/// reviews and request merges are conditional updates on the pending row.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM studio_user WHERE user_id = $1");
        sqlx::query_as::<_, StudioUserRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .map(User::try_from)
            .transpose()
    }

    async fn get_users(&self, user_ids: &[Uuid]) -> Result<Vec<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM studio_user WHERE user_id = ANY($1)");
        let rows = sqlx::query_as::<_, StudioUserRow>(&sql)
            .bind(user_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        convert_all(rows)
    }

    async fn get_client(&self, client_id: Uuid) -> Result<Option<ClientProfile>, StoreError> {
        let sql = format!("SELECT {CLIENT_COLUMNS} FROM client_profile WHERE client_id = $1");
        let row = sqlx::query_as::<_, ClientRow>(&sql)
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.map(ClientProfile::from))
    }

    async fn get_clients(&self, client_ids: &[Uuid]) -> Result<Vec<ClientProfile>, StoreError> {
        let sql = format!("SELECT {CLIENT_COLUMNS} FROM client_profile WHERE client_id = ANY($1)");
        let rows = sqlx::query_as::<_, ClientRow>(&sql)
            .bind(client_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(rows.into_iter().map(ClientProfile::from).collect())
    }

    async fn find_client_by_email(&self, email: &str) -> Result<Option<ClientProfile>, StoreError> {
        let sql = format!("SELECT {CLIENT_COLUMNS} FROM client_profile WHERE lower(email) = lower($1)");
        let row = sqlx::query_as::<_, ClientRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.map(ClientProfile::from))
    }

    async fn insert_client(&self, client: NewClient) -> Result<ClientProfile, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO client_profile (first_name, last_name, email, phone, employee_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {CLIENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ClientRow>(&sql)
            .bind(&client.first_name)
            .bind(&client.last_name)
            .bind(&client.email)
            .bind(&client.phone)
            .bind(client.employee_id)
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.into())
    }

    async fn list_clients(&self, employee_id: Option<Uuid>) -> Result<Vec<ClientProfile>, StoreError> {
        let sql = format!(
            r#"
            SELECT {CLIENT_COLUMNS} FROM client_profile
            WHERE ($1::uuid IS NULL OR employee_id = $1)
            ORDER BY last_name, first_name
            "#
        );
        let rows = sqlx::query_as::<_, ClientRow>(&sql)
            .bind(employee_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(rows.into_iter().map(ClientProfile::from).collect())
    }

    async fn update_client(&self, c: &ClientProfile) -> Result<ClientProfile, StoreError> {
        let sql = format!(
            r#"
            UPDATE client_profile
            SET first_name = $2,
                last_name = $3,
                email = $4,
                phone = $5,
                employee_id = $6
            WHERE client_id = $1
            RETURNING {CLIENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ClientRow>(&sql)
            .bind(c.client_id)
            .bind(&c.first_name)
            .bind(&c.last_name)
            .bind(&c.email)
            .bind(&c.phone)
            .bind(c.employee_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .ok_or_else(|| StoreError::Backend(format!("client {} vanished", c.client_id)))?;
        Ok(row.into())
    }

    // Appointments go with the client (ON DELETE CASCADE).
    async fn delete_client(&self, client_id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM client_profile WHERE client_id = $1")
            .bind(client_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>, StoreError> {
        let sql = format!("SELECT {SERVICE_COLUMNS} FROM service WHERE service_id = $1");
        sqlx::query_as::<_, ServiceRow>(&sql)
            .bind(service_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .map(Service::try_from)
            .transpose()
    }

    async fn find_service_by_name(&self, name: ServiceName) -> Result<Option<Service>, StoreError> {
        let sql = format!("SELECT {SERVICE_COLUMNS} FROM service WHERE name = $1");
        sqlx::query_as::<_, ServiceRow>(&sql)
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .map(Service::try_from)
            .transpose()
    }

    async fn list_services(&self) -> Result<Vec<Service>, StoreError> {
        let sql = format!("SELECT {SERVICE_COLUMNS} FROM service ORDER BY name");
        let rows = sqlx::query_as::<_, ServiceRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        convert_all(rows)
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointment WHERE appointment_id = $1");
        sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(appointment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .map(Appointment::try_from)
            .transpose()
    }

    async fn insert_appointment(&self, a: NewAppointment) -> Result<Appointment, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO appointment (
                client_id, employee_id, service_id, date, start_time, end_time,
                price_cents, status, requires_approval, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(a.client_id)
            .bind(a.employee_id)
            .bind(a.service_id)
            .bind(a.date)
            .bind(a.start_time)
            .bind(a.end_time)
            .bind(a.price_cents)
            .bind(a.status.as_str())
            .bind(a.requires_approval)
            .bind(&a.notes)
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        row.try_into()
    }

    async fn update_appointment(&self, a: &Appointment) -> Result<Appointment, StoreError> {
        let sql = format!(
            r#"
            UPDATE appointment
            SET employee_id = $2,
                service_id = $3,
                date = $4,
                start_time = $5,
                end_time = $6,
                price_cents = $7,
                status = $8,
                requires_approval = $9,
                notes = $10,
                updated_at = now()
            WHERE appointment_id = $1
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(a.appointment_id)
            .bind(a.employee_id)
            .bind(a.service_id)
            .bind(a.date)
            .bind(a.start_time)
            .bind(a.end_time)
            .bind(a.price_cents)
            .bind(a.status.as_str())
            .bind(a.requires_approval)
            .bind(&a.notes)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .ok_or_else(|| StoreError::Backend(format!("appointment {} vanished", a.appointment_id)))?;
        row.try_into()
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointment {APPOINTMENT_FILTER} \
             ORDER BY date, start_time, appointment_id"
        );
        let rows = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(filter.employee_id)
            .bind(filter.client_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.date_from)
            .bind(filter.date_to)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        convert_all(rows)
    }

    async fn appointment_totals(&self, filter: &AppointmentFilter) -> Result<AppointmentTotals, StoreError> {
        let sql = format!(
            r#"
            SELECT COALESCE(SUM(price_cents), 0)::BIGINT AS revenue_cents,
                   COUNT(*)::BIGINT AS appointment_count,
                   COUNT(DISTINCT client_id)::BIGINT AS distinct_clients
            FROM appointment
            {APPOINTMENT_FILTER}
            "#
        );
        let (revenue_cents, appointment_count, distinct_clients): (i64, i64, i64) = sqlx::query_as(&sql)
            .bind(filter.employee_id)
            .bind(filter.client_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.date_from)
            .bind(filter.date_to)
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(AppointmentTotals {
            revenue_cents,
            appointment_count,
            distinct_clients,
        })
    }

    async fn get_notification(&self, notification_id: Uuid) -> Result<Option<Notification>, StoreError> {
        let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notification WHERE notification_id = $1");
        sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(notification_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .map(Notification::try_from)
            .transpose()
    }

    async fn find_open_notification(
        &self,
        appointment_id: Uuid,
        employee_id: Uuid,
        action: NotificationAction,
    ) -> Result<Option<Notification>, StoreError> {
        let sql = format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS} FROM notification
            WHERE appointment_id = $1
              AND employee_id = $2
              AND action = $3
              AND status = 'pending'
            ORDER BY recorded_at DESC
            LIMIT 1
            "#
        );
        sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(appointment_id)
            .bind(employee_id)
            .bind(action.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .map(Notification::try_from)
            .transpose()
    }

    async fn insert_notification(&self, n: NewNotification) -> Result<Notification, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO notification (
                employee_id, action, appointment_id, recorded_at, status, changes, previous_details
            )
            VALUES ($1, $2, $3, $4, 'pending', $5, $6)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(n.employee_id)
            .bind(n.action.as_str())
            .bind(n.appointment_id)
            .bind(n.recorded_at)
            .bind(Json(&n.changes))
            .bind(n.previous_details.snapshot().map(Json))
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        row.try_into()
    }

    async fn update_notification(&self, n: &Notification) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE notification
            SET status = $2,
                changes = $3,
                previous_details = $4,
                recorded_at = $5
            WHERE notification_id = $1
            "#,
        )
        .bind(n.notification_id)
        .bind(n.status.as_str())
        .bind(Json(&n.changes))
        .bind(n.previous_details.snapshot().map(Json))
        .bind(n.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn extend_notification(&self, n: &Notification, seen_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE notification
            SET status = $2,
                changes = $3,
                previous_details = $4,
                recorded_at = $5
            WHERE notification_id = $1
              AND status = 'pending'
              AND recorded_at = $6
            "#,
        )
        .bind(n.notification_id)
        .bind(n.status.as_str())
        .bind(Json(&n.changes))
        .bind(n.previous_details.snapshot().map(Json))
        .bind(n.recorded_at)
        .bind(seen_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn review_notification(
        &self,
        notification_id: Uuid,
        status: NotificationStatus,
    ) -> Result<Option<Notification>, StoreError> {
        let sql = format!(
            r#"
            UPDATE notification
            SET status = $2,
                previous_details = NULL
            WHERE notification_id = $1
              AND status = 'pending'
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(notification_id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .map(Notification::try_from)
            .transpose()
    }

    async fn delete_notification(&self, notification_id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM notification WHERE notification_id = $1")
            .bind(notification_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_notifications(&self, filter: &NotificationFilter) -> Result<Vec<Notification>, StoreError> {
        let sql = format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS} FROM notification
            WHERE ($1::uuid IS NULL OR employee_id = $1)
              AND ($2::uuid IS NULL OR employee_id <> $2)
              AND ($3::text IS NULL OR status = $3)
              AND ($4::uuid IS NULL OR appointment_id = $4)
            ORDER BY recorded_at DESC
            "#
        );
        let rows = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(filter.employee_id)
            .bind(filter.exclude_employee_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.appointment_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        convert_all(rows)
    }

    async fn purge_notifications_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM notification WHERE recorded_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(res.rows_affected())
    }
}
