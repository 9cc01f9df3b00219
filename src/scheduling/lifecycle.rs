// src/scheduling/lifecycle.rs

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ScheduleError,
    models::{
        Appointment, AppointmentSnapshot, AppointmentStatus, Caller, NewAppointment,
        Notification, NotificationAction, NotificationStatus, Service,
    },
    scheduling::{
        clients::{materialize_client, resolve_client, ClientRef, NewClientInput},
        conflict::{ensure_free, has_conflict, Slot},
        ledger,
        policy::{authorize, Operation},
    },
    store::{AppointmentFilter, Store},
};

/* ============================================================
   Inputs / outputs
   ============================================================ */

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAppointment {
    pub client_id: Option<Uuid>,
    pub new_client: Option<NewClientInput>,
    /// Required for admins; employees always book themselves.
    pub employee_id: Option<Uuid>,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub price_cents: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentPatch {
    pub employee_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub price_cents: Option<i64>,
    /// An empty string clears the notes.
    pub notes: Option<String>,
}

/// Appointment after a lifecycle step, plus the ledger entry it produced.
#[derive(Debug, Clone, Serialize)]
pub struct Booking {
    pub appointment: Appointment,
    pub notification: Option<Notification>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Upcoming,
    Archived,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQuery {
    pub employee_id: Option<Uuid>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// Appointment being rescheduled, ignored when checking.
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentQuery {
    pub timeframe: Option<Timeframe>,
    pub status: Option<AppointmentStatus>,
    pub employee_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
}

/* ============================================================
   Validation helpers
   ============================================================ */

fn validate_times(start: NaiveTime, end: NaiveTime) -> Result<(), ScheduleError> {
    if end <= start {
        return Err(ScheduleError::validation("end_time must be after start_time"));
    }
    Ok(())
}

/// $1,000,000 per appointment.
pub const MAX_PRICE_CENTS: i64 = 100_000_000;

fn validate_price(price_cents: Option<i64>) -> Result<i64, ScheduleError> {
    match price_cents {
        None => Err(ScheduleError::validation("price is required")),
        Some(p) if p < 0 => Err(ScheduleError::validation("price must be >= 0")),
        Some(p) if p > MAX_PRICE_CENTS => Err(ScheduleError::validation(format!(
            "price must be <= {MAX_PRICE_CENTS} cents"
        ))),
        Some(p) => Ok(p),
    }
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

async fn load_service(store: &dyn Store, service_id: Uuid) -> Result<Service, ScheduleError> {
    store
        .get_service(service_id)
        .await?
        .ok_or_else(|| ScheduleError::not_found("service", service_id))
}

async fn load_appointment(store: &dyn Store, appointment_id: Uuid) -> Result<Appointment, ScheduleError> {
    store
        .get_appointment(appointment_id)
        .await?
        .ok_or_else(|| ScheduleError::not_found("appointment", appointment_id))
}

async fn ensure_bookable_employee(store: &dyn Store, employee_id: Uuid) -> Result<(), ScheduleError> {
    let user = store
        .get_user(employee_id)
        .await?
        .ok_or_else(|| ScheduleError::not_found("employee", employee_id))?;
    if !user.is_active {
        return Err(ScheduleError::validation(format!(
            "employee {} is not active",
            user.username
        )));
    }
    Ok(())
}

fn slot_of(a: &Appointment) -> Slot {
    Slot {
        employee_id: a.employee_id,
        date: a.date,
        start_time: a.start_time,
        end_time: a.end_time,
    }
}

/* ============================================================
   Create
   ============================================================ */

pub async fn create_appointment(
    store: &dyn Store,
    caller: &Caller,
    req: CreateAppointment,
) -> Result<Booking, ScheduleError> {
    let policy = authorize(caller, Operation::CreateAppointment)?;

    let employee_id = if policy.is_authoritative() {
        req.employee_id
            .ok_or_else(|| ScheduleError::validation("employee_id is required"))?
    } else {
        match req.employee_id {
            Some(id) if id != caller.user_id => {
                return Err(ScheduleError::permission(
                    "employees can only book appointments for themselves",
                ));
            }
            _ => caller.user_id,
        }
    };

    let client = ClientRef::from_parts(req.client_id, req.new_client)?;
    let price_cents = validate_price(req.price_cents)?;
    validate_times(req.start_time, req.end_time)?;

    ensure_bookable_employee(store, employee_id).await?;
    let client = resolve_client(store, caller, client, employee_id).await?;
    let service = load_service(store, req.service_id).await?;

    let slot = Slot {
        employee_id,
        date: req.date,
        start_time: req.start_time,
        end_time: req.end_time,
    };
    ensure_free(store, &slot, None).await?;

    let client = materialize_client(store, client).await?;

    let (status, requires_approval) = if policy.is_authoritative() {
        (AppointmentStatus::Confirmed, false)
    } else {
        (AppointmentStatus::Pending, true)
    };

    let appointment = store
        .insert_appointment(NewAppointment {
            client_id: client.client_id,
            employee_id,
            service_id: service.service_id,
            date: req.date,
            start_time: req.start_time,
            end_time: req.end_time,
            price_cents,
            status,
            requires_approval,
            notes: normalize_notes(req.notes),
        })
        .await?;

    tracing::info!(
        appointment_id = %appointment.appointment_id,
        %employee_id,
        created_by = %caller.user_id,
        status = status.as_str(),
        "appointment created"
    );

    let notification = if requires_approval {
        let submitted = AppointmentSnapshot::capture(&appointment, service.name);
        Some(ledger::record_submission(store, caller.user_id, appointment.appointment_id, &submitted).await?)
    } else {
        None
    };

    Ok(Booking {
        appointment,
        notification,
    })
}

/* ============================================================
   Update / reschedule
   ============================================================ */

pub async fn update_appointment(
    store: &dyn Store,
    caller: &Caller,
    appointment_id: Uuid,
    patch: AppointmentPatch,
) -> Result<Booking, ScheduleError> {
    let policy = authorize(caller, Operation::UpdateAppointment)?;
    let current = load_appointment(store, appointment_id).await?;
    policy.ensure_covers(caller, current.employee_id, "appointment")?;

    if current.status.is_terminal() {
        return Err(ScheduleError::validation(format!(
            "a {} appointment can no longer be changed",
            current.status.as_str()
        )));
    }

    if let Some(employee_id) = patch.employee_id {
        if employee_id != current.employee_id {
            if !policy.is_authoritative() {
                return Err(ScheduleError::permission(
                    "only an admin can reassign an appointment",
                ));
            }
            ensure_bookable_employee(store, employee_id).await?;
        }
    }

    let current_service = load_service(store, current.service_id).await?;
    let next_service = match patch.service_id {
        Some(id) if id != current.service_id => load_service(store, id).await?,
        _ => current_service.clone(),
    };

    let mut next = current.clone();
    next.employee_id = patch.employee_id.unwrap_or(current.employee_id);
    next.service_id = next_service.service_id;
    next.date = patch.date.unwrap_or(current.date);
    next.start_time = patch.start_time.unwrap_or(current.start_time);
    next.end_time = patch.end_time.unwrap_or(current.end_time);
    next.price_cents = validate_price(Some(patch.price_cents.unwrap_or(current.price_cents)))?;
    if patch.notes.is_some() {
        next.notes = normalize_notes(patch.notes);
    }
    validate_times(next.start_time, next.end_time)?;

    let before = AppointmentSnapshot::capture(&current, current_service.name);
    let after = AppointmentSnapshot::capture(&next, next_service.name);
    let changes = before.diff(&after);
    let reassigned = next.employee_id != current.employee_id;

    if changes.is_empty() && !reassigned {
        return Ok(Booking {
            appointment: current,
            notification: None,
        });
    }

    ensure_free(store, &slot_of(&next), Some(appointment_id)).await?;

    if policy.is_authoritative() {
        next.status = AppointmentStatus::Confirmed;
        next.requires_approval = false;
        let appointment = store.update_appointment(&next).await?;
        ledger::close_open_requests(store, caller.user_id, appointment_id).await?;
        tracing::info!(%appointment_id, fields = changes.len(), reassigned, "appointment updated by admin");
        return Ok(Booking {
            appointment,
            notification: None,
        });
    }

    next.status = AppointmentStatus::Pending;
    next.requires_approval = true;
    let mut appointment = store.update_appointment(&next).await?;
    let notification = ledger::record_update(store, caller.user_id, appointment_id, changes, before).await?;
    if notification.status == NotificationStatus::Pending {
        tracing::info!(%appointment_id, employee_id = %caller.user_id, "appointment change awaiting approval");
    } else {
        // Edited back to what was approved; nothing left to wait for.
        appointment.status = AppointmentStatus::Confirmed;
        appointment.requires_approval = false;
        appointment = store.update_appointment(&appointment).await?;
    }

    Ok(Booking {
        appointment,
        notification: Some(notification),
    })
}

/* ============================================================
   Direct status transitions
   ============================================================ */

pub async fn transition_status(
    store: &dyn Store,
    caller: &Caller,
    appointment_id: Uuid,
    target: AppointmentStatus,
) -> Result<Booking, ScheduleError> {
    if !target.is_terminal() {
        return Err(ScheduleError::validation(format!(
            "status {} cannot be set directly",
            target.as_str()
        )));
    }

    let policy = authorize(caller, Operation::TransitionStatus)?;
    let mut appointment = load_appointment(store, appointment_id).await?;
    policy.ensure_covers(caller, appointment.employee_id, "appointment")?;

    let previous = appointment.status;
    if previous.is_terminal() {
        return Err(ScheduleError::validation(format!(
            "cannot move a {} appointment to {}",
            previous.as_str(),
            target.as_str()
        )));
    }

    appointment.status = target;
    appointment.requires_approval = false;
    let appointment = store.update_appointment(&appointment).await?;
    tracing::info!(%appointment_id, from = previous.as_str(), to = target.as_str(), by = %caller.user_id, "appointment status changed");

    let audit_action = match target {
        AppointmentStatus::NoShow => Some(NotificationAction::NoShow),
        AppointmentStatus::Canceled if !caller.is_admin() => Some(NotificationAction::Canceled),
        _ => None,
    };

    let notification = match audit_action {
        Some(action) => Some(
            ledger::record_status_change(store, caller.user_id, appointment_id, action, previous, target)
                .await?,
        ),
        None => None,
    };

    Ok(Booking {
        appointment,
        notification,
    })
}

/* ============================================================
   Reads
   ============================================================ */

pub async fn get_appointment(
    store: &dyn Store,
    caller: &Caller,
    appointment_id: Uuid,
) -> Result<Appointment, ScheduleError> {
    let policy = authorize(caller, Operation::ViewAppointments)?;
    let appointment = load_appointment(store, appointment_id).await?;
    policy.ensure_covers(caller, appointment.employee_id, "appointment")?;
    Ok(appointment)
}

/// Whether a slot is free before the caller commits to a booking.
pub async fn check_availability(
    store: &dyn Store,
    caller: &Caller,
    query: &AvailabilityQuery,
) -> Result<bool, ScheduleError> {
    let policy = authorize(caller, Operation::ViewAppointments)?;
    let employee_id = query.employee_id.unwrap_or(caller.user_id);
    policy.ensure_covers(caller, employee_id, "schedule")?;
    validate_times(query.start_time, query.end_time)?;

    let slot = Slot {
        employee_id,
        date: query.date,
        start_time: query.start_time,
        end_time: query.end_time,
    };
    Ok(!has_conflict(store, &slot, query.exclude_appointment_id).await?)
}

/// Upcoming means today or later; archived is everything before today.
pub async fn list_appointments(
    store: &dyn Store,
    caller: &Caller,
    query: &AppointmentQuery,
    today: NaiveDate,
) -> Result<Vec<Appointment>, ScheduleError> {
    let policy = authorize(caller, Operation::ViewAppointments)?;

    let employee_id = match (policy.owner_filter(caller), query.employee_id) {
        (Some(own), Some(requested)) if own != requested => {
            return Err(ScheduleError::permission(
                "employees can only list their own appointments",
            ));
        }
        (Some(own), _) => Some(own),
        (None, requested) => requested,
    };

    let mut filter = AppointmentFilter {
        employee_id,
        client_id: query.client_id,
        status: query.status,
        ..AppointmentFilter::default()
    };
    match query.timeframe {
        Some(Timeframe::Upcoming) => filter.date_from = Some(today),
        Some(Timeframe::Archived) => filter.date_to = today.pred_opt(),
        None => {}
    }

    Ok(store.list_appointments(&filter).await?)
}
