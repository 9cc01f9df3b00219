// src/scheduling/conflict.rs

use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use crate::{
    error::ScheduleError,
    models::{Appointment, AppointmentStatus},
    store::{AppointmentFilter, Store},
};

/// A requested block of one employee's time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub employee_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// Half-open interval overlap: touching end-to-start is not a clash.
pub fn overlaps(a_start: NaiveTime, a_end: NaiveTime, b_start: NaiveTime, b_end: NaiveTime) -> bool {
    a_start < b_end && a_end > b_start
}

/// First appointment that would double-book `slot`, skipping `exclude`
/// (the appointment being edited) and canceled bookings.
pub async fn find_conflict(
    store: &dyn Store,
    slot: &Slot,
    exclude: Option<Uuid>,
) -> Result<Option<Appointment>, ScheduleError> {
    let filter = AppointmentFilter {
        employee_id: Some(slot.employee_id),
        date_from: Some(slot.date),
        date_to: Some(slot.date),
        ..AppointmentFilter::default()
    };

    let existing = store.list_appointments(&filter).await?;

    Ok(existing.into_iter().find(|a| {
        Some(a.appointment_id) != exclude
            && a.status != AppointmentStatus::Canceled
            && overlaps(a.start_time, a.end_time, slot.start_time, slot.end_time)
    }))
}

pub async fn has_conflict(
    store: &dyn Store,
    slot: &Slot,
    exclude: Option<Uuid>,
) -> Result<bool, ScheduleError> {
    Ok(find_conflict(store, slot, exclude).await?.is_some())
}

/// Fails with a conflict error naming the clashing booking.
pub async fn ensure_free(
    store: &dyn Store,
    slot: &Slot,
    exclude: Option<Uuid>,
) -> Result<(), ScheduleError> {
    match find_conflict(store, slot, exclude).await? {
        None => Ok(()),
        Some(existing) => {
            tracing::warn!(
                employee_id = %slot.employee_id,
                date = %slot.date,
                conflicting = %existing.appointment_id,
                "double booking rejected"
            );
            Err(ScheduleError::Conflict(format!(
                "employee already booked on {} from {} to {} (appointment {})",
                existing.date,
                existing.start_time.format("%H:%M"),
                existing.end_time.format("%H:%M"),
                existing.appointment_id
            )))
        }
    }
}
