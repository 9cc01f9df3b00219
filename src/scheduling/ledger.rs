// src/scheduling/ledger.rs

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    error::ScheduleError,
    models::{
        Appointment, AppointmentField, AppointmentSnapshot, AppointmentStatus, Caller, ChangeSet,
        FieldChange, NewNotification, Notification, NotificationAction, NotificationStatus,
        RevertPoint,
    },
    scheduling::{
        conflict::{ensure_free, Slot},
        policy::{authorize, Operation, Scope},
    },
    store::{NotificationFilter, Store, StoreError},
};

/* ============================================================
   Recording
   ============================================================ */

/// A brand-new booking awaiting approval. There is nothing to revert to,
/// so declining it cancels the appointment.
pub async fn record_submission(
    store: &dyn Store,
    employee_id: Uuid,
    appointment_id: Uuid,
    submitted: &AppointmentSnapshot,
) -> Result<Notification, ScheduleError> {
    let n = store
        .insert_notification(NewNotification {
            employee_id,
            action: NotificationAction::Created,
            appointment_id: Some(appointment_id),
            recorded_at: Utc::now(),
            changes: submitted.as_submission(),
            previous_details: RevertPoint::NoSnapshot,
        })
        .await?;
    tracing::info!(notification_id = %n.notification_id, %appointment_id, "booking request recorded");
    Ok(n)
}

/// Folds `incoming` into an open request: the first recorded `old` stays,
/// the latest `new` wins, and fields edited back to their original value
/// drop out.
pub fn merge_changes(existing: &mut ChangeSet, incoming: ChangeSet) {
    for (field, change) in incoming {
        existing
            .entry(field)
            .and_modify(|c| c.new = change.new.clone())
            .or_insert(change);
    }
    existing.retain(|_, c| c.old != c.new);
}

const MERGE_ATTEMPTS: usize = 3;

async fn find_open_request(
    store: &dyn Store,
    employee_id: Uuid,
    appointment_id: Uuid,
) -> Result<Option<Notification>, ScheduleError> {
    if let Some(n) = store
        .find_open_notification(appointment_id, employee_id, NotificationAction::Created)
        .await?
    {
        return Ok(Some(n));
    }
    Ok(store
        .find_open_notification(appointment_id, employee_id, NotificationAction::Updated)
        .await?)
}

/// Records an employee edit. Repeated edits to the same appointment while
/// a request is still open extend that request instead of opening another.
/// Edits to a booking that was never approved fold into its `created`
/// request, so declining still cancels it.
///
/// When the merged `updated` request ends up with nothing left to review it
/// is returned already approved; the caller restores the appointment.
pub async fn record_update(
    store: &dyn Store,
    employee_id: Uuid,
    appointment_id: Uuid,
    changes: ChangeSet,
    before: AppointmentSnapshot,
) -> Result<Notification, ScheduleError> {
    for _ in 0..MERGE_ATTEMPTS {
        let Some(mut n) = find_open_request(store, employee_id, appointment_id).await? else {
            let inserted = store
                .insert_notification(NewNotification {
                    employee_id,
                    action: NotificationAction::Updated,
                    appointment_id: Some(appointment_id),
                    recorded_at: Utc::now(),
                    changes: changes.clone(),
                    previous_details: RevertPoint::Snapshot(before.clone()),
                })
                .await;
            match inserted {
                Ok(n) => {
                    tracing::info!(notification_id = %n.notification_id, %appointment_id, "change request recorded");
                    return Ok(n);
                }
                // Another edit opened the request first; merge into it.
                Err(StoreError::Constraint(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        };

        let seen_at = n.recorded_at;
        merge_changes(&mut n.changes, changes.clone());
        n.recorded_at = Utc::now();
        let withdrawn = n.changes.is_empty() && n.action == NotificationAction::Updated;
        if withdrawn {
            n.status = NotificationStatus::Approved;
            n.previous_details = RevertPoint::NoSnapshot;
        }

        if store.extend_notification(&n, seen_at).await? {
            if withdrawn {
                tracing::info!(notification_id = %n.notification_id, %appointment_id, "change request withdrawn, nothing left to review");
            } else {
                tracing::info!(notification_id = %n.notification_id, %appointment_id, "change request extended");
            }
            return Ok(n);
        }
        tracing::debug!(notification_id = %n.notification_id, "change request moved underneath, merging again");
    }

    Err(ScheduleError::Conflict(format!(
        "change request for appointment {appointment_id} is being modified concurrently, retry"
    )))
}

/// Audit entry for a status change that already took effect.
pub async fn record_status_change(
    store: &dyn Store,
    employee_id: Uuid,
    appointment_id: Uuid,
    action: NotificationAction,
    old: AppointmentStatus,
    new: AppointmentStatus,
) -> Result<Notification, ScheduleError> {
    let mut changes = ChangeSet::new();
    changes.insert(
        AppointmentField::Status,
        FieldChange {
            old: serde_json::json!(old),
            new: serde_json::json!(new),
        },
    );

    Ok(store
        .insert_notification(NewNotification {
            employee_id,
            action,
            appointment_id: Some(appointment_id),
            recorded_at: Utc::now(),
            changes,
            previous_details: RevertPoint::NoSnapshot,
        })
        .await?)
}

/// Approves every open request on an appointment an admin has just edited.
/// The admin's version is final, so none of them may revert it later.
pub async fn close_open_requests(
    store: &dyn Store,
    reviewer: Uuid,
    appointment_id: Uuid,
) -> Result<usize, ScheduleError> {
    let open = store
        .list_notifications(&NotificationFilter {
            appointment_id: Some(appointment_id),
            status: Some(NotificationStatus::Pending),
            ..NotificationFilter::default()
        })
        .await?;

    let mut closed = 0;
    for n in open.iter().filter(|n| n.action.awaits_decision()) {
        if store
            .review_notification(n.notification_id, NotificationStatus::Approved)
            .await?
            .is_some()
        {
            closed += 1;
        }
    }
    if closed > 0 {
        tracing::info!(%appointment_id, %reviewer, closed, "open requests settled by admin edit");
    }
    Ok(closed)
}

/* ============================================================
   Review
   ============================================================ */

async fn load_notification(store: &dyn Store, notification_id: Uuid) -> Result<Notification, ScheduleError> {
    store
        .get_notification(notification_id)
        .await?
        .ok_or_else(|| ScheduleError::not_found("notification", notification_id))
}

async fn load_pending(store: &dyn Store, notification_id: Uuid) -> Result<Notification, ScheduleError> {
    let n = load_notification(store, notification_id).await?;
    if n.status != NotificationStatus::Pending {
        tracing::warn!(%notification_id, status = n.status.as_str(), "notification already reviewed");
        return Err(ScheduleError::AlreadyReviewed(notification_id));
    }
    Ok(n)
}

/// Moves the notification out of `pending`. Only one reviewer can win this;
/// everyone else gets [`ScheduleError::AlreadyReviewed`].
async fn claim(
    store: &dyn Store,
    notification_id: Uuid,
    status: NotificationStatus,
) -> Result<Notification, ScheduleError> {
    store
        .review_notification(notification_id, status)
        .await?
        .ok_or_else(|| {
            tracing::warn!(%notification_id, "notification reviewed concurrently");
            ScheduleError::AlreadyReviewed(notification_id)
        })
}

/// Puts a claimed notification back to `pending` after its side effect failed.
async fn reopen(store: &dyn Store, claimed: &Notification, revert_point: RevertPoint) {
    let mut back = claimed.clone();
    back.status = NotificationStatus::Pending;
    back.previous_details = revert_point;
    match store.update_notification(&back).await {
        Ok(()) => tracing::warn!(notification_id = %back.notification_id, "review rolled back"),
        Err(e) => tracing::error!(notification_id = %back.notification_id, error = %e, "could not reopen notification"),
    }
}

async fn linked_appointment(store: &dyn Store, n: &Notification) -> Result<Option<Appointment>, ScheduleError> {
    match n.appointment_id {
        Some(id) => Ok(store.get_appointment(id).await?),
        None => Ok(None),
    }
}

/// Linked appointment, unless it has already reached a terminal state.
async fn open_appointment(store: &dyn Store, n: &Notification) -> Result<Option<Appointment>, ScheduleError> {
    Ok(linked_appointment(store, n)
        .await?
        .filter(|a| !a.status.is_terminal()))
}

/// Puts every snapshotted field back and marks the appointment confirmed.
async fn restore_snapshot(
    store: &dyn Store,
    mut appointment: Appointment,
    snapshot: &AppointmentSnapshot,
) -> Result<Appointment, ScheduleError> {
    let service = store
        .find_service_by_name(snapshot.service)
        .await?
        .ok_or_else(|| ScheduleError::not_found("service", snapshot.service.as_str()))?;

    let slot = Slot {
        employee_id: appointment.employee_id,
        date: snapshot.date,
        start_time: snapshot.start_time,
        end_time: snapshot.end_time,
    };
    ensure_free(store, &slot, Some(appointment.appointment_id)).await?;

    appointment.date = snapshot.date;
    appointment.start_time = snapshot.start_time;
    appointment.end_time = snapshot.end_time;
    appointment.price_cents = snapshot.price_cents;
    appointment.service_id = service.service_id;
    appointment.notes = snapshot.notes.clone();
    appointment.status = AppointmentStatus::Confirmed;
    appointment.requires_approval = false;

    let restored = store.update_appointment(&appointment).await?;
    tracing::info!(appointment_id = %restored.appointment_id, "appointment reverted to snapshot");
    Ok(restored)
}

async fn confirm_linked(store: &dyn Store, n: &Notification) -> Result<(), ScheduleError> {
    if !n.action.awaits_decision() {
        return Ok(());
    }
    if let Some(mut appointment) = open_appointment(store, n).await? {
        appointment.status = AppointmentStatus::Confirmed;
        appointment.requires_approval = false;
        store.update_appointment(&appointment).await?;
    }
    Ok(())
}

async fn reject_linked(store: &dyn Store, n: &Notification, revert_point: &RevertPoint) -> Result<(), ScheduleError> {
    if !n.action.awaits_decision() {
        return Ok(());
    }
    if let Some(mut appointment) = open_appointment(store, n).await? {
        match revert_point {
            RevertPoint::Snapshot(snapshot) => {
                restore_snapshot(store, appointment, snapshot).await?;
            }
            RevertPoint::NoSnapshot => {
                appointment.status = AppointmentStatus::Canceled;
                appointment.requires_approval = false;
                store.update_appointment(&appointment).await?;
            }
        }
    }
    Ok(())
}

/// Admin accepts a request. Approving twice fails with
/// [`ScheduleError::AlreadyReviewed`] and changes nothing.
pub async fn approve(
    store: &dyn Store,
    caller: &Caller,
    notification_id: Uuid,
) -> Result<Notification, ScheduleError> {
    authorize(caller, Operation::ReviewNotification)?;
    let pending = load_pending(store, notification_id).await?;
    let n = claim(store, notification_id, NotificationStatus::Approved).await?;

    if let Err(e) = confirm_linked(store, &n).await {
        reopen(store, &n, pending.previous_details).await;
        return Err(e);
    }

    tracing::info!(%notification_id, reviewer = %caller.user_id, action = n.action.as_str(), "request approved");
    Ok(n)
}

/// Admin rejects a request: edits are rolled back to the snapshot, brand-new
/// bookings are canceled.
pub async fn decline(
    store: &dyn Store,
    caller: &Caller,
    notification_id: Uuid,
) -> Result<Notification, ScheduleError> {
    authorize(caller, Operation::ReviewNotification)?;
    // The claim drops the snapshot; revert from the copy read before it.
    let pending = load_pending(store, notification_id).await?;
    let n = claim(store, notification_id, NotificationStatus::Denied).await?;

    if let Err(e) = reject_linked(store, &n, &pending.previous_details).await {
        reopen(store, &n, pending.previous_details).await;
        return Err(e);
    }

    tracing::info!(%notification_id, reviewer = %caller.user_id, action = n.action.as_str(), "request declined");
    Ok(n)
}

/// Removes a notification. A still-open edit request is rolled back first,
/// exactly as if it had been declined.
pub async fn delete_notification(
    store: &dyn Store,
    caller: &Caller,
    notification_id: Uuid,
) -> Result<(), ScheduleError> {
    authorize(caller, Operation::ReviewNotification)?;
    let n = load_notification(store, notification_id).await?;

    if n.action == NotificationAction::Updated && n.status == NotificationStatus::Pending {
        if let RevertPoint::Snapshot(snapshot) = &n.previous_details {
            // A reviewer who got there first already settled the appointment.
            if let Some(claimed) = store
                .review_notification(notification_id, NotificationStatus::Denied)
                .await?
            {
                if let Some(appointment) = open_appointment(store, &claimed).await? {
                    if let Err(e) = restore_snapshot(store, appointment, snapshot).await {
                        reopen(store, &claimed, n.previous_details.clone()).await;
                        return Err(e);
                    }
                }
            }
        }
    }

    if !store.delete_notification(notification_id).await? {
        return Err(ScheduleError::not_found("notification", notification_id));
    }
    tracing::info!(%notification_id, "notification deleted");
    Ok(())
}

/* ============================================================
   Feed
   ============================================================ */

/// Notifications visible to `caller`, newest first. Anything older than the
/// retention window is purged before reading.
pub async fn feed(
    store: &dyn Store,
    caller: &Caller,
    status: Option<NotificationStatus>,
    now: DateTime<Utc>,
    retention_days: i64,
) -> Result<Vec<Notification>, ScheduleError> {
    let policy = authorize(caller, Operation::ViewNotifications)?;

    let purged = store
        .purge_notifications_before(now - Duration::days(retention_days))
        .await?;
    if purged > 0 {
        tracing::info!(purged, retention_days, "expired notifications purged");
    }

    let filter = NotificationFilter {
        employee_id: policy.owner_filter(caller),
        exclude_employee_id: (policy.scope == Scope::Others).then_some(caller.user_id),
        status,
        ..NotificationFilter::default()
    };
    Ok(store.list_notifications(&filter).await?)
}
