use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentStatus, ClientProfile, NewAppointment, NewClient, NewNotification,
    Notification, NotificationAction, NotificationStatus, Service, ServiceName, User,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness or exclusion rule rejected the write.
    #[error("{0}")]
    Constraint(String),
    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub employee_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    /// Inclusive.
    pub date_from: Option<NaiveDate>,
    /// Inclusive.
    pub date_to: Option<NaiveDate>,
}

impl AppointmentFilter {
    pub fn matches(&self, a: &Appointment) -> bool {
        self.employee_id.is_none_or(|id| a.employee_id == id)
            && self.client_id.is_none_or(|id| a.client_id == id)
            && self.status.is_none_or(|s| a.status == s)
            && self.date_from.is_none_or(|d| a.date >= d)
            && self.date_to.is_none_or(|d| a.date <= d)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppointmentTotals {
    pub revenue_cents: i64,
    pub appointment_count: i64,
    pub distinct_clients: i64,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    pub employee_id: Option<Uuid>,
    pub exclude_employee_id: Option<Uuid>,
    pub status: Option<NotificationStatus>,
    pub appointment_id: Option<Uuid>,
}

impl NotificationFilter {
    pub fn matches(&self, n: &Notification) -> bool {
        self.employee_id.is_none_or(|id| n.employee_id == id)
            && self.exclude_employee_id.is_none_or(|id| n.employee_id != id)
            && self.status.is_none_or(|s| n.status == s)
            && self.appointment_id.is_none_or(|id| n.appointment_id == Some(id))
    }
}

/// Persistence seam of the scheduling core.
///
/// Each method is a single atomic statement. Listing methods return rows in
/// a stable order: appointments by date then start time, notifications
/// newest first.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;
    async fn get_users(&self, user_ids: &[Uuid]) -> Result<Vec<User>, StoreError>;

    async fn get_client(&self, client_id: Uuid) -> Result<Option<ClientProfile>, StoreError>;
    async fn get_clients(&self, client_ids: &[Uuid]) -> Result<Vec<ClientProfile>, StoreError>;
    async fn find_client_by_email(&self, email: &str) -> Result<Option<ClientProfile>, StoreError>;
    async fn insert_client(&self, client: NewClient) -> Result<ClientProfile, StoreError>;
    async fn list_clients(&self, employee_id: Option<Uuid>) -> Result<Vec<ClientProfile>, StoreError>;
    async fn update_client(&self, client: &ClientProfile) -> Result<ClientProfile, StoreError>;
    /// Deletes the profile together with its appointments.
    async fn delete_client(&self, client_id: Uuid) -> Result<bool, StoreError>;

    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>, StoreError>;
    async fn find_service_by_name(&self, name: ServiceName) -> Result<Option<Service>, StoreError>;
    async fn list_services(&self) -> Result<Vec<Service>, StoreError>;

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError>;
    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, StoreError>;
    async fn update_appointment(&self, appointment: &Appointment) -> Result<Appointment, StoreError>;
    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError>;
    async fn appointment_totals(&self, filter: &AppointmentFilter) -> Result<AppointmentTotals, StoreError>;

    async fn get_notification(&self, notification_id: Uuid) -> Result<Option<Notification>, StoreError>;
    async fn find_open_notification(
        &self,
        appointment_id: Uuid,
        employee_id: Uuid,
        action: NotificationAction,
    ) -> Result<Option<Notification>, StoreError>;
    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, StoreError>;
    /// Unconditional overwrite.
    async fn update_notification(&self, notification: &Notification) -> Result<(), StoreError>;
    /// Overwrites the row, but only if it is still pending and still carries
    /// `seen_at` as its `recorded_at`. Returns whether the write landed.
    async fn extend_notification(&self, notification: &Notification, seen_at: DateTime<Utc>) -> Result<bool, StoreError>;
    /// Moves a pending notification to `status` and drops its snapshot.
    /// `None` when it was not pending (or does not exist).
    async fn review_notification(
        &self,
        notification_id: Uuid,
        status: NotificationStatus,
    ) -> Result<Option<Notification>, StoreError>;
    async fn delete_notification(&self, notification_id: Uuid) -> Result<bool, StoreError>;
    async fn list_notifications(&self, filter: &NotificationFilter) -> Result<Vec<Notification>, StoreError>;
    async fn purge_notifications_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[cfg(test)]
pub mod memory {
    //! In-process store backing the scheduling tests.

    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;

    use super::*;
    use crate::models::{NotificationStatus, RevertPoint, Role};

    #[derive(Default)]
    struct Tables {
        users: BTreeMap<Uuid, User>,
        clients: BTreeMap<Uuid, ClientProfile>,
        services: BTreeMap<Uuid, Service>,
        appointments: BTreeMap<Uuid, Appointment>,
        notifications: BTreeMap<Uuid, Notification>,
    }

    type Interference = Box<dyn FnOnce(&mut Notification) + Send>;

    #[derive(Default)]
    pub struct MemoryStore {
        tables: Mutex<Tables>,
        interference: Mutex<Option<Interference>>,
    }

    impl MemoryStore {
        fn with<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
            let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut tables)
        }

        pub fn add_user(&self, username: &str, role: Role) -> Uuid {
            let user_id = Uuid::new_v4();
            self.with(|t| {
                t.users.insert(
                    user_id,
                    User {
                        user_id,
                        username: username.to_string(),
                        display_name: username.to_string(),
                        role,
                        is_active: true,
                    },
                )
            });
            user_id
        }

        pub fn deactivate_user(&self, user_id: Uuid) {
            self.with(|t| {
                if let Some(u) = t.users.get_mut(&user_id) {
                    u.is_active = false;
                }
            });
        }

        pub fn add_service(&self, name: ServiceName, price_cents: i64) -> Uuid {
            let service_id = Uuid::new_v4();
            self.with(|t| {
                t.services.insert(
                    service_id,
                    Service {
                        service_id,
                        name,
                        description: format!("{} session", name.as_str()),
                        price_cents,
                    },
                )
            });
            service_id
        }

        pub fn add_client(&self, first_name: &str, employee_id: Option<Uuid>) -> Uuid {
            let client_id = Uuid::new_v4();
            self.with(|t| {
                t.clients.insert(
                    client_id,
                    ClientProfile {
                        client_id,
                        first_name: first_name.to_string(),
                        last_name: "Doe".to_string(),
                        email: format!("{}@example.com", first_name.to_lowercase()),
                        phone: "1234567890".to_string(),
                        employee_id,
                    },
                )
            });
            client_id
        }

        /// Runs `f` against the target row right before the next conditional
        /// notification write, standing in for a concurrent writer.
        pub fn interfere_before_next_write(&self, f: impl FnOnce(&mut Notification) + Send + 'static) {
            *self.interference.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(f));
        }

        fn interfere(&self, t: &mut Tables, notification_id: Uuid) {
            let pending = self.interference.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let (Some(f), Some(n)) = (pending, t.notifications.get_mut(&notification_id)) {
                f(n);
            }
        }

        pub fn appointment_count(&self) -> usize {
            self.with(|t| t.appointments.len())
        }

        pub fn notification_count(&self) -> usize {
            self.with(|t| t.notifications.len())
        }

        pub fn backdate_notification(&self, notification_id: Uuid, recorded_at: DateTime<Utc>) {
            self.with(|t| {
                if let Some(n) = t.notifications.get_mut(&notification_id) {
                    n.recorded_at = recorded_at;
                }
            });
        }
    }

    fn sorted_appointments<'a>(rows: impl Iterator<Item = &'a Appointment>) -> Vec<Appointment> {
        let mut out: Vec<Appointment> = rows.cloned().collect();
        out.sort_by_key(|a| (a.date, a.start_time, a.appointment_id));
        out
    }

    #[async_trait]
    impl Store for MemoryStore {
        async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
            Ok(self.with(|t| t.users.get(&user_id).cloned()))
        }

        async fn get_users(&self, user_ids: &[Uuid]) -> Result<Vec<User>, StoreError> {
            Ok(self.with(|t| user_ids.iter().filter_map(|id| t.users.get(id).cloned()).collect()))
        }

        async fn get_client(&self, client_id: Uuid) -> Result<Option<ClientProfile>, StoreError> {
            Ok(self.with(|t| t.clients.get(&client_id).cloned()))
        }

        async fn get_clients(&self, client_ids: &[Uuid]) -> Result<Vec<ClientProfile>, StoreError> {
            Ok(self.with(|t| client_ids.iter().filter_map(|id| t.clients.get(id).cloned()).collect()))
        }

        async fn find_client_by_email(&self, email: &str) -> Result<Option<ClientProfile>, StoreError> {
            Ok(self.with(|t| {
                t.clients
                    .values()
                    .find(|c| c.email.eq_ignore_ascii_case(email))
                    .cloned()
            }))
        }

        async fn insert_client(&self, client: NewClient) -> Result<ClientProfile, StoreError> {
            self.with(|t| {
                if t.clients.values().any(|c| c.email.eq_ignore_ascii_case(&client.email)) {
                    return Err(StoreError::Constraint(format!(
                        "client email {} already registered",
                        client.email
                    )));
                }
                let profile = ClientProfile {
                    client_id: Uuid::new_v4(),
                    first_name: client.first_name,
                    last_name: client.last_name,
                    email: client.email,
                    phone: client.phone,
                    employee_id: client.employee_id,
                };
                t.clients.insert(profile.client_id, profile.clone());
                Ok(profile)
            })
        }

        async fn list_clients(&self, employee_id: Option<Uuid>) -> Result<Vec<ClientProfile>, StoreError> {
            Ok(self.with(|t| {
                t.clients
                    .values()
                    .filter(|c| employee_id.is_none_or(|id| c.employee_id == Some(id)))
                    .cloned()
                    .collect()
            }))
        }

        async fn update_client(&self, client: &ClientProfile) -> Result<ClientProfile, StoreError> {
            self.with(|t| {
                if t.clients.values().any(|c| {
                    c.client_id != client.client_id && c.email.eq_ignore_ascii_case(&client.email)
                }) {
                    return Err(StoreError::Constraint(format!(
                        "client email {} already registered",
                        client.email
                    )));
                }
                let slot = t
                    .clients
                    .get_mut(&client.client_id)
                    .ok_or_else(|| StoreError::Backend("client vanished".into()))?;
                *slot = client.clone();
                Ok(slot.clone())
            })
        }

        async fn delete_client(&self, client_id: Uuid) -> Result<bool, StoreError> {
            Ok(self.with(|t| {
                if t.clients.remove(&client_id).is_none() {
                    return false;
                }
                let gone: HashSet<Uuid> = t
                    .appointments
                    .values()
                    .filter(|a| a.client_id == client_id)
                    .map(|a| a.appointment_id)
                    .collect();
                t.appointments.retain(|id, _| !gone.contains(id));
                for n in t.notifications.values_mut() {
                    if n.appointment_id.is_some_and(|id| gone.contains(&id)) {
                        n.appointment_id = None;
                    }
                }
                true
            }))
        }

        async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>, StoreError> {
            Ok(self.with(|t| t.services.get(&service_id).cloned()))
        }

        async fn find_service_by_name(&self, name: ServiceName) -> Result<Option<Service>, StoreError> {
            Ok(self.with(|t| t.services.values().find(|s| s.name == name).cloned()))
        }

        async fn list_services(&self) -> Result<Vec<Service>, StoreError> {
            Ok(self.with(|t| t.services.values().cloned().collect()))
        }

        async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
            Ok(self.with(|t| t.appointments.get(&appointment_id).cloned()))
        }

        async fn insert_appointment(&self, a: NewAppointment) -> Result<Appointment, StoreError> {
            let now = Utc::now();
            let appointment = Appointment {
                appointment_id: Uuid::new_v4(),
                client_id: a.client_id,
                employee_id: a.employee_id,
                service_id: a.service_id,
                date: a.date,
                start_time: a.start_time,
                end_time: a.end_time,
                price_cents: a.price_cents,
                status: a.status,
                requires_approval: a.requires_approval,
                notes: a.notes,
                created_at: now,
                updated_at: now,
            };
            self.with(|t| t.appointments.insert(appointment.appointment_id, appointment.clone()));
            Ok(appointment)
        }

        async fn update_appointment(&self, appointment: &Appointment) -> Result<Appointment, StoreError> {
            self.with(|t| {
                let slot = t
                    .appointments
                    .get_mut(&appointment.appointment_id)
                    .ok_or_else(|| StoreError::Backend("appointment vanished".into()))?;
                *slot = Appointment {
                    updated_at: Utc::now(),
                    ..appointment.clone()
                };
                Ok(slot.clone())
            })
        }

        async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
            Ok(self.with(|t| sorted_appointments(t.appointments.values().filter(|a| filter.matches(a)))))
        }

        async fn appointment_totals(&self, filter: &AppointmentFilter) -> Result<AppointmentTotals, StoreError> {
            Ok(self.with(|t| {
                let rows: Vec<&Appointment> = t.appointments.values().filter(|a| filter.matches(a)).collect();
                let clients: HashSet<Uuid> = rows.iter().map(|a| a.client_id).collect();
                AppointmentTotals {
                    revenue_cents: rows.iter().map(|a| a.price_cents).sum(),
                    appointment_count: rows.len() as i64,
                    distinct_clients: clients.len() as i64,
                }
            }))
        }

        async fn get_notification(&self, notification_id: Uuid) -> Result<Option<Notification>, StoreError> {
            Ok(self.with(|t| t.notifications.get(&notification_id).cloned()))
        }

        async fn find_open_notification(
            &self,
            appointment_id: Uuid,
            employee_id: Uuid,
            action: NotificationAction,
        ) -> Result<Option<Notification>, StoreError> {
            Ok(self.with(|t| {
                t.notifications
                    .values()
                    .find(|n| {
                        n.appointment_id == Some(appointment_id)
                            && n.employee_id == employee_id
                            && n.action == action
                            && n.status == NotificationStatus::Pending
                    })
                    .cloned()
            }))
        }

        async fn insert_notification(&self, n: NewNotification) -> Result<Notification, StoreError> {
            let notification = Notification {
                notification_id: Uuid::new_v4(),
                employee_id: n.employee_id,
                action: n.action,
                appointment_id: n.appointment_id,
                recorded_at: n.recorded_at,
                status: NotificationStatus::Pending,
                changes: n.changes,
                previous_details: n.previous_details,
            };
            self.with(|t| t.notifications.insert(notification.notification_id, notification.clone()));
            Ok(notification)
        }

        async fn update_notification(&self, notification: &Notification) -> Result<(), StoreError> {
            self.with(|t| {
                t.notifications
                    .insert(notification.notification_id, notification.clone());
            });
            Ok(())
        }

        async fn extend_notification(&self, n: &Notification, seen_at: DateTime<Utc>) -> Result<bool, StoreError> {
            Ok(self.with(|t| {
                self.interfere(t, n.notification_id);
                match t.notifications.get_mut(&n.notification_id) {
                    Some(row) if row.status == NotificationStatus::Pending && row.recorded_at == seen_at => {
                        *row = n.clone();
                        true
                    }
                    _ => false,
                }
            }))
        }

        async fn review_notification(
            &self,
            notification_id: Uuid,
            status: NotificationStatus,
        ) -> Result<Option<Notification>, StoreError> {
            Ok(self.with(|t| {
                self.interfere(t, notification_id);
                match t.notifications.get_mut(&notification_id) {
                    Some(row) if row.status == NotificationStatus::Pending => {
                        row.status = status;
                        row.previous_details = RevertPoint::NoSnapshot;
                        Some(row.clone())
                    }
                    _ => None,
                }
            }))
        }

        async fn delete_notification(&self, notification_id: Uuid) -> Result<bool, StoreError> {
            Ok(self.with(|t| t.notifications.remove(&notification_id).is_some()))
        }

        async fn list_notifications(&self, filter: &NotificationFilter) -> Result<Vec<Notification>, StoreError> {
            Ok(self.with(|t| {
                let mut out: Vec<Notification> = t
                    .notifications
                    .values()
                    .filter(|n| filter.matches(n))
                    .cloned()
                    .collect();
                out.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
                out
            }))
        }

        async fn purge_notifications_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
            Ok(self.with(|t| {
                let before = t.notifications.len();
                t.notifications.retain(|_, n| n.recorded_at >= cutoff);
                (before - t.notifications.len()) as u64
            }))
        }
    }
}
