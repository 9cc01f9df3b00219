// src/scheduling/policy.rs

use uuid::Uuid;

use crate::{
    error::ScheduleError,
    models::{Caller, Role},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateAppointment,
    UpdateAppointment,
    TransitionStatus,
    ViewAppointments,
    ManageClients,
    ViewNotifications,
    ReviewNotification,
    ViewReports,
    ViewBilling,
}

/// Which rows an operation may see or touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    /// Only rows owned by the caller.
    Own,
    /// Everything except rows authored by the caller.
    Others,
}

/// Whether the caller's writes take effect as-is or wait for an admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Authoritative,
    NeedsApproval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub scope: Scope,
    pub effect: Effect,
}

const fn allow(scope: Scope, effect: Effect) -> Option<Policy> {
    Some(Policy { scope, effect })
}

/// The full role/operation table. `None` means the role may not run it.
pub fn policy_for(role: Role, op: Operation) -> Option<Policy> {
    use Effect::*;
    use Operation::*;
    use Scope::*;

    match (role, op) {
        (Role::Admin, ViewNotifications) => allow(Others, Authoritative),
        (Role::Admin, _) => allow(All, Authoritative),

        (Role::Employee, CreateAppointment | UpdateAppointment) => allow(Own, NeedsApproval),
        (Role::Employee, TransitionStatus) => allow(Own, Authoritative),
        (Role::Employee, ViewAppointments | ManageClients) => allow(Own, Authoritative),
        (Role::Employee, ViewNotifications | ViewReports) => allow(Own, Authoritative),
        (Role::Employee, ReviewNotification | ViewBilling) => None,
    }
}

pub fn authorize(caller: &Caller, op: Operation) -> Result<Policy, ScheduleError> {
    policy_for(caller.role, op).ok_or_else(|| {
        tracing::warn!(user_id = %caller.user_id, role = caller.role.as_str(), ?op, "operation denied");
        ScheduleError::permission(format!(
            "role {} may not perform {op:?}",
            caller.role.as_str()
        ))
    })
}

impl Policy {
    /// Employee id that queries must be narrowed to, if any.
    pub fn owner_filter(&self, caller: &Caller) -> Option<Uuid> {
        match self.scope {
            Scope::Own => Some(caller.user_id),
            Scope::All | Scope::Others => None,
        }
    }

    pub fn covers(&self, caller: &Caller, owner: Uuid) -> bool {
        match self.scope {
            Scope::All => true,
            Scope::Own => owner == caller.user_id,
            Scope::Others => owner != caller.user_id,
        }
    }

    pub fn ensure_covers(&self, caller: &Caller, owner: Uuid, what: &str) -> Result<(), ScheduleError> {
        if self.covers(caller, owner) {
            Ok(())
        } else {
            Err(ScheduleError::permission(format!(
                "you cannot act on another employee's {what}"
            )))
        }
    }

    pub fn is_authoritative(&self) -> bool {
        self.effect == Effect::Authoritative
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admins_are_authoritative_everywhere() {
        for op in [
            Operation::CreateAppointment,
            Operation::UpdateAppointment,
            Operation::TransitionStatus,
            Operation::ReviewNotification,
            Operation::ViewBilling,
        ] {
            let policy = policy_for(Role::Admin, op).unwrap();
            assert_eq!(policy.scope, Scope::All);
            assert!(policy.is_authoritative());
        }
    }

    #[test]
    fn admins_do_not_see_their_own_notifications() {
        let admin = Caller::admin(Uuid::new_v4());
        let policy = authorize(&admin, Operation::ViewNotifications).unwrap();
        assert!(!policy.covers(&admin, admin.user_id));
        assert!(policy.covers(&admin, Uuid::new_v4()));
    }

    #[test]
    fn employee_edits_need_approval_and_stay_in_scope() {
        let employee = Caller::employee(Uuid::new_v4());
        let policy = authorize(&employee, Operation::UpdateAppointment).unwrap();
        assert_eq!(policy.effect, Effect::NeedsApproval);
        assert_eq!(policy.owner_filter(&employee), Some(employee.user_id));
        assert!(policy.ensure_covers(&employee, Uuid::new_v4(), "appointment").is_err());
    }

    #[test]
    fn employees_cannot_review_or_bill() {
        let employee = Caller::employee(Uuid::new_v4());
        assert!(matches!(
            authorize(&employee, Operation::ReviewNotification),
            Err(ScheduleError::Permission(_))
        ));
        assert!(authorize(&employee, Operation::ViewBilling).is_err());
    }
}
