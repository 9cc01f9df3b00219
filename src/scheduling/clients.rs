// src/scheduling/clients.rs

use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ScheduleError,
    models::{Caller, ClientProfile, NewClient},
    scheduling::policy::{authorize, Operation},
    store::Store,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewClientInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

impl NewClientInput {
    fn validate(&self) -> Result<(), ScheduleError> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(ScheduleError::validation("client first and last name are required"));
        }
        let email = self.email.trim();
        let valid_email = email
            .split_once('@')
            .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'));
        if !valid_email {
            return Err(ScheduleError::validation(format!("invalid client email: {email}")));
        }
        if self.phone.trim().is_empty() || self.phone.trim().len() > 15 {
            return Err(ScheduleError::validation("client phone must be 1-15 characters"));
        }
        Ok(())
    }

    fn into_new_client(self, employee_id: Option<Uuid>) -> NewClient {
        NewClient {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            phone: self.phone.trim().to_string(),
            employee_id,
        }
    }
}

/// Employees may work with clients that are theirs or nobody's yet.
fn ensure_client_access(caller: &Caller, client: &ClientProfile) -> Result<(), ScheduleError> {
    match client.employee_id {
        Some(owner) if !caller.is_admin() && owner != caller.user_id => Err(
            ScheduleError::permission("you cannot act on another employee's client"),
        ),
        _ => Ok(()),
    }
}

pub async fn create_client(
    store: &dyn Store,
    caller: &Caller,
    input: NewClientInput,
    employee_id: Option<Uuid>,
) -> Result<ClientProfile, ScheduleError> {
    authorize(caller, Operation::ManageClients)?;
    input.validate()?;

    let employee_id = if caller.is_admin() {
        employee_id
    } else {
        match employee_id {
            Some(id) if id != caller.user_id => {
                return Err(ScheduleError::permission(
                    "employees can only create clients for themselves",
                ));
            }
            _ => Some(caller.user_id),
        }
    };

    if store.find_client_by_email(input.email.trim()).await?.is_some() {
        return Err(ScheduleError::Conflict(format!(
            "a client with email {} already exists",
            input.email.trim()
        )));
    }

    let client = store.insert_client(input.into_new_client(employee_id)).await?;
    tracing::info!(client_id = %client.client_id, "client profile created");
    Ok(client)
}

pub async fn list_clients(store: &dyn Store, caller: &Caller) -> Result<Vec<ClientProfile>, ScheduleError> {
    let policy = authorize(caller, Operation::ManageClients)?;
    Ok(store.list_clients(policy.owner_filter(caller)).await?)
}

pub async fn get_client(
    store: &dyn Store,
    caller: &Caller,
    client_id: Uuid,
) -> Result<ClientProfile, ScheduleError> {
    authorize(caller, Operation::ManageClients)?;
    let client = load_client(store, client_id).await?;
    ensure_client_access(caller, &client)?;
    Ok(client)
}

/// Partial edit of a client profile. `employee_id` is admin-only.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub employee_id: Option<Uuid>,
}

/// Changing or removing a profile takes ownership; unassigned clients are
/// left to admins.
fn ensure_client_owner(caller: &Caller, client: &ClientProfile) -> Result<(), ScheduleError> {
    if caller.is_admin() || client.employee_id == Some(caller.user_id) {
        Ok(())
    } else {
        Err(ScheduleError::permission("you can only change your own clients"))
    }
}

async fn load_client(store: &dyn Store, client_id: Uuid) -> Result<ClientProfile, ScheduleError> {
    store
        .get_client(client_id)
        .await?
        .ok_or_else(|| ScheduleError::not_found("client", client_id))
}

pub async fn update_client(
    store: &dyn Store,
    caller: &Caller,
    client_id: Uuid,
    patch: ClientPatch,
) -> Result<ClientProfile, ScheduleError> {
    authorize(caller, Operation::ManageClients)?;
    let current = load_client(store, client_id).await?;
    ensure_client_owner(caller, &current)?;

    if let Some(employee_id) = patch.employee_id {
        if Some(employee_id) != current.employee_id {
            if !caller.is_admin() {
                return Err(ScheduleError::permission("only an admin can reassign a client"));
            }
            let user = store
                .get_user(employee_id)
                .await?
                .ok_or_else(|| ScheduleError::not_found("employee", employee_id))?;
            if !user.is_active {
                return Err(ScheduleError::validation(format!("employee {employee_id} is not active")));
            }
        }
    }

    let input = NewClientInput {
        first_name: patch.first_name.unwrap_or_else(|| current.first_name.clone()),
        last_name: patch.last_name.unwrap_or_else(|| current.last_name.clone()),
        email: patch.email.unwrap_or_else(|| current.email.clone()),
        phone: patch.phone.unwrap_or_else(|| current.phone.clone()),
    };
    input.validate()?;
    let fields = input.into_new_client(patch.employee_id.or(current.employee_id));

    let next = ClientProfile {
        client_id,
        first_name: fields.first_name,
        last_name: fields.last_name,
        email: fields.email,
        phone: fields.phone,
        employee_id: fields.employee_id,
    };
    if next == current {
        return Ok(current);
    }

    if let Some(other) = store.find_client_by_email(&next.email).await? {
        if other.client_id != client_id {
            return Err(ScheduleError::Conflict(format!(
                "a client with email {} already exists",
                next.email
            )));
        }
    }

    let client = store.update_client(&next).await?;
    tracing::info!(%client_id, by = %caller.user_id, "client profile updated");
    Ok(client)
}

/// Removes the profile. Its appointments are deleted with it.
pub async fn delete_client(store: &dyn Store, caller: &Caller, client_id: Uuid) -> Result<(), ScheduleError> {
    authorize(caller, Operation::ManageClients)?;
    let client = load_client(store, client_id).await?;
    ensure_client_owner(caller, &client)?;

    if !store.delete_client(client_id).await? {
        return Err(ScheduleError::not_found("client", client_id));
    }
    tracing::info!(%client_id, by = %caller.user_id, "client profile deleted");
    Ok(())
}

/// Reference to the client of a new booking: an existing profile or the
/// details of someone not yet on file.
#[derive(Debug, Clone)]
pub enum ClientRef {
    Existing(Uuid),
    New(NewClientInput),
}

impl ClientRef {
    pub fn from_parts(
        client_id: Option<Uuid>,
        new_client: Option<NewClientInput>,
    ) -> Result<Self, ScheduleError> {
        match (client_id, new_client) {
            (Some(id), None) => Ok(ClientRef::Existing(id)),
            (None, Some(input)) => Ok(ClientRef::New(input)),
            (Some(_), Some(_)) => Err(ScheduleError::validation(
                "provide either client_id or new_client, not both",
            )),
            (None, None) => Err(ScheduleError::validation(
                "either client_id or new_client is required",
            )),
        }
    }
}

/// Outcome of resolving a [`ClientRef`] before anything is written.
#[derive(Debug, Clone)]
pub enum ResolvedClient {
    OnFile(ClientProfile),
    ToCreate(NewClient),
}

/// Checks the reference without writing. A new client whose email is
/// already on file resolves to the existing profile.
pub async fn resolve_client(
    store: &dyn Store,
    caller: &Caller,
    client: ClientRef,
    employee_id: Uuid,
) -> Result<ResolvedClient, ScheduleError> {
    let profile = match client {
        ClientRef::Existing(id) => store
            .get_client(id)
            .await?
            .ok_or_else(|| ScheduleError::validation(format!("client {id} does not exist")))?,
        ClientRef::New(input) => {
            input.validate()?;
            match store.find_client_by_email(input.email.trim()).await? {
                Some(existing) => existing,
                None => return Ok(ResolvedClient::ToCreate(input.into_new_client(Some(employee_id)))),
            }
        }
    };

    ensure_client_access(caller, &profile)?;
    Ok(ResolvedClient::OnFile(profile))
}

pub async fn materialize_client(
    store: &dyn Store,
    resolved: ResolvedClient,
) -> Result<ClientProfile, ScheduleError> {
    match resolved {
        ResolvedClient::OnFile(profile) => Ok(profile),
        ResolvedClient::ToCreate(new_client) => {
            let profile = store.insert_client(new_client).await?;
            tracing::info!(client_id = %profile.client_id, "client profile created on first booking");
            Ok(profile)
        }
    }
}
