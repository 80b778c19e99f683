use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::db::models::DeletionRequest;
use crate::error::{AppError, Result};

/// Tier an actor holds within their account. Derived upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Manager,
    Admin,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "member" => Ok(Role::Member),
            "manager" => Ok(Role::Manager),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}' (expected member, manager or admin)")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Member => "member",
            Role::Manager => "manager",
            Role::Admin => "admin",
        };
        f.write_str(s)
    }
}

/// The caller of an export or purge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub account_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, account_id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            account_id: account_id.into(),
            role,
        }
    }
}

pub trait Authorizer: Send + Sync {
    /// Whether the request lies within the actor's tenant at all. Requests
    /// outside it are reported as not found.
    fn in_scope(&self, actor: &Actor, request: &DeletionRequest) -> bool;

    fn may_export(&self, actor: &Actor, request: &DeletionRequest) -> bool;

    /// Must be at least as strict as `may_export`.
    fn may_purge(&self, actor: &Actor, request: &DeletionRequest) -> bool;
}

/// Tenant match plus a minimum role: managers export, admins purge.
pub struct RoleAuthorizer;

impl Authorizer for RoleAuthorizer {
    fn in_scope(&self, actor: &Actor, request: &DeletionRequest) -> bool {
        request.owned_by(&actor.account_id)
    }

    fn may_export(&self, actor: &Actor, request: &DeletionRequest) -> bool {
        self.in_scope(actor, request) && actor.role >= Role::Manager
    }

    fn may_purge(&self, actor: &Actor, request: &DeletionRequest) -> bool {
        self.in_scope(actor, request) && actor.role >= Role::Admin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Export,
    Purge,
}

impl Action {
    pub fn verb(&self) -> &'static str {
        match self {
            Action::Export => "export",
            Action::Purge => "purge",
        }
    }
}

/// Load a deletion request and check that `actor` may perform `action` on it.
///
/// A request outside the actor's tenant is reported exactly like a missing
/// one, so its existence does not leak.
pub fn authorize_request(
    db: &Database,
    authz: &dyn Authorizer,
    actor: &Actor,
    request_id: &str,
    action: Action,
) -> Result<DeletionRequest> {
    let request = db
        .get_deletion_request(request_id)?
        .filter(|r| authz.in_scope(actor, r))
        .ok_or_else(|| AppError::RequestNotFound(request_id.to_string()))?;

    let allowed = match action {
        Action::Export => authz.may_export(actor, &request),
        Action::Purge => authz.may_purge(actor, &request),
    };
    if !allowed {
        tracing::warn!(
            "Denied {} of request {request_id} to {} ({})",
            action.verb(),
            actor.id,
            actor.role
        );
        return Err(AppError::Forbidden {
            actor: actor.id.clone(),
            action: action.verb(),
        });
    }
    Ok(request)
}
