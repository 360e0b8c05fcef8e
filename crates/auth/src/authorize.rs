use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use reimburse_core::{DomainError, OrgId, UserId};

use crate::{OrgMembership, Permission, Role};

/// A fully resolved actor for authorization decisions.
///
/// Construction is decoupled from session transport: the presentation layer
/// resolves the signed-in user and their org membership and hands it over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub display_name: String,
    pub active_org_id: OrgId,
    pub membership: OrgMembership,
}

impl Actor {
    pub fn new(user_id: UserId, display_name: impl Into<String>, membership: OrgMembership) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            active_org_id: membership.org_id,
            membership,
        }
    }

    pub fn org_id(&self) -> OrgId {
        self.active_org_id
    }

    pub fn is_privileged(&self) -> bool {
        self.membership.is_privileged()
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.membership.has_role(role)
    }

    pub fn can(&self, required: &Permission) -> bool {
        authorize(self, required).is_ok()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("organization mismatch")]
    OrgMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        DomainError::permission(value.to_string())
    }
}

/// Static role → permission mapping for the reimbursement workflow.
pub fn role_permissions(role: &Role) -> Vec<Permission> {
    if role.is_privileged() {
        return vec![Permission::WILDCARD];
    }
    match role.as_str().to_ascii_lowercase().as_str() {
        "member" => vec![Permission::SUBMIT],
        "approver" => vec![Permission::SUBMIT, Permission::APPROVE],
        "finance" => vec![Permission::SUBMIT, Permission::FINANCE_REVIEW],
        _ => Vec::new(),
    }
}

/// Authorize an actor within its active organization.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(actor: &Actor, required: &Permission) -> Result<(), AuthzError> {
    if actor.active_org_id != actor.membership.org_id {
        return Err(AuthzError::OrgMismatch);
    }

    let mut effective: HashSet<Permission> = actor
        .membership
        .roles
        .iter()
        .flat_map(role_permissions)
        .collect();
    effective.extend(actor.membership.permissions.iter().cloned());

    if effective.contains(&Permission::WILDCARD) || effective.contains(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}
