use serde::{Deserialize, Serialize};

use reimburse_core::OrgId;

use crate::{Permission, Role};

/// A user's membership in an organization.
///
/// States *which org* the user acts within and which roles/permissions are
/// granted there. Permissions listed here are in addition to what the roles grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgMembership {
    pub org_id: OrgId,
    pub roles: Vec<Role>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl OrgMembership {
    pub fn new(org_id: OrgId, roles: Vec<Role>) -> Self {
        Self {
            org_id,
            roles,
            permissions: Vec::new(),
        }
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles
            .iter()
            .any(|r| r.as_str().eq_ignore_ascii_case(role.as_str()))
    }

    pub fn is_privileged(&self) -> bool {
        self.roles.iter().any(Role::is_privileged)
    }
}
