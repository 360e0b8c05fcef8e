use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier used for RBAC.
///
/// Roles stay opaque strings so organizations can carry extra roles; the ones
/// the reimbursement workflow understands are exposed as constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const MEMBER: Role = Role(Cow::Borrowed("member"));
    pub const APPROVER: Role = Role(Cow::Borrowed("approver"));
    pub const FINANCE: Role = Role(Cow::Borrowed("finance"));
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const OWNER: Role = Role(Cow::Borrowed("owner"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Admin and owner see and manage everything in their organization.
    pub fn is_privileged(&self) -> bool {
        self.as_str().eq_ignore_ascii_case("admin") || self.as_str().eq_ignore_ascii_case("owner")
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
