use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "expenses.approve").
/// The wildcard permission `"*"` grants everything and is handed to admin/owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));
    /// Create, edit and submit one's own claims.
    pub const SUBMIT: Permission = Permission(Cow::Borrowed("expenses.submit"));
    /// First-stage review (approve / reject).
    pub const APPROVE: Permission = Permission(Cow::Borrowed("expenses.approve"));
    /// Second-stage review and payment.
    pub const FINANCE_REVIEW: Permission = Permission(Cow::Borrowed("expenses.finance_review"));
    /// Review of grouped expense events.
    pub const REVIEW_EVENTS: Permission = Permission(Cow::Borrowed("events.review"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
