//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Every persisted record in the reimbursement domain is an entity scoped to
/// exactly one organization.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + Ord + core::hash::Hash + core::fmt::Debug + core::fmt::Display + Send + Sync;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Returns the owning organization.
    fn org_id(&self) -> crate::OrgId;
}
