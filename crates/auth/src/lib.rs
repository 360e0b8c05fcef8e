//! `reimburse-auth`: pure authorization boundary for reimbursement actions.
//!
//! This crate is intentionally decoupled from session transport and storage:
//! the caller resolves who the actor is, this crate decides what they may do.

pub mod authorize;
pub mod membership;
pub mod permissions;
pub mod roles;

pub use authorize::{authorize, role_permissions, Actor, AuthzError};
pub use membership::OrgMembership;
pub use permissions::Permission;
pub use roles::Role;
