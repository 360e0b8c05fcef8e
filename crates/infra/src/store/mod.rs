//! Collaborator ports: persistence, blob storage and identity.
//!
//! The engine talks to the outside world only through these traits. The
//! in-memory adapters back tests and local development.

pub mod blob;
pub mod identity;
pub mod in_memory;

use std::convert::Infallible;
use std::sync::Arc;

use reimburse_core::{Entity, OrgId};
use reimburse_expenses::{
    Expense, ExpenseEvent, ExpenseUpdate, EventUpdate, HistoryEntry, Policy, SavedSignature,
    SignatureUpdate, Voucher, VoucherUpdate,
};

use crate::error::StoreError;

pub use blob::{BlobStorage, InMemoryBlobStorage};
pub use identity::{CurrentUser, IdentityProvider, StaticIdentity};
pub use in_memory::{InMemoryRepository, StoreOp};

/// A persisted entity with a typed partial-update payload.
pub trait Record: Entity + Clone + Send + Sync + 'static {
    /// Partial fields accepted by `Repository::update`.
    type Patch: Clone + core::fmt::Debug + Send + Sync;

    /// Short name used in errors and logs.
    const KIND: &'static str;

    fn apply_patch(&mut self, patch: &Self::Patch);
}

/// Persistence collaborator for one entity type.
///
/// Every mutation is a single atomic call by id; there are no multi-record
/// transactions at this boundary.
pub trait Repository<T: Record>: Send + Sync {
    fn get_by_id(&self, id: &T::Id) -> Result<Option<T>, StoreError>;

    /// All records of `org_id` matching `predicate`, in id order.
    fn list_by_filter(
        &self,
        org_id: OrgId,
        predicate: &dyn Fn(&T) -> bool,
    ) -> Result<Vec<T>, StoreError>;

    fn insert(&self, record: T) -> Result<T, StoreError>;

    /// Apply partial fields and return the updated record.
    fn update(&self, id: &T::Id, patch: T::Patch) -> Result<T, StoreError>;

    fn delete(&self, id: &T::Id) -> Result<(), StoreError>;
}

impl<T, S> Repository<T> for Arc<S>
where
    T: Record,
    S: Repository<T> + ?Sized,
{
    fn get_by_id(&self, id: &T::Id) -> Result<Option<T>, StoreError> {
        (**self).get_by_id(id)
    }

    fn list_by_filter(
        &self,
        org_id: OrgId,
        predicate: &dyn Fn(&T) -> bool,
    ) -> Result<Vec<T>, StoreError> {
        (**self).list_by_filter(org_id, predicate)
    }

    fn insert(&self, record: T) -> Result<T, StoreError> {
        (**self).insert(record)
    }

    fn update(&self, id: &T::Id, patch: T::Patch) -> Result<T, StoreError> {
        (**self).update(id, patch)
    }

    fn delete(&self, id: &T::Id) -> Result<(), StoreError> {
        (**self).delete(id)
    }
}

impl Record for Expense {
    type Patch = ExpenseUpdate;
    const KIND: &'static str = "expense";

    fn apply_patch(&mut self, patch: &Self::Patch) {
        self.apply_update(patch);
    }
}

impl Record for Voucher {
    type Patch = VoucherUpdate;
    const KIND: &'static str = "voucher";

    fn apply_patch(&mut self, patch: &Self::Patch) {
        self.apply_update(patch);
    }
}

impl Record for ExpenseEvent {
    type Patch = EventUpdate;
    const KIND: &'static str = "event";

    fn apply_patch(&mut self, patch: &Self::Patch) {
        self.apply_update(patch);
    }
}

impl Record for SavedSignature {
    type Patch = SignatureUpdate;
    const KIND: &'static str = "signature";

    fn apply_patch(&mut self, patch: &Self::Patch) {
        self.apply_update(patch);
    }
}

/// Policies are maintained outside the engine; it only reads them.
impl Record for Policy {
    type Patch = Infallible;
    const KIND: &'static str = "policy";

    fn apply_patch(&mut self, patch: &Self::Patch) {
        match *patch {}
    }
}

/// History is append-only: there is no patch type to update an entry with.
impl Record for HistoryEntry {
    type Patch = Infallible;
    const KIND: &'static str = "history_entry";

    fn apply_patch(&mut self, patch: &Self::Patch) {
        match *patch {}
    }
}
