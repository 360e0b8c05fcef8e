//! Reimbursement engine: the six components wired over collaborator ports.
//!
//! ```text
//! PolicyEngine ─┐
//! SignatureResolver ─┬─ VoucherCoordinator ─┐
//! AuditRecorder ─────┴──────────────────────┴─ LifecycleController ─ EventAggregation
//! ```
//!
//! Every component is a cheap `Clone` over `Arc`ed collaborators. Nothing here
//! does IO directly; all persistence, blob and identity access goes through the
//! traits in [`crate::store`].

pub mod aggregation;
pub mod audit;
pub mod lifecycle;
pub mod policy_engine;
pub mod signatures;
pub mod vouchers;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use reimburse_auth::Actor;
use reimburse_core::{EventId, OrgId};
use reimburse_expenses::{Expense, ExpenseEvent, HistoryEntry, Policy, SavedSignature, Voucher};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::store::{
    BlobStorage, IdentityProvider, InMemoryBlobStorage, InMemoryRepository, Repository,
    StaticIdentity,
};

pub use aggregation::{
    CascadeFailure, CascadeReport, EventAggregation, EventDecision, EventDeletion, EventSubmission,
    EventSummary,
};
pub use audit::{AuditRecord, AuditRecorder};
pub use lifecycle::{ApprovalOptions, LifecycleController};
pub use policy_engine::PolicyEngine;
pub use signatures::{ResolvedSignature, SignatureResolver};
pub use vouchers::{VoucherCoordinator, VoucherCreated};

/// The external collaborators the engine is allowed to talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub expenses: Arc<dyn Repository<Expense>>,
    pub vouchers: Arc<dyn Repository<Voucher>>,
    pub policies: Arc<dyn Repository<Policy>>,
    pub events: Arc<dyn Repository<ExpenseEvent>>,
    pub history: Arc<dyn Repository<HistoryEntry>>,
    pub signatures: Arc<dyn Repository<SavedSignature>>,
    pub blobs: Arc<dyn BlobStorage>,
    pub identity: Arc<dyn IdentityProvider>,
}

/// In-memory collaborators, kept concrete so tests can seed and inspect them.
pub struct InMemoryCollaborators {
    pub expenses: Arc<InMemoryRepository<Expense>>,
    pub vouchers: Arc<InMemoryRepository<Voucher>>,
    pub policies: Arc<InMemoryRepository<Policy>>,
    pub events: Arc<InMemoryRepository<ExpenseEvent>>,
    pub history: Arc<InMemoryRepository<HistoryEntry>>,
    pub signatures: Arc<InMemoryRepository<SavedSignature>>,
    pub blobs: Arc<InMemoryBlobStorage>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl InMemoryCollaborators {
    /// Repositories enforce `config.call_timeout`.
    pub fn new(config: &EngineConfig) -> Self {
        let timeout = config.call_timeout;
        Self {
            expenses: Arc::new(InMemoryRepository::new().with_call_timeout(timeout)),
            vouchers: Arc::new(InMemoryRepository::new().with_call_timeout(timeout)),
            policies: Arc::new(InMemoryRepository::new().with_call_timeout(timeout)),
            events: Arc::new(InMemoryRepository::new().with_call_timeout(timeout)),
            history: Arc::new(InMemoryRepository::new().with_call_timeout(timeout)),
            signatures: Arc::new(InMemoryRepository::new().with_call_timeout(timeout)),
            blobs: Arc::new(InMemoryBlobStorage::new()),
            identity: Arc::new(StaticIdentity::default()),
        }
    }

    pub fn with_identity(mut self, identity: impl IdentityProvider + 'static) -> Self {
        self.identity = Arc::new(identity);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            expenses: self.expenses.clone(),
            vouchers: self.vouchers.clone(),
            policies: self.policies.clone(),
            events: self.events.clone(),
            history: self.history.clone(),
            signatures: self.signatures.clone(),
            blobs: self.blobs.clone(),
            identity: self.identity.clone(),
        }
    }
}

/// Facade bundling the engine components.
#[derive(Clone)]
pub struct ReimbursementEngine {
    pub policy: PolicyEngine,
    pub audit: AuditRecorder,
    pub signatures: SignatureResolver,
    pub vouchers: VoucherCoordinator,
    pub lifecycle: LifecycleController,
    pub events: EventAggregation,
    config: EngineConfig,
}

impl ReimbursementEngine {
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Self {
        let policy = PolicyEngine::new(collaborators.policies.clone());
        let audit = AuditRecorder::new(
            collaborators.history.clone(),
            collaborators.identity.clone(),
            config.unknown_actor_name.clone(),
        );
        let signatures = SignatureResolver::new(
            collaborators.signatures.clone(),
            collaborators.blobs.clone(),
            config.signed_url_ttl,
        );
        let vouchers = VoucherCoordinator::new(
            collaborators.expenses.clone(),
            collaborators.vouchers.clone(),
            collaborators.events.clone(),
            signatures.clone(),
            audit.clone(),
        );
        let lifecycle = LifecycleController::new(
            collaborators.expenses.clone(),
            collaborators.events.clone(),
            policy.clone(),
            signatures.clone(),
            vouchers.clone(),
            audit.clone(),
            &config,
        );
        let events = EventAggregation::new(
            collaborators.events.clone(),
            collaborators.expenses.clone(),
            lifecycle.clone(),
            audit.clone(),
        );

        Self {
            policy,
            audit,
            signatures,
            vouchers,
            lifecycle,
            events,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// The actor may only act inside its active org.
pub(crate) fn ensure_actor_org(actor: &Actor, org_id: OrgId) -> Result<(), EngineError> {
    if actor.org_id() != org_id {
        return Err(EngineError::permission("organization mismatch"));
    }
    Ok(())
}

/// An expense may only join an existing draft event of its own org, created
/// by the actor unless the actor is privileged.
pub(crate) fn ensure_event_accepts(
    events: &dyn Repository<ExpenseEvent>,
    actor: &Actor,
    org_id: OrgId,
    event_id: Option<EventId>,
) -> Result<(), EngineError> {
    let Some(event_id) = event_id else {
        return Ok(());
    };
    let event = events
        .get_by_id(&event_id)?
        .filter(|e| e.org_id == org_id)
        .ok_or_else(|| EngineError::not_found("event", event_id))?;
    if event.creator_id != actor.user_id && !actor.is_privileged() {
        return Err(EngineError::permission("only the event creator may add expenses to it"));
    }
    event.ensure_editable()?;
    Ok(())
}
