//! Audit Trail Recorder: appends immutable history entries.
//!
//! Writes are fire-and-forget from the caller's point of view: a failed append
//! is logged and never undoes the mutation it describes.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use reimburse_core::{ExpenseId, HistoryEntryId, OrgId, UserId};
use reimburse_expenses::{ActionType, FieldChange, HistoryEntry};

use crate::error::{EngineError, StoreError};
use crate::store::{IdentityProvider, Repository};

/// One history entry to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub org_id: OrgId,
    pub expense_id: ExpenseId,
    pub actor_id: UserId,
    /// Name supplied by the caller; resolved through the identity chain when absent.
    pub actor_name: Option<String>,
    pub action_type: ActionType,
    pub field: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl AuditRecord {
    pub fn action(
        org_id: OrgId,
        expense_id: ExpenseId,
        actor_id: UserId,
        actor_name: Option<&str>,
        action_type: ActionType,
    ) -> Self {
        Self {
            org_id,
            expense_id,
            actor_id,
            actor_name: actor_name.map(str::to_string),
            action_type,
            field: None,
            old_value: None,
            new_value: None,
        }
    }

    pub fn values(mut self, old_value: Option<String>, new_value: Option<String>) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }
}

#[derive(Clone)]
pub struct AuditRecorder {
    history: Arc<dyn Repository<HistoryEntry>>,
    identity: Arc<dyn IdentityProvider>,
    unknown_actor_name: String,
}

impl AuditRecorder {
    pub fn new(
        history: Arc<dyn Repository<HistoryEntry>>,
        identity: Arc<dyn IdentityProvider>,
        unknown_actor_name: String,
    ) -> Self {
        Self {
            history,
            identity,
            unknown_actor_name,
        }
    }

    /// Append one entry, logging (not returning) any failure.
    pub fn record(&self, record: AuditRecord) -> Option<HistoryEntry> {
        let expense_id = record.expense_id;
        let action_type = record.action_type;
        match self.try_record(record) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(
                    expense_id = %expense_id,
                    action = %action_type,
                    error = %err,
                    "failed to write history entry"
                );
                None
            }
        }
    }

    pub fn try_record(&self, record: AuditRecord) -> Result<HistoryEntry, StoreError> {
        let actor_name = self.resolve_actor_name(record.actor_id, record.actor_name.as_deref());
        let entry = HistoryEntry {
            id: HistoryEntryId::new(),
            org_id: record.org_id,
            expense_id: record.expense_id,
            actor_id: record.actor_id,
            actor_name,
            action_type: record.action_type,
            field: record.field,
            old_value: record.old_value,
            new_value: record.new_value,
            created_at: Utc::now(),
        };
        self.history.insert(entry)
    }

    /// One `field_updated` entry per change; returns how many were written.
    pub fn record_changes(
        &self,
        org_id: OrgId,
        expense_id: ExpenseId,
        actor_id: UserId,
        actor_name: Option<&str>,
        changes: Vec<FieldChange>,
    ) -> usize {
        changes
            .into_iter()
            .filter_map(|change| {
                let mut record = AuditRecord::action(
                    org_id,
                    expense_id,
                    actor_id,
                    actor_name,
                    ActionType::FieldUpdated,
                )
                .values(change.old_value, change.new_value);
                record.field = Some(change.field);
                self.record(record)
            })
            .count()
    }

    /// Entries of one expense, oldest first.
    pub fn history(&self, org_id: OrgId, expense_id: ExpenseId) -> Result<Vec<HistoryEntry>, EngineError> {
        let mut entries = self
            .history
            .list_by_filter(org_id, &|e: &HistoryEntry| e.expense_id == expense_id)?;
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(entries)
    }

    /// Remove every entry of a deleted expense. Returns the number removed.
    pub fn purge(&self, org_id: OrgId, expense_id: ExpenseId) -> Result<usize, StoreError> {
        let entries = self
            .history
            .list_by_filter(org_id, &|e: &HistoryEntry| e.expense_id == expense_id)?;
        for entry in &entries {
            self.history.delete(&entry.id)?;
        }
        Ok(entries.len())
    }

    /// Caller-supplied name, then the identity service, then the cached
    /// session record, then the configured fallback literal.
    pub fn resolve_actor_name(&self, actor_id: UserId, provided: Option<&str>) -> String {
        if let Some(name) = provided.map(str::trim).filter(|n| !n.is_empty()) {
            return name.to_string();
        }

        match self.identity.current_user() {
            Ok(Some(user)) if user.id == actor_id => {
                if let Some(name) = user.display_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                    return name.to_string();
                }
            }
            Ok(_) => {}
            Err(err) => debug!(actor_id = %actor_id, error = %err, "identity lookup failed"),
        }

        self.identity
            .cached_session()
            .and_then(|session| name_from_session(&session, actor_id))
            .unwrap_or_else(|| self.unknown_actor_name.clone())
    }
}

/// Best-effort name from a cached session record. A record that names a
/// different user yields nothing.
fn name_from_session(session: &JsonValue, actor_id: UserId) -> Option<String> {
    let user = session.get("user").unwrap_or(session);
    if let Some(id) = user.get("id").and_then(JsonValue::as_str) {
        if id != actor_id.to_string() {
            return None;
        }
    }
    [
        user.pointer("/user_metadata/full_name"),
        user.pointer("/user_metadata/name"),
        user.get("name"),
        user.get("display_name"),
        user.get("email"),
    ]
    .into_iter()
    .flatten()
    .filter_map(JsonValue::as_str)
    .map(str::trim)
    .find(|s| !s.is_empty())
    .map(str::to_string)
}
