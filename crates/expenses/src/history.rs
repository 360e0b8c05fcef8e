//! Append-only audit history for expenses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reimburse_core::{Entity, ExpenseId, HistoryEntryId, OrgId, UserId};

use crate::status::ExpenseStatus;

/// What happened to the expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Created,
    Submitted,
    Approved,
    ApprovedAsPerPolicy,
    Rejected,
    FinanceApproved,
    FinanceRejected,
    Reimbursed,
    FieldUpdated,
    VoucherApproverSigned,
    EventLinked,
    EventUnlinked,
}

impl ActionType {
    /// The action recorded when an expense enters `status`.
    pub fn entering(status: ExpenseStatus) -> Self {
        match status {
            ExpenseStatus::Draft => ActionType::Created,
            ExpenseStatus::Submitted => ActionType::Submitted,
            ExpenseStatus::Approved => ActionType::Approved,
            ExpenseStatus::ApprovedAsPerPolicy => ActionType::ApprovedAsPerPolicy,
            ExpenseStatus::Rejected => ActionType::Rejected,
            ExpenseStatus::FinanceApproved => ActionType::FinanceApproved,
            ExpenseStatus::FinanceRejected => ActionType::FinanceRejected,
            ExpenseStatus::Reimbursed => ActionType::Reimbursed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Created => "created",
            ActionType::Submitted => "submitted",
            ActionType::Approved => "approved",
            ActionType::ApprovedAsPerPolicy => "approved_as_per_policy",
            ActionType::Rejected => "rejected",
            ActionType::FinanceApproved => "finance_approved",
            ActionType::FinanceRejected => "finance_rejected",
            ActionType::Reimbursed => "reimbursed",
            ActionType::FieldUpdated => "field_updated",
            ActionType::VoucherApproverSigned => "voucher_approver_signed",
            ActionType::EventLinked => "event_linked",
            ActionType::EventUnlinked => "event_unlinked",
        }
    }
}

impl core::fmt::Display for ActionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field-level change, rendered as display text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl FieldChange {
    pub fn new(
        field: impl Into<String>,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> Self {
        Self {
            field: field.into(),
            old_value,
            new_value,
        }
    }

    /// Build a change only if the rendered values differ.
    pub fn if_changed<T: ToString>(field: &str, old: Option<&T>, new: Option<&T>) -> Option<Self> {
        let old = old.map(ToString::to_string);
        let new = new.map(ToString::to_string);
        (old != new).then(|| Self::new(field, old, new))
    }
}

/// Immutable audit record.
///
/// Entries are never updated; they disappear only when their expense is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryEntryId,
    pub org_id: OrgId,
    pub expense_id: ExpenseId,
    pub actor_id: UserId,
    pub actor_name: String,
    pub action_type: ActionType,
    /// Set for `field_updated` entries.
    pub field: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Entity for HistoryEntry {
    type Id = HistoryEntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn org_id(&self) -> OrgId {
        self.org_id
    }
}
