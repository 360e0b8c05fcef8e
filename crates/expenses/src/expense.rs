use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use reimburse_core::{DomainError, DomainResult, Entity, EventId, ExpenseId, Money, OrgId, UserId};

use crate::history::FieldChange;
use crate::status::{ExpenseStatus, PaymentStatus};

/// Proof backing a claim: a receipt file, or a voucher standing in for one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attachment {
    Receipt { path: String },
    /// The paired voucher row references this expense.
    Voucher,
}

impl core::fmt::Display for Attachment {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Attachment::Receipt { path } => write!(f, "receipt:{path}"),
            Attachment::Voucher => f.write_str("voucher"),
        }
    }
}

/// A single reimbursement claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub org_id: OrgId,
    pub creator_id: UserId,
    pub expense_type: String,
    pub amount: Money,
    pub approved_amount: Option<Money>,
    pub date: NaiveDate,
    pub status: ExpenseStatus,
    pub approver_id: Option<UserId>,
    pub event_id: Option<EventId>,
    pub attachment: Option<Attachment>,
    /// Storage path of the submitter's signature.
    pub signature: Option<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, JsonValue>,
    pub payment_status: Option<PaymentStatus>,
    /// Reviewer comment (rejection reason, finance note).
    pub review_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Expense {
    type Id = ExpenseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn org_id(&self) -> OrgId {
        self.org_id
    }
}

/// Input for a new claim. The signature is already resolved to a storage path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpense {
    pub org_id: OrgId,
    pub expense_type: String,
    pub amount: Money,
    pub date: NaiveDate,
    pub approver_id: Option<UserId>,
    pub event_id: Option<EventId>,
    pub receipt_path: Option<String>,
    pub signature: Option<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, JsonValue>,
    /// Create directly in `submitted` instead of `draft`.
    #[serde(default)]
    pub submit: bool,
}

impl Expense {
    /// Build a claim from creation input. Status is `draft` or `submitted`.
    pub fn create(
        id: ExpenseId,
        creator_id: UserId,
        input: NewExpense,
        attachment: Option<Attachment>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let expense_type = input.expense_type.trim().to_string();
        if expense_type.is_empty() {
            return Err(DomainError::validation("expense type is required"));
        }

        let expense = Self {
            id,
            org_id: input.org_id,
            creator_id,
            expense_type,
            amount: input.amount,
            approved_amount: None,
            date: input.date,
            status: if input.submit {
                ExpenseStatus::Submitted
            } else {
                ExpenseStatus::Draft
            },
            approver_id: input.approver_id,
            event_id: input.event_id,
            attachment,
            signature: input.signature.filter(|s| !s.trim().is_empty()),
            custom_fields: input.custom_fields,
            payment_status: None,
            review_comment: None,
            created_at: now,
            updated_at: now,
        };

        if expense.status == ExpenseStatus::Submitted {
            expense.validate_submission()?;
        }
        Ok(expense)
    }

    pub fn is_voucher_mode(&self) -> bool {
        matches!(self.attachment, Some(Attachment::Voucher))
    }

    /// Submit-time validation: receipt XOR voucher, a signature, and an
    /// explicit approver who is not the creator.
    pub fn validate_submission(&self) -> DomainResult<()> {
        if self.amount == Money::ZERO {
            return Err(DomainError::validation("amount must be greater than zero"));
        }
        match &self.attachment {
            None => {
                return Err(DomainError::validation(
                    "a receipt or a voucher is required to submit",
                ));
            }
            Some(Attachment::Receipt { path }) if path.trim().is_empty() => {
                return Err(DomainError::validation("receipt path is empty"));
            }
            Some(_) => {}
        }
        if self.signature.as_deref().is_none_or(|s| s.trim().is_empty()) {
            return Err(DomainError::validation("a signature is required to submit"));
        }
        match self.approver_id {
            None => Err(DomainError::validation("an approver must be selected")),
            Some(approver) if approver == self.creator_id => Err(DomainError::permission(
                "the approver must be someone other than the creator",
            )),
            Some(_) => Ok(()),
        }
    }

    /// Self-review guard, checked before any persistence call.
    pub fn ensure_not_self_review(&self, actor: UserId) -> DomainResult<()> {
        if actor == self.creator_id {
            return Err(DomainError::permission("cannot review your own expense"));
        }
        Ok(())
    }

    pub fn apply_update(&mut self, update: &ExpenseUpdate) {
        if let Some(v) = &update.expense_type {
            self.expense_type = v.clone();
        }
        if let Some(v) = update.amount {
            self.amount = v;
        }
        if let Some(v) = update.date {
            self.date = v;
        }
        if let Some(v) = update.status {
            self.status = v;
        }
        if let Some(v) = update.approved_amount {
            self.approved_amount = v;
        }
        if let Some(v) = update.approver_id {
            self.approver_id = v;
        }
        if let Some(v) = update.event_id {
            self.event_id = v;
        }
        if let Some(v) = &update.attachment {
            self.attachment = v.clone();
        }
        if let Some(v) = &update.signature {
            self.signature = v.clone();
        }
        if let Some(v) = &update.custom_fields {
            self.custom_fields = v.clone();
        }
        if let Some(v) = update.payment_status {
            self.payment_status = v;
        }
        if let Some(v) = &update.review_comment {
            self.review_comment = v.clone();
        }
        if let Some(v) = update.updated_at {
            self.updated_at = v;
        }
    }

    /// One `FieldChange` per field the patch would actually change.
    pub fn patch_changes(&self, patch: &ExpensePatch) -> Vec<FieldChange> {
        let mut changes = Vec::new();

        if let Some(t) = &patch.expense_type {
            changes.extend(FieldChange::if_changed(
                "expense_type",
                Some(&self.expense_type),
                Some(&t.trim().to_string()),
            ));
        }
        if let Some(amount) = &patch.amount {
            changes.extend(FieldChange::if_changed("amount", Some(&self.amount), Some(amount)));
        }
        if let Some(date) = &patch.date {
            changes.extend(FieldChange::if_changed("date", Some(&self.date), Some(date)));
        }
        if let Some(approver) = &patch.approver_id {
            changes.extend(FieldChange::if_changed(
                "approver_id",
                self.approver_id.as_ref(),
                Some(approver),
            ));
        }
        if let Some(path) = &patch.receipt_path {
            let new = Attachment::Receipt { path: path.clone() };
            changes.extend(FieldChange::if_changed(
                "attachment",
                self.attachment.as_ref(),
                Some(&new),
            ));
        }
        if let Some(fields) = &patch.custom_fields {
            let keys: BTreeSet<&String> = self.custom_fields.keys().chain(fields.keys()).collect();
            for key in keys {
                changes.extend(FieldChange::if_changed(
                    &format!("custom_fields.{key}"),
                    self.custom_fields.get(key),
                    fields.get(key),
                ));
            }
        }

        changes
    }
}

/// Draft edits a creator may make.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpensePatch {
    pub expense_type: Option<String>,
    pub amount: Option<Money>,
    pub date: Option<NaiveDate>,
    pub approver_id: Option<UserId>,
    pub receipt_path: Option<String>,
    /// Replaces the whole custom-field map.
    pub custom_fields: Option<BTreeMap<String, JsonValue>>,
}

impl ExpensePatch {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(t) = &self.expense_type {
            if t.trim().is_empty() {
                return Err(DomainError::validation("expense type is required"));
            }
        }
        if let Some(path) = &self.receipt_path {
            if path.trim().is_empty() {
                return Err(DomainError::validation("receipt path is empty"));
            }
        }
        Ok(())
    }

    pub fn into_update(self, now: DateTime<Utc>) -> ExpenseUpdate {
        ExpenseUpdate {
            expense_type: self.expense_type.map(|t| t.trim().to_string()),
            amount: self.amount,
            date: self.date,
            approver_id: self.approver_id.map(Some),
            attachment: self.receipt_path.map(|path| Some(Attachment::Receipt { path })),
            custom_fields: self.custom_fields,
            updated_at: Some(now),
            ..ExpenseUpdate::default()
        }
    }
}

/// Partial fields for a single update-by-id call.
///
/// `None` leaves the field untouched; `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpenseUpdate {
    pub expense_type: Option<String>,
    pub amount: Option<Money>,
    pub date: Option<NaiveDate>,
    pub status: Option<ExpenseStatus>,
    pub approved_amount: Option<Option<Money>>,
    pub approver_id: Option<Option<UserId>>,
    pub event_id: Option<Option<EventId>>,
    pub attachment: Option<Option<Attachment>>,
    pub signature: Option<Option<String>>,
    pub custom_fields: Option<BTreeMap<String, JsonValue>>,
    pub payment_status: Option<Option<PaymentStatus>>,
    pub review_comment: Option<Option<String>>,
    pub updated_at: Option<DateTime<Utc>>,
}
