//! Voucher Coordinator: receipt-less expenses and their paired vouchers.
//!
//! Creating a voucher-mode expense is a two-step saga over independent
//! single-record calls:
//!
//! 1. insert the expense
//! 2. insert the voucher referencing it
//!
//! If step 2 fails, the expense is deleted again (compensation) so no
//! voucher-mode expense is left without its voucher.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use reimburse_auth::{Actor, Permission, authorize};
use reimburse_core::{ExpenseId, Money, OrgId, VoucherId};
use reimburse_expenses::{
    ActionType, Attachment, Expense, ExpenseEvent, NewExpense, SignatureContext, Voucher,
    VoucherFields, VoucherUpdate,
};

use super::audit::{AuditRecord, AuditRecorder};
use super::signatures::SignatureResolver;
use super::{ensure_actor_org, ensure_event_accepts};
use crate::error::EngineError;
use crate::store::Repository;

/// The paired rows written by [`VoucherCoordinator::create_with_expense`].
#[derive(Debug, Clone, PartialEq)]
pub struct VoucherCreated {
    pub expense: Expense,
    pub voucher: Voucher,
}

#[derive(Clone)]
pub struct VoucherCoordinator {
    expenses: Arc<dyn Repository<Expense>>,
    vouchers: Arc<dyn Repository<Voucher>>,
    events: Arc<dyn Repository<ExpenseEvent>>,
    signatures: SignatureResolver,
    audit: AuditRecorder,
}

impl VoucherCoordinator {
    pub fn new(
        expenses: Arc<dyn Repository<Expense>>,
        vouchers: Arc<dyn Repository<Voucher>>,
        events: Arc<dyn Repository<ExpenseEvent>>,
        signatures: SignatureResolver,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            expenses,
            vouchers,
            events,
            signatures,
            audit,
        }
    }

    /// Create an expense in voucher mode together with its voucher.
    pub fn create_with_expense(
        &self,
        actor: &Actor,
        mut draft: NewExpense,
        fields: VoucherFields,
    ) -> Result<VoucherCreated, EngineError> {
        authorize(actor, &Permission::SUBMIT)?;
        ensure_actor_org(actor, draft.org_id)?;
        fields.validate()?;
        fields.ensure_amount_matches(draft.amount)?;
        if draft.receipt_path.is_some() {
            return Err(EngineError::validation(
                "an expense takes either a receipt or a voucher, not both",
            ));
        }

        let org_id = draft.org_id;
        let approver_raw = non_empty(fields.approver_signature.as_deref());
        let countersigner = match approver_raw {
            Some(_) => Some(draft.approver_id.ok_or_else(|| {
                EngineError::validation("an approver signature needs a selected approver")
            })?),
            None => None,
        };
        let expense_raw = non_empty(draft.signature.as_deref());
        ensure_event_accepts(&*self.events, actor, org_id, draft.event_id)?;

        // Validate with the raw candidates in place; nothing is uploaded
        // until every check has passed.
        draft.signature = Some(
            expense_raw
                .clone()
                .unwrap_or_else(|| fields.submitter_signature.trim().to_string()),
        );
        let now = Utc::now();
        let mut expense = Expense::create(
            ExpenseId::new(),
            actor.user_id,
            draft,
            Some(Attachment::Voucher),
            now,
        )?;
        self.signatures.check(
            org_id,
            actor.user_id,
            &fields.submitter_signature,
            SignatureContext::VoucherSubmitter,
        )?;
        if let (Some(raw), Some(approver)) = (approver_raw.as_deref(), countersigner) {
            self.signatures
                .check(org_id, approver, raw, SignatureContext::VoucherApprover)?;
        }
        if let Some(raw) = expense_raw.as_deref() {
            self.signatures
                .check(org_id, actor.user_id, raw, SignatureContext::Expense)?;
        }

        let submitter = self.signatures.resolve(
            org_id,
            actor.user_id,
            &fields.submitter_signature,
            SignatureContext::VoucherSubmitter,
        )?;
        let approver_signature = match (approver_raw.as_deref(), countersigner) {
            (Some(raw), Some(approver)) => Some(
                self.signatures
                    .resolve(org_id, approver, raw, SignatureContext::VoucherApprover)?
                    .path,
            ),
            _ => None,
        };
        expense.signature = Some(match expense_raw.as_deref() {
            Some(raw) => {
                self.signatures
                    .resolve(org_id, actor.user_id, raw, SignatureContext::Expense)?
                    .path
            }
            None => submitter.path.clone(),
        });
        let expense = self.expenses.insert(expense)?;

        let voucher = fields.into_voucher(
            VoucherId::new(),
            org_id,
            expense.id,
            submitter.path,
            approver_signature,
            now,
        );
        let voucher = match self.vouchers.insert(voucher) {
            Ok(voucher) => voucher,
            Err(cause) => return Err(self.compensate(&expense, cause.into())),
        };

        info!(
            expense_id = %expense.id,
            voucher_id = %voucher.id,
            status = %expense.status,
            "voucher expense created"
        );
        self.audit.record(
            AuditRecord::action(
                org_id,
                expense.id,
                actor.user_id,
                Some(actor.display_name.as_str()),
                ActionType::Created,
            )
            .values(None, Some(expense.status.to_string())),
        );

        Ok(VoucherCreated { expense, voucher })
    }

    /// Undo the expense insert after the voucher insert failed.
    fn compensate(&self, expense: &Expense, cause: EngineError) -> EngineError {
        match self.expenses.delete(&expense.id) {
            Ok(()) => {
                warn!(
                    expense_id = %expense.id,
                    error = %cause,
                    "voucher insert failed; expense removed"
                );
                cause
            }
            Err(compensation) => {
                error!(
                    expense_id = %expense.id,
                    error = %cause,
                    compensation_error = %compensation,
                    "voucher insert failed and the expense could not be removed"
                );
                EngineError::CompensationFailed {
                    cause: cause.to_string(),
                    compensation: compensation.to_string(),
                }
            }
        }
    }

    /// Countersign a voucher as its approver.
    pub fn attach_approver_signature(
        &self,
        actor: &Actor,
        voucher_id: VoucherId,
        raw_signature: &str,
    ) -> Result<Voucher, EngineError> {
        authorize(actor, &Permission::APPROVE)?;
        let voucher = self
            .vouchers
            .get_by_id(&voucher_id)?
            .filter(|v| v.org_id == actor.org_id())
            .ok_or_else(|| EngineError::not_found("voucher", voucher_id))?;
        let expense = self
            .expenses
            .get_by_id(&voucher.expense_id)?
            .ok_or_else(|| EngineError::not_found("expense", voucher.expense_id))?;
        expense.ensure_not_self_review(actor.user_id)?;
        if !actor.is_privileged() && expense.approver_id.is_some_and(|a| a != actor.user_id) {
            return Err(EngineError::permission(
                "only the assigned approver may countersign this voucher",
            ));
        }

        let resolved = self.signatures.resolve(
            voucher.org_id,
            actor.user_id,
            raw_signature,
            SignatureContext::VoucherApprover,
        )?;
        let updated = self.vouchers.update(
            &voucher.id,
            VoucherUpdate {
                approver_id: Some(actor.user_id),
                approver_signature: Some(resolved.path.clone()),
                ..VoucherUpdate::default()
            },
        )?;

        info!(voucher_id = %voucher.id, approver_id = %actor.user_id, "voucher countersigned");
        self.audit.record(
            AuditRecord::action(
                voucher.org_id,
                expense.id,
                actor.user_id,
                Some(actor.display_name.as_str()),
                ActionType::VoucherApproverSigned,
            )
            .values(voucher.approver_signature.clone(), Some(resolved.path)),
        );
        Ok(updated)
    }

    /// The voucher paired with `expense_id`, if any.
    pub fn voucher_for(&self, org_id: OrgId, expense_id: ExpenseId) -> Result<Option<Voucher>, EngineError> {
        let mut found = self
            .vouchers
            .list_by_filter(org_id, &|v: &Voucher| v.expense_id == expense_id)?;
        Ok(found.pop())
    }

    /// Keep the voucher amount in step with an edited draft. Returns the
    /// previous amount when a voucher was updated.
    pub(crate) fn sync_amount(
        &self,
        org_id: OrgId,
        expense_id: ExpenseId,
        amount: Money,
    ) -> Result<Option<Money>, EngineError> {
        let Some(voucher) = self.voucher_for(org_id, expense_id)? else {
            return Ok(None);
        };
        if voucher.amount == amount {
            return Ok(None);
        }
        self.vouchers.update(
            &voucher.id,
            VoucherUpdate {
                amount: Some(amount),
                ..VoucherUpdate::default()
            },
        )?;
        Ok(Some(voucher.amount))
    }

    /// Delete the voucher of an expense being deleted. Returns whether one existed.
    pub(crate) fn delete_for_expense(&self, org_id: OrgId, expense_id: ExpenseId) -> Result<bool, EngineError> {
        match self.voucher_for(org_id, expense_id)? {
            Some(voucher) => {
                self.vouchers.delete(&voucher.id)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
