//! Expense Lifecycle Controller: the status state machine.
//!
//! Every transition follows the same pipeline:
//!
//! ```text
//! authorize ─ load ─ guard (self-review, assignment) ─ table lookup
//!   ─ optimistic re-read ─ single update-by-id ─ audit (fire-and-forget)
//! ```
//!
//! Guards run before any write, so a rejected action leaves no trace.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use reimburse_auth::{Actor, Permission, authorize};
use reimburse_core::{ExpenseId, Money};
use reimburse_expenses::{
    ActionType, ApprovalDecision, ApprovalOption, Attachment, Expense, ExpenseAction,
    ExpenseEvent, ExpensePatch, ExpenseStatus, ExpenseUpdate, HistoryEntry, NewExpense,
    PaymentStatus, SignatureContext,
};

use super::audit::{AuditRecord, AuditRecorder};
use super::policy_engine::PolicyEngine;
use super::signatures::SignatureResolver;
use super::vouchers::VoucherCoordinator;
use super::{ensure_actor_org, ensure_event_accepts};
use crate::config::{CustomAmountCap, EngineConfig};
use crate::error::EngineError;
use crate::store::Repository;

/// Approval variants offered for a submitted expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalOptions {
    pub over_limit: bool,
    pub upper_limit: Option<Money>,
    pub options: Vec<ApprovalOption>,
}

#[derive(Clone)]
pub struct LifecycleController {
    expenses: Arc<dyn Repository<Expense>>,
    events: Arc<dyn Repository<ExpenseEvent>>,
    policy: PolicyEngine,
    signatures: SignatureResolver,
    vouchers: VoucherCoordinator,
    audit: AuditRecorder,
    optimistic_checks: bool,
    custom_amount_cap: CustomAmountCap,
}

impl LifecycleController {
    pub fn new(
        expenses: Arc<dyn Repository<Expense>>,
        events: Arc<dyn Repository<ExpenseEvent>>,
        policy: PolicyEngine,
        signatures: SignatureResolver,
        vouchers: VoucherCoordinator,
        audit: AuditRecorder,
        config: &EngineConfig,
    ) -> Self {
        Self {
            expenses,
            events,
            policy,
            signatures,
            vouchers,
            audit,
            optimistic_checks: config.optimistic_checks,
            custom_amount_cap: config.custom_amount_cap,
        }
    }

    /// Create a receipt-mode expense as `draft`, or directly as `submitted`.
    ///
    /// Voucher-mode expenses go through [`VoucherCoordinator::create_with_expense`].
    pub fn create_expense(&self, actor: &Actor, input: NewExpense) -> Result<Expense, EngineError> {
        authorize(actor, &Permission::SUBMIT)?;
        ensure_actor_org(actor, input.org_id)?;

        let attachment = input
            .receipt_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|path| Attachment::Receipt {
                path: path.to_string(),
            });
        ensure_event_accepts(&*self.events, actor, input.org_id, input.event_id)?;

        // Validated with the raw signature in place; the upload happens only
        // once every check has passed.
        let org_id = input.org_id;
        let mut expense = Expense::create(ExpenseId::new(), actor.user_id, input, attachment, Utc::now())?;
        if let Some(raw) = expense.signature.clone() {
            let resolved = self
                .signatures
                .resolve(org_id, actor.user_id, &raw, SignatureContext::Expense)?;
            expense.signature = Some(resolved.path);
        }
        let expense = self.expenses.insert(expense)?;

        info!(expense_id = %expense.id, status = %expense.status, "expense created");
        self.audit.record(
            self.entry(actor, &expense, ActionType::Created)
                .values(None, Some(expense.status.to_string())),
        );
        Ok(expense)
    }

    /// Load an expense visible to `actor`'s org.
    pub fn get(&self, actor: &Actor, expense_id: ExpenseId) -> Result<Expense, EngineError> {
        self.expenses
            .get_by_id(&expense_id)?
            .filter(|e| e.org_id == actor.org_id())
            .ok_or_else(|| EngineError::not_found("expense", expense_id))
    }

    /// Edit a draft. One history entry per changed field; no-op patches write nothing.
    pub fn update_draft(
        &self,
        actor: &Actor,
        expense_id: ExpenseId,
        patch: ExpensePatch,
    ) -> Result<Expense, EngineError> {
        authorize(actor, &Permission::SUBMIT)?;
        let expense = self.get(actor, expense_id)?;
        if expense.creator_id != actor.user_id {
            return Err(EngineError::permission("only the creator may edit an expense"));
        }
        if expense.status != ExpenseStatus::Draft {
            return Err(EngineError::InvalidTransition(format!(
                "cannot edit an expense in status '{}'",
                expense.status
            )));
        }
        patch.validate()?;
        if patch.receipt_path.is_some() && expense.is_voucher_mode() {
            return Err(EngineError::validation(
                "an expense takes either a receipt or a voucher, not both",
            ));
        }
        if patch.approver_id == Some(expense.creator_id) {
            return Err(EngineError::permission(
                "the approver must be someone other than the creator",
            ));
        }

        let changes = expense.patch_changes(&patch);
        if changes.is_empty() {
            return Ok(expense);
        }
        // A voucher attests the claimed amount, so it moves with the expense.
        let previous_voucher_amount = match patch.amount {
            Some(amount) if expense.is_voucher_mode() => {
                self.vouchers.sync_amount(expense.org_id, expense.id, amount)?
            }
            _ => None,
        };
        let updated = match self.expenses.update(&expense.id, patch.into_update(Utc::now())) {
            Ok(updated) => updated,
            Err(cause) => {
                if let Some(previous) = previous_voucher_amount {
                    if let Err(restore) = self.vouchers.sync_amount(expense.org_id, expense.id, previous) {
                        error!(
                            expense_id = %expense.id,
                            error = %cause,
                            restore_error = %restore,
                            "draft update failed and the voucher amount could not be restored"
                        );
                    }
                }
                return Err(cause.into());
            }
        };

        info!(expense_id = %expense.id, fields = changes.len(), "draft updated");
        self.audit.record_changes(
            expense.org_id,
            expense.id,
            actor.user_id,
            Some(actor.display_name.as_str()),
            changes,
        );
        Ok(updated)
    }

    /// draft → submitted. Creator only.
    pub fn submit(&self, actor: &Actor, expense_id: ExpenseId) -> Result<Expense, EngineError> {
        authorize(actor, &Permission::SUBMIT)?;
        let expense = self.get(actor, expense_id)?;
        if expense.creator_id != actor.user_id {
            return Err(EngineError::permission("only the creator may submit an expense"));
        }

        let mut candidate = expense.clone();
        candidate.status = expense.status.next(ExpenseAction::Submit)?;
        candidate.validate_submission()?;
        if expense.is_voucher_mode() && self.vouchers.voucher_for(expense.org_id, expense.id)?.is_none() {
            return Err(EngineError::validation("voucher expense has no voucher"));
        }

        self.transition(actor, &expense, ExpenseAction::Submit, ExpenseUpdate::default(), None)
    }

    /// submitted → approved | approved_as_per_policy.
    pub fn approve(
        &self,
        actor: &Actor,
        expense_id: ExpenseId,
        decision: ApprovalDecision,
    ) -> Result<Expense, EngineError> {
        authorize(actor, &Permission::APPROVE)?;
        let expense = self.get(actor, expense_id)?;
        self.ensure_may_review(actor, &expense)?;
        let action = decision.action();
        let next = expense.status.next(action)?;

        let approved_amount = match decision {
            ApprovalDecision::Full => expense.amount,
            ApprovalDecision::AsPerPolicy => {
                let evaluation = self
                    .policy
                    .evaluate(expense.org_id, &expense.expense_type, expense.amount);
                match evaluation.upper_limit() {
                    Some(limit) if evaluation.over_limit => limit,
                    _ => {
                        return Err(EngineError::validation(
                            "approval as per policy requires an amount above the policy limit",
                        ));
                    }
                }
            }
            ApprovalDecision::Custom(amount) => {
                if self.custom_amount_cap == CustomAmountCap::Submitted && amount > expense.amount {
                    return Err(EngineError::validation(format!(
                        "custom amount {amount} exceeds the submitted amount {}",
                        expense.amount
                    )));
                }
                amount
            }
        };

        let update = ExpenseUpdate {
            approved_amount: Some(Some(approved_amount)),
            approver_id: Some(Some(actor.user_id)),
            ..ExpenseUpdate::default()
        };
        self.transition(actor, &expense, action, update, Some(format!("{next}: {approved_amount}")))
    }

    /// submitted → rejected, with an optional comment.
    pub fn reject(
        &self,
        actor: &Actor,
        expense_id: ExpenseId,
        comment: Option<&str>,
    ) -> Result<Expense, EngineError> {
        authorize(actor, &Permission::APPROVE)?;
        let expense = self.get(actor, expense_id)?;
        self.ensure_may_review(actor, &expense)?;

        let comment = comment.map(str::trim).filter(|c| !c.is_empty());
        let mut update = ExpenseUpdate {
            approver_id: Some(Some(actor.user_id)),
            ..ExpenseUpdate::default()
        };
        if let Some(comment) = comment {
            update.review_comment = Some(Some(comment.to_string()));
        }
        self.transition(actor, &expense, ExpenseAction::Reject, update, None)
    }

    /// approved | approved_as_per_policy → finance_approved; payment pending.
    pub fn finance_approve(&self, actor: &Actor, expense_id: ExpenseId) -> Result<Expense, EngineError> {
        authorize(actor, &Permission::FINANCE_REVIEW)?;
        let expense = self.get(actor, expense_id)?;
        expense.ensure_not_self_review(actor.user_id)?;

        let update = ExpenseUpdate {
            payment_status: Some(Some(PaymentStatus::Pending)),
            ..ExpenseUpdate::default()
        };
        let new_value = expense
            .approved_amount
            .map(|amount| format!("{}: {amount}", ExpenseStatus::FinanceApproved));
        self.transition(actor, &expense, ExpenseAction::FinanceApprove, update, new_value)
    }

    /// approved | approved_as_per_policy → finance_rejected. A comment is required.
    pub fn finance_reject(
        &self,
        actor: &Actor,
        expense_id: ExpenseId,
        comment: &str,
    ) -> Result<Expense, EngineError> {
        authorize(actor, &Permission::FINANCE_REVIEW)?;
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(EngineError::validation("a comment is required to reject as finance"));
        }
        let expense = self.get(actor, expense_id)?;
        expense.ensure_not_self_review(actor.user_id)?;

        let update = ExpenseUpdate {
            approved_amount: Some(None),
            review_comment: Some(Some(comment.to_string())),
            ..ExpenseUpdate::default()
        };
        self.transition(actor, &expense, ExpenseAction::FinanceReject, update, None)
    }

    /// finance_approved → reimbursed; payment paid.
    pub fn mark_reimbursed(&self, actor: &Actor, expense_id: ExpenseId) -> Result<Expense, EngineError> {
        authorize(actor, &Permission::FINANCE_REVIEW)?;
        let expense = self.get(actor, expense_id)?;
        expense.ensure_not_self_review(actor.user_id)?;

        let update = ExpenseUpdate {
            payment_status: Some(Some(PaymentStatus::Paid)),
            ..ExpenseUpdate::default()
        };
        self.transition(actor, &expense, ExpenseAction::MarkReimbursed, update, None)
    }

    /// Delete a draft or rejected expense with its voucher and history.
    pub fn delete_expense(&self, actor: &Actor, expense_id: ExpenseId) -> Result<(), EngineError> {
        let expense = self.get(actor, expense_id)?;
        if expense.creator_id != actor.user_id && !actor.is_privileged() {
            return Err(EngineError::permission("only the creator may delete an expense"));
        }
        if !expense.status.is_deletable() {
            return Err(EngineError::InvalidTransition(format!(
                "cannot delete an expense in status '{}'",
                expense.status
            )));
        }

        // The expense goes first: a failure after this point can only leave an
        // orphaned voucher, never a voucher-mode expense without one.
        self.expenses.delete(&expense.id)?;
        let had_voucher = match self.vouchers.delete_for_expense(expense.org_id, expense.id) {
            Ok(had_voucher) => had_voucher,
            Err(err) => {
                warn!(
                    expense_id = %expense.id,
                    error = %err,
                    "expense deleted but its voucher could not be removed"
                );
                true
            }
        };
        match self.audit.purge(expense.org_id, expense.id) {
            Ok(purged) => info!(expense_id = %expense.id, had_voucher, purged, "expense deleted"),
            Err(err) => warn!(
                expense_id = %expense.id,
                error = %err,
                "expense deleted but its history could not be purged"
            ),
        }
        Ok(())
    }

    /// History of an expense, oldest first.
    pub fn history(&self, actor: &Actor, expense_id: ExpenseId) -> Result<Vec<HistoryEntry>, EngineError> {
        let expense = self.get(actor, expense_id)?;
        self.audit.history(expense.org_id, expense.id)
    }

    pub fn approval_options(&self, actor: &Actor, expense_id: ExpenseId) -> Result<ApprovalOptions, EngineError> {
        let expense = self.get(actor, expense_id)?;
        if expense.status != ExpenseStatus::Submitted {
            return Err(EngineError::InvalidTransition(format!(
                "an expense in status '{}' is not awaiting approval",
                expense.status
            )));
        }
        let evaluation = self
            .policy
            .evaluate(expense.org_id, &expense.expense_type, expense.amount);
        Ok(ApprovalOptions {
            over_limit: evaluation.over_limit,
            upper_limit: evaluation.upper_limit(),
            options: evaluation.approval_options(),
        })
    }

    /// First-stage reviewers: never the creator; the assigned approver unless privileged.
    fn ensure_may_review(&self, actor: &Actor, expense: &Expense) -> Result<(), EngineError> {
        expense.ensure_not_self_review(actor.user_id)?;
        if !actor.is_privileged() && expense.approver_id.is_some_and(|a| a != actor.user_id) {
            return Err(EngineError::permission(
                "only the assigned approver may review this expense",
            ));
        }
        Ok(())
    }

    fn transition(
        &self,
        actor: &Actor,
        expense: &Expense,
        action: ExpenseAction,
        mut update: ExpenseUpdate,
        new_value: Option<String>,
    ) -> Result<Expense, EngineError> {
        let from = expense.status;
        let to = from.next(action)?;

        if self.optimistic_checks {
            let current = self
                .expenses
                .get_by_id(&expense.id)?
                .ok_or_else(|| EngineError::not_found("expense", expense.id))?;
            if current.status != from {
                return Err(EngineError::StaleState {
                    expected: from.to_string(),
                    actual: current.status.to_string(),
                });
            }
        }

        update.status = Some(to);
        update.updated_at = Some(Utc::now());
        let updated = self.expenses.update(&expense.id, update)?;

        info!(
            expense_id = %expense.id,
            actor_id = %actor.user_id,
            from = %from,
            to = %to,
            "expense transitioned"
        );
        let old_value = match expense.approved_amount {
            Some(amount) => format!("{from}: {amount}"),
            None => from.to_string(),
        };
        self.audit.record(
            self.entry(actor, expense, ActionType::entering(to))
                .values(Some(old_value), Some(new_value.unwrap_or_else(|| to.to_string()))),
        );
        Ok(updated)
    }

    fn entry(&self, actor: &Actor, expense: &Expense, action_type: ActionType) -> AuditRecord {
        AuditRecord::action(
            expense.org_id,
            expense.id,
            actor.user_id,
            Some(actor.display_name.as_str()),
            action_type,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::engine::testing::Harness;

    #[test]
    fn draft_is_created_and_submitted_by_its_creator() {
        let h = Harness::new();
        let mut input = h.receipt_expense(6000);
        input.submit = false;
        let expense = h.engine.lifecycle.create_expense(&h.member, input).unwrap();
        assert_eq!(expense.status, ExpenseStatus::Draft);

        let err = h.engine.lifecycle.submit(&h.approver, expense.id).unwrap_err();
        assert_eq!(err.code(), "permission_error");

        let submitted = h.engine.lifecycle.submit(&h.member, expense.id).unwrap();
        assert_eq!(submitted.status, ExpenseStatus::Submitted);
    }

    #[test]
    fn creator_cannot_approve_own_expense() {
        let h = Harness::new();
        let expense = h.submitted(&h.admin, 100);
        let err = h
            .engine
            .lifecycle
            .approve(&h.admin, expense.id, ApprovalDecision::Full)
            .unwrap_err();
        assert_eq!(err.code(), "permission_error");
        assert_eq!(h.reload(expense.id).status, ExpenseStatus::Submitted);
    }

    #[test]
    fn only_the_assigned_approver_reviews_unless_privileged() {
        let h = Harness::new();
        let expense = h.submitted(&h.member, 100);
        let other = h.actor_with_role(reimburse_auth::Role::APPROVER);

        let err = h.engine.lifecycle.reject(&other, expense.id, None).unwrap_err();
        assert_eq!(err.code(), "permission_error");

        let rejected = h
            .engine
            .lifecycle
            .reject(&h.admin, expense.id, Some("duplicate claim"))
            .unwrap();
        assert_eq!(rejected.status, ExpenseStatus::Rejected);
        assert_eq!(rejected.review_comment.as_deref(), Some("duplicate claim"));
        assert_eq!(rejected.approver_id, Some(h.admin.user_id));
        assert!(rejected.approved_amount.is_none());
    }

    #[test]
    fn custom_amount_above_submitted_is_rejected_by_default() {
        let h = Harness::new();
        let expense = h.submitted(&h.member, 100);
        let err = h
            .engine
            .lifecycle
            .approve(&h.approver, expense.id, ApprovalDecision::Custom(Money::major(150).unwrap()))
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn invalid_transition_is_reported() {
        let h = Harness::new();
        let expense = h.submitted(&h.member, 100);
        let err = h.engine.lifecycle.finance_approve(&h.finance, expense.id).unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
    }

    #[test]
    fn finance_path_sets_payment_status() {
        let h = Harness::new();
        let expense = h.submitted(&h.member, 100);
        h.engine
            .lifecycle
            .approve(&h.approver, expense.id, ApprovalDecision::Full)
            .unwrap();

        let approved = h.engine.lifecycle.finance_approve(&h.finance, expense.id).unwrap();
        assert_eq!(approved.payment_status, Some(PaymentStatus::Pending));
        let paid = h.engine.lifecycle.mark_reimbursed(&h.finance, expense.id).unwrap();
        assert_eq!(paid.status, ExpenseStatus::Reimbursed);
        assert_eq!(paid.payment_status, Some(PaymentStatus::Paid));
        assert_eq!(paid.approved_amount, Some(Money::major(100).unwrap()));
    }

    #[test]
    fn finance_reject_clears_approved_amount() {
        let h = Harness::new();
        let expense = h.submitted(&h.member, 100);
        h.engine
            .lifecycle
            .approve(&h.approver, expense.id, ApprovalDecision::Full)
            .unwrap();
        let rejected = h
            .engine
            .lifecycle
            .finance_reject(&h.finance, expense.id, "missing GST number")
            .unwrap();
        assert_eq!(rejected.status, ExpenseStatus::FinanceRejected);
        assert!(rejected.approved_amount.is_none());

        let history = h.engine.lifecycle.history(&h.member, expense.id).unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.action_type, ActionType::FinanceRejected);
        assert_eq!(last.old_value.as_deref(), Some("approved: 100.00"));
    }

    #[test]
    fn stale_status_aborts_the_transition() {
        let h = Harness::new();
        let expense = h.submitted(&h.member, 100);
        // Another reviewer rejects between our read and our write.
        h.store
            .expenses
            .update(
                &expense.id,
                ExpenseUpdate {
                    status: Some(ExpenseStatus::Rejected),
                    ..ExpenseUpdate::default()
                },
            )
            .unwrap();

        let err = h
            .engine
            .lifecycle
            .transition(&h.approver, &expense, ExpenseAction::ApproveFull, ExpenseUpdate::default(), None)
            .unwrap_err();
        assert_eq!(err.code(), "stale_state");
        assert_eq!(h.reload(expense.id).status, ExpenseStatus::Rejected);
    }

    #[test]
    fn draft_edits_write_one_entry_per_changed_field() {
        let h = Harness::new();
        let mut input = h.receipt_expense(100);
        input.submit = false;
        let expense = h.engine.lifecycle.create_expense(&h.member, input).unwrap();

        let patch = ExpensePatch {
            amount: Some(Money::major(120).unwrap()),
            expense_type: Some("Travel".to_string()),
            date: Some(chrono::NaiveDate::from_ymd_opt(2026, 4, 2).unwrap()),
            ..ExpensePatch::default()
        };
        let updated = h.engine.lifecycle.update_draft(&h.member, expense.id, patch).unwrap();
        assert_eq!(updated.amount, Money::major(120).unwrap());

        let history = h.engine.lifecycle.history(&h.member, expense.id).unwrap();
        let fields: Vec<_> = history.iter().filter_map(|e| e.field.as_deref()).collect();
        assert_eq!(fields, vec!["amount", "date"]);

        let unchanged = ExpensePatch {
            expense_type: Some("Travel".to_string()),
            ..ExpensePatch::default()
        };
        h.engine.lifecycle.update_draft(&h.member, expense.id, unchanged).unwrap();
        assert_eq!(h.engine.lifecycle.history(&h.member, expense.id).unwrap().len(), 3);
    }

    #[test]
    fn delete_removes_history_and_is_limited_to_deletable_states() {
        let h = Harness::new();
        let expense = h.submitted(&h.member, 100);
        let err = h.engine.lifecycle.delete_expense(&h.member, expense.id).unwrap_err();
        assert_eq!(err.code(), "invalid_transition");

        h.engine.lifecycle.reject(&h.approver, expense.id, None).unwrap();
        h.engine.lifecycle.delete_expense(&h.member, expense.id).unwrap();
        assert!(h.store.expenses.is_empty());
        assert!(h.store.history.is_empty());
    }
}
