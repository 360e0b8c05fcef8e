//! Integration tests for the full reimbursement engine.
//!
//! Tests: engine components → in-memory collaborators (with failure injection)
//!
//! Verifies:
//! - Policy-driven approval variants and amounts
//! - Expense ↔ voucher pairing, including the compensating delete
//! - Event cascades and read-time totals
//! - Audit trail ordering and fire-and-forget semantics
//! - Timeouts surface as retryable errors

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::NaiveDate;
    use proptest::prelude::*;

    use reimburse_core::{Money, OrgId};
    use reimburse_expenses::{
        ActionType, ApprovalDecision, ApprovalOption, ExpensePatch, ExpenseStatus, NewEvent,
        SignatureContext,
    };

    use crate::config::{CustomAmountCap, EngineConfig};
    use crate::engine::InMemoryCollaborators;
    use crate::engine::testing::{Harness, PNG};
    use crate::error::StoreError;
    use crate::store::{InMemoryRepository, StaticIdentity, StoreOp};

    fn major(amount: i64) -> Money {
        Money::major(amount).unwrap()
    }

    #[test]
    fn over_limit_expense_offers_policy_and_custom_approval() {
        let h = Harness::new();
        h.seed_policy("travel", Some(5000));

        let by_policy = h.submitted(&h.member, 6000);
        let options = h.engine.lifecycle.approval_options(&h.approver, by_policy.id).unwrap();
        assert!(options.over_limit);
        assert_eq!(options.upper_limit, Some(major(5000)));
        assert_eq!(
            options.options,
            vec![ApprovalOption::Full, ApprovalOption::AsPerPolicy, ApprovalOption::Custom]
        );

        let approved = h
            .engine
            .lifecycle
            .approve(&h.approver, by_policy.id, ApprovalDecision::AsPerPolicy)
            .unwrap();
        assert_eq!(approved.status, ExpenseStatus::ApprovedAsPerPolicy);
        assert_eq!(approved.approved_amount, Some(major(5000)));

        let custom = h.submitted(&h.member, 6000);
        let approved = h
            .engine
            .lifecycle
            .approve(&h.approver, custom.id, ApprovalDecision::Custom(major(4500)))
            .unwrap();
        assert_eq!(approved.status, ExpenseStatus::Approved);
        assert_eq!(approved.approved_amount, Some(major(4500)));
    }

    #[test]
    fn without_a_policy_only_full_and_custom_are_offered() {
        let h = Harness::new();
        h.seed_policy("Meals", Some(10));
        let expense = h.submitted(&h.member, 6000);

        let options = h.engine.lifecycle.approval_options(&h.approver, expense.id).unwrap();
        assert!(!options.over_limit);
        assert_eq!(options.options, vec![ApprovalOption::Full, ApprovalOption::Custom]);

        let err = h
            .engine
            .lifecycle
            .approve(&h.approver, expense.id, ApprovalDecision::AsPerPolicy)
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert_eq!(h.reload(expense.id).status, ExpenseStatus::Submitted);
        assert!(h.reload(expense.id).approved_amount.is_none());
    }

    #[test]
    fn policy_outage_degrades_to_no_policy() {
        let h = Harness::new();
        h.seed_policy("Travel", Some(5000));
        let expense = h.submitted(&h.member, 6000);
        h.store
            .policies
            .fail_next(StoreOp::List, StoreError::backend("connection reset"));

        let options = h.engine.lifecycle.approval_options(&h.approver, expense.id).unwrap();
        assert!(!options.over_limit);
        let approved = h
            .engine
            .lifecycle
            .approve(&h.approver, expense.id, ApprovalDecision::Full)
            .unwrap();
        assert_eq!(approved.approved_amount, Some(major(6000)));
    }

    #[test]
    fn finance_reject_without_comment_changes_nothing() {
        let h = Harness::new();
        let expense = h.submitted(&h.member, 100);
        h.engine
            .lifecycle
            .approve(&h.approver, expense.id, ApprovalDecision::Full)
            .unwrap();
        let before = h.engine.lifecycle.history(&h.member, expense.id).unwrap().len();

        let err = h
            .engine
            .lifecycle
            .finance_reject(&h.finance, expense.id, "   ")
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert_eq!(h.reload(expense.id).status, ExpenseStatus::Approved);
        assert_eq!(h.engine.lifecycle.history(&h.member, expense.id).unwrap().len(), before);
    }

    #[test]
    fn history_of_created_approved_finance_approved() {
        let h = Harness::new();
        let expense = h.submitted(&h.member, 100);
        h.engine
            .lifecycle
            .approve(&h.approver, expense.id, ApprovalDecision::Full)
            .unwrap();
        h.engine.lifecycle.finance_approve(&h.finance, expense.id).unwrap();

        let history = h.engine.lifecycle.history(&h.member, expense.id).unwrap();
        let actions: Vec<ActionType> = history.iter().map(|e| e.action_type).collect();
        assert_eq!(
            actions,
            vec![ActionType::Created, ActionType::Approved, ActionType::FinanceApproved]
        );
        let last = history.last().unwrap();
        assert_eq!(last.actor_id, h.finance.user_id);
        assert_eq!(last.actor_name, "Chen Wei");
    }

    #[test]
    fn self_approval_is_rejected_before_any_write() {
        let h = Harness::new();
        // An approver filing their own claim, assigned to a second approver.
        let other = h.actor_with_role(reimburse_auth::Role::APPROVER);
        let mut input = h.receipt_expense(100);
        input.approver_id = Some(other.user_id);
        let expense = h.engine.lifecycle.create_expense(&h.approver, input).unwrap();
        let entries = h.store.history.len();

        let err = h
            .engine
            .lifecycle
            .approve(&h.approver, expense.id, ApprovalDecision::Full)
            .unwrap_err();
        assert_eq!(err.code(), "permission_error");
        assert_eq!(h.reload(expense.id), expense);
        assert_eq!(h.store.history.len(), entries);
    }

    #[test]
    fn voucher_mode_round_trip() {
        let h = Harness::new();
        let mut draft = h.receipt_expense(120);
        draft.receipt_path = None;
        draft.signature = None;

        let created = h
            .engine
            .vouchers
            .create_with_expense(&h.member, draft, h.voucher_fields(120))
            .unwrap();
        assert!(created.expense.is_voucher_mode());
        assert_eq!(created.expense.status, ExpenseStatus::Submitted);
        assert_eq!(created.voucher.expense_id, created.expense.id);
        assert_eq!(created.expense.signature.as_deref(), Some(created.voucher.submitter_signature.as_str()));

        let found = h.engine.vouchers.voucher_for(h.org, created.expense.id).unwrap();
        assert_eq!(found, Some(created.voucher.clone()));

        let receipt = h.submitted(&h.member, 50);
        assert!(h.engine.vouchers.voucher_for(h.org, receipt.id).unwrap().is_none());
    }

    #[test]
    fn receipt_and_voucher_together_are_rejected() {
        let h = Harness::new();
        let err = h
            .engine
            .vouchers
            .create_with_expense(&h.member, h.receipt_expense(120), h.voucher_fields(120))
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert!(h.store.expenses.is_empty());
    }

    #[test]
    fn failed_voucher_insert_removes_the_expense() {
        let h = Harness::new();
        h.store
            .vouchers
            .fail_next(StoreOp::Insert, StoreError::backend("constraint violated"));
        let mut draft = h.receipt_expense(120);
        draft.receipt_path = None;

        let err = h
            .engine
            .vouchers
            .create_with_expense(&h.member, draft, h.voucher_fields(120))
            .unwrap_err();
        assert_eq!(err.code(), "persistence_error");
        assert!(h.store.expenses.is_empty());
        assert!(h.store.vouchers.is_empty());
    }

    #[test]
    fn failed_compensation_is_reported() {
        let h = Harness::new();
        h.store
            .vouchers
            .fail_next(StoreOp::Insert, StoreError::backend("constraint violated"));
        h.store
            .expenses
            .fail_next(StoreOp::Delete, StoreError::backend("connection lost"));
        let mut draft = h.receipt_expense(120);
        draft.receipt_path = None;

        let err = h
            .engine
            .vouchers
            .create_with_expense(&h.member, draft, h.voucher_fields(120))
            .unwrap_err();
        assert_eq!(err.code(), "compensation_failed");
        assert_eq!(h.store.expenses.len(), 1);
    }

    #[test]
    fn approver_countersigns_voucher_without_touching_saved_signature() {
        let h = Harness::new();
        let mut draft = h.receipt_expense(120);
        draft.receipt_path = None;
        let created = h
            .engine
            .vouchers
            .create_with_expense(&h.member, draft, h.voucher_fields(120))
            .unwrap();
        let saved_before = h.store.signatures.snapshot();

        let signed = h
            .engine
            .vouchers
            .attach_approver_signature(&h.approver, created.voucher.id, PNG)
            .unwrap();
        let path = signed.approver_signature.clone().unwrap();
        assert!(path.starts_with(&format!("signatures/approvers/{}/", h.approver.user_id)));
        assert_eq!(signed.approver_id, Some(h.approver.user_id));
        assert_eq!(h.store.signatures.snapshot(), saved_before);

        let history = h.engine.lifecycle.history(&h.member, created.expense.id).unwrap();
        assert_eq!(history.last().unwrap().action_type, ActionType::VoucherApproverSigned);

        let err = h
            .engine
            .vouchers
            .attach_approver_signature(&h.admin, created.voucher.id, "data:image/png;base64,###")
            .unwrap_err();
        assert_eq!(err.code(), "format_error");
    }

    #[test]
    fn deleting_a_voucher_expense_deletes_its_voucher() {
        let h = Harness::new();
        let mut draft = h.receipt_expense(120);
        draft.receipt_path = None;
        draft.submit = false;
        let created = h
            .engine
            .vouchers
            .create_with_expense(&h.member, draft, h.voucher_fields(120))
            .unwrap();
        assert_eq!(created.expense.status, ExpenseStatus::Draft);

        h.engine.lifecycle.delete_expense(&h.member, created.expense.id).unwrap();
        assert!(h.store.vouchers.is_empty());
        assert!(h.store.expenses.is_empty());
    }

    #[test]
    fn delete_event_unlinks_and_keeps_members() {
        let h = Harness::new();
        let event = h
            .engine
            .events
            .create_event(
                &h.member,
                NewEvent {
                    org_id: h.org,
                    title: "Quarterly review".to_string(),
                    description: Some("Hotel and meals".to_string()),
                    start_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
                    end_date: NaiveDate::from_ymd_opt(2026, 6, 3).unwrap(),
                },
            )
            .unwrap();
        let a = h.draft(&h.member, 40);
        let b = h.draft(&h.member, 60);
        h.engine.events.add_member(&h.member, event.id, a.id).unwrap();
        h.engine.events.add_member(&h.member, event.id, b.id).unwrap();

        let deletion = h.engine.events.delete_event(&h.member, event.id).unwrap();
        assert!(deletion.deleted);
        assert_eq!(deletion.report.succeeded.len(), 2);
        for id in [a.id, b.id] {
            let member = h.reload(id);
            assert!(member.event_id.is_none());
            assert_eq!(member.status, ExpenseStatus::Draft);
        }
        assert!(h.store.events.is_empty());
    }

    #[test]
    fn event_totals_follow_member_status() {
        let h = Harness::new();
        let event = h
            .engine
            .events
            .create_event(
                &h.member,
                NewEvent {
                    org_id: h.org,
                    title: "Conference".to_string(),
                    description: None,
                    start_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
                    end_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
                },
            )
            .unwrap();
        let ids: Vec<_> = [100, 200, 300]
            .into_iter()
            .map(|amount| {
                let draft = h.draft(&h.member, amount);
                h.engine.events.add_member(&h.member, event.id, draft.id).unwrap();
                draft.id
            })
            .collect();

        let submission = h.engine.events.submit_event(&h.member, event.id).unwrap();
        let mut succeeded = submission.report.succeeded.clone();
        succeeded.sort();
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(succeeded, expected);

        h.engine
            .lifecycle
            .approve(&h.approver, ids[0], ApprovalDecision::Custom(major(80)))
            .unwrap();
        h.engine
            .lifecycle
            .approve(&h.approver, ids[1], ApprovalDecision::Full)
            .unwrap();
        h.engine.lifecycle.finance_approve(&h.finance, ids[1]).unwrap();
        h.engine.lifecycle.reject(&h.approver, ids[2], None).unwrap();

        let summary = h.engine.events.event_summary(&h.member, event.id).unwrap();
        assert_eq!(summary.members.len(), 3);
        assert_eq!(summary.totals.submitted_total, major(600));
        assert_eq!(summary.totals.approved_total, major(280));
    }

    #[test]
    fn audit_failure_does_not_undo_the_transition() {
        let h = Harness::new();
        let expense = h.submitted(&h.member, 100);
        h.store
            .history
            .fail_next(StoreOp::Insert, StoreError::backend("history table offline"));

        let approved = h
            .engine
            .lifecycle
            .approve(&h.approver, expense.id, ApprovalDecision::Full)
            .unwrap();
        assert_eq!(approved.status, ExpenseStatus::Approved);
        assert_eq!(h.reload(expense.id).status, ExpenseStatus::Approved);
        assert_eq!(h.engine.lifecycle.history(&h.member, expense.id).unwrap().len(), 1);
    }

    #[test]
    fn slow_persistence_surfaces_as_retryable() {
        let config = EngineConfig {
            call_timeout: Duration::from_millis(200),
            ..EngineConfig::default()
        };
        let mut store = InMemoryCollaborators::new(&config);
        store.expenses = Arc::new(
            InMemoryRepository::new()
                .with_call_timeout(config.call_timeout)
                .with_simulated_latency(Duration::from_millis(500)),
        );
        let h = Harness::with_store(store, config);

        let err = h
            .engine
            .lifecycle
            .create_expense(&h.member, h.receipt_expense(100))
            .unwrap_err();
        assert_eq!(err.code(), "retryable");
    }

    #[test]
    fn unbounded_custom_amounts_are_configurable() {
        let h = Harness::with_config(EngineConfig {
            custom_amount_cap: CustomAmountCap::Unbounded,
            ..EngineConfig::default()
        });
        let expense = h.submitted(&h.member, 100);
        let approved = h
            .engine
            .lifecycle
            .approve(&h.approver, expense.id, ApprovalDecision::Custom(major(150)))
            .unwrap();
        assert_eq!(approved.approved_amount, Some(major(150)));
    }

    #[test]
    fn unknown_actor_name_falls_back_to_identity_chain() {
        let config = EngineConfig::default();
        let h = Harness::with_store(
            InMemoryCollaborators::new(&config).with_identity(StaticIdentity::unavailable()),
            config,
        );
        let mut nameless = h.member.clone();
        nameless.display_name = String::new();

        let expense = h
            .engine
            .lifecycle
            .create_expense(&nameless, h.receipt_expense(100))
            .unwrap();
        let history = h.engine.lifecycle.history(&nameless, expense.id).unwrap();
        assert_eq!(history[0].actor_name, "Unknown User");
    }

    #[test]
    fn other_orgs_cannot_see_expenses() {
        let h = Harness::new();
        let expense = h.submitted(&h.member, 100);
        let outsider = reimburse_auth::Actor::new(
            reimburse_core::UserId::new(),
            "Outsider",
            reimburse_auth::OrgMembership::new(OrgId::new(), vec![reimburse_auth::Role::ADMIN]),
        );
        let err = h
            .engine
            .lifecycle
            .approve(&outsider, expense.id, ApprovalDecision::Full)
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn rejected_create_uploads_nothing() {
        let h = Harness::new();
        let mut input = h.receipt_expense(100);
        input.approver_id = None;
        let err = h.engine.lifecycle.create_expense(&h.member, input).unwrap_err();
        assert_eq!(err.code(), "validation_error");

        let mut draft = h.receipt_expense(120);
        draft.receipt_path = None;
        let mut fields = h.voucher_fields(120);
        fields.approver_signature = Some("data:image/png;base64,###".to_string());
        let err = h
            .engine
            .vouchers
            .create_with_expense(&h.member, draft, fields)
            .unwrap_err();
        assert_eq!(err.code(), "format_error");

        assert_eq!(h.store.blobs.upload_count(), 0);
        assert!(h.store.signatures.is_empty());
        assert!(h.store.expenses.is_empty());
    }

    #[test]
    fn claims_cannot_reuse_another_users_signature() {
        let h = Harness::new();
        let theirs = h
            .engine
            .signatures
            .resolve(h.org, h.approver.user_id, PNG, SignatureContext::Expense)
            .unwrap();

        let mut input = h.receipt_expense(100);
        input.signature = Some(theirs.path.clone());
        let err = h.engine.lifecycle.create_expense(&h.member, input).unwrap_err();
        assert_eq!(err.code(), "permission_error");
        assert!(h.store.expenses.is_empty());

        let mut draft = h.receipt_expense(120);
        draft.receipt_path = None;
        draft.signature = None;
        let mut fields = h.voucher_fields(120);
        fields.submitter_signature = theirs.path;
        let err = h
            .engine
            .vouchers
            .create_with_expense(&h.member, draft, fields)
            .unwrap_err();
        assert_eq!(err.code(), "permission_error");
        assert_eq!(h.store.blobs.upload_count(), 1);
    }

    #[test]
    fn failed_expense_delete_keeps_the_voucher() {
        let h = Harness::new();
        let mut draft = h.receipt_expense(120);
        draft.receipt_path = None;
        draft.submit = false;
        let created = h
            .engine
            .vouchers
            .create_with_expense(&h.member, draft, h.voucher_fields(120))
            .unwrap();
        h.store
            .expenses
            .fail_next(StoreOp::Delete, StoreError::backend("connection lost"));

        let err = h
            .engine
            .lifecycle
            .delete_expense(&h.member, created.expense.id)
            .unwrap_err();
        assert_eq!(err.code(), "persistence_error");
        assert!(h.reload(created.expense.id).is_voucher_mode());
        assert_eq!(h.store.vouchers.len(), 1);

        h.store
            .vouchers
            .fail_next(StoreOp::Delete, StoreError::backend("connection lost"));
        h.engine.lifecycle.delete_expense(&h.member, created.expense.id).unwrap();
        assert!(h.store.expenses.is_empty());
    }

    #[test]
    fn voucher_amount_tracks_the_expense() {
        let h = Harness::new();
        let mut draft = h.receipt_expense(120);
        draft.receipt_path = None;
        draft.submit = false;
        let err = h
            .engine
            .vouchers
            .create_with_expense(&h.member, draft.clone(), h.voucher_fields(95))
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert!(h.store.expenses.is_empty());

        let created = h
            .engine
            .vouchers
            .create_with_expense(&h.member, draft, h.voucher_fields(120))
            .unwrap();
        let patch = ExpensePatch {
            amount: Some(major(150)),
            ..ExpensePatch::default()
        };
        let updated = h
            .engine
            .lifecycle
            .update_draft(&h.member, created.expense.id, patch)
            .unwrap();
        assert_eq!(updated.amount, major(150));
        let voucher = h
            .engine
            .vouchers
            .voucher_for(h.org, created.expense.id)
            .unwrap()
            .unwrap();
        assert_eq!(voucher.amount, major(150));
    }

    #[test]
    fn only_the_event_creator_adds_members() {
        let h = Harness::new();
        let event = h
            .engine
            .events
            .create_event(
                &h.member,
                NewEvent {
                    org_id: h.org,
                    title: "Team dinner".to_string(),
                    description: None,
                    start_date: NaiveDate::from_ymd_opt(2026, 7, 2).unwrap(),
                    end_date: NaiveDate::from_ymd_opt(2026, 7, 2).unwrap(),
                },
            )
            .unwrap();
        let colleague = h.actor_with_role(reimburse_auth::Role::MEMBER);
        let theirs = h.draft(&colleague, 30);

        let err = h
            .engine
            .events
            .add_member(&colleague, event.id, theirs.id)
            .unwrap_err();
        assert_eq!(err.code(), "permission_error");

        let mut input = h.receipt_expense(30);
        input.submit = false;
        input.event_id = Some(event.id);
        let err = h.engine.lifecycle.create_expense(&colleague, input).unwrap_err();
        assert_eq!(err.code(), "permission_error");
        assert!(h.reload(theirs.id).event_id.is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Property: every approval state carries an approved amount.
        #[test]
        fn approval_states_always_carry_an_amount(
            amount in 1i64..10_000i64,
            custom in 0i64..10_000i64,
            variant in 0u8..3,
            finance in any::<bool>(),
        ) {
            let h = Harness::new();
            h.seed_policy("Travel", Some(5_000));
            let expense = h.submitted(&h.member, amount);
            let decision = match variant {
                0 => ApprovalDecision::Full,
                1 => ApprovalDecision::AsPerPolicy,
                _ => ApprovalDecision::Custom(major(custom)),
            };
            let _ = h.engine.lifecycle.approve(&h.approver, expense.id, decision);
            if finance {
                let _ = h.engine.lifecycle.finance_approve(&h.finance, expense.id);
            }

            let current = h.reload(expense.id);
            prop_assert_eq!(current.status.is_approval_state(), current.approved_amount.is_some());
            if current.status == ExpenseStatus::ApprovedAsPerPolicy {
                prop_assert_eq!(current.approved_amount, Some(major(5_000)));
            }
        }
    }
}
