//! Shared fixtures for engine tests.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};

use reimburse_auth::{Actor, OrgMembership, Role};
use reimburse_core::{ExpenseId, Money, OrgId, PolicyId, UserId};
use reimburse_expenses::{Expense, NewExpense, Policy, VoucherFields};

use super::{InMemoryCollaborators, ReimbursementEngine};
use crate::config::EngineConfig;
use crate::store::Repository;

// 1x1 transparent PNG.
pub const PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

pub struct Harness {
    pub engine: ReimbursementEngine,
    pub store: InMemoryCollaborators,
    pub org: OrgId,
    pub member: Actor,
    pub approver: Actor,
    pub finance: Actor,
    pub admin: Actor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_store(InMemoryCollaborators::new(&config), config)
    }

    pub fn with_store(store: InMemoryCollaborators, config: EngineConfig) -> Self {
        let engine = ReimbursementEngine::new(store.collaborators(), config);
        let org = OrgId::new();
        let actor = |name: &str, role: Role| {
            Actor::new(UserId::new(), name, OrgMembership::new(org, vec![role]))
        };
        Self {
            engine,
            store,
            org,
            member: actor("Asha Rao", Role::MEMBER),
            approver: actor("Ben Okafor", Role::APPROVER),
            finance: actor("Chen Wei", Role::FINANCE),
            admin: actor("Dana Levi", Role::ADMIN),
        }
    }

    pub fn actor_with_role(&self, role: Role) -> Actor {
        Actor::new(UserId::new(), "Extra User", OrgMembership::new(self.org, vec![role]))
    }

    /// A receipt-mode claim assigned to `self.approver`, created as submitted.
    pub fn receipt_expense(&self, amount: i64) -> NewExpense {
        NewExpense {
            org_id: self.org,
            expense_type: "Travel".to_string(),
            amount: Money::major(amount).unwrap(),
            date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            approver_id: Some(self.approver.user_id),
            event_id: None,
            receipt_path: Some("receipts/taxi.pdf".to_string()),
            signature: Some(PNG.to_string()),
            custom_fields: BTreeMap::new(),
            submit: true,
        }
    }

    pub fn voucher_fields(&self, amount: i64) -> VoucherFields {
        VoucherFields {
            submitter_name: "Asha Rao".to_string(),
            amount: Money::major(amount).unwrap(),
            purpose: "Auto fare, no receipt issued".to_string(),
            credit_person: "Asha Rao".to_string(),
            submitter_signature: PNG.to_string(),
            approver_signature: None,
        }
    }

    pub fn submitted(&self, creator: &Actor, amount: i64) -> Expense {
        self.engine
            .lifecycle
            .create_expense(creator, self.receipt_expense(amount))
            .unwrap()
    }

    pub fn draft(&self, creator: &Actor, amount: i64) -> Expense {
        let mut input = self.receipt_expense(amount);
        input.submit = false;
        self.engine.lifecycle.create_expense(creator, input).unwrap()
    }

    pub fn reload(&self, id: ExpenseId) -> Expense {
        self.store.expenses.get_by_id(&id).unwrap().unwrap()
    }

    pub fn seed_policy(&self, expense_type: &str, upper_limit: Option<i64>) -> Policy {
        self.store
            .policies
            .insert(Policy {
                id: PolicyId::new(),
                org_id: self.org,
                expense_type: expense_type.to_string(),
                per_unit_cost: None,
                upper_limit: upper_limit.map(|l| Money::major(l).unwrap()),
                created_at: Utc::now(),
            })
            .unwrap()
    }
}
