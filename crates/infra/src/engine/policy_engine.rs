//! Policy Engine: looks up the spend policy for a type and flags over-limit amounts.

use std::sync::Arc;

use tracing::warn;

use reimburse_core::{Money, OrgId};
use reimburse_expenses::{Policy, PolicyEvaluation, select_policy};

use crate::error::StoreError;
use crate::store::Repository;

#[derive(Clone)]
pub struct PolicyEngine {
    policies: Arc<dyn Repository<Policy>>,
}

impl PolicyEngine {
    pub fn new(policies: Arc<dyn Repository<Policy>>) -> Self {
        Self { policies }
    }

    /// Evaluate `amount` against the policy for `(org_id, expense_type)`.
    ///
    /// Advisory only: a failed lookup is logged and treated as "no policy".
    pub fn evaluate(&self, org_id: OrgId, expense_type: &str, amount: Money) -> PolicyEvaluation {
        match self.lookup(org_id, expense_type) {
            Ok(policy) => reimburse_expenses::evaluate(policy, amount),
            Err(err) => {
                warn!(
                    org_id = %org_id,
                    expense_type,
                    error = %err,
                    "policy lookup failed; proceeding without a policy"
                );
                PolicyEvaluation::no_policy()
            }
        }
    }

    /// The single policy consulted for a type (earliest created wins).
    pub fn lookup(&self, org_id: OrgId, expense_type: &str) -> Result<Option<Policy>, StoreError> {
        let matching = self
            .policies
            .list_by_filter(org_id, &|p: &Policy| p.applies_to(expense_type))?;
        Ok(select_policy(&matching, expense_type).cloned())
    }
}
