//! Spend policies and limit evaluation (pure).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reimburse_core::{Entity, Money, OrgId, PolicyId};

/// Org-level spend guideline for one expense type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub org_id: OrgId,
    pub expense_type: String,
    /// Free-text guidance, e.g. "12 per km".
    pub per_unit_cost: Option<String>,
    pub upper_limit: Option<Money>,
    pub created_at: DateTime<Utc>,
}

impl Entity for Policy {
    type Id = PolicyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn org_id(&self) -> OrgId {
        self.org_id
    }
}

impl Policy {
    /// Type match is case-insensitive and ignores surrounding whitespace.
    pub fn applies_to(&self, expense_type: &str) -> bool {
        self.expense_type
            .trim()
            .eq_ignore_ascii_case(expense_type.trim())
    }
}

/// Pick the one policy consulted for a type: earliest created wins.
pub fn select_policy<'a, I>(policies: I, expense_type: &str) -> Option<&'a Policy>
where
    I: IntoIterator<Item = &'a Policy>,
{
    policies
        .into_iter()
        .filter(|p| p.applies_to(expense_type))
        .min_by_key(|p| (p.created_at, p.id))
}

/// Result of checking an amount against the applicable policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    pub policy: Option<Policy>,
    pub over_limit: bool,
}

impl PolicyEvaluation {
    pub fn no_policy() -> Self {
        Self {
            policy: None,
            over_limit: false,
        }
    }

    pub fn upper_limit(&self) -> Option<Money> {
        self.policy.as_ref().and_then(|p| p.upper_limit)
    }

    /// Approval variants offered to the approver.
    pub fn approval_options(&self) -> Vec<ApprovalOption> {
        let mut options = vec![ApprovalOption::Full];
        if self.over_limit {
            options.push(ApprovalOption::AsPerPolicy);
        }
        options.push(ApprovalOption::Custom);
        options
    }
}

/// `over_limit` holds only when a limit exists and the amount exceeds it.
pub fn evaluate(policy: Option<Policy>, amount: Money) -> PolicyEvaluation {
    let over_limit = policy
        .as_ref()
        .and_then(|p| p.upper_limit)
        .is_some_and(|limit| amount > limit);
    PolicyEvaluation { policy, over_limit }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOption {
    Full,
    AsPerPolicy,
    Custom,
}
