//! Expense status lifecycle and the transition table.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use reimburse_core::{DomainError, Money};

/// Expense status lifecycle (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Draft,
    Submitted,
    Approved,
    ApprovedAsPerPolicy,
    Rejected,
    FinanceApproved,
    FinanceRejected,
    Reimbursed,
}

impl ExpenseStatus {
    pub const ALL: [ExpenseStatus; 8] = [
        ExpenseStatus::Draft,
        ExpenseStatus::Submitted,
        ExpenseStatus::Approved,
        ExpenseStatus::ApprovedAsPerPolicy,
        ExpenseStatus::Rejected,
        ExpenseStatus::FinanceApproved,
        ExpenseStatus::FinanceRejected,
        ExpenseStatus::Reimbursed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseStatus::Draft => "draft",
            ExpenseStatus::Submitted => "submitted",
            ExpenseStatus::Approved => "approved",
            ExpenseStatus::ApprovedAsPerPolicy => "approved_as_per_policy",
            ExpenseStatus::Rejected => "rejected",
            ExpenseStatus::FinanceApproved => "finance_approved",
            ExpenseStatus::FinanceRejected => "finance_rejected",
            ExpenseStatus::Reimbursed => "reimbursed",
        }
    }

    /// States in which `approved_amount` must be set.
    pub fn is_approval_state(&self) -> bool {
        matches!(
            self,
            ExpenseStatus::Approved
                | ExpenseStatus::ApprovedAsPerPolicy
                | ExpenseStatus::FinanceApproved
                | ExpenseStatus::Reimbursed
        )
    }

    /// States whose approved amount is summed into an event's approved total.
    pub fn counts_toward_approved_total(&self) -> bool {
        matches!(
            self,
            ExpenseStatus::Approved
                | ExpenseStatus::ApprovedAsPerPolicy
                | ExpenseStatus::FinanceApproved
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExpenseStatus::Rejected | ExpenseStatus::FinanceRejected | ExpenseStatus::Reimbursed
        )
    }

    /// Whether the creator may still delete the claim.
    pub fn is_deletable(&self) -> bool {
        matches!(
            self,
            ExpenseStatus::Draft | ExpenseStatus::Rejected | ExpenseStatus::FinanceRejected
        )
    }

    /// The transition table. Any pair not listed is rejected.
    pub fn next(self, action: ExpenseAction) -> Result<ExpenseStatus, DomainError> {
        use ExpenseAction as A;
        use ExpenseStatus as S;

        match (self, action) {
            (S::Draft, A::Submit) => Ok(S::Submitted),
            (S::Submitted, A::ApproveFull) | (S::Submitted, A::ApproveCustom) => Ok(S::Approved),
            (S::Submitted, A::ApproveAsPerPolicy) => Ok(S::ApprovedAsPerPolicy),
            (S::Submitted, A::Reject) => Ok(S::Rejected),
            (S::Approved | S::ApprovedAsPerPolicy, A::FinanceApprove) => Ok(S::FinanceApproved),
            (S::Approved | S::ApprovedAsPerPolicy, A::FinanceReject) => Ok(S::FinanceRejected),
            (S::FinanceApproved, A::MarkReimbursed) => Ok(S::Reimbursed),
            (from, action) => Err(DomainError::invariant(format!(
                "cannot {action} an expense in status '{from}'"
            ))),
        }
    }
}

impl core::fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lenient parser for stored status text.
///
/// Accepts any casing and space/hyphen separators. `new` is the pre-persistence
/// alias of `draft`; `approve_full_amount` and `custom_amount` are older
/// spellings of `approved`.
impl FromStr for ExpenseStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "draft" | "new" => Ok(ExpenseStatus::Draft),
            "submitted" => Ok(ExpenseStatus::Submitted),
            "approved" | "approve_full_amount" | "custom_amount" => Ok(ExpenseStatus::Approved),
            "approved_as_per_policy" => Ok(ExpenseStatus::ApprovedAsPerPolicy),
            "rejected" => Ok(ExpenseStatus::Rejected),
            "finance_approved" => Ok(ExpenseStatus::FinanceApproved),
            "finance_rejected" => Ok(ExpenseStatus::FinanceRejected),
            "reimbursed" => Ok(ExpenseStatus::Reimbursed),
            _ => Err(DomainError::validation(format!("unknown expense status '{s}'"))),
        }
    }
}

/// Lifecycle actions that move an expense between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseAction {
    Submit,
    ApproveFull,
    ApproveAsPerPolicy,
    ApproveCustom,
    Reject,
    FinanceApprove,
    FinanceReject,
    MarkReimbursed,
}

impl ExpenseAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseAction::Submit => "submit",
            ExpenseAction::ApproveFull => "approve_full",
            ExpenseAction::ApproveAsPerPolicy => "approve_as_per_policy",
            ExpenseAction::ApproveCustom => "approve_custom",
            ExpenseAction::Reject => "reject",
            ExpenseAction::FinanceApprove => "finance_approve",
            ExpenseAction::FinanceReject => "finance_reject",
            ExpenseAction::MarkReimbursed => "mark_reimbursed",
        }
    }
}

impl core::fmt::Display for ExpenseAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpenseAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "submit" => Ok(ExpenseAction::Submit),
            // A bare "approve" means full approval.
            "approve" | "approve_full" | "approve_full_amount" => Ok(ExpenseAction::ApproveFull),
            "approve_as_per_policy" => Ok(ExpenseAction::ApproveAsPerPolicy),
            "approve_custom" | "custom_amount" => Ok(ExpenseAction::ApproveCustom),
            "reject" => Ok(ExpenseAction::Reject),
            "finance_approve" => Ok(ExpenseAction::FinanceApprove),
            "finance_reject" => Ok(ExpenseAction::FinanceReject),
            "mark_reimbursed" | "reimburse" => Ok(ExpenseAction::MarkReimbursed),
            _ => Err(DomainError::validation(format!("unknown expense action '{s}'"))),
        }
    }
}

/// First-stage approval variant chosen by the approver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Approve the submitted amount.
    #[default]
    Full,
    /// Approve the policy's upper limit (only offered when over limit).
    AsPerPolicy,
    /// Approve an operator-supplied amount.
    Custom(Money),
}

impl ApprovalDecision {
    pub fn action(&self) -> ExpenseAction {
        match self {
            ApprovalDecision::Full => ExpenseAction::ApproveFull,
            ApprovalDecision::AsPerPolicy => ExpenseAction::ApproveAsPerPolicy,
            ApprovalDecision::Custom(_) => ExpenseAction::ApproveCustom,
        }
    }
}

/// Payment progress after finance approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PaymentStatus::Pending => f.write_str("pending"),
            PaymentStatus::Paid => f.write_str("paid"),
        }
    }
}
