use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reimburse_core::{DomainError, DomainResult, Entity, ExpenseId, Money, OrgId, UserId, VoucherId};

/// Substitute attestation for an expense that has no receipt (1:1 with the expense).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    pub id: VoucherId,
    pub org_id: OrgId,
    pub expense_id: ExpenseId,
    pub submitter_name: String,
    pub amount: Money,
    pub purpose: String,
    /// Person the payment is credited to.
    pub credit_person: String,
    /// Storage path of the submitter's signature.
    pub submitter_signature: String,
    pub approver_id: Option<UserId>,
    /// Storage path of the approver's signature; may be added after creation.
    pub approver_signature: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Entity for Voucher {
    type Id = VoucherId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn org_id(&self) -> OrgId {
        self.org_id
    }
}

/// Caller-supplied voucher fields.
///
/// `submitter_signature` is a signature candidate (stored path or inline image)
/// and is resolved before the voucher row is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherFields {
    pub submitter_name: String,
    pub amount: Money,
    pub purpose: String,
    pub credit_person: String,
    pub submitter_signature: String,
    #[serde(default)]
    pub approver_signature: Option<String>,
}

impl VoucherFields {
    pub fn validate(&self) -> DomainResult<()> {
        let required = [
            ("submitter name", &self.submitter_name),
            ("purpose", &self.purpose),
            ("credit person", &self.credit_person),
            ("submitter signature", &self.submitter_signature),
        ];
        for (label, value) in required {
            if value.trim().is_empty() {
                return Err(DomainError::validation(format!("voucher {label} is required")));
            }
        }
        if self.amount == Money::ZERO {
            return Err(DomainError::validation("voucher amount must be greater than zero"));
        }
        Ok(())
    }

    /// The voucher attests exactly the amount claimed on its expense.
    pub fn ensure_amount_matches(&self, expense_amount: Money) -> DomainResult<()> {
        if self.amount != expense_amount {
            return Err(DomainError::validation(format!(
                "voucher amount {} does not match expense amount {}",
                self.amount, expense_amount
            )));
        }
        Ok(())
    }

    /// Build the voucher row once signatures are resolved to storage paths.
    pub fn into_voucher(
        self,
        id: VoucherId,
        org_id: OrgId,
        expense_id: ExpenseId,
        submitter_signature: String,
        approver_signature: Option<String>,
        now: DateTime<Utc>,
    ) -> Voucher {
        Voucher {
            id,
            org_id,
            expense_id,
            submitter_name: self.submitter_name.trim().to_string(),
            amount: self.amount,
            purpose: self.purpose.trim().to_string(),
            credit_person: self.credit_person.trim().to_string(),
            submitter_signature,
            approver_id: None,
            approver_signature,
            created_at: now,
        }
    }
}

/// Partial fields for a voucher update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherUpdate {
    pub amount: Option<Money>,
    pub approver_id: Option<UserId>,
    pub approver_signature: Option<String>,
}

impl Voucher {
    pub fn apply_update(&mut self, update: &VoucherUpdate) {
        if let Some(v) = update.amount {
            self.amount = v;
        }
        if let Some(v) = update.approver_id {
            self.approver_id = Some(v);
        }
        if let Some(v) = &update.approver_signature {
            self.approver_signature = Some(v.clone());
        }
    }
}
