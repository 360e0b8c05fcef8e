//! Expense reimbursement domain module.
//!
//! This crate contains business rules for expense claims, vouchers, spend
//! policies, expense events and the audit trail, implemented purely as
//! deterministic domain logic (no IO, no storage, no session handling).

pub mod expense;
pub mod expense_event;
pub mod history;
pub mod policy;
pub mod signature;
pub mod status;
pub mod voucher;

pub use expense::{Attachment, Expense, ExpensePatch, ExpenseUpdate, NewExpense};
pub use expense_event::{
    compute_totals, is_visible_to, EventAction, EventStatus, EventTotals, EventUpdate,
    ExpenseEvent, NewEvent,
};
pub use history::{ActionType, FieldChange, HistoryEntry};
pub use policy::{evaluate, select_policy, ApprovalOption, Policy, PolicyEvaluation};
pub use signature::{
    ImageMime, InlineImage, SavedSignature, SignatureCandidate, SignatureContext,
    SignatureUpdate,
};
pub use status::{ApprovalDecision, ExpenseAction, ExpenseStatus, PaymentStatus};
pub use voucher::{Voucher, VoucherFields, VoucherUpdate};
