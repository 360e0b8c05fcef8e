//! Expense events: grouping containers with totals derived at read time.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use reimburse_core::{DomainError, DomainResult, Entity, EventId, Money, OrgId, UserId};

use crate::expense::Expense;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Reimbursed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Submitted => "submitted",
            EventStatus::Approved => "approved",
            EventStatus::Rejected => "rejected",
            EventStatus::Reimbursed => "reimbursed",
        }
    }

    pub fn next(self, action: EventAction) -> DomainResult<EventStatus> {
        match (self, action) {
            (EventStatus::Draft, EventAction::Submit) => Ok(EventStatus::Submitted),
            (EventStatus::Submitted, EventAction::Approve) => Ok(EventStatus::Approved),
            (EventStatus::Submitted, EventAction::Reject) => Ok(EventStatus::Rejected),
            (EventStatus::Approved, EventAction::MarkReimbursed) => Ok(EventStatus::Reimbursed),
            (from, action) => Err(DomainError::invariant(format!(
                "cannot {} an event in status '{}'",
                action.as_str(),
                from.as_str()
            ))),
        }
    }
}

impl core::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Submit,
    Approve,
    Reject,
    MarkReimbursed,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Submit => "submit",
            EventAction::Approve => "approve",
            EventAction::Reject => "reject",
            EventAction::MarkReimbursed => "mark_reimbursed",
        }
    }
}

/// Grouping container bundling several expenses.
///
/// Totals are deliberately absent: see [`compute_totals`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseEvent {
    pub id: EventId,
    pub org_id: OrgId,
    pub creator_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for ExpenseEvent {
    type Id = EventId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn org_id(&self) -> OrgId {
        self.org_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub org_id: OrgId,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl ExpenseEvent {
    pub fn create(
        id: EventId,
        creator_id: UserId,
        input: NewEvent,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(DomainError::validation("event title is required"));
        }
        if input.start_date > input.end_date {
            return Err(DomainError::validation("event start date is after its end date"));
        }
        Ok(Self {
            id,
            org_id: input.org_id,
            creator_id,
            title,
            description: input.description,
            start_date: input.start_date,
            end_date: input.end_date,
            status: EventStatus::Draft,
            created_at: now,
            updated_at: now,
        })
    }

    /// Membership edits are only allowed while the event is a draft.
    pub fn ensure_editable(&self) -> DomainResult<()> {
        if self.status != EventStatus::Draft {
            return Err(DomainError::invariant(format!(
                "event membership is locked once the event is {}",
                self.status
            )));
        }
        Ok(())
    }

    pub fn apply_update(&mut self, update: &EventUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(at) = update.updated_at {
            self.updated_at = at;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventUpdate {
    pub status: Option<EventStatus>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Totals derived from the current members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTotals {
    pub submitted_total: Money,
    pub approved_total: Money,
}

/// Sum member amounts; approved total counts only members in an approval status.
pub fn compute_totals<'a, I>(members: I) -> EventTotals
where
    I: IntoIterator<Item = &'a Expense>,
{
    let mut submitted = Vec::new();
    let mut approved = Vec::new();
    for member in members {
        submitted.push(member.amount);
        if member.status.counts_toward_approved_total() {
            approved.extend(member.approved_amount);
        }
    }
    EventTotals {
        submitted_total: Money::sum(submitted),
        approved_total: Money::sum(approved),
    }
}

/// Read-side visibility: own events in any status, others' only once submitted.
/// Admin/owner see everything.
pub fn is_visible_to(event: &ExpenseEvent, viewer: UserId, privileged: bool) -> bool {
    privileged || event.creator_id == viewer || event.status == EventStatus::Submitted
}
