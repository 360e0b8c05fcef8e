//! Event Aggregation: expense events, their members and derived totals.
//!
//! Cascades (submit, delete) are ordered sequences of independent per-member
//! calls. A failing member never aborts the cascade; it is reported.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use reimburse_auth::{Actor, Permission, authorize};
use reimburse_core::{EventId, ExpenseId};
use reimburse_expenses::{
    ActionType, EventAction, EventTotals, EventUpdate, Expense, ExpenseEvent, ExpenseStatus,
    ExpenseUpdate, NewEvent, compute_totals, is_visible_to,
};

use super::audit::{AuditRecord, AuditRecorder};
use super::ensure_actor_org;
use super::lifecycle::LifecycleController;
use crate::error::EngineError;
use crate::store::Repository;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeFailure {
    pub expense_id: ExpenseId,
    pub code: &'static str,
    pub message: String,
}

/// Per-member outcome of a cascade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub succeeded: Vec<ExpenseId>,
    pub failed: Vec<CascadeFailure>,
}

impl CascadeReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn fail(&mut self, expense_id: ExpenseId, err: &EngineError) {
        self.failed.push(CascadeFailure {
            expense_id,
            code: err.code(),
            message: err.to_string(),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSubmission {
    pub event: ExpenseEvent,
    pub report: CascadeReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventDeletion {
    pub report: CascadeReport,
    /// False when an unlink failed and the event row was kept.
    pub deleted: bool,
}

/// An event with its members and totals derived at read time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSummary {
    pub event: ExpenseEvent,
    pub members: Vec<Expense>,
    pub totals: EventTotals,
}

/// Admin review of a submitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDecision {
    Approve,
    Reject,
    MarkReimbursed,
}

impl EventDecision {
    fn action(self) -> EventAction {
        match self {
            EventDecision::Approve => EventAction::Approve,
            EventDecision::Reject => EventAction::Reject,
            EventDecision::MarkReimbursed => EventAction::MarkReimbursed,
        }
    }
}

#[derive(Clone)]
pub struct EventAggregation {
    events: Arc<dyn Repository<ExpenseEvent>>,
    expenses: Arc<dyn Repository<Expense>>,
    lifecycle: LifecycleController,
    audit: AuditRecorder,
}

impl EventAggregation {
    pub fn new(
        events: Arc<dyn Repository<ExpenseEvent>>,
        expenses: Arc<dyn Repository<Expense>>,
        lifecycle: LifecycleController,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            events,
            expenses,
            lifecycle,
            audit,
        }
    }

    pub fn create_event(&self, actor: &Actor, input: NewEvent) -> Result<ExpenseEvent, EngineError> {
        authorize(actor, &Permission::SUBMIT)?;
        ensure_actor_org(actor, input.org_id)?;
        let event = ExpenseEvent::create(EventId::new(), actor.user_id, input, Utc::now())?;
        let event = self.events.insert(event)?;
        info!(event_id = %event.id, "event created");
        Ok(event)
    }

    /// Attach an expense to a draft event.
    pub fn add_member(
        &self,
        actor: &Actor,
        event_id: EventId,
        expense_id: ExpenseId,
    ) -> Result<Expense, EngineError> {
        let event = self.load(actor, event_id)?;
        self.ensure_owner(actor, &event)?;
        event.ensure_editable()?;
        let expense = self.lifecycle.get(actor, expense_id)?;
        if expense.creator_id != actor.user_id && !actor.is_privileged() {
            return Err(EngineError::permission("only the creator may group an expense"));
        }
        match expense.event_id {
            Some(current) if current == event.id => return Ok(expense),
            Some(_) => {
                return Err(EngineError::validation("expense already belongs to another event"));
            }
            None => {}
        }

        let updated = self.expenses.update(
            &expense.id,
            ExpenseUpdate {
                event_id: Some(Some(event.id)),
                updated_at: Some(Utc::now()),
                ..ExpenseUpdate::default()
            },
        )?;
        self.audit.record(
            self.entry(actor, &expense, ActionType::EventLinked)
                .values(None, Some(event.id.to_string())),
        );
        Ok(updated)
    }

    /// Detach an expense from its (draft) event. The expense itself persists.
    pub fn remove_member(&self, actor: &Actor, expense_id: ExpenseId) -> Result<Expense, EngineError> {
        let expense = self.lifecycle.get(actor, expense_id)?;
        let Some(event_id) = expense.event_id else {
            return Ok(expense);
        };
        let event = self.load(actor, event_id)?;
        event.ensure_editable()?;
        if expense.creator_id != actor.user_id && !actor.is_privileged() {
            return Err(EngineError::permission("only the creator may ungroup an expense"));
        }
        self.unlink(actor, &expense)
    }

    /// Set the event to submitted, then submit each draft member independently.
    pub fn submit_event(&self, actor: &Actor, event_id: EventId) -> Result<EventSubmission, EngineError> {
        let event = self.load(actor, event_id)?;
        self.ensure_owner(actor, &event)?;
        let next = event.status.next(EventAction::Submit)?;

        let event = self.events.update(
            &event.id,
            EventUpdate {
                status: Some(next),
                updated_at: Some(Utc::now()),
            },
        )?;

        let mut report = CascadeReport::default();
        for member in self.members(&event)? {
            if member.status != ExpenseStatus::Draft {
                continue;
            }
            match self.lifecycle.submit(actor, member.id) {
                Ok(_) => report.succeeded.push(member.id),
                Err(err) => {
                    warn!(event_id = %event.id, expense_id = %member.id, error = %err, "member submit failed");
                    report.fail(member.id, &err);
                }
            }
        }

        info!(
            event_id = %event.id,
            submitted = report.succeeded.len(),
            failed = report.failed.len(),
            "event submitted"
        );
        Ok(EventSubmission { event, report })
    }

    /// Unlink every member, then delete the event row if nothing failed.
    pub fn delete_event(&self, actor: &Actor, event_id: EventId) -> Result<EventDeletion, EngineError> {
        let event = self.load(actor, event_id)?;
        self.ensure_owner(actor, &event)?;

        let mut report = CascadeReport::default();
        for member in self.members(&event)? {
            match self.unlink(actor, &member) {
                Ok(_) => report.succeeded.push(member.id),
                Err(err) => {
                    warn!(event_id = %event.id, expense_id = %member.id, error = %err, "member unlink failed");
                    report.fail(member.id, &err);
                }
            }
        }

        if !report.is_complete() {
            warn!(event_id = %event.id, failed = report.failed.len(), "event kept; some members are still linked");
            return Ok(EventDeletion {
                report,
                deleted: false,
            });
        }

        self.events.delete(&event.id)?;
        info!(event_id = %event.id, unlinked = report.succeeded.len(), "event deleted");
        Ok(EventDeletion {
            report,
            deleted: true,
        })
    }

    /// Event, members and totals; totals are computed on every call.
    pub fn event_summary(&self, actor: &Actor, event_id: EventId) -> Result<EventSummary, EngineError> {
        let event = self.load(actor, event_id)?;
        if !is_visible_to(&event, actor.user_id, actor.is_privileged()) {
            return Err(EngineError::not_found("event", event_id));
        }
        let members = self.members(&event)?;
        let totals = compute_totals(&members);
        Ok(EventSummary {
            event,
            members,
            totals,
        })
    }

    /// Admin/owner decision on a submitted or approved event.
    pub fn review_event(
        &self,
        actor: &Actor,
        event_id: EventId,
        decision: EventDecision,
    ) -> Result<ExpenseEvent, EngineError> {
        authorize(actor, &Permission::REVIEW_EVENTS)?;
        let event = self.load(actor, event_id)?;
        let next = event.status.next(decision.action())?;
        let updated = self.events.update(
            &event.id,
            EventUpdate {
                status: Some(next),
                updated_at: Some(Utc::now()),
            },
        )?;
        info!(event_id = %event.id, from = %event.status, to = %next, "event reviewed");
        Ok(updated)
    }

    pub fn list_visible_events(&self, actor: &Actor) -> Result<Vec<ExpenseEvent>, EngineError> {
        let viewer = actor.user_id;
        let privileged = actor.is_privileged();
        let mut events = self
            .events
            .list_by_filter(actor.org_id(), &|e: &ExpenseEvent| is_visible_to(e, viewer, privileged))?;
        events.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(a.id.cmp(&b.id)));
        Ok(events)
    }

    fn load(&self, actor: &Actor, event_id: EventId) -> Result<ExpenseEvent, EngineError> {
        self.events
            .get_by_id(&event_id)?
            .filter(|e| e.org_id == actor.org_id())
            .ok_or_else(|| EngineError::not_found("event", event_id))
    }

    fn members(&self, event: &ExpenseEvent) -> Result<Vec<Expense>, EngineError> {
        let event_id = event.id;
        Ok(self
            .expenses
            .list_by_filter(event.org_id, &|e: &Expense| e.event_id == Some(event_id))?)
    }

    fn ensure_owner(&self, actor: &Actor, event: &ExpenseEvent) -> Result<(), EngineError> {
        if event.creator_id != actor.user_id && !actor.is_privileged() {
            return Err(EngineError::permission("only the event creator may do this"));
        }
        Ok(())
    }

    /// Clear `event_id` only; never touches anything else on the expense.
    fn unlink(&self, actor: &Actor, expense: &Expense) -> Result<Expense, EngineError> {
        let updated = self.expenses.update(
            &expense.id,
            ExpenseUpdate {
                event_id: Some(None),
                updated_at: Some(Utc::now()),
                ..ExpenseUpdate::default()
            },
        )?;
        self.audit.record(
            self.entry(actor, expense, ActionType::EventUnlinked)
                .values(expense.event_id.map(|id| id.to_string()), None),
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
