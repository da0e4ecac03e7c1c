//! The claim state machine.
//!
//! `plan` is pure: it checks the caller against the current claim and returns
//! the next claim plus the audit event that records the move. Persisting both
//! is the engine's job.

use chrono::{DateTime, Utc};

use crate::error::WorkflowError;
use crate::models::{ApprovalAction, Expense, ExpenseStatus, NewApprovalEvent, Principal, Role};

#[derive(Debug, Clone)]
pub enum Command {
    /// `manager` is the submitter's `reports_to`, already resolved.
    Submit { manager: Option<Principal> },
    ManagerApprove { comment: String },
    ManagerReject { comment: String },
    FinanceApprove { comment: String },
    MarkPaid {
        payment_reference: String,
        comment: Option<String>,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Submit { .. } => "submit",
            Command::ManagerApprove { .. } => "manager_approve",
            Command::ManagerReject { .. } => "manager_reject",
            Command::FinanceApprove { .. } => "finance_approve",
            Command::MarkPaid { .. } => "mark_paid",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub expense: Expense,
    pub event: NewApprovalEvent,
}

fn require_status(
    current: &Expense,
    expected: ExpenseStatus,
    operation: &'static str,
) -> Result<(), WorkflowError> {
    if current.status == expected {
        Ok(())
    } else {
        Err(WorkflowError::InvalidTransition {
            status: current.status,
            operation,
        })
    }
}

fn forbid_self_approval(current: &Expense, actor: &Principal) -> Result<(), WorkflowError> {
    if current.submitted_by == actor.id {
        return Err(WorkflowError::Forbidden("claims cannot be approved by their submitter"));
    }
    Ok(())
}

fn require_finance(actor: &Principal) -> Result<(), WorkflowError> {
    if actor.role != Role::Finance {
        return Err(WorkflowError::Forbidden("finance role required"));
    }
    Ok(())
}

/// Manager decision shared by approve and reject.
fn decide(
    current: &Expense,
    actor: &Principal,
    next: &mut Expense,
    operation: &'static str,
    outcome: ExpenseStatus,
) -> Result<(), WorkflowError> {
    // Status first: a claim decided by a concurrent request has no approver
    // left, and the caller must see the transition error.
    require_status(current, ExpenseStatus::Submitted, operation)?;
    if !actor.is(current.current_approver) {
        return Err(WorkflowError::Forbidden("claim is routed to a different approver"));
    }
    forbid_self_approval(current, actor)?;
    next.status = outcome;
    next.approved_by = Some(actor.id);
    next.current_approver = None;
    Ok(())
}

pub fn plan(
    current: &Expense,
    actor: &Principal,
    command: Command,
    now: DateTime<Utc>,
) -> Result<Transition, WorkflowError> {
    let operation = command.name();
    let mut next = current.clone();

    let (action, remarks) = match command {
        Command::Submit { manager } => {
            if current.submitted_by != actor.id {
                return Err(WorkflowError::Forbidden("only the owner can submit a claim"));
            }
            require_status(current, ExpenseStatus::Draft, operation)?;
            let manager = manager.ok_or(WorkflowError::RoutingUnresolved(
                "no manager is on record for the submitter",
            ))?;
            if manager.id == actor.id {
                return Err(WorkflowError::RoutingUnresolved(
                    "the submitter is registered as their own manager",
                ));
            }
            next.status = ExpenseStatus::Submitted;
            next.current_approver = Some(manager.id);
            (ApprovalAction::Submitted, String::new())
        }
        Command::ManagerApprove { comment } => {
            decide(current, actor, &mut next, operation, ExpenseStatus::Approved)?;
            next.manager_comment = comment.clone();
            (ApprovalAction::Approved, comment)
        }
        Command::ManagerReject { comment } => {
            decide(current, actor, &mut next, operation, ExpenseStatus::Rejected)?;
            next.manager_comment = comment.clone();
            (ApprovalAction::Rejected, comment)
        }
        Command::FinanceApprove { comment } => {
            require_finance(actor)?;
            require_status(current, ExpenseStatus::Approved, operation)?;
            forbid_self_approval(current, actor)?;
            next.status = ExpenseStatus::FinanceApproved;
            next.finance_comment = comment.clone();
            (ApprovalAction::FinanceApproved, comment)
        }
        Command::MarkPaid {
            payment_reference,
            comment,
        } => {
            require_finance(actor)?;
            let payment_reference = payment_reference.trim().to_string();
            if payment_reference.is_empty() {
                return Err(WorkflowError::Validation(
                    "payment_reference is required".to_string(),
                ));
            }
            require_status(current, ExpenseStatus::FinanceApproved, operation)?;
            forbid_self_approval(current, actor)?;
            next.status = ExpenseStatus::Paid;
            next.paid_by = Some(actor.id);
            next.payment_reference = payment_reference;
            let remarks = comment.unwrap_or_default();
            if !remarks.is_empty() {
                next.finance_comment = remarks.clone();
            }
            (ApprovalAction::Paid, remarks)
        }
    };

    if !current.status.can_advance_to(next.status) || action.resulting_status() != next.status {
        return Err(WorkflowError::Invariant("transition leaves the claim lifecycle"));
    }
    if let Some(violation) = next.invariant_violation() {
        return Err(WorkflowError::Invariant(violation));
    }

    let timestamp = now.max(current.updated_at);
    next.updated_at = timestamp;
    next.version = current.version + 1;

    let event = NewApprovalEvent {
        expense_id: current.id,
        actor: actor.id,
        action,
        remarks,
        timestamp,
    };
    Ok(Transition {
        expense: next,
        event,
    })
}
