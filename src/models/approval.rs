use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::expense::ExpenseStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalAction {
    Submitted,
    Approved,
    Rejected,
    FinanceApproved,
    Paid,
}

impl ApprovalAction {
    /// The claim status an action leaves behind.
    pub fn resulting_status(&self) -> ExpenseStatus {
        match self {
            ApprovalAction::Submitted => ExpenseStatus::Submitted,
            ApprovalAction::Approved => ExpenseStatus::Approved,
            ApprovalAction::Rejected => ExpenseStatus::Rejected,
            ApprovalAction::FinanceApproved => ExpenseStatus::FinanceApproved,
            ApprovalAction::Paid => ExpenseStatus::Paid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.resulting_status().as_str()
    }
}

impl std::fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a claim's audit trail. Never updated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ApprovalEvent {
    pub id: i64,
    pub expense_id: Uuid,
    pub actor: Uuid,
    pub action: ApprovalAction,
    pub remarks: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewApprovalEvent {
    pub expense_id: Uuid,
    pub actor: Uuid,
    pub action: ApprovalAction,
    pub remarks: String,
    pub timestamp: DateTime<Utc>,
}

impl NewApprovalEvent {
    pub fn into_event(self, id: i64) -> ApprovalEvent {
        ApprovalEvent {
            id,
            expense_id: self.expense_id,
            actor: self.actor,
            action: self.action,
            remarks: self.remarks,
            timestamp: self.timestamp,
        }
    }
}

/// Rebuilds a claim's status from its history, starting at DRAFT.
///
/// Events are ordered by timestamp, insertion id breaking ties. Any step that
/// is not an edge of the lifecycle is reported as a corrupt history.
pub fn replay_status(events: &[ApprovalEvent]) -> Result<ExpenseStatus, String> {
    let mut ordered: Vec<&ApprovalEvent> = events.iter().collect();
    ordered.sort_by_key(|e| (e.timestamp, e.id));

    let mut status = ExpenseStatus::Draft;
    for event in ordered {
        let next = event.action.resulting_status();
        if !status.can_advance_to(next) {
            return Err(format!(
                "event {} moves claim {} from {} to {}",
                event.id, event.expense_id, status, next
            ));
        }
        status = next;
    }
    Ok(status)
}
