//! Role-scoped visibility. Pure readers: nothing here touches claim state.

use uuid::Uuid;

use crate::models::{Expense, ExpenseStatus, Principal, Role};

const MANAGER_RECEIPT_STATUSES: &[ExpenseStatus] = &[
    ExpenseStatus::Submitted,
    ExpenseStatus::Approved,
    ExpenseStatus::Rejected,
    ExpenseStatus::FinanceApproved,
    ExpenseStatus::Paid,
];

const FINANCE_RECEIPT_STATUSES: &[ExpenseStatus] = &[
    ExpenseStatus::Approved,
    ExpenseStatus::FinanceApproved,
    ExpenseStatus::Paid,
];

/// The claims a principal's list view contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimScope {
    /// Claims the principal submitted.
    SubmittedBy(Uuid),
    /// Submitted claims currently routed to the principal.
    AwaitingApprover(Uuid),
    /// Manager-approved claims waiting on finance.
    AwaitingFinance,
}

impl ClaimScope {
    pub fn for_principal(principal: &Principal) -> Self {
        match principal.role {
            Role::Employee => ClaimScope::SubmittedBy(principal.id),
            Role::Manager => ClaimScope::AwaitingApprover(principal.id),
            Role::Finance => ClaimScope::AwaitingFinance,
        }
    }

    pub fn admits(&self, expense: &Expense) -> bool {
        match self {
            ClaimScope::SubmittedBy(id) => expense.submitted_by == *id,
            ClaimScope::AwaitingApprover(id) => {
                expense.status == ExpenseStatus::Submitted && expense.current_approver == Some(*id)
            }
            ClaimScope::AwaitingFinance => expense.status == ExpenseStatus::Approved,
        }
    }
}

/// The claims whose receipt a principal may read: their own, plus any claim
/// in one of `statuses`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptScope {
    pub owner: Uuid,
    pub statuses: &'static [ExpenseStatus],
}

impl ReceiptScope {
    pub fn for_principal(principal: &Principal) -> Self {
        let statuses: &'static [ExpenseStatus] = match principal.role {
            Role::Employee => &[],
            Role::Manager => MANAGER_RECEIPT_STATUSES,
            Role::Finance => FINANCE_RECEIPT_STATUSES,
        };
        Self {
            owner: principal.id,
            statuses,
        }
    }

    pub fn admits(&self, expense: &Expense) -> bool {
        expense.submitted_by == self.owner || self.statuses.contains(&expense.status)
    }
}

pub fn can_view_receipt(principal: &Principal, expense: &Expense) -> bool {
    ReceiptScope::for_principal(principal).admits(expense)
}

/// Detail visibility. Wider than the list view, narrower than "exists".
pub fn can_view_claim(principal: &Principal, expense: &Expense) -> bool {
    expense.submitted_by == principal.id
        || principal.is(expense.current_approver)
        || principal.is(expense.approved_by)
        || can_view_receipt(principal, expense)
}
