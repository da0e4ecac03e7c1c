use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{StoreError, WorkflowError};
use crate::models::{
    replay_status, ApprovalEvent, Expense, ExpenseInput, ExpenseStatus, Principal, Receipt,
};
use crate::store::{ClaimStore, Directory};

use super::scope::{can_view_claim, ClaimScope};
use super::transition::{self, Command};

/// A claim with its audit trail and current receipt.
#[derive(Debug, Serialize)]
pub struct ClaimDetail {
    #[serde(flatten)]
    pub expense: Expense,
    pub approval_history: Vec<ApprovalEvent>,
    pub receipt: Option<Receipt>,
}

/// The only writer of claim status, routing and audit events.
pub struct WorkflowEngine {
    store: Arc<dyn ClaimStore>,
    directory: Arc<dyn Directory>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn ClaimStore>, directory: Arc<dyn Directory>) -> Self {
        Self { store, directory }
    }

    pub async fn create(
        &self,
        actor: &Principal,
        input: ExpenseInput,
    ) -> Result<Expense, WorkflowError> {
        let input = input.validate().map_err(WorkflowError::Validation)?;
        let expense = Expense::new_draft(actor.id, input, Utc::now());
        self.store.insert_expense(&expense).await?;
        log::info!("Claim {} created by {}", expense.id, actor.id);
        Ok(expense)
    }

    /// Edit a draft in place. Not a transition, so nothing is audited.
    pub async fn update_draft(
        &self,
        actor: &Principal,
        id: Uuid,
        input: ExpenseInput,
    ) -> Result<Expense, WorkflowError> {
        let input = input.validate().map_err(WorkflowError::Validation)?;
        let current = self.load_visible(actor, id).await?;
        if current.submitted_by != actor.id {
            return Err(WorkflowError::Forbidden("only the owner can edit a claim"));
        }
        if current.status != ExpenseStatus::Draft {
            return Err(WorkflowError::InvalidTransition {
                status: current.status,
                operation: "edit",
            });
        }

        let mut next = current.clone();
        next.title = input.title;
        next.amount = input.amount;
        next.category = input.category;
        next.description = input.description;
        next.updated_at = Utc::now().max(current.updated_at);
        next.version = current.version + 1;

        match self.store.update_expense(&next, current.version).await {
            Ok(()) => Ok(next),
            Err(StoreError::Conflict { .. }) => Err(self.lost_race(&current, "edit").await),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn submit(&self, actor: &Principal, id: Uuid) -> Result<Expense, WorkflowError> {
        let manager = match actor.reports_to {
            Some(manager_id) => self.directory.find_principal(manager_id).await?,
            None => None,
        };
        self.apply(actor, id, Command::Submit { manager }).await
    }

    pub async fn manager_approve(
        &self,
        actor: &Principal,
        id: Uuid,
        comment: Option<String>,
    ) -> Result<Expense, WorkflowError> {
        let comment = comment.unwrap_or_default();
        self.apply(actor, id, Command::ManagerApprove { comment }).await
    }

    pub async fn manager_reject(
        &self,
        actor: &Principal,
        id: Uuid,
        comment: Option<String>,
    ) -> Result<Expense, WorkflowError> {
        let comment = comment.unwrap_or_default();
        self.apply(actor, id, Command::ManagerReject { comment }).await
    }

    pub async fn finance_approve(
        &self,
        actor: &Principal,
        id: Uuid,
        comment: Option<String>,
    ) -> Result<Expense, WorkflowError> {
        let comment = comment.unwrap_or_default();
        self.apply(actor, id, Command::FinanceApprove { comment }).await
    }

    pub async fn mark_paid(
        &self,
        actor: &Principal,
        id: Uuid,
        payment_reference: String,
        comment: Option<String>,
    ) -> Result<Expense, WorkflowError> {
        self.apply(
            actor,
            id,
            Command::MarkPaid {
                payment_reference,
                comment,
            },
        )
        .await
    }

    /// The caller's list view.
    pub async fn list_claims(&self, actor: &Principal) -> Result<Vec<Expense>, WorkflowError> {
        let scope = ClaimScope::for_principal(actor);
        Ok(self.store.list_expenses(&scope).await?)
    }

    pub async fn claim_detail(
        &self,
        actor: &Principal,
        id: Uuid,
    ) -> Result<ClaimDetail, WorkflowError> {
        let expense = self.load_visible(actor, id).await?;
        let approval_history = self.store.history(id).await?;
        match replay_status(&approval_history) {
            Ok(replayed) if replayed == expense.status => {}
            Ok(replayed) => log::warn!(
                "Claim {} is {} but its audit trail replays to {}",
                id,
                expense.status,
                replayed
            ),
            Err(e) => log::warn!("Claim {} has an unreplayable audit trail: {}", id, e),
        }
        let receipt = self.store.find_receipt(id).await?;
        Ok(ClaimDetail {
            expense,
            approval_history,
            receipt,
        })
    }

    /// A claim the actor may see. Hidden and missing claims both read as `NotFound`.
    async fn load_visible(&self, actor: &Principal, id: Uuid) -> Result<Expense, WorkflowError> {
        match self.store.find_expense(id).await? {
            Some(expense) if can_view_claim(actor, &expense) => Ok(expense),
            _ => Err(WorkflowError::NotFound),
        }
    }

    async fn apply(
        &self,
        actor: &Principal,
        id: Uuid,
        command: Command,
    ) -> Result<Expense, WorkflowError> {
        let operation = command.name();
        let current = self.load_visible(actor, id).await?;
        let planned = transition::plan(&current, actor, command, Utc::now())?;

        match self
            .store
            .commit_transition(&planned.expense, current.version, planned.event)
            .await
        {
            Ok(event) => {
                log::info!(
                    "Claim {} {} -> {} by {} (event {})",
                    id,
                    current.status,
                    planned.expense.status,
                    actor.id,
                    event.id
                );
                if planned.expense.status.is_terminal() {
                    log::info!("Claim {} closed as {}", id, planned.expense.status);
                }
                Ok(planned.expense)
            }
            Err(StoreError::Conflict { .. }) => Err(self.lost_race(&current, operation).await),
            Err(e) => Err(e.into()),
        }
    }

    /// Error for a caller whose compare-and-swap lost: the status the claim
    /// moved to since it was read.
    async fn lost_race(&self, stale: &Expense, operation: &'static str) -> WorkflowError {
        let status = match self.store.find_expense(stale.id).await {
            Ok(Some(latest)) => latest.status,
            _ => stale.status,
        };
        log::debug!("Claim {} changed concurrently during {}", stale.id, operation);
        WorkflowError::InvalidTransition { status, operation }
    }
}
