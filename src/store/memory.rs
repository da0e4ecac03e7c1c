//! In-memory store for tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use super::{ClaimStore, Directory};
use crate::error::StoreError;
use crate::models::{
    ApprovalEvent, Credentials, Expense, ExpenseStatus, NewApprovalEvent, Principal, Receipt,
    Role,
};
use crate::workflow::scope::{ClaimScope, ReceiptScope};

#[derive(Default)]
struct State {
    expenses: HashMap<Uuid, Expense>,
    events: Vec<ApprovalEvent>,
    /// Keyed by expense id: one current receipt per claim.
    receipts: HashMap<Uuid, Receipt>,
    users: HashMap<Uuid, Credentials>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Registers a user that cannot log in.
    pub fn add_user(&self, username: &str, role: Role, reports_to: Option<Uuid>) -> Principal {
        self.insert_user(username, role, reports_to, String::new())
    }

    pub fn add_user_with_password(
        &self,
        username: &str,
        role: Role,
        reports_to: Option<Uuid>,
        password: &str,
    ) -> Principal {
        let hash = bcrypt::hash(password, 4).unwrap();
        self.insert_user(username, role, reports_to, hash)
    }

    fn insert_user(
        &self,
        username: &str,
        role: Role,
        reports_to: Option<Uuid>,
        password_hash: String,
    ) -> Principal {
        let principal = Principal {
            id: Uuid::new_v4(),
            username: username.to_string(),
            role,
            reports_to,
        };
        self.state.write().unwrap().users.insert(
            principal.id,
            Credentials {
                principal: principal.clone(),
                password_hash,
            },
        );
        principal
    }

    fn write_checked(
        state: &mut State,
        expense: &Expense,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        match state.expenses.get(&expense.id) {
            Some(current) if current.version == expected_version => {
                state.expenses.insert(expense.id, expense.clone());
                Ok(())
            }
            Some(_) => Err(StoreError::Conflict {
                expense_id: expense.id,
                expected_version,
            }),
            None => Err(StoreError::NotFound(format!("expense {}", expense.id))),
        }
    }
}

#[async_trait]
impl ClaimStore for MemoryStore {
    async fn insert_expense(&self, expense: &Expense) -> Result<(), StoreError> {
        self.state
            .write()
            .unwrap()
            .expenses
            .insert(expense.id, expense.clone());
        Ok(())
    }

    async fn find_expense(&self, id: Uuid) -> Result<Option<Expense>, StoreError> {
        Ok(self.state.read().unwrap().expenses.get(&id).cloned())
    }

    async fn list_expenses(&self, scope: &ClaimScope) -> Result<Vec<Expense>, StoreError> {
        let state = self.state.read().unwrap();
        let mut expenses: Vec<Expense> = state
            .expenses
            .values()
            .filter(|e| scope.admits(e))
            .cloned()
            .collect();
        expenses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(expenses)
    }

    async fn update_expense(
        &self,
        expense: &Expense,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        Self::write_checked(&mut state, expense, expected_version)
    }

    async fn commit_transition(
        &self,
        expense: &Expense,
        expected_version: i64,
        event: NewApprovalEvent,
    ) -> Result<ApprovalEvent, StoreError> {
        let mut state = self.state.write().unwrap();
        Self::write_checked(&mut state, expense, expected_version)?;
        let event = event.into_event(state.events.len() as i64 + 1);
        state.events.push(event.clone());
        Ok(event)
    }

    async fn history(&self, expense_id: Uuid) -> Result<Vec<ApprovalEvent>, StoreError> {
        let state = self.state.read().unwrap();
        let mut events: Vec<ApprovalEvent> = state
            .events
            .iter()
            .filter(|e| e.expense_id == expense_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.timestamp, e.id));
        Ok(events)
    }

    async fn replace_receipt(
        &self,
        receipt: &Receipt,
        allowed: &[ExpenseStatus],
    ) -> Result<Option<Receipt>, StoreError> {
        let mut state = self.state.write().unwrap();
        let status = state
            .expenses
            .get(&receipt.expense_id)
            .map(|e| e.status)
            .ok_or_else(|| StoreError::NotFound(format!("expense {}", receipt.expense_id)))?;
        if !allowed.contains(&status) {
            return Err(StoreError::StatusChanged {
                expense_id: receipt.expense_id,
                status,
            });
        }
        Ok(state.receipts.insert(receipt.expense_id, receipt.clone()))
    }

    async fn find_receipt(&self, expense_id: Uuid) -> Result<Option<Receipt>, StoreError> {
        Ok(self.state.read().unwrap().receipts.get(&expense_id).cloned())
    }

    async fn record_ocr_outcome(&self, receipt: &Receipt) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        if let Some(current) = state.receipts.get_mut(&receipt.expense_id) {
            if current.id == receipt.id {
                *current = receipt.clone();
            }
        }
        Ok(())
    }

    async fn list_receipts(&self, scope: &ReceiptScope) -> Result<Vec<Receipt>, StoreError> {
        let state = self.state.read().unwrap();
        let mut receipts: Vec<Receipt> = state
            .receipts
            .values()
            .filter(|r| {
                state
                    .expenses
                    .get(&r.expense_id)
                    .is_some_and(|e| scope.admits(e))
            })
            .cloned()
            .collect();
        receipts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(receipts)
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn find_principal(&self, id: Uuid) -> Result<Option<Principal>, StoreError> {
        Ok(self
            .state
            .read()
            .unwrap()
            .users
            .get(&id)
            .map(|c| c.principal.clone()))
    }

    async fn find_credentials(&self, username: &str) -> Result<Option<Credentials>, StoreError> {
        Ok(self
            .state
            .read()
            .unwrap()
            .users
            .values()
            .find(|c| c.principal.username == username)
            .cloned())
    }
}
