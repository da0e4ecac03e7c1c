pub mod approval;
pub mod expense;
pub mod receipt;
pub mod user;

pub use approval::{replay_status, ApprovalAction, ApprovalEvent, NewApprovalEvent};
pub use expense::{Expense, ExpenseCategory, ExpenseInput, ExpenseStatus};
pub use receipt::{OcrFields, OcrOutcome, OcrStatus, Receipt};
pub use user::{Credentials, LoginRequest, MeResponse, Principal, Role, TokenResponse, UserRow};
