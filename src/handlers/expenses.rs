use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::CurrentPrincipal,
    models::{Expense, ExpenseInput},
    state::AppState,
    workflow::ClaimDetail,
};

/// Optional reviewer note. Clients send it under either name.
#[derive(Debug, Default, Deserialize)]
pub struct CommentBody {
    #[serde(default, alias = "manager_comment", alias = "finance_comment")]
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MarkPaidBody {
    #[serde(default)]
    pub payment_reference: String,
    #[serde(default, alias = "finance_comment")]
    pub comment: Option<String>,
}

/// An empty body reads as `T::default()`.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(e.to_string()))
}

pub async fn list_expenses(
    State(state): State<AppState>,
    CurrentPrincipal(actor): CurrentPrincipal,
) -> Result<Json<Vec<Expense>>, AppError> {
    Ok(Json(state.engine.list_claims(&actor).await?))
}

pub async fn create_expense(
    State(state): State<AppState>,
    CurrentPrincipal(actor): CurrentPrincipal,
    body: Bytes,
) -> Result<(StatusCode, Json<Expense>), AppError> {
    let input: ExpenseInput =
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let expense = state.engine.create(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

pub async fn expense_detail(
    State(state): State<AppState>,
    Path(expense_id): Path<Uuid>,
    CurrentPrincipal(actor): CurrentPrincipal,
) -> Result<Json<ClaimDetail>, AppError> {
    Ok(Json(state.engine.claim_detail(&actor, expense_id).await?))
}

pub async fn update_expense(
    State(state): State<AppState>,
    Path(expense_id): Path<Uuid>,
    CurrentPrincipal(actor): CurrentPrincipal,
    body: Bytes,
) -> Result<Json<Expense>, AppError> {
    let input: ExpenseInput =
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok(Json(state.engine.update_draft(&actor, expense_id, input).await?))
}

pub async fn submit(
    State(state): State<AppState>,
    Path(expense_id): Path<Uuid>,
    CurrentPrincipal(actor): CurrentPrincipal,
) -> Result<Json<Expense>, AppError> {
    Ok(Json(state.engine.submit(&actor, expense_id).await?))
}

pub async fn manager_approve(
    State(state): State<AppState>,
    Path(expense_id): Path<Uuid>,
    CurrentPrincipal(actor): CurrentPrincipal,
    body: Bytes,
) -> Result<Json<Expense>, AppError> {
    let body: CommentBody = parse_body(&body)?;
    let expense = state
        .engine
        .manager_approve(&actor, expense_id, body.comment)
        .await?;
    Ok(Json(expense))
}

pub async fn manager_reject(
    State(state): State<AppState>,
    Path(expense_id): Path<Uuid>,
    CurrentPrincipal(actor): CurrentPrincipal,
    body: Bytes,
) -> Result<Json<Expense>, AppError> {
    let body: CommentBody = parse_body(&body)?;
    let expense = state
        .engine
        .manager_reject(&actor, expense_id, body.comment)
        .await?;
    Ok(Json(expense))
}

pub async fn finance_approve(
    State(state): State<AppState>,
    Path(expense_id): Path<Uuid>,
    CurrentPrincipal(actor): CurrentPrincipal,
    body: Bytes,
) -> Result<Json<Expense>, AppError> {
    let body: CommentBody = parse_body(&body)?;
    let expense = state
        .engine
        .finance_approve(&actor, expense_id, body.comment)
        .await?;
    Ok(Json(expense))
}

pub async fn mark_paid(
    State(state): State<AppState>,
    Path(expense_id): Path<Uuid>,
    CurrentPrincipal(actor): CurrentPrincipal,
    body: Bytes,
) -> Result<Json<Expense>, AppError> {
    let body: MarkPaidBody = parse_body(&body)?;
    let expense = state
        .engine
        .mark_paid(&actor, expense_id, body.payment_reference, body.comment)
        .await?;
    Ok(Json(expense))
}
