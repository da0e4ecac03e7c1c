use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use axum_extra::extract::Multipart;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::CurrentPrincipal,
    models::Receipt,
    state::AppState,
    workflow::Upload,
};

#[derive(Debug, Deserialize)]
pub struct ReceiptQuery {
    #[serde(default)]
    download: String,
}

pub async fn upload_receipt(
    State(state): State<AppState>,
    Path(expense_id): Path<Uuid>,
    CurrentPrincipal(actor): CurrentPrincipal,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Receipt>), AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("failed to read upload: {e}")))?;
        upload = Some(Upload {
            file_name,
            content_type,
            data: data.to_vec(),
        });
        break;
    }

    let upload = upload.ok_or_else(|| AppError::BadRequest("missing 'file' field".to_string()))?;
    let receipt = state.receipts.attach(&actor, expense_id, upload).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn get_receipt(
    State(state): State<AppState>,
    Path(expense_id): Path<Uuid>,
    Query(query): Query<ReceiptQuery>,
    CurrentPrincipal(actor): CurrentPrincipal,
) -> Result<Response, AppError> {
    let (receipt, data) = state.receipts.open(&actor, expense_id).await?;

    let disposition = if matches!(query.download.as_str(), "true" | "1") {
        "attachment"
    } else {
        "inline"
    };
    let disposition = format!(
        "{}; filename*=UTF-8''{}",
        disposition,
        urlencoding::encode(&receipt.file_name)
    );

    Ok((
        [
            (header::CONTENT_TYPE, receipt.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}

pub async fn list_receipts(
    State(state): State<AppState>,
    CurrentPrincipal(actor): CurrentPrincipal,
) -> Result<Json<Vec<Receipt>>, AppError> {
    Ok(Json(state.receipts.list_visible(&actor).await?))
}
