//! Participant API endpoints.

use axum::extract::{Multipart, Path, State};

use super::{success, ApiResult};
use crate::auth::{AdminUser, AuthUser};
use crate::csv_import::{parse_participants, MAX_CSV_BYTES};
use crate::errors::AppError;
use crate::models::{ImportSummary, UserSummary};
use crate::AppState;

/// GET /api/v1/campaigns/{id}/participants - Coworkers the caller can gift to.
pub async fn list_participants(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Vec<UserSummary>> {
    success(state.repo.list_participants_except(&id, &user.id).await?)
}

/// POST /api/v1/campaigns/{id}/participants/import - Enroll users from a CSV upload (admin).
pub async fn import_participants(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<ImportSummary> {
    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid upload: {}", e.body_text())))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Invalid upload: {}", e.body_text())))?;
            file = Some(bytes);
            break;
        }
    }
    let file = file.ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;
    if file.len() > MAX_CSV_BYTES {
        return Err(AppError::BadRequest("File too large (max 1 MiB)".to_string()));
    }

    state.repo.require_campaign(&id).await?;

    let parsed = parse_participants(&file)?;
    let mut summary = state.repo.import_participants(&id, &parsed.rows).await?;
    summary.errors = parsed.errors;

    tracing::info!(
        campaign_id = %id,
        users_processed = summary.users_processed,
        participants_added = summary.participants_added,
        rejected_rows = summary.errors.len(),
        "Participants imported"
    );
    success(summary)
}
