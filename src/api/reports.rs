//! Report API endpoints.

use axum::extract::{Path, State};

use super::{success, ApiResult};
use crate::auth::AdminUser;
use crate::models::CampaignReport;
use crate::AppState;

/// GET /api/v1/campaigns/{id}/reports/summary - Participation figures (admin).
pub async fn report_summary(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<CampaignReport> {
    state.repo.require_campaign(&id).await?;
    success(state.repo.campaign_report(&id).await?)
}
