//! Campaign API endpoints.

use axum::extract::{Path, State};

use super::{success, ApiResponse, ApiResult, ValidatedJson};
use crate::auth::{AdminUser, AuthUser};
use crate::errors::AppError;
use crate::models::{Campaign, CampaignDetail, CampaignStatus, CreateCampaignRequest};
use crate::AppState;

/// GET /api/v1/campaigns - Campaigns the caller takes part in.
pub async fn list_campaigns(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<Campaign>> {
    success(state.repo.list_campaigns_for_user(&user.id).await?)
}

/// POST /api/v1/campaigns - Create a campaign (admin).
pub async fn create_campaign(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidatedJson(request): ValidatedJson<CreateCampaignRequest>,
) -> ApiResult<Campaign> {
    let campaign = state.repo.create_campaign(&request, &admin.id).await?;
    tracing::info!(campaign_id = %campaign.id, created_by = %admin.id, "Campaign created");
    Ok(ApiResponse::created(campaign))
}

/// GET /api/v1/campaigns/{id} - A campaign with the caller's budget position.
pub async fn get_campaign(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<CampaignDetail> {
    let campaign = state.repo.require_campaign(&id).await?;

    if !user.is_admin && !state.repo.is_participant(&id, &user.id).await? {
        return Err(AppError::Forbidden(
            "Not a participant in this campaign".to_string(),
        ));
    }

    let total_gifted = state.repo.total_gifted(&id, &user.id).await?;
    success(CampaignDetail {
        remaining_budget: campaign.remaining_budget(total_gifted),
        total_gifted,
        campaign,
    })
}

/// GET /api/v1/campaigns/{id}/status - Every participant's progress (admin).
pub async fn campaign_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<CampaignStatus> {
    let campaign = state.repo.require_campaign(&id).await?;
    success(state.repo.campaign_status(&campaign).await?)
}
