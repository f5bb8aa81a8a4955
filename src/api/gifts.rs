//! Gift API endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;

use super::{success, ApiResponse, ApiResult, ValidatedJson};
use crate::auth::AuthUser;
use crate::db::NewGift;
use crate::errors::AppError;
use crate::models::{CreateGiftRequest, GiftWithRecipient, ReceivedGift, UpdateGiftRequest};
use crate::AppState;

/// GET /api/v1/campaigns/{id}/gifts - Gifts the caller has given.
pub async fn list_gifts(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Vec<GiftWithRecipient>> {
    success(state.repo.list_given_gifts(&id, &user.id).await?)
}

/// GET /api/v1/campaigns/{id}/gifts/received - Gifts the caller has received, giver withheld.
pub async fn list_received_gifts(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Vec<ReceivedGift>> {
    success(state.repo.list_received_gifts(&id, &user.id).await?)
}

/// POST /api/v1/campaigns/{id}/gifts - Give a gift.
pub async fn create_gift(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<CreateGiftRequest>,
) -> ApiResult<GiftWithRecipient> {
    let gift = NewGift {
        recipient_id: request.recipient_id.to_string(),
        amount: request.amount,
        comment: request.comment,
    };
    let created = state
        .repo
        .create_gift(&id, &user.id, &gift, Utc::now())
        .await?;
    Ok(ApiResponse::created(created))
}

/// PUT /api/v1/campaigns/{id}/gifts/{gift_id} - Edit one of the caller's gifts.
pub async fn update_gift(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, gift_id)): Path<(String, String)>,
    ValidatedJson(request): ValidatedJson<UpdateGiftRequest>,
) -> ApiResult<GiftWithRecipient> {
    success(
        state
            .repo
            .update_gift(&id, &gift_id, &user.id, &request, Utc::now())
            .await?,
    )
}

/// DELETE /api/v1/campaigns/{id}/gifts/{gift_id} - Withdraw one of the caller's gifts.
pub async fn delete_gift(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, gift_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state
        .repo
        .delete_gift(&id, &gift_id, &user.id, Utc::now())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
