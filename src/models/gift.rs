//! Gift model: a portion of a giver's campaign budget sent to a coworker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::RecipientSummary;

/// A gift row. `amount` is integer cents.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Gift {
    pub id: String,
    pub campaign_id: String,
    pub giver_id: String,
    pub recipient_id: String,
    pub amount: i64,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A gift as listed to its giver.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftWithRecipient {
    #[serde(flatten)]
    pub gift: Gift,
    pub recipient: RecipientSummary,
}

/// A gift as listed to its recipient. Carries nothing that identifies the giver.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedGift {
    pub id: String,
    pub amount: i64,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Request body for creating a gift.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateGiftRequest {
    pub recipient_id: Uuid,
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(length(min = 1, max = 1000))]
    pub comment: String,
}

/// Request body for editing a gift. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGiftRequest {
    #[serde(default)]
    #[validate(range(min = 1))]
    pub amount: Option<i64>,
    #[serde(default)]
    #[validate(length(min = 1, max = 1000))]
    pub comment: Option<String>,
}

/// Formats cents as dollars, e.g. `12345` as `$123.45`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}${}.{:02}", sign, abs / 100, abs % 100)
}
