//! Campaign model: a time-boxed gifting round with a per-user budget.

use std::borrow::Cow;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

use super::UserSummary;

/// A gifting campaign. Amounts are integer cents.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub budget_per_user: i64,
    pub open_date: DateTime<Utc>,
    pub close_date: DateTime<Utc>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    /// Whether gifts may be created, edited or removed at `now`.
    /// Both ends of the window are inclusive.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.open_date <= now && now <= self.close_date
    }

    /// Budget left after `spent` cents have been gifted.
    pub fn remaining_budget(&self, spent: i64) -> i64 {
        self.budget_per_user - spent
    }
}

/// Request body for creating a campaign.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_window"))]
pub struct CreateCampaignRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[validate(range(min = 1))]
    pub budget_per_user: i64,
    #[serde(deserialize_with = "deserialize_date")]
    pub open_date: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_date")]
    pub close_date: DateTime<Utc>,
}

fn validate_window(request: &CreateCampaignRequest) -> Result<(), ValidationError> {
    if request.close_date > request.open_date {
        Ok(())
    } else {
        Err(ValidationError::new("close_date_before_open_date")
            .with_message(Cow::Borrowed("Close date must be after open date")))
    }
}

/// Accepts a full RFC 3339 timestamp or a bare `YYYY-MM-DD`, which is read as
/// midnight UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date: {}", raw)))
}

/// Campaign as seen by one participant, with their own budget position.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignDetail {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub total_gifted: i64,
    pub remaining_budget: i64,
}

/// Campaign header in the admin status view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignOverview {
    pub id: String,
    pub title: String,
    pub budget_per_user: i64,
    pub open_date: DateTime<Utc>,
    pub close_date: DateTime<Utc>,
}

impl From<&Campaign> for CampaignOverview {
    fn from(campaign: &Campaign) -> Self {
        Self {
            id: campaign.id.clone(),
            title: campaign.title.clone(),
            budget_per_user: campaign.budget_per_user,
            open_date: campaign.open_date,
            close_date: campaign.close_date,
        }
    }
}

/// Participant identity in the admin status view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUser {
    pub id: String,
    pub email: String,
    pub display_name: String,
}

impl From<UserSummary> for StatusUser {
    fn from(user: UserSummary) -> Self {
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
        }
    }
}

/// One participant's gifting progress.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantStatus {
    pub user: StatusUser,
    pub total_gifted: i64,
    pub gift_count: i64,
    pub remaining_budget: i64,
}

/// Admin view of a campaign and every participant's progress.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStatus {
    pub campaign: CampaignOverview,
    pub participant_status: Vec<ParticipantStatus>,
}
