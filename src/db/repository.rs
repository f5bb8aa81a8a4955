//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity. Gift writes
//! run under [`WriteTx`] so the budget check and the write see the same data.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, Sqlite, SqlitePool};

use super::WriteTx;
use crate::errors::AppError;
use crate::models::{
    format_cents, Campaign, CampaignOverview, CampaignReport, CampaignStatus,
    CreateCampaignRequest, Gift, GiftWithRecipient, ImportSummary, ParticipantStatus,
    ReceivedGift, RecipientSummary, UpdateGiftRequest, User, UserSummary,
};

const USER_COLUMNS: &str = "id, email, display_name, avatar_url, is_admin, created_at";
const CAMPAIGN_COLUMNS: &str =
    "id, title, description, budget_per_user, open_date, close_date, created_by, created_at";

/// Gift columns joined with the recipient's public profile.
const GIFT_WITH_RECIPIENT_SELECT: &str = r#"
    SELECT g.id, g.campaign_id, g.giver_id, g.recipient_id, g.amount, g.comment,
           g.created_at, g.updated_at,
           u.display_name AS recipient_display_name,
           u.avatar_url AS recipient_avatar_url
    FROM gifts g
    JOIN users u ON u.id = g.recipient_id
"#;

/// A participant to import, as read from the CSV upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantImport {
    pub email: String,
    pub display_name: Option<String>,
}

/// New gift, already validated for shape.
#[derive(Debug, Clone)]
pub struct NewGift {
    pub recipient_id: String,
    pub amount: i64,
    pub comment: String,
}

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== USER OPERATIONS ====================

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Get a user by email (case-insensitive).
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = ?",
            USER_COLUMNS
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Record the avatar the identity provider reported.
    pub async fn update_avatar(&self, id: &str, avatar_url: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET avatar_url = ? WHERE id = ?")
            .bind(avatar_url)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert a user unless one with this email already exists. Existing rows
    /// are returned untouched.
    pub async fn ensure_user(
        &self,
        email: &str,
        display_name: &str,
        is_admin: bool,
    ) -> Result<User, AppError> {
        sqlx::query(
            "INSERT INTO users (id, email, display_name, avatar_url, is_admin, created_at) VALUES (?, ?, ?, NULL, ?, ?) ON CONFLICT(email) DO NOTHING",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(email)
        .bind(display_name)
        .bind(is_admin)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_user_by_email(email)
            .await?
            .ok_or_else(|| AppError::Internal(format!("User {} vanished after insert", email)))
    }

    // ==================== CAMPAIGN OPERATIONS ====================

    /// List the campaigns a user participates in, newest first.
    pub async fn list_campaigns_for_user(&self, user_id: &str) -> Result<Vec<Campaign>, AppError> {
        let campaigns = sqlx::query_as::<_, Campaign>(
            r#"
            SELECT c.id, c.title, c.description, c.budget_per_user, c.open_date, c.close_date,
                   c.created_by, c.created_at
            FROM campaigns c
            JOIN campaign_participants p ON p.campaign_id = c.id
            WHERE p.user_id = ?
            ORDER BY c.created_at DESC, c.rowid DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(campaigns)
    }

    /// Get a campaign by ID.
    pub async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>, AppError> {
        let campaign = sqlx::query_as::<_, Campaign>(&format!(
            "SELECT {} FROM campaigns WHERE id = ?",
            CAMPAIGN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(campaign)
    }

    /// Get a campaign or fail with 404.
    pub async fn require_campaign(&self, id: &str) -> Result<Campaign, AppError> {
        self.get_campaign(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Campaign not found".to_string()))
    }

    /// Create a new campaign.
    pub async fn create_campaign(
        &self,
        request: &CreateCampaignRequest,
        created_by: &str,
    ) -> Result<Campaign, AppError> {
        let campaign = Campaign {
            id: uuid::Uuid::new_v4().to_string(),
            title: request.title.clone(),
            description: request.description.clone(),
            budget_per_user: request.budget_per_user,
            open_date: request.open_date,
            close_date: request.close_date,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        };
        self.insert_campaign(&campaign).await?;
        Ok(campaign)
    }

    /// Insert a campaign with a caller-chosen ID. Returns false if the ID was taken.
    pub async fn insert_campaign(&self, campaign: &Campaign) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO campaigns (id, title, description, budget_per_user, open_date, close_date, created_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?) ON CONFLICT(id) DO NOTHING",
        )
        .bind(&campaign.id)
        .bind(&campaign.title)
        .bind(&campaign.description)
        .bind(campaign.budget_per_user)
        .bind(campaign.open_date)
        .bind(campaign.close_date)
        .bind(&campaign.created_by)
        .bind(campaign.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Total a giver has gifted in a campaign.
    pub async fn total_gifted(&self, campaign_id: &str, giver_id: &str) -> Result<i64, AppError> {
        Ok(sum_gifts(&self.pool, campaign_id, giver_id, None).await?)
    }

    /// Every participant's gifting progress.
    pub async fn campaign_status(&self, campaign: &Campaign) -> Result<CampaignStatus, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.email, u.display_name, u.avatar_url,
                   COALESCE(SUM(g.amount), 0) AS total_gifted,
                   COUNT(g.id) AS gift_count
            FROM campaign_participants p
            JOIN users u ON u.id = p.user_id
            LEFT JOIN gifts g ON g.campaign_id = p.campaign_id AND g.giver_id = p.user_id
            WHERE p.campaign_id = ?
            GROUP BY u.id, u.email, u.display_name, u.avatar_url
            ORDER BY u.display_name
            "#,
        )
        .bind(&campaign.id)
        .fetch_all(&self.pool)
        .await?;

        let participant_status = rows
            .iter()
            .map(|row| -> Result<ParticipantStatus, sqlx::Error> {
                let total_gifted: i64 = row.try_get("total_gifted")?;
                Ok(ParticipantStatus {
                    user: UserSummary::from_row(row)?.into(),
                    total_gifted,
                    gift_count: row.try_get("gift_count")?,
                    remaining_budget: campaign.remaining_budget(total_gifted),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(CampaignStatus {
            campaign: CampaignOverview::from(campaign),
            participant_status,
        })
    }

    // ==================== PARTICIPANT OPERATIONS ====================

    /// Whether a user is a participant of a campaign.
    pub async fn is_participant(&self, campaign_id: &str, user_id: &str) -> Result<bool, AppError> {
        Ok(participant_exists(&self.pool, campaign_id, user_id).await?)
    }

    /// Participants other than `exclude_user_id`, for the coworker picker.
    pub async fn list_participants_except(
        &self,
        campaign_id: &str,
        exclude_user_id: &str,
    ) -> Result<Vec<UserSummary>, AppError> {
        let users = sqlx::query_as::<_, UserSummary>(
            r#"
            SELECT u.id, u.email, u.display_name, u.avatar_url
            FROM campaign_participants p
            JOIN users u ON u.id = p.user_id
            WHERE p.campaign_id = ? AND p.user_id <> ?
            ORDER BY u.display_name
            "#,
        )
        .bind(campaign_id)
        .bind(exclude_user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    /// Add a participant. Returns false if they already were one.
    pub async fn add_participant(&self, campaign_id: &str, user_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO campaign_participants (campaign_id, user_id, created_at) VALUES (?, ?, ?) ON CONFLICT(campaign_id, user_id) DO NOTHING",
        )
        .bind(campaign_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Upsert each user by email and enroll them in the campaign.
    ///
    /// Existing users get their display name refreshed. Rows are applied in a
    /// single transaction.
    pub async fn import_participants(
        &self,
        campaign_id: &str,
        rows: &[ParticipantImport],
    ) -> Result<ImportSummary, AppError> {
        let mut summary = ImportSummary::default();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for row in rows {
            let display_name = row
                .display_name
                .as_deref()
                .filter(|name| !name.is_empty())
                .unwrap_or(row.email.as_str());

            let user_id: String = sqlx::query_scalar(
                r#"
                INSERT INTO users (id, email, display_name, avatar_url, is_admin, created_at)
                VALUES (?, ?, ?, NULL, 0, ?)
                ON CONFLICT(email) DO UPDATE SET display_name = excluded.display_name
                RETURNING id
                "#,
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&row.email)
            .bind(display_name)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            summary.users_processed += 1;

            let added = sqlx::query(
                "INSERT INTO campaign_participants (campaign_id, user_id, created_at) VALUES (?, ?, ?) ON CONFLICT(campaign_id, user_id) DO NOTHING",
            )
            .bind(campaign_id)
            .bind(&user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            if added.rows_affected() == 1 {
                summary.participants_added += 1;
            }
        }

        tx.commit().await?;
        Ok(summary)
    }

    // ==================== GIFT OPERATIONS ====================

    /// Gifts a user has given in a campaign, newest first.
    pub async fn list_given_gifts(
        &self,
        campaign_id: &str,
        giver_id: &str,
    ) -> Result<Vec<GiftWithRecipient>, AppError> {
        let rows = sqlx::query(&format!(
            "{} WHERE g.campaign_id = ? AND g.giver_id = ? ORDER BY g.created_at DESC, g.rowid DESC",
            GIFT_WITH_RECIPIENT_SELECT
        ))
        .bind(campaign_id)
        .bind(giver_id)
        .fetch_all(&self.pool)
        .await?;

        let gifts = rows
            .iter()
            .map(gift_with_recipient_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(gifts)
    }

    /// Gifts a user has received in a campaign, newest first, without giver details.
    pub async fn list_received_gifts(
        &self,
        campaign_id: &str,
        recipient_id: &str,
    ) -> Result<Vec<ReceivedGift>, AppError> {
        let gifts = sqlx::query_as::<_, ReceivedGift>(
            r#"
            SELECT id, amount, comment, created_at
            FROM gifts
            WHERE campaign_id = ? AND recipient_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(campaign_id)
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(gifts)
    }

    /// Create a gift, enforcing the campaign window, participation and budget.
    ///
    /// Every check runs under the write lock, so concurrent gifts from the
    /// same giver cannot jointly overdraw the budget.
    pub async fn create_gift(
        &self,
        campaign_id: &str,
        giver_id: &str,
        gift: &NewGift,
        now: DateTime<Utc>,
    ) -> Result<GiftWithRecipient, AppError> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = insert_gift_locked(tx.conn(), campaign_id, giver_id, gift, now).await;
        match result {
            Ok(id) => {
                tx.commit().await?;
                tracing::info!(campaign_id, giver_id, gift_id = %id, amount = gift.amount, "Gift created");
                self.require_gift_with_recipient(&id).await
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Edit a gift's amount and/or comment. Only the giver may do this, and
    /// only while the campaign is open.
    pub async fn update_gift(
        &self,
        campaign_id: &str,
        gift_id: &str,
        user_id: &str,
        changes: &UpdateGiftRequest,
        now: DateTime<Utc>,
    ) -> Result<GiftWithRecipient, AppError> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = update_gift_locked(tx.conn(), campaign_id, gift_id, user_id, changes, now).await;
        match result {
            Ok(()) => {
                tx.commit().await?;
                tracing::info!(campaign_id, gift_id, user_id, "Gift updated");
                self.require_gift_with_recipient(gift_id).await
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Remove a gift. Same gate as [`Repository::update_gift`].
    pub async fn delete_gift(
        &self,
        campaign_id: &str,
        gift_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = async {
            let conn = tx.conn();
            load_open_campaign(&mut *conn, campaign_id, now).await?;
            load_own_gift(&mut *conn, campaign_id, gift_id, user_id).await?;
            sqlx::query("DELETE FROM gifts WHERE id = ?")
                .bind(gift_id)
                .execute(&mut *conn)
                .await?;
            Ok::<(), AppError>(())
        }
        .await;

        match result {
            Ok(()) => {
                tx.commit().await?;
                tracing::info!(campaign_id, gift_id, user_id, "Gift deleted");
                Ok(())
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Insert a gift outside the budget gate unless one already exists for
    /// this (campaign, giver, recipient). Used for seeding.
    pub async fn ensure_gift(
        &self,
        campaign_id: &str,
        giver_id: &str,
        recipient_id: &str,
        amount: i64,
        comment: &str,
    ) -> Result<bool, AppError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO gifts (id, campaign_id, giver_id, recipient_id, amount, comment, created_at, updated_at)
            SELECT ?, ?, ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM gifts WHERE campaign_id = ? AND giver_id = ? AND recipient_id = ?
            )
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(campaign_id)
        .bind(giver_id)
        .bind(recipient_id)
        .bind(amount)
        .bind(comment)
        .bind(now)
        .bind(now)
        .bind(campaign_id)
        .bind(giver_id)
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn require_gift_with_recipient(&self, id: &str) -> Result<GiftWithRecipient, AppError> {
        let row = sqlx::query(&format!("{} WHERE g.id = ?", GIFT_WITH_RECIPIENT_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Gift not found".to_string()))?;
        Ok(gift_with_recipient_from_row(&row)?)
    }

    // ==================== REPORT OPERATIONS ====================

    /// Aggregate participation figures for a campaign.
    pub async fn campaign_report(&self, campaign_id: &str) -> Result<CampaignReport, AppError> {
        let total_participants: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM campaign_participants WHERE campaign_id = ?")
                .bind(campaign_id)
                .fetch_one(&self.pool)
                .await?;

        let row = sqlx::query(
            r#"
            SELECT COUNT(DISTINCT giver_id) AS givers,
                   COUNT(*) AS gift_count,
                   COALESCE(SUM(amount), 0) AS total_amount
            FROM gifts
            WHERE campaign_id = ?
            "#,
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(CampaignReport::new(
            total_participants,
            row.try_get("givers")?,
            row.try_get("total_amount")?,
            row.try_get("gift_count")?,
        ))
    }
}

// ==================== LOCKED GIFT STEPS ====================

async fn insert_gift_locked(
    conn: &mut sqlx::SqliteConnection,
    campaign_id: &str,
    giver_id: &str,
    gift: &NewGift,
    now: DateTime<Utc>,
) -> Result<String, AppError> {
    let campaign = load_open_campaign(&mut *conn, campaign_id, now).await?;

    if !participant_exists(&mut *conn, campaign_id, giver_id).await? {
        return Err(AppError::Forbidden(
            "Not a participant in this campaign".to_string(),
        ));
    }
    if gift.recipient_id == giver_id {
        return Err(AppError::BadRequest("Cannot gift to yourself".to_string()));
    }
    if !participant_exists(&mut *conn, campaign_id, &gift.recipient_id).await? {
        return Err(AppError::Forbidden(
            "Recipient is not a participant in this campaign".to_string(),
        ));
    }

    let spent = sum_gifts(&mut *conn, campaign_id, giver_id, None).await?;
    check_budget(&campaign, spent, gift.amount)?;

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO gifts (id, campaign_id, giver_id, recipient_id, amount, comment, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(campaign_id)
    .bind(giver_id)
    .bind(&gift.recipient_id)
    .bind(gift.amount)
    .bind(&gift.comment)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(id)
}

async fn update_gift_locked(
    conn: &mut sqlx::SqliteConnection,
    campaign_id: &str,
    gift_id: &str,
    user_id: &str,
    changes: &UpdateGiftRequest,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let campaign = load_open_campaign(&mut *conn, campaign_id, now).await?;
    let existing = load_own_gift(&mut *conn, campaign_id, gift_id, user_id).await?;

    if let Some(amount) = changes.amount {
        let spent_elsewhere = sum_gifts(&mut *conn, campaign_id, user_id, Some(gift_id)).await?;
        check_budget(&campaign, spent_elsewhere, amount)?;
    }

    sqlx::query("UPDATE gifts SET amount = ?, comment = ?, updated_at = ? WHERE id = ?")
        .bind(changes.amount.unwrap_or(existing.amount))
        .bind(changes.comment.as_deref().unwrap_or(&existing.comment))
        .bind(now)
        .bind(gift_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Load a campaign and require that `now` lies inside its gifting window.
async fn load_open_campaign(
    conn: &mut sqlx::SqliteConnection,
    campaign_id: &str,
    now: DateTime<Utc>,
) -> Result<Campaign, AppError> {
    let campaign = sqlx::query_as::<_, Campaign>(&format!(
        "SELECT {} FROM campaigns WHERE id = ?",
        CAMPAIGN_COLUMNS
    ))
    .bind(campaign_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Campaign not found".to_string()))?;

    if !campaign.is_open_at(now) {
        return Err(AppError::BadRequest(
            "Campaign is not currently open for gifting".to_string(),
        ));
    }
    Ok(campaign)
}

/// Load a gift that `user_id` gave in `campaign_id`.
async fn load_own_gift(
    conn: &mut sqlx::SqliteConnection,
    campaign_id: &str,
    gift_id: &str,
    user_id: &str,
) -> Result<Gift, AppError> {
    let gift = sqlx::query_as::<_, Gift>(
        "SELECT id, campaign_id, giver_id, recipient_id, amount, comment, created_at, updated_at FROM gifts WHERE id = ?",
    )
    .bind(gift_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Gift not found".to_string()))?;

    if gift.giver_id != user_id {
        return Err(AppError::Forbidden("Not your gift".to_string()));
    }
    if gift.campaign_id != campaign_id {
        return Err(AppError::NotFound("Gift not in this campaign".to_string()));
    }
    Ok(gift)
}

/// Reject `amount` if it exceeds what is left of the budget after `spent`.
fn check_budget(campaign: &Campaign, spent: i64, amount: i64) -> Result<(), AppError> {
    let remaining = campaign.remaining_budget(spent);
    if amount > remaining {
        tracing::debug!(
            campaign_id = %campaign.id,
            remaining,
            amount,
            "Gift rejected: over budget"
        );
        return Err(AppError::BadRequest(format!(
            "Amount exceeds remaining budget. You have {} left.",
            format_cents(remaining)
        )));
    }
    Ok(())
}

async fn sum_gifts<'e, E>(
    executor: E,
    campaign_id: &str,
    giver_id: &str,
    exclude_gift_id: Option<&str>,
) -> Result<i64, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM gifts WHERE campaign_id = ? AND giver_id = ? AND (? IS NULL OR id <> ?)",
    )
    .bind(campaign_id)
    .bind(giver_id)
    .bind(exclude_gift_id)
    .bind(exclude_gift_id)
    .fetch_one(executor)
    .await
}

async fn participant_exists<'e, E>(
    executor: E,
    campaign_id: &str,
    user_id: &str,
) -> Result<bool, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM campaign_participants WHERE campaign_id = ? AND user_id = ?",
    )
    .bind(campaign_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await?;
    Ok(found.is_some())
}

// Helper functions for row conversion

fn gift_with_recipient_from_row(row: &SqliteRow) -> Result<GiftWithRecipient, sqlx::Error> {
    let gift = Gift::from_row(row)?;
    Ok(GiftWithRecipient {
        recipient: RecipientSummary {
            id: gift.recipient_id.clone(),
            display_name: row.try_get("recipient_display_name")?,
            avatar_url: row.try_get("recipient_avatar_url")?,
        },
        gift,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use chrono::Duration;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        repo: Repository,
        campaign: Campaign,
        alice: User,
        bob: User,
        carol: User,
        _temp_dir: TempDir,
    }

    async fn fixture(budget: i64) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();
        let repo = Repository::new(pool);

        let admin = repo.ensure_user("admin@test.com", "Admin", true).await.unwrap();
        let alice = repo.ensure_user("alice@test.com", "Alice", false).await.unwrap();
        let bob = repo.ensure_user("bob@test.com", "Bob", false).await.unwrap();
        let carol = repo.ensure_user("carol@test.com", "Carol", false).await.unwrap();

        let now = Utc::now();
        let campaign = Campaign {
            id: uuid::Uuid::new_v4().to_string(),
            title: "Test".to_string(),
            description: None,
            budget_per_user: budget,
            open_date: now - Duration::days(1),
            close_date: now + Duration::days(1),
            created_by: admin.id.clone(),
            created_at: now,
        };
        repo.insert_campaign(&campaign).await.unwrap();
        for user in [&alice, &bob, &carol] {
            repo.add_participant(&campaign.id, &user.id).await.unwrap();
        }

        Fixture {
            repo,
            campaign,
            alice,
            bob,
            carol,
            _temp_dir: temp_dir,
        }
    }

    fn gift_to(recipient: &User, amount: i64) -> NewGift {
        NewGift {
            recipient_id: recipient.id.clone(),
            amount,
            comment: "Thanks!".to_string(),
        }
    }

    #[tokio::test]
    async fn test_budget_is_enforced_across_gifts() {
        let f = fixture(10_000).await;
        let now = Utc::now();

        f.repo
            .create_gift(&f.campaign.id, &f.alice.id, &gift_to(&f.bob, 6_000), now)
            .await
            .unwrap();

        let err = f
            .repo
            .create_gift(&f.campaign.id, &f.alice.id, &gift_to(&f.carol, 4_001), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(
            err.message(),
            "Amount exceeds remaining budget. You have $40.00 left."
        );

        // Exactly the remainder is fine.
        f.repo
            .create_gift(&f.campaign.id, &f.alice.id, &gift_to(&f.carol, 4_000), now)
            .await
            .unwrap();
        assert_eq!(
            f.repo.total_gifted(&f.campaign.id, &f.alice.id).await.unwrap(),
            10_000
        );
    }

    #[tokio::test]
    async fn test_update_excludes_edited_gift_from_budget() {
        let f = fixture(10_000).await;
        let now = Utc::now();

        let gift = f
            .repo
            .create_gift(&f.campaign.id, &f.alice.id, &gift_to(&f.bob, 9_000), now)
            .await
            .unwrap();

        let raised = UpdateGiftRequest {
            amount: Some(10_000),
            comment: None,
        };
        let updated = f
            .repo
            .update_gift(&f.campaign.id, &gift.gift.id, &f.alice.id, &raised, now)
            .await
            .unwrap();
        assert_eq!(updated.gift.amount, 10_000);
        assert_eq!(updated.gift.comment, "Thanks!");

        let too_much = UpdateGiftRequest {
            amount: Some(10_001),
            comment: None,
        };
        let err = f
            .repo
            .update_gift(&f.campaign.id, &gift.gift.id, &f.alice.id, &too_much, now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_concurrent_gifts_never_overdraw() {
        let f = fixture(10_000).await;
        let repo = Arc::new(f.repo.clone());
        let now = Utc::now();

        let mut handles = Vec::new();
        for i in 0..8 {
            let repo = Arc::clone(&repo);
            let campaign_id = f.campaign.id.clone();
            let giver_id = f.alice.id.clone();
            let recipient = if i % 2 == 0 { &f.bob } else { &f.carol };
            let gift = gift_to(recipient, 3_000);
            handles.push(tokio::spawn(async move {
                repo.create_gift(&campaign_id, &giver_id, &gift, now).await
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 3);
        assert_eq!(
            repo.total_gifted(&f.campaign.id, &f.alice.id).await.unwrap(),
            9_000
        );
    }

    #[tokio::test]
    async fn test_gift_gates() {
        let f = fixture(10_000).await;
        let now = Utc::now();

        let to_self = f
            .repo
            .create_gift(&f.campaign.id, &f.alice.id, &gift_to(&f.alice, 100), now)
            .await
            .unwrap_err();
        assert!(matches!(to_self, AppError::BadRequest(_)));

        let outsider = f
            .repo
            .ensure_user("dave@test.com", "Dave", false)
            .await
            .unwrap();
        let from_outsider = f
            .repo
            .create_gift(&f.campaign.id, &outsider.id, &gift_to(&f.bob, 100), now)
            .await
            .unwrap_err();
        assert!(matches!(from_outsider, AppError::Forbidden(_)));

        let to_outsider = f
            .repo
            .create_gift(&f.campaign.id, &f.alice.id, &gift_to(&outsider, 100), now)
            .await
            .unwrap_err();
        assert!(matches!(to_outsider, AppError::Forbidden(_)));

        let after_close = f
            .repo
            .create_gift(
                &f.campaign.id,
                &f.alice.id,
                &gift_to(&f.bob, 100),
                f.campaign.close_date + Duration::seconds(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(after_close, AppError::BadRequest(_)));

        let missing = f
            .repo
            .create_gift("no-such-campaign", &f.alice.id, &gift_to(&f.bob, 100), now)
            .await
            .unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_only_giver_can_delete() {
        let f = fixture(10_000).await;
        let now = Utc::now();

        let gift = f
            .repo
            .create_gift(&f.campaign.id, &f.alice.id, &gift_to(&f.bob, 500), now)
            .await
            .unwrap();

        let err = f
            .repo
            .delete_gift(&f.campaign.id, &gift.gift.id, &f.bob.id, now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        f.repo
            .delete_gift(&f.campaign.id, &gift.gift.id, &f.alice.id, now)
            .await
            .unwrap();
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM gifts WHERE id = ?")
            .bind(&gift.gift.id)
            .fetch_one(&f.repo.pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_import_upserts_users_and_skips_existing_participants() {
        let f = fixture(10_000).await;

        let rows = vec![
            ParticipantImport {
                email: "alice@test.com".to_string(),
                display_name: Some("Alice Renamed".to_string()),
            },
            ParticipantImport {
                email: "erin@test.com".to_string(),
                display_name: None,
            },
        ];
        let summary = f
            .repo
            .import_participants(&f.campaign.id, &rows)
            .await
            .unwrap();

        assert_eq!(summary.users_processed, 2);
        assert_eq!(summary.participants_added, 1);

        let alice = f.repo.get_user(&f.alice.id).await.unwrap().unwrap();
        assert_eq!(alice.display_name, "Alice Renamed");
        let erin = f
            .repo
            .get_user_by_email("ERIN@test.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(erin.display_name, "erin@test.com");
        assert!(f.repo.is_participant(&f.campaign.id, &erin.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_status_and_report() {
        let f = fixture(10_000).await;
        let now = Utc::now();

        f.repo
            .create_gift(&f.campaign.id, &f.alice.id, &gift_to(&f.bob, 2_500), now)
            .await
            .unwrap();
        f.repo
            .create_gift(&f.campaign.id, &f.alice.id, &gift_to(&f.carol, 1_500), now)
            .await
            .unwrap();
        f.repo
            .create_gift(&f.campaign.id, &f.bob.id, &gift_to(&f.alice, 1_000), now)
            .await
            .unwrap();

        let status = f.repo.campaign_status(&f.campaign).await.unwrap();
        let alice = status
            .participant_status
            .iter()
            .find(|p| p.user.id == f.alice.id)
            .unwrap();
        assert_eq!(alice.total_gifted, 4_000);
        assert_eq!(alice.gift_count, 2);
        assert_eq!(alice.remaining_budget, 6_000);
        let carol = status
            .participant_status
            .iter()
            .find(|p| p.user.id == f.carol.id)
            .unwrap();
        assert_eq!(carol.gift_count, 0);
        assert_eq!(carol.remaining_budget, 10_000);

        let report = f.repo.campaign_report(&f.campaign.id).await.unwrap();
        assert_eq!(report.total_participants, 3);
        assert_eq!(report.participants_who_gifted, 2);
        assert_eq!(report.total_amount_gifted, 5_000);
        assert_eq!(report.total_gifts_count, 3);
        assert_eq!(report.average_gift_amount, 1_667);
    }

    #[tokio::test]
    async fn test_received_gifts_newest_first() {
        let f = fixture(10_000).await;
        let now = Utc::now();

        f.repo
            .create_gift(&f.campaign.id, &f.alice.id, &gift_to(&f.carol, 100), now)
            .await
            .unwrap();
        f.repo
            .create_gift(
                &f.campaign.id,
                &f.bob.id,
                &gift_to(&f.carol, 200),
                now + Duration::seconds(5),
            )
            .await
            .unwrap();

        let received = f
            .repo
            .list_received_gifts(&f.campaign.id, &f.carol.id)
            .await
            .unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].amount, 200);
        assert_eq!(received[1].amount, 100);
    }
}
