//! Sample data for local development. Safe to run repeatedly.

use chrono::{TimeZone, Utc};

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::Campaign;

pub const SEED_CAMPAIGN_ID: &str = "00000000-0000-0000-0000-000000000001";

const USERS: [(&str, &str); 5] = [
    ("alice@example.com", "Alice Johnson"),
    ("bob@example.com", "Bob Smith"),
    ("carol@example.com", "Carol Williams"),
    ("dave@example.com", "Dave Brown"),
    ("eve@example.com", "Eve Davis"),
];

/// (giver, recipient, cents, comment). Indexes into [`USERS`]; `None` is the admin.
const GIFTS: [(usize, Option<usize>, i64, &str); 6] = [
    (0, Some(1), 2500, "Great teamwork on the Q1 project!"),
    (0, Some(2), 1500, "Thanks for helping with code reviews"),
    (1, Some(0), 3000, "Amazing presentation last week!"),
    (2, Some(3), 2000, "Thanks for mentoring me"),
    (3, Some(4), 1000, "Great debugging help!"),
    (4, None, 5000, "Outstanding leadership this quarter"),
];

pub async fn seed(repo: &Repository) -> Result<(), AppError> {
    let admin = repo
        .ensure_user("admin@example.com", "Admin User", true)
        .await?;

    let mut users = Vec::with_capacity(USERS.len());
    for (email, display_name) in USERS {
        users.push(repo.ensure_user(email, display_name, false).await?);
    }

    let open_date = Utc
        .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| AppError::Internal("Invalid seed open date".to_string()))?;
    let close_date = Utc
        .with_ymd_and_hms(2026, 3, 31, 23, 59, 59)
        .single()
        .ok_or_else(|| AppError::Internal("Invalid seed close date".to_string()))?;

    let campaign = Campaign {
        id: SEED_CAMPAIGN_ID.to_string(),
        title: "Q1 2026 Appreciation".to_string(),
        description: Some("Show your coworkers some love!".to_string()),
        budget_per_user: 50_000,
        open_date,
        close_date,
        created_by: admin.id.clone(),
        created_at: Utc::now(),
    };
    repo.insert_campaign(&campaign).await?;

    for user in std::iter::once(&admin).chain(users.iter()) {
        repo.add_participant(&campaign.id, &user.id).await?;
    }

    let mut inserted = 0;
    for (giver, recipient, amount, comment) in GIFTS {
        let recipient = recipient.map_or(&admin, |i| &users[i]);
        if repo
            .ensure_gift(&campaign.id, &users[giver].id, &recipient.id, amount, comment)
            .await?
        {
            inserted += 1;
        }
    }

    tracing::info!(
        users = users.len() + 1,
        campaign_id = SEED_CAMPAIGN_ID,
        gifts_inserted = inserted,
        "Seed data applied"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();
        let repo = Repository::new(pool);

        seed(&repo).await.unwrap();
        seed(&repo).await.unwrap();

        let report = repo.campaign_report(SEED_CAMPAIGN_ID).await.unwrap();
        assert_eq!(report.total_participants, 6);
        assert_eq!(report.total_gifts_count, 6);
        assert_eq!(report.participants_who_gifted, 5);
        assert_eq!(report.total_amount_gifted, 15_000);

        let admin = repo
            .get_user_by_email("admin@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(admin.is_admin);
    }
}
