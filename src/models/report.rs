//! Admin reporting and import result types.

use serde::Serialize;

/// Aggregate participation figures for one campaign.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignReport {
    pub total_participants: i64,
    pub participants_who_gifted: i64,
    /// Fraction in `[0, 1]`; 0 when the campaign has no participants
    pub participation_rate: f64,
    pub total_amount_gifted: i64,
    /// Mean gift in cents, rounded to the nearest cent
    pub average_gift_amount: i64,
    pub total_gifts_count: i64,
}

impl CampaignReport {
    pub fn new(
        total_participants: i64,
        participants_who_gifted: i64,
        total_amount_gifted: i64,
        total_gifts_count: i64,
    ) -> Self {
        let participation_rate = if total_participants > 0 {
            participants_who_gifted as f64 / total_participants as f64
        } else {
            0.0
        };
        let average_gift_amount = if total_gifts_count > 0 {
            (total_amount_gifted as f64 / total_gifts_count as f64).round() as i64
        } else {
            0
        };

        Self {
            total_participants,
            participants_who_gifted,
            participation_rate,
            total_amount_gifted,
            average_gift_amount,
            total_gifts_count,
        }
    }
}

/// Outcome of a participant CSV import.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub users_processed: usize,
    pub participants_added: usize,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_rates() {
        let report = CampaignReport::new(4, 3, 1000, 3);
        assert_eq!(report.participation_rate, 0.75);
        assert_eq!(report.average_gift_amount, 333);
    }

    #[test]
    fn test_report_empty_campaign() {
        let report = CampaignReport::new(0, 0, 0, 0);
        assert_eq!(report.participation_rate, 0.0);
        assert_eq!(report.average_gift_amount, 0);
    }

    #[test]
    fn test_report_average_rounds_half_up() {
        let report = CampaignReport::new(2, 2, 5, 2);
        assert_eq!(report.average_gift_amount, 3);
    }
}
