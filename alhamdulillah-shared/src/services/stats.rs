//! Dashboard statistics

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::error::ServiceResult;
use crate::models::payment::{MonthlyTotal, PaymentFilter, PaymentSortField, PaymentStatus};
use crate::models::project::{ProjectStatus, StatusCount};
use crate::models::user::{User, UserFilter};
use crate::pagination::{PageRequest, SortOrder};
use crate::store::Store;

const RECENT_DONATIONS: u32 = 5;

/// Months covered by `monthlyStats`, the current one included
const MONTHS_OF_HISTORY: u32 = 12;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentDonation {
    pub id: Uuid,
    pub amount: i64,
    pub donor_name: Option<String>,
    pub purpose: &'static str,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_projects: i64,
    pub active_projects: i64,
    pub total_raised: i64,
    pub my_investments: i64,
    pub current_balance: i64,
    pub monthly_stats: Vec<MonthlyTotal>,
    pub recent_donations: Vec<RecentDonation>,
    pub project_distribution: Vec<StatusCount>,
}

/// Start of the month `MONTHS_OF_HISTORY - 1` months before `now`
fn history_start(now: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|first| first.checked_sub_months(Months::new(MONTHS_OF_HISTORY - 1)))
        .and_then(|start| start.and_hms_opt(0, 0, 0))
        .map(|start| start.and_utc())
        .unwrap_or(now)
}

pub async fn dashboard(store: &dyn Store, actor: &User) -> ServiceResult<DashboardStats> {
    let total_users = store
        .list_users(&UserFilter::default(), PageRequest::new(None, Some(1), 1))
        .await?
        .meta
        .total;

    let project_distribution = store.count_projects_by_status().await?;
    let total_projects = project_distribution.iter().map(|c| c.count).sum();
    let active_projects = project_distribution
        .iter()
        .filter(|c| c.status == ProjectStatus::Ongoing)
        .map(|c| c.count)
        .sum();

    let recent = store
        .list_payments(
            &PaymentFilter {
                status: Some(PaymentStatus::Paid),
                sort_by: PaymentSortField::PaidAt,
                sort_order: SortOrder::Desc,
                ..Default::default()
            },
            PageRequest::new(None, Some(RECENT_DONATIONS), RECENT_DONATIONS),
        )
        .await?;

    let mut recent_donations = Vec::with_capacity(recent.items.len());
    for payment in recent.items {
        let donor_name = store.find_user(payment.user_id).await?.map(|u| u.name);
        recent_donations.push(RecentDonation {
            id: payment.id,
            amount: payment.amount,
            donor_name,
            purpose: payment.purpose.as_str(),
            paid_at: payment.paid_at,
        });
    }

    Ok(DashboardStats {
        total_users,
        total_projects,
        active_projects,
        total_raised: store.total_paid(None).await?,
        my_investments: store.total_paid(Some(actor.id)).await?,
        current_balance: store.fund_summary().await?.current_balance,
        monthly_stats: store.monthly_paid(history_start(Utc::now())).await?,
        recent_donations,
        project_distribution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_history_starts_eleven_months_back() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 15, 30, 0).unwrap();
        assert_eq!(
            history_start(now),
            Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap()
        );

        let now = Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap();
        assert_eq!(
            history_start(now),
            Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap()
        );
    }
}
