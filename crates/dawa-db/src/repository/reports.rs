//! # Reports Repository
//!
//! Read-only aggregates for the dashboard.
//!
//! All aggregates count only `completed` sales: a pending M-Pesa sale
//! whose payment never lands is not revenue. Day boundaries are UTC and
//! computed in Rust as half-open `[start, end)` timestamp ranges bound
//! as parameters, so the SQL never parses dates.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::DbResult;

// =============================================================================
// Report Payloads
// =============================================================================

/// One day in the weekly sales series.
#[derive(Debug, Clone, Serialize)]
pub struct DailySales {
    /// ISO date (YYYY-MM-DD), UTC.
    pub date: String,
    pub total_cents: i64,
}

/// One entry in the weekly top-sellers list.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TopMedicine {
    /// Snapshot name from the sale items (survives catalog edits).
    pub medicine_name: String,
    pub total_qty: i64,
    pub total_revenue_cents: i64,
}

/// Revenue split by payment method, today.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentBreakdown {
    pub cash_cents: i64,
    pub mpesa_cents: i64,
    pub card_cents: i64,
}

/// Everything the dashboard shows in one payload.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_sales_today_cents: i64,
    pub total_transactions_today: i64,
    pub total_medicines: i64,
    pub low_stock_count: i64,
    pub expired_count: i64,
    /// Last 7 days including today, oldest first.
    pub sales_this_week: Vec<DailySales>,
    /// Top 5 by quantity over the last 7 days.
    pub top_medicines: Vec<TopMedicine>,
    pub payment_breakdown: PaymentBreakdown,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for dashboard aggregates.
#[derive(Debug, Clone)]
pub struct ReportsRepository {
    pool: SqlitePool,
}

impl ReportsRepository {
    /// Creates a new ReportsRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReportsRepository { pool }
    }

    /// Computes the full dashboard payload as of `now`.
    ///
    /// `now` is a parameter (not read from the clock) so tests can pin it.
    pub async fn dashboard_stats(&self, now: DateTime<Utc>) -> DbResult<DashboardStats> {
        let today = now.date_naive();
        let week_start = today - Duration::days(6);

        let (today_start, today_end) = day_bounds(today);

        let (total_sales_today_cents, total_transactions_today) =
            self.completed_totals(today_start, today_end).await?;

        // One bucket per day, like the dashboard renders it
        let mut sales_this_week = Vec::with_capacity(7);
        for i in 0..7 {
            let day = week_start + Duration::days(i);
            let (start, end) = day_bounds(day);
            let (total, _count) = self.completed_totals(start, end).await?;
            sales_this_week.push(DailySales {
                date: day.to_string(),
                total_cents: total,
            });
        }

        let total_medicines: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM medicines WHERE is_active = 1")
                .fetch_one(&self.pool)
                .await?;

        let low_stock_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM medicines WHERE is_active = 1 AND stock_quantity <= reorder_level",
        )
        .fetch_one(&self.pool)
        .await?;

        // expiry_date is stored as ISO text; comparing against an ISO
        // date string is chronologically correct
        let expired_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM medicines WHERE is_active = 1 AND expiry_date IS NOT NULL AND expiry_date < ?1",
        )
        .bind(today.to_string())
        .fetch_one(&self.pool)
        .await?;

        let (week_range_start, _) = day_bounds(week_start);
        let top_medicines = sqlx::query_as::<_, TopMedicine>(
            r#"
            SELECT si.medicine_name,
                   SUM(si.quantity) AS total_qty,
                   SUM(si.total_price_cents) AS total_revenue_cents
            FROM sale_items si
            JOIN sales s ON s.id = si.sale_id
            WHERE s.status = 'completed'
              AND s.created_at >= ?1 AND s.created_at < ?2
            GROUP BY si.medicine_name
            ORDER BY total_qty DESC
            LIMIT 5
            "#,
        )
        .bind(week_range_start)
        .bind(today_end)
        .fetch_all(&self.pool)
        .await?;

        let payment_breakdown = PaymentBreakdown {
            cash_cents: self.method_total("cash", today_start, today_end).await?,
            mpesa_cents: self.method_total("mpesa", today_start, today_end).await?,
            card_cents: self.method_total("card", today_start, today_end).await?,
        };

        Ok(DashboardStats {
            total_sales_today_cents,
            total_transactions_today,
            total_medicines,
            low_stock_count,
            expired_count,
            sales_this_week,
            top_medicines,
            payment_breakdown,
        })
    }

    /// Total cents and count of completed sales in `[start, end)`.
    async fn completed_totals(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<(i64, i64)> {
        let row: (Option<i64>, i64) = sqlx::query_as(
            r#"
            SELECT SUM(total_cents), COUNT(*)
            FROM sales
            WHERE status = 'completed' AND created_at >= ?1 AND created_at < ?2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok((row.0.unwrap_or(0), row.1))
    }

    async fn method_total(
        &self,
        method: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<i64> {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(total_cents)
            FROM sales
            WHERE status = 'completed' AND payment_method = ?1
              AND created_at >= ?2 AND created_at < ?3
            "#,
        )
        .bind(method)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(total.unwrap_or(0))
    }
}

/// UTC half-open bounds `[00:00, next day 00:00)` for a date.
fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc
        .with_ymd_and_hms(day.year(), day.month(), day.day(), 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    (start, start + Duration::days(1))
}

// =============================================================================
// Unit Tests
// =============================================================================
