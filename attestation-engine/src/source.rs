//! Daily alarm aggregation source

use crate::error::{Error, Result};
use crate::types::AlarmSummary;
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::{debug, info};

/// Yields per-device alarm aggregates for one calendar day
#[async_trait]
pub trait SummarySource: Send + Sync {
    /// Alarm count and max concentration per device, ordered by device id
    async fn fetch_daily_summaries(&self, date: NaiveDate) -> Result<Vec<AlarmSummary>>;
}

/// Aggregates raw alarm events stored in Postgres
#[derive(Debug, Clone)]
pub struct PgSummarySource {
    pool: PgPool,
}

impl PgSummarySource {
    /// Create a source over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SummarySource for PgSummarySource {
    async fn fetch_daily_summaries(&self, date: NaiveDate) -> Result<Vec<AlarmSummary>> {
        let start = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| Error::Source(format!("Invalid date {}", date)))?
            .and_utc();
        let end = date
            .checked_add_days(Days::new(1))
            .and_then(|next| next.and_hms_opt(0, 0, 0))
            .ok_or_else(|| Error::Source(format!("Date {} out of range", date)))?
            .and_utc();

        debug!(%date, "Querying daily alarm aggregates");

        let rows = sqlx::query(
            r#"
            SELECT device_id,
                   MAX(client_id) AS client_id,
                   COUNT(*) AS alarm_count,
                   MAX(concentration) AS max_concentration
            FROM alarm_events
            WHERE triggered_at >= $1 AND triggered_at < $2
            GROUP BY device_id
            ORDER BY device_id
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Source(format!("Aggregation query failed: {}", e)))?;

        let summaries = rows
            .iter()
            .map(|row| {
                let alarm_count: i64 = row.try_get("alarm_count")?;
                let max_concentration: Option<f64> = row.try_get("max_concentration")?;

                Ok(AlarmSummary {
                    device_id: row.try_get("device_id")?,
                    client_id: row.try_get("client_id")?,
                    alarm_count: u64::try_from(alarm_count).unwrap_or(0),
                    max_concentration: max_concentration.unwrap_or(0.0),
                    date,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| Error::Source(format!("Malformed aggregate row: {}", e)))?;

        info!(%date, devices = summaries.len(), "Daily alarm aggregates fetched");
        Ok(summaries)
    }
}
