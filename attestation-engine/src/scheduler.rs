//! Periodic job scheduling
//!
//! Three independent cron jobs drive the service:
//! - Daily batch run at the configured local time
//! - Hourly reconciliation + health sweep
//! - Health probe every five minutes
//!
//! Jobs may overlap; a failing run is logged and the job waits for its next
//! tick. Shutdown is triggered by Ctrl-C.

use crate::config::ScheduleConfig;
use crate::error::{Error, Result};
use crate::service::AttestationService;
use crate::types::BatchStatus;
use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// Next local instant matching `hour:minute` strictly after `now`
pub fn next_daily_run<Tz: TimeZone>(
    now: DateTime<Tz>,
    hour: u32,
    minute: u32,
) -> Result<DateTime<Tz>> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| Error::Config(format!("Invalid time {:02}:{:02}", hour, minute)))?;
    let tz = now.timezone();

    let today = now.date_naive().and_time(time);
    let candidate = if today > now.naive_local() {
        today
    } else {
        now.date_naive()
            .checked_add_days(Days::new(1))
            .ok_or_else(|| Error::Config("Date out of range".to_string()))?
            .and_time(time)
    };

    tz.from_local_datetime(&candidate)
        .earliest()
        .ok_or_else(|| Error::Config(format!("{} does not exist in the local timezone", candidate)))
}

/// Cron-driven scheduler for the attestation service
pub struct AttestationScheduler {
    service: Arc<AttestationService>,
    schedule: ScheduleConfig,
}

impl std::fmt::Debug for AttestationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationScheduler")
            .field("schedule", &self.schedule)
            .finish()
    }
}

impl AttestationScheduler {
    /// Create a scheduler
    pub fn new(service: Arc<AttestationService>, schedule: ScheduleConfig) -> Self {
        Self { service, schedule }
    }

    /// Register all jobs and start ticking
    pub async fn start(&self) -> Result<JobScheduler> {
        let scheduler = JobScheduler::new().await?;

        // Job 1: daily batch
        let service = self.service.clone();
        let daily = Job::new_async_tz(self.schedule.daily_cron().as_str(), Local, move |_uuid, _lock| {
            let service = service.clone();
            Box::pin(async move {
                info!("Daily batch triggered");
                let result = service.run_batch(None).await;
                match result.status {
                    BatchStatus::Completed => info!(
                        batch_id = %result.batch_id,
                        total = result.total,
                        "Daily batch completed"
                    ),
                    status => error!(
                        batch_id = %result.batch_id,
                        status = %status,
                        failed = result.failed,
                        "Daily batch finished with failures"
                    ),
                }
            })
        })?;
        scheduler.add(daily).await?;

        // Job 2: reconciliation + health sweep
        let service = self.service.clone();
        let sweep = Job::new_async(self.schedule.monitor_cron.as_str(), move |_uuid, _lock| {
            let service = service.clone();
            Box::pin(async move {
                let report = service.run_monitoring().await;
                info!(
                    checked = report.reconciliation.checked,
                    confirmed = report.reconciliation.confirmed,
                    network_status = report.health.status.as_str(),
                    "Monitoring sweep finished"
                );
            })
        })?;
        scheduler.add(sweep).await?;

        // Job 3: health probe
        let service = self.service.clone();
        let probe = Job::new_async(self.schedule.health_check_cron.as_str(), move |_uuid, _lock| {
            let service = service.clone();
            Box::pin(async move {
                service.check_health().await;
            })
        })?;
        scheduler.add(probe).await?;

        scheduler.start().await?;

        match next_daily_run(
            Local::now(),
            self.schedule.execution_hour,
            self.schedule.execution_minute,
        ) {
            Ok(next) => info!(
                daily = %self.schedule.daily_cron(),
                monitor = %self.schedule.monitor_cron,
                health = %self.schedule.health_check_cron,
                next_batch = %next,
                "Scheduler started"
            ),
            Err(e) => warn!(error = %e, "Could not compute next batch time"),
        }

        Ok(scheduler)
    }

    /// Run until Ctrl-C, then stop all jobs
    pub async fn run_until_shutdown(self) -> Result<()> {
        let mut scheduler = self.start().await?;

        tokio::signal::ctrl_c().await?;
        info!("Shutdown requested");

        scheduler.shutdown().await?;
        info!("Scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_next_run_later_today() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let next = next_daily_run(now, 23, 59).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 0).unwrap());
    }

    #[test]
    fn test_next_run_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 0).unwrap();
        let next = next_daily_run(now, 23, 59).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 2, 23, 59, 0).unwrap());
    }

    #[test]
    fn test_invalid_time_rejected() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert!(next_daily_run(now, 24, 0).is_err());
    }

    #[test]
    fn test_cron_expressions_parse() {
        let schedule = ScheduleConfig::default();
        for cron in [
            schedule.daily_cron(),
            schedule.monitor_cron.clone(),
            schedule.health_check_cron.clone(),
        ] {
            assert!(
                Job::new_async(cron.as_str(), |_uuid, _lock| Box::pin(async {})).is_ok(),
                "cron '{}' should parse",
                cron
            );
        }
    }
}
