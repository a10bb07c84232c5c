use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::monitor::{Monitor, SweepReport};
use crate::utils::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub run_count: u64,
    pub skipped_runs: u64,
    pub failed_runs: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_items_checked: usize,
    pub last_notifications_sent: usize,
    pub uptime_seconds: u64,
}

/// Drives periodic sweeps of every tracked item.
pub struct SweepScheduler {
    scheduler: JobScheduler,
    monitor: Arc<Monitor>,
    interval: Duration,
    job_id: Option<Uuid>,
    stats: Arc<RwLock<SchedulerStats>>,
    start_time: DateTime<Utc>,
}

impl SweepScheduler {
    pub async fn new(monitor: Arc<Monitor>, interval: Duration) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            monitor,
            interval,
            job_id: None,
            stats: Arc::new(RwLock::new(SchedulerStats::default())),
            start_time: Utc::now(),
        })
    }

    /// Registers the repeated sweep job, starts the scheduler and kicks off
    /// a first sweep right away instead of waiting a full interval.
    pub async fn start(&mut self) -> Result<()> {
        let monitor = Arc::clone(&self.monitor);
        let stats = Arc::clone(&self.stats);

        let job = Job::new_repeated_async(self.interval, move |_uuid, _l| {
            let monitor = Arc::clone(&monitor);
            let stats = Arc::clone(&stats);
            Box::pin(async move {
                Self::execute_sweep(monitor, stats).await;
            })
        })?;

        self.job_id = Some(self.scheduler.add(job).await?);
        self.scheduler.start().await?;

        let monitor = Arc::clone(&self.monitor);
        let stats = Arc::clone(&self.stats);
        tokio::spawn(async move {
            Self::execute_sweep(monitor, stats).await;
        });

        tracing::info!("Sweep scheduler started, checking every {}s", self.interval.as_secs());
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(job_id) = self.job_id.take() {
            self.scheduler.remove(&job_id).await?;
        }
        self.scheduler.shutdown().await?;
        tracing::info!("Sweep scheduler shutdown");
        Ok(())
    }

    /// Runs a sweep immediately, waiting for one already in flight.
    pub async fn run_now(&self) -> Result<SweepReport> {
        tracing::info!("Running immediate sweep");
        let result = self.monitor.run_sweep().await;

        let mut stats = self.stats.write().await;
        Self::record(&mut stats, &result);
        result
    }

    pub async fn stats(&self) -> SchedulerStats {
        let mut stats = self.stats.read().await.clone();
        stats.uptime_seconds = Utc::now().signed_duration_since(self.start_time).num_seconds().max(0) as u64;
        stats
    }

    async fn execute_sweep(monitor: Arc<Monitor>, stats: Arc<RwLock<SchedulerStats>>) {
        match monitor.try_run_sweep().await {
            Some(result) => {
                if let Err(e) = &result {
                    tracing::error!("Scheduled sweep failed: {}", e);
                }
                let mut stats = stats.write().await;
                Self::record(&mut stats, &result);
            }
            None => {
                tracing::warn!("Previous sweep still running, skipping this tick");
                stats.write().await.skipped_runs += 1;
            }
        }
    }

    fn record(stats: &mut SchedulerStats, result: &Result<SweepReport>) {
        stats.run_count += 1;
        stats.last_run = Some(Utc::now());
        match result {
            Ok(report) => {
                stats.last_error = None;
                stats.last_items_checked = report.items_checked;
                stats.last_notifications_sent = report.notifications_sent;
            }
            Err(e) => {
                stats.failed_runs += 1;
                stats.last_error = Some(e.to_string());
            }
        }
    }
}
