use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use super::image_upgrade::ImageUpgrader;
use super::import::Importer;
use crate::config::SchedulerConfig;

/// Periodic catalog maintenance: current-season refresh and image sweep.
pub struct Scheduler {
    importer: Importer,
    images: ImageUpgrader,
    config: SchedulerConfig,
    running: Arc<RwLock<bool>>,
}

/// Outcome of [`Scheduler::run_once`]; `None` marks a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub season_processed: Option<usize>,
    pub images_queued: Option<usize>,
}

/// Logs start, finish and failure of one job run.
async fn run_job<F>(job_name: &'static str, job: F) -> Option<usize>
where
    F: Future<Output = Result<usize>>,
{
    let start = std::time::Instant::now();
    info!(event = "job_started", job_name, "Starting scheduled job");

    match job.await {
        Ok(processed) => {
            info!(
                event = "job_finished",
                job_name,
                processed,
                duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Scheduled job finished"
            );
            Some(processed)
        }
        Err(e) => {
            error!(event = "job_failed", job_name, error = %e, "Scheduled job failed");
            None
        }
    }
}

impl Scheduler {
    pub fn new(importer: Importer, images: ImageUpgrader, config: SchedulerConfig) -> Self {
        Self {
            importer,
            images,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Runs until [`stop`](Self::stop) is called. Returns at once when disabled.
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Scheduler is disabled in config");
            return Ok(());
        }

        *self.running.write().await = true;
        info!("Starting background scheduler");

        let mut sched = JobScheduler::new().await?;

        let importer = self.importer.clone();
        let running = Arc::clone(&self.running);
        let season_job = Job::new_async(self.config.season_update_cron.as_str(), move |_uuid, _lock| {
            let importer = importer.clone();
            let running = Arc::clone(&running);
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                run_job("update_season", async {
                    Ok(importer.update_current_season().await?)
                })
                .await;
            })
        })?;

        let images = self.images.clone();
        let running = Arc::clone(&self.running);
        let limit = self.config.image_sweep_limit;
        let sweep_job = Job::new_async(self.config.image_sweep_cron.as_str(), move |_uuid, _lock| {
            let images = images.clone();
            let running = Arc::clone(&running);
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                run_job("image_sweep", async { Ok(images.sweep(limit).await?) }).await;
            })
        })?;

        sched.add(season_job).await?;
        sched.add(sweep_job).await?;
        sched.start().await?;

        info!("Season update scheduled: {}", self.config.season_update_cron);
        info!("Image sweep scheduled: {}", self.config.image_sweep_cron);

        loop {
            if !*self.running.read().await {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        sched.shutdown().await?;
        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping scheduler...");
        *self.running.write().await = false;
    }

    /// Runs both jobs once, in order, outside the cron schedule.
    pub async fn run_once(&self) -> MaintenanceReport {
        let season_processed = run_job("update_season", async {
            Ok(self.importer.update_current_season().await?)
        })
        .await;
        let limit = self.config.image_sweep_limit;
        let images_queued =
            run_job("image_sweep", async { Ok(self.images.sweep(limit).await?) }).await;

        MaintenanceReport {
            season_processed,
            images_queued,
        }
    }
}
