use crate::errors::OtpError;
use crate::service::OtpService;
use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::{error, info, instrument};

pub struct CleanupService {
    service: Arc<OtpService>,
}

impl CleanupService {
    pub fn new(service: Arc<OtpService>) -> Self {
        Self { service }
    }

    /// Runs one sweep, deleting OTPs that fell out of the validity window.
    #[instrument(skip(self))]
    pub async fn run_cleanup(&self) -> Result<u64, OtpError> {
        info!("Starting scheduled cleanup job...");
        let removed = self.service.clear_expired().await?;
        info!(removed, "Cleanup job completed successfully.");
        Ok(removed)
    }

    /// Starts a background scheduler that runs the cleanup every `interval`.
    /// Runs forever; a failed sweep is logged and retried on the next tick.
    pub async fn start_scheduler(self: Arc<Self>, interval: Duration) {
        let mut timer = time::interval(interval);

        info!("Cleanup scheduler started with interval: {:?}", interval);

        loop {
            timer.tick().await;

            // Spawned so a slow sweep doesn't delay the next tick
            let service = self.clone();
            tokio::spawn(async move {
                if let Err(e) = service.run_cleanup().await {
                    error!("Cleanup job failed: {:?}", e);
                }
            });
        }
    }
}
