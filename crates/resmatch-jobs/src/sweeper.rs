//! Periodic eviction of finished jobs.
//!
//! Terminal jobs and their results are removed once they have been finished
//! for longer than the retention window. Queued and processing jobs are never
//! touched. Removal closes the job's progress channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use resmatch_core::defaults;

use crate::store::JobStore;

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How long terminal jobs are kept, in seconds.
    pub retention_secs: u64,
    /// Time between sweeps, in seconds.
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            retention_secs: defaults::JOB_RETENTION_SECS,
            interval_secs: defaults::SWEEP_INTERVAL_SECS,
        }
    }
}

impl SweeperConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_RETENTION_SECS` | `3600` | Retention after a job finishes |
    /// | `SWEEP_INTERVAL_SECS` | `300` | Time between sweeps |
    pub fn from_env() -> Self {
        let retention_secs = std::env::var("JOB_RETENTION_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_RETENTION_SECS);
        let interval_secs = std::env::var("SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::SWEEP_INTERVAL_SECS)
            .max(1);
        Self {
            retention_secs,
            interval_secs,
        }
    }

    pub fn with_retention_secs(mut self, secs: u64) -> Self {
        self.retention_secs = secs;
        self
    }

    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs.max(1);
        self
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(store: Arc<JobStore>, config: SweeperConfig, cancel: CancellationToken) {
    tracing::info!(
        retention_secs = config.retention_secs,
        interval_secs = config.interval_secs,
        "Job expiry sweeper started"
    );

    let mut interval = tokio::time::interval(config.interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job expiry sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                let purged = store.sweep(config.retention());
                if purged > 0 {
                    tracing::info!(purged, remaining = store.len(), "Job sweeper: purged expired jobs");
                } else {
                    tracing::debug!("Job sweeper: nothing to purge");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ProgressBroadcaster;
    use resmatch_core::{ArtifactRef, JobInput, JobResult, MatchResult};

    #[test]
    fn test_sweeper_config_default() {
        let config = SweeperConfig::default();
        assert_eq!(config.retention(), Duration::from_secs(3600));
        assert_eq!(config.interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_sweeper_config_interval_is_at_least_one_second() {
        assert_eq!(SweeperConfig::default().with_interval_secs(0).interval_secs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_purges_after_retention_and_stops_on_cancel() {
        let store = Arc::new(JobStore::new(Arc::new(ProgressBroadcaster::default())));
        let id = store
            .create(&JobInput::single(ArtifactRef::new("k", "cv.txt"), "jd"))
            .id;
        store.mark_processing(id).unwrap();
        store
            .complete(
                id,
                JobResult::Single {
                    result: MatchResult::failed("cv.txt", "x"),
                },
            )
            .unwrap();

        let config = SweeperConfig::default()
            .with_retention_secs(60)
            .with_interval_secs(30);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(store.clone(), config, cancel.clone()));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(store.get(id).is_some());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(store.get(id).is_none());

        cancel.cancel();
        task.await.unwrap();
    }
}
