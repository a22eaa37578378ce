//! Periodic sweep scheduling.

use std::future::Future;
use std::sync::Arc;

use storyforge_core::clock::Clock;
use storyforge_core::deadline::with_deadline;
use storyforge_core::error::DomainError;
use storyforge_core::repository::{SweepReport, SweepRepository};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::config::SweeperConfig;
use crate::sweep::sweep;

/// Runs [`sweep`] on a fixed interval until shut down.
///
/// Passes never overlap: a pass that overruns the interval delays the next
/// tick instead of stacking up.
pub struct SweeperRunner {
    repo: Arc<dyn SweepRepository>,
    clock: Arc<dyn Clock>,
    config: SweeperConfig,
}

impl SweeperRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(repo: Arc<dyn SweepRepository>, clock: Arc<dyn Clock>, config: SweeperConfig) -> Self {
        Self {
            repo,
            clock,
            config,
        }
    }

    /// Runs one pass bounded by the configured deadline.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or `DomainError::TransientIo` if the pass
    /// does not finish before the deadline.
    pub async fn run_once(&self) -> Result<SweepReport, DomainError> {
        with_deadline(
            self.config.deadline,
            sweep(&*self.clock, &*self.repo, self.config.stale_threshold),
        )
        .await
    }

    /// Waits for the initial delay, then sweeps every interval until
    /// `shutdown` resolves. A failed pass is logged and the schedule
    /// continues. Returns the number of passes started.
    pub async fn run<S>(&self, shutdown: S) -> u64
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            interval_secs = self.config.interval.as_secs(),
            stale_threshold_secs = self.config.stale_threshold.as_secs(),
            initial_delay_secs = self.config.initial_delay.as_secs(),
            "sweeper started"
        );

        tokio::select! {
            () = &mut shutdown => {
                info!("sweeper stopped before first pass");
                return 0;
            }
            () = tokio::time::sleep(self.config.initial_delay) => {}
        }

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut passes = 0;
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    passes += 1;
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, retryable = e.is_retryable(), "sweep pass failed");
                    }
                }
            }
        }
        info!(passes, "sweeper stopped");
        passes
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use storyforge_core::repository::StoryRepository;
    use storyforge_core::story::{NewStory, StoryStatus};
    use storyforge_test_support::{FailingStore, FixedClock, InMemoryStore};
    use uuid::Uuid;

    use super::*;

    fn config(interval_ms: u64) -> SweeperConfig {
        SweeperConfig {
            interval: Duration::from_millis(interval_ms),
            stale_threshold: Duration::ZERO,
            initial_delay: Duration::ZERO,
            deadline: Duration::from_secs(1),
            run_migrations: false,
        }
    }

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()))
    }

    #[tokio::test]
    async fn test_run_once_fails_in_flight_story() {
        // Arrange
        let store = Arc::new(InMemoryStore::new(clock().0));
        let id = Uuid::new_v4();
        store
            .insert(&NewStory {
                id,
                owner_id: Uuid::new_v4(),
                config: vec![],
            })
            .await
            .unwrap();
        let runner = SweeperRunner::new(store.clone(), clock(), config(1000));

        // Act
        let report = runner.run_once().await.unwrap();

        // Assert
        assert_eq!(report.stories, 1);
        assert_eq!(store.story(id).unwrap().status, StoryStatus::Error);
    }

    #[tokio::test]
    async fn test_run_keeps_sweeping_after_failed_pass() {
        // Arrange
        let runner = SweeperRunner::new(Arc::new(FailingStore), clock(), config(10));

        // Act
        let passes = runner
            .run(tokio::time::sleep(Duration::from_millis(100)))
            .await;

        // Assert
        assert!(passes >= 2, "expected several passes, got {passes}");
    }

    #[tokio::test]
    async fn test_shutdown_during_initial_delay_skips_sweeping() {
        // Arrange
        let mut config = config(10);
        config.initial_delay = Duration::from_secs(60);
        let runner = SweeperRunner::new(Arc::new(FailingStore), clock(), config);

        // Act
        let passes = runner.run(std::future::ready(())).await;

        // Assert
        assert_eq!(passes, 0);
    }
}
