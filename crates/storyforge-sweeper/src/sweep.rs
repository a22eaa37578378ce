//! A single sweep pass.

use std::time::Duration;

use storyforge_core::clock::Clock;
use storyforge_core::error::DomainError;
use storyforge_core::repository::{SweepReport, SweepRepository};
use tracing::{debug, instrument, warn};

/// Moves every story and game state that has sat in an in-flight status for
/// longer than `threshold` to `Error`. A zero threshold matches every
/// in-flight row. Running it again immediately finds nothing.
///
/// # Errors
///
/// Returns the store's error; nothing is retried.
#[instrument(skip(clock, repo), fields(threshold_secs = threshold.as_secs()))]
pub async fn sweep(
    clock: &dyn Clock,
    repo: &dyn SweepRepository,
    threshold: Duration,
) -> Result<SweepReport, DomainError> {
    let cutoff = clock.stale_cutoff(threshold);
    let report = repo.sweep(cutoff).await?;

    if report.total() > 0 {
        warn!(
            stories = report.stories,
            game_states = report.game_states,
            cutoff = ?cutoff,
            "stale records marked as error"
        );
    } else {
        debug!("no stale records");
    }
    Ok(report)
}
