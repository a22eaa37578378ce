//! Task counter coordinator.
//!
//! The only writer allowed to move a story out of a fan-out stage. Each call
//! is a single conditional update in the store, so concurrent reports from
//! many subtask workers drain the counters without lost updates and exactly
//! one of them observes `all_complete`.

use storyforge_core::error::DomainError;
use storyforge_core::repository::StoryRepository;
use storyforge_core::story::{CounterOutcome, StoryStatus, TaskDeltas};
use tracing::{info, instrument};
use uuid::Uuid;

/// Applies `deltas` to the story's pending-task counters and, once every
/// counter has drained while the story sits in the fan-out stage preceding
/// `completion`, moves it to `completion`.
///
/// # Errors
///
/// Returns `DomainError::InvalidTransition` if `completion` is not the target
/// of a coordinator-owned edge, `DomainError::NotFound` for a missing story,
/// or the store's error.
#[instrument(skip_all, fields(story_id = %story_id, completion = %completion, deltas = ?deltas))]
pub async fn apply_deltas_and_maybe_advance(
    repo: &dyn StoryRepository,
    story_id: Uuid,
    deltas: TaskDeltas,
    completion: StoryStatus,
) -> Result<CounterOutcome, DomainError> {
    let source = StoryStatus::coordinated_source(completion)
        .ok_or_else(|| DomainError::invalid_transition("fan-out stage", completion))?;

    let outcome = repo
        .apply_deltas(story_id, deltas, source, completion)
        .await?;

    if outcome.all_complete {
        info!(from = %source, to = %completion, "fan-out drained, story advanced");
    }
    Ok(outcome)
}
