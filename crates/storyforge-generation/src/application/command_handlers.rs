//! Command handlers for the Generation context.
//!
//! Stage-workers report through these handlers. Each one validates the report
//! against the stage graph and persists it with a single guarded write.

use storyforge_core::command::Command;
use storyforge_core::error::DomainError;
use storyforge_core::repository::StoryRepository;
use storyforge_core::story::{CounterOutcome, NewStory, Story, TaskDeltas};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::coordinator::apply_deltas_and_maybe_advance;
use crate::domain::commands::{
    CreateStory, DeleteStory, FailStory, ReportStageComplete, ReportTaskDelta,
};

/// Result of a stage completion report.
#[derive(Debug, Clone)]
pub struct StageCompletion {
    /// The story after the report, including any coordinator advance.
    pub story: Story,
    /// True when the new stage was a fan-out stage with nothing pending and
    /// the coordinator moved the story straight past it.
    pub advanced_by_coordinator: bool,
}

/// Handles the `CreateStory` command: inserts a story at the first stage.
///
/// # Errors
///
/// Returns `DomainError` if the insert fails.
#[instrument(skip_all, fields(owner_id = %command.owner_id))]
pub async fn handle_create_story(
    command: &CreateStory,
    repo: &dyn StoryRepository,
) -> Result<Story, DomainError> {
    info!(correlation_id = %command.correlation_id, "handling create_story command");
    let story = repo
        .insert(&NewStory {
            id: Uuid::new_v4(),
            owner_id: command.owner_id,
            config: command.config.clone(),
        })
        .await?;
    info!(story_id = %story.id, "story created");
    Ok(story)
}

/// Handles the `ReportStageComplete` command: stores the artifact and
/// advances the story one stage. When that stage is a fan-out stage, the
/// coordinator is invoked with zero deltas so a fan-out with nothing pending
/// does not stall.
///
/// Repeating a report whose fan-out is still open is safe: the artifact is
/// not rewritten and the coordinator check runs again. A worker whose first
/// attempt failed after the stage write can therefore retry it unchanged.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a malformed artifact,
/// `DomainError::InvalidTransition` if the story is not in the stage the
/// artifact completes, `DomainError::Stale` if it has already failed, or
/// `DomainError::NotFound` if it does not exist.
#[instrument(skip_all, fields(story_id = %command.story_id, stage = command.artifact.stage_name()))]
pub async fn handle_report_stage_complete(
    command: &ReportStageComplete,
    repo: &dyn StoryRepository,
) -> Result<StageCompletion, DomainError> {
    info!(
        correlation_id = %command.correlation_id(),
        command_type = command.command_type(),
        "handling report_stage_complete command"
    );
    command.artifact.validate()?;

    let mut story = repo
        .complete_stage(command.story_id, &command.artifact)
        .await?;

    let mut advanced_by_coordinator = false;
    let status = story.status;
    if let Some(completion) = status.next().filter(|_| status.is_fan_out()) {
        let outcome =
            apply_deltas_and_maybe_advance(repo, story.id, TaskDeltas::NONE, completion).await?;
        advanced_by_coordinator = outcome.all_complete;
        story.status = outcome.status;
        story.counters = outcome.counters;
    }

    Ok(StageCompletion {
        story,
        advanced_by_coordinator,
    })
}

/// Handles the `ReportTaskDelta` command by delegating to the coordinator.
///
/// # Errors
///
/// Returns `DomainError` from the coordinator.
#[instrument(skip_all, fields(story_id = %command.story_id))]
pub async fn handle_report_task_delta(
    command: &ReportTaskDelta,
    repo: &dyn StoryRepository,
) -> Result<CounterOutcome, DomainError> {
    info!(
        correlation_id = %command.correlation_id(),
        command_type = command.command_type(),
        "handling report_task_delta command"
    );
    apply_deltas_and_maybe_advance(repo, command.story_id, command.deltas, command.completion).await
}

/// Handles the `FailStory` command: moves the story to `Error`.
///
/// # Errors
///
/// Returns `DomainError::Stale` if the story is already in `Error`, or
/// `DomainError::NotFound`.
#[instrument(skip_all, fields(story_id = %command.story_id))]
pub async fn handle_fail_story(
    command: &FailStory,
    repo: &dyn StoryRepository,
) -> Result<Story, DomainError> {
    info!(correlation_id = %command.correlation_id(), "handling fail_story command");
    if command.message.trim().is_empty() {
        return Err(DomainError::Validation(
            "failure message must not be empty".to_owned(),
        ));
    }
    let story = repo.fail(command.story_id, &command.message).await?;
    warn!(error_details = %command.message, "story generation failed");
    Ok(story)
}

/// Handles the `DeleteStory` command.
///
/// # Errors
///
/// Returns `DomainError::Forbidden` if the caller does not own the story, or
/// `DomainError::NotFound`.
#[instrument(skip_all, fields(story_id = %command.story_id))]
pub async fn handle_delete_story(
    command: &DeleteStory,
    repo: &dyn StoryRepository,
) -> Result<(), DomainError> {
    info!(correlation_id = %command.correlation_id, "handling delete_story command");
    repo.delete(command.story_id, command.owner_id).await
}
