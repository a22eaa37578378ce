//! Command handlers for the Session context.
//!
//! Progress nodes are shared: two players reaching the same narrative state
//! land on the same node. Game states are per player and move through
//! `PlayerStatus` with a guarded write, so a state the sweeper has failed
//! cannot be resurrected by a late worker.

use storyforge_core::clock::Clock;
use storyforge_core::error::DomainError;
use storyforge_core::player::{INITIAL_STATE_HASH, NewPlayerProgress, PlayerGameState};
use storyforge_core::repository::{PlayerGameStateRepository, PlayerProgressRepository, ResetOutcome};
use storyforge_core::scene::validate_state_hash;
use storyforge_core::state_hash::compute_state_hash;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::commands::{
    DeleteGameState, RecordSceneProgress, ResetProgress, StartStory, TransitionGameState,
};

/// A progress node recorded for a narrative state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedProgress {
    /// The node id, shared with every player that reached the same state.
    pub progress_id: Uuid,
    /// The state hash the node is keyed by.
    pub state_hash: String,
}

fn validate_progress(progress: &NewPlayerProgress) -> Result<(), DomainError> {
    validate_state_hash(&progress.state_hash)?;
    if progress.scene_index < 0 {
        return Err(DomainError::Validation(format!(
            "scene index must be non-negative, got {}",
            progress.scene_index
        )));
    }
    Ok(())
}

/// Inserts a new game state (nil id) or overwrites an existing one.
///
/// # Errors
///
/// Returns `DomainError::Conflict` if the player already has a game state for
/// the story, `DomainError::NotFound` if an update targets a missing row,
/// `DomainError::Stale` if the stored row is in `Error`,
/// `DomainError::InvalidTransition` if the new status is not reachable from
/// the stored one, or the store's error.
#[instrument(skip_all, fields(state_id = %state.id, player_id = %state.player_id))]
pub async fn save_game_state(
    state: &PlayerGameState,
    clock: &dyn Clock,
    repo: &dyn PlayerGameStateRepository,
) -> Result<PlayerGameState, DomainError> {
    let saved = repo.save(state, clock.now()).await?;
    if state.is_new() {
        info!(state_id = %saved.id, "game state created");
    }
    Ok(saved)
}

/// Handles the `TransitionGameState` command.
///
/// # Errors
///
/// Returns `DomainError::Forbidden` if the caller does not own the state,
/// `DomainError::Stale` if the state is already in `Error` (for example after
/// a sweep), `DomainError::InvalidTransition` for a disallowed move, or
/// `DomainError::NotFound`.
#[instrument(skip_all, fields(state_id = %command.state_id, to = %command.change.target()))]
pub async fn handle_transition_game_state(
    command: &TransitionGameState,
    clock: &dyn Clock,
    repo: &dyn PlayerGameStateRepository,
) -> Result<PlayerGameState, DomainError> {
    info!(correlation_id = %command.correlation_id, "handling transition_game_state command");
    let current = repo.find(command.state_id).await?;
    if current.player_id != command.player_id {
        return Err(DomainError::Forbidden(format!(
            "game state {} is not owned by {}",
            command.state_id, command.player_id
        )));
    }

    let next = current.apply(command.change.clone(), clock.now())?;
    let saved = repo.update_guarded(&next, current.player_status).await?;
    info!(from = %current.player_status, to = %saved.player_status, "game state transitioned");
    Ok(saved)
}

/// Creates or fetches the node for `progress.state_hash`.
///
/// The reserved setup hash is rejected here; use [`upsert_initial`].
///
/// # Errors
///
/// Returns `DomainError::Validation` for a blank or reserved hash or a
/// negative scene index, or the store's error.
#[instrument(skip_all, fields(story_id = %progress.story_id, state_hash = %progress.state_hash))]
pub async fn upsert_by_hash(
    progress: &NewPlayerProgress,
    repo: &dyn PlayerProgressRepository,
) -> Result<Uuid, DomainError> {
    validate_progress(progress)?;
    if progress.state_hash == INITIAL_STATE_HASH {
        return Err(DomainError::Validation(format!(
            "state hash {INITIAL_STATE_HASH:?} is reserved for the setup node"
        )));
    }
    repo.upsert(progress).await
}

/// Creates or fetches the shared setup node of a story.
///
/// # Errors
///
/// Returns `DomainError::Validation` unless the hash is the reserved setup
/// hash, or the store's error.
#[instrument(skip_all, fields(story_id = %progress.story_id))]
pub async fn upsert_initial(
    progress: &NewPlayerProgress,
    repo: &dyn PlayerProgressRepository,
) -> Result<Uuid, DomainError> {
    validate_progress(progress)?;
    if progress.state_hash != INITIAL_STATE_HASH {
        return Err(DomainError::Validation(format!(
            "setup node must use the {INITIAL_STATE_HASH:?} hash, got {:?}",
            progress.state_hash
        )));
    }
    repo.upsert(progress).await
}

/// Returns the node id for `state_hash`, creating an empty node if needed.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a blank hash, or the store's error.
#[instrument(skip(repo))]
pub async fn get_or_create_progress(
    player_id: Uuid,
    story_id: Uuid,
    state_hash: &str,
    repo: &dyn PlayerProgressRepository,
) -> Result<Uuid, DomainError> {
    let progress = NewPlayerProgress::bare(player_id, story_id, state_hash);
    validate_progress(&progress)?;
    repo.upsert(&progress).await
}

/// Handles the `RecordSceneProgress` command: hashes the narrative state
/// together with the previous hash and stores the resulting node.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a blank previous hash or an
/// unserializable state, or the store's error.
#[instrument(skip_all, fields(story_id = %command.story_id, scene_index = command.scene_index))]
pub async fn handle_record_scene_progress(
    command: &RecordSceneProgress,
    repo: &dyn PlayerProgressRepository,
) -> Result<RecordedProgress, DomainError> {
    info!(correlation_id = %command.correlation_id, "handling record_scene_progress command");
    validate_state_hash(&command.previous_hash)?;
    let state_hash = compute_state_hash(&command.previous_hash, &command.state)?;

    let progress_id = upsert_by_hash(
        &NewPlayerProgress {
            player_id: command.player_id,
            story_id: command.story_id,
            scene_index: command.scene_index,
            state_hash: state_hash.clone(),
            state: command.state.clone(),
            summaries: command.summaries.clone(),
        },
        repo,
    )
    .await?;

    Ok(RecordedProgress {
        progress_id,
        state_hash,
    })
}

/// Handles the `StartStory` command: ensures the setup node exists and
/// creates the player's game state pointing at it.
///
/// # Errors
///
/// Returns `DomainError::Conflict` if the player already started the story,
/// `DomainError::NotFound` if the story does not exist, or the store's error.
#[instrument(skip_all, fields(player_id = %command.player_id, story_id = %command.story_id))]
pub async fn handle_start_story(
    command: &StartStory,
    clock: &dyn Clock,
    progress_repo: &dyn PlayerProgressRepository,
    state_repo: &dyn PlayerGameStateRepository,
) -> Result<PlayerGameState, DomainError> {
    info!(correlation_id = %command.correlation_id, "handling start_story command");
    let setup_node = upsert_initial(
        &NewPlayerProgress::initial(
            command.player_id,
            command.story_id,
            command.initial_state.clone(),
        ),
        progress_repo,
    )
    .await?;

    let now = clock.now();
    save_game_state(
        &PlayerGameState::start(command.player_id, command.story_id, setup_node, now),
        clock,
        state_repo,
    )
    .await
}

/// Handles the `ResetProgress` command.
///
/// # Errors
///
/// Returns the store's error. Nothing is deleted if it fails.
#[instrument(skip_all, fields(player_id = %command.player_id, story_id = %command.story_id))]
pub async fn handle_reset_progress(
    command: &ResetProgress,
    repo: &dyn PlayerProgressRepository,
) -> Result<ResetOutcome, DomainError> {
    info!(correlation_id = %command.correlation_id, "handling reset_progress command");
    let outcome = repo.reset_player(command.player_id, command.story_id).await?;
    info!(
        game_states = outcome.game_states,
        progress_nodes = outcome.progress_nodes,
        "player progress reset"
    );
    Ok(outcome)
}

/// Handles the `DeleteGameState` command.
///
/// # Errors
///
/// Returns `DomainError::Forbidden` on owner mismatch, or
/// `DomainError::NotFound`.
#[instrument(skip_all, fields(state_id = %command.state_id))]
pub async fn handle_delete_game_state(
    command: &DeleteGameState,
    repo: &dyn PlayerGameStateRepository,
) -> Result<(), DomainError> {
    info!(correlation_id = %command.correlation_id, "handling delete_game_state command");
    repo.delete(command.player_id, command.state_id).await
}
