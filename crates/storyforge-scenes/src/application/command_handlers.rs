//! Command handlers for the Scene Cache context.
//!
//! Every write goes through `SceneCacheRepository::store`, so a real scene is
//! written at most once per key and callers always get back the winning bytes.

use std::future::Future;

use storyforge_core::command::Command;
use storyforge_core::error::DomainError;
use storyforge_core::repository::SceneCacheRepository;
use storyforge_core::scene::{SceneCacheEntry, SceneContent, SceneWrite, StoredScene, validate_state_hash};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::commands::ReportSceneGenerated;

/// Handles the `ReportSceneGenerated` command.
///
/// Returns the canonical entry. When another worker stored a real scene for
/// the same key first, that scene is returned and the reported one dropped.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a blank hash or placeholder content,
/// `DomainError::NotFound` if the story does not exist, or the store's error.
#[instrument(skip_all, fields(story_id = %command.story_id, state_hash = %command.state_hash))]
pub async fn handle_report_scene_generated(
    command: &ReportSceneGenerated,
    repo: &dyn SceneCacheRepository,
) -> Result<StoredScene, DomainError> {
    info!(
        correlation_id = %command.correlation_id(),
        command_type = command.command_type(),
        "handling report_scene_generated command"
    );
    validate_state_hash(&command.state_hash)?;
    if command.content.is_placeholder() {
        return Err(DomainError::Validation(
            "generated scene must not be empty".to_owned(),
        ));
    }

    let stored = repo
        .store(command.story_id, &command.state_hash, &command.content)
        .await?;
    match stored.write {
        SceneWrite::KeptExisting => {
            info!(scene_id = %stored.entry.id, "scene already cached, keeping existing entry");
        }
        SceneWrite::Inserted | SceneWrite::ReplacedPlaceholder => {
            info!(scene_id = %stored.entry.id, write = ?stored.write, "scene cached");
        }
    }
    Ok(stored)
}

/// Records a placeholder for a scene whose generation has been queued. Has no
/// effect when any entry already exists for the key.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a blank hash, `DomainError::NotFound`
/// if the story does not exist, or the store's error.
#[instrument(skip(repo))]
pub async fn reserve_scene(
    story_id: Uuid,
    state_hash: &str,
    repo: &dyn SceneCacheRepository,
) -> Result<StoredScene, DomainError> {
    validate_state_hash(state_hash)?;
    repo.store(story_id, state_hash, &SceneContent::placeholder())
        .await
}

/// Returns the cached scene for `state_hash`, running `generator` on a miss.
///
/// A placeholder counts as a miss. The generated scene is stored once and the
/// canonical entry is returned, which may be a concurrent caller's scene.
///
/// # Errors
///
/// Returns the generator's error unchanged, `DomainError::Validation` if it
/// produced placeholder content, or the store's error.
#[instrument(skip(repo, generator))]
pub async fn get_or_generate<F, Fut>(
    story_id: Uuid,
    state_hash: &str,
    repo: &dyn SceneCacheRepository,
    generator: F,
) -> Result<SceneCacheEntry, DomainError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<SceneContent, DomainError>>,
{
    validate_state_hash(state_hash)?;
    match repo.find(story_id, state_hash).await {
        Ok(entry) if !entry.is_placeholder => {
            debug!(scene_id = %entry.id, "scene cache hit");
            return Ok(entry);
        }
        Ok(_) => debug!("scene reserved but not generated yet"),
        Err(DomainError::NotFound { .. }) => debug!("scene cache miss"),
        Err(e) => return Err(e),
    }

    let content = generator().await?;
    if content.is_placeholder() {
        return Err(DomainError::Validation(
            "generated scene must not be empty".to_owned(),
        ));
    }
    let stored = repo.store(story_id, state_hash, &content).await?;
    Ok(stored.entry)
}
