//! Query handlers for the Scene Cache context.

use storyforge_core::error::DomainError;
use storyforge_core::repository::SceneCacheRepository;
use storyforge_core::scene::{SceneCacheEntry, validate_state_hash};
use tracing::debug;
use uuid::Uuid;

/// Looks up the scene cached for a narrative state. Reservations are returned
/// as-is; check `is_placeholder` before rendering.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if nothing is cached for the key.
pub async fn get_cached_scene(
    story_id: Uuid,
    state_hash: &str,
    repo: &dyn SceneCacheRepository,
) -> Result<SceneCacheEntry, DomainError> {
    validate_state_hash(state_hash)?;
    let entry = repo.find(story_id, state_hash).await?;
    debug!(scene_id = %entry.id, is_placeholder = entry.is_placeholder, "scene cache hit");
    Ok(entry)
}

/// Returns every scene cached for a story, oldest first.
///
/// # Errors
///
/// Returns the store's error.
pub async fn list_story_scenes(
    story_id: Uuid,
    repo: &dyn SceneCacheRepository,
) -> Result<Vec<SceneCacheEntry>, DomainError> {
    repo.list_for_story(story_id).await
}
