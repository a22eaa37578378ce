//! Query handlers for the Generation context.

use storyforge_core::error::DomainError;
use storyforge_core::repository::StoryRepository;
use storyforge_core::story::{Story, StoryStatusView};
use uuid::Uuid;

/// Returns the externally visible status of a story. The error message is
/// only populated while the story is in `Error`.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if the story does not exist.
pub async fn get_story_status(
    story_id: Uuid,
    repo: &dyn StoryRepository,
) -> Result<StoryStatusView, DomainError> {
    let story = repo.find(story_id).await?;
    Ok(story.status_view())
}

/// Returns a story with its artifacts and counters.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if the story does not exist.
pub async fn get_story(story_id: Uuid, repo: &dyn StoryRepository) -> Result<Story, DomainError> {
    repo.find(story_id).await
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use storyforge_core::story::{NewStory, StoryStatus};
    use storyforge_test_support::InMemoryStore;

    use super::*;

    fn store() -> InMemoryStore {
        InMemoryStore::new(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())
    }

    async fn insert(store: &InMemoryStore) -> Uuid {
        let id = Uuid::new_v4();
        store
            .insert(&NewStory {
                id,
                owner_id: Uuid::new_v4(),
                config: b"cfg".to_vec(),
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_status_of_in_flight_story_has_no_message() {
        // Arrange
        let store = store();
        let id = insert(&store).await;

        // Act
        let view = get_story_status(id, &store).await.unwrap();

        // Assert
        assert_eq!(view.status, StoryStatus::ModerationPending);
        assert_eq!(view.error_message, None);
    }

    #[tokio::test]
    async fn test_status_of_failed_story_carries_message() {
        // Arrange
        let store = store();
        let id = insert(&store).await;
        store.fail(id, "setup worker crashed").await.unwrap();

        // Act
        let view = get_story_status(id, &store).await.unwrap();

        // Assert
        assert_eq!(view.status, StoryStatus::Error);
        assert_eq!(view.error_message.as_deref(), Some("setup worker crashed"));
    }

    #[tokio::test]
    async fn test_get_story_returns_config() {
        // Arrange
        let store = store();
        let id = insert(&store).await;

        // Act
        let story = get_story(id, &store).await.unwrap();

        // Assert
        assert_eq!(story.config, b"cfg".to_vec());
    }

    #[tokio::test]
    async fn test_missing_story_is_not_found() {
        // Arrange
        let store = store();

        // Act
        let result = get_story_status(Uuid::new_v4(), &store).await;

        // Assert
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }
}
