//! Query handlers for the Session context.

use storyforge_core::error::DomainError;
use storyforge_core::player::{INITIAL_STATE_HASH, LatestProgress, PlayerGameState};
use storyforge_core::repository::{PlayerGameStateRepository, PlayerProgressRepository};
use tracing::debug;
use uuid::Uuid;

/// Returns the node a player currently stands on.
///
/// Follows the most recently active game state. A player who never started
/// the story gets the shared setup node with no game state.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if the player has no game state and the
/// story has no setup node.
pub async fn get_latest(
    player_id: Uuid,
    story_id: Uuid,
    progress_repo: &dyn PlayerProgressRepository,
    state_repo: &dyn PlayerGameStateRepository,
) -> Result<LatestProgress, DomainError> {
    let states = state_repo.list_for_player_story(player_id, story_id).await?;
    if let Some(state) = states.first() {
        let progress = progress_repo.find(state.player_progress_id).await?;
        return Ok(LatestProgress {
            progress,
            game_state_id: Some(state.id),
        });
    }

    debug!(%player_id, %story_id, "no game state, falling back to setup node");
    let progress = progress_repo
        .find_by_hash(story_id, INITIAL_STATE_HASH)
        .await?;
    Ok(LatestProgress {
        progress,
        game_state_id: None,
    })
}

/// Returns a player's game states for a story, most recently active first.
///
/// # Errors
///
/// Returns the store's error.
pub async fn list_game_states(
    player_id: Uuid,
    story_id: Uuid,
    repo: &dyn PlayerGameStateRepository,
) -> Result<Vec<PlayerGameState>, DomainError> {
    repo.list_for_player_story(player_id, story_id).await
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use storyforge_core::player::{NarrativeState, NewPlayerProgress};
    use storyforge_core::repository::StoryRepository;
    use storyforge_core::story::NewStory;
    use storyforge_test_support::{FixedClock, InMemoryStore};

    use super::*;
    use crate::application::command_handlers::{get_or_create_progress, handle_start_story, save_game_state, upsert_initial};
    use crate::domain::commands::StartStory;

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())
    }

    async fn store_with_story() -> (InMemoryStore, Uuid) {
        let store = InMemoryStore::new(clock().0);
        let id = Uuid::new_v4();
        store
            .insert(&NewStory {
                id,
                owner_id: Uuid::new_v4(),
                config: vec![],
            })
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_latest_follows_game_state_pointer() {
        // Arrange
        let (store, story_id) = store_with_story().await;
        let player = Uuid::new_v4();
        let state = handle_start_story(
            &StartStory {
                correlation_id: Uuid::new_v4(),
                player_id: player,
                story_id,
                initial_state: NarrativeState::default(),
            },
            &clock(),
            &store,
            &store,
        )
        .await
        .unwrap();
        let node = get_or_create_progress(player, story_id, "h7", &store)
            .await
            .unwrap();
        let mut moved = state.clone();
        moved.player_progress_id = node;
        save_game_state(&moved, &clock(), &store).await.unwrap();

        // Act
        let latest = get_latest(player, story_id, &store, &store).await.unwrap();

        // Assert
        assert_eq!(latest.game_state_id, Some(state.id));
        assert_eq!(latest.progress.id, node);
        assert_eq!(latest.progress.state_hash, "h7");
    }

    #[tokio::test]
    async fn test_latest_falls_back_to_setup_node() {
        // Arrange
        let (store, story_id) = store_with_story().await;
        let setup = upsert_initial(
            &NewPlayerProgress::initial(Uuid::new_v4(), story_id, NarrativeState::default()),
            &store,
        )
        .await
        .unwrap();

        // Act
        let latest = get_latest(Uuid::new_v4(), story_id, &store, &store).await.unwrap();

        // Assert
        assert_eq!(latest.game_state_id, None);
        assert_eq!(latest.progress.id, setup);
        assert_eq!(latest.progress.scene_index, 0);
    }

    #[tokio::test]
    async fn test_latest_without_setup_node_is_not_found() {
        // Arrange
        let (store, story_id) = store_with_story().await;

        // Act
        let result = get_latest(Uuid::new_v4(), story_id, &store, &store).await;

        // Assert
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_game_states_is_scoped_to_player() {
        // Arrange
        let (store, story_id) = store_with_story().await;
        let player = Uuid::new_v4();
        for player_id in [player, Uuid::new_v4()] {
            handle_start_story(
                &StartStory {
                    correlation_id: Uuid::new_v4(),
                    player_id,
                    story_id,
                    initial_state: NarrativeState::default(),
                },
                &clock(),
                &store,
                &store,
            )
            .await
            .unwrap();
        }

        // Act
        let states = list_game_states(player, story_id, &store).await.unwrap();

        // Assert
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].player_id, player);
    }
}
