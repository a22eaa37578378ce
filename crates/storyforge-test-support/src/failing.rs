//! A store whose every call fails with a transient I/O error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use storyforge_core::error::DomainError;
use storyforge_core::player::{NewPlayerProgress, PlayerGameState, PlayerProgress, PlayerStatus};
use storyforge_core::repository::{
    PlayerGameStateRepository, PlayerProgressRepository, ResetOutcome, SceneCacheRepository,
    StoryRepository, SweepReport, SweepRepository,
};
use storyforge_core::scene::{SceneCacheEntry, SceneContent, StoredScene};
use storyforge_core::story::{
    CounterOutcome, NewStory, StageArtifact, Story, StoryStatus, TaskDeltas,
};
use uuid::Uuid;

/// Implements every repository trait by returning
/// `DomainError::TransientIo`. Useful for testing error propagation.
#[derive(Debug)]
pub struct FailingStore;

fn refused<T>() -> Result<T, DomainError> {
    Err(DomainError::TransientIo("connection refused".into()))
}

#[async_trait]
impl StoryRepository for FailingStore {
    async fn insert(&self, _story: &NewStory) -> Result<Story, DomainError> {
        refused()
    }

    async fn find(&self, _story_id: Uuid) -> Result<Story, DomainError> {
        refused()
    }

    async fn complete_stage(
        &self,
        _story_id: Uuid,
        _artifact: &StageArtifact,
    ) -> Result<Story, DomainError> {
        refused()
    }

    async fn apply_deltas(
        &self,
        _story_id: Uuid,
        _deltas: TaskDeltas,
        _source: StoryStatus,
        _completion: StoryStatus,
    ) -> Result<CounterOutcome, DomainError> {
        refused()
    }

    async fn fail(&self, _story_id: Uuid, _message: &str) -> Result<Story, DomainError> {
        refused()
    }

    async fn delete(&self, _story_id: Uuid, _owner_id: Uuid) -> Result<(), DomainError> {
        refused()
    }
}

#[async_trait]
impl SceneCacheRepository for FailingStore {
    async fn find(&self, _story_id: Uuid, _state_hash: &str) -> Result<SceneCacheEntry, DomainError> {
        refused()
    }

    async fn store(
        &self,
        _story_id: Uuid,
        _state_hash: &str,
        _content: &SceneContent,
    ) -> Result<StoredScene, DomainError> {
        refused()
    }

    async fn list_for_story(&self, _story_id: Uuid) -> Result<Vec<SceneCacheEntry>, DomainError> {
        refused()
    }
}

#[async_trait]
impl PlayerProgressRepository for FailingStore {
    async fn upsert(&self, _progress: &NewPlayerProgress) -> Result<Uuid, DomainError> {
        refused()
    }

    async fn find(&self, _progress_id: Uuid) -> Result<PlayerProgress, DomainError> {
        refused()
    }

    async fn find_by_hash(
        &self,
        _story_id: Uuid,
        _state_hash: &str,
    ) -> Result<PlayerProgress, DomainError> {
        refused()
    }

    async fn reset_player(
        &self,
        _player_id: Uuid,
        _story_id: Uuid,
    ) -> Result<ResetOutcome, DomainError> {
        refused()
    }
}

#[async_trait]
impl PlayerGameStateRepository for FailingStore {
    async fn save(
        &self,
        _state: &PlayerGameState,
        _now: DateTime<Utc>,
    ) -> Result<PlayerGameState, DomainError> {
        refused()
    }

    async fn find(&self, _state_id: Uuid) -> Result<PlayerGameState, DomainError> {
        refused()
    }

    async fn update_guarded(
        &self,
        _state: &PlayerGameState,
        _expected: PlayerStatus,
    ) -> Result<PlayerGameState, DomainError> {
        refused()
    }

    async fn delete(&self, _player_id: Uuid, _state_id: Uuid) -> Result<(), DomainError> {
        refused()
    }

    async fn list_for_player_story(
        &self,
        _player_id: Uuid,
        _story_id: Uuid,
    ) -> Result<Vec<PlayerGameState>, DomainError> {
        refused()
    }
}

#[async_trait]
impl SweepRepository for FailingStore {
    async fn sweep(&self, _cutoff: Option<DateTime<Utc>>) -> Result<SweepReport, DomainError> {
        refused()
    }
}
