//! Repository abstractions.
//!
//! Each trait has one PostgreSQL implementation in `storyforge-store` and one
//! in-memory implementation in `storyforge-test-support`. Every method is a
//! single statement or a single transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::DomainError;
use crate::player::{NewPlayerProgress, PlayerGameState, PlayerProgress, PlayerStatus};
use crate::scene::{SceneCacheEntry, SceneContent, StoredScene};
use crate::story::{CounterOutcome, NewStory, StageArtifact, Story, StoryStatus, TaskDeltas};

/// Repository for story generation records.
#[async_trait]
pub trait StoryRepository: Send + Sync {
    /// Insert a story at the first pipeline stage with zero counters.
    async fn insert(&self, story: &NewStory) -> Result<Story, DomainError>;

    /// Load a story by id.
    async fn find(&self, story_id: Uuid) -> Result<Story, DomainError>;

    /// Persist `artifact` and advance past the stage it completes.
    ///
    /// Guarded by the expected source status. When the guard fails the story
    /// is re-read: missing yields `NotFound`, `Error` yields `Stale`. A story
    /// already sitting in the fan-out stage this artifact opens is returned
    /// unchanged (see [`StageArtifact::is_recorded_fan_out`]); anything else
    /// yields `InvalidTransition` naming the stage the artifact completes.
    async fn complete_stage(
        &self,
        story_id: Uuid,
        artifact: &StageArtifact,
    ) -> Result<Story, DomainError>;

    /// Apply signed counter deltas (floored at zero) and, if every counter is
    /// drained while the story sits in `source`, move it to `completion`.
    async fn apply_deltas(
        &self,
        story_id: Uuid,
        deltas: TaskDeltas,
        source: StoryStatus,
        completion: StoryStatus,
    ) -> Result<CounterOutcome, DomainError>;

    /// Move a non-`Error` story to `Error` with `message`.
    async fn fail(&self, story_id: Uuid, message: &str) -> Result<Story, DomainError>;

    /// Delete a story owned by `owner_id`, cascading to its scenes and player data.
    async fn delete(&self, story_id: Uuid, owner_id: Uuid) -> Result<(), DomainError>;
}

/// Repository for the content-addressable scene cache.
#[async_trait]
pub trait SceneCacheRepository: Send + Sync {
    /// Look up the entry for a narrative state.
    async fn find(&self, story_id: Uuid, state_hash: &str) -> Result<SceneCacheEntry, DomainError>;

    /// Write `content` unless a real entry already exists, returning the
    /// canonical entry. A placeholder never replaces an existing entry.
    async fn store(
        &self,
        story_id: Uuid,
        state_hash: &str,
        content: &SceneContent,
    ) -> Result<StoredScene, DomainError>;

    /// Every entry for a story, oldest first.
    async fn list_for_story(&self, story_id: Uuid) -> Result<Vec<SceneCacheEntry>, DomainError>;
}

/// Counts removed by a player reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetOutcome {
    pub game_states: u64,
    pub progress_nodes: u64,
}

/// Repository for shared progress nodes.
#[async_trait]
pub trait PlayerProgressRepository: Send + Sync {
    /// Create the node for `(story_id, state_hash)` or touch the existing one.
    /// Returns the node id either way.
    async fn upsert(&self, progress: &NewPlayerProgress) -> Result<Uuid, DomainError>;

    /// Load a node by id.
    async fn find(&self, progress_id: Uuid) -> Result<PlayerProgress, DomainError>;

    /// Load a node by its state key.
    async fn find_by_hash(
        &self,
        story_id: Uuid,
        state_hash: &str,
    ) -> Result<PlayerProgress, DomainError>;

    /// In one transaction, delete the player's game states for the story and
    /// the non-initial nodes they created that nothing references any more.
    async fn reset_player(&self, player_id: Uuid, story_id: Uuid)
    -> Result<ResetOutcome, DomainError>;
}

/// Repository for per-(player, story) game states.
#[async_trait]
pub trait PlayerGameStateRepository: Send + Sync {
    /// Insert (nil id) or overwrite (non-nil id) a game state.
    ///
    /// Inserts get a fresh id and `started_at = last_activity_at = now`;
    /// updates keep `started_at` and set `last_activity_at = now`. An update
    /// is guarded on the stored status and must pass
    /// [`check_game_state_overwrite`](crate::player::check_game_state_overwrite).
    async fn save(
        &self,
        state: &PlayerGameState,
        now: DateTime<Utc>,
    ) -> Result<PlayerGameState, DomainError>;

    /// Load a game state by id.
    async fn find(&self, state_id: Uuid) -> Result<PlayerGameState, DomainError>;

    /// Overwrite `state` only if the stored status is still `expected`.
    async fn update_guarded(
        &self,
        state: &PlayerGameState,
        expected: PlayerStatus,
    ) -> Result<PlayerGameState, DomainError>;

    /// Delete a game state owned by `player_id`.
    async fn delete(&self, player_id: Uuid, state_id: Uuid) -> Result<(), DomainError>;

    /// The player's game states for a story, most recently active first.
    async fn list_for_player_story(
        &self,
        player_id: Uuid,
        story_id: Uuid,
    ) -> Result<Vec<PlayerGameState>, DomainError>;
}

/// Rows moved to `Error` by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub stories: u64,
    pub game_states: u64,
}

impl SweepReport {
    /// Total rows failed.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.stories + self.game_states
    }
}

/// Diagnostic stored on stories failed by a sweep.
pub const STALE_STORY_MESSAGE: &str = "Generation timed out or failed (marked as stale)";

/// Diagnostic stored on game states failed by a sweep.
pub const STALE_GAME_STATE_MESSAGE: &str =
    "Player state generation process timed out or got stuck.";

/// Repository for the stale-task sweep.
#[async_trait]
pub trait SweepRepository: Send + Sync {
    /// Fail every in-flight story and every game state awaiting generation
    /// last updated before `cutoff` (`None` matches all of them).
    async fn sweep(&self, cutoff: Option<DateTime<Utc>>) -> Result<SweepReport, DomainError>;
}
