//! Player progress nodes and per-(player, story) game states.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::DomainError;

/// State hash reserved for the setup node every player starts from.
pub const INITIAL_STATE_HASH: &str = "initial";

/// Narrative variables hashed into a state identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeState {
    /// Numeric core stats (health, trust, ...).
    pub core_stats: BTreeMap<String, i64>,
    /// Free-form story variables. Keys starting with `_` are transient.
    pub story_variables: Map<String, Value>,
    /// Global flags. Flags starting with `_` are transient.
    pub global_flags: Vec<String>,
}

/// Summaries produced alongside a scene, carried into the next prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeSummaries {
    pub last_story_summary: Option<String>,
    pub last_future_direction: Option<String>,
    pub last_var_impact_summary: Option<String>,
    pub current_scene_summary: Option<String>,
}

/// A progress node to create or fetch by `(story_id, state_hash)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPlayerProgress {
    /// Player reaching the node; recorded only if the node is new.
    pub player_id: Uuid,
    pub story_id: Uuid,
    pub scene_index: i32,
    pub state_hash: String,
    pub state: NarrativeState,
    pub summaries: NarrativeSummaries,
}

impl NewPlayerProgress {
    /// The shared setup node at scene index 0.
    #[must_use]
    pub fn initial(player_id: Uuid, story_id: Uuid, state: NarrativeState) -> Self {
        Self {
            player_id,
            story_id,
            scene_index: 0,
            state_hash: INITIAL_STATE_HASH.to_owned(),
            state,
            summaries: NarrativeSummaries::default(),
        }
    }

    /// An empty node for `state_hash`.
    #[must_use]
    pub fn bare(player_id: Uuid, story_id: Uuid, state_hash: impl Into<String>) -> Self {
        Self {
            player_id,
            story_id,
            scene_index: 0,
            state_hash: state_hash.into(),
            state: NarrativeState::default(),
            summaries: NarrativeSummaries::default(),
        }
    }
}

/// A stored progress node, shared by every player that reached the same state.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerProgress {
    pub id: Uuid,
    /// The player who first reached this node.
    pub player_id: Uuid,
    pub story_id: Uuid,
    pub scene_index: i32,
    pub state_hash: String,
    pub state: NarrativeState,
    pub summaries: NarrativeSummaries,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where a player currently stands in a story.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestProgress {
    /// The progress node.
    pub progress: PlayerProgress,
    /// The game state pointing at it, or `None` when falling back to the setup node.
    pub game_state_id: Option<Uuid>,
}

/// Status of a single player's run through a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    Playing,
    GeneratingScene,
    GameOverPending,
    Completed,
    Error,
}

impl PlayerStatus {
    /// Every status.
    pub const ALL: [Self; 5] = [
        Self::Playing,
        Self::GeneratingScene,
        Self::GameOverPending,
        Self::Completed,
        Self::Error,
    ];

    /// Statuses that wait on a generation task and may be swept.
    pub const AWAITING_GENERATION: [Self; 2] = [Self::GeneratingScene, Self::GameOverPending];

    /// Database / wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Playing => "playing",
            Self::GeneratingScene => "generating_scene",
            Self::GameOverPending => "game_over_pending",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Whether a sweep may fail a row in this status.
    #[must_use]
    pub fn is_awaiting_generation(self) -> bool {
        Self::AWAITING_GENERATION.contains(&self)
    }

    /// Allowed moves of the per-player state machine.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        match (self, to) {
            (Self::Error, _) => false,
            (_, Self::Error)
            | (Self::Playing, Self::GeneratingScene | Self::GameOverPending)
            | (Self::GeneratingScene, Self::Playing)
            | (Self::GameOverPending, Self::Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayerStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::Validation(format!("unknown player status: {s}")))
    }
}

/// Classifies a guarded game-state write that found `actual` instead of the
/// expected status.
#[must_use]
pub fn rejected_game_state_write(
    state_id: Uuid,
    actual: PlayerStatus,
    requested: PlayerStatus,
) -> DomainError {
    if actual == PlayerStatus::Error {
        return DomainError::Stale(format!("game state {state_id} is in error"));
    }
    DomainError::invalid_transition(actual, requested)
}

/// Checks that an overwrite may move a stored game state from `stored` to
/// `requested`. Keeping the status is allowed; leaving `Error` never is.
///
/// # Errors
///
/// Returns `DomainError::Stale` if the stored row is in `Error`, or
/// `DomainError::InvalidTransition` for a move the state machine forbids.
pub fn check_game_state_overwrite(
    state_id: Uuid,
    stored: PlayerStatus,
    requested: PlayerStatus,
) -> Result<(), DomainError> {
    if stored != PlayerStatus::Error && (stored == requested || stored.can_transition_to(requested)) {
        return Ok(());
    }
    Err(rejected_game_state_write(state_id, stored, requested))
}

/// A change requested against a game state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameStateChange {
    /// The player made a choice; the next scene is being generated.
    BeginSceneGeneration,
    /// The next scene is available.
    SceneReached { scene_id: Uuid, progress_id: Uuid },
    /// The player hit an ending; the ending text is being generated.
    BeginGameOver,
    /// The ending is available.
    Complete { ending_text: String },
    /// Generation failed for this player.
    Fail { message: String },
}

impl GameStateChange {
    /// The status this change moves to.
    #[must_use]
    pub fn target(&self) -> PlayerStatus {
        match self {
            Self::BeginSceneGeneration => PlayerStatus::GeneratingScene,
            Self::SceneReached { .. } => PlayerStatus::Playing,
            Self::BeginGameOver => PlayerStatus::GameOverPending,
            Self::Complete { .. } => PlayerStatus::Completed,
            Self::Fail { .. } => PlayerStatus::Error,
        }
    }
}

/// A player's run through a story. A nil `id` marks a state not yet saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerGameState {
    pub id: Uuid,
    pub player_id: Uuid,
    pub story_id: Uuid,
    pub current_scene_id: Option<Uuid>,
    pub player_progress_id: Uuid,
    pub player_status: PlayerStatus,
    pub ending_text: Option<String>,
    pub error_details: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PlayerGameState {
    /// An unsaved state at `progress_id`, ready to play.
    #[must_use]
    pub fn start(player_id: Uuid, story_id: Uuid, progress_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::nil(),
            player_id,
            story_id,
            current_scene_id: None,
            player_progress_id: progress_id,
            player_status: PlayerStatus::Playing,
            ending_text: None,
            error_details: None,
            started_at: now,
            last_activity_at: now,
            completed_at: None,
        }
    }

    /// Whether this state has never been saved.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.id.is_nil()
    }

    /// Applies `change`, returning the updated state.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Stale` if the state is already in `Error`, or
    /// `DomainError::InvalidTransition` if the move is not allowed.
    pub fn apply(&self, change: GameStateChange, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let target = change.target();
        if self.player_status == PlayerStatus::Error {
            return Err(DomainError::Stale(format!(
                "game state {} is in error: {}",
                self.id,
                self.error_details.as_deref().unwrap_or("no details")
            )));
        }
        if !self.player_status.can_transition_to(target) {
            return Err(DomainError::invalid_transition(self.player_status, target));
        }

        let mut next = self.clone();
        next.player_status = target;
        next.last_activity_at = now;
        match change {
            GameStateChange::SceneReached {
                scene_id,
                progress_id,
            } => {
                next.current_scene_id = Some(scene_id);
                next.player_progress_id = progress_id;
                next.error_details = None;
            }
            GameStateChange::Complete { ending_text } => {
                next.ending_text = Some(ending_text);
                next.completed_at = Some(now);
            }
            GameStateChange::Fail { message } => next.error_details = Some(message),
            GameStateChange::BeginSceneGeneration | GameStateChange::BeginGameOver => {}
        }
        Ok(next)
    }
}
