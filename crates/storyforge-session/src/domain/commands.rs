//! Commands for the Session context.

use storyforge_core::player::{GameStateChange, NarrativeState, NarrativeSummaries};
use uuid::Uuid;

/// Command to start a player's run through a story at the setup node.
#[derive(Debug, Clone)]
pub struct StartStory {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The player starting the story.
    pub player_id: Uuid,
    /// The story to start.
    pub story_id: Uuid,
    /// Narrative state of the setup node, used only if the node does not exist yet.
    pub initial_state: NarrativeState,
}

/// Command to move a game state through the per-player state machine.
#[derive(Debug, Clone)]
pub struct TransitionGameState {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The caller; must own the game state.
    pub player_id: Uuid,
    /// The game state to change.
    pub state_id: Uuid,
    /// The requested change.
    pub change: GameStateChange,
}

/// Command to record the narrative state a player reached after a scene.
#[derive(Debug, Clone)]
pub struct RecordSceneProgress {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The player who reached the state.
    pub player_id: Uuid,
    /// The story being played.
    pub story_id: Uuid,
    /// Hash of the node the player came from.
    pub previous_hash: String,
    /// Index of the scene that produced this state.
    pub scene_index: i32,
    /// The narrative variables after the scene.
    pub state: NarrativeState,
    /// Summaries produced with the scene.
    pub summaries: NarrativeSummaries,
}

/// Command to wipe a player's progress through a story.
#[derive(Debug, Clone)]
pub struct ResetProgress {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The player whose progress is wiped.
    pub player_id: Uuid,
    /// The story to reset.
    pub story_id: Uuid,
}

/// Command to delete a single game state.
#[derive(Debug, Clone)]
pub struct DeleteGameState {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The caller; must own the game state.
    pub player_id: Uuid,
    /// The game state to delete.
    pub state_id: Uuid,
}
