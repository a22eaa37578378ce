//! Story generation records: the stage graph, pending-task counters and stage
//! artifacts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Generation stage of a story.
///
/// Stages are listed in pipeline order. `Ready` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    /// Waiting for the content moderation verdict.
    ModerationPending,
    /// Waiting for the protagonist goal to be planned.
    ProtagonistGoalPending,
    /// Waiting for the scene planner.
    ScenePlannerPending,
    /// Waiting for fanned-out character and card-image subtasks.
    SubTasksPending,
    /// Waiting for setup generation.
    SetupPending,
    /// Setup is done; waiting for the first scene.
    FirstScenePending,
    /// Waiting for outstanding image tasks.
    ImageGenerationPending,
    /// Waiting for the first scene's structured JSON.
    JsonGenerationPending,
    /// Final assembly of the playable story.
    InitialGeneration,
    /// Playable.
    Ready,
    /// Generation failed; carries a diagnostic message on the story.
    Error,
}

/// Who is allowed to perform a given status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOwner {
    /// The stage-worker that owns the source stage, via `report_stage_complete`.
    StageWorker,
    /// The task counter coordinator, once every pending counter has drained.
    Coordinator,
    /// Any failure path (stage-worker error report or the stale-task sweeper).
    Failure,
}

impl StoryStatus {
    /// Every status, in pipeline order.
    pub const ALL: [Self; 11] = [
        Self::ModerationPending,
        Self::ProtagonistGoalPending,
        Self::ScenePlannerPending,
        Self::SubTasksPending,
        Self::SetupPending,
        Self::FirstScenePending,
        Self::ImageGenerationPending,
        Self::JsonGenerationPending,
        Self::InitialGeneration,
        Self::Ready,
        Self::Error,
    ];

    /// The status a freshly created story starts in.
    pub const INITIAL: Self = Self::ModerationPending;

    /// Database / wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModerationPending => "moderation_pending",
            Self::ProtagonistGoalPending => "protagonist_goal_pending",
            Self::ScenePlannerPending => "scene_planner_pending",
            Self::SubTasksPending => "sub_tasks_pending",
            Self::SetupPending => "setup_pending",
            Self::FirstScenePending => "first_scene_pending",
            Self::ImageGenerationPending => "image_generation_pending",
            Self::JsonGenerationPending => "json_generation_pending",
            Self::InitialGeneration => "initial_generation",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }

    /// `Ready` and `Error` are terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Error)
    }

    /// Whether a stage-worker or the coordinator still owes this story work.
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        !self.is_terminal()
    }

    /// Statuses the stale-task sweeper may fail.
    #[must_use]
    pub fn in_flight() -> Vec<Self> {
        Self::ALL.into_iter().filter(|s| s.is_in_flight()).collect()
    }

    /// The forward successor in the stage graph.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::ModerationPending => Some(Self::ProtagonistGoalPending),
            Self::ProtagonistGoalPending => Some(Self::ScenePlannerPending),
            Self::ScenePlannerPending => Some(Self::SubTasksPending),
            Self::SubTasksPending => Some(Self::SetupPending),
            Self::SetupPending => Some(Self::FirstScenePending),
            Self::FirstScenePending => Some(Self::ImageGenerationPending),
            Self::ImageGenerationPending => Some(Self::JsonGenerationPending),
            Self::JsonGenerationPending => Some(Self::InitialGeneration),
            Self::InitialGeneration => Some(Self::Ready),
            Self::Ready | Self::Error => None,
        }
    }

    /// Stages whose exit is gated by the pending-task counters.
    #[must_use]
    pub fn is_fan_out(self) -> bool {
        matches!(self, Self::SubTasksPending | Self::ImageGenerationPending)
    }

    /// The transition table. `None` means the transition is illegal.
    #[must_use]
    pub fn transition_owner(self, to: Self) -> Option<TransitionOwner> {
        if to == Self::Error {
            return (self != Self::Error).then_some(TransitionOwner::Failure);
        }
        if self.next() != Some(to) {
            return None;
        }
        if self.is_fan_out() {
            Some(TransitionOwner::Coordinator)
        } else {
            Some(TransitionOwner::StageWorker)
        }
    }

    /// The fan-out stage whose coordinator-owned exit leads to `completion`.
    #[must_use]
    pub fn coordinated_source(completion: Self) -> Option<Self> {
        Self::ALL.into_iter().find(|from| {
            from.transition_owner(completion) == Some(TransitionOwner::Coordinator)
        })
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::Validation(format!("unknown story status: {s}")))
    }
}

/// The three pending-task counters gating fan-out stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounters {
    /// Outstanding character generation tasks.
    pub char_gen: i32,
    /// Outstanding card image tasks.
    pub card_img: i32,
    /// Outstanding character image tasks.
    pub char_img: i32,
}

impl TaskCounters {
    /// Creates counters from explicit values.
    #[must_use]
    pub fn new(char_gen: i32, card_img: i32, char_img: i32) -> Self {
        Self {
            char_gen,
            card_img,
            char_img,
        }
    }

    /// True once every counter is at or below zero.
    #[must_use]
    pub fn all_drained(self) -> bool {
        self.char_gen <= 0 && self.card_img <= 0 && self.char_img <= 0
    }

    /// Applies signed deltas, flooring each counter at zero.
    #[must_use]
    pub fn apply(self, deltas: TaskDeltas) -> Self {
        let step = |counter: i32, delta: i32| counter.saturating_add(delta).max(0);
        Self {
            char_gen: step(self.char_gen, deltas.char_gen),
            card_img: step(self.card_img, deltas.card_img),
            char_img: step(self.char_img, deltas.char_img),
        }
    }

    /// Rejects negative fan-out sizes.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if any counter is negative.
    pub fn validate_fan_out(self) -> Result<(), DomainError> {
        if self.char_gen < 0 || self.card_img < 0 || self.char_img < 0 {
            return Err(DomainError::Validation(format!(
                "fan-out counts must be non-negative, got {self:?}"
            )));
        }
        Ok(())
    }
}

/// Signed changes to the pending-task counters.
///
/// Negative values record finished subtasks, positive values record subtasks
/// spawned mid-flight. Both may be combined in one report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDeltas {
    /// Change to the character generation counter.
    pub char_gen: i32,
    /// Change to the card image counter.
    pub card_img: i32,
    /// Change to the character image counter.
    pub char_img: i32,
}

impl TaskDeltas {
    /// No change; used to re-evaluate the completion condition.
    pub const NONE: Self = Self {
        char_gen: 0,
        card_img: 0,
        char_img: 0,
    };

    /// Sets the character generation delta.
    #[must_use]
    pub fn char_gen(mut self, delta: i32) -> Self {
        self.char_gen = delta;
        self
    }

    /// Sets the card image delta.
    #[must_use]
    pub fn card_img(mut self, delta: i32) -> Self {
        self.card_img = delta;
        self
    }

    /// Sets the character image delta.
    #[must_use]
    pub fn char_img(mut self, delta: i32) -> Self {
        self.char_img = delta;
        self
    }
}

/// Result of one coordinator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterOutcome {
    /// Counters after the deltas were applied.
    pub counters: TaskCounters,
    /// Status after the call.
    pub status: StoryStatus,
    /// True only for the call that performed the completion transition.
    pub all_complete: bool,
}

/// Output of a stage-worker, persisted together with the status advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageArtifact {
    /// Moderation verdict.
    Moderation {
        /// Whether the story was classified as adult content.
        is_adult_content: bool,
    },
    /// Story config enriched with the protagonist goal.
    ProtagonistGoal {
        /// Opaque config payload replacing the stored config.
        config: Vec<u8>,
    },
    /// Scene plan plus the subtasks it fanned out.
    ScenePlan {
        /// Opaque plan payload.
        plan: Vec<u8>,
        /// Initial pending-task counters.
        fan_out: TaskCounters,
    },
    /// Generated setup plus the character image tasks it spawned.
    Setup {
        /// Opaque setup payload.
        setup: Vec<u8>,
        /// Character image tasks to add to the pending counter.
        character_images: i32,
    },
    /// The first scene landed in the scene cache.
    FirstScene,
    /// Structured JSON for the first scene is ready.
    SceneJson,
    /// Final assembly finished.
    Finalization,
}

impl StageArtifact {
    /// The stage this artifact completes.
    #[must_use]
    pub fn completes(&self) -> StoryStatus {
        match self {
            Self::Moderation { .. } => StoryStatus::ModerationPending,
            Self::ProtagonistGoal { .. } => StoryStatus::ProtagonistGoalPending,
            Self::ScenePlan { .. } => StoryStatus::ScenePlannerPending,
            Self::Setup { .. } => StoryStatus::SetupPending,
            Self::FirstScene => StoryStatus::FirstScenePending,
            Self::SceneJson => StoryStatus::JsonGenerationPending,
            Self::Finalization => StoryStatus::InitialGeneration,
        }
    }

    /// The stage the story moves to once this artifact is stored.
    #[must_use]
    pub fn advances_to(&self) -> StoryStatus {
        match self {
            Self::Moderation { .. } => StoryStatus::ProtagonistGoalPending,
            Self::ProtagonistGoal { .. } => StoryStatus::ScenePlannerPending,
            Self::ScenePlan { .. } => StoryStatus::SubTasksPending,
            Self::Setup { .. } => StoryStatus::FirstScenePending,
            Self::FirstScene => StoryStatus::ImageGenerationPending,
            Self::SceneJson => StoryStatus::InitialGeneration,
            Self::Finalization => StoryStatus::Ready,
        }
    }

    /// Whether a story sitting in `status` has already stored this artifact
    /// and is still waiting on the fan-out it opened. Repeating the report is
    /// then accepted without rewriting anything, so the caller can re-run the
    /// zero-delta coordinator check that the first report may not have reached.
    #[must_use]
    pub fn is_recorded_fan_out(&self, status: StoryStatus) -> bool {
        status == self.advances_to() && status.is_fan_out()
    }

    /// Short name used in logs.
    #[must_use]
    pub fn stage_name(&self) -> &'static str {
        match self {
            Self::Moderation { .. } => "moderation",
            Self::ProtagonistGoal { .. } => "protagonist_goal",
            Self::ScenePlan { .. } => "scene_planner",
            Self::Setup { .. } => "setup",
            Self::FirstScene => "first_scene",
            Self::SceneJson => "scene_json",
            Self::Finalization => "finalization",
        }
    }

    /// Rejects artifacts carrying impossible counts.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for negative fan-out sizes.
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            Self::ScenePlan { fan_out, .. } => fan_out.validate_fan_out(),
            Self::Setup {
                character_images, ..
            } if *character_images < 0 => Err(DomainError::Validation(format!(
                "character image count must be non-negative, got {character_images}"
            ))),
            _ => Ok(()),
        }
    }
}

/// Input for creating a story at the first pipeline stage.
#[derive(Debug, Clone)]
pub struct NewStory {
    /// Story identifier.
    pub id: Uuid,
    /// Author of the story.
    pub owner_id: Uuid,
    /// Opaque story config.
    pub config: Vec<u8>,
}

/// A story as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Story {
    /// Story identifier.
    pub id: Uuid,
    /// Author of the story.
    pub owner_id: Uuid,
    /// Current generation stage.
    pub status: StoryStatus,
    /// Pending-task counters.
    pub counters: TaskCounters,
    /// Diagnostic message, set only while in `Error`.
    pub error_details: Option<String>,
    /// Opaque story config.
    pub config: Vec<u8>,
    /// Opaque scene plan, once planned.
    pub scene_plan: Option<Vec<u8>>,
    /// Opaque setup, once generated.
    pub setup: Option<Vec<u8>>,
    /// Moderation verdict.
    pub is_adult_content: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time; the sweeper's staleness clock.
    pub updated_at: DateTime<Utc>,
}

impl Story {
    /// The externally visible status of this story.
    #[must_use]
    pub fn status_view(&self) -> StoryStatusView {
        StoryStatusView {
            status: self.status,
            error_message: match self.status {
                StoryStatus::Error => self.error_details.clone(),
                _ => None,
            },
        }
    }
}

/// Classifies a guarded story write that found `actual` instead of the
/// expected source status.
#[must_use]
pub fn rejected_story_write(story_id: Uuid, actual: StoryStatus, requested: StoryStatus) -> DomainError {
    if actual == StoryStatus::Error {
        return DomainError::Stale(format!("story {story_id} is in error"));
    }
    DomainError::invalid_transition(actual, requested)
}

/// Classifies a stage report for a story found in `actual` instead of the
/// stage `artifact` completes.
#[must_use]
pub fn rejected_stage_report(story_id: Uuid, actual: StoryStatus, artifact: &StageArtifact) -> DomainError {
    if actual == StoryStatus::Error {
        return DomainError::Stale(format!("story {story_id} is in error"));
    }
    DomainError::unexpected_status(actual, artifact.completes(), artifact.advances_to())
}

/// Status of a story as exposed to the service layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoryStatusView {
    /// Current stage, `Ready` or `Error`.
    pub status: StoryStatus,
    /// Diagnostic message; present only in `Error`.
    pub error_message: Option<String>,
}
