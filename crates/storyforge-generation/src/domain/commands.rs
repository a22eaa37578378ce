//! Commands for the Generation context.

use storyforge_core::command::Command;
use storyforge_core::story::{StageArtifact, StoryStatus, TaskDeltas};
use uuid::Uuid;

/// Command to create a story at the first pipeline stage.
#[derive(Debug, Clone)]
pub struct CreateStory {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The author of the story.
    pub owner_id: Uuid,
    /// Opaque story config.
    pub config: Vec<u8>,
}

/// Command sent by a stage-worker when its stage has produced its artifact.
#[derive(Debug, Clone)]
pub struct ReportStageComplete {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The story the stage belongs to.
    pub story_id: Uuid,
    /// What the stage produced. Also identifies the stage.
    pub artifact: StageArtifact,
}

/// Command sent when subtasks finish or spawn during a fan-out stage.
#[derive(Debug, Clone)]
pub struct ReportTaskDelta {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The story the subtasks belong to.
    pub story_id: Uuid,
    /// Signed counter changes.
    pub deltas: TaskDeltas,
    /// The stage entered once every counter has drained.
    pub completion: StoryStatus,
}

/// Command sent when a stage-worker gives up on a story.
#[derive(Debug, Clone)]
pub struct FailStory {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The story that failed.
    pub story_id: Uuid,
    /// Diagnostic shown to the author.
    pub message: String,
}

/// Command to delete a story and everything generated for it.
#[derive(Debug, Clone)]
pub struct DeleteStory {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The story to delete.
    pub story_id: Uuid,
    /// The caller; must own the story.
    pub owner_id: Uuid,
}

impl Command for ReportStageComplete {
    fn command_type(&self) -> &'static str {
        "generation.report_stage_complete"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn story_id(&self) -> Uuid {
        self.story_id
    }
}

impl Command for ReportTaskDelta {
    fn command_type(&self) -> &'static str {
        "generation.report_task_delta"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn story_id(&self) -> Uuid {
        self.story_id
    }
}

impl Command for FailStory {
    fn command_type(&self) -> &'static str {
        "generation.fail_story"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn story_id(&self) -> Uuid {
        self.story_id
    }
}
