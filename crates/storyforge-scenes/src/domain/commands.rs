//! Commands for the Scene Cache context.

use storyforge_core::command::Command;
use storyforge_core::scene::SceneContent;
use uuid::Uuid;

/// Command sent by the scene worker once a scene has been generated.
#[derive(Debug, Clone)]
pub struct ReportSceneGenerated {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The story the scene belongs to.
    pub story_id: Uuid,
    /// The narrative state the scene was generated for.
    pub state_hash: String,
    /// The generated scene.
    pub content: SceneContent,
}

impl Command for ReportSceneGenerated {
    fn command_type(&self) -> &'static str {
        "scenes.report_scene_generated"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn story_id(&self) -> Uuid {
        self.story_id
    }
}
