//! `PostgreSQL` implementation of the `StoryRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use storyforge_core::error::DomainError;
use storyforge_core::repository::StoryRepository;
use storyforge_core::story::{
    CounterOutcome, NewStory, StageArtifact, Story, StoryStatus, TaskCounters, TaskDeltas,
    rejected_stage_report, rejected_story_write,
};

use crate::error::map_sqlx_error;

macro_rules! story_columns {
    () => {
        "id, owner_id, status, pending_char_gen_tasks, pending_card_img_tasks, \
         pending_char_img_tasks, error_details, config, scene_plan, setup, \
         is_adult_content, created_at, updated_at"
    };
}

#[derive(Debug, sqlx::FromRow)]
struct StoryRow {
    id: Uuid,
    owner_id: Uuid,
    status: String,
    pending_char_gen_tasks: i32,
    pending_card_img_tasks: i32,
    pending_char_img_tasks: i32,
    error_details: Option<String>,
    config: Vec<u8>,
    scene_plan: Option<Vec<u8>>,
    setup: Option<Vec<u8>>,
    is_adult_content: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StoryRow> for Story {
    type Error = DomainError;

    fn try_from(row: StoryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            status: row.status.parse()?,
            counters: TaskCounters::new(
                row.pending_char_gen_tasks,
                row.pending_card_img_tasks,
                row.pending_char_img_tasks,
            ),
            error_details: row.error_details,
            config: row.config,
            scene_plan: row.scene_plan,
            setup: row.setup,
            is_adult_content: row.is_adult_content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CounterRow {
    pending_char_gen_tasks: i32,
    pending_card_img_tasks: i32,
    pending_char_img_tasks: i32,
    status: String,
    previous_status: String,
}

/// Column values a stage completion writes. `None` keeps the stored value.
#[derive(Debug, Default)]
struct StagePatch<'a> {
    is_adult_content: Option<bool>,
    config: Option<&'a [u8]>,
    scene_plan: Option<&'a [u8]>,
    setup: Option<&'a [u8]>,
    counters: Option<TaskCounters>,
    add_char_img: i32,
}

impl<'a> StagePatch<'a> {
    fn from_artifact(artifact: &'a StageArtifact) -> Self {
        match artifact {
            StageArtifact::Moderation { is_adult_content } => Self {
                is_adult_content: Some(*is_adult_content),
                ..Self::default()
            },
            StageArtifact::ProtagonistGoal { config } => Self {
                config: Some(config),
                ..Self::default()
            },
            StageArtifact::ScenePlan { plan, fan_out } => Self {
                scene_plan: Some(plan),
                counters: Some(*fan_out),
                ..Self::default()
            },
            StageArtifact::Setup {
                setup,
                character_images,
            } => Self {
                setup: Some(setup),
                add_char_img: *character_images,
                ..Self::default()
            },
            StageArtifact::FirstScene | StageArtifact::SceneJson | StageArtifact::Finalization => {
                Self::default()
            }
        }
    }
}

/// PostgreSQL-backed story repository.
#[derive(Debug, Clone)]
pub struct PgStoryRepository {
    pool: PgPool,
}

impl PgStoryRepository {
    /// Creates a new `PgStoryRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explains why a guarded write matched no row.
    async fn rejected(&self, story_id: Uuid, requested: StoryStatus) -> DomainError {
        let current: Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT status FROM stories WHERE id = $1")
                .bind(story_id)
                .fetch_optional(&self.pool)
                .await;
        match current {
            Ok(None) => DomainError::not_found("story", story_id),
            Ok(Some(status)) => match status.parse::<StoryStatus>() {
                Ok(actual) => rejected_story_write(story_id, actual, requested),
                Err(e) => e,
            },
            Err(e) => map_sqlx_error(e, "story", story_id),
        }
    }
}

#[async_trait]
impl StoryRepository for PgStoryRepository {
    #[instrument(skip(self, story), fields(story_id = %story.id))]
    async fn insert(&self, story: &NewStory) -> Result<Story, DomainError> {
        let row: StoryRow = sqlx::query_as(concat!(
            "INSERT INTO stories (id, owner_id, status, config) VALUES ($1, $2, $3, $4) RETURNING ",
            story_columns!()
        ))
        .bind(story.id)
        .bind(story.owner_id)
        .bind(StoryStatus::INITIAL.as_str())
        .bind(&story.config)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "story", story.id))?;
        row.try_into()
    }

    async fn find(&self, story_id: Uuid) -> Result<Story, DomainError> {
        let row: StoryRow = sqlx::query_as(concat!(
            "SELECT ",
            story_columns!(),
            " FROM stories WHERE id = $1"
        ))
        .bind(story_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "story", story_id))?;
        row.try_into()
    }

    #[instrument(skip(self, artifact), fields(story_id = %story_id, stage = artifact.stage_name()))]
    async fn complete_stage(
        &self,
        story_id: Uuid,
        artifact: &StageArtifact,
    ) -> Result<Story, DomainError> {
        let from = artifact.completes();
        let to = artifact.advances_to();
        let patch = StagePatch::from_artifact(artifact);

        let row: Option<StoryRow> = sqlx::query_as(concat!(
            "UPDATE stories SET \
                 status = $3, \
                 is_adult_content = COALESCE($4, is_adult_content), \
                 config = COALESCE($5, config), \
                 scene_plan = COALESCE($6, scene_plan), \
                 setup = COALESCE($7, setup), \
                 pending_char_gen_tasks = COALESCE($8, pending_char_gen_tasks), \
                 pending_card_img_tasks = COALESCE($9, pending_card_img_tasks), \
                 pending_char_img_tasks = COALESCE($10, pending_char_img_tasks) + $11, \
                 error_details = NULL, \
                 updated_at = NOW() \
             WHERE id = $1 AND status = $2 \
             RETURNING ",
            story_columns!()
        ))
        .bind(story_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(patch.is_adult_content)
        .bind(patch.config)
        .bind(patch.scene_plan)
        .bind(patch.setup)
        .bind(patch.counters.map(|c| c.char_gen))
        .bind(patch.counters.map(|c| c.card_img))
        .bind(patch.counters.map(|c| c.char_img))
        .bind(patch.add_char_img)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "story", story_id))?;

        if let Some(row) = row {
            info!(from = %from, to = %to, "story stage completed");
            return row.try_into();
        }

        let current = self.find(story_id).await?;
        if artifact.is_recorded_fan_out(current.status) {
            debug!(status = %current.status, "stage already recorded, fan-out still open");
            return Ok(current);
        }
        Err(rejected_stage_report(story_id, current.status, artifact))
    }

    #[instrument(skip(self), fields(story_id = %story_id))]
    async fn apply_deltas(
        &self,
        story_id: Uuid,
        deltas: TaskDeltas,
        source: StoryStatus,
        completion: StoryStatus,
    ) -> Result<CounterOutcome, DomainError> {
        // The row lock taken in `prev` serializes concurrent reports, and
        // `prev.status` is the status this call observed before its update.
        let row: CounterRow = sqlx::query_as(
            "WITH prev AS ( \
                 SELECT id, status FROM stories WHERE id = $1 FOR UPDATE \
             ) \
             UPDATE stories AS s SET \
                 pending_char_gen_tasks = GREATEST(0, s.pending_char_gen_tasks + $2), \
                 pending_card_img_tasks = GREATEST(0, s.pending_card_img_tasks + $3), \
                 pending_char_img_tasks = GREATEST(0, s.pending_char_img_tasks + $4), \
                 status = CASE \
                     WHEN s.status = $5 \
                      AND GREATEST(0, s.pending_char_gen_tasks + $2) = 0 \
                      AND GREATEST(0, s.pending_card_img_tasks + $3) = 0 \
                      AND GREATEST(0, s.pending_char_img_tasks + $4) = 0 \
                     THEN $6 \
                     ELSE s.status \
                 END, \
                 updated_at = NOW() \
             FROM prev \
             WHERE s.id = prev.id \
             RETURNING s.pending_char_gen_tasks, s.pending_card_img_tasks, \
                       s.pending_char_img_tasks, s.status, prev.status AS previous_status",
        )
        .bind(story_id)
        .bind(deltas.char_gen)
        .bind(deltas.card_img)
        .bind(deltas.char_img)
        .bind(source.as_str())
        .bind(completion.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "story", story_id))?;

        let status: StoryStatus = row.status.parse()?;
        let previous: StoryStatus = row.previous_status.parse()?;
        let outcome = CounterOutcome {
            counters: TaskCounters::new(
                row.pending_char_gen_tasks,
                row.pending_card_img_tasks,
                row.pending_char_img_tasks,
            ),
            status,
            all_complete: previous != completion && status == completion,
        };
        debug!(counters = ?outcome.counters, status = %status, "task counters updated");
        Ok(outcome)
    }

    #[instrument(skip(self, message), fields(story_id = %story_id))]
    async fn fail(&self, story_id: Uuid, message: &str) -> Result<Story, DomainError> {
        let row: Option<StoryRow> = sqlx::query_as(concat!(
            "UPDATE stories SET status = 'error', error_details = $2, updated_at = NOW() \
             WHERE id = $1 AND status <> 'error' RETURNING ",
            story_columns!()
        ))
        .bind(story_id)
        .bind(message)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "story", story_id))?;

        match row {
            Some(row) => {
                info!("story marked as error");
                row.try_into()
            }
            None => Err(self.rejected(story_id, StoryStatus::Error).await),
        }
    }

    #[instrument(skip(self), fields(story_id = %story_id))]
    async fn delete(&self, story_id: Uuid, owner_id: Uuid) -> Result<(), DomainError> {
        let deleted = sqlx::query("DELETE FROM stories WHERE id = $1 AND owner_id = $2")
            .bind(story_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "story", story_id))?
            .rows_affected();
        if deleted > 0 {
            info!("story deleted");
            return Ok(());
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM stories WHERE id = $1)")
            .bind(story_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "story", story_id))?;
        if exists {
            Err(DomainError::Forbidden(format!(
                "story {story_id} is not owned by {owner_id}"
            )))
        } else {
            Err(DomainError::not_found("story", story_id))
        }
    }
}
