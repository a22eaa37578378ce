//! `PostgreSQL` implementation of the `PlayerProgressRepository` trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{info, instrument};
use uuid::Uuid;

use storyforge_core::error::DomainError;
use storyforge_core::player::{
    INITIAL_STATE_HASH, NarrativeState, NarrativeSummaries, NewPlayerProgress, PlayerProgress,
};
use storyforge_core::repository::{PlayerProgressRepository, ResetOutcome};

use crate::error::map_sqlx_error;

macro_rules! progress_columns {
    () => {
        "id, player_id, story_id, scene_index, state_hash, core_stats, story_variables, \
         global_flags, last_story_summary, last_future_direction, last_var_impact_summary, \
         current_scene_summary, created_at, updated_at"
    };
}

#[derive(Debug, sqlx::FromRow)]
struct ProgressRow {
    id: Uuid,
    player_id: Uuid,
    story_id: Uuid,
    scene_index: i32,
    state_hash: String,
    core_stats: Json<BTreeMap<String, i64>>,
    story_variables: Json<Map<String, Value>>,
    global_flags: Json<Vec<String>>,
    last_story_summary: Option<String>,
    last_future_direction: Option<String>,
    last_var_impact_summary: Option<String>,
    current_scene_summary: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProgressRow> for PlayerProgress {
    fn from(row: ProgressRow) -> Self {
        Self {
            id: row.id,
            player_id: row.player_id,
            story_id: row.story_id,
            scene_index: row.scene_index,
            state_hash: row.state_hash,
            state: NarrativeState {
                core_stats: row.core_stats.0,
                story_variables: row.story_variables.0,
                global_flags: row.global_flags.0,
            },
            summaries: NarrativeSummaries {
                last_story_summary: row.last_story_summary,
                last_future_direction: row.last_future_direction,
                last_var_impact_summary: row.last_var_impact_summary,
                current_scene_summary: row.current_scene_summary,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// PostgreSQL-backed progress node repository.
#[derive(Debug, Clone)]
pub struct PgPlayerProgressRepository {
    pool: PgPool,
}

impl PgPlayerProgressRepository {
    /// Creates a new `PgPlayerProgressRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlayerProgressRepository for PgPlayerProgressRepository {
    #[instrument(skip(self, progress), fields(story_id = %progress.story_id, state_hash = %progress.state_hash))]
    async fn upsert(&self, progress: &NewPlayerProgress) -> Result<Uuid, DomainError> {
        sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO player_progress ( \
                 id, player_id, story_id, scene_index, state_hash, core_stats, story_variables, \
                 global_flags, last_story_summary, last_future_direction, \
                 last_var_impact_summary, current_scene_summary \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (story_id, state_hash) DO UPDATE SET updated_at = NOW() \
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(progress.player_id)
        .bind(progress.story_id)
        .bind(progress.scene_index)
        .bind(&progress.state_hash)
        .bind(Json(&progress.state.core_stats))
        .bind(Json(&progress.state.story_variables))
        .bind(Json(&progress.state.global_flags))
        .bind(progress.summaries.last_story_summary.as_deref())
        .bind(progress.summaries.last_future_direction.as_deref())
        .bind(progress.summaries.last_var_impact_summary.as_deref())
        .bind(progress.summaries.current_scene_summary.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            map_sqlx_error(
                e,
                "player progress",
                format!("{}/{}", progress.story_id, progress.state_hash),
            )
        })
    }

    async fn find(&self, progress_id: Uuid) -> Result<PlayerProgress, DomainError> {
        let row: ProgressRow = sqlx::query_as(concat!(
            "SELECT ",
            progress_columns!(),
            " FROM player_progress WHERE id = $1"
        ))
        .bind(progress_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "player progress", progress_id))?;
        Ok(row.into())
    }

    async fn find_by_hash(
        &self,
        story_id: Uuid,
        state_hash: &str,
    ) -> Result<PlayerProgress, DomainError> {
        let row: ProgressRow = sqlx::query_as(concat!(
            "SELECT ",
            progress_columns!(),
            " FROM player_progress WHERE story_id = $1 AND state_hash = $2"
        ))
        .bind(story_id)
        .bind(state_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "player progress", format!("{story_id}/{state_hash}")))?;
        Ok(row.into())
    }

    #[instrument(skip(self), fields(player_id = %player_id, story_id = %story_id))]
    async fn reset_player(
        &self,
        player_id: Uuid,
        story_id: Uuid,
    ) -> Result<ResetOutcome, DomainError> {
        let key = || format!("{player_id}/{story_id}");
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(e, "player progress", key()))?;

        let game_states =
            sqlx::query("DELETE FROM player_game_states WHERE player_id = $1 AND story_id = $2")
                .bind(player_id)
                .bind(story_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error(e, "player game state", key()))?
                .rows_affected();

        let progress_nodes = sqlx::query(
            "DELETE FROM player_progress p \
             WHERE p.player_id = $1 AND p.story_id = $2 AND p.state_hash <> $3 \
               AND NOT EXISTS ( \
                   SELECT 1 FROM player_game_states g WHERE g.player_progress_id = p.id \
               )",
        )
        .bind(player_id)
        .bind(story_id)
        .bind(INITIAL_STATE_HASH)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(e, "player progress", key()))?
        .rows_affected();

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error(e, "player progress", key()))?;

        info!(game_states, progress_nodes, "player progress reset");
        Ok(ResetOutcome {
            game_states,
            progress_nodes,
        })
    }
}
