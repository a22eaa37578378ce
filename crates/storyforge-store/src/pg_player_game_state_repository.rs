//! `PostgreSQL` implementation of the `PlayerGameStateRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use storyforge_core::error::DomainError;
use storyforge_core::player::{
    PlayerGameState, PlayerStatus, check_game_state_overwrite, rejected_game_state_write,
};
use storyforge_core::repository::PlayerGameStateRepository;

use crate::error::map_sqlx_error;

macro_rules! game_state_columns {
    () => {
        "id, player_id, story_id, current_scene_id, player_progress_id, player_status, \
         ending_text, error_details, started_at, last_activity_at, completed_at"
    };
}

#[derive(Debug, sqlx::FromRow)]
struct GameStateRow {
    id: Uuid,
    player_id: Uuid,
    story_id: Uuid,
    current_scene_id: Option<Uuid>,
    player_progress_id: Uuid,
    player_status: String,
    ending_text: Option<String>,
    error_details: Option<String>,
    started_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<GameStateRow> for PlayerGameState {
    type Error = DomainError;

    fn try_from(row: GameStateRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            player_id: row.player_id,
            story_id: row.story_id,
            current_scene_id: row.current_scene_id,
            player_progress_id: row.player_progress_id,
            player_status: row.player_status.parse()?,
            ending_text: row.ending_text,
            error_details: row.error_details,
            started_at: row.started_at,
            last_activity_at: row.last_activity_at,
            completed_at: row.completed_at,
        })
    }
}

/// PostgreSQL-backed game state repository.
#[derive(Debug, Clone)]
pub struct PgPlayerGameStateRepository {
    pool: PgPool,
}

impl PgPlayerGameStateRepository {
    /// Creates a new `PgPlayerGameStateRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(
        &self,
        state: &PlayerGameState,
        now: DateTime<Utc>,
    ) -> Result<PlayerGameState, DomainError> {
        let row: GameStateRow = sqlx::query_as(concat!(
            "INSERT INTO player_game_states ( \
                 id, player_id, story_id, current_scene_id, player_progress_id, player_status, \
                 ending_text, error_details, started_at, last_activity_at, completed_at \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9, $10) \
             RETURNING ",
            game_state_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(state.player_id)
        .bind(state.story_id)
        .bind(state.current_scene_id)
        .bind(state.player_progress_id)
        .bind(state.player_status.as_str())
        .bind(state.ending_text.as_deref())
        .bind(state.error_details.as_deref())
        .bind(now)
        .bind(state.completed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            map_sqlx_error(
                e,
                "player game state",
                format!("{}/{}", state.player_id, state.story_id),
            )
        })?;
        row.try_into()
    }

    async fn stored_status(&self, state_id: Uuid) -> Result<Option<PlayerStatus>, DomainError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT player_status FROM player_game_states WHERE id = $1")
                .bind(state_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error(e, "player game state", state_id))?;
        status.map(|s| s.parse()).transpose()
    }

    /// Explains why a status-guarded write matched no row.
    async fn rejected(&self, state: &PlayerGameState) -> DomainError {
        match self.stored_status(state.id).await {
            Ok(None) => DomainError::not_found("player game state", state.id),
            Ok(Some(actual)) => rejected_game_state_write(state.id, actual, state.player_status),
            Err(e) => e,
        }
    }

    async fn overwrite(
        &self,
        state: &PlayerGameState,
        now: DateTime<Utc>,
    ) -> Result<PlayerGameState, DomainError> {
        let stored = self
            .stored_status(state.id)
            .await?
            .ok_or_else(|| DomainError::not_found("player game state", state.id))?;
        check_game_state_overwrite(state.id, stored, state.player_status)?;

        let row: Option<GameStateRow> = sqlx::query_as(concat!(
            "UPDATE player_game_states SET \
                 player_id = $2, story_id = $3, current_scene_id = $4, player_progress_id = $5, \
                 player_status = $6, ending_text = $7, error_details = $8, \
                 last_activity_at = $9, completed_at = $10 \
             WHERE id = $1 AND player_status = $11 \
             RETURNING ",
            game_state_columns!()
        ))
        .bind(state.id)
        .bind(state.player_id)
        .bind(state.story_id)
        .bind(state.current_scene_id)
        .bind(state.player_progress_id)
        .bind(state.player_status.as_str())
        .bind(state.ending_text.as_deref())
        .bind(state.error_details.as_deref())
        .bind(now)
        .bind(state.completed_at)
        .bind(stored.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "player game state", state.id))?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.rejected(state).await),
        }
    }
}

#[async_trait]
impl PlayerGameStateRepository for PgPlayerGameStateRepository {
    #[instrument(skip(self, state, now), fields(player_id = %state.player_id, story_id = %state.story_id))]
    async fn save(
        &self,
        state: &PlayerGameState,
        now: DateTime<Utc>,
    ) -> Result<PlayerGameState, DomainError> {
        let saved = if state.is_new() {
            self.insert(state, now).await?
        } else {
            self.overwrite(state, now).await?
        };
        debug!(state_id = %saved.id, status = %saved.player_status, "game state saved");
        Ok(saved)
    }

    async fn find(&self, state_id: Uuid) -> Result<PlayerGameState, DomainError> {
        let row: GameStateRow = sqlx::query_as(concat!(
            "SELECT ",
            game_state_columns!(),
            " FROM player_game_states WHERE id = $1"
        ))
        .bind(state_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "player game state", state_id))?;
        row.try_into()
    }

    #[instrument(skip(self, state), fields(state_id = %state.id, to = %state.player_status))]
    async fn update_guarded(
        &self,
        state: &PlayerGameState,
        expected: PlayerStatus,
    ) -> Result<PlayerGameState, DomainError> {
        let row: Option<GameStateRow> = sqlx::query_as(concat!(
            "UPDATE player_game_states SET \
                 current_scene_id = $3, player_progress_id = $4, player_status = $5, \
                 ending_text = $6, error_details = $7, last_activity_at = $8, completed_at = $9 \
             WHERE id = $1 AND player_status = $2 \
             RETURNING ",
            game_state_columns!()
        ))
        .bind(state.id)
        .bind(expected.as_str())
        .bind(state.current_scene_id)
        .bind(state.player_progress_id)
        .bind(state.player_status.as_str())
        .bind(state.ending_text.as_deref())
        .bind(state.error_details.as_deref())
        .bind(state.last_activity_at)
        .bind(state.completed_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "player game state", state.id))?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.rejected(state).await),
        }
    }

    #[instrument(skip(self), fields(player_id = %player_id, state_id = %state_id))]
    async fn delete(&self, player_id: Uuid, state_id: Uuid) -> Result<(), DomainError> {
        let deleted =
            sqlx::query("DELETE FROM player_game_states WHERE id = $1 AND player_id = $2")
                .bind(state_id)
                .bind(player_id)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error(e, "player game state", state_id))?
                .rows_affected();
        if deleted > 0 {
            return Ok(());
        }

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM player_game_states WHERE id = $1)",
        )
        .bind(state_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "player game state", state_id))?;
        if exists {
            Err(DomainError::Forbidden(format!(
                "game state {state_id} is not owned by {player_id}"
            )))
        } else {
            Err(DomainError::not_found("player game state", state_id))
        }
    }

    async fn list_for_player_story(
        &self,
        player_id: Uuid,
        story_id: Uuid,
    ) -> Result<Vec<PlayerGameState>, DomainError> {
        let rows: Vec<GameStateRow> = sqlx::query_as(concat!(
            "SELECT ",
            game_state_columns!(),
            " FROM player_game_states WHERE player_id = $1 AND story_id = $2 \
              ORDER BY last_activity_at DESC, id"
        ))
        .bind(player_id)
        .bind(story_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "player game state", format!("{player_id}/{story_id}")))?;
        rows.into_iter().map(PlayerGameState::try_from).collect()
    }
}
