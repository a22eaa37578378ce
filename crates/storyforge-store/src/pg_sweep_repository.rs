//! `PostgreSQL` implementation of the `SweepRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use storyforge_core::error::DomainError;
use storyforge_core::player::PlayerStatus;
use storyforge_core::repository::{
    STALE_GAME_STATE_MESSAGE, STALE_STORY_MESSAGE, SweepReport, SweepRepository,
};
use storyforge_core::story::StoryStatus;

use crate::error::map_sqlx_error;

/// PostgreSQL-backed stale-task sweep.
#[derive(Debug, Clone)]
pub struct PgSweepRepository {
    pool: PgPool,
}

impl PgSweepRepository {
    /// Creates a new `PgSweepRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SweepRepository for PgSweepRepository {
    #[instrument(skip(self))]
    async fn sweep(&self, cutoff: Option<DateTime<Utc>>) -> Result<SweepReport, DomainError> {
        let in_flight: Vec<&str> = StoryStatus::in_flight()
            .into_iter()
            .map(StoryStatus::as_str)
            .collect();
        let awaiting: Vec<&str> = PlayerStatus::AWAITING_GENERATION
            .into_iter()
            .map(PlayerStatus::as_str)
            .collect();

        let (stories, game_states): (i64, i64) = sqlx::query_as(
            "WITH failed_stories AS ( \
                 UPDATE stories \
                 SET status = 'error', error_details = $1, updated_at = NOW() \
                 WHERE status = ANY($3) \
                   AND ($5::timestamptz IS NULL OR updated_at < $5) \
                 RETURNING id \
             ), failed_game_states AS ( \
                 UPDATE player_game_states \
                 SET player_status = 'error', error_details = $2, last_activity_at = NOW() \
                 WHERE player_status = ANY($4) \
                   AND ($5::timestamptz IS NULL OR last_activity_at < $5) \
                 RETURNING id \
             ) \
             SELECT (SELECT COUNT(*) FROM failed_stories), \
                    (SELECT COUNT(*) FROM failed_game_states)",
        )
        .bind(STALE_STORY_MESSAGE)
        .bind(STALE_GAME_STATE_MESSAGE)
        .bind(&in_flight)
        .bind(&awaiting)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "sweep", cutoff.map_or_else(|| "all".to_owned(), |c| c.to_rfc3339())))?;

        Ok(SweepReport {
            stories: u64::try_from(stories).unwrap_or_default(),
            game_states: u64::try_from(game_states).unwrap_or_default(),
        })
    }
}
