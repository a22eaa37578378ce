//! `PostgreSQL` implementation of the `SceneCacheRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use storyforge_core::error::DomainError;
use storyforge_core::repository::SceneCacheRepository;
use storyforge_core::scene::{SceneCacheEntry, SceneContent, SceneWrite, StoredScene};

use crate::error::map_sqlx_error;

#[derive(Debug, sqlx::FromRow)]
struct SceneRow {
    id: Uuid,
    story_id: Uuid,
    state_hash: String,
    content: Vec<u8>,
    is_placeholder: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SceneRow> for SceneCacheEntry {
    fn from(row: SceneRow) -> Self {
        Self {
            id: row.id,
            story_id: row.story_id,
            state_hash: row.state_hash,
            content: SceneContent::new(row.content),
            is_placeholder: row.is_placeholder,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SceneWriteRow {
    inserted: bool,
    #[sqlx(flatten)]
    scene: SceneRow,
}

/// PostgreSQL-backed scene cache.
#[derive(Debug, Clone)]
pub struct PgSceneCacheRepository {
    pool: PgPool,
}

impl PgSceneCacheRepository {
    /// Creates a new `PgSceneCacheRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SceneCacheRepository for PgSceneCacheRepository {
    async fn find(&self, story_id: Uuid, state_hash: &str) -> Result<SceneCacheEntry, DomainError> {
        let row: SceneRow = sqlx::query_as(
            "SELECT id, story_id, state_hash, content, is_placeholder, created_at, updated_at \
             FROM scene_cache WHERE story_id = $1 AND state_hash = $2",
        )
        .bind(story_id)
        .bind(state_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "scene", format!("{story_id}/{state_hash}")))?;
        Ok(row.into())
    }

    #[instrument(skip(self, content), fields(story_id = %story_id, state_hash = %state_hash))]
    async fn store(
        &self,
        story_id: Uuid,
        state_hash: &str,
        content: &SceneContent,
    ) -> Result<StoredScene, DomainError> {
        let key = || format!("{story_id}/{state_hash}");

        // `xmax = 0` holds only for a freshly inserted tuple.
        let written: Option<SceneWriteRow> = sqlx::query_as(
            "INSERT INTO scene_cache (id, story_id, state_hash, content, is_placeholder) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (story_id, state_hash) DO UPDATE \
                 SET content = EXCLUDED.content, \
                     is_placeholder = EXCLUDED.is_placeholder, \
                     updated_at = NOW() \
                 WHERE scene_cache.is_placeholder AND NOT EXCLUDED.is_placeholder \
             RETURNING (xmax = 0) AS inserted, id, story_id, state_hash, content, \
                       is_placeholder, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(story_id)
        .bind(state_hash)
        .bind(content.as_bytes())
        .bind(content.is_placeholder())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "scene", key()))?;

        let stored = match written {
            Some(row) => StoredScene {
                write: if row.inserted {
                    SceneWrite::Inserted
                } else {
                    SceneWrite::ReplacedPlaceholder
                },
                entry: row.scene.into(),
            },
            None => StoredScene {
                write: SceneWrite::KeptExisting,
                entry: self.find(story_id, state_hash).await?,
            },
        };
        debug!(write = ?stored.write, "scene cache write resolved");
        Ok(stored)
    }

    async fn list_for_story(&self, story_id: Uuid) -> Result<Vec<SceneCacheEntry>, DomainError> {
        let rows: Vec<SceneRow> = sqlx::query_as(
            "SELECT id, story_id, state_hash, content, is_placeholder, created_at, updated_at \
             FROM scene_cache WHERE story_id = $1 ORDER BY created_at, id",
        )
        .bind(story_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "scene", story_id))?;
        Ok(rows.into_iter().map(SceneCacheEntry::from).collect())
    }
}
