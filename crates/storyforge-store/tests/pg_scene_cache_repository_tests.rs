//! Integration tests for `PgSceneCacheRepository`.

use sqlx::PgPool;
use storyforge_core::error::DomainError;
use storyforge_core::repository::{SceneCacheRepository, StoryRepository};
use storyforge_core::scene::{SceneContent, SceneWrite};
use storyforge_core::story::NewStory;
use storyforge_store::pg_scene_cache_repository::PgSceneCacheRepository;
use storyforge_store::pg_story_repository::PgStoryRepository;
use uuid::Uuid;

const SCENE: &str = r#"{"text":"The bell tolls beneath the water.","choices":["dive","flee"]}"#;

async fn story(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    PgStoryRepository::new(pool.clone())
        .insert(&NewStory {
            id,
            owner_id: Uuid::new_v4(),
            config: vec![],
        })
        .await
        .unwrap();
    id
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_find_on_empty_cache_is_not_found(pool: PgPool) {
    let story_id = story(&pool).await;
    let repo = PgSceneCacheRepository::new(pool);

    let result = repo.find(story_id, "h1").await;

    assert!(matches!(result, Err(DomainError::NotFound { entity: "scene", .. })));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_store_then_find_returns_identical_bytes(pool: PgPool) {
    let story_id = story(&pool).await;
    let repo = PgSceneCacheRepository::new(pool);

    let stored = repo
        .store(story_id, "h1", &SceneContent::from(SCENE))
        .await
        .unwrap();
    let first = repo.find(story_id, "h1").await.unwrap();
    let second = repo.find(story_id, "h1").await.unwrap();

    assert_eq!(stored.write, SceneWrite::Inserted);
    assert_eq!(first.content.as_bytes(), SCENE.as_bytes());
    assert_eq!(first, second);
    assert!(!first.is_placeholder);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_real_content_replaces_placeholder(pool: PgPool) {
    let story_id = story(&pool).await;
    let repo = PgSceneCacheRepository::new(pool);
    repo.store(story_id, "h1", &SceneContent::from(" [] "))
        .await
        .unwrap();

    let stored = repo
        .store(story_id, "h1", &SceneContent::from(SCENE))
        .await
        .unwrap();

    assert_eq!(stored.write, SceneWrite::ReplacedPlaceholder);
    assert_eq!(stored.entry.content.as_bytes(), SCENE.as_bytes());
    assert!(!stored.entry.is_placeholder);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_real_content_is_never_overwritten(pool: PgPool) {
    let story_id = story(&pool).await;
    let repo = PgSceneCacheRepository::new(pool);
    repo.store(story_id, "h1", &SceneContent::from(SCENE))
        .await
        .unwrap();

    let real = repo
        .store(story_id, "h1", &SceneContent::from(r#"{"text":"other"}"#))
        .await
        .unwrap();
    let placeholder = repo
        .store(story_id, "h1", &SceneContent::placeholder())
        .await
        .unwrap();

    assert_eq!(real.write, SceneWrite::KeptExisting);
    assert_eq!(real.entry.content.as_bytes(), SCENE.as_bytes());
    assert_eq!(placeholder.write, SceneWrite::KeptExisting);
    assert_eq!(placeholder.entry.content.as_bytes(), SCENE.as_bytes());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_concurrent_placeholder_and_real_store_keeps_real(pool: PgPool) {
    let story_id = story(&pool).await;
    let repo = PgSceneCacheRepository::new(pool);

    let placeholder_repo = repo.clone();
    let real_repo = repo.clone();
    let placeholder = tokio::spawn(async move {
        placeholder_repo
            .store(story_id, "h1", &SceneContent::placeholder())
            .await
            .unwrap()
    });
    let real = tokio::spawn(async move {
        real_repo
            .store(story_id, "h1", &SceneContent::from(SCENE))
            .await
            .unwrap()
    });
    placeholder.await.unwrap();
    real.await.unwrap();

    let entry = repo.find(story_id, "h1").await.unwrap();
    assert_eq!(entry.content.as_bytes(), SCENE.as_bytes());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_store_for_missing_story_is_not_found(pool: PgPool) {
    let repo = PgSceneCacheRepository::new(pool);

    let result = repo
        .store(Uuid::new_v4(), "h1", &SceneContent::from(SCENE))
        .await;

    assert!(matches!(result, Err(DomainError::NotFound { .. })));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_story_deletion_cascades_to_scenes(pool: PgPool) {
    let stories = PgStoryRepository::new(pool.clone());
    let owner_id = Uuid::new_v4();
    let story_id = Uuid::new_v4();
    stories
        .insert(&NewStory {
            id: story_id,
            owner_id,
            config: vec![],
        })
        .await
        .unwrap();
    let repo = PgSceneCacheRepository::new(pool);
    repo.store(story_id, "h1", &SceneContent::from(SCENE))
        .await
        .unwrap();
    repo.store(story_id, "h2", &SceneContent::placeholder())
        .await
        .unwrap();
    assert_eq!(repo.list_for_story(story_id).await.unwrap().len(), 2);

    stories.delete(story_id, owner_id).await.unwrap();

    assert!(repo.list_for_story(story_id).await.unwrap().is_empty());
}
