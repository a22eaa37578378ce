//! Integration tests for `PgSweepRepository`.

use chrono::{TimeDelta, Utc};
use std::time::Duration;

use sqlx::PgPool;
use storyforge_core::clock::{Clock, SystemClock};
use storyforge_core::player::{GameStateChange, NarrativeState, NewPlayerProgress, PlayerGameState, PlayerStatus};
use storyforge_core::repository::{
    PlayerGameStateRepository, PlayerProgressRepository, STALE_GAME_STATE_MESSAGE,
    STALE_STORY_MESSAGE, StoryRepository, SweepRepository,
};
use storyforge_core::story::{NewStory, StageArtifact, StoryStatus};
use storyforge_store::pg_player_game_state_repository::PgPlayerGameStateRepository;
use storyforge_store::pg_player_progress_repository::PgPlayerProgressRepository;
use storyforge_store::pg_story_repository::PgStoryRepository;
use storyforge_store::pg_sweep_repository::PgSweepRepository;
use uuid::Uuid;

async fn story(repo: &PgStoryRepository) -> Uuid {
    let id = Uuid::new_v4();
    repo.insert(&NewStory {
        id,
        owner_id: Uuid::new_v4(),
        config: vec![],
    })
    .await
    .unwrap();
    id
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_sweep_fails_idle_story_once(pool: PgPool) {
    let stories = PgStoryRepository::new(pool.clone());
    let sweeper = PgSweepRepository::new(pool);
    let id = story(&stories).await;
    let cutoff = Some(Utc::now() + TimeDelta::hours(1));

    let first = sweeper.sweep(cutoff).await.unwrap();
    let second = sweeper.sweep(cutoff).await.unwrap();

    assert_eq!(first.stories, 1);
    assert_eq!(second.stories, 0);
    let swept = stories.find(id).await.unwrap();
    assert_eq!(swept.status, StoryStatus::Error);
    assert_eq!(swept.error_details.as_deref(), Some(STALE_STORY_MESSAGE));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_sweep_with_huge_threshold_finds_nothing(pool: PgPool) {
    let stories = PgStoryRepository::new(pool.clone());
    let sweeper = PgSweepRepository::new(pool);
    let id = story(&stories).await;

    let report = sweeper
        .sweep(SystemClock.stale_cutoff(Duration::from_secs(u64::MAX)))
        .await
        .unwrap();

    assert_eq!(report.total(), 0);
    assert_eq!(
        stories.find(id).await.unwrap().status,
        StoryStatus::ModerationPending
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_sweep_ignores_recent_and_terminal_stories(pool: PgPool) {
    let stories = PgStoryRepository::new(pool.clone());
    let sweeper = PgSweepRepository::new(pool);
    let recent = story(&stories).await;
    let failed = story(&stories).await;
    stories.fail(failed, "worker crashed").await.unwrap();

    let report = sweeper
        .sweep(Some(Utc::now() - TimeDelta::hours(1)))
        .await
        .unwrap();

    assert_eq!(report.total(), 0);
    assert_eq!(
        stories.find(recent).await.unwrap().status,
        StoryStatus::ModerationPending
    );
    assert_eq!(
        stories.find(failed).await.unwrap().error_details.as_deref(),
        Some("worker crashed")
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_sweep_without_cutoff_fails_every_in_flight_row(pool: PgPool) {
    let stories = PgStoryRepository::new(pool.clone());
    let progress = PgPlayerProgressRepository::new(pool.clone());
    let states = PgPlayerGameStateRepository::new(pool.clone());
    let sweeper = PgSweepRepository::new(pool);

    let moderating = story(&stories).await;
    let planning = story(&stories).await;
    stories
        .complete_stage(
            planning,
            &StageArtifact::Moderation {
                is_adult_content: false,
            },
        )
        .await
        .unwrap();

    let player = Uuid::new_v4();
    let node = progress
        .upsert(&NewPlayerProgress::initial(player, moderating, NarrativeState::default()))
        .await
        .unwrap();
    let now = Utc::now();
    let saved = states
        .save(&PlayerGameState::start(player, moderating, node, now), now)
        .await
        .unwrap();
    let generating = saved
        .apply(GameStateChange::BeginSceneGeneration, now)
        .unwrap();
    states
        .update_guarded(&generating, PlayerStatus::Playing)
        .await
        .unwrap();

    let report = sweeper.sweep(None).await.unwrap();

    assert_eq!(report.stories, 2);
    assert_eq!(report.game_states, 1);
    let swept = states.find(saved.id).await.unwrap();
    assert_eq!(swept.player_status, PlayerStatus::Error);
    assert_eq!(swept.error_details.as_deref(), Some(STALE_GAME_STATE_MESSAGE));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_sweep_leaves_playing_states_alone(pool: PgPool) {
    let stories = PgStoryRepository::new(pool.clone());
    let progress = PgPlayerProgressRepository::new(pool.clone());
    let states = PgPlayerGameStateRepository::new(pool.clone());
    let sweeper = PgSweepRepository::new(pool);
    let story_id = story(&stories).await;
    let player = Uuid::new_v4();
    let node = progress
        .upsert(&NewPlayerProgress::initial(player, story_id, NarrativeState::default()))
        .await
        .unwrap();
    let now = Utc::now();
    let saved = states
        .save(&PlayerGameState::start(player, story_id, node, now), now)
        .await
        .unwrap();

    let report = sweeper.sweep(None).await.unwrap();

    assert_eq!(report.game_states, 0);
    assert_eq!(
        states.find(saved.id).await.unwrap().player_status,
        PlayerStatus::Playing
    );
}
