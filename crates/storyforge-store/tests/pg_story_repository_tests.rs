//! Integration tests for `PgStoryRepository`.

use sqlx::PgPool;
use storyforge_core::error::DomainError;
use storyforge_core::repository::StoryRepository;
use storyforge_core::story::{NewStory, StageArtifact, StoryStatus, TaskCounters, TaskDeltas};
use storyforge_store::pg_story_repository::PgStoryRepository;
use uuid::Uuid;

async fn create(repo: &PgStoryRepository) -> (Uuid, Uuid) {
    let id = Uuid::new_v4();
    let owner_id = Uuid::new_v4();
    repo.insert(&NewStory {
        id,
        owner_id,
        config: br#"{"title":"The Drowned Bell"}"#.to_vec(),
    })
    .await
    .unwrap();
    (id, owner_id)
}

async fn advance_to_sub_tasks(repo: &PgStoryRepository, id: Uuid, fan_out: TaskCounters) {
    repo.complete_stage(
        id,
        &StageArtifact::Moderation {
            is_adult_content: false,
        },
    )
    .await
    .unwrap();
    repo.complete_stage(
        id,
        &StageArtifact::ProtagonistGoal {
            config: br#"{"goal":"ring the bell"}"#.to_vec(),
        },
    )
    .await
    .unwrap();
    repo.complete_stage(
        id,
        &StageArtifact::ScenePlan {
            plan: b"plan".to_vec(),
            fan_out,
        },
    )
    .await
    .unwrap();
}

// --- insert / find ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_insert_starts_at_moderation_with_zero_counters(pool: PgPool) {
    let repo = PgStoryRepository::new(pool);

    let (id, owner_id) = create(&repo).await;

    let story = repo.find(id).await.unwrap();
    assert_eq!(story.owner_id, owner_id);
    assert_eq!(story.status, StoryStatus::ModerationPending);
    assert_eq!(story.counters, TaskCounters::default());
    assert_eq!(story.config, br#"{"title":"The Drowned Bell"}"#.to_vec());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_find_missing_story_is_not_found(pool: PgPool) {
    let repo = PgStoryRepository::new(pool);

    let result = repo.find(Uuid::new_v4()).await;

    assert!(matches!(result, Err(DomainError::NotFound { entity: "story", .. })));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_duplicate_insert_is_conflict(pool: PgPool) {
    let repo = PgStoryRepository::new(pool);
    let (id, owner_id) = create(&repo).await;

    let result = repo
        .insert(&NewStory {
            id,
            owner_id,
            config: vec![],
        })
        .await;

    assert!(matches!(result, Err(DomainError::Conflict { .. })));
}

// --- complete_stage ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_complete_stage_persists_artifacts(pool: PgPool) {
    let repo = PgStoryRepository::new(pool);
    let (id, _) = create(&repo).await;

    advance_to_sub_tasks(&repo, id, TaskCounters::new(2, 1, 0)).await;

    let story = repo.find(id).await.unwrap();
    assert_eq!(story.status, StoryStatus::SubTasksPending);
    assert_eq!(story.counters, TaskCounters::new(2, 1, 0));
    assert_eq!(story.config, br#"{"goal":"ring the bell"}"#.to_vec());
    assert_eq!(story.scene_plan, Some(b"plan".to_vec()));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_complete_stage_out_of_order_is_invalid_transition(pool: PgPool) {
    let repo = PgStoryRepository::new(pool);
    let (id, _) = create(&repo).await;

    let result = repo.complete_stage(id, &StageArtifact::Finalization).await;

    assert!(matches!(result, Err(DomainError::InvalidTransition { .. })));
    assert_eq!(repo.find(id).await.unwrap().status, StoryStatus::ModerationPending);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_late_report_names_the_stage_it_needed(pool: PgPool) {
    let repo = PgStoryRepository::new(pool);
    let (id, _) = create(&repo).await;

    let result = repo.complete_stage(id, &StageArtifact::FirstScene).await;

    match result {
        Err(DomainError::InvalidTransition { from, expected, .. }) => {
            assert_eq!(from, "moderation_pending");
            assert_eq!(expected.as_deref(), Some("first_scene_pending"));
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_repeated_fan_out_report_leaves_story_untouched(pool: PgPool) {
    let repo = PgStoryRepository::new(pool);
    let (id, _) = create(&repo).await;
    advance_to_sub_tasks(&repo, id, TaskCounters::new(2, 0, 0)).await;
    repo.apply_deltas(
        id,
        TaskDeltas::default().char_gen(-1),
        StoryStatus::SubTasksPending,
        StoryStatus::SetupPending,
    )
    .await
    .unwrap();

    let repeated = repo
        .complete_stage(
            id,
            &StageArtifact::ScenePlan {
                plan: b"other plan".to_vec(),
                fan_out: TaskCounters::new(5, 5, 5),
            },
        )
        .await
        .unwrap();

    assert_eq!(repeated.status, StoryStatus::SubTasksPending);
    assert_eq!(repeated.counters, TaskCounters::new(1, 0, 0));
    assert_eq!(repeated.scene_plan.as_deref(), Some(&b"plan"[..]));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_complete_stage_on_failed_story_is_stale(pool: PgPool) {
    let repo = PgStoryRepository::new(pool);
    let (id, _) = create(&repo).await;
    repo.fail(id, "moderation worker crashed").await.unwrap();

    let result = repo
        .complete_stage(
            id,
            &StageArtifact::Moderation {
                is_adult_content: true,
            },
        )
        .await;

    assert!(matches!(result, Err(DomainError::Stale(_))));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_complete_stage_on_missing_story_is_not_found(pool: PgPool) {
    let repo = PgStoryRepository::new(pool);

    let result = repo
        .complete_stage(Uuid::new_v4(), &StageArtifact::FirstScene)
        .await;

    assert!(matches!(result, Err(DomainError::NotFound { .. })));
}

// --- apply_deltas ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_apply_deltas_scenario_reaches_setup_once(pool: PgPool) {
    let repo = PgStoryRepository::new(pool);
    let (id, _) = create(&repo).await;
    advance_to_sub_tasks(&repo, id, TaskCounters::new(2, 1, 0)).await;

    let first = repo
        .apply_deltas(
            id,
            TaskDeltas::default().char_gen(-1),
            StoryStatus::SubTasksPending,
            StoryStatus::SetupPending,
        )
        .await
        .unwrap();
    let second = repo
        .apply_deltas(
            id,
            TaskDeltas::default().char_gen(-1).card_img(-1),
            StoryStatus::SubTasksPending,
            StoryStatus::SetupPending,
        )
        .await
        .unwrap();

    assert_eq!(first.counters, TaskCounters::new(1, 1, 0));
    assert_eq!(first.status, StoryStatus::SubTasksPending);
    assert!(!first.all_complete);
    assert_eq!(second.counters, TaskCounters::new(0, 0, 0));
    assert_eq!(second.status, StoryStatus::SetupPending);
    assert!(second.all_complete);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_apply_deltas_floors_counters_at_zero(pool: PgPool) {
    let repo = PgStoryRepository::new(pool);
    let (id, _) = create(&repo).await;
    advance_to_sub_tasks(&repo, id, TaskCounters::new(1, 0, 3)).await;

    let outcome = repo
        .apply_deltas(
            id,
            TaskDeltas::default().char_gen(-10),
            StoryStatus::SubTasksPending,
            StoryStatus::SetupPending,
        )
        .await
        .unwrap();

    assert_eq!(outcome.counters, TaskCounters::new(0, 0, 3));
    assert_eq!(outcome.status, StoryStatus::SubTasksPending);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_apply_deltas_keeps_error_status(pool: PgPool) {
    let repo = PgStoryRepository::new(pool);
    let (id, _) = create(&repo).await;
    advance_to_sub_tasks(&repo, id, TaskCounters::new(1, 0, 0)).await;
    repo.fail(id, "character worker crashed").await.unwrap();

    let outcome = repo
        .apply_deltas(
            id,
            TaskDeltas::default().char_gen(-1),
            StoryStatus::SubTasksPending,
            StoryStatus::SetupPending,
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, StoryStatus::Error);
    assert!(!outcome.all_complete);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_concurrent_drain_completes_exactly_once(pool: PgPool) {
    let repo = PgStoryRepository::new(pool);
    let (id, _) = create(&repo).await;
    advance_to_sub_tasks(&repo, id, TaskCounters::new(4, 4, 0)).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            repo.apply_deltas(
                id,
                TaskDeltas::default().char_gen(-1).card_img(-1),
                StoryStatus::SubTasksPending,
                StoryStatus::SetupPending,
            )
            .await
            .unwrap()
        }));
    }
    let mut completions = 0;
    for handle in handles {
        if handle.await.unwrap().all_complete {
            completions += 1;
        }
    }

    assert_eq!(completions, 1);
    let story = repo.find(id).await.unwrap();
    assert_eq!(story.status, StoryStatus::SetupPending);
    assert_eq!(story.counters, TaskCounters::default());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_apply_deltas_missing_story_is_not_found(pool: PgPool) {
    let repo = PgStoryRepository::new(pool);

    let result = repo
        .apply_deltas(
            Uuid::new_v4(),
            TaskDeltas::NONE,
            StoryStatus::SubTasksPending,
            StoryStatus::SetupPending,
        )
        .await;

    assert!(matches!(result, Err(DomainError::NotFound { .. })));
}

// --- fail / delete ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_fail_twice_is_stale(pool: PgPool) {
    let repo = PgStoryRepository::new(pool);
    let (id, _) = create(&repo).await;

    let failed = repo.fail(id, "planner timeout").await.unwrap();
    let again = repo.fail(id, "second report").await;

    assert_eq!(failed.status_view().error_message.as_deref(), Some("planner timeout"));
    assert!(matches!(again, Err(DomainError::Stale(_))));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_delete_by_other_owner_is_forbidden(pool: PgPool) {
    let repo = PgStoryRepository::new(pool);
    let (id, owner_id) = create(&repo).await;

    let forbidden = repo.delete(id, Uuid::new_v4()).await;
    let deleted = repo.delete(id, owner_id).await;

    assert!(matches!(forbidden, Err(DomainError::Forbidden(_))));
    assert!(deleted.is_ok());
    assert!(matches!(repo.find(id).await, Err(DomainError::NotFound { .. })));
}
