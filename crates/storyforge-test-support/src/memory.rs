//! In-memory store — implements every repository trait behind one mutex, so
//! each call is atomic the way a single SQL statement is.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use storyforge_core::error::DomainError;
use storyforge_core::player::{
    INITIAL_STATE_HASH, NewPlayerProgress, PlayerGameState, PlayerProgress, PlayerStatus,
    check_game_state_overwrite, rejected_game_state_write,
};
use storyforge_core::repository::{
    PlayerGameStateRepository, PlayerProgressRepository, ResetOutcome, STALE_GAME_STATE_MESSAGE,
    STALE_STORY_MESSAGE, SceneCacheRepository, StoryRepository, SweepReport, SweepRepository,
};
use storyforge_core::scene::{SceneCacheEntry, SceneContent, SceneWrite, StoredScene};
use storyforge_core::story::{
    CounterOutcome, NewStory, StageArtifact, Story, StoryStatus, TaskCounters, TaskDeltas,
    rejected_stage_report, rejected_story_write,
};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    stories: HashMap<Uuid, Story>,
    scenes: BTreeMap<(Uuid, String), SceneCacheEntry>,
    progress: HashMap<Uuid, PlayerProgress>,
    game_states: HashMap<Uuid, PlayerGameState>,
}

/// A store that keeps every table in memory.
///
/// Row timestamps come from an internal clock that starts at the time given to
/// [`InMemoryStore::new`] and only moves when a test calls
/// [`InMemoryStore::advance`].
#[derive(Debug)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    now: Mutex<DateTime<Utc>>,
}

impl InMemoryStore {
    /// Create an empty store whose clock reads `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            now: Mutex::new(now),
        }
    }

    /// Move the store clock forward.
    ///
    /// # Panics
    ///
    /// Panics if `by` does not fit a `chrono::TimeDelta` or the mutex is poisoned.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += TimeDelta::from_std(by).unwrap();
    }

    /// The store clock.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    /// Snapshot of a story, if present.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn story(&self, story_id: Uuid) -> Option<Story> {
        self.tables().stories.get(&story_id).cloned()
    }

    /// Number of stored progress nodes across all stories.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn progress_count(&self) -> usize {
        self.tables().progress.len()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }
}

fn require_story(tables: &Tables, story_id: Uuid) -> Result<(), DomainError> {
    if tables.stories.contains_key(&story_id) {
        Ok(())
    } else {
        Err(DomainError::not_found("story", story_id))
    }
}

#[async_trait]
impl StoryRepository for InMemoryStore {
    async fn insert(&self, story: &NewStory) -> Result<Story, DomainError> {
        let now = self.now();
        let mut tables = self.tables();
        if tables.stories.contains_key(&story.id) {
            return Err(DomainError::conflict("story", story.id));
        }
        let created = Story {
            id: story.id,
            owner_id: story.owner_id,
            status: StoryStatus::INITIAL,
            counters: TaskCounters::default(),
            error_details: None,
            config: story.config.clone(),
            scene_plan: None,
            setup: None,
            is_adult_content: false,
            created_at: now,
            updated_at: now,
        };
        tables.stories.insert(story.id, created.clone());
        Ok(created)
    }

    async fn find(&self, story_id: Uuid) -> Result<Story, DomainError> {
        self.tables()
            .stories
            .get(&story_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("story", story_id))
    }

    async fn complete_stage(
        &self,
        story_id: Uuid,
        artifact: &StageArtifact,
    ) -> Result<Story, DomainError> {
        let now = self.now();
        let mut tables = self.tables();
        let story = tables
            .stories
            .get_mut(&story_id)
            .ok_or_else(|| DomainError::not_found("story", story_id))?;
        if artifact.is_recorded_fan_out(story.status) {
            return Ok(story.clone());
        }
        if story.status != artifact.completes() {
            return Err(rejected_stage_report(story_id, story.status, artifact));
        }

        match artifact {
            StageArtifact::Moderation { is_adult_content } => {
                story.is_adult_content = *is_adult_content;
            }
            StageArtifact::ProtagonistGoal { config } => story.config.clone_from(config),
            StageArtifact::ScenePlan { plan, fan_out } => {
                story.scene_plan = Some(plan.clone());
                story.counters = *fan_out;
            }
            StageArtifact::Setup {
                setup,
                character_images,
            } => {
                story.setup = Some(setup.clone());
                story.counters.char_img = story.counters.char_img.saturating_add(*character_images);
            }
            StageArtifact::FirstScene | StageArtifact::SceneJson | StageArtifact::Finalization => {}
        }
        story.status = artifact.advances_to();
        story.error_details = None;
        story.updated_at = now;
        Ok(story.clone())
    }

    async fn apply_deltas(
        &self,
        story_id: Uuid,
        deltas: TaskDeltas,
        source: StoryStatus,
        completion: StoryStatus,
    ) -> Result<CounterOutcome, DomainError> {
        let now = self.now();
        let mut tables = self.tables();
        let story = tables
            .stories
            .get_mut(&story_id)
            .ok_or_else(|| DomainError::not_found("story", story_id))?;

        let previous = story.status;
        story.counters = story.counters.apply(deltas);
        if previous == source && story.counters.all_drained() {
            story.status = completion;
        }
        story.updated_at = now;

        Ok(CounterOutcome {
            counters: story.counters,
            status: story.status,
            all_complete: previous != completion && story.status == completion,
        })
    }

    async fn fail(&self, story_id: Uuid, message: &str) -> Result<Story, DomainError> {
        let now = self.now();
        let mut tables = self.tables();
        let story = tables
            .stories
            .get_mut(&story_id)
            .ok_or_else(|| DomainError::not_found("story", story_id))?;
        if story.status == StoryStatus::Error {
            return Err(rejected_story_write(story_id, story.status, StoryStatus::Error));
        }
        story.status = StoryStatus::Error;
        story.error_details = Some(message.to_owned());
        story.updated_at = now;
        Ok(story.clone())
    }

    async fn delete(&self, story_id: Uuid, owner_id: Uuid) -> Result<(), DomainError> {
        let mut tables = self.tables();
        let story = tables
            .stories
            .get(&story_id)
            .ok_or_else(|| DomainError::not_found("story", story_id))?;
        if story.owner_id != owner_id {
            return Err(DomainError::Forbidden(format!(
                "story {story_id} is not owned by {owner_id}"
            )));
        }
        tables.stories.remove(&story_id);
        tables.scenes.retain(|(id, _), _| *id != story_id);
        tables.progress.retain(|_, p| p.story_id != story_id);
        tables.game_states.retain(|_, s| s.story_id != story_id);
        Ok(())
    }
}

#[async_trait]
impl SceneCacheRepository for InMemoryStore {
    async fn find(&self, story_id: Uuid, state_hash: &str) -> Result<SceneCacheEntry, DomainError> {
        self.tables()
            .scenes
            .get(&(story_id, state_hash.to_owned()))
            .cloned()
            .ok_or_else(|| DomainError::not_found("scene", format!("{story_id}/{state_hash}")))
    }

    async fn store(
        &self,
        story_id: Uuid,
        state_hash: &str,
        content: &SceneContent,
    ) -> Result<StoredScene, DomainError> {
        let now = self.now();
        let mut tables = self.tables();
        require_story(&tables, story_id)?;
        let incoming_placeholder = content.is_placeholder();

        let key = (story_id, state_hash.to_owned());
        let write = match tables.scenes.get_mut(&key) {
            None => {
                tables.scenes.insert(
                    key.clone(),
                    SceneCacheEntry {
                        id: Uuid::new_v4(),
                        story_id,
                        state_hash: state_hash.to_owned(),
                        content: content.clone(),
                        is_placeholder: incoming_placeholder,
                        created_at: now,
                        updated_at: now,
                    },
                );
                SceneWrite::Inserted
            }
            Some(existing) if existing.is_placeholder && !incoming_placeholder => {
                existing.content = content.clone();
                existing.is_placeholder = false;
                existing.updated_at = now;
                SceneWrite::ReplacedPlaceholder
            }
            Some(_) => SceneWrite::KeptExisting,
        };

        let entry = tables
            .scenes
            .get(&key)
            .cloned()
            .ok_or_else(|| DomainError::not_found("scene", format!("{story_id}/{state_hash}")))?;
        Ok(StoredScene { entry, write })
    }

    async fn list_for_story(&self, story_id: Uuid) -> Result<Vec<SceneCacheEntry>, DomainError> {
        let mut entries: Vec<SceneCacheEntry> = self
            .tables()
            .scenes
            .values()
            .filter(|entry| entry.story_id == story_id)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.created_at);
        Ok(entries)
    }
}

#[async_trait]
impl PlayerProgressRepository for InMemoryStore {
    async fn upsert(&self, progress: &NewPlayerProgress) -> Result<Uuid, DomainError> {
        let now = self.now();
        let mut tables = self.tables();
        require_story(&tables, progress.story_id)?;

        if let Some(existing) = tables.progress.values_mut().find(|p| {
            p.story_id == progress.story_id && p.state_hash == progress.state_hash
        }) {
            existing.updated_at = now;
            return Ok(existing.id);
        }

        let id = Uuid::new_v4();
        tables.progress.insert(
            id,
            PlayerProgress {
                id,
                player_id: progress.player_id,
                story_id: progress.story_id,
                scene_index: progress.scene_index,
                state_hash: progress.state_hash.clone(),
                state: progress.state.clone(),
                summaries: progress.summaries.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn find(&self, progress_id: Uuid) -> Result<PlayerProgress, DomainError> {
        self.tables()
            .progress
            .get(&progress_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("player progress", progress_id))
    }

    async fn find_by_hash(
        &self,
        story_id: Uuid,
        state_hash: &str,
    ) -> Result<PlayerProgress, DomainError> {
        self.tables()
            .progress
            .values()
            .find(|p| p.story_id == story_id && p.state_hash == state_hash)
            .cloned()
            .ok_or_else(|| DomainError::not_found("player progress", format!("{story_id}/{state_hash}")))
    }

    async fn reset_player(
        &self,
        player_id: Uuid,
        story_id: Uuid,
    ) -> Result<ResetOutcome, DomainError> {
        let mut tables = self.tables();

        let before = tables.game_states.len();
        tables
            .game_states
            .retain(|_, s| !(s.player_id == player_id && s.story_id == story_id));
        let game_states = before - tables.game_states.len();

        let referenced: HashSet<Uuid> = tables
            .game_states
            .values()
            .map(|s| s.player_progress_id)
            .collect();
        let before = tables.progress.len();
        tables.progress.retain(|id, p| {
            !(p.player_id == player_id
                && p.story_id == story_id
                && p.state_hash != INITIAL_STATE_HASH
                && !referenced.contains(id))
        });
        let progress_nodes = before - tables.progress.len();

        Ok(ResetOutcome {
            game_states: game_states as u64,
            progress_nodes: progress_nodes as u64,
        })
    }
}

#[async_trait]
impl PlayerGameStateRepository for InMemoryStore {
    async fn save(
        &self,
        state: &PlayerGameState,
        now: DateTime<Utc>,
    ) -> Result<PlayerGameState, DomainError> {
        let mut tables = self.tables();
        require_story(&tables, state.story_id)?;
        if !tables.progress.contains_key(&state.player_progress_id) {
            return Err(DomainError::not_found("player progress", state.player_progress_id));
        }
        let duplicate = tables.game_states.values().any(|s| {
            s.id != state.id && s.player_id == state.player_id && s.story_id == state.story_id
        });
        if duplicate {
            return Err(DomainError::conflict(
                "player game state",
                format!("{}/{}", state.player_id, state.story_id),
            ));
        }

        let mut saved = state.clone();
        if state.is_new() {
            saved.id = Uuid::new_v4();
            saved.started_at = now;
        } else {
            let existing = tables
                .game_states
                .get(&state.id)
                .ok_or_else(|| DomainError::not_found("player game state", state.id))?;
            check_game_state_overwrite(state.id, existing.player_status, state.player_status)?;
            saved.started_at = existing.started_at;
        }
        saved.last_activity_at = now;
        tables.game_states.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn find(&self, state_id: Uuid) -> Result<PlayerGameState, DomainError> {
        self.tables()
            .game_states
            .get(&state_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("player game state", state_id))
    }

    async fn update_guarded(
        &self,
        state: &PlayerGameState,
        expected: PlayerStatus,
    ) -> Result<PlayerGameState, DomainError> {
        let mut tables = self.tables();
        let stored = tables
            .game_states
            .get_mut(&state.id)
            .ok_or_else(|| DomainError::not_found("player game state", state.id))?;
        if stored.player_status != expected {
            return Err(rejected_game_state_write(
                state.id,
                stored.player_status,
                state.player_status,
            ));
        }
        let started_at = stored.started_at;
        *stored = state.clone();
        stored.started_at = started_at;
        Ok(stored.clone())
    }

    async fn delete(&self, player_id: Uuid, state_id: Uuid) -> Result<(), DomainError> {
        let mut tables = self.tables();
        let stored = tables
            .game_states
            .get(&state_id)
            .ok_or_else(|| DomainError::not_found("player game state", state_id))?;
        if stored.player_id != player_id {
            return Err(DomainError::Forbidden(format!(
                "game state {state_id} is not owned by {player_id}"
            )));
        }
        tables.game_states.remove(&state_id);
        Ok(())
    }

    async fn list_for_player_story(
        &self,
        player_id: Uuid,
        story_id: Uuid,
    ) -> Result<Vec<PlayerGameState>, DomainError> {
        let mut states: Vec<PlayerGameState> = self
            .tables()
            .game_states
            .values()
            .filter(|s| s.player_id == player_id && s.story_id == story_id)
            .cloned()
            .collect();
        states.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(states)
    }
}

#[async_trait]
impl SweepRepository for InMemoryStore {
    async fn sweep(&self, cutoff: Option<DateTime<Utc>>) -> Result<SweepReport, DomainError> {
        let now = self.now();
        let is_stale = |at: DateTime<Utc>| cutoff.is_none_or(|cutoff| at < cutoff);
        let mut tables = self.tables();
        let mut report = SweepReport::default();

        for story in tables.stories.values_mut() {
            if story.status.is_in_flight() && is_stale(story.updated_at) {
                story.status = StoryStatus::Error;
                story.error_details = Some(STALE_STORY_MESSAGE.to_owned());
                story.updated_at = now;
                report.stories += 1;
            }
        }
        for state in tables.game_states.values_mut() {
            if state.player_status.is_awaiting_generation() && is_stale(state.last_activity_at) {
                state.player_status = PlayerStatus::Error;
                state.error_details = Some(STALE_GAME_STATE_MESSAGE.to_owned());
                state.last_activity_at = now;
                report.game_states += 1;
            }
        }
        Ok(report)
    }
}
