//! StoryForge Store — PostgreSQL implementations of the core repository traits.
//!
//! Every method issues one statement, or one transaction for the player
//! reset, so a caller that abandons a future never leaves a partial write.

pub mod config;
pub mod error;
pub mod pg_player_game_state_repository;
pub mod pg_player_progress_repository;
pub mod pg_scene_cache_repository;
pub mod pg_story_repository;
pub mod pg_sweep_repository;
pub mod schema;

pub use config::{ConfigError, StoreConfig};
pub use error::StoreError;
pub use schema::{connect, run_migrations};
