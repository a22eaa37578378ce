//! StoryForge stale-task sweeper.
//!
//! Force-fails stories and player game states stuck in an in-flight status
//! past a threshold, and runs that pass on a fixed schedule.

pub mod config;
pub mod error;
pub mod runner;
pub mod sweep;

pub use config::SweeperConfig;
pub use error::SweeperError;
pub use runner::SweeperRunner;
pub use sweep::sweep;
