//! Sweeper startup errors.

use storyforge_store::{ConfigError, StoreError};
use thiserror::Error;

/// Errors that stop the sweeper binary before or while it starts.
#[derive(Debug, Error)]
pub enum SweeperError {
    /// A variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pool creation or migration failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
