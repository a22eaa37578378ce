//! Scene cache entries keyed by `(story_id, state_hash)`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::DomainError;

/// Opaque scene payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SceneContent(Vec<u8>);

impl SceneContent {
    /// Payload written when a scene is queued but not generated yet.
    pub const PLACEHOLDER: &'static [u8] = b"{}";

    /// Wraps raw bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The reservation payload.
    #[must_use]
    pub fn placeholder() -> Self {
        Self(Self::PLACEHOLDER.to_vec())
    }

    /// Empty JSON object or array, ignoring surrounding ASCII whitespace.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        let trimmed = self.0.trim_ascii();
        trimmed == b"{}" || trimmed == b"[]"
    }

    /// Borrows the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the wrapper.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for SceneContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for SceneContent {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

/// Longest state hash the `state_hash` columns hold, in characters.
pub const MAX_STATE_HASH_LEN: usize = 128;

/// Rejects empty or oversized hashes before they reach the store.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a blank hash or one longer than
/// [`MAX_STATE_HASH_LEN`] characters.
pub fn validate_state_hash(state_hash: &str) -> Result<(), DomainError> {
    if state_hash.trim().is_empty() {
        return Err(DomainError::Validation(
            "state hash must not be empty".to_owned(),
        ));
    }
    let len = state_hash.chars().count();
    if len > MAX_STATE_HASH_LEN {
        return Err(DomainError::Validation(format!(
            "state hash must be at most {MAX_STATE_HASH_LEN} characters, got {len}"
        )));
    }
    Ok(())
}

/// A cached scene row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneCacheEntry {
    /// Row identifier; referenced by player game states.
    pub id: Uuid,
    /// Owning story.
    pub story_id: Uuid,
    /// Narrative state this scene was generated for.
    pub state_hash: String,
    /// Stored payload.
    pub content: SceneContent,
    /// Persisted result of [`SceneContent::is_placeholder`].
    pub is_placeholder: bool,
    /// First write.
    pub created_at: DateTime<Utc>,
    /// Last write.
    pub updated_at: DateTime<Utc>,
}

/// How a cache write resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneWrite {
    /// No entry existed.
    Inserted,
    /// A placeholder was overwritten.
    ReplacedPlaceholder,
    /// A real entry already existed and was left untouched.
    KeptExisting,
}

/// The canonical entry after a write, plus how the write resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredScene {
    /// The entry as it now exists in the store.
    pub entry: SceneCacheEntry,
    /// Outcome of this particular write.
    pub write: SceneWrite,
}
