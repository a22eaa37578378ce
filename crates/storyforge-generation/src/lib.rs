//! StoryForge — Generation bounded context.
//!
//! Moves stories through the multi-stage generation pipeline on behalf of
//! stage-workers, and owns the counter-gated exits of the fan-out stages.

pub mod application;
pub mod domain;
