//! StoryForge Core — shared domain abstractions.
//!
//! This crate defines the status machines, domain records, repository traits
//! and error taxonomy that every bounded context depends on. It contains no
//! infrastructure code.

pub mod clock;
pub mod command;
pub mod deadline;
pub mod error;
pub mod player;
pub mod repository;
pub mod scene;
pub mod state_hash;
pub mod story;
