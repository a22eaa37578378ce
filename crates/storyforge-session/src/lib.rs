//! Session bounded context.
//!
//! Tracks where each player stands in each story: shared progress nodes keyed
//! by narrative state, and one game state per (player, story) pair.

pub mod application;
pub mod domain;
