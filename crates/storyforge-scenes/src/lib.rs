//! Scene Cache bounded context.
//!
//! Generated scenes are stored once per `(story, state hash)` and shared by
//! every player who reaches that narrative state.

pub mod application;
pub mod domain;
