//! Application layer for the Scene Cache context.

pub mod command_handlers;
pub mod query_handlers;
