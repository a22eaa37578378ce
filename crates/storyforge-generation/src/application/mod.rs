//! Application layer for the Generation context.

pub mod command_handlers;
pub mod coordinator;
pub mod query_handlers;
