//! Domain layer for the Generation context.

pub mod commands;
