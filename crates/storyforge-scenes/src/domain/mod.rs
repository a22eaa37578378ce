//! Domain layer for the Scene Cache context.

pub mod commands;
