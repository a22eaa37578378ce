//! Command abstractions.
//!
//! Stage-workers talk to the core through commands. Every command carries a
//! correlation ID so one report can be followed across worker, core and store
//! logs.

use uuid::Uuid;

/// Trait that all commands implement.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// The type name for this command (for logging/routing).
    fn command_type(&self) -> &'static str;

    /// Correlation ID to trace this command through the system.
    fn correlation_id(&self) -> Uuid;

    /// The story this command reports on.
    fn story_id(&self) -> Uuid;
}
