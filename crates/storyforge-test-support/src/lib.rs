//! Shared test doubles for the StoryForge generation core.

mod clock;
mod failing;
mod memory;

pub use clock::FixedClock;
pub use failing::FailingStore;
pub use memory::InMemoryStore;
