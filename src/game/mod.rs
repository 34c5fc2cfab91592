//! Game simulation modules

pub mod collision;
pub mod r#match;
pub mod objects;
pub mod outcome;
pub mod player;
pub mod scheduler;
pub mod snapshot;
pub mod spawner;
pub mod state;
pub mod vec2;

pub use scheduler::MatchScheduler;
pub use vec2::Vec2;

/// Simulation errors
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// A state the simulation should never reach
    #[error("Invariant violated: {0}")]
    Invariant(&'static str),

    #[error("Room {0} is already playing")]
    AlreadyPlaying(String),

    #[error("Room {0} has no players to start with")]
    EmptyRoster(String),
}
