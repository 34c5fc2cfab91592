//! Lobby: rooms, team choice and ready votes

pub mod roster;
pub mod service;

pub use service::{LobbyService, RoomSummary};
