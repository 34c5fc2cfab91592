//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two sides of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Red,
    Blue,
}

/// Pickup kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Restores health on contact
    HealingAura,
    /// Drifting hazard, damages on contact
    DamageAura,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 2] = [ObjectKind::HealingAura, ObjectKind::DamageAura];
}

/// Room lifecycle as seen by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomPhase {
    /// Lobby, waiting for a ready vote
    Idle,
    /// Match running on the ticker
    Playing,
    /// Result decided, players being reset
    Ended,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Join (or create) a room
    JoinRoom {
        room_id: String,
        #[serde(default)]
        name: Option<String>,
        /// Preferred team; the smaller team is picked when absent
        #[serde(default)]
        team: Option<Team>,
    },

    /// Ready vote for the next match
    SetReady { ready: bool },

    /// Movement direction; magnitude above 1 is clamped
    MoveIntent {
        #[serde(default)]
        x: f32,
        #[serde(default)]
        y: f32,
    },

    /// Dash toward a world point
    DashRequest { x: f32, y: f32 },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave current room
    LeaveRoom,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { player_id: Uuid, server_time: u64 },

    /// Lobby roster changed
    RoomState {
        room_id: String,
        phase: RoomPhase,
        members: Vec<RoomMember>,
    },

    /// Match has started; full roster at spawn
    MatchStart {
        room_id: String,
        players: Vec<PlayerInfo>,
    },

    /// A player's health changed this tick
    PlayerHealthDelta {
        player_id: Uuid,
        health: f32,
        timestamp: u64,
    },

    /// Every active pickup, sent each tick
    ActiveObjects { objects: Vec<ObjectSnapshot> },

    /// Periodic movement snapshot
    Snapshot {
        tick: u64,
        players: Vec<PlayerSnapshot>,
    },

    /// Match decided (or aborted)
    MatchResult {
        outcome: ResultKind,
        winning_team: Option<Team>,
    },

    /// Match is over; roster after reset plus per-player stats
    MatchEnd {
        room_id: String,
        players: Vec<PlayerInfo>,
        stats: Vec<PlayerMatchStats>,
    },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Win,
    Draw,
    /// Ended by a server fault; clients only see this generic outcome
    Aborted,
}

/// Lobby entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMember {
    pub player_id: Uuid,
    pub name: String,
    pub team: Team,
    #[serde(default)]
    pub ready: bool,
}

/// Player identity plus spawn state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub player_id: Uuid,
    pub name: String,
    pub team: Team,
    pub health: f32,
    pub max_health: f32,
    pub x: f32,
    pub y: f32,
}

/// Player state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub player_id: Uuid,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub health: f32,
    pub dashing: bool,
    /// Dash cooldown remaining (0 = can dash)
    pub dash_cooldown: f32,
}

/// Active pickup on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub id: u32,
    pub kind: ObjectKind,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub vel_x: f32,
    #[serde(default)]
    pub vel_y: f32,
    pub radius: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerMatchStats {
    pub player_id: Uuid,
    pub team: Team,
    pub damage_dealt: f32,
    pub damage_taken: f32,
    pub eliminations: u32,
}
