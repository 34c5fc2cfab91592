//! Snapshot pacing and health-delta tracking

use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::ws::protocol::{PlayerSnapshot, ServerMsg};

use super::player::Player;

/// Paces full movement snapshots to a lower rate than the simulation
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used for important events)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    pub fn build(&self, tick: u64, players: &BTreeMap<Uuid, Player>) -> ServerMsg {
        let players: Vec<PlayerSnapshot> = players.values().map(Player::snapshot).collect();
        ServerMsg::Snapshot { tick, players }
    }
}

/// Remembers the last health sent per player so only changes go out
#[derive(Debug, Default)]
pub struct HealthTracker {
    last_sent: HashMap<Uuid, f32>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking from the current roster without emitting anything
    pub fn prime(&mut self, players: &BTreeMap<Uuid, Player>) {
        self.last_sent = players.iter().map(|(id, p)| (*id, p.health)).collect();
    }

    /// Health deltas for players whose health changed since the last call
    pub fn diff(&mut self, players: &BTreeMap<Uuid, Player>, timestamp: u64) -> Vec<ServerMsg> {
        let mut deltas = Vec::new();
        for (id, player) in players {
            let changed = self
                .last_sent
                .get(id)
                .map_or(true, |last| *last != player.health);
            if changed {
                self.last_sent.insert(*id, player.health);
                deltas.push(ServerMsg::PlayerHealthDelta {
                    player_id: *id,
                    health: player.health,
                    timestamp,
                });
            }
        }
        self.last_sent.retain(|id, _| players.contains_key(id));
        deltas
    }
}
