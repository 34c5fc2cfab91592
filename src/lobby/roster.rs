//! Room roster: members, team choice and ready vote

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ws::protocol::{RoomMember, RoomPhase, ServerMsg, Team};

/// Broadcast buffer per room
const ROOM_CHANNEL_CAPACITY: usize = 256;

/// Longest accepted display name
const MAX_NAME_LEN: usize = 24;

/// One lobby room
pub struct Room {
    pub id: String,
    /// Members in join order
    members: Vec<RoomMember>,
    events_tx: broadcast::Sender<ServerMsg>,
}

impl Room {
    pub fn new(id: String) -> Self {
        let (events_tx, _) = broadcast::channel(ROOM_CHANNEL_CAPACITY);
        Self {
            id,
            members: Vec::new(),
            events_tx,
        }
    }

    pub fn events_tx(&self) -> broadcast::Sender<ServerMsg> {
        self.events_tx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.events_tx.subscribe()
    }

    pub fn members(&self) -> &[RoomMember] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, player_id: Uuid) -> bool {
        self.members.iter().any(|m| m.player_id == player_id)
    }

    pub fn team_size(&self, team: Team) -> usize {
        self.members.iter().filter(|m| m.team == team).count()
    }

    /// Team with fewer members; red on a tie
    pub fn smaller_team(&self) -> Team {
        if self.team_size(Team::Blue) < self.team_size(Team::Red) {
            Team::Blue
        } else {
            Team::Red
        }
    }

    /// Add (or re-add) a member. Returns the stored entry.
    pub fn join(&mut self, player_id: Uuid, name: Option<String>, team: Option<Team>) -> RoomMember {
        self.members.retain(|m| m.player_id != player_id);

        let member = RoomMember {
            player_id,
            name: sanitize_name(name, player_id),
            team: team.unwrap_or_else(|| self.smaller_team()),
            ready: false,
        };
        self.members.push(member.clone());
        member
    }

    pub fn leave(&mut self, player_id: Uuid) -> Option<RoomMember> {
        let pos = self.members.iter().position(|m| m.player_id == player_id)?;
        Some(self.members.remove(pos))
    }

    /// Returns false if the player is not a member
    pub fn set_ready(&mut self, player_id: Uuid, ready: bool) -> bool {
        match self.members.iter_mut().find(|m| m.player_id == player_id) {
            Some(member) => {
                member.ready = ready;
                true
            }
            None => false,
        }
    }

    /// Everyone ready and both teams represented
    pub fn all_ready(&self) -> bool {
        !self.members.is_empty()
            && self.members.iter().all(|m| m.ready)
            && self.team_size(Team::Red) > 0
            && self.team_size(Team::Blue) > 0
    }

    pub fn clear_ready(&mut self) {
        for member in &mut self.members {
            member.ready = false;
        }
    }

    pub fn state_msg(&self, phase: RoomPhase) -> ServerMsg {
        ServerMsg::RoomState {
            room_id: self.id.clone(),
            phase,
            members: self.members.clone(),
        }
    }

    /// Fire-and-forget
    pub fn broadcast(&self, msg: ServerMsg) {
        let _ = self.events_tx.send(msg);
    }
}

fn sanitize_name(name: Option<String>, player_id: Uuid) -> String {
    let trimmed: String = name
        .unwrap_or_default()
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_LEN)
        .collect();

    if trimmed.is_empty() {
        let short = player_id.simple().to_string();
        format!("Player-{}", &short[..6])
    } else {
        trimmed
    }
}
