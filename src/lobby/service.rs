//! Lobby service - room membership and hand-off to the match scheduler

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::game::{MatchError, MatchScheduler};
use crate::ws::protocol::{RoomPhase, ServerMsg, Team};

use super::roster::Room;

/// Longest accepted room id
const MAX_ROOM_ID_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error("Room id must be 1-32 characters of [A-Za-z0-9_-]")]
    InvalidRoomId,

    #[error("Not in a room")]
    NotInRoom,

    #[error("A match is already running in this room")]
    MatchInProgress,

    #[error(transparent)]
    Match(#[from] MatchError),
}

impl LobbyError {
    /// Stable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            LobbyError::InvalidRoomId => "invalid_room_id",
            LobbyError::NotInRoom => "not_in_room",
            LobbyError::MatchInProgress => "match_in_progress",
            LobbyError::Match(_) => "match_error",
        }
    }
}

/// Room listing entry for `GET /rooms`
#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub room_id: String,
    pub phase: RoomPhase,
    pub red: usize,
    pub blue: usize,
}

/// Lobby service
pub struct LobbyService {
    rooms: DashMap<String, Arc<Mutex<Room>>>,
    /// Map of player -> current room
    player_rooms: DashMap<Uuid, String>,
    scheduler: Arc<MatchScheduler>,
}

impl LobbyService {
    pub fn new(scheduler: Arc<MatchScheduler>) -> Self {
        Self {
            rooms: DashMap::new(),
            player_rooms: DashMap::new(),
            scheduler,
        }
    }

    fn room(&self, room_id: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms.get(room_id).map(|entry| entry.value().clone())
    }

    fn phase_of(&self, room_id: &str) -> RoomPhase {
        if self.scheduler.is_playing(room_id) {
            RoomPhase::Playing
        } else {
            RoomPhase::Idle
        }
    }

    /// Join (or create) a room. Leaves any previous room first.
    /// Returns the room's event stream, subscribed before the roster broadcast.
    pub fn join_room(
        &self,
        player_id: Uuid,
        room_id: &str,
        name: Option<String>,
        team: Option<Team>,
    ) -> Result<broadcast::Receiver<ServerMsg>, LobbyError> {
        if !valid_room_id(room_id) {
            return Err(LobbyError::InvalidRoomId);
        }
        if self.scheduler.is_playing(room_id) {
            return Err(LobbyError::MatchInProgress);
        }

        if self.room_of(player_id).is_some() {
            self.leave_room(player_id);
        }

        let room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Room::new(room_id.to_string()))))
            .value()
            .clone();

        let mut room = room.lock();
        self.admit(&mut room, player_id, name, team)
    }

    /// Add a player to a locked room. Matches start under the room lock, so
    /// the phase seen here cannot change until the join is done.
    fn admit(
        &self,
        room: &mut Room,
        player_id: Uuid,
        name: Option<String>,
        team: Option<Team>,
    ) -> Result<broadcast::Receiver<ServerMsg>, LobbyError> {
        let room_id = room.id.clone();
        if self.scheduler.is_playing(&room_id) {
            return Err(LobbyError::MatchInProgress);
        }

        let rx = room.subscribe();
        let member = room.join(player_id, name, team);
        self.player_rooms.insert(player_id, room_id.clone());

        info!(
            player_id = %player_id,
            room_id = %room_id,
            team = ?member.team,
            members = room.len(),
            "Player joined room"
        );

        room.broadcast(room.state_msg(RoomPhase::Idle));
        Ok(rx)
    }

    /// Leave the current room; no-op when not in one
    pub fn leave_room(&self, player_id: Uuid) {
        let Some((_, room_id)) = self.player_rooms.remove(&player_id) else {
            return;
        };
        let Some(handle) = self.room(&room_id) else {
            return;
        };

        let mut room = handle.lock();
        room.leave(player_id);
        info!(player_id = %player_id, room_id = %room_id, "Player left room");

        if room.is_empty() {
            drop(room);
            self.rooms.remove(&room_id);
            self.scheduler.close_room(&room_id);
            info!(room_id = %room_id, "Room closed");
            return;
        }

        if self.scheduler.is_playing(&room_id) {
            self.scheduler.update_roster(&room_id, room.members());
        }
        room.broadcast(room.state_msg(self.phase_of(&room_id)));
    }

    /// Record a ready vote; starts the match once everyone is ready
    pub fn set_ready(&self, player_id: Uuid, ready: bool) -> Result<(), LobbyError> {
        let room_id = self.room_of(player_id).ok_or(LobbyError::NotInRoom)?;
        let handle = self.room(&room_id).ok_or(LobbyError::NotInRoom)?;

        let mut room = handle.lock();
        if self.scheduler.is_playing(&room_id) {
            return Err(LobbyError::MatchInProgress);
        }
        if !room.set_ready(player_id, ready) {
            return Err(LobbyError::NotInRoom);
        }

        if room.all_ready() {
            self.scheduler
                .start_match(&room_id, room.members(), room.events_tx())?;
            room.broadcast(room.state_msg(RoomPhase::Playing));
        } else {
            room.broadcast(room.state_msg(RoomPhase::Idle));
        }
        Ok(())
    }

    /// Match over: clear the vote so the room can ready up again
    pub fn handle_match_ended(&self, room_id: &str) {
        let Some(handle) = self.room(room_id) else {
            return;
        };
        let mut room = handle.lock();
        room.clear_ready();
        room.broadcast(room.state_msg(RoomPhase::Idle));
    }

    /// Consume end notifications from the scheduler
    pub async fn run(self: Arc<Self>, mut ended_rx: mpsc::UnboundedReceiver<String>) {
        while let Some(room_id) = ended_rx.recv().await {
            self.handle_match_ended(&room_id);
        }
        warn!("Match end channel closed, lobby listener stopping");
    }

    pub fn room_of(&self, player_id: Uuid) -> Option<String> {
        self.player_rooms.get(&player_id).map(|r| r.value().clone())
    }

    pub fn player_count(&self) -> usize {
        self.player_rooms.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room_summary(&self, room_id: &str) -> Option<RoomSummary> {
        self.room(room_id).map(|handle| self.summarize(&handle.lock()))
    }

    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        let handles: Vec<Arc<Mutex<Room>>> =
            self.rooms.iter().map(|entry| entry.value().clone()).collect();

        let mut rooms: Vec<RoomSummary> = handles
            .iter()
            .map(|handle| self.summarize(&handle.lock()))
            .collect();
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        rooms
    }

    fn summarize(&self, room: &Room) -> RoomSummary {
        RoomSummary {
            room_id: room.id.clone(),
            phase: self.phase_of(&room.id),
            red: room.team_size(Team::Red),
            blue: room.team_size(Team::Blue),
        }
    }
}

fn valid_room_id(room_id: &str) -> bool {
    !room_id.is_empty()
        && room_id.len() <= MAX_ROOM_ID_LEN
        && room_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;

    fn lobby() -> (LobbyService, mpsc::UnboundedReceiver<String>) {
        let (scheduler, ended_rx) = MatchScheduler::new(GameConfig::default());
        (LobbyService::new(Arc::new(scheduler)), ended_rx)
    }

    fn drain(rx: &mut broadcast::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut msgs = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            msgs.push(msg);
        }
        msgs
    }

    #[test]
    fn test_join_broadcasts_room_state() {
        let (lobby, _ended) = lobby();
        let mut rx = lobby
            .join_room(Uuid::new_v4(), "arena", Some("a".into()), None)
            .unwrap();

        let msgs = drain(&mut rx);
        assert!(matches!(
            &msgs[..],
            [ServerMsg::RoomState { phase: RoomPhase::Idle, members, .. }] if members.len() == 1
        ));
    }

    #[test]
    fn test_invalid_room_id_rejected() {
        let (lobby, _ended) = lobby();
        assert!(matches!(
            lobby.join_room(Uuid::new_v4(), "bad room!", None, None),
            Err(LobbyError::InvalidRoomId)
        ));
        assert!(matches!(
            lobby.join_room(Uuid::new_v4(), "", None, None),
            Err(LobbyError::InvalidRoomId)
        ));
    }

    #[test]
    fn test_ready_vote_starts_match() {
        let (lobby, _ended) = lobby();
        let red = Uuid::new_v4();
        let blue = Uuid::new_v4();
        let mut rx = lobby.join_room(red, "arena", None, Some(Team::Red)).unwrap();
        lobby.join_room(blue, "arena", None, Some(Team::Blue)).unwrap();

        lobby.set_ready(red, true).unwrap();
        assert!(!lobby.scheduler.is_playing("arena"));
        lobby.set_ready(blue, true).unwrap();
        assert!(lobby.scheduler.is_playing("arena"));

        let msgs = drain(&mut rx);
        assert!(msgs.iter().any(|m| matches!(m, ServerMsg::MatchStart { .. })));
        assert!(matches!(
            lobby.set_ready(red, false),
            Err(LobbyError::MatchInProgress)
        ));
    }

    #[test]
    fn test_join_while_playing_rejected() {
        let (lobby, _ended) = lobby();
        let red = Uuid::new_v4();
        let blue = Uuid::new_v4();
        lobby.join_room(red, "arena", None, Some(Team::Red)).unwrap();
        lobby.join_room(blue, "arena", None, Some(Team::Blue)).unwrap();
        lobby.set_ready(red, true).unwrap();
        lobby.set_ready(blue, true).unwrap();

        assert!(matches!(
            lobby.join_room(Uuid::new_v4(), "arena", None, None),
            Err(LobbyError::MatchInProgress)
        ));
    }

    #[test]
    fn test_admit_rechecks_phase_under_room_lock() {
        let (lobby, _ended) = lobby();
        let red = Uuid::new_v4();
        let blue = Uuid::new_v4();
        lobby.join_room(red, "arena", None, Some(Team::Red)).unwrap();
        lobby.join_room(blue, "arena", None, Some(Team::Blue)).unwrap();
        lobby.set_ready(red, true).unwrap();
        lobby.set_ready(blue, true).unwrap();

        // A joiner that passed the unlocked check before the match started
        let late = Uuid::new_v4();
        let handle = lobby.room("arena").unwrap();
        let mut room = handle.lock();
        assert!(matches!(
            lobby.admit(&mut room, late, None, None),
            Err(LobbyError::MatchInProgress)
        ));
        assert_eq!(room.len(), 2);
        assert!(!room.contains(late));
        drop(room);
        assert!(lobby.room_of(late).is_none());
    }

    #[test]
    fn test_end_listener_wakes_on_match_end() {
        use tokio_test::{assert_pending, task};

        let (scheduler, ended_rx) = MatchScheduler::new(GameConfig::default());
        let scheduler = Arc::new(scheduler);
        let lobby = Arc::new(LobbyService::new(scheduler.clone()));
        let mut listener = task::spawn(lobby.clone().run(ended_rx));
        assert_pending!(listener.poll());

        let red = Uuid::new_v4();
        let blue = Uuid::new_v4();
        let mut rx = lobby.join_room(red, "arena", None, Some(Team::Red)).unwrap();
        lobby.join_room(blue, "arena", None, Some(Team::Blue)).unwrap();
        lobby.set_ready(red, true).unwrap();
        lobby.set_ready(blue, true).unwrap();
        lobby.leave_room(blue);
        drain(&mut rx);

        scheduler.tick_all(std::time::Instant::now() + std::time::Duration::from_millis(16));
        assert!(listener.is_woken());
        assert_pending!(listener.poll());

        let msgs = drain(&mut rx);
        assert!(matches!(
            msgs.last(),
            Some(ServerMsg::RoomState { phase: RoomPhase::Idle, members, .. })
                if members.len() == 1 && !members[0].ready
        ));
    }

    #[test]
    fn test_last_leave_closes_room() {
        let (lobby, _ended) = lobby();
        let id = Uuid::new_v4();
        lobby.join_room(id, "arena", None, None).unwrap();
        assert_eq!(lobby.room_count(), 1);

        lobby.leave_room(id);
        assert_eq!(lobby.room_count(), 0);
        assert_eq!(lobby.player_count(), 0);
        assert!(lobby.room_of(id).is_none());
    }

    #[test]
    fn test_set_ready_outside_room() {
        let (lobby, _ended) = lobby();
        assert!(matches!(
            lobby.set_ready(Uuid::new_v4(), true),
            Err(LobbyError::NotInRoom)
        ));
    }

    #[test]
    fn test_list_rooms_counts_teams() {
        let (lobby, _ended) = lobby();
        lobby.join_room(Uuid::new_v4(), "b-room", None, Some(Team::Blue)).unwrap();
        lobby.join_room(Uuid::new_v4(), "a-room", None, Some(Team::Red)).unwrap();
        lobby.join_room(Uuid::new_v4(), "a-room", None, Some(Team::Red)).unwrap();

        let rooms = lobby.list_rooms();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].room_id, "a-room");
        assert_eq!(rooms[0].red, 2);
        assert_eq!(rooms[1].blue, 1);
    }

    #[tokio::test]
    async fn test_match_end_clears_ready_votes() {
        let (scheduler, ended_rx) = MatchScheduler::new(GameConfig::default());
        let scheduler = Arc::new(scheduler);
        let lobby = Arc::new(LobbyService::new(scheduler.clone()));
        let listener = tokio::spawn(lobby.clone().run(ended_rx));

        let red = Uuid::new_v4();
        let blue = Uuid::new_v4();
        let mut rx = lobby.join_room(red, "arena", None, Some(Team::Red)).unwrap();
        lobby.join_room(blue, "arena", None, Some(Team::Blue)).unwrap();
        lobby.set_ready(red, true).unwrap();
        lobby.set_ready(blue, true).unwrap();
        drain(&mut rx);

        // Blue leaves mid-match; red wins on the next tick
        lobby.leave_room(blue);
        scheduler.tick_all(std::time::Instant::now() + std::time::Duration::from_millis(16));
        assert!(!scheduler.is_playing("arena"));

        let idle_with_votes_cleared = tokio::time::timeout(std::time::Duration::from_secs(1), async {
            loop {
                match rx.recv().await {
                    Ok(ServerMsg::RoomState { phase: RoomPhase::Idle, members, .. })
                        if members.iter().all(|m| !m.ready) && members.len() == 1 =>
                    {
                        break true
                    }
                    Ok(_) => continue,
                    Err(_) => break false,
                }
            }
        })
        .await
        .unwrap();
        assert!(idle_with_votes_cleared);
        listener.abort();
    }
}
