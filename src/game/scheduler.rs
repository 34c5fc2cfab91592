//! Single shared ticker driving every playing room

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::util::time::Timer;
use crate::ws::protocol::{RoomMember, RoomPhase, ServerMsg};

use super::r#match::GameMatch;
use super::vec2::Vec2;
use super::MatchError;

pub type MatchHandle = Arc<Mutex<GameMatch>>;

/// What one pass over the playing rooms did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub rooms_ticked: usize,
    pub rooms_ended: usize,
    pub rooms_aborted: usize,
}

/// Owns one match aggregate per room and advances the playing ones together.
///
/// `matches` holds every room that has ever started; `ticking` is the subset
/// currently registered with the ticker.
pub struct MatchScheduler {
    config: GameConfig,
    matches: DashMap<String, MatchHandle>,
    ticking: DashMap<String, MatchHandle>,
    ended_tx: mpsc::UnboundedSender<String>,
}

impl MatchScheduler {
    /// The receiver yields room ids whose match just left `playing`
    pub fn new(config: GameConfig) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            config,
            matches: DashMap::new(),
            ticking: DashMap::new(),
            ended_tx,
        };
        (scheduler, ended_rx)
    }

    fn get(&self, room_id: &str) -> Option<MatchHandle> {
        self.matches.get(room_id).map(|entry| entry.value().clone())
    }

    /// Build the roster, start the match and register it with the ticker
    pub fn start_match(
        &self,
        room_id: &str,
        roster: &[RoomMember],
        events_tx: broadcast::Sender<ServerMsg>,
    ) -> Result<(), MatchError> {
        let handle = self
            .matches
            .entry(room_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(GameMatch::new(
                    room_id.to_string(),
                    &self.config,
                    events_tx.clone(),
                )))
            })
            .value()
            .clone();

        let mut game = handle.lock();
        game.set_events_tx(events_tx);
        game.start(roster, Instant::now())?;
        drop(game);

        self.ticking.insert(room_id.to_string(), handle);
        Ok(())
    }

    /// Returns false for unknown rooms, idle matches and stale player ids
    pub fn apply_move_intent(&self, room_id: &str, player_id: Uuid, intent: Vec2) -> bool {
        match self.get(room_id) {
            Some(handle) => handle.lock().apply_move_intent(player_id, intent),
            None => false,
        }
    }

    pub fn apply_dash_request(&self, room_id: &str, player_id: Uuid, target: Vec2) -> bool {
        match self.get(room_id) {
            Some(handle) => handle.lock().apply_dash_request(player_id, target),
            None => false,
        }
    }

    /// Forward a lobby roster change to a playing match
    pub fn update_roster(&self, room_id: &str, roster: &[RoomMember]) {
        let Some(handle) = self.get(room_id) else {
            return;
        };
        let mut game = handle.lock();
        if game.phase != RoomPhase::Playing {
            return;
        }
        if !game.apply_roster(roster) {
            game.cancel();
            drop(game);
            self.deregister(room_id);
        }
    }

    /// Forget a room entirely (last member left the lobby)
    pub fn close_room(&self, room_id: &str) {
        self.ticking.remove(room_id);
        if self.matches.remove(room_id).is_some() {
            debug!(room_id = %room_id, "Match aggregate dropped");
        }
    }

    pub fn is_playing(&self, room_id: &str) -> bool {
        self.ticking.contains_key(room_id)
    }

    pub fn playing_count(&self) -> usize {
        self.ticking.len()
    }

    pub fn room_count(&self) -> usize {
        self.matches.len()
    }

    fn deregister(&self, room_id: &str) {
        self.ticking.remove(room_id);
        let _ = self.ended_tx.send(room_id.to_string());
    }

    /// Advance every playing room once. A fault in one room never stops the others.
    pub fn tick_all(&self, now: Instant) -> TickSummary {
        let mut summary = TickSummary::default();

        let rooms: Vec<(String, MatchHandle)> = self
            .ticking
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (room_id, handle) in rooms {
            let mut game = handle.lock();
            if game.phase != RoomPhase::Playing {
                drop(game);
                self.ticking.remove(&room_id);
                continue;
            }
            summary.rooms_ticked += 1;

            let result = catch_unwind(AssertUnwindSafe(|| game.run_tick(now)));
            match result {
                Ok(Ok(None)) => {}
                Ok(Ok(Some(outcome))) => {
                    game.finish(outcome);
                    drop(game);
                    self.deregister(&room_id);
                    summary.rooms_ended += 1;
                }
                Ok(Err(e)) => {
                    error!(room_id = %room_id, error = %e, "Match tick failed, aborting match");
                    game.abort();
                    drop(game);
                    self.deregister(&room_id);
                    summary.rooms_aborted += 1;
                }
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(room_id = %room_id, reason = %reason, "Match tick panicked, aborting match");
                    game.abort();
                    drop(game);
                    self.deregister(&room_id);
                    summary.rooms_aborted += 1;
                }
            }
        }

        summary
    }

    /// Run the shared tick loop forever
    pub async fn run(self: Arc<Self>) {
        let tick_duration = Duration::from_micros(1_000_000 / self.config.tick_rate.max(1) as u64);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(tick_rate = self.config.tick_rate, "Match scheduler started");

        loop {
            tick_interval.tick().await;

            let timer = Timer::new();
            let summary = self.tick_all(Instant::now());

            let elapsed = timer.elapsed_micros();
            if elapsed > tick_duration.as_micros() as u64 {
                warn!(
                    elapsed_micros = elapsed,
                    rooms = summary.rooms_ticked,
                    "Tick overran its budget"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::{ResultKind, Team};
    use std::time::Duration;

    fn member(team: Team) -> RoomMember {
        RoomMember {
            player_id: Uuid::new_v4(),
            name: "p".into(),
            team,
            ready: true,
        }
    }

    fn scheduler() -> (MatchScheduler, mpsc::UnboundedReceiver<String>) {
        MatchScheduler::new(GameConfig::default())
    }

    #[test]
    fn test_start_registers_room() {
        let (scheduler, _ended) = scheduler();
        let (tx, _rx) = broadcast::channel(64);
        scheduler
            .start_match("a", &[member(Team::Red), member(Team::Blue)], tx)
            .unwrap();

        assert!(scheduler.is_playing("a"));
        assert_eq!(scheduler.playing_count(), 1);
    }

    #[test]
    fn test_empty_roster_rejected() {
        let (scheduler, _ended) = scheduler();
        let (tx, _rx) = broadcast::channel(64);
        assert!(matches!(
            scheduler.start_match("a", &[], tx),
            Err(MatchError::EmptyRoster(_))
        ));
        assert!(!scheduler.is_playing("a"));
    }

    #[test]
    fn test_stale_inputs_are_noops() {
        let (scheduler, _ended) = scheduler();
        assert!(!scheduler.apply_move_intent("nope", Uuid::new_v4(), Vec2::new(1.0, 0.0)));

        let (tx, _rx) = broadcast::channel(64);
        scheduler
            .start_match("a", &[member(Team::Red), member(Team::Blue)], tx)
            .unwrap();
        assert!(!scheduler.apply_dash_request("a", Uuid::new_v4(), Vec2::new(1.0, 0.0)));
    }

    #[test]
    fn test_one_sided_roster_ends_on_first_tick() {
        let (scheduler, mut ended) = scheduler();
        let (tx, mut rx) = broadcast::channel(256);
        scheduler.start_match("solo", &[member(Team::Red)], tx).unwrap();

        let summary = scheduler.tick_all(Instant::now() + Duration::from_millis(16));
        assert_eq!(summary.rooms_ended, 1);
        assert!(!scheduler.is_playing("solo"));
        assert_eq!(ended.try_recv().unwrap(), "solo");

        let mut saw_win = false;
        while let Ok(msg) = rx.try_recv() {
            if let ServerMsg::MatchResult { outcome, winning_team } = msg {
                assert_eq!(outcome, ResultKind::Win);
                assert_eq!(winning_team, Some(Team::Red));
                saw_win = true;
            }
        }
        assert!(saw_win);
    }

    #[test]
    fn test_faulty_room_is_isolated() {
        let (scheduler, mut ended) = scheduler();
        let (tx_bad, mut rx_bad) = broadcast::channel(256);
        let (tx_ok, _rx_ok) = broadcast::channel(256);
        scheduler
            .start_match("bad", &[member(Team::Red), member(Team::Blue)], tx_bad)
            .unwrap();
        scheduler
            .start_match("ok", &[member(Team::Red), member(Team::Blue)], tx_ok)
            .unwrap();

        // Clearing the players of a playing match trips the win-check invariant
        scheduler.get("bad").unwrap().lock().state.players.clear();

        let summary = scheduler.tick_all(Instant::now() + Duration::from_millis(16));
        assert_eq!(summary.rooms_ticked, 2);
        assert_eq!(summary.rooms_aborted, 1);
        assert!(scheduler.is_playing("ok"));
        assert!(!scheduler.is_playing("bad"));
        assert_eq!(ended.try_recv().unwrap(), "bad");

        let mut saw_generic_error = false;
        while let Ok(msg) = rx_bad.try_recv() {
            if let ServerMsg::Error { message, .. } = msg {
                assert_eq!(message, "match ended unexpectedly");
                saw_generic_error = true;
            }
        }
        assert!(saw_generic_error);
    }

    #[test]
    fn test_roster_emptied_mid_match_cancels() {
        let (scheduler, mut ended) = scheduler();
        let (tx, _rx) = broadcast::channel(64);
        scheduler
            .start_match("a", &[member(Team::Red), member(Team::Blue)], tx)
            .unwrap();

        scheduler.update_roster("a", &[]);
        assert!(!scheduler.is_playing("a"));
        assert_eq!(ended.try_recv().unwrap(), "a");
    }

    #[test]
    fn test_close_room_drops_aggregate() {
        let (scheduler, _ended) = scheduler();
        let (tx, _rx) = broadcast::channel(64);
        scheduler
            .start_match("a", &[member(Team::Red), member(Team::Blue)], tx)
            .unwrap();
        scheduler.close_room("a");
        assert_eq!(scheduler.room_count(), 0);
        assert_eq!(scheduler.playing_count(), 0);
    }

    #[tokio::test]
    async fn test_run_loop_advances_matches() {
        let (scheduler, mut ended) = scheduler();
        let scheduler = Arc::new(scheduler);
        let (tx, _rx) = broadcast::channel(256);
        scheduler.start_match("solo", &[member(Team::Blue)], tx).unwrap();

        let runner = tokio::spawn(scheduler.clone().run());
        let room = tokio::time::timeout(Duration::from_secs(2), ended.recv())
            .await
            .unwrap();
        assert_eq!(room.as_deref(), Some("solo"));
        runner.abort();
    }
}
