//! One room's match lifecycle and per-tick step

use std::time::Instant;

use rand::random;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::util::time::unix_millis;
use crate::ws::protocol::{
    ObjectSnapshot, PlayerInfo, PlayerMatchStats, ResultKind, RoomMember, RoomPhase, ServerMsg,
    Team,
};

use super::outcome::{self, MatchOutcome};
use super::snapshot::{HealthTracker, SnapshotBuilder};
use super::spawner::ObjectSpawner;
use super::state::{MatchState, TickResolution};
use super::vec2::Vec2;
use super::MatchError;

/// Message shown to clients when a match is torn down by a server fault
pub const ABORT_MESSAGE: &str = "match ended unexpectedly";

/// Everything a single tick produced for broadcast
#[derive(Debug)]
pub struct TickOutput {
    pub tick: u64,
    pub dt: f32,
    pub resolution: TickResolution,
    pub health_deltas: Vec<ServerMsg>,
    pub objects: Vec<ObjectSnapshot>,
    pub snapshot: Option<ServerMsg>,
    pub outcome: Option<MatchOutcome>,
}

/// The authoritative match of one room
pub struct GameMatch {
    pub room_id: String,
    pub phase: RoomPhase,
    pub tick: u64,
    pub state: MatchState,
    spawner: ObjectSpawner,
    health: HealthTracker,
    snapshot_builder: SnapshotBuilder,
    events_tx: broadcast::Sender<ServerMsg>,
    last_tick: Option<Instant>,
    max_tick_delta: f32,
    start_time: Option<u64>,
}

impl GameMatch {
    pub fn new(room_id: String, config: &GameConfig, events_tx: broadcast::Sender<ServerMsg>) -> Self {
        Self {
            room_id,
            phase: RoomPhase::Idle,
            tick: 0,
            state: MatchState::new(random::<u64>(), config),
            spawner: ObjectSpawner::new(),
            health: HealthTracker::new(),
            snapshot_builder: SnapshotBuilder::new(config.snapshot_interval()),
            events_tx,
            last_tick: None,
            max_tick_delta: config.max_tick_delta,
            start_time: None,
        }
    }

    pub fn set_events_tx(&mut self, events_tx: broadcast::Sender<ServerMsg>) {
        self.events_tx = events_tx;
    }

    /// `idle -> playing`: build the roster, spawn everyone and announce the start
    pub fn start(&mut self, roster: &[RoomMember], now: Instant) -> Result<(), MatchError> {
        if self.phase == RoomPhase::Playing {
            return Err(MatchError::AlreadyPlaying(self.room_id.clone()));
        }
        if roster.is_empty() {
            return Err(MatchError::EmptyRoster(self.room_id.clone()));
        }

        self.state.reset_state();
        self.state.apply_roster(roster);
        self.reset_for_match()?;

        self.phase = RoomPhase::Playing;
        self.tick = 0;
        self.last_tick = Some(now);
        self.start_time = Some(unix_millis());

        self.publish(ServerMsg::MatchStart {
            room_id: self.room_id.clone(),
            players: self.player_infos(),
        });

        info!(
            room_id = %self.room_id,
            player_count = self.state.players.len(),
            "Match started"
        );
        Ok(())
    }

    /// Respawn players and clear per-match bookkeeping. Refused while playing.
    pub fn reset_for_match(&mut self) -> Result<(), MatchError> {
        if self.phase == RoomPhase::Playing {
            return Err(MatchError::Invariant("reset requested while the match is playing"));
        }
        self.state.reset_for_match();
        self.spawner.reset();
        self.health.prime(&self.state.players);
        Ok(())
    }

    pub fn apply_move_intent(&mut self, player_id: Uuid, intent: Vec2) -> bool {
        self.phase == RoomPhase::Playing && self.state.apply_move_intent(player_id, intent)
    }

    pub fn apply_dash_request(&mut self, player_id: Uuid, target: Vec2) -> bool {
        self.phase == RoomPhase::Playing && self.state.apply_dash_request(player_id, target)
    }

    /// Roster changed while playing. Returns false when nobody is left.
    pub fn apply_roster(&mut self, roster: &[RoomMember]) -> bool {
        let (joined, left) = self.state.apply_roster(roster);
        if !joined.is_empty() || !left.is_empty() {
            info!(
                room_id = %self.room_id,
                joined = joined.len(),
                left = left.len(),
                "Roster updated mid-match"
            );
        }
        !self.state.players.is_empty()
    }

    /// Advance the simulation to `now` without publishing anything
    pub fn step(&mut self, now: Instant) -> Result<TickOutput, MatchError> {
        if self.phase != RoomPhase::Playing {
            return Err(MatchError::Invariant("step on a match that is not playing"));
        }

        let elapsed = self
            .last_tick
            .map(|last| now.saturating_duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        let dt = elapsed.min(self.max_tick_delta);
        self.last_tick = Some(now);
        self.tick += 1;

        let resolution = self.state.update_all(dt, true);

        self.spawner.update(
            dt,
            &mut self.state.objects,
            &mut self.state.rng,
            &self.state.bounds,
        );

        let outcome = outcome::evaluate(&self.state.players)?;

        let health_deltas = self.health.diff(&self.state.players, unix_millis());
        let objects = self.state.objects.snapshots();

        if outcome.is_some() {
            self.snapshot_builder.force_next();
        }
        let snapshot = self
            .snapshot_builder
            .should_send()
            .then(|| self.snapshot_builder.build(self.tick, &self.state.players));

        Ok(TickOutput {
            tick: self.tick,
            dt,
            resolution,
            health_deltas,
            objects,
            snapshot,
            outcome,
        })
    }

    /// Step and broadcast. Returns the outcome once the match is decided.
    pub fn run_tick(&mut self, now: Instant) -> Result<Option<MatchOutcome>, MatchError> {
        let output = self.step(now)?;

        for delta in output.health_deltas {
            self.publish(delta);
        }
        self.publish(ServerMsg::ActiveObjects {
            objects: output.objects,
        });
        if let Some(snapshot) = output.snapshot {
            self.publish(snapshot);
        }

        Ok(output.outcome)
    }

    /// `playing -> ended -> idle`: announce the result and reset for the next vote
    pub fn finish(&mut self, outcome: MatchOutcome) {
        self.phase = RoomPhase::Ended;
        let red_alive = self.state.alive_count(Team::Red);
        let blue_alive = self.state.alive_count(Team::Blue);

        let (kind, winning_team) = match outcome {
            MatchOutcome::Win(team) => (ResultKind::Win, Some(team)),
            MatchOutcome::Draw => (ResultKind::Draw, None),
        };
        self.publish(ServerMsg::MatchResult {
            outcome: kind,
            winning_team,
        });

        let stats = self.build_match_stats();
        let duration_secs = self
            .start_time
            .map(|start| unix_millis().saturating_sub(start) / 1000)
            .unwrap_or(0);

        if let Err(e) = self.reset_for_match() {
            warn!(room_id = %self.room_id, error = %e, "Reset after match failed");
        }

        self.publish(ServerMsg::MatchEnd {
            room_id: self.room_id.clone(),
            players: self.player_infos(),
            stats,
        });

        info!(
            room_id = %self.room_id,
            outcome = ?outcome,
            red_alive,
            blue_alive,
            ticks = self.tick,
            duration_secs,
            "Match ended"
        );

        self.phase = RoomPhase::Idle;
        self.last_tick = None;
    }

    /// Tear the match down after a fault. Clients only see a generic result.
    pub fn abort(&mut self) {
        self.phase = RoomPhase::Ended;
        self.publish(ServerMsg::MatchResult {
            outcome: ResultKind::Aborted,
            winning_team: None,
        });
        self.publish(ServerMsg::Error {
            code: "match_aborted".to_string(),
            message: ABORT_MESSAGE.to_string(),
        });
        self.state.reset_state();
        self.spawner.reset();
        self.phase = RoomPhase::Idle;
        self.last_tick = None;
    }

    /// Stop without a result (everyone left)
    pub fn cancel(&mut self) {
        self.state.reset_state();
        self.spawner.reset();
        self.phase = RoomPhase::Idle;
        self.last_tick = None;
        info!(room_id = %self.room_id, "Match cancelled, no players left");
    }

    pub fn player_infos(&self) -> Vec<PlayerInfo> {
        self.state.players.values().map(|p| p.info()).collect()
    }

    fn build_match_stats(&self) -> Vec<PlayerMatchStats> {
        let mut stats: Vec<PlayerMatchStats> = self
            .state
            .players
            .values()
            .map(|p| PlayerMatchStats {
                player_id: p.id,
                team: p.team,
                damage_dealt: p.damage_dealt,
                damage_taken: p.damage_taken,
                eliminations: p.eliminations,
            })
            .collect();
        stats.sort_by(|a, b| b.damage_dealt.total_cmp(&a.damage_dealt));
        stats
    }

    /// Fire-and-forget; no receivers is not an error
    fn publish(&self, msg: ServerMsg) {
        let _ = self.events_tx.send(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn member(team: Team) -> RoomMember {
        RoomMember {
            player_id: Uuid::new_v4(),
            name: format!("{team:?}"),
            team,
            ready: true,
        }
    }

    fn new_match() -> (GameMatch, broadcast::Receiver<ServerMsg>) {
        let (tx, rx) = broadcast::channel(1024);
        (GameMatch::new("room".into(), &GameConfig::default(), tx), rx)
    }

    fn drain(rx: &mut broadcast::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut msgs = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            msgs.push(msg);
        }
        msgs
    }

    #[test]
    fn test_start_announces_roster() {
        let (mut game, mut rx) = new_match();
        let roster = vec![member(Team::Red), member(Team::Blue)];
        game.start(&roster, Instant::now()).unwrap();

        assert_eq!(game.phase, RoomPhase::Playing);
        let msgs = drain(&mut rx);
        assert!(matches!(&msgs[0], ServerMsg::MatchStart { players, .. } if players.len() == 2));
    }

    #[test]
    fn test_start_twice_rejected() {
        let (mut game, _rx) = new_match();
        let roster = vec![member(Team::Red), member(Team::Blue)];
        game.start(&roster, Instant::now()).unwrap();
        assert!(matches!(
            game.start(&roster, Instant::now()),
            Err(MatchError::AlreadyPlaying(_))
        ));
    }

    #[test]
    fn test_reset_while_playing_is_invariant_violation() {
        let (mut game, _rx) = new_match();
        game.start(&[member(Team::Red), member(Team::Blue)], Instant::now())
            .unwrap();
        assert!(matches!(game.reset_for_match(), Err(MatchError::Invariant(_))));
    }

    #[test]
    fn test_step_uses_elapsed_time_capped() {
        let (mut game, _rx) = new_match();
        let start = Instant::now();
        game.start(&[member(Team::Red), member(Team::Blue)], start).unwrap();

        let output = game.step(start + Duration::from_millis(16)).unwrap();
        assert!((output.dt - 0.016).abs() < 1e-4);

        let output = game.step(start + Duration::from_secs(10)).unwrap();
        assert_eq!(output.dt, GameConfig::default().max_tick_delta);
    }

    #[test]
    fn test_run_tick_emits_objects_every_tick() {
        let (mut game, mut rx) = new_match();
        let start = Instant::now();
        game.start(&[member(Team::Red), member(Team::Blue)], start).unwrap();
        drain(&mut rx);

        for i in 1..=3 {
            game.run_tick(start + Duration::from_millis(16 * i)).unwrap();
        }
        let msgs = drain(&mut rx);
        let object_msgs = msgs
            .iter()
            .filter(|m| matches!(m, ServerMsg::ActiveObjects { .. }))
            .count();
        assert_eq!(object_msgs, 3);
        // Nobody was hurt, so no health deltas
        assert!(!msgs
            .iter()
            .any(|m| matches!(m, ServerMsg::PlayerHealthDelta { .. })));
    }

    #[test]
    fn test_elimination_finishes_and_resets() {
        let (mut game, mut rx) = new_match();
        let red = member(Team::Red);
        let blue = member(Team::Blue);
        let start = Instant::now();
        game.start(&[red.clone(), blue.clone()], start).unwrap();

        game.state.players.get_mut(&red.player_id).unwrap().health = 0.0;
        let outcome = game.run_tick(start + Duration::from_millis(16)).unwrap();
        assert_eq!(outcome, Some(MatchOutcome::Win(Team::Blue)));

        game.finish(MatchOutcome::Win(Team::Blue));
        assert_eq!(game.phase, RoomPhase::Idle);
        assert!(game.state.players.values().all(|p| p.health == p.stats.max_health));

        let msgs = drain(&mut rx);
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMsg::PlayerHealthDelta { player_id, health, .. } if *player_id == red.player_id && *health == 0.0
        )));
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMsg::MatchResult { outcome: ResultKind::Win, winning_team: Some(Team::Blue) }
        )));
        assert!(matches!(msgs.last(), Some(ServerMsg::MatchEnd { .. })));
    }

    #[test]
    fn test_intents_ignored_when_idle() {
        let (mut game, _rx) = new_match();
        assert!(!game.apply_move_intent(Uuid::new_v4(), Vec2::new(1.0, 0.0)));
        assert!(matches!(game.step(Instant::now()), Err(MatchError::Invariant(_))));
    }
}
