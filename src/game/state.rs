//! Per-room match aggregate: players, pickups and one simulation step

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;
use uuid::Uuid;

use crate::config::GameConfig;
use crate::ws::protocol::{ObjectKind, RoomMember, Team};

use super::collision::{detect_dash_contacts, square_circle_contact};
use super::objects::{ObjectPool, PlayerEffect};
use super::player::{Player, PlayerSegment, PlayerStats};
use super::vec2::{ArenaBounds, Vec2};

/// Damage applied by a dash this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DashHit {
    pub attacker_id: Uuid,
    pub target_id: Uuid,
    pub damage: f32,
    pub target_killed: bool,
}

/// A pickup consumed this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickupHit {
    pub player_id: Uuid,
    pub object_id: u32,
    pub kind: ObjectKind,
}

/// Everything resolved during one `update_all`
#[derive(Debug, Default)]
pub struct TickResolution {
    pub segments: Vec<PlayerSegment>,
    pub hits: Vec<DashHit>,
    pub pickups: Vec<PickupHit>,
}

/// Authoritative state of one room's match
pub struct MatchState {
    pub players: BTreeMap<Uuid, Player>,
    pub objects: ObjectPool,
    pub bounds: ArenaBounds,
    /// Side length of the square player hitbox
    pub player_size: f32,
    pub default_stats: PlayerStats,
    pub rng: ChaCha8Rng,
}

impl MatchState {
    pub fn new(seed: u64, config: &GameConfig) -> Self {
        Self {
            players: BTreeMap::new(),
            objects: ObjectPool::for_all_kinds(),
            bounds: ArenaBounds::new(config.map_width, config.map_height),
            player_size: config.player_size,
            default_stats: config.player_stats,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Random spawn on the team's own side of the arena
    pub fn spawn_position(&mut self, team: Team) -> Vec2 {
        let margin = self.player_size;
        let w = self.bounds.width;
        let h = self.bounds.height;
        let (x_min, x_max) = match team {
            Team::Red => (margin, w * 0.25),
            Team::Blue => (w * 0.75, w - margin),
        };
        let x = if x_max > x_min {
            self.rng.gen_range(x_min..x_max)
        } else {
            w * 0.5
        };
        let y = if h > margin * 2.0 {
            self.rng.gen_range(margin..h - margin)
        } else {
            h * 0.5
        };
        self.bounds.clamp_pos(Vec2::new(x, y))
    }

    pub fn alive_count(&self, team: Team) -> usize {
        self.players
            .values()
            .filter(|p| p.team == team && p.is_alive())
            .count()
    }

    /// Replace the whole player list. Only valid between ticks.
    pub fn change_state(&mut self, players: Vec<Player>) {
        self.players = players.into_iter().map(|p| (p.id, p)).collect();
    }

    /// Drop every player and pickup
    pub fn reset_state(&mut self) {
        self.players.clear();
        self.objects.clear();
    }

    /// Sync the player list with a lobby roster. Newcomers get a random
    /// spawn; players missing from the roster are removed. Returns
    /// `(joined, left)` ids.
    pub fn apply_roster(&mut self, roster: &[RoomMember]) -> (Vec<Uuid>, Vec<Uuid>) {
        let left: Vec<Uuid> = self
            .players
            .keys()
            .filter(|id| !roster.iter().any(|m| m.player_id == **id))
            .copied()
            .collect();
        for id in &left {
            self.players.remove(id);
        }

        let mut joined = Vec::new();
        for member in roster {
            if self.players.contains_key(&member.player_id) {
                continue;
            }
            let spawn = self.spawn_position(member.team);
            let player = Player::new(
                member.player_id,
                member.name.clone(),
                member.team,
                spawn,
                self.default_stats,
            );
            self.players.insert(member.player_id, player);
            joined.push(member.player_id);
        }

        (joined, left)
    }

    /// Respawn every player with full health and clear pickups
    pub fn reset_for_match(&mut self) {
        let assignments: Vec<(Uuid, Team)> =
            self.players.values().map(|p| (p.id, p.team)).collect();
        for (id, team) in assignments {
            let spawn = self.spawn_position(team);
            if let Some(player) = self.players.get_mut(&id) {
                player.reset_for_match(spawn);
            }
        }
        self.objects.clear();
    }

    /// Set a player's movement intent. Unknown ids are ignored.
    pub fn apply_move_intent(&mut self, player_id: Uuid, intent: Vec2) -> bool {
        match self.players.get_mut(&player_id) {
            Some(player) => {
                player.set_move_intent(intent);
                true
            }
            None => false,
        }
    }

    /// Try to dash. Returns false when the player is unknown or the dash was refused.
    pub fn apply_dash_request(&mut self, player_id: Uuid, target: Vec2) -> bool {
        let bounds = self.bounds;
        self.players
            .get_mut(&player_id)
            .is_some_and(|p| p.attempt_dash(target, &bounds))
    }

    /// Advance every player and pickup by `dt`.
    ///
    /// With `apply_damage` off (previews) positions advance but no dash or
    /// pickup effects are resolved, and pending dashes stay pending.
    pub fn update_all(&mut self, dt: f32, apply_damage: bool) -> TickResolution {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        let mut segments = Vec::with_capacity(self.players.len());
        for player in self.players.values_mut() {
            segments.extend(player.update(dt, &self.bounds));
        }

        self.update_objects(dt);

        // A dash is swept once, on the first damage-applying tick with dt > 0.
        // Zero-length ticks and previews leave it pending.
        let resolve_dashes = apply_damage && dt > 0.0;

        let mut resolution = TickResolution::default();
        if resolve_dashes {
            resolution.hits = self.resolve_dash_contacts(&segments);
        }
        if apply_damage {
            resolution.pickups = self.collect_pickups(&segments, dt);
        }

        if resolve_dashes {
            for player in self.players.values_mut().filter(|p| p.dashing) {
                player.finish_dash();
            }
        }

        resolution.segments = segments;
        resolution
    }

    /// Integrate drifting pickups and expire the ones past their lifetime or outside the arena
    pub fn update_objects(&mut self, dt: f32) {
        let bounds = self.bounds;
        for object in self.objects.active_mut() {
            object.update(dt, &bounds);
        }
    }

    fn resolve_dash_contacts(&mut self, segments: &[PlayerSegment]) -> Vec<DashHit> {
        let contacts = detect_dash_contacts(segments, &self.players, self.player_size);
        let mut hits = Vec::with_capacity(contacts.len());

        for contact in contacts {
            let Some(damage) = self
                .players
                .get(&contact.attacker_id)
                .filter(|a| a.is_alive())
                .map(|a| a.stats.dash_damage)
            else {
                continue;
            };

            let Some(target) = self.players.get_mut(&contact.target_id) else {
                continue;
            };
            // An earlier contact this tick may already have finished the target
            if !target.is_alive() {
                continue;
            }

            let applied = target.take_damage(damage, Some(contact.attacker_id));
            if applied <= 0.0 {
                continue;
            }
            let target_killed = !target.is_alive();

            if let Some(attacker) = self.players.get_mut(&contact.attacker_id) {
                attacker.damage_dealt += applied;
                if target_killed {
                    attacker.eliminations += 1;
                }
            }

            debug!(
                attacker_id = %contact.attacker_id,
                target_id = %contact.target_id,
                damage = applied,
                killed = target_killed,
                "Dash hit"
            );

            hits.push(DashHit {
                attacker_id: contact.attacker_id,
                target_id: contact.target_id,
                damage: applied,
                target_killed,
            });
        }

        hits
    }

    /// Apply pickup effects to players whose path touched an active pickup.
    /// Dashing players pass through pickups. Each pickup is consumed once, by
    /// the earliest contact (ties go to the lower player id).
    pub fn collect_pickups(&mut self, segments: &[PlayerSegment], dt: f32) -> Vec<PickupHit> {
        let candidates: Vec<_> = self
            .objects
            .active()
            .map(|o| (o.id, o.kind, o.motion(dt), o.config()))
            .collect();

        let mut pickups = Vec::new();
        for (object_id, kind, motion, config) in candidates {
            let toucher = segments
                .iter()
                .filter(|seg| {
                    !seg.dashing
                        && self.players.get(&seg.player_id).is_some_and(|p| p.is_alive())
                })
                .filter_map(|seg| {
                    square_circle_contact(&seg.motion(), self.player_size, &motion, config.radius)
                        .map(|t| (t, seg.player_id))
                })
                .min_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
            let Some((_, player_id)) = toucher else {
                continue;
            };

            if let Some(player) = self.players.get_mut(&player_id) {
                match config.effect {
                    Some(PlayerEffect::Heal(amount)) => {
                        player.heal(amount);
                    }
                    Some(PlayerEffect::Damage(amount)) => {
                        player.take_damage(amount, None);
                    }
                    None => {}
                }
            }

            self.objects.deactivate(object_id);
            pickups.push(PickupHit {
                player_id,
                object_id,
                kind,
            });
        }

        pickups
    }
}
