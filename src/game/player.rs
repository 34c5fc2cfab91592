//! Player entity: movement integration, dash and damage rules

use uuid::Uuid;

use crate::ws::protocol::{PlayerInfo, PlayerSnapshot, Team};

use super::collision::Motion;
use super::vec2::{ArenaBounds, Vec2};

/// Tunable per-player stats (skill unlocks may change these between matches)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerStats {
    /// Movement speed in units per second
    pub move_speed: f32,
    /// Fixed dash travel distance
    pub dash_distance: f32,
    /// Seconds before another dash is allowed
    pub dash_cooldown_duration: f32,
    /// Damage dealt to each opponent swept by a dash
    pub dash_damage: f32,
    /// Maximum health
    pub max_health: f32,
}

impl Default for PlayerStats {
    fn default() -> Self {
        Self {
            move_speed: 250.0,
            dash_distance: 300.0,
            dash_cooldown_duration: 2.0,
            dash_damage: 25.0,
            max_health: 100.0,
        }
    }
}

/// Straight-line motion of one player during one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSegment {
    pub player_id: Uuid,
    pub start_pos: Vec2,
    pub velocity: Vec2,
    pub dashing: bool,
    pub start_time: f32,
    pub end_time: f32,
}

impl PlayerSegment {
    pub fn motion(&self) -> Motion {
        Motion {
            start_pos: self.start_pos,
            velocity: self.velocity,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

/// Authoritative player state inside a match
#[derive(Debug, Clone)]
pub struct Player {
    pub id: Uuid,
    pub team: Team,
    pub name: String,

    pub pos: Vec2,
    pub move_vel: Vec2,

    pub dashing: bool,
    pub dash_target_pos: Option<Vec2>,
    pub dash_cooldown_remaining: f32,
    /// Where the pending dash started; cleared once the dash is resolved
    dash_origin: Option<Vec2>,

    pub health: f32,
    pub stats: PlayerStats,

    // Match stats
    pub damage_dealt: f32,
    pub damage_taken: f32,
    pub eliminations: u32,
}

impl Player {
    pub fn new(id: Uuid, name: String, team: Team, spawn: Vec2, stats: PlayerStats) -> Self {
        Self {
            id,
            team,
            name,
            pos: spawn,
            move_vel: Vec2::ZERO,
            dashing: false,
            dash_target_pos: None,
            dash_cooldown_remaining: 0.0,
            dash_origin: None,
            health: stats.max_health,
            stats,
            damage_dealt: 0.0,
            damage_taken: 0.0,
            eliminations: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    /// Advance one tick and return the swept path for the collision pass.
    ///
    /// A pending dash is reported as a single dashing segment from its origin to
    /// the dash target over `[0, dt]`. Otherwise the player integrates its move
    /// velocity and is clamped to the arena.
    pub fn update(&mut self, dt: f32, bounds: &ArenaBounds) -> Vec<PlayerSegment> {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        self.dash_cooldown_remaining = (self.dash_cooldown_remaining - dt).max(0.0);

        if self.dashing {
            let origin = self.dash_origin.unwrap_or(self.pos);
            let velocity = if dt > 0.0 {
                self.pos.sub(origin).divide(dt)
            } else {
                Vec2::ZERO
            };
            let start_pos = if dt > 0.0 { origin } else { self.pos };
            return vec![PlayerSegment {
                player_id: self.id,
                start_pos,
                velocity,
                dashing: true,
                start_time: 0.0,
                end_time: dt,
            }];
        }

        let old_pos = self.pos;
        self.pos = bounds.clamp_pos(old_pos + self.move_vel * dt);

        // Effective velocity, so a wall-clamped path is still described exactly
        let velocity = if dt > 0.0 {
            self.pos.sub(old_pos).divide(dt)
        } else {
            self.move_vel
        };

        vec![PlayerSegment {
            player_id: self.id,
            start_pos: old_pos,
            velocity,
            dashing: false,
            start_time: 0.0,
            end_time: dt,
        }]
    }

    /// Start a dash toward `target`. Returns false (and changes nothing) when
    /// the dash is on cooldown, already in progress, or the player is dead.
    pub fn attempt_dash(&mut self, target: Vec2, bounds: &ArenaBounds) -> bool {
        if !self.is_alive() || self.dashing || self.dash_cooldown_remaining > 0.0 {
            return false;
        }

        let direction = target.sanitize().sub(self.pos).normalize();
        let dash_target = bounds.clamp_pos(self.pos + direction * self.stats.dash_distance);

        self.dash_origin = Some(self.pos);
        self.dashing = true;
        self.dash_target_pos = Some(dash_target);
        self.dash_cooldown_remaining = self.stats.dash_cooldown_duration;
        self.pos = dash_target;
        true
    }

    /// Clear dash state once its segment has gone through a collision pass
    pub fn finish_dash(&mut self) {
        self.dashing = false;
        self.dash_target_pos = None;
        self.dash_origin = None;
    }

    /// Set movement intent; the vector is treated as a direction with magnitude <= 1
    pub fn set_move_intent(&mut self, intent: Vec2) {
        if !self.is_alive() {
            self.move_vel = Vec2::ZERO;
            return;
        }
        self.move_vel = intent.sanitize().clamp_length(1.0) * self.stats.move_speed;
    }

    /// Apply damage; returns the amount actually removed.
    /// No-op while dashing.
    pub fn take_damage(&mut self, amount: f32, _attacker: Option<Uuid>) -> f32 {
        if self.dashing || !amount.is_finite() || amount <= 0.0 {
            return 0.0;
        }
        let before = self.health;
        self.health = (self.health - amount).max(0.0);
        if self.health <= 0.0 {
            self.move_vel = Vec2::ZERO;
        }
        let applied = before - self.health;
        self.damage_taken += applied;
        applied
    }

    /// Restore health up to the cap; returns the amount restored
    pub fn heal(&mut self, amount: f32) -> f32 {
        if !self.is_alive() || !amount.is_finite() || amount <= 0.0 {
            return 0.0;
        }
        let before = self.health;
        self.health = (self.health + amount).min(self.stats.max_health);
        self.health - before
    }

    /// Put the player back into a fresh state for the next match
    pub fn reset_for_match(&mut self, spawn: Vec2) {
        self.pos = spawn;
        self.move_vel = Vec2::ZERO;
        self.finish_dash();
        self.dash_cooldown_remaining = 0.0;
        self.health = self.stats.max_health;
        self.damage_dealt = 0.0;
        self.damage_taken = 0.0;
        self.eliminations = 0;
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            player_id: self.id,
            name: self.name.clone(),
            team: self.team,
            health: self.health,
            max_health: self.stats.max_health,
            x: self.pos.x,
            y: self.pos.y,
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            player_id: self.id,
            x: self.pos.x,
            y: self.pos.y,
            vel_x: self.move_vel.x,
            vel_y: self.move_vel.y,
            health: self.health,
            dashing: self.dashing,
            dash_cooldown: self.dash_cooldown_remaining,
        }
    }
}
