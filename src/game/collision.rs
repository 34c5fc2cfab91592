//! Continuous (swept) collision detection
//!
//! Every entity reports its straight-line motion for the current tick. Two
//! motions are tested against each other over their shared time window with
//! the slab method on relative motion, so a dash that starts on one side of an
//! opponent and ends on the other is still detected.

use std::collections::BTreeMap;

use uuid::Uuid;

use super::player::{Player, PlayerSegment};
use super::vec2::Vec2;

/// Below this squared relative speed two shapes are treated as static
const STATIC_EPSILON: f32 = 1e-9;

/// Straight-line motion over `[start_time, end_time]` (seconds into the tick)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub start_pos: Vec2,
    pub velocity: Vec2,
    pub start_time: f32,
    pub end_time: f32,
}

impl Motion {
    /// Motion of something that does not move during `[0, dt]`
    pub fn stationary(pos: Vec2, dt: f32) -> Self {
        Self {
            start_pos: pos,
            velocity: Vec2::ZERO,
            start_time: 0.0,
            end_time: dt,
        }
    }

    #[inline]
    pub fn position_at(&self, t: f32) -> Vec2 {
        self.start_pos + self.velocity * (t - self.start_time)
    }
}

/// First time at which two axis-aligned squares overlap, if they do.
///
/// `extent` is the combined half-extent of the two shapes (the half size of
/// their Minkowski sum). Returns the absolute contact time within the shared
/// window.
pub fn sweep_time(a: &Motion, b: &Motion, extent: f32) -> Option<f32> {
    let window_start = a.start_time.max(b.start_time);
    let window_end = a.end_time.min(b.end_time);
    if window_start > window_end {
        return None;
    }

    let rel_pos = a.position_at(window_start) - b.position_at(window_start);
    let rel_vel = a.velocity - b.velocity;

    if rel_vel.length_squared() < STATIC_EPSILON {
        return (rel_pos.x.abs() < extent && rel_pos.y.abs() < extent).then_some(window_start);
    }

    let mut t_enter = f32::NEG_INFINITY;
    let mut t_exit = f32::INFINITY;

    for (p, v) in [(rel_pos.x, rel_vel.x), (rel_pos.y, rel_vel.y)] {
        if v.abs() < STATIC_EPSILON {
            // No motion on this axis: must already be inside the slab
            if p.abs() >= extent {
                return None;
            }
            continue;
        }
        let t1 = (-extent - p) / v;
        let t2 = (extent - p) / v;
        t_enter = t_enter.max(t1.min(t2));
        t_exit = t_exit.min(t1.max(t2));
    }

    if t_enter > t_exit || t_exit < 0.0 {
        return None;
    }

    let contact = window_start + t_enter.max(0.0);
    (contact <= window_end).then_some(contact)
}

/// Swept test between two square hitboxes of side `size`
pub fn check_moving_square_collision(a: &PlayerSegment, b: &PlayerSegment, size: f32) -> bool {
    sweep_time(&a.motion(), &b.motion(), size).is_some()
}

/// First contact time between a square hitbox of side `size` and a circular
/// pickup. The circle is approximated by its bounding square.
pub fn square_circle_contact(
    square: &Motion,
    size: f32,
    circle: &Motion,
    radius: f32,
) -> Option<f32> {
    sweep_time(square, circle, size * 0.5 + radius)
}

/// A dash sweeping through an opponent during one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DashContact {
    pub attacker_id: Uuid,
    pub target_id: Uuid,
    /// Seconds into the tick when the hitboxes first touch
    pub time: f32,
}

/// Find every dash contact this tick.
///
/// Only pairs on opposing teams, both alive, with exactly one of them dashing
/// are tested. Each unordered pair is tested once. Contacts come back ordered
/// by contact time, then ids, so resolution is deterministic.
pub fn detect_dash_contacts(
    segments: &[PlayerSegment],
    players: &BTreeMap<Uuid, Player>,
    size: f32,
) -> Vec<DashContact> {
    let mut contacts = Vec::new();

    for i in 0..segments.len() {
        for j in (i + 1)..segments.len() {
            let (a, b) = (&segments[i], &segments[j]);
            if a.dashing == b.dashing {
                continue;
            }

            let (Some(player_a), Some(player_b)) =
                (players.get(&a.player_id), players.get(&b.player_id))
            else {
                continue;
            };

            if player_a.team == player_b.team || !player_a.is_alive() || !player_b.is_alive() {
                continue;
            }

            if let Some(time) = sweep_time(&a.motion(), &b.motion(), size) {
                let (attacker_id, target_id) = if a.dashing {
                    (a.player_id, b.player_id)
                } else {
                    (b.player_id, a.player_id)
                };
                contacts.push(DashContact {
                    attacker_id,
                    target_id,
                    time,
                });
            }
        }
    }

    contacts.sort_by(|x, y| {
        x.time
            .total_cmp(&y.time)
            .then_with(|| x.attacker_id.cmp(&y.attacker_id))
            .then_with(|| x.target_id.cmp(&y.target_id))
    });
    contacts
}
