//! Time-gated pickup spawner

use std::collections::HashMap;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::ws::protocol::ObjectKind;

use super::objects::{ObjectConfig, ObjectPool};
use super::vec2::{ArenaBounds, Vec2};

/// Schedules pickups so each kind has at most one pending spawn and never
/// exceeds its configured maximum.
#[derive(Debug, Default)]
pub struct ObjectSpawner {
    /// Seconds left before the pending object of each kind materializes
    pending: HashMap<ObjectKind, f32>,
}

impl ObjectSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self, kind: ObjectKind) -> bool {
        self.pending.contains_key(&kind)
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Advance spawn timers by `dt`. Returns ids of objects that appeared this tick.
    pub fn update(
        &mut self,
        dt: f32,
        pool: &mut ObjectPool,
        rng: &mut ChaCha8Rng,
        bounds: &ArenaBounds,
    ) -> Vec<u32> {
        let mut spawned = Vec::new();

        for kind in ObjectKind::ALL {
            let Some(remaining) = self.pending.get_mut(&kind) else {
                continue;
            };
            *remaining -= dt;
            if *remaining > 0.0 {
                continue;
            }
            self.pending.remove(&kind);

            let config = ObjectConfig::for_kind(kind);
            if pool.count_active(kind) >= config.max_count {
                continue;
            }

            let pos = random_position(rng, bounds, config.radius);
            let vel = if config.speed > 0.0 {
                let angle = rng.gen_range(0.0..std::f32::consts::TAU);
                Vec2::new(angle.cos(), angle.sin()) * config.speed
            } else {
                Vec2::ZERO
            };

            match pool.spawn(kind, pos, vel) {
                Some(id) => {
                    debug!(object_id = id, kind = ?kind, x = pos.x, y = pos.y, "Pickup spawned");
                    spawned.push(id);
                }
                None => warn!(kind = ?kind, "Object pool exhausted, spawn dropped"),
            }
        }

        for kind in ObjectKind::ALL {
            let config = ObjectConfig::for_kind(kind);
            if pool.count_active(kind) < config.max_count && !self.pending.contains_key(&kind) {
                self.pending.insert(kind, config.spawn_delay);
            }
        }

        spawned
    }
}

/// Uniform position at least `margin` away from the arena edges
pub fn random_position(rng: &mut ChaCha8Rng, bounds: &ArenaBounds, margin: f32) -> Vec2 {
    let axis = |rng: &mut ChaCha8Rng, extent: f32| {
        if extent > margin * 2.0 {
            rng.gen_range(margin..extent - margin)
        } else {
            extent * 0.5
        }
    };
    let x = axis(rng, bounds.width);
    let y = axis(rng, bounds.height);
    Vec2::new(x, y)
}
