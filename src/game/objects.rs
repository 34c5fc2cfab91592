//! Pickups and the fixed-capacity pool that holds them

use crate::ws::protocol::{ObjectKind, ObjectSnapshot};

use super::collision::Motion;
use super::vec2::{ArenaBounds, Vec2};

/// What touching a pickup does to a player
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEffect {
    Heal(f32),
    Damage(f32),
}

/// Static per-kind pickup configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectConfig {
    pub radius: f32,
    /// Speed of drift in a random direction; zero means stationary
    pub speed: f32,
    pub effect: Option<PlayerEffect>,
    /// Maximum number active at once
    pub max_count: usize,
    /// Seconds between a spawn being scheduled and the object appearing
    pub spawn_delay: f32,
    /// Seconds before an untouched object expires
    pub lifetime: Option<f32>,
}

impl ObjectConfig {
    pub fn for_kind(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::HealingAura => Self {
                radius: 20.0,
                speed: 0.0,
                effect: Some(PlayerEffect::Heal(20.0)),
                max_count: 3,
                spawn_delay: 5.0,
                lifetime: Some(20.0),
            },
            ObjectKind::DamageAura => Self {
                radius: 25.0,
                speed: 60.0,
                effect: Some(PlayerEffect::Damage(15.0)),
                max_count: 2,
                spawn_delay: 8.0,
                lifetime: None,
            },
        }
    }
}

/// A pickup slot. Inactive slots are skipped until reused.
#[derive(Debug, Clone)]
pub struct GameObject {
    pub id: u32,
    pub kind: ObjectKind,
    pub pos: Vec2,
    pub vel: Vec2,
    pub is_active: bool,
    pub age: f32,
    /// Position at the start of the current tick
    prev_pos: Vec2,
}

impl GameObject {
    pub fn config(&self) -> ObjectConfig {
        ObjectConfig::for_kind(self.kind)
    }

    /// Path travelled during the last `update` of length `dt`
    pub fn motion(&self, dt: f32) -> Motion {
        Motion {
            start_pos: self.prev_pos,
            velocity: self.vel,
            start_time: 0.0,
            end_time: dt,
        }
    }

    /// Move and age the object; deactivates it when it expires or leaves the arena
    pub fn update(&mut self, dt: f32, bounds: &ArenaBounds) {
        self.prev_pos = self.pos;
        self.pos = self.pos + self.vel * dt;
        self.age += dt;

        let expired = self.config().lifetime.is_some_and(|l| self.age >= l);
        if expired || !bounds.contains(self.pos) {
            self.is_active = false;
        }
    }

    pub fn snapshot(&self) -> ObjectSnapshot {
        ObjectSnapshot {
            id: self.id,
            kind: self.kind,
            x: self.pos.x,
            y: self.pos.y,
            vel_x: self.vel.x,
            vel_y: self.vel.y,
            radius: self.config().radius,
        }
    }
}

/// Slot arena for pickups; slots are reused instead of reallocated
#[derive(Debug, Clone)]
pub struct ObjectPool {
    slots: Vec<GameObject>,
    capacity: usize,
}

impl ObjectPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Pool sized for every configured kind at its maximum count
    pub fn for_all_kinds() -> Self {
        let capacity = ObjectKind::ALL
            .iter()
            .map(|k| ObjectConfig::for_kind(*k).max_count)
            .sum();
        Self::new(capacity)
    }

    /// Activate an object in the first free slot. Returns its id, or None when full.
    pub fn spawn(&mut self, kind: ObjectKind, pos: Vec2, vel: Vec2) -> Option<u32> {
        if let Some(slot) = self.slots.iter_mut().find(|o| !o.is_active) {
            slot.kind = kind;
            slot.pos = pos;
            slot.prev_pos = pos;
            slot.vel = vel;
            slot.age = 0.0;
            slot.is_active = true;
            return Some(slot.id);
        }

        if self.slots.len() >= self.capacity {
            return None;
        }

        let id = self.slots.len() as u32;
        self.slots.push(GameObject {
            id,
            kind,
            pos,
            vel,
            is_active: true,
            age: 0.0,
            prev_pos: pos,
        });
        Some(id)
    }

    pub fn deactivate(&mut self, id: u32) {
        if let Some(slot) = self.slots.get_mut(id as usize) {
            slot.is_active = false;
        }
    }

    pub fn active(&self) -> impl Iterator<Item = &GameObject> {
        self.slots.iter().filter(|o| o.is_active)
    }

    pub fn active_mut(&mut self) -> impl Iterator<Item = &mut GameObject> {
        self.slots.iter_mut().filter(|o| o.is_active)
    }

    pub fn count_active(&self, kind: ObjectKind) -> usize {
        self.active().filter(|o| o.kind == kind).count()
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.is_active = false;
        }
    }

    pub fn snapshots(&self) -> Vec<ObjectSnapshot> {
        self.active().map(GameObject::snapshot).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_reuses_inactive_slots() {
        let mut pool = ObjectPool::new(2);
        let a = pool.spawn(ObjectKind::HealingAura, Vec2::new(1.0, 1.0), Vec2::ZERO).unwrap();
        let b = pool.spawn(ObjectKind::HealingAura, Vec2::new(2.0, 2.0), Vec2::ZERO).unwrap();
        assert_ne!(a, b);
        assert!(pool.spawn(ObjectKind::DamageAura, Vec2::ZERO, Vec2::ZERO).is_none());

        pool.deactivate(a);
        let c = pool.spawn(ObjectKind::DamageAura, Vec2::new(3.0, 3.0), Vec2::ZERO).unwrap();
        assert_eq!(c, a);
        assert_eq!(pool.count_active(ObjectKind::DamageAura), 1);
        assert_eq!(pool.count_active(ObjectKind::HealingAura), 1);
    }

    #[test]
    fn test_object_expires_by_lifetime() {
        let bounds = ArenaBounds::default();
        let mut pool = ObjectPool::for_all_kinds();
        let id = pool.spawn(ObjectKind::HealingAura, Vec2::new(100.0, 100.0), Vec2::ZERO).unwrap();
        let lifetime = ObjectConfig::for_kind(ObjectKind::HealingAura).lifetime.unwrap();

        for obj in pool.active_mut() {
            obj.update(lifetime + 0.1, &bounds);
        }
        assert!(pool.active().all(|o| o.id != id));
    }

    #[test]
    fn test_object_leaving_arena_deactivates() {
        let bounds = ArenaBounds::new(100.0, 100.0);
        let mut pool = ObjectPool::for_all_kinds();
        pool.spawn(ObjectKind::DamageAura, Vec2::new(95.0, 50.0), Vec2::new(60.0, 0.0));
        for obj in pool.active_mut() {
            obj.update(0.5, &bounds);
        }
        assert_eq!(pool.count_active(ObjectKind::DamageAura), 0);
    }
}
