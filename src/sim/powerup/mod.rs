//! Power-ups and timed effects
//!
//! Power-ups are static trigger bodies that only touch vehicles. Collection
//! runs the kind's `apply`; on success the pickup is queued for removal and,
//! for timed kinds, an [`ActiveEffect`] is registered. Expiry is checked once
//! per [`PowerUpSystem::update`]. An effect leaves the registry before its
//! revert runs, so every revert happens at most once.

pub mod kinds;

use std::collections::{BTreeMap, BTreeSet};
use std::f32::consts::TAU;

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::body::{BodyDesc, BodyHandle, BodyTag, Shape};
use super::events::EffectDisplay;
use super::groups::CollisionGroup;
use super::mine::MineSystem;
use super::vehicle::{Vehicle, VehicleId, VehicleRegistry};
use super::world::PhysicsWorld;
use crate::config::PowerUpConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PowerUpId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EffectId(pub u32);

/// What an effect may reach besides its target vehicle
pub struct EffectContext<'a> {
    /// Mine system holding the collecting vehicle's inventory
    pub mines: Option<&'a mut MineSystem>,
    pub now: f64,
}

pub type ApplyFn = fn(&mut Vehicle, &mut EffectContext<'_>) -> bool;
pub type RevertFn = fn(&mut Vehicle);

/// Type descriptor for a power-up
#[derive(Debug, Clone, Copy)]
pub struct PowerUpKind {
    pub id: &'static str,
    /// RGB
    pub color: [f32; 3],
    /// 0 = instant, no active effect
    pub duration_ms: f64,
    pub apply: ApplyFn,
    pub revert: Option<RevertFn>,
}

impl PowerUpKind {
    pub fn is_timed(&self) -> bool {
        self.duration_ms > 0.0
    }
}

/// A pickup in the arena
#[derive(Debug, Clone)]
pub struct PowerUp {
    pub id: PowerUpId,
    pub body: BodyHandle,
    pub kind: PowerUpKind,
    pub position: Vec3,
    pub collected: bool,
    pub spawned_at: f64,
}

/// A timed modification to a vehicle, pending revert
#[derive(Debug, Clone)]
pub struct ActiveEffect {
    pub id: EffectId,
    pub kind: &'static str,
    pub vehicle: VehicleId,
    pub started_at: f64,
    pub expires_at: f64,
    pub revert: Option<RevertFn>,
}

pub struct PowerUpSystem {
    config: PowerUpConfig,
    kinds: Vec<PowerUpKind>,
    power_ups: BTreeMap<PowerUpId, PowerUp>,
    pending_removal: BTreeSet<PowerUpId>,
    effects: BTreeMap<EffectId, ActiveEffect>,
    next_power_up_id: u32,
    next_effect_id: u32,
    last_spawn_at: Option<f64>,
    rng: Pcg32,
    display: Box<dyn EffectDisplay>,
}

impl PowerUpSystem {
    /// Empty system with no kinds registered
    pub fn new(config: PowerUpConfig, seed: u64, display: Box<dyn EffectDisplay>) -> Self {
        Self {
            config,
            kinds: Vec::new(),
            power_ups: BTreeMap::new(),
            pending_removal: BTreeSet::new(),
            effects: BTreeMap::new(),
            next_power_up_id: 1,
            next_effect_id: 1,
            last_spawn_at: None,
            rng: Pcg32::seed_from_u64(seed),
            display,
        }
    }

    /// System with the built-in kinds registered
    pub fn with_builtin_kinds(
        config: PowerUpConfig,
        seed: u64,
        display: Box<dyn EffectDisplay>,
    ) -> Self {
        let mut system = Self::new(config, seed, display);
        for kind in kinds::builtin() {
            system.register_kind(kind);
        }
        system
    }

    /// Add a kind, replacing any kind with the same id
    pub fn register_kind(&mut self, kind: PowerUpKind) {
        if let Some(existing) = self.kinds.iter_mut().find(|k| k.id == kind.id) {
            *existing = kind;
        } else {
            self.kinds.push(kind);
        }
    }

    pub fn config(&self) -> &PowerUpConfig {
        &self.config
    }

    pub fn kinds(&self) -> &[PowerUpKind] {
        &self.kinds
    }

    pub fn kind(&self, id: &str) -> Option<&PowerUpKind> {
        self.kinds.iter().find(|k| k.id == id)
    }

    pub fn power_up(&self, id: PowerUpId) -> Option<&PowerUp> {
        self.power_ups.get(&id)
    }

    pub fn power_ups(&self) -> impl Iterator<Item = &PowerUp> {
        self.power_ups.values()
    }

    /// Power-ups not yet collected
    pub fn active_count(&self) -> usize {
        self.power_ups.values().filter(|p| !p.collected).count()
    }

    pub fn pending_removal_count(&self) -> usize {
        self.pending_removal.len()
    }

    pub fn effects(&self) -> impl Iterator<Item = &ActiveEffect> {
        self.effects.values()
    }

    pub fn effect_count(&self) -> usize {
        self.effects.len()
    }

    /// Place a power-up of a registered kind at an exact position
    pub fn spawn_at(
        &mut self,
        world: &mut PhysicsWorld,
        kind_id: &str,
        position: Vec3,
        now: f64,
    ) -> Option<PowerUpId> {
        let Some(kind) = self.kind(kind_id).copied() else {
            log::warn!("Unknown power-up kind '{}'", kind_id);
            return None;
        };

        let id = PowerUpId(self.next_power_up_id);
        self.next_power_up_id += 1;

        let desc = BodyDesc::fixed(
            CollisionGroup::POWER_UP,
            Shape::Sphere {
                radius: self.config.pickup_radius,
            },
            position,
        )
        .trigger()
        .with_tag(BodyTag::PowerUp(id));
        let body = world.add_body(desc);

        self.power_ups.insert(
            id,
            PowerUp {
                id,
                body,
                kind,
                position,
                collected: false,
                spawned_at: now,
            },
        );
        log::info!("Power-up {} ({}) spawned at {:?}", id.0, kind.id, position);
        Some(id)
    }

    /// One spawn attempt cycle: random position in the annulus, random kind
    ///
    /// Returns `None` when at capacity, when no kinds are registered, or when
    /// every candidate position was too close to an existing power-up.
    pub fn try_spawn(&mut self, world: &mut PhysicsWorld, now: f64) -> Option<PowerUpId> {
        if self.kinds.is_empty() || self.active_count() >= self.config.max_active {
            return None;
        }

        for _ in 0..self.config.spawn_attempts {
            let candidate = self.sample_position();
            let clear = self
                .power_ups
                .values()
                .all(|p| p.position.distance(candidate) >= self.config.min_separation);
            if clear {
                let index = self.rng.random_range(0..self.kinds.len());
                let kind_id = self.kinds[index].id;
                return self.spawn_at(world, kind_id, candidate, now);
            }
        }

        log::warn!(
            "No clear power-up position after {} attempts, skipping spawn",
            self.config.spawn_attempts
        );
        None
    }

    /// Uniform by area within the annulus around the arena center
    fn sample_position(&mut self) -> Vec3 {
        let inner_sq = self.config.inner_radius * self.config.inner_radius;
        let outer_sq = self.config.outer_radius * self.config.outer_radius;
        let angle = self.rng.random_range(0.0..TAU);
        // Degenerate ring: spawn on the inner circle
        let radius = if outer_sq > inner_sq {
            self.rng.random_range(inner_sq..outer_sq).sqrt()
        } else {
            self.config.inner_radius
        };
        self.config.arena_center
            + Vec3::new(
                radius * angle.cos(),
                self.config.spawn_height,
                radius * angle.sin(),
            )
    }

    /// Collect a power-up for `vehicle`
    ///
    /// Returns true only when the kind's `apply` succeeded. A second
    /// collection of the same power-up is ignored; a failed `apply` leaves
    /// the power-up collectable.
    pub fn collect(
        &mut self,
        id: PowerUpId,
        vehicle: &mut Vehicle,
        ctx: &mut EffectContext<'_>,
    ) -> bool {
        let kind = {
            let Some(power_up) = self.power_ups.get_mut(&id) else {
                log::warn!("Power-up {} no longer exists", id.0);
                return false;
            };
            if power_up.collected {
                log::debug!("Power-up {} already collected", id.0);
                return false;
            }
            power_up.collected = true;
            power_up.kind
        };

        // One effect per kind per vehicle: clear the old one first
        if kind.is_timed() {
            let existing: Vec<EffectId> = self
                .effects
                .values()
                .filter(|e| e.vehicle == vehicle.id && e.kind == kind.id)
                .map(|e| e.id)
                .collect();
            for effect_id in existing {
                if let Some(effect) = self.effects.remove(&effect_id) {
                    log::debug!("Effect {} on vehicle {} superseded", effect.kind, vehicle.id.0);
                    if let Some(revert) = effect.revert {
                        revert(vehicle);
                    }
                    self.display.remove_effect(effect.kind);
                }
            }
        }

        if !(kind.apply)(vehicle, ctx) {
            if let Some(power_up) = self.power_ups.get_mut(&id) {
                power_up.collected = false;
            }
            log::debug!("Power-up {} ({}) could not be applied", id.0, kind.id);
            return false;
        }

        self.pending_removal.insert(id);
        log::info!("Vehicle {} collected {} power-up", vehicle.id.0, kind.id);

        if kind.is_timed() {
            let effect_id = EffectId(self.next_effect_id);
            self.next_effect_id += 1;
            self.effects.insert(
                effect_id,
                ActiveEffect {
                    id: effect_id,
                    kind: kind.id,
                    vehicle: vehicle.id,
                    started_at: ctx.now,
                    expires_at: ctx.now + kind.duration_ms,
                    revert: kind.revert,
                },
            );
            self.display.add_effect(kind.id, kind.duration_ms);
        }
        true
    }

    /// Expire effects, drain collected power-ups and run the spawn throttle
    pub fn update(&mut self, world: &mut PhysicsWorld, vehicles: &mut VehicleRegistry, now: f64) {
        let mut expired: Vec<&ActiveEffect> =
            self.effects.values().filter(|e| now >= e.expires_at).collect();
        expired.sort_by(|a, b| a.expires_at.total_cmp(&b.expires_at).then(a.id.cmp(&b.id)));
        let expired: Vec<EffectId> = expired.into_iter().map(|e| e.id).collect();

        for effect_id in expired {
            let Some(effect) = self.effects.remove(&effect_id) else {
                continue;
            };
            match vehicles.get_mut(effect.vehicle) {
                Some(vehicle) => {
                    if let Some(revert) = effect.revert {
                        revert(vehicle);
                    }
                    log::debug!("Effect {} on vehicle {} expired", effect.kind, effect.vehicle.0);
                }
                None => log::warn!(
                    "Effect {} expired for missing vehicle {}",
                    effect.kind,
                    effect.vehicle.0
                ),
            }
            self.display.remove_effect(effect.kind);
        }

        for id in std::mem::take(&mut self.pending_removal) {
            if let Some(power_up) = self.power_ups.remove(&id) {
                world.remove_body(power_up.body);
            }
        }

        let due = self
            .last_spawn_at
            .is_none_or(|last| now - last >= self.config.spawn_interval_ms);
        if due {
            self.last_spawn_at = Some(now);
            self.try_spawn(world, now);
        }
    }

    /// Revert and drop every effect on `vehicle` right away
    ///
    /// Used on respawn and removal. Returns how many effects were reverted.
    pub fn revert_effects_for(&mut self, vehicle: &mut Vehicle) -> usize {
        let ids: Vec<EffectId> = self
            .effects
            .values()
            .filter(|e| e.vehicle == vehicle.id)
            .map(|e| e.id)
            .collect();
        let count = ids.len();
        for effect_id in ids {
            if let Some(effect) = self.effects.remove(&effect_id) {
                if let Some(revert) = effect.revert {
                    revert(vehicle);
                }
                self.display.remove_effect(effect.kind);
            }
        }
        if count > 0 {
            log::info!("Reverted {} effect(s) on vehicle {}", count, vehicle.id.0);
        }
        count
    }
}
