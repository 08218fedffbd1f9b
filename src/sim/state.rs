//! Arena state and the default collision handlers
//!
//! `ArenaState` owns the physics world and every gameplay subsystem.
//! `Arena` pairs it with the collision resolver so handlers can take the
//! state mutably while the resolver is borrowed.

use std::sync::mpsc::Receiver;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::body::{BodyDesc, BodyTag, Shape};
use super::collision::{CollisionEvent, CollisionResolver, CollisionType, HandlerError};
use super::events::{DamageEvent, EffectDisplay, InventoryDisplay, LogDisplay};
use super::groups::CollisionGroup;
use super::mine::{MineId, MineSystem};
use super::powerup::{EffectContext, PowerUpSystem};
use super::vehicle::{VehicleId, VehicleRegistry};
use super::world::{ContactMaterial, PhysicsWorld};
use crate::config::CoreConfig;

/// Running totals for the arena
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaStats {
    pub mines_triggered: u32,
    pub power_ups_collected: u32,
    pub environment_hits: u32,
    pub projectile_hits: u32,
    pub respawns: u32,
}

/// Everything the simulation mutates
pub struct ArenaState {
    /// Run seed for reproducibility
    pub seed: u64,
    pub config: CoreConfig,
    pub world: PhysicsWorld,
    pub vehicles: VehicleRegistry,
    /// Every mine plus one inventory per vehicle
    pub mines: MineSystem,
    pub power_ups: PowerUpSystem,
    /// Simulation clock (ms), advanced by whole sub-steps
    pub now: f64,
    /// Sub-steps run so far
    pub time_ticks: u64,
    pub stats: ArenaStats,
    damage_rx: Receiver<DamageEvent>,
}

impl ArenaState {
    /// New arena with log-only displays
    pub fn new(config: CoreConfig, seed: u64) -> Self {
        Self::with_displays(config, seed, Box::new(LogDisplay), Box::new(LogDisplay))
    }

    pub fn with_displays(
        config: CoreConfig,
        seed: u64,
        inventory: Box<dyn InventoryDisplay>,
        effects: Box<dyn EffectDisplay>,
    ) -> Self {
        let mut world = PhysicsWorld::new(config.physics.gravity, config.physics.ground_height);
        world.add_contact_material(ContactMaterial {
            group_a: CollisionGroup::VEHICLE,
            group_b: CollisionGroup::ENVIRONMENT,
            friction: 0.8,
            restitution: 0.2,
        });
        world.add_contact_material(ContactMaterial {
            group_a: CollisionGroup::VEHICLE,
            group_b: CollisionGroup::VEHICLE,
            friction: 0.5,
            restitution: 0.3,
        });

        let mut mines = MineSystem::new(config.mines.clone(), inventory);
        let damage_rx = mines.damage_channel().subscribe();
        let power_ups = PowerUpSystem::with_builtin_kinds(config.power_ups.clone(), seed, effects);

        Self {
            seed,
            config,
            world,
            vehicles: VehicleRegistry::new(),
            mines,
            power_ups,
            now: 0.0,
            time_ticks: 0,
            stats: ArenaStats::default(),
            damage_rx,
        }
    }

    /// Four static walls enclosing a square of `half_size` around the arena center
    pub fn build_walls(&mut self, half_size: f32) {
        let center = self.config.power_ups.arena_center;
        let ground = self.world.ground_height;
        let thickness = 1.0;
        let height = 2.0;
        let walls = [
            (Vec3::new(half_size + thickness, 0.0, 0.0), Vec3::new(thickness, height, half_size)),
            (Vec3::new(-half_size - thickness, 0.0, 0.0), Vec3::new(thickness, height, half_size)),
            (Vec3::new(0.0, 0.0, half_size + thickness), Vec3::new(half_size, height, thickness)),
            (Vec3::new(0.0, 0.0, -half_size - thickness), Vec3::new(half_size, height, thickness)),
        ];
        for (offset, half_extents) in walls {
            let position = center + offset + Vec3::new(0.0, ground + height, 0.0);
            self.world.add_body(
                BodyDesc::fixed(CollisionGroup::ENVIRONMENT, Shape::Box { half_extents }, position)
                    .with_tag(BodyTag::Static),
            );
        }
    }

    /// Spawn a vehicle of `class` resting on its wheels, with a full mine inventory
    pub fn spawn_vehicle(&mut self, class: &str, position: Vec3, heading: f32) -> VehicleId {
        let tuning = self.config.tuning_for(class);
        let position = Vec3::new(
            position.x,
            self.world.ground_height + tuning.ride_height(),
            position.z,
        );
        let id = self
            .vehicles
            .spawn(&mut self.world, class, tuning, position, heading);
        self.mines.add_vehicle(id);
        id
    }

    /// Put a vehicle back at its spawn point with full health
    ///
    /// Active effects are reverted on the spot; the vehicle's own mines are
    /// cleared and its inventory refilled.
    pub fn respawn_vehicle(&mut self, id: VehicleId) -> bool {
        let Some(vehicle) = self.vehicles.get_mut(id) else {
            log::warn!("Respawn requested for missing vehicle {}", id.0);
            return false;
        };

        self.power_ups.revert_effects_for(vehicle);
        vehicle.health = vehicle.max_health();

        if let Some(body) = self.world.body_mut(vehicle.body) {
            body.position = vehicle.spawn_point;
            body.orientation = Quat::from_rotation_y(vehicle.spawn_heading);
            body.linear_velocity = Vec3::ZERO;
            body.angular_velocity = Vec3::ZERO;
            body.clear_forces();
        }
        if let Some(wheels) = self.world.raycast_vehicle_mut(vehicle.body) {
            for wheel in &mut wheels.wheels {
                wheel.reset_controls();
            }
        }

        self.mines.reset(&mut self.world, id);
        self.stats.respawns += 1;
        log::info!("Vehicle {} respawned", id.0);
        true
    }

    /// Remove a vehicle for good, reverting its effects first
    pub fn remove_vehicle(&mut self, id: VehicleId) -> bool {
        if let Some(vehicle) = self.vehicles.get_mut(id) {
            self.power_ups.revert_effects_for(vehicle);
        }
        self.mines.remove_vehicle(&mut self.world, id);
        self.vehicles.despawn(&mut self.world, id).is_some()
    }

    /// Drop a mine from the vehicle's inventory just behind it
    pub fn deploy_mine(&mut self, id: VehicleId) -> Option<MineId> {
        let vehicle = self.vehicles.get(id)?;
        let body = self.world.body(vehicle.body)?;
        let radius = self.mines.config().body_radius;
        let back = body.forward() * (vehicle.tuning.chassis_half_extents.z + radius + 0.5);
        let mut position = body.position - back;
        position.y = self.world.ground_height + radius;
        self.mines
            .deploy(&mut self.world, position, id, self.now)
    }

    /// Apply every queued damage event; returns how many were received
    pub fn apply_pending_damage(&mut self) -> usize {
        let events: Vec<DamageEvent> = self.damage_rx.try_iter().collect();
        for event in &events {
            let Some(vehicle) = self.vehicles.get_mut(event.vehicle_id) else {
                log::warn!("Damage for missing vehicle {}", event.vehicle_id.0);
                continue;
            };
            let taken = vehicle.take_damage(event.damage);
            log::debug!(
                "Vehicle {} took {:.1} damage ({:.1} left)",
                vehicle.id.0,
                taken,
                vehicle.health
            );
            if let Some(body) = self.world.body_mut(vehicle.body) {
                body.apply_impulse(event.impulse);
            }
        }
        events.len()
    }
}

/// Arena state plus the collision resolver driving it
pub struct Arena {
    pub state: ArenaState,
    pub resolver: CollisionResolver<ArenaState>,
}

impl Arena {
    /// New arena with the default mine, power-up and environment handlers
    pub fn new(config: CoreConfig, seed: u64) -> Self {
        Self::from_state(ArenaState::new(config, seed))
    }

    pub fn from_state(state: ArenaState) -> Self {
        let mut resolver = CollisionResolver::new();
        register_default_handlers(&mut resolver);
        Self { state, resolver }
    }
}

/// Mine, power-up, environment and projectile handlers
pub fn register_default_handlers(resolver: &mut CollisionResolver<ArenaState>) {
    resolver.register_handler(CollisionType::Mine, handle_mine_contact);
    resolver.register_handler(CollisionType::PowerUp, handle_power_up_contact);
    resolver.register_handler(CollisionType::Environment, |event, state| {
        state.stats.environment_hits += 1;
        log::debug!(
            "Vehicle hit environment at {:.1} m/s",
            event.approach_speed.max(0.0)
        );
        Ok(())
    });
    resolver.register_handler(CollisionType::Projectile, |_, state| {
        state.stats.projectile_hits += 1;
        Ok(())
    });
}

fn vehicle_tag(event: &CollisionEvent) -> Result<VehicleId, HandlerError> {
    match event.a.tag {
        BodyTag::Vehicle(id) => Ok(id),
        other => Err(HandlerError::UnexpectedTag(other)),
    }
}

fn handle_mine_contact(event: &CollisionEvent, state: &mut ArenaState) -> Result<(), HandlerError> {
    let event = event.oriented();
    let vehicle = vehicle_tag(&event)?;
    let BodyTag::Mine(mine) = event.b.tag else {
        return Err(HandlerError::UnexpectedTag(event.b.tag));
    };
    let exploded = state.mines.handle_vehicle_contact(
        &mut state.world,
        mine,
        vehicle,
        event.a.position,
        event.approach_speed,
        state.now,
    );
    if exploded {
        state.stats.mines_triggered += 1;
    }
    Ok(())
}

fn handle_power_up_contact(
    event: &CollisionEvent,
    state: &mut ArenaState,
) -> Result<(), HandlerError> {
    let event = event.oriented();
    let vehicle_id = vehicle_tag(&event)?;
    let BodyTag::PowerUp(power_up) = event.b.tag else {
        return Err(HandlerError::UnexpectedTag(event.b.tag));
    };
    let vehicle = state
        .vehicles
        .get_mut(vehicle_id)
        .ok_or_else(|| HandlerError::MissingEntity(format!("vehicle {}", vehicle_id.0)))?;

    let mut ctx = EffectContext {
        mines: Some(&mut state.mines),
        now: state.now,
    };
    if state.power_ups.collect(power_up, vehicle, &mut ctx) {
        state.stats.power_ups_collected += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::collision::ContactBody;
    use crate::sim::powerup::kinds;

    fn arena() -> Arena {
        Arena::new(CoreConfig::default(), 11)
    }

    fn contact_event(state: &ArenaState, vehicle: VehicleId, other: BodyTag, other_group: CollisionGroup) -> CollisionEvent {
        let v = state.vehicles.get(vehicle).unwrap();
        let body = state.world.body(v.body).unwrap();
        let other_body = state.world.bodies().find(|b| b.tag == other).unwrap();
        CollisionEvent {
            a: ContactBody {
                handle: other_body.handle,
                group: other_group,
                tag: other,
                position: other_body.position,
                velocity: Vec3::ZERO,
            },
            b: ContactBody {
                handle: v.body,
                group: CollisionGroup::VEHICLE,
                tag: BodyTag::Vehicle(vehicle),
                position: body.position,
                velocity: Vec3::ZERO,
            },
            normal: Vec3::X,
            point: Vec3::ZERO,
            depth: 0.05,
            approach_speed: 3.0,
        }
    }

    #[test]
    fn test_every_vehicle_deploys_from_own_inventory() {
        let mut arena = arena();
        let a = arena.state.spawn_vehicle("sports", Vec3::ZERO, 0.0);
        let b = arena.state.spawn_vehicle("truck", Vec3::new(10.0, 0.0, 0.0), 0.0);
        let from_b = arena.state.deploy_mine(b).unwrap();
        assert_eq!(arena.state.mines.mine(from_b).unwrap().deployer, b);
        assert!(arena.state.deploy_mine(a).is_some());

        let max = arena.state.mines.config().max_mines;
        assert_eq!(arena.state.mines.inventory(a).unwrap().current(), max - 1);
        assert_eq!(arena.state.mines.inventory(b).unwrap().current(), max - 1);

        assert!(arena.state.remove_vehicle(b));
        assert!(arena.state.mines.inventory(b).is_none());
        assert!(arena.state.mines.mine(from_b).is_none());
        assert_eq!(arena.state.mines.live_count(), 1);
    }

    #[test]
    fn test_second_vehicle_collects_mines_power_up() {
        let mut arena = arena();
        let a = arena.state.spawn_vehicle("sports", Vec3::ZERO, 0.0);
        let b = arena.state.spawn_vehicle("truck", Vec3::new(10.0, 0.0, 0.0), 0.0);
        arena.state.deploy_mine(a).unwrap();
        arena.state.deploy_mine(b).unwrap();
        arena.state.deploy_mine(b).unwrap();

        let state = &mut arena.state;
        let id = state
            .power_ups
            .spawn_at(&mut state.world, kinds::MINES, Vec3::new(10.0, 1.0, 0.5), 0.0)
            .unwrap();
        let event = contact_event(&arena.state, b, BodyTag::PowerUp(id), CollisionGroup::POWER_UP);
        let report = arena.resolver.dispatch(&event, &mut arena.state);
        assert_eq!(report.handlers_failed, 0);

        assert_eq!(arena.state.stats.power_ups_collected, 1);
        assert!(arena.state.power_ups.power_up(id).unwrap().collected);
        let max = arena.state.mines.config().max_mines;
        assert_eq!(arena.state.mines.inventory(b).unwrap().current(), max);
        assert_eq!(arena.state.mines.inventory(a).unwrap().current(), max - 1);
    }

    #[test]
    fn test_mine_lands_behind_vehicle() {
        let mut arena = arena();
        let v = arena.state.spawn_vehicle("sports", Vec3::ZERO, 0.0);
        let id = arena.state.deploy_mine(v).unwrap();
        let mine = arena.state.mines.mine(id).unwrap();
        assert!(mine.position.z < -1.0);
        assert!((mine.position.y - arena.state.mines.config().body_radius).abs() < 1e-4);
    }

    #[test]
    fn test_power_up_handler_collects() {
        let mut arena = arena();
        let v = arena.state.spawn_vehicle("sports", Vec3::ZERO, 0.0);
        let state = &mut arena.state;
        let id = state
            .power_ups
            .spawn_at(&mut state.world, kinds::SHIELD, Vec3::new(0.0, 1.0, 0.5), 0.0)
            .unwrap();
        let event = contact_event(&arena.state, v, BodyTag::PowerUp(id), CollisionGroup::POWER_UP);

        let report = arena.resolver.dispatch(&event, &mut arena.state);
        assert_eq!(report.handlers_failed, 0);
        assert!(arena.state.vehicles.get(v).unwrap().shielded);
        assert_eq!(arena.state.stats.power_ups_collected, 1);

        // Duplicate contact in the same tick changes nothing
        arena.resolver.dispatch(&event, &mut arena.state);
        assert_eq!(arena.state.stats.power_ups_collected, 1);
    }

    #[test]
    fn test_mine_handler_respects_arming() {
        let mut arena = arena();
        let v = arena.state.spawn_vehicle("sports", Vec3::ZERO, 0.0);
        let mine = arena.state.deploy_mine(v).unwrap();
        let event = contact_event(&arena.state, v, BodyTag::Mine(mine), CollisionGroup::MINE);

        arena.resolver.dispatch(&event, &mut arena.state);
        assert_eq!(arena.state.stats.mines_triggered, 0);

        arena.state.now = 2500.0;
        let state = &mut arena.state;
        state.mines.update(&mut state.world, &[], state.now);
        arena.resolver.dispatch(&event, &mut arena.state);
        assert_eq!(arena.state.stats.mines_triggered, 1);
        assert_eq!(arena.state.apply_pending_damage(), 1);
        let vehicle = arena.state.vehicles.get(v).unwrap();
        assert!(vehicle.health < vehicle.max_health());
    }

    #[test]
    fn test_mislabelled_body_is_handler_error() {
        let mut arena = arena();
        let v = arena.state.spawn_vehicle("sports", Vec3::ZERO, 0.0);
        arena.state.build_walls(30.0);
        let event = contact_event(&arena.state, v, BodyTag::Static, CollisionGroup::MINE);
        let report = arena.resolver.dispatch(&event, &mut arena.state);
        assert_eq!(report.handlers_failed, 1);
    }

    #[test]
    fn test_respawn_reverts_effects_and_resets_mines() {
        let mut arena = arena();
        let v = arena.state.spawn_vehicle("sports", Vec3::ZERO, 0.0);
        let state = &mut arena.state;
        let id = state
            .power_ups
            .spawn_at(&mut state.world, kinds::SPEED, Vec3::new(0.0, 1.0, 0.5), 0.0)
            .unwrap();
        let event = contact_event(&arena.state, v, BodyTag::PowerUp(id), CollisionGroup::POWER_UP);
        arena.resolver.dispatch(&event, &mut arena.state);
        arena.state.deploy_mine(v);
        arena.state.vehicles.get_mut(v).unwrap().health = 0.0;

        assert!(arena.state.respawn_vehicle(v));
        let vehicle = arena.state.vehicles.get(v).unwrap();
        assert!(!vehicle.speed_boost);
        assert_eq!(vehicle.health, vehicle.max_health());
        assert_eq!(arena.state.power_ups.effect_count(), 0);
        assert_eq!(arena.state.mines.live_count(), 0);
        let inventory = arena.state.mines.inventory(v).unwrap();
        assert_eq!(inventory.current(), inventory.max());
    }

    #[test]
    fn test_shield_blocks_mine_damage_but_not_impulse() {
        let mut arena = arena();
        let v = arena.state.spawn_vehicle("sports", Vec3::ZERO, 0.0);
        arena.state.vehicles.get_mut(v).unwrap().shielded = true;
        let state = &mut arena.state;
        let mine = state.deploy_mine(v).unwrap();
        state.mines.explode(&mut state.world, mine, Some((v, Vec3::new(0.0, 0.6, 0.0))), 0.0);

        assert_eq!(arena.state.apply_pending_damage(), 1);
        let vehicle = arena.state.vehicles.get(v).unwrap();
        assert_eq!(vehicle.health, vehicle.max_health());
        let body = arena.state.world.body(vehicle.body).unwrap();
        assert!(body.linear_velocity.length() > 0.0);
    }
}
