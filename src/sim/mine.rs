//! Deployable mines
//!
//! Lifecycle: `Unarmed -> Armed -> Exploding -> Exploded`.
//!
//! - Arming is a timestamp comparison made on every [`MineSystem::update`].
//! - An armed mine goes off when a vehicle runs into it (closing speed > 0)
//!   or when a neighbouring mine's chain-reaction scan reaches it.
//! - On detonation the physics body is removed at once and the mine leaves
//!   the live set; it stays in the exploding set until its teardown
//!   animation time has passed, then it is finalized as `Exploded`.
//! - Chain scans only consider live armed mines, so a mine can never go off
//!   twice.

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::body::{BodyDesc, BodyHandle, BodyTag, Shape};
use super::events::{DamageChannel, DamageEvent, InventoryDisplay};
use super::groups::CollisionGroup;
use super::vehicle::VehicleId;
use super::world::PhysicsWorld;
use crate::config::MineConfig;

/// Unique, monotonically increasing mine id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MineId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MineState {
    /// Deployed, blinking, harmless
    Unarmed,
    Armed,
    /// Body gone, teardown animation running
    Exploding { since: f64 },
    Exploded,
}

/// A deployed mine
#[derive(Debug, Clone)]
pub struct Mine {
    pub id: MineId,
    pub body: Option<BodyHandle>,
    /// Last known position
    pub position: Vec3,
    pub deployed_at: f64,
    pub arming_delay_ms: f64,
    pub state: MineState,
    pub damage: f32,
    pub blast_radius: f32,
    pub chain_reaction_radius: f32,
    pub deployer: VehicleId,
}

impl Mine {
    pub fn is_armed(&self) -> bool {
        self.state == MineState::Armed
    }

    pub fn is_exploding(&self) -> bool {
        matches!(self.state, MineState::Exploding { .. })
    }

    pub fn has_exploded(&self) -> bool {
        self.state == MineState::Exploded
    }

    pub fn arms_at(&self) -> f64 {
        self.deployed_at + self.arming_delay_ms
    }

    /// Blink phase for the unarmed indicator (on for 250 ms, off for 250 ms)
    pub fn blink_on(&self, now: f64) -> bool {
        match self.state {
            MineState::Unarmed => ((now - self.deployed_at) / 250.0).floor() as i64 % 2 == 0,
            MineState::Armed => true,
            _ => false,
        }
    }
}

/// Bounded mine counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MineInventory {
    current: u32,
    max: u32,
}

impl MineInventory {
    pub fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn is_empty(&self) -> bool {
        self.current == 0
    }

    /// Take one mine; false when there are none left
    pub fn take(&mut self) -> bool {
        if self.current == 0 {
            return false;
        }
        self.current -= 1;
        true
    }

    /// Add up to `n`, never past `max`; returns the amount actually added
    pub fn resupply(&mut self, n: u32) -> u32 {
        let added = n.min(self.max - self.current);
        self.current += added;
        added
    }

    pub fn reset(&mut self) {
        self.current = self.max;
    }
}

/// Pending neighbour scan after a detonation
#[derive(Debug, Clone, Copy)]
struct ChainScan {
    source: MineId,
    origin: Vec3,
    radius: f32,
    due_at: f64,
    /// Vehicle that set off the first mine of the cascade
    root_vehicle: Option<VehicleId>,
}

/// Owns every deployed mine and one inventory per vehicle
///
/// Chain reactions cross deployers: any armed mine in range goes off,
/// whoever dropped it.
pub struct MineSystem {
    config: MineConfig,
    inventories: BTreeMap<VehicleId, MineInventory>,
    live: BTreeMap<MineId, Mine>,
    exploding: BTreeMap<MineId, Mine>,
    finalized: BTreeSet<MineId>,
    pending_chains: Vec<ChainScan>,
    next_id: u32,
    damage: DamageChannel,
    display: Box<dyn InventoryDisplay>,
}

impl MineSystem {
    pub fn new(config: MineConfig, display: Box<dyn InventoryDisplay>) -> Self {
        Self {
            config,
            inventories: BTreeMap::new(),
            live: BTreeMap::new(),
            exploding: BTreeMap::new(),
            finalized: BTreeSet::new(),
            pending_chains: Vec::new(),
            next_id: 1,
            damage: DamageChannel::new(),
            display,
        }
    }

    pub fn config(&self) -> &MineConfig {
        &self.config
    }

    /// Give a vehicle a full inventory; no-op if it already has one
    pub fn add_vehicle(&mut self, vehicle: VehicleId) {
        if self.inventories.contains_key(&vehicle) {
            return;
        }
        self.inventories
            .insert(vehicle, MineInventory::new(self.config.max_mines));
        self.notify_count(vehicle);
    }

    /// Drop a vehicle's inventory and clear its live mines
    pub fn remove_vehicle(&mut self, world: &mut PhysicsWorld, vehicle: VehicleId) {
        self.clear_mines_of(world, vehicle);
        self.inventories.remove(&vehicle);
    }

    pub fn inventory(&self, vehicle: VehicleId) -> Option<&MineInventory> {
        self.inventories.get(&vehicle)
    }

    /// Outbound damage notifications
    pub fn damage_channel(&mut self) -> &mut DamageChannel {
        &mut self.damage
    }

    /// Live (unarmed or armed) mine, or one still in its teardown animation
    pub fn mine(&self, id: MineId) -> Option<&Mine> {
        self.live.get(&id).or_else(|| self.exploding.get(&id))
    }

    pub fn mine_state(&self, id: MineId) -> Option<MineState> {
        if let Some(mine) = self.mine(id) {
            return Some(mine.state);
        }
        self.finalized.contains(&id).then_some(MineState::Exploded)
    }

    pub fn live_mines(&self) -> impl Iterator<Item = &Mine> {
        self.live.values()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn exploding_count(&self) -> usize {
        self.exploding.len()
    }

    pub fn pending_chain_count(&self) -> usize {
        self.pending_chains.len()
    }

    /// Drop a mine from `deployer`'s inventory at `position`
    ///
    /// Returns `None`, creating nothing and leaving the display untouched,
    /// when the deployer has no inventory or it is empty.
    pub fn deploy(
        &mut self,
        world: &mut PhysicsWorld,
        position: Vec3,
        deployer: VehicleId,
        now: f64,
    ) -> Option<MineId> {
        let Some(inventory) = self.inventories.get_mut(&deployer) else {
            log::debug!("Vehicle {} has no mine inventory", deployer.0);
            return None;
        };
        if !inventory.take() {
            log::debug!("Mine deploy denied for vehicle {}: inventory empty", deployer.0);
            return None;
        }
        let left = inventory.current();

        let id = MineId(self.next_id);
        self.next_id += 1;

        let desc = BodyDesc::dynamic(
            CollisionGroup::MINE,
            Shape::Sphere {
                radius: self.config.body_radius,
            },
            self.config.body_mass,
            position,
        )
        .with_damping(0.4, 0.4)
        .with_tag(BodyTag::Mine(id));
        let body = world.add_body(desc);

        self.live.insert(
            id,
            Mine {
                id,
                body: Some(body),
                position,
                deployed_at: now,
                arming_delay_ms: self.config.arming_delay_ms,
                state: MineState::Unarmed,
                damage: self.config.damage,
                blast_radius: self.config.blast_radius,
                chain_reaction_radius: self.config.chain_reaction_radius,
                deployer,
            },
        );
        log::info!(
            "Mine {} deployed by vehicle {} at {:?} ({} left)",
            id.0,
            deployer.0,
            position,
            left
        );
        self.notify_count(deployer);
        Some(id)
    }

    /// Add mines to a vehicle's inventory; returns how many were actually added
    ///
    /// A vehicle without an inventory gets nothing and no display update.
    pub fn resupply(&mut self, vehicle: VehicleId, n: u32) -> u32 {
        let Some(inventory) = self.inventories.get_mut(&vehicle) else {
            return 0;
        };
        let added = inventory.resupply(n);
        if added > 0 {
            log::info!("Vehicle {} resupplied with {} mine(s)", vehicle.0, added);
        }
        self.notify_count(vehicle);
        added
    }

    /// Refill a vehicle's inventory and clear its mines without detonating any
    ///
    /// Mines already exploding keep running their teardown.
    pub fn reset(&mut self, world: &mut PhysicsWorld, vehicle: VehicleId) {
        let Some(inventory) = self.inventories.get_mut(&vehicle) else {
            return;
        };
        inventory.reset();
        self.clear_mines_of(world, vehicle);
        log::info!("Mines of vehicle {} reset", vehicle.0);
        self.notify_count(vehicle);
    }

    fn clear_mines_of(&mut self, world: &mut PhysicsWorld, vehicle: VehicleId) {
        self.live.retain(|_, mine| {
            if mine.deployer != vehicle {
                return true;
            }
            if let Some(body) = mine.body {
                world.remove_body(body);
            }
            false
        });
    }

    /// React to a vehicle touching a mine
    ///
    /// Only an armed mine with a strictly positive closing speed goes off;
    /// resting contact and repeat contacts on an exploding mine are ignored.
    pub fn handle_vehicle_contact(
        &mut self,
        world: &mut PhysicsWorld,
        mine_id: MineId,
        vehicle_id: VehicleId,
        vehicle_position: Vec3,
        approach_speed: f32,
        now: f64,
    ) -> bool {
        let Some(mine) = self.live.get(&mine_id) else {
            return false;
        };
        if !mine.is_armed() || approach_speed <= 0.0 {
            return false;
        }
        self.explode(world, mine_id, Some((vehicle_id, vehicle_position)), now)
    }

    /// Detonate a live mine
    ///
    /// With a target vehicle the full damage and an impulse pointing from the
    /// mine to the vehicle are emitted for it. No-op (returns false) if the
    /// mine is already exploding or gone.
    pub fn explode(
        &mut self,
        world: &mut PhysicsWorld,
        mine_id: MineId,
        target: Option<(VehicleId, Vec3)>,
        now: f64,
    ) -> bool {
        let Some(mine) = self.detonate(world, mine_id, now) else {
            return false;
        };

        if let Some((vehicle_id, vehicle_position)) = target {
            let direction = (vehicle_position - mine.position).normalize_or_zero();
            self.damage.emit(DamageEvent {
                vehicle_id,
                damage: mine.damage,
                origin: mine.position,
                impulse: direction * self.config.explosion_impulse,
            });
        }

        self.schedule_chain(&mine, target.map(|(id, _)| id), now);
        true
    }

    /// Advance arming, chain reactions and teardown
    ///
    /// `vehicles` are the current vehicle positions, used for cascade area
    /// damage.
    pub fn update(&mut self, world: &mut PhysicsWorld, vehicles: &[(VehicleId, Vec3)], now: f64) {
        for mine in self.live.values_mut() {
            if let Some(body) = mine.body.and_then(|h| world.body(h)) {
                mine.position = body.position;
            }
            if mine.state == MineState::Unarmed && now - mine.deployed_at >= mine.arming_delay_ms {
                mine.state = MineState::Armed;
                log::debug!("Mine {} armed", mine.id.0);
            }
        }

        self.run_chain_scans(world, vehicles, now);

        let finished: Vec<MineId> = self
            .exploding
            .values()
            .filter(|m| match m.state {
                MineState::Exploding { since } => {
                    now - since >= self.config.explosion_animation_ms
                }
                _ => true,
            })
            .map(|m| m.id)
            .collect();
        for id in finished {
            if self.exploding.remove(&id).is_some() {
                self.finalized.insert(id);
                log::debug!("Mine {} finalized", id.0);
            }
        }
    }

    fn run_chain_scans(&mut self, world: &mut PhysicsWorld, vehicles: &[(VehicleId, Vec3)], now: f64) {
        // A zero delay schedules new scans that are already due, so loop
        // until nothing due is left.
        loop {
            let (mut due, later): (Vec<ChainScan>, Vec<ChainScan>) = self
                .pending_chains
                .drain(..)
                .partition(|scan| scan.due_at <= now);
            self.pending_chains = later;
            if due.is_empty() {
                break;
            }
            due.sort_by(|a, b| a.due_at.total_cmp(&b.due_at).then(a.source.cmp(&b.source)));

            for scan in due {
                let targets: Vec<MineId> = self
                    .live
                    .values()
                    .filter(|m| {
                        m.is_armed() && m.position.distance(scan.origin) <= scan.radius
                    })
                    .map(|m| m.id)
                    .collect();

                for id in targets {
                    let Some(mine) = self.detonate(world, id, now) else {
                        continue;
                    };
                    log::info!("Mine {} set off by chain from mine {}", id.0, scan.source.0);
                    self.emit_area_damage(&mine, vehicles, scan.root_vehicle);
                    self.schedule_chain(&mine, scan.root_vehicle, now);
                }
            }
        }
    }

    /// Move a live mine to the exploding set and drop its body
    fn detonate(&mut self, world: &mut PhysicsWorld, mine_id: MineId, now: f64) -> Option<Mine> {
        let mut mine = self.live.remove(&mine_id)?;
        if let Some(body) = mine.body.take() {
            if let Some(removed) = world.remove_body(body) {
                mine.position = removed.position;
            }
        }
        mine.state = MineState::Exploding { since: now };
        log::info!("Mine {} exploded at {:?}", mine.id.0, mine.position);
        self.exploding.insert(mine_id, mine.clone());
        Some(mine)
    }

    fn schedule_chain(&mut self, mine: &Mine, root_vehicle: Option<VehicleId>, now: f64) {
        self.pending_chains.push(ChainScan {
            source: mine.id,
            origin: mine.position,
            radius: mine.chain_reaction_radius,
            due_at: now + self.config.chain_reaction_delay_ms,
            root_vehicle,
        });
    }

    fn emit_area_damage(
        &mut self,
        mine: &Mine,
        vehicles: &[(VehicleId, Vec3)],
        root_vehicle: Option<VehicleId>,
    ) {
        if mine.blast_radius <= 0.0 {
            return;
        }
        for &(vehicle_id, position) in vehicles {
            if Some(vehicle_id) == root_vehicle && !self.config.area_damage_hits_trigger_vehicle {
                continue;
            }
            let distance = position.distance(mine.position);
            if distance > mine.blast_radius {
                continue;
            }
            let falloff = 1.0 - distance / mine.blast_radius;
            let damage = mine.damage * falloff;
            if damage <= 0.0 {
                continue;
            }
            let direction = (position - mine.position).normalize_or_zero();
            self.damage.emit(DamageEvent {
                vehicle_id,
                damage,
                origin: mine.position,
                impulse: direction * self.config.explosion_impulse * falloff,
            });
        }
    }

    fn notify_count(&mut self, vehicle: VehicleId) {
        if let Some(inventory) = self.inventories.get(&vehicle) {
            self.display
                .update_count(vehicle, inventory.current(), inventory.max());
        }
    }
}
