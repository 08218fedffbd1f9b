//! Vehicles, per-class tuning and the vehicle registry

use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::body::{BodyDesc, BodyHandle, BodyTag, Shape};
use super::groups::CollisionGroup;
use super::raycast::WheelSetup;
use super::world::PhysicsWorld;

/// Stable vehicle identifier (never reused within a run)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId(pub u32);

/// Which axle receives engine force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Drivetrain {
    #[default]
    Rear,
    Front,
    All,
}

/// Per-class driving constants, fixed once a vehicle is built
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleTuning {
    /// Engine force per drive wheel when throttling forward (N)
    pub max_forward_force: f32,
    /// Engine force per drive wheel when reversing (N)
    pub max_reverse_force: f32,
    /// Radians
    pub max_steering_angle: f32,
    /// Forward force multiplier while boosting
    pub boost_multiplier: f32,
    /// Brake force per wheel (N)
    pub brake_force: f32,
    /// Rolling resistance when there is no throttle input (N)
    pub idle_brake_force: f32,
    /// Downforce = coefficient * speed²
    pub downforce_coefficient: f32,
    pub max_downforce: f32,
    pub mass: f32,
    pub max_health: f32,
    pub chassis_half_extents: Vec3,
    pub drivetrain: Drivetrain,
    pub wheel_radius: f32,
    pub suspension_rest_length: f32,
    pub suspension_stiffness: f32,
    pub suspension_damping: f32,
    pub wheel_friction: f32,
}

impl VehicleTuning {
    pub fn sports() -> Self {
        Self {
            max_forward_force: 900.0,
            max_reverse_force: 450.0,
            max_steering_angle: 0.5,
            boost_multiplier: 1.8,
            brake_force: 900.0,
            idle_brake_force: 25.0,
            downforce_coefficient: 1.2,
            max_downforce: 1200.0,
            mass: 150.0,
            max_health: 100.0,
            chassis_half_extents: Vec3::new(0.9, 0.25, 1.8),
            drivetrain: Drivetrain::Rear,
            wheel_radius: 0.35,
            suspension_rest_length: 0.3,
            suspension_stiffness: 3000.0,
            suspension_damping: 450.0,
            wheel_friction: 1.5,
        }
    }

    pub fn muscle() -> Self {
        Self {
            max_forward_force: 1100.0,
            max_reverse_force: 500.0,
            max_steering_angle: 0.42,
            boost_multiplier: 1.6,
            brake_force: 800.0,
            idle_brake_force: 30.0,
            downforce_coefficient: 1.0,
            max_downforce: 1000.0,
            mass: 180.0,
            max_health: 130.0,
            chassis_half_extents: Vec3::new(1.0, 0.3, 2.0),
            ..Self::sports()
        }
    }

    pub fn truck() -> Self {
        Self {
            max_forward_force: 1300.0,
            max_reverse_force: 700.0,
            max_steering_angle: 0.35,
            boost_multiplier: 1.4,
            brake_force: 1200.0,
            idle_brake_force: 50.0,
            downforce_coefficient: 0.6,
            max_downforce: 800.0,
            mass: 260.0,
            max_health: 180.0,
            chassis_half_extents: Vec3::new(1.1, 0.45, 2.4),
            drivetrain: Drivetrain::All,
            wheel_radius: 0.45,
            suspension_stiffness: 5200.0,
            suspension_damping: 700.0,
            ..Self::sports()
        }
    }

    /// Four wheels at the chassis corners: front pair steers, drive pair per drivetrain
    pub fn wheel_layout(&self) -> [WheelSetup; 4] {
        let h = self.chassis_half_extents;
        let front_drive = matches!(self.drivetrain, Drivetrain::Front | Drivetrain::All);
        let rear_drive = matches!(self.drivetrain, Drivetrain::Rear | Drivetrain::All);
        let wheel = |x: f32, z: f32, front: bool| WheelSetup {
            connection: Vec3::new(x, 0.0, z),
            radius: self.wheel_radius,
            suspension_rest_length: self.suspension_rest_length,
            suspension_stiffness: self.suspension_stiffness,
            suspension_damping: self.suspension_damping,
            friction: self.wheel_friction,
            drive: if front { front_drive } else { rear_drive },
            steer: front,
        };
        [
            wheel(h.x, h.z * 0.8, true),
            wheel(-h.x, h.z * 0.8, true),
            wheel(h.x, -h.z * 0.8, false),
            wheel(-h.x, -h.z * 0.8, false),
        ]
    }

    /// Chassis height at which the wheels just reach the ground unloaded
    pub fn ride_height(&self) -> f32 {
        self.suspension_rest_length + self.wheel_radius
    }
}

impl Default for VehicleTuning {
    fn default() -> Self {
        Self::sports()
    }
}

/// A player or AI vehicle
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: VehicleId,
    pub class: String,
    pub body: BodyHandle,
    pub tuning: VehicleTuning,
    pub health: f32,
    /// Set by the speed power-up
    pub speed_boost: bool,
    /// Set by the shield power-up; blocks mine damage
    pub shielded: bool,
    pub spawn_point: Vec3,
    pub spawn_heading: f32,
}

impl Vehicle {
    pub fn max_health(&self) -> f32 {
        self.tuning.max_health
    }

    pub fn is_destroyed(&self) -> bool {
        self.health <= 0.0
    }

    /// Apply damage unless shielded; returns the amount taken
    pub fn take_damage(&mut self, amount: f32) -> f32 {
        if self.shielded || amount <= 0.0 {
            return 0.0;
        }
        let taken = amount.min(self.health.max(0.0));
        self.health -= taken;
        taken
    }
}

/// Live vehicles by id
///
/// Lookups answer `None` once a vehicle is removed; nothing holds a vehicle
/// by reference across ticks.
#[derive(Debug, Default)]
pub struct VehicleRegistry {
    vehicles: BTreeMap<VehicleId, Vehicle>,
    next_id: u32,
}

impl VehicleRegistry {
    pub fn new() -> Self {
        Self {
            vehicles: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Build the chassis body, attach wheels and register the vehicle
    pub fn spawn(
        &mut self,
        world: &mut PhysicsWorld,
        class: &str,
        tuning: VehicleTuning,
        position: Vec3,
        heading: f32,
    ) -> VehicleId {
        let id = VehicleId(self.next_id.max(1));
        self.next_id = id.0 + 1;

        let desc = BodyDesc::dynamic(
            CollisionGroup::VEHICLE,
            Shape::Box {
                half_extents: tuning.chassis_half_extents,
            },
            tuning.mass,
            position,
        )
        .with_orientation(Quat::from_rotation_y(heading))
        .with_damping(0.05, 0.6)
        .with_tag(BodyTag::Vehicle(id));
        let body = world.add_body(desc);
        world.add_raycast_vehicle(body, &tuning.wheel_layout());

        log::info!("Vehicle {} ({}) spawned at {:?}", id.0, class, position);
        self.vehicles.insert(
            id,
            Vehicle {
                id,
                class: class.to_string(),
                body,
                tuning,
                health: tuning.max_health,
                speed_boost: false,
                shielded: false,
                spawn_point: position,
                spawn_heading: heading,
            },
        );
        id
    }

    /// Remove the vehicle and its body
    pub fn despawn(&mut self, world: &mut PhysicsWorld, id: VehicleId) -> Option<Vehicle> {
        let vehicle = self.vehicles.remove(&id)?;
        world.remove_body(vehicle.body);
        log::info!("Vehicle {} removed", id.0);
        Some(vehicle)
    }

    pub fn get(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(&id)
    }

    pub fn get_mut(&mut self, id: VehicleId) -> Option<&mut Vehicle> {
        self.vehicles.get_mut(&id)
    }

    pub fn contains(&self, id: VehicleId) -> bool {
        self.vehicles.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Vehicle> {
        self.vehicles.values_mut()
    }

    /// Current chassis positions, for area queries
    pub fn positions(&self, world: &PhysicsWorld) -> Vec<(VehicleId, Vec3)> {
        self.vehicles
            .values()
            .filter_map(|v| world.body(v.body).map(|b| (v.id, b.position)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_creates_tagged_vehicle_body() {
        let mut world = PhysicsWorld::default();
        let mut vehicles = VehicleRegistry::new();
        let id = vehicles.spawn(&mut world, "sports", VehicleTuning::sports(), Vec3::ZERO, 0.0);
        let vehicle = vehicles.get(id).unwrap();
        let body = world.body(vehicle.body).unwrap();
        assert_eq!(body.tag, BodyTag::Vehicle(id));
        assert_eq!(body.group(), CollisionGroup::VEHICLE);
        assert_eq!(world.raycast_vehicle(vehicle.body).unwrap().wheels.len(), 4);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut world = PhysicsWorld::default();
        let mut vehicles = VehicleRegistry::new();
        let a = vehicles.spawn(&mut world, "sports", VehicleTuning::sports(), Vec3::ZERO, 0.0);
        vehicles.despawn(&mut world, a);
        let b = vehicles.spawn(&mut world, "sports", VehicleTuning::sports(), Vec3::ZERO, 0.0);
        assert_ne!(a, b);
        assert!(vehicles.get(a).is_none());
    }

    #[test]
    fn test_wheel_layout_follows_drivetrain() {
        let rear = VehicleTuning::sports().wheel_layout();
        assert!(rear[0].steer && !rear[0].drive);
        assert!(!rear[2].steer && rear[2].drive);

        let all = VehicleTuning::truck().wheel_layout();
        assert!(all.iter().all(|w| w.drive));
        assert_eq!(all.iter().filter(|w| w.steer).count(), 2);
    }

    #[test]
    fn test_shield_blocks_damage() {
        let mut world = PhysicsWorld::default();
        let mut vehicles = VehicleRegistry::new();
        let id = vehicles.spawn(&mut world, "sports", VehicleTuning::sports(), Vec3::ZERO, 0.0);
        let vehicle = vehicles.get_mut(id).unwrap();
        vehicle.shielded = true;
        assert_eq!(vehicle.take_damage(40.0), 0.0);
        vehicle.shielded = false;
        assert_eq!(vehicle.take_damage(40.0), 40.0);
        assert_eq!(vehicle.take_damage(500.0), 60.0);
        assert!(vehicle.is_destroyed());
    }
}
