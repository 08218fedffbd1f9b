//! Vehicle force controller
//!
//! Turns a discrete input snapshot into wheel-level engine force, steering
//! and brake on a raycast vehicle, plus a speed-dependent downforce. Every
//! wheel is reset before the new command is written, so nothing from the
//! previous tick survives.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::vehicle::{Vehicle, VehicleTuning};
use super::world::PhysicsWorld;

/// Read-only per-tick input for one vehicle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSnapshot {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub brake: bool,
    pub boost: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Throttle {
    Forward,
    Reverse,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Steer {
    Left,
    Right,
    None,
}

impl InputSnapshot {
    /// Opposing keys cancel out
    pub fn throttle(&self) -> Throttle {
        match (self.forward, self.backward) {
            (true, false) => Throttle::Forward,
            (false, true) => Throttle::Reverse,
            _ => Throttle::None,
        }
    }

    pub fn steer(&self) -> Steer {
        match (self.left, self.right) {
            (true, false) => Steer::Left,
            (false, true) => Steer::Right,
            _ => Steer::None,
        }
    }
}

/// Wheel-level command derived from one input snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveCommand {
    /// Signed, applied to each drive wheel
    pub engine_force: f32,
    /// Radians, applied to each steer wheel; positive = left
    pub steering: f32,
    /// Applied to every wheel
    pub brake: f32,
}

/// Pure input-to-force mapping
///
/// `boosted` is true when the boost input or a speed effect is active; the
/// multiplier only applies while throttling forward.
pub fn compute_drive(input: &InputSnapshot, tuning: &VehicleTuning, boosted: bool) -> DriveCommand {
    let throttle = input.throttle();
    let engine_force = match throttle {
        Throttle::Forward if boosted => tuning.max_forward_force * tuning.boost_multiplier,
        Throttle::Forward => tuning.max_forward_force,
        Throttle::Reverse => -tuning.max_reverse_force,
        Throttle::None => 0.0,
    };

    let steering = match input.steer() {
        Steer::Left => tuning.max_steering_angle,
        Steer::Right => -tuning.max_steering_angle,
        Steer::None => 0.0,
    };

    let brake = if input.brake {
        tuning.brake_force
    } else if throttle == Throttle::None {
        tuning.idle_brake_force
    } else {
        0.0
    };

    DriveCommand {
        engine_force,
        steering,
        brake,
    }
}

/// Downforce magnitude for a given speed
pub fn downforce(tuning: &VehicleTuning, speed: f32) -> f32 {
    (tuning.downforce_coefficient * speed * speed).min(tuning.max_downforce)
}

/// Write the command for `input` onto the vehicle's wheels and body
///
/// Returns the command that was applied, or `None` when the vehicle's body
/// or wheels are gone.
pub fn apply_drive(
    world: &mut PhysicsWorld,
    vehicle: &Vehicle,
    input: &InputSnapshot,
) -> Option<DriveCommand> {
    let boosted = input.boost || vehicle.speed_boost;
    let command = compute_drive(input, &vehicle.tuning, boosted);

    let wheels = world.raycast_vehicle_mut(vehicle.body)?;
    for wheel in &mut wheels.wheels {
        wheel.reset_controls();
    }
    for wheel in &mut wheels.wheels {
        if wheel.setup.drive {
            wheel.engine_force = command.engine_force;
        }
        if wheel.setup.steer {
            wheel.steering = command.steering;
        }
        wheel.brake = command.brake;
    }

    let body = world.body_mut(vehicle.body)?;
    let push = downforce(&vehicle.tuning, body.speed());
    if push > 0.0 {
        body.apply_force(Vec3::NEG_Y * push);
    }
    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::vehicle::VehicleRegistry;

    fn tuning() -> VehicleTuning {
        VehicleTuning::sports()
    }

    #[test]
    fn test_forward_and_reverse_force() {
        let t = tuning();
        let fwd = InputSnapshot {
            forward: true,
            ..Default::default()
        };
        assert_eq!(compute_drive(&fwd, &t, false).engine_force, t.max_forward_force);
        let back = InputSnapshot {
            backward: true,
            ..Default::default()
        };
        assert_eq!(compute_drive(&back, &t, false).engine_force, -t.max_reverse_force);
    }

    #[test]
    fn test_boost_only_multiplies_forward() {
        let t = tuning();
        let fwd = InputSnapshot {
            forward: true,
            boost: true,
            ..Default::default()
        };
        assert_eq!(
            compute_drive(&fwd, &t, true).engine_force,
            t.max_forward_force * t.boost_multiplier
        );
        let back = InputSnapshot {
            backward: true,
            boost: true,
            ..Default::default()
        };
        assert_eq!(compute_drive(&back, &t, true).engine_force, -t.max_reverse_force);
    }

    #[test]
    fn test_steering_sign() {
        let t = tuning();
        let left = InputSnapshot {
            left: true,
            ..Default::default()
        };
        let right = InputSnapshot {
            right: true,
            ..Default::default()
        };
        let both = InputSnapshot {
            left: true,
            right: true,
            ..Default::default()
        };
        assert_eq!(compute_drive(&left, &t, false).steering, t.max_steering_angle);
        assert_eq!(compute_drive(&right, &t, false).steering, -t.max_steering_angle);
        assert_eq!(compute_drive(&both, &t, false).steering, 0.0);
    }

    #[test]
    fn test_idle_brake_only_without_throttle() {
        let t = tuning();
        assert_eq!(
            compute_drive(&InputSnapshot::default(), &t, false).brake,
            t.idle_brake_force
        );
        let fwd = InputSnapshot {
            forward: true,
            ..Default::default()
        };
        assert_eq!(compute_drive(&fwd, &t, false).brake, 0.0);
        let braking = InputSnapshot {
            forward: true,
            brake: true,
            ..Default::default()
        };
        assert_eq!(compute_drive(&braking, &t, false).brake, t.brake_force);
    }

    #[test]
    fn test_downforce_is_capped() {
        let t = tuning();
        assert_eq!(downforce(&t, 0.0), 0.0);
        assert!((downforce(&t, 10.0) - t.downforce_coefficient * 100.0).abs() < 1e-3);
        assert_eq!(downforce(&t, 1000.0), t.max_downforce);
    }

    #[test]
    fn test_downforce_applied_without_input() {
        let mut world = PhysicsWorld::default();
        let mut vehicles = VehicleRegistry::new();
        let id = vehicles.spawn(&mut world, "sports", tuning(), Vec3::new(0.0, 0.6, 0.0), 0.0);
        let vehicle = vehicles.get(id).unwrap().clone();

        for speed in [10.0, 1000.0] {
            let body = world.body_mut(vehicle.body).unwrap();
            body.clear_forces();
            body.linear_velocity = Vec3::new(0.0, 0.0, speed);
            apply_drive(&mut world, &vehicle, &InputSnapshot::default()).unwrap();

            let body = world.body(vehicle.body).unwrap();
            let expected = downforce(&vehicle.tuning, speed);
            assert!(expected > 0.0);
            assert!((body.force.y + expected).abs() < 1e-2, "speed {}", speed);
            assert_eq!(body.force.x, 0.0);
        }
        assert_eq!(
            world.body(vehicle.body).unwrap().force.y,
            -vehicle.tuning.max_downforce
        );
    }

    #[test]
    fn test_apply_drive_targets_axles_and_resets() {
        let mut world = PhysicsWorld::default();
        let mut vehicles = VehicleRegistry::new();
        let id = vehicles.spawn(&mut world, "sports", tuning(), Vec3::new(0.0, 0.6, 0.0), 0.0);
        let vehicle = vehicles.get(id).unwrap().clone();

        let input = InputSnapshot {
            forward: true,
            left: true,
            ..Default::default()
        };
        apply_drive(&mut world, &vehicle, &input).unwrap();
        let wheels = &world.raycast_vehicle(vehicle.body).unwrap().wheels;
        for wheel in wheels {
            if wheel.setup.drive {
                assert_eq!(wheel.engine_force, vehicle.tuning.max_forward_force);
            } else {
                assert_eq!(wheel.engine_force, 0.0);
            }
            if wheel.setup.steer {
                assert_eq!(wheel.steering, vehicle.tuning.max_steering_angle);
            } else {
                assert_eq!(wheel.steering, 0.0);
            }
        }

        // Releasing everything leaves no stale force or steering behind
        apply_drive(&mut world, &vehicle, &InputSnapshot::default()).unwrap();
        let wheels = &world.raycast_vehicle(vehicle.body).unwrap().wheels;
        assert!(wheels.iter().all(|w| w.engine_force == 0.0 && w.steering == 0.0));
        assert!(wheels.iter().all(|w| w.brake == vehicle.tuning.idle_brake_force));
    }

    #[test]
    fn test_speed_effect_boosts_without_input() {
        let mut world = PhysicsWorld::default();
        let mut vehicles = VehicleRegistry::new();
        let id = vehicles.spawn(&mut world, "sports", tuning(), Vec3::new(0.0, 0.6, 0.0), 0.0);
        let mut vehicle = vehicles.get(id).unwrap().clone();
        vehicle.speed_boost = true;
        let input = InputSnapshot {
            forward: true,
            ..Default::default()
        };
        let command = apply_drive(&mut world, &vehicle, &input).unwrap();
        assert_eq!(
            command.engine_force,
            vehicle.tuning.max_forward_force * vehicle.tuning.boost_multiplier
        );
    }

    #[test]
    fn test_forward_throttle_moves_vehicle_forward() {
        let mut world = PhysicsWorld::default();
        let mut vehicles = VehicleRegistry::new();
        let id = vehicles.spawn(&mut world, "sports", tuning(), Vec3::new(0.0, 0.6, 0.0), 0.0);
        let vehicle = vehicles.get(id).unwrap().clone();
        let input = InputSnapshot {
            forward: true,
            ..Default::default()
        };
        for _ in 0..60 {
            apply_drive(&mut world, &vehicle, &input);
            world.step(1.0 / 60.0, 1.0 / 60.0, 5);
        }
        let body = world.body(vehicle.body).unwrap();
        assert!(body.linear_velocity.dot(body.forward()) > 0.5);
    }
}
