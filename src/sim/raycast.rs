//! Raycast-wheel vehicle attached to a chassis body
//!
//! Each wheel casts a ray from its connection point along the chassis down
//! axis to the ground plane. A hit compresses a spring/damper suspension and
//! lets the wheel push the chassis: engine force along the steered wheel
//! heading, brake force against longitudinal slip, and lateral friction.
//! Wheel `engine_force`, `brake` and `steering` are written by the drive
//! controller and held until it writes them again.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::body::RigidBody;

/// Static geometry and suspension parameters for one wheel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelSetup {
    /// Suspension attachment point in chassis space
    pub connection: Vec3,
    pub radius: f32,
    pub suspension_rest_length: f32,
    /// Spring rate (N/m)
    pub suspension_stiffness: f32,
    /// Damper rate (N·s/m)
    pub suspension_damping: f32,
    /// Lateral grip coefficient
    pub friction: f32,
    /// Receives engine force
    pub drive: bool,
    /// Receives steering angle
    pub steer: bool,
}

/// Runtime state of one wheel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wheel {
    pub setup: WheelSetup,
    pub engine_force: f32,
    pub brake: f32,
    /// Radians about the chassis up axis, positive = left
    pub steering: f32,
    pub in_contact: bool,
    pub suspension_length: f32,
}

impl Wheel {
    pub fn new(setup: WheelSetup) -> Self {
        Self {
            setup,
            engine_force: 0.0,
            brake: 0.0,
            steering: 0.0,
            in_contact: false,
            suspension_length: setup.suspension_rest_length,
        }
    }

    /// Zero every per-tick input
    pub fn reset_controls(&mut self) {
        self.engine_force = 0.0;
        self.brake = 0.0;
        self.steering = 0.0;
    }
}

/// Wheels attached to a chassis body
#[derive(Debug, Clone)]
pub struct RaycastVehicle {
    pub wheels: Vec<Wheel>,
}

impl RaycastVehicle {
    pub fn new(setups: &[WheelSetup]) -> Self {
        Self {
            wheels: setups.iter().copied().map(Wheel::new).collect(),
        }
    }

    /// Raycast every wheel against the ground plane and push wheel forces
    /// onto the chassis force accumulator.
    pub(crate) fn update(&mut self, chassis: &mut RigidBody, ground_height: f32, dt: f32) {
        let up = chassis.up();
        let down = -up;
        let wheel_count = self.wheels.len().max(1) as f32;
        let mass_share = chassis.mass / wheel_count;

        for wheel in &mut self.wheels {
            let setup = wheel.setup;
            let origin = chassis.position + chassis.orientation * setup.connection;
            let max_ray = setup.suspension_rest_length + setup.radius;

            // Ray along chassis down against the horizontal plane y = ground_height
            let hit_distance = if down.y < -1e-3 {
                let d = (ground_height - origin.y) / down.y;
                (0.0..=max_ray).contains(&d).then_some(d)
            } else {
                None
            };

            let Some(distance) = hit_distance else {
                wheel.in_contact = false;
                wheel.suspension_length = setup.suspension_rest_length;
                continue;
            };

            wheel.in_contact = true;
            wheel.suspension_length =
                (distance - setup.radius).clamp(0.0, setup.suspension_rest_length);
            let compression = setup.suspension_rest_length - wheel.suspension_length;

            let contact = origin + down * distance;
            let point_vel = chassis.velocity_at(origin);

            // Suspension
            let closing = point_vel.dot(up);
            let spring = (setup.suspension_stiffness * compression
                - setup.suspension_damping * closing)
                .max(0.0);
            chassis.apply_force_at(Vec3::Y * spring, origin);

            // Wheel frame projected onto the ground plane
            let steer_rot = Quat::from_axis_angle(up, wheel.steering);
            let heading = steer_rot * chassis.forward();
            let forward = Vec3::new(heading.x, 0.0, heading.z).normalize_or_zero();
            if forward == Vec3::ZERO {
                continue;
            }
            let side = Vec3::Y.cross(forward);

            // Longitudinal and lateral forces act at chassis height so they
            // don't roll or pitch the body.
            let lever = contact - chassis.position;
            let apply_at = chassis.position + lever - up * lever.dot(up);

            let contact_vel = chassis.velocity_at(contact);
            let v_long = contact_vel.dot(forward);
            let v_lat = contact_vel.dot(side);

            let mut long_force = wheel.engine_force;
            if wheel.brake > 0.0 {
                // Never reverse the wheel within one step
                let stop = v_long.abs() * mass_share / dt;
                long_force -= v_long.signum() * wheel.brake.min(stop);
            }

            let grip_limit = setup.friction * spring.max(mass_share * 9.82);
            let lateral = (-v_lat * mass_share / dt).clamp(-grip_limit, grip_limit);

            chassis.apply_force_at(forward * long_force + side * lateral, apply_at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::body::{BodyDesc, BodyHandle, Shape};
    use crate::sim::groups::CollisionGroup;

    fn setup(connection: Vec3) -> WheelSetup {
        WheelSetup {
            connection,
            radius: 0.35,
            suspension_rest_length: 0.3,
            suspension_stiffness: 3000.0,
            suspension_damping: 450.0,
            friction: 1.5,
            drive: true,
            steer: false,
        }
    }

    fn chassis(height: f32) -> RigidBody {
        let desc = BodyDesc::dynamic(
            CollisionGroup::VEHICLE,
            Shape::Box {
                half_extents: Vec3::new(0.9, 0.25, 1.8),
            },
            150.0,
            Vec3::new(0.0, height, 0.0),
        );
        RigidBody::from_desc(BodyHandle(1), desc)
    }

    #[test]
    fn test_wheel_off_ground_has_no_contact() {
        let mut vehicle = RaycastVehicle::new(&[setup(Vec3::ZERO)]);
        let mut body = chassis(5.0);
        vehicle.update(&mut body, 0.0, 1.0 / 60.0);
        assert!(!vehicle.wheels[0].in_contact);
        assert_eq!(body.force, Vec3::ZERO);
    }

    #[test]
    fn test_compressed_suspension_pushes_up() {
        let mut vehicle = RaycastVehicle::new(&[setup(Vec3::ZERO)]);
        let mut body = chassis(0.5);
        vehicle.update(&mut body, 0.0, 1.0 / 60.0);
        assert!(vehicle.wheels[0].in_contact);
        assert!(body.force.y > 0.0);
    }

    #[test]
    fn test_engine_force_pushes_along_heading() {
        let mut vehicle = RaycastVehicle::new(&[setup(Vec3::ZERO)]);
        vehicle.wheels[0].engine_force = 500.0;
        let mut body = chassis(0.5);
        vehicle.update(&mut body, 0.0, 1.0 / 60.0);
        assert!(body.force.z > 0.0);
        assert!(body.force.x.abs() < 1e-3);
    }

    #[test]
    fn test_brake_opposes_motion() {
        let mut vehicle = RaycastVehicle::new(&[setup(Vec3::ZERO)]);
        vehicle.wheels[0].brake = 200.0;
        let mut body = chassis(0.5);
        body.linear_velocity = Vec3::Z * 10.0;
        vehicle.update(&mut body, 0.0, 1.0 / 60.0);
        assert!(body.force.z < 0.0);
    }
}
