//! Rigid bodies owned by the physics world

use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::groups::{BodyFilter, CollisionGroup};
use super::mine::MineId;
use super::powerup::PowerUpId;
use super::vehicle::VehicleId;

/// Opaque handle to a body in the physics world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyHandle(pub(crate) u32);

/// Gameplay entity a body belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyTag {
    Vehicle(VehicleId),
    Mine(MineId),
    PowerUp(PowerUpId),
    /// Terrain, walls, props
    Static,
}

/// Collision shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Sphere { radius: f32 },
    /// Oriented box, half extents in body space
    Box { half_extents: Vec3 },
}

impl Shape {
    /// Radius of the sphere enclosing the shape
    pub fn bounding_radius(&self) -> f32 {
        match *self {
            Shape::Sphere { radius } => radius,
            Shape::Box { half_extents } => half_extents.length(),
        }
    }

    /// Distance from the body origin to its lowest point along world Y
    pub fn vertical_extent(&self, orientation: Quat) -> f32 {
        match *self {
            Shape::Sphere { radius } => radius,
            Shape::Box { half_extents } => {
                let rot = Mat3::from_quat(orientation);
                // |R row y| . h
                rot.x_axis.y.abs() * half_extents.x
                    + rot.y_axis.y.abs() * half_extents.y
                    + rot.z_axis.y.abs() * half_extents.z
            }
        }
    }

    /// Principal moments of inertia for a solid shape of the given mass
    pub fn inertia(&self, mass: f32) -> Vec3 {
        match *self {
            Shape::Sphere { radius } => Vec3::splat(0.4 * mass * radius * radius),
            Shape::Box { half_extents } => {
                let e = half_extents * 2.0;
                Vec3::new(
                    mass / 12.0 * (e.y * e.y + e.z * e.z),
                    mass / 12.0 * (e.x * e.x + e.z * e.z),
                    mass / 12.0 * (e.x * e.x + e.y * e.y),
                )
            }
        }
    }
}

/// Construction parameters for a new body
#[derive(Debug, Clone)]
pub struct BodyDesc {
    pub position: Vec3,
    pub orientation: Quat,
    /// 0 = static
    pub mass: f32,
    pub shape: Shape,
    /// Only ever set from the group registry
    filter: BodyFilter,
    /// Contact-only, no impulse response
    pub is_trigger: bool,
    pub tag: BodyTag,
    pub linear_damping: f32,
    pub angular_damping: f32,
}

impl BodyDesc {
    /// A dynamic body in `group` with the registry mask
    pub fn dynamic(group: CollisionGroup, shape: Shape, mass: f32, position: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
            mass,
            shape,
            filter: BodyFilter::for_group(group),
            is_trigger: false,
            tag: BodyTag::Static,
            linear_damping: 0.01,
            angular_damping: 0.01,
        }
    }

    /// A static body in `group` with the registry mask
    pub fn fixed(group: CollisionGroup, shape: Shape, position: Vec3) -> Self {
        Self::dynamic(group, shape, 0.0, position)
    }

    pub fn filter(&self) -> BodyFilter {
        self.filter
    }

    pub fn with_tag(mut self, tag: BodyTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn trigger(mut self) -> Self {
        self.is_trigger = true;
        self
    }
}

/// A physics-simulated body
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub handle: BodyHandle,
    pub position: Vec3,
    pub orientation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub mass: f32,
    pub shape: Shape,
    pub is_trigger: bool,
    pub tag: BodyTag,
    pub linear_damping: f32,
    pub angular_damping: f32,
    filter: BodyFilter,
    inv_inertia: Vec3,
    pub(crate) force: Vec3,
    pub(crate) torque: Vec3,
}

impl RigidBody {
    pub(crate) fn from_desc(handle: BodyHandle, desc: BodyDesc) -> Self {
        let mass = desc.mass.max(0.0);
        let inv_inertia = if mass > 0.0 {
            desc.shape.inertia(mass).recip()
        } else {
            Vec3::ZERO
        };
        Self {
            handle,
            position: desc.position,
            orientation: desc.orientation.normalize(),
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            mass,
            shape: desc.shape,
            is_trigger: desc.is_trigger,
            tag: desc.tag,
            linear_damping: desc.linear_damping,
            angular_damping: desc.angular_damping,
            filter: desc.filter,
            inv_inertia,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
        }
    }

    /// Group/mask fixed at creation
    pub fn filter(&self) -> BodyFilter {
        self.filter
    }

    pub fn group(&self) -> CollisionGroup {
        self.filter.group
    }

    pub fn is_static(&self) -> bool {
        self.mass <= 0.0
    }

    pub fn inv_mass(&self) -> f32 {
        if self.is_static() { 0.0 } else { 1.0 / self.mass }
    }

    /// Body-space +Z rotated into world space
    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::Z
    }

    pub fn up(&self) -> Vec3 {
        self.orientation * Vec3::Y
    }

    pub fn speed(&self) -> f32 {
        self.linear_velocity.length()
    }

    /// Velocity of a world-space point rigidly attached to the body
    pub fn velocity_at(&self, point: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(point - self.position)
    }

    /// Accumulate a force through the center of mass
    pub fn apply_force(&mut self, force: Vec3) {
        if !self.is_static() {
            self.force += force;
        }
    }

    /// Accumulate a force at a world-space point
    pub fn apply_force_at(&mut self, force: Vec3, point: Vec3) {
        if !self.is_static() {
            self.force += force;
            self.torque += (point - self.position).cross(force);
        }
    }

    /// Instantaneous velocity change through the center of mass
    pub fn apply_impulse(&mut self, impulse: Vec3) {
        if !self.is_static() {
            self.linear_velocity += impulse / self.mass;
        }
    }

    /// World-space inverse inertia applied to a torque
    pub(crate) fn angular_accel(&self, torque: Vec3) -> Vec3 {
        let local = self.orientation.inverse() * torque;
        self.orientation * (local * self.inv_inertia)
    }

    pub(crate) fn clear_forces(&mut self) {
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }
}
