//! Minimal rigid-body world
//!
//! Fixed-step integrator with an accumulator, a horizontal ground plane,
//! sphere/box narrowphase filtered by collision group, trigger bodies,
//! raycast vehicles, a per-step contact list and a begin-contact stream.
//! The gameplay layer only talks to this through the handful of calls the
//! game needs; it is not a general-purpose engine.

use std::collections::{BTreeMap, BTreeSet};

use glam::{Quat, Vec3};

use super::body::{BodyDesc, BodyHandle, RigidBody, Shape};
use super::groups::CollisionGroup;
use super::raycast::{RaycastVehicle, WheelSetup};

/// A single touching pair produced by the narrowphase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// Unit normal pointing from A toward B
    pub normal: Vec3,
    pub depth: f32,
    pub point: Vec3,
    /// Closing speed along the normal, sampled before impulse response.
    /// Positive when the bodies are moving toward each other.
    pub approach_speed: f32,
}

impl Contact {
    fn key(&self) -> (BodyHandle, BodyHandle) {
        pair_key(self.body_a, self.body_b)
    }
}

/// Surface response for a pair of groups
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactMaterial {
    pub group_a: CollisionGroup,
    pub group_b: CollisionGroup,
    pub friction: f32,
    pub restitution: f32,
}

impl ContactMaterial {
    fn matches(&self, a: CollisionGroup, b: CollisionGroup) -> bool {
        (self.group_a.intersects(a) && self.group_b.intersects(b))
            || (self.group_a.intersects(b) && self.group_b.intersects(a))
    }
}

const DEFAULT_MATERIAL: (f32, f32) = (0.3, 0.1);

fn pair_key(a: BodyHandle, b: BodyHandle) -> (BodyHandle, BodyHandle) {
    if a < b { (a, b) } else { (b, a) }
}

/// The physics world
#[derive(Debug)]
pub struct PhysicsWorld {
    pub gravity: Vec3,
    pub ground_height: f32,
    bodies: BTreeMap<BodyHandle, RigidBody>,
    vehicles: BTreeMap<BodyHandle, RaycastVehicle>,
    materials: Vec<ContactMaterial>,
    accumulator: f32,
    next_handle: u32,
    /// Contacts from the most recent sub-step
    contacts: Vec<Contact>,
    /// Pairs touching at the end of the most recent sub-step
    touching: BTreeSet<(BodyHandle, BodyHandle)>,
    /// New pairs since the last drain
    begin_contacts: Vec<Contact>,
    steps_taken: u64,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, -9.82, 0.0), 0.0)
    }
}

impl PhysicsWorld {
    pub fn new(gravity: Vec3, ground_height: f32) -> Self {
        Self {
            gravity,
            ground_height,
            bodies: BTreeMap::new(),
            vehicles: BTreeMap::new(),
            materials: Vec::new(),
            accumulator: 0.0,
            next_handle: 1,
            contacts: Vec::new(),
            touching: BTreeSet::new(),
            begin_contacts: Vec::new(),
            steps_taken: 0,
        }
    }

    pub fn add_body(&mut self, desc: BodyDesc) -> BodyHandle {
        let handle = BodyHandle(self.next_handle);
        self.next_handle += 1;
        self.bodies.insert(handle, RigidBody::from_desc(handle, desc));
        handle
    }

    /// Remove a body; any pending contacts that reference it are dropped.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Option<RigidBody> {
        let body = self.bodies.remove(&handle)?;
        self.vehicles.remove(&handle);
        self.touching.retain(|&(a, b)| a != handle && b != handle);
        self.contacts
            .retain(|c| c.body_a != handle && c.body_b != handle);
        self.begin_contacts
            .retain(|c| c.body_a != handle && c.body_b != handle);
        Some(body)
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(&handle)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(&handle)
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.bodies.contains_key(&handle)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn bodies(&self) -> impl Iterator<Item = &RigidBody> {
        self.bodies.values()
    }

    pub fn add_contact_material(&mut self, material: ContactMaterial) {
        self.materials.push(material);
    }

    /// Attach raycast wheels to an existing chassis body
    pub fn add_raycast_vehicle(&mut self, chassis: BodyHandle, wheels: &[WheelSetup]) -> bool {
        if !self.bodies.contains_key(&chassis) {
            return false;
        }
        self.vehicles.insert(chassis, RaycastVehicle::new(wheels));
        true
    }

    pub fn raycast_vehicle(&self, chassis: BodyHandle) -> Option<&RaycastVehicle> {
        self.vehicles.get(&chassis)
    }

    pub fn raycast_vehicle_mut(&mut self, chassis: BodyHandle) -> Option<&mut RaycastVehicle> {
        self.vehicles.get_mut(&chassis)
    }

    /// Contacts from the last sub-step
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Take every contact that began since the previous drain
    pub fn drain_begin_contacts(&mut self) -> Vec<Contact> {
        std::mem::take(&mut self.begin_contacts)
    }

    /// Time carried over to the next `step` call
    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    /// Advance by `frame_dt` in sub-steps of `fixed_dt`
    ///
    /// Returns the number of sub-steps run. Leftover time is carried over;
    /// anything beyond `max_substeps` worth of time is dropped so a slow
    /// frame can't snowball. External forces are held for every sub-step
    /// of this call and cleared at the end.
    pub fn step(&mut self, fixed_dt: f32, frame_dt: f32, max_substeps: u32) -> u32 {
        if fixed_dt <= 0.0 {
            return 0;
        }
        self.accumulator += frame_dt.max(0.0);
        let cap = fixed_dt * max_substeps as f32;
        if self.accumulator > cap {
            self.accumulator = cap;
        }

        let mut substeps = 0;
        // Small epsilon so an exact multiple of fixed_dt isn't lost to rounding
        while self.accumulator + 1e-6 >= fixed_dt && substeps < max_substeps {
            self.internal_step(fixed_dt);
            self.accumulator = (self.accumulator - fixed_dt).max(0.0);
            substeps += 1;
        }

        for body in self.bodies.values_mut() {
            body.clear_forces();
        }
        substeps
    }

    fn internal_step(&mut self, dt: f32) {
        // Snapshot external forces so they apply on every sub-step
        let external: Vec<(BodyHandle, Vec3, Vec3)> = self
            .bodies
            .values()
            .map(|b| (b.handle, b.force, b.torque))
            .collect();

        for (handle, vehicle) in self.vehicles.iter_mut() {
            if let Some(chassis) = self.bodies.get_mut(handle) {
                vehicle.update(chassis, self.ground_height, dt);
            }
        }

        for body in self.bodies.values_mut() {
            if body.is_static() {
                continue;
            }
            let accel = body.force / body.mass + self.gravity;
            body.linear_velocity += accel * dt;
            body.linear_velocity *= (1.0 - body.linear_damping).powf(dt);
            let angular_accel = body.angular_accel(body.torque);
            body.angular_velocity += angular_accel * dt;
            body.angular_velocity *= (1.0 - body.angular_damping).powf(dt);

            body.position += body.linear_velocity * dt;
            let w = body.angular_velocity;
            if w.length_squared() > 0.0 {
                let spin = Quat::from_scaled_axis(w * dt);
                body.orientation = (spin * body.orientation).normalize();
            }
        }

        for (handle, force, torque) in external {
            if let Some(body) = self.bodies.get_mut(&handle) {
                body.force = force;
                body.torque = torque;
            }
        }

        self.resolve_ground(dt);
        self.detect_contacts();
        self.steps_taken += 1;
    }

    fn resolve_ground(&mut self, dt: f32) {
        let ground = self.ground_height;
        for body in self.bodies.values_mut() {
            if body.is_static() || body.is_trigger {
                continue;
            }
            let extent = body.shape.vertical_extent(body.orientation);
            let penetration = ground - (body.position.y - extent);
            if penetration > 0.0 {
                body.position.y += penetration;
                if body.linear_velocity.y < 0.0 {
                    body.linear_velocity.y = 0.0;
                }
                // Wheels carry vehicles; everything else scrubs speed on the ground
                if !self.vehicles.contains_key(&body.handle) {
                    let scrub = (1.0 - 4.0 * dt).max(0.0);
                    body.linear_velocity.x *= scrub;
                    body.linear_velocity.z *= scrub;
                    body.angular_velocity *= scrub;
                }
            }
        }
    }

    fn detect_contacts(&mut self) {
        let handles: Vec<BodyHandle> = self.bodies.keys().copied().collect();
        let mut found = Vec::new();

        for (i, &ha) in handles.iter().enumerate() {
            for &hb in &handles[i + 1..] {
                let (Some(a), Some(b)) = (self.bodies.get(&ha), self.bodies.get(&hb)) else {
                    continue;
                };
                if a.is_static() && b.is_static() {
                    continue;
                }
                if !a.filter().accepts(&b.filter()) {
                    continue;
                }
                if let Some(contact) = narrowphase(a, b) {
                    found.push(contact);
                }
            }
        }

        for contact in &found {
            self.respond(contact);
        }

        let mut now_touching = BTreeSet::new();
        for contact in &found {
            let key = contact.key();
            now_touching.insert(key);
            let already_reported = self.begin_contacts.iter().any(|c| c.key() == key);
            if !self.touching.contains(&key) && !already_reported {
                self.begin_contacts.push(*contact);
            }
        }
        self.touching = now_touching;
        self.contacts = found;
    }

    fn material_for(&self, a: CollisionGroup, b: CollisionGroup) -> (f32, f32) {
        self.materials
            .iter()
            .rev()
            .find(|m| m.matches(a, b))
            .map(|m| (m.friction, m.restitution))
            .unwrap_or(DEFAULT_MATERIAL)
    }

    fn respond(&mut self, contact: &Contact) {
        let (ga, gb, trigger, inv_a, inv_b) = match (
            self.bodies.get(&contact.body_a),
            self.bodies.get(&contact.body_b),
        ) {
            (Some(a), Some(b)) => (
                a.group(),
                b.group(),
                a.is_trigger || b.is_trigger,
                a.inv_mass(),
                b.inv_mass(),
            ),
            _ => return,
        };
        let inv_sum = inv_a + inv_b;
        if trigger || inv_sum <= 0.0 {
            return;
        }
        let (friction, restitution) = self.material_for(ga, gb);
        let n = contact.normal;

        // Positional correction split by inverse mass
        let correction = n * (contact.depth / inv_sum);
        let mut impulse = Vec3::ZERO;
        if contact.approach_speed > 0.0 {
            let j = (1.0 + restitution) * contact.approach_speed / inv_sum;
            impulse = n * j;
        }

        if let Some(a) = self.bodies.get_mut(&contact.body_a) {
            a.position -= correction * inv_a;
            a.linear_velocity -= impulse * inv_a;
            let tangential = a.linear_velocity - n * a.linear_velocity.dot(n);
            a.linear_velocity -= tangential * (friction * 0.1).min(1.0) * inv_a / inv_sum;
        }
        if let Some(b) = self.bodies.get_mut(&contact.body_b) {
            b.position += correction * inv_b;
            b.linear_velocity += impulse * inv_b;
            let tangential = b.linear_velocity - n * b.linear_velocity.dot(n);
            b.linear_velocity -= tangential * (friction * 0.1).min(1.0) * inv_b / inv_sum;
        }
    }
}

/// Shape-vs-shape test; box pairs use the bounding sphere of `b`
fn narrowphase(a: &RigidBody, b: &RigidBody) -> Option<Contact> {
    let (normal, depth, point) = match (a.shape, b.shape) {
        (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) => {
            sphere_sphere(a.position, ra, b.position, rb)?
        }
        (Shape::Sphere { radius }, Shape::Box { half_extents }) => {
            let (n, d, p) = sphere_box(a.position, radius, b.position, b.orientation, half_extents)?;
            // sphere_box normal points from box to sphere
            (-n, d, p)
        }
        (Shape::Box { half_extents }, Shape::Sphere { radius }) => {
            sphere_box(b.position, radius, a.position, a.orientation, half_extents)?
        }
        (Shape::Box { half_extents }, Shape::Box { .. }) => {
            let radius = b.shape.bounding_radius();
            sphere_box(b.position, radius, a.position, a.orientation, half_extents)?
        }
    };

    let relative = b.velocity_at(point) - a.velocity_at(point);
    Some(Contact {
        body_a: a.handle,
        body_b: b.handle,
        normal,
        depth,
        point,
        approach_speed: -relative.dot(normal),
    })
}

fn sphere_sphere(pa: Vec3, ra: f32, pb: Vec3, rb: f32) -> Option<(Vec3, f32, Vec3)> {
    let delta = pb - pa;
    let dist = delta.length();
    let depth = ra + rb - dist;
    if depth <= 0.0 {
        return None;
    }
    let normal = if dist > 1e-6 { delta / dist } else { Vec3::Y };
    Some((normal, depth, pa + normal * (ra - depth * 0.5)))
}

/// Normal points from the box toward the sphere
fn sphere_box(
    center: Vec3,
    radius: f32,
    box_pos: Vec3,
    box_rot: Quat,
    half_extents: Vec3,
) -> Option<(Vec3, f32, Vec3)> {
    let local = box_rot.inverse() * (center - box_pos);
    let clamped = local.clamp(-half_extents, half_extents);
    let offset = local - clamped;
    let dist = offset.length();

    if dist > 1e-6 {
        let depth = radius - dist;
        if depth <= 0.0 {
            return None;
        }
        let normal = box_rot * (offset / dist);
        let point = box_pos + box_rot * clamped;
        return Some((normal, depth, point));
    }

    // Sphere center inside the box: push out through the nearest face
    let gaps = half_extents - local.abs();
    let (axis, gap) = if gaps.x <= gaps.y && gaps.x <= gaps.z {
        (Vec3::X * local.x.signum(), gaps.x)
    } else if gaps.y <= gaps.z {
        (Vec3::Y * local.y.signum(), gaps.y)
    } else {
        (Vec3::Z * local.z.signum(), gaps.z)
    };
    let normal = box_rot * axis;
    Some((normal, gap + radius, box_pos + box_rot * local))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::body::BodyTag;

    const DT: f32 = 1.0 / 60.0;

    fn sphere(world: &mut PhysicsWorld, group: CollisionGroup, pos: Vec3, mass: f32) -> BodyHandle {
        world.add_body(BodyDesc::dynamic(group, Shape::Sphere { radius: 0.5 }, mass, pos))
    }

    #[test]
    fn test_accumulator_carries_remainder() {
        let mut world = PhysicsWorld::default();
        assert_eq!(world.step(DT, DT * 0.5, 5), 0);
        assert!((world.accumulator() - DT * 0.5).abs() < 1e-6);
        assert_eq!(world.step(DT, DT * 0.6, 5), 1);
        assert!((world.accumulator() - DT * 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_slow_frame_runs_multiple_substeps() {
        let mut world = PhysicsWorld::default();
        assert_eq!(world.step(DT, DT * 3.0, 5), 3);
        // Clamped to the substep budget
        assert_eq!(world.step(DT, 1.0, 5), 5);
        assert_eq!(world.steps_taken(), 8);
    }

    #[test]
    fn test_gravity_settles_on_ground() {
        let mut world = PhysicsWorld::default();
        let h = sphere(&mut world, CollisionGroup::MINE, Vec3::new(0.0, 2.0, 0.0), 1.0);
        for _ in 0..120 {
            world.step(DT, DT, 5);
        }
        let body = world.body(h).unwrap();
        assert!((body.position.y - 0.5).abs() < 0.05, "y = {}", body.position.y);
    }

    #[test]
    fn test_begin_contact_reported_once() {
        let mut world = PhysicsWorld::new(Vec3::ZERO, -100.0);
        let a = world.add_body(
            BodyDesc::dynamic(CollisionGroup::VEHICLE, Shape::Sphere { radius: 1.0 }, 10.0, Vec3::ZERO)
                .with_tag(BodyTag::Static),
        );
        let b = world.add_body(
            BodyDesc::fixed(CollisionGroup::POWER_UP, Shape::Sphere { radius: 1.0 }, Vec3::X * 1.5)
                .trigger(),
        );
        world.step(DT, DT, 5);
        let begun = world.drain_begin_contacts();
        assert_eq!(begun.len(), 1);
        assert_eq!(begun[0].body_a, a);
        assert_eq!(begun[0].body_b, b);

        // Still overlapping: no new begin event
        world.step(DT, DT, 5);
        assert!(world.drain_begin_contacts().is_empty());
        assert_eq!(world.contacts().len(), 1);
    }

    #[test]
    fn test_trigger_gets_no_response() {
        let mut world = PhysicsWorld::new(Vec3::ZERO, -100.0);
        let a = sphere(&mut world, CollisionGroup::VEHICLE, Vec3::ZERO, 10.0);
        world.add_body(
            BodyDesc::fixed(CollisionGroup::POWER_UP, Shape::Sphere { radius: 0.5 }, Vec3::X * 0.8)
                .trigger(),
        );
        world.body_mut(a).unwrap().linear_velocity = Vec3::X;
        world.step(DT, DT, 5);
        let body = world.body(a).unwrap();
        assert!((body.linear_velocity.x - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_masked_groups_never_touch() {
        let mut world = PhysicsWorld::new(Vec3::ZERO, -100.0);
        sphere(&mut world, CollisionGroup::MINE, Vec3::ZERO, 1.0);
        world.add_body(
            BodyDesc::fixed(CollisionGroup::POWER_UP, Shape::Sphere { radius: 0.5 }, Vec3::X * 0.5)
                .trigger(),
        );
        world.step(DT, DT, 5);
        assert!(world.contacts().is_empty());
        assert!(world.drain_begin_contacts().is_empty());
    }

    #[test]
    fn test_approach_speed_positive_when_closing() {
        let mut world = PhysicsWorld::new(Vec3::ZERO, -100.0);
        let a = sphere(&mut world, CollisionGroup::VEHICLE, Vec3::ZERO, 10.0);
        sphere(&mut world, CollisionGroup::MINE, Vec3::X * 1.05, 1.0);
        world.body_mut(a).unwrap().linear_velocity = Vec3::X * 5.0;
        world.step(DT, DT, 5);
        let begun = world.drain_begin_contacts();
        assert_eq!(begun.len(), 1);
        assert!(begun[0].approach_speed > 0.0);
    }

    #[test]
    fn test_removed_body_drops_pending_contacts() {
        let mut world = PhysicsWorld::new(Vec3::ZERO, -100.0);
        sphere(&mut world, CollisionGroup::VEHICLE, Vec3::ZERO, 10.0);
        let b = sphere(&mut world, CollisionGroup::MINE, Vec3::X * 0.9, 1.0);
        world.step(DT, DT, 5);
        assert!(world.remove_body(b).is_some());
        assert!(world.drain_begin_contacts().is_empty());
        assert!(world.remove_body(b).is_none());
    }

    #[test]
    fn test_sphere_inside_box_pushes_out() {
        let (n, depth, _) = sphere_box(
            Vec3::new(0.0, 0.4, 0.0),
            0.2,
            Vec3::ZERO,
            Quat::IDENTITY,
            Vec3::new(1.0, 0.5, 1.0),
        )
        .unwrap();
        assert!((n - Vec3::Y).length() < 1e-5);
        assert!((depth - 0.3).abs() < 1e-5);
    }
}
