//! Collision taxonomy and handler dispatch
//!
//! Every new contact is classified by the collision groups of its two
//! bodies. A contact is typed only when exactly one body is a vehicle; the
//! type comes from the other body's group. Handlers are registered per type
//! and run in registration order. A failing handler (error or panic) is
//! logged and never stops the handlers after it.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::body::{BodyHandle, BodyTag};
use super::groups::CollisionGroup;
use super::world::{Contact, PhysicsWorld};

/// Gameplay meaning of a vehicle contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CollisionType {
    PowerUp,
    Mine,
    Environment,
    Projectile,
}

impl CollisionType {
    /// Type for a vehicle touching a body of `group`
    pub fn from_group(group: CollisionGroup) -> Option<Self> {
        if group == CollisionGroup::POWER_UP {
            Some(Self::PowerUp)
        } else if group == CollisionGroup::MINE {
            Some(Self::Mine)
        } else if group == CollisionGroup::ENVIRONMENT {
            Some(Self::Environment)
        } else if group == CollisionGroup::PROJECTILE {
            Some(Self::Projectile)
        } else {
            None
        }
    }
}

/// Classify a pair by collision group
///
/// `None` unless exactly one side is a vehicle.
pub fn classify(group_a: CollisionGroup, group_b: CollisionGroup) -> Option<CollisionType> {
    let a_vehicle = group_a == CollisionGroup::VEHICLE;
    let b_vehicle = group_b == CollisionGroup::VEHICLE;
    match (a_vehicle, b_vehicle) {
        (true, false) => CollisionType::from_group(group_b),
        (false, true) => CollisionType::from_group(group_a),
        _ => None,
    }
}

/// One side of a contact, captured after the step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactBody {
    pub handle: BodyHandle,
    pub group: CollisionGroup,
    pub tag: BodyTag,
    pub position: Vec3,
    pub velocity: Vec3,
}

impl ContactBody {
    fn capture(world: &PhysicsWorld, handle: BodyHandle) -> Option<Self> {
        let body = world.body(handle)?;
        Some(Self {
            handle,
            group: body.group(),
            tag: body.tag,
            position: body.position,
            velocity: body.linear_velocity,
        })
    }
}

/// A begin-contact handed to collision handlers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent {
    pub a: ContactBody,
    pub b: ContactBody,
    /// Unit normal from `a` toward `b`
    pub normal: Vec3,
    pub point: Vec3,
    pub depth: f32,
    /// Closing speed along the normal; positive when approaching
    pub approach_speed: f32,
}

impl CollisionEvent {
    /// Build from a world contact; `None` if either body is gone
    pub fn from_contact(world: &PhysicsWorld, contact: &Contact) -> Option<Self> {
        Some(Self {
            a: ContactBody::capture(world, contact.body_a)?,
            b: ContactBody::capture(world, contact.body_b)?,
            normal: contact.normal,
            point: contact.point,
            depth: contact.depth,
            approach_speed: contact.approach_speed,
        })
    }

    pub fn collision_type(&self) -> Option<CollisionType> {
        classify(self.a.group, self.b.group)
    }

    /// Same contact with the vehicle body as `a`
    pub fn oriented(&self) -> Self {
        if self.b.group == CollisionGroup::VEHICLE && self.a.group != CollisionGroup::VEHICLE {
            Self {
                a: self.b,
                b: self.a,
                normal: -self.normal,
                ..*self
            }
        } else {
            *self
        }
    }

    /// The vehicle side, if exactly one side is a vehicle
    pub fn vehicle(&self) -> Option<&ContactBody> {
        self.collision_type()?;
        if self.a.group == CollisionGroup::VEHICLE {
            Some(&self.a)
        } else {
            Some(&self.b)
        }
    }

    /// The non-vehicle side, if exactly one side is a vehicle
    pub fn other(&self) -> Option<&ContactBody> {
        self.collision_type()?;
        if self.a.group == CollisionGroup::VEHICLE {
            Some(&self.b)
        } else {
            Some(&self.a)
        }
    }
}

/// Failure reported by a collision handler
#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    /// The entity a body was tagged with is no longer registered
    #[error("missing entity: {0}")]
    MissingEntity(String),

    /// Body tag does not match the collision type
    #[error("unexpected body tag {0:?}")]
    UnexpectedTag(BodyTag),

    #[error("{0}")]
    Failed(String),
}

pub type Handler<C> = Box<dyn FnMut(&CollisionEvent, &mut C) -> Result<(), HandlerError>>;

/// Outcome counts for one or more dispatches
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Events that classified to a type
    pub typed: usize,
    /// Events with no type (dropped)
    pub untyped: usize,
    pub handlers_run: usize,
    pub handlers_failed: usize,
}

impl DispatchReport {
    pub fn merge(&mut self, other: DispatchReport) {
        self.typed += other.typed;
        self.untyped += other.untyped;
        self.handlers_run += other.handlers_run;
        self.handlers_failed += other.handlers_failed;
    }
}

/// Ordered handler lists per collision type
///
/// `C` is the context handed to every handler, typically the arena state.
pub struct CollisionResolver<C> {
    handlers: BTreeMap<CollisionType, Vec<Handler<C>>>,
}

impl<C> Default for CollisionResolver<C> {
    fn default() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }
}

impl<C> CollisionResolver<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `collision_type`
    pub fn register_handler<F>(&mut self, collision_type: CollisionType, handler: F)
    where
        F: FnMut(&CollisionEvent, &mut C) -> Result<(), HandlerError> + 'static,
    {
        self.handlers
            .entry(collision_type)
            .or_default()
            .push(Box::new(handler));
    }

    pub fn handler_count(&self, collision_type: CollisionType) -> usize {
        self.handlers.get(&collision_type).map_or(0, Vec::len)
    }

    /// Classify `event` and run every handler for its type
    pub fn dispatch(&mut self, event: &CollisionEvent, ctx: &mut C) -> DispatchReport {
        let mut report = DispatchReport::default();
        let Some(collision_type) = event.collision_type() else {
            report.untyped = 1;
            return report;
        };
        report.typed = 1;

        let Some(handlers) = self.handlers.get_mut(&collision_type) else {
            return report;
        };

        for (index, handler) in handlers.iter_mut().enumerate() {
            report.handlers_run += 1;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(event, ctx)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    report.handlers_failed += 1;
                    log::error!(
                        "{:?} collision handler #{} failed: {}",
                        collision_type,
                        index,
                        err
                    );
                }
                Err(payload) => {
                    report.handlers_failed += 1;
                    log::error!(
                        "{:?} collision handler #{} panicked: {}",
                        collision_type,
                        index,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
        report
    }

    /// Dispatch a batch in order
    pub fn dispatch_all(&mut self, events: &[CollisionEvent], ctx: &mut C) -> DispatchReport {
        let mut report = DispatchReport::default();
        for event in events {
            report.merge(self.dispatch(event, ctx));
        }
        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
