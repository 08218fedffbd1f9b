//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by entity ID)
//! - No rendering or platform dependencies

pub mod body;
pub mod collision;
pub mod controller;
pub mod events;
pub mod groups;
pub mod mine;
pub mod powerup;
pub mod raycast;
pub mod state;
pub mod tick;
pub mod vehicle;
pub mod world;

pub use body::{BodyDesc, BodyHandle, BodyTag, RigidBody, Shape};
pub use collision::{
    CollisionEvent, CollisionResolver, CollisionType, DispatchReport, HandlerError, classify,
};
pub use controller::{DriveCommand, InputSnapshot, apply_drive, compute_drive};
pub use events::{DamageChannel, DamageEvent, EffectDisplay, InventoryDisplay, LogDisplay};
pub use groups::{BodyFilter, CollisionGroup, should_collide};
pub use mine::{Mine, MineId, MineInventory, MineState, MineSystem};
pub use powerup::{ActiveEffect, EffectContext, PowerUp, PowerUpId, PowerUpKind, PowerUpSystem};
pub use state::{Arena, ArenaState, ArenaStats};
pub use tick::{TickInput, TickReport, tick};
pub use vehicle::{Vehicle, VehicleId, VehicleRegistry, VehicleTuning};
pub use world::{Contact, ContactMaterial, PhysicsWorld};
