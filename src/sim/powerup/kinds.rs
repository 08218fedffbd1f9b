//! Built-in power-up kinds

use super::{EffectContext, PowerUpKind};
use crate::sim::vehicle::Vehicle;

pub const SPEED: &str = "speed";
pub const SHIELD: &str = "shield";
pub const REPAIR: &str = "repair";
pub const MINES: &str = "mines";

pub const SPEED_DURATION_MS: f64 = 5000.0;
pub const SHIELD_DURATION_MS: f64 = 8000.0;
/// Health restored by a repair pickup
pub const REPAIR_AMOUNT: f32 = 40.0;
/// Mines added by a resupply pickup
pub const MINE_RESUPPLY: u32 = 3;

/// Boosted engine force while active
pub fn speed() -> PowerUpKind {
    PowerUpKind {
        id: SPEED,
        color: [1.0, 0.85, 0.1],
        duration_ms: SPEED_DURATION_MS,
        apply: apply_speed,
        revert: Some(revert_speed),
    }
}

/// Blocks mine damage while active
pub fn shield() -> PowerUpKind {
    PowerUpKind {
        id: SHIELD,
        color: [0.2, 0.6, 1.0],
        duration_ms: SHIELD_DURATION_MS,
        apply: apply_shield,
        revert: Some(revert_shield),
    }
}

pub fn repair() -> PowerUpKind {
    PowerUpKind {
        id: REPAIR,
        color: [0.2, 0.9, 0.3],
        duration_ms: 0.0,
        apply: apply_repair,
        revert: None,
    }
}

pub fn mines() -> PowerUpKind {
    PowerUpKind {
        id: MINES,
        color: [0.9, 0.2, 0.2],
        duration_ms: 0.0,
        apply: apply_mines,
        revert: None,
    }
}

pub fn builtin() -> Vec<PowerUpKind> {
    vec![speed(), shield(), repair(), mines()]
}

fn apply_speed(vehicle: &mut Vehicle, _ctx: &mut EffectContext<'_>) -> bool {
    vehicle.speed_boost = true;
    true
}

fn revert_speed(vehicle: &mut Vehicle) {
    vehicle.speed_boost = false;
}

fn apply_shield(vehicle: &mut Vehicle, _ctx: &mut EffectContext<'_>) -> bool {
    vehicle.shielded = true;
    true
}

fn revert_shield(vehicle: &mut Vehicle) {
    vehicle.shielded = false;
}

fn apply_repair(vehicle: &mut Vehicle, _ctx: &mut EffectContext<'_>) -> bool {
    let max = vehicle.max_health();
    if vehicle.health >= max {
        return false;
    }
    vehicle.health = (vehicle.health + REPAIR_AMOUNT).min(max);
    true
}

/// Fails when the vehicle has no mine inventory or it is full
fn apply_mines(vehicle: &mut Vehicle, ctx: &mut EffectContext<'_>) -> bool {
    let Some(mines) = ctx.mines.as_deref_mut() else {
        return false;
    };
    mines.resupply(vehicle.id, MINE_RESUPPLY) > 0
}
