//! Wreckfield - physics-and-event core for a vehicular combat arena
//!
//! Core modules:
//! - `sim`: Deterministic simulation (physics world, collisions, mines, power-ups, vehicles)
//! - `config`: Data-driven gameplay constants

pub mod config;
pub mod sim;

pub use config::{ConfigError, CoreConfig};

/// Simulation constants
pub mod consts {
    /// Fixed physics sub-step (60 Hz)
    pub const FIXED_DT: f32 = 1.0 / 60.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 5;
}

/// Seconds to milliseconds on the simulation clock
#[inline]
pub fn secs_to_ms(secs: f32) -> f64 {
    f64::from(secs) * 1000.0
}
