//! Core configuration
//!
//! Gameplay constants for the physics step, mines, power-ups and vehicle
//! classes. Loaded from JSON; any field left out keeps its default.

use std::collections::BTreeMap;
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::sim::vehicle::VehicleTuning;

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Value out of range or inconsistent with another
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Fixed-step integrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Seconds per sub-step
    pub fixed_dt: f32,
    /// Sub-step budget per frame
    pub max_substeps: u32,
    pub gravity: Vec3,
    pub ground_height: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            fixed_dt: crate::consts::FIXED_DT,
            max_substeps: crate::consts::MAX_SUBSTEPS,
            gravity: Vec3::new(0.0, -9.82, 0.0),
            ground_height: 0.0,
        }
    }
}

/// Mine inventory, arming and explosion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MineConfig {
    pub max_mines: u32,
    pub arming_delay_ms: f64,
    pub damage: f32,
    pub blast_radius: f32,
    pub chain_reaction_radius: f32,
    /// Stagger between a mine exploding and its neighbours going off
    pub chain_reaction_delay_ms: f64,
    /// Impulse magnitude pushed onto a hit vehicle
    pub explosion_impulse: f32,
    /// Visual teardown time before a mine is finalized
    pub explosion_animation_ms: f64,
    /// Whether cascade area damage can hit the vehicle that set off the first mine
    pub area_damage_hits_trigger_vehicle: bool,
    pub body_radius: f32,
    pub body_mass: f32,
}

impl Default for MineConfig {
    fn default() -> Self {
        Self {
            max_mines: 5,
            arming_delay_ms: 2000.0,
            damage: 35.0,
            blast_radius: 5.0,
            chain_reaction_radius: 3.0,
            chain_reaction_delay_ms: 150.0,
            explosion_impulse: 900.0,
            explosion_animation_ms: 600.0,
            area_damage_hits_trigger_vehicle: false,
            body_radius: 0.4,
            body_mass: 2.0,
        }
    }
}

/// Power-up spawning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerUpConfig {
    pub spawn_interval_ms: f64,
    pub max_active: usize,
    pub arena_center: Vec3,
    pub inner_radius: f32,
    pub outer_radius: f32,
    pub min_separation: f32,
    pub spawn_attempts: u32,
    /// Trigger sphere radius
    pub pickup_radius: f32,
    pub spawn_height: f32,
}

impl Default for PowerUpConfig {
    fn default() -> Self {
        Self {
            spawn_interval_ms: 4000.0,
            max_active: 6,
            arena_center: Vec3::ZERO,
            inner_radius: 10.0,
            outer_radius: 60.0,
            min_separation: 8.0,
            spawn_attempts: 5,
            pickup_radius: 1.2,
            spawn_height: 1.0,
        }
    }
}

/// Complete core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub physics: PhysicsConfig,
    pub mines: MineConfig,
    pub power_ups: PowerUpConfig,
    /// Vehicle classes by name
    pub vehicle_classes: BTreeMap<String, VehicleTuning>,
    /// Used when a requested class is unknown
    pub default_class: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let mut vehicle_classes = BTreeMap::new();
        vehicle_classes.insert("sports".to_string(), VehicleTuning::sports());
        vehicle_classes.insert("muscle".to_string(), VehicleTuning::muscle());
        vehicle_classes.insert("truck".to_string(), VehicleTuning::truck());
        Self {
            physics: PhysicsConfig::default(),
            mines: MineConfig::default(),
            power_ups: PowerUpConfig::default(),
            vehicle_classes,
            default_class: "sports".to_string(),
        }
    }
}

impl CoreConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: CoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&contents)?;
        log::info!("Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.physics.fixed_dt <= 0.0 {
            return invalid("physics.fixed_dt must be positive");
        }
        if self.physics.max_substeps == 0 {
            return invalid("physics.max_substeps must be at least 1");
        }
        if self.mines.arming_delay_ms < 0.0 || self.mines.chain_reaction_delay_ms < 0.0 {
            return invalid("mine delays must not be negative");
        }
        if self.mines.chain_reaction_radius < 0.0 || self.mines.blast_radius < 0.0 {
            return invalid("mine radii must not be negative");
        }
        if self.power_ups.inner_radius < 0.0
            || self.power_ups.inner_radius >= self.power_ups.outer_radius
        {
            return invalid("power_ups.inner_radius must be in [0, outer_radius)");
        }
        if self.power_ups.spawn_attempts == 0 {
            return invalid("power_ups.spawn_attempts must be at least 1");
        }
        if !self.vehicle_classes.contains_key(&self.default_class) {
            return Err(ConfigError::Invalid(format!(
                "default_class '{}' is not a known vehicle class",
                self.default_class
            )));
        }
        Ok(())
    }

    /// Tuning for a class name, falling back to the default class
    pub fn tuning_for(&self, class: &str) -> VehicleTuning {
        if let Some(tuning) = self.vehicle_classes.get(class) {
            return *tuning;
        }
        log::warn!(
            "Unknown vehicle class '{}', using '{}'",
            class,
            self.default_class
        );
        self.vehicle_classes
            .get(&self.default_class)
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        CoreConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            CoreConfig::from_json_str(r#"{ "mines": { "max_mines": 9 } }"#).unwrap();
        assert_eq!(config.mines.max_mines, 9);
        assert_eq!(config.mines.arming_delay_ms, 2000.0);
        assert_eq!(config.vehicle_classes.len(), 3);
    }

    #[test]
    fn test_bad_annulus_rejected() {
        let err = CoreConfig::from_json_str(
            r#"{ "power_ups": { "inner_radius": 50.0, "outer_radius": 10.0 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = CoreConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_round_trips_through_json() {
        let json = CoreConfig::default().to_json_pretty().unwrap();
        let back = CoreConfig::from_json_str(&json).unwrap();
        assert_eq!(back.default_class, "sports");
        assert_eq!(back.tuning_for("truck"), VehicleTuning::truck());
    }

    #[test]
    fn test_unknown_class_falls_back() {
        let config = CoreConfig::default();
        assert_eq!(config.tuning_for("hovercraft"), VehicleTuning::sports());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = CoreConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
