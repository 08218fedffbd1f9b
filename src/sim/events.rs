//! Outward notifications: damage channel and inventory/effect displays
//!
//! The core never reads anything back from these.

use std::sync::mpsc::{self, Receiver, Sender};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::vehicle::VehicleId;

/// Emitted by the mine subsystem for every explosion that reaches a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageEvent {
    pub vehicle_id: VehicleId,
    pub damage: f32,
    pub origin: Vec3,
    pub impulse: Vec3,
}

/// Typed damage fan-out owned by the core
///
/// Each subscriber gets its own receiver; subscribers that hang up are
/// dropped on the next emit.
#[derive(Debug, Default)]
pub struct DamageChannel {
    subscribers: Vec<Sender<DamageEvent>>,
    emitted: u64,
}

impl DamageChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<DamageEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, event: DamageEvent) {
        self.emitted += 1;
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Total events emitted since creation
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

/// Receives mine inventory changes, one call per affected vehicle
pub trait InventoryDisplay {
    fn update_count(&mut self, vehicle: VehicleId, current: u32, max: u32);
}

/// Receives timed power-up effect start/end
pub trait EffectDisplay {
    fn add_effect(&mut self, type_id: &str, duration_ms: f64);
    fn remove_effect(&mut self, type_id: &str);
}

/// Display that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDisplay;

impl InventoryDisplay for LogDisplay {
    fn update_count(&mut self, vehicle: VehicleId, current: u32, max: u32) {
        log::debug!("Vehicle {} mines: {}/{}", vehicle.0, current, max);
    }
}

impl EffectDisplay for LogDisplay {
    fn add_effect(&mut self, type_id: &str, duration_ms: f64) {
        log::debug!("Effect {} started ({} ms)", type_id, duration_ms);
    }

    fn remove_effect(&mut self, type_id: &str) {
        log::debug!("Effect {} ended", type_id);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording displays shared by subsystem tests

    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[derive(Debug, Clone, Default)]
    pub struct RecordingInventory(pub Rc<RefCell<Vec<(VehicleId, u32, u32)>>>);

    impl InventoryDisplay for RecordingInventory {
        fn update_count(&mut self, vehicle: VehicleId, current: u32, max: u32) {
            self.0.borrow_mut().push((vehicle, current, max));
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum EffectCall {
        Add(String, f64),
        Remove(String),
    }

    #[derive(Debug, Clone, Default)]
    pub struct RecordingEffects(pub Rc<RefCell<Vec<EffectCall>>>);

    impl EffectDisplay for RecordingEffects {
        fn add_effect(&mut self, type_id: &str, duration_ms: f64) {
            self.0
                .borrow_mut()
                .push(EffectCall::Add(type_id.to_string(), duration_ms));
        }

        fn remove_effect(&mut self, type_id: &str) {
            self.0.borrow_mut().push(EffectCall::Remove(type_id.to_string()));
        }
    }
}
