//! Per-frame simulation tick
//!
//! Order matters: drive forces are written before the physics step, and all
//! gameplay reactions run on the step's fresh begin-contacts afterwards.

use std::collections::BTreeMap;

use super::collision::{CollisionEvent, DispatchReport};
use super::controller::{InputSnapshot, apply_drive};
use super::mine::MineId;
use super::state::Arena;
use super::vehicle::VehicleId;

/// Input for one frame
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Per-vehicle controls; vehicles without an entry coast
    pub drive: BTreeMap<VehicleId, InputSnapshot>,
    /// Vehicles asking to drop a mine this frame
    pub deploy_mine: Vec<VehicleId>,
}

impl TickInput {
    pub fn drive(mut self, vehicle: VehicleId, input: InputSnapshot) -> Self {
        self.drive.insert(vehicle, input);
        self
    }

    pub fn deploy(mut self, vehicle: VehicleId) -> Self {
        self.deploy_mine.push(vehicle);
        self
    }
}

/// What happened during one tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub substeps: u32,
    /// Simulation clock after the tick (ms)
    pub now: f64,
    pub begin_contacts: usize,
    pub dispatch: DispatchReport,
    pub mines_deployed: Vec<MineId>,
    pub damage_events: usize,
    pub respawned: Vec<VehicleId>,
}

/// Advance the arena by one frame of `frame_dt` seconds
pub fn tick(arena: &mut Arena, input: &TickInput, frame_dt: f32) -> TickReport {
    let mut report = TickReport::default();
    let fixed_dt = arena.state.config.physics.fixed_dt;
    let max_substeps = arena.state.config.physics.max_substeps;

    // Forces before the step
    {
        let state = &mut arena.state;
        for vehicle in state.vehicles.iter() {
            let controls = input.drive.get(&vehicle.id).copied().unwrap_or_default();
            apply_drive(&mut state.world, vehicle, &controls);
        }
    }

    report.substeps = arena.state.world.step(fixed_dt, frame_dt, max_substeps);
    arena.state.time_ticks += u64::from(report.substeps);
    arena.state.now += f64::from(report.substeps) * crate::secs_to_ms(fixed_dt);
    report.now = arena.state.now;

    // Reactions after the step
    let events: Vec<CollisionEvent> = {
        let world = &mut arena.state.world;
        let contacts = world.drain_begin_contacts();
        contacts
            .iter()
            .filter_map(|c| CollisionEvent::from_contact(world, c))
            .collect()
    };
    report.begin_contacts = events.len();
    report.dispatch = arena.resolver.dispatch_all(&events, &mut arena.state);

    let state = &mut arena.state;
    for &vehicle in &input.deploy_mine {
        if let Some(mine) = state.deploy_mine(vehicle) {
            report.mines_deployed.push(mine);
        }
    }

    let positions = state.vehicles.positions(&state.world);
    state.mines.update(&mut state.world, &positions, state.now);
    state
        .power_ups
        .update(&mut state.world, &mut state.vehicles, state.now);

    report.damage_events = state.apply_pending_damage();

    let destroyed: Vec<VehicleId> = state
        .vehicles
        .iter()
        .filter(|v| v.is_destroyed())
        .map(|v| v.id)
        .collect();
    for id in destroyed {
        if state.respawn_vehicle(id) {
            report.respawned.push(id);
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::config::CoreConfig;
    use crate::consts::FIXED_DT;

    fn quiet_arena() -> Arena {
        let mut config = CoreConfig::default();
        config.power_ups.max_active = 0;
        Arena::new(config, 5)
    }

    #[test]
    fn test_clock_advances_by_whole_substeps() {
        let mut arena = quiet_arena();
        let report = tick(&mut arena, &TickInput::default(), FIXED_DT * 0.5);
        assert_eq!(report.substeps, 0);
        assert_eq!(report.now, 0.0);

        let report = tick(&mut arena, &TickInput::default(), FIXED_DT * 0.6);
        assert_eq!(report.substeps, 1);
        assert!((report.now - crate::secs_to_ms(FIXED_DT)).abs() < 1e-6);
        assert_eq!(arena.state.time_ticks, 1);
    }

    #[test]
    fn test_deploy_request_drops_mine() {
        let mut arena = quiet_arena();
        let v = arena.state.spawn_vehicle("sports", Vec3::ZERO, 0.0);
        let report = tick(&mut arena, &TickInput::default().deploy(v), FIXED_DT);
        assert_eq!(report.mines_deployed.len(), 1);
        assert_eq!(arena.state.mines.live_count(), 1);
    }

    #[test]
    fn test_throttle_moves_vehicle() {
        let mut arena = quiet_arena();
        let v = arena.state.spawn_vehicle("sports", Vec3::ZERO, 0.0);
        let input = TickInput::default().drive(
            v,
            InputSnapshot {
                forward: true,
                ..Default::default()
            },
        );
        for _ in 0..90 {
            tick(&mut arena, &input, FIXED_DT);
        }
        let vehicle = arena.state.vehicles.get(v).unwrap();
        let body = arena.state.world.body(vehicle.body).unwrap();
        assert!(body.position.z > 0.5);
    }

    #[test]
    fn test_destroyed_vehicle_is_respawned() {
        let mut arena = quiet_arena();
        let v = arena.state.spawn_vehicle("sports", Vec3::new(3.0, 0.0, 3.0), 0.0);
        arena.state.vehicles.get_mut(v).unwrap().health = 0.0;
        let report = tick(&mut arena, &TickInput::default(), FIXED_DT);
        assert_eq!(report.respawned, vec![v]);
        let vehicle = arena.state.vehicles.get(v).unwrap();
        assert_eq!(vehicle.health, vehicle.max_health());
        assert_eq!(arena.state.stats.respawns, 1);
    }
}
