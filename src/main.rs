//! Wreckfield headless demo
//!
//! Runs a scripted arena for a minute of simulated time and logs a summary.
//!
//! Usage: `wreckfield [seed] [config.json]`

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    use glam::Vec3;
    use wreckfield::CoreConfig;
    use wreckfield::consts::FIXED_DT;
    use wreckfield::sim::{Arena, InputSnapshot, TickInput, tick};

    env_logger::init();

    let mut args = std::env::args().skip(1);
    let seed = match args.next().map(|s| s.parse::<u64>()) {
        Some(Ok(seed)) => seed,
        Some(Err(err)) => {
            log::error!("Invalid seed: {}", err);
            std::process::exit(2);
        }
        None => 1,
    };
    let config = match args.next() {
        Some(path) => match CoreConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                log::error!("Failed to load {}: {}", path, err);
                std::process::exit(1);
            }
        },
        None => CoreConfig::default(),
    };

    log::info!("Wreckfield (headless) starting with seed {}", seed);
    let wall_distance = config.power_ups.outer_radius + 5.0;
    let mut arena = Arena::new(config, seed);
    arena.state.build_walls(wall_distance);

    let player = arena.state.spawn_vehicle("sports", Vec3::new(0.0, 0.0, -5.0), 0.0);
    let rivals = [
        arena.state.spawn_vehicle("truck", Vec3::new(8.0, 0.0, 10.0), std::f32::consts::PI),
        arena.state.spawn_vehicle("muscle", Vec3::new(-8.0, 0.0, 10.0), std::f32::consts::PI),
    ];

    let frames = 60 * 60;
    let mut deployed = 0;
    let mut respawns = 0;
    for frame in 0..frames {
        // Weave: alternate steering every two seconds
        let weave_left = (frame / 120) % 2 == 0;
        let mut input = TickInput::default().drive(
            player,
            InputSnapshot {
                forward: true,
                left: weave_left,
                right: !weave_left,
                boost: frame % 600 < 60,
                ..Default::default()
            },
        );
        for &rival in &rivals {
            input = input.drive(
                rival,
                InputSnapshot {
                    forward: true,
                    right: true,
                    ..Default::default()
                },
            );
        }
        if frame % 240 == 0 {
            input = input.deploy(player);
        }
        if frame % 600 == 300 {
            input = input.deploy(rivals[0]);
        }

        let report = tick(&mut arena, &input, FIXED_DT);
        deployed += report.mines_deployed.len();
        respawns += report.respawned.len();
        if report.dispatch.handlers_failed > 0 {
            log::warn!("Frame {}: {} handler failure(s)", frame, report.dispatch.handlers_failed);
        }
    }

    let state = &arena.state;
    let stats = state.stats;
    log::info!("Simulated {:.1} s in {} sub-steps", state.now / 1000.0, state.time_ticks);
    println!("seed:                {}", seed);
    println!("simulated time (s):  {:.1}", state.now / 1000.0);
    println!("mines deployed:      {}", deployed);
    println!("mines triggered:     {}", stats.mines_triggered);
    println!("power-ups collected: {}", stats.power_ups_collected);
    println!("power-ups on field:  {}", state.power_ups.active_count());
    println!("active effects:      {}", state.power_ups.effect_count());
    println!("wall hits:           {}", stats.environment_hits);
    println!("respawns:            {}", respawns);
    for vehicle in state.vehicles.iter() {
        let (mines, max_mines) = state
            .mines
            .inventory(vehicle.id)
            .map_or((0, 0), |inv| (inv.current(), inv.max()));
        println!(
            "vehicle {} ({}): {:.0}/{:.0} hp, {}/{} mines",
            vehicle.id.0,
            vehicle.class,
            vehicle.health,
            vehicle.max_health(),
            mines,
            max_mines
        );
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The core is a library on wasm; there is no headless entry point
}
