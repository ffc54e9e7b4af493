use anyhow::{anyhow, Context};
use kingdom_sim::config::SimConfig;
use kingdom_sim::metrics::Metrics;
use kingdom_sim::sim::combat::CombatStats;
use kingdom_sim::sim::performance::PerformanceMonitor;
use kingdom_sim::sim::{
    EntityId, FormationId, FormationShape, SpawnDesc, UnitRole, ViewportFeed, World,
};
use kingdom_sim::spatial::OrthographicCamera;
use kingdom_sim::util::rect::Rect;
use kingdom_sim::util::vec2::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Length of the demo run in seconds
const DEMO_SECONDS: u32 = 40;
const MAP_HALF_EXTENT: f32 = 100.0;
const SCENERY_COUNT: usize = 400;
const SQUAD_SIZE: usize = 6;

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Kingdom Sim v{}", env!("CARGO_PKG_VERSION"));

    let config = SimConfig::load_or_default();
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    info!(
        "Configuration loaded: {}Hz, margin={}, spacing={}",
        config.tick_rate, config.visibility_margin, config.formation_spacing
    );

    let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or(42));
    let dt = config.dt();
    let tick_rate = config.tick_rate;
    let mut world = World::new(config);

    let bounds = Rect::new(
        Vec2::new(-MAP_HALF_EXTENT, -MAP_HALF_EXTENT),
        Vec2::new(MAP_HALF_EXTENT, MAP_HALF_EXTENT),
    );
    world.reset_layer("scenery", bounds);
    world.reset_layer("units", bounds);

    for i in 0..SCENERY_COUNT {
        let position = Vec2::new(
            rng.gen_range(-MAP_HALF_EXTENT..MAP_HALF_EXTENT),
            rng.gen_range(-MAP_HALF_EXTENT..MAP_HALF_EXTENT),
        );
        world
            .spawn(SpawnDesc::new(format!("tree-{}", i), position).on_layer("scenery"))
            .context("spawning scenery")?;
    }

    let blue = spawn_squad(&mut world, "blue", Vec2::new(-25.0, 0.0), CombatStats::new(30.0, 6.0, 1.5))?;
    let red = spawn_squad(&mut world, "red", Vec2::new(25.0, 0.0), CombatStats::new(24.0, 5.0, 1.5))?;
    info!("Scene ready: {} entities", world.entities().len());

    // Blue marches to the middle, then attacks; red holds until blue is close
    world.formation_move_to(blue, Vec2::new(5.0, 0.0), 3.0)?;
    world.formation_start_combat(blue, red)?;
    let mut red_engaged = false;

    let metrics = Metrics::new();
    let mut monitor = PerformanceMonitor::new(tick_rate);
    let mut camera = OrthographicCamera::new(Vec2::new(-30.0, 0.0), 12.0, 16.0 / 9.0);
    let total_ticks = DEMO_SECONDS * tick_rate;

    for tick in 0..total_ticks {
        // Pan across the battlefield
        let progress = tick as f32 / total_ticks as f32;
        camera.position = Vec2::new(-30.0 + 60.0 * progress, 0.0);

        monitor.tick_start();
        let report = world.tick(dt, ViewportFeed::Camera(&camera));
        if let Some(elapsed) = monitor.tick_end(world.entities().len()) {
            metrics.record_tick_time(elapsed);
        }
        metrics.record_tick(&report);

        if !red_engaged && world.formation(blue).is_some_and(|f| f.in_combat()) {
            world.formation_start_combat(red, blue)?;
            red_engaged = true;
        }

        if report.tick % u64::from(tick_rate) == 0 {
            metrics.observe_world(&world);
            metrics.record_performance(&monitor);
            info!(
                "t={:.1}s visible={} alive={} deaths={} | {}",
                report.time,
                world.tracker().total_visible(),
                world.entities().alive_count(),
                report.deaths,
                monitor.status_message()
            );
        }
    }

    metrics.observe_world(&world);
    metrics.record_performance(&monitor);
    for id in [blue, red] {
        if let Some(formation) = world.formation(id) {
            info!(
                "{}: {}/{} alive, tactic {}",
                id,
                formation.alive_count(world.entities()),
                formation.units().len(),
                formation.tactic()
            );
        }
    }
    info!(
        "Finished {} ticks, avg {:?} p95 {:?}",
        world.tick_count(),
        monitor.average_tick_duration(),
        monitor.p95_tick_duration()
    );
    debug!("{}", metrics.to_json());
    println!("{}", metrics.to_prometheus());

    Ok(())
}

fn spawn_squad(
    world: &mut World,
    name: &str,
    origin: Vec2,
    stats: CombatStats,
) -> anyhow::Result<FormationId> {
    let mut members: Vec<EntityId> = Vec::with_capacity(SQUAD_SIZE);
    for i in 0..SQUAD_SIZE {
        let id = world.spawn(SpawnDesc::unit(format!("{}-{}", name, i), origin, stats).on_layer("units"))?;
        members.push(id);
    }
    let followers: Vec<(EntityId, UnitRole)> = members[1..]
        .iter()
        .enumerate()
        .map(|(i, &id)| (id, if i < 2 { UnitRole::Guard } else { UnitRole::Soldier }))
        .collect();
    let formation = world.create_formation_with_roles(FormationShape::Arrow, members[0], &followers)?;
    Ok(formation)
}
