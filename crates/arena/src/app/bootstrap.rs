use std::env;
use std::path::Path;
use std::sync::Arc;

use effects::{CollisionRegistry, Vec3};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::activation::{ActivationController, EffectCatalog};
use super::config::{default_collision_registry, load_collision_registry};
use super::loop_runner::{AppError, LoopConfig};
use super::region::Region;
use super::scenario::Scenario;
use super::world::{Cell, Gear, Material, World};

pub(crate) const RUN_TICKS_ENV_VAR: &str = "ARENA_TICKS";
pub(crate) const COLLISIONS_ENV_VAR: &str = "ARENA_COLLISIONS";
pub(crate) const REALTIME_ENV_VAR: &str = "ARENA_REALTIME";

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) region: Region,
    pub(crate) controller: ActivationController,
    pub(crate) scenario: Scenario,
}

pub(crate) fn build_app() -> Result<AppWiring, AppError> {
    init_tracing();
    info!("=== Effect Arena Startup ===");

    let catalog = EffectCatalog::with_builtin();
    let collisions = resolve_collision_registry(&catalog)?;
    info!(
        effects = ?catalog.names().collect::<Vec<_>>(),
        collision_pairs = collisions.len(),
        "catalog_ready"
    );

    let defaults = LoopConfig::default();
    let config = LoopConfig {
        run_ticks: env_override(RUN_TICKS_ENV_VAR, defaults.run_ticks, |raw| raw.parse().ok()),
        pace_realtime: env_override(REALTIME_ENV_VAR, defaults.pace_realtime, parse_flag),
        ..defaults
    };

    Ok(AppWiring {
        config,
        region: demo_region(Arc::new(collisions)),
        controller: ActivationController::new(catalog),
        scenario: Scenario::demo(),
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn resolve_collision_registry(catalog: &EffectCatalog) -> Result<CollisionRegistry, AppError> {
    match env::var(COLLISIONS_ENV_VAR) {
        Ok(path) if !path.trim().is_empty() => {
            Ok(load_collision_registry(Path::new(path.trim()), catalog)?)
        }
        Ok(_) | Err(env::VarError::NotPresent) => Ok(default_collision_registry()),
        Err(err) => {
            warn!(
                env_var = COLLISIONS_ENV_VAR,
                error = %err,
                "unable to read collision config env var; using built-in pairs"
            );
            Ok(default_collision_registry())
        }
    }
}

fn env_override<T: Copy>(name: &str, fallback: T, parse: fn(&str) -> Option<T>) -> T {
    match env::var(name) {
        Ok(value) => match parse(value.trim()) {
            Some(parsed) => parsed,
            None => {
                warn!(
                    env_var = name,
                    value = value.as_str(),
                    "invalid env var value; falling back to config"
                );
                fallback
            }
        },
        Err(env::VarError::NotPresent) => fallback,
        Err(err) => {
            warn!(
                env_var = name,
                error = %err,
                "unable to read env var; falling back to config"
            );
            fallback
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Stone floor with a pool beside each actor and an ice patch on brann's side.
pub(crate) fn demo_region(collisions: Arc<CollisionRegistry>) -> Region {
    let mut world = World::default();
    world
        .terrain
        .fill(Cell::new(-10, 0, -4), Cell::new(10, 0, 4), Material::Stone);
    world
        .terrain
        .fill(Cell::new(-10, 1, -4), Cell::new(-10, 2, 4), Material::Stone);
    world
        .terrain
        .fill(Cell::new(10, 1, -4), Cell::new(10, 2, 4), Material::Stone);
    for pool in [-5, 4] {
        world.terrain.set(Cell::new(pool, 1, 0), Material::Water);
        world.terrain.set(Cell::new(pool, 1, -1), Material::Water);
    }
    world.terrain.set(Cell::new(5, 1, 2), Material::Ice);
    world.terrain.set(Cell::new(5, 1, 3), Material::Ice);

    let alba = world.spawn_actor("alba", Vec3::new(-6.5, 1.5, 0.5), Vec3::new(1.0, 0.0, 0.0));
    let brann = world.spawn_actor("brann", Vec3::new(6.5, 1.5, 0.5), Vec3::new(-1.0, 0.0, 0.0));
    world.equipment.equip(
        alba,
        Gear {
            name: "leather_cap",
            temporary: false,
        },
    );
    world.equipment.equip(
        brann,
        Gear {
            name: "iron_greaves",
            temporary: false,
        },
    );

    Region::new("proving_grounds", world, collisions)
}
