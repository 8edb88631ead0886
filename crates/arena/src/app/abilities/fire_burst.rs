use std::f32::consts::TAU;

use effects::{
    ActorId, Collider, Collision, Effect, EffectContext, EffectFault, EffectKind,
    InstanceManager, Sphere, Timestamp, UpdateResult, Vec3,
};
use tracing::trace;

use crate::app::activation::{ActivationError, Build};
use crate::app::world::{Cell, World};

pub(crate) const FIRE_BURST: EffectKind = EffectKind("fire_burst");

const BLAST_COUNT: usize = 8;
const BLAST_RANGE: f32 = 7.0;
const BLAST_SPEED: f32 = 1.0;
const BLAST_RADIUS: f32 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Blast {
    location: Vec3,
    direction: Vec3,
    travelled: f32,
    range: f32,
}

impl Blast {
    pub(crate) fn new(origin: Vec3, direction: Vec3, range: f32) -> Self {
        Self {
            location: origin,
            direction: direction.normalized(),
            travelled: 0.0,
            range,
        }
    }

    fn collider(&self) -> Sphere {
        Sphere::new(self.location, BLAST_RADIUS)
    }
}

/// Directions a burst fans out in.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BurstPattern {
    directions: Vec<Vec3>,
}

impl BurstPattern {
    /// `count` evenly spaced horizontal directions.
    pub(crate) fn ring(count: usize) -> Self {
        let directions = (0..count)
            .map(|index| {
                let angle = TAU * index as f32 / count as f32;
                Vec3::new(angle.cos(), 0.0, angle.sin())
            })
            .collect();
        Self { directions }
    }

    pub(crate) fn build(&self, origin: Vec3, blast: impl Fn(Vec3, Vec3) -> Blast) -> Vec<Blast> {
        self.directions
            .iter()
            .map(|direction| blast(origin, *direction))
            .collect()
    }
}

/// A ring of independent fire blasts. Each blast is its own collider and is
/// extinguished on its own; the burst ends when none are left.
pub(crate) struct FireBurst {
    blasts: Vec<Blast>,
}

impl FireBurst {
    pub(crate) fn new(blasts: Vec<Blast>) -> Self {
        Self { blasts }
    }

    pub(crate) fn blast_count(&self) -> usize {
        self.blasts.len()
    }
}

impl Effect<World> for FireBurst {
    fn kind(&self) -> EffectKind {
        FIRE_BURST
    }

    fn update(&mut self, ctx: &mut EffectContext<'_, World>) -> Result<UpdateResult, EffectFault> {
        let terrain = &ctx.world().terrain;
        self.blasts.retain_mut(|blast| {
            blast.location = blast.location + blast.direction * BLAST_SPEED;
            blast.travelled += BLAST_SPEED;
            blast.travelled <= blast.range
                && !terrain.material(Cell::containing(blast.location)).is_solid()
        });
        if self.blasts.is_empty() {
            Ok(UpdateResult::Remove)
        } else {
            Ok(UpdateResult::Continue)
        }
    }

    fn colliders(&self) -> Vec<Collider> {
        self.blasts
            .iter()
            .map(|blast| Collider::from(blast.collider()))
            .collect()
    }

    fn on_collision(&mut self, collision: &mut Collision, _ctx: &mut EffectContext<'_, World>) {
        let Collider::Sphere(hit) = collision.self_collider else {
            return;
        };
        if let Some(index) = self
            .blasts
            .iter()
            .position(|blast| blast.collider() == hit)
        {
            self.blasts.remove(index);
            trace!(
                other = %collision.other_kind,
                remaining = self.blast_count(),
                "blast_extinguished"
            );
        }
        if self.blasts.is_empty() {
            collision.remove_self = true;
        }
    }
}

pub(crate) fn activate(
    _effects: &mut InstanceManager<World>,
    world: &mut World,
    owner: ActorId,
    _now: Timestamp,
) -> Result<Build, ActivationError> {
    let origin = world
        .actor(owner)
        .map(|actor| actor.position)
        .ok_or(ActivationError::UnknownActor(owner))?;
    let blasts = BurstPattern::ring(BLAST_COUNT).build(origin, |origin, direction| {
        Blast::new(origin, direction, BLAST_RANGE)
    });
    Ok(Build::Spawn(Box::new(FireBurst::new(blasts))))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use effects::{CollisionPair, CollisionRegistry};

    use super::*;
    use crate::app::abilities::{FrostLine, FROST_LINE};
    use crate::app::world::Material;

    fn at(millis: u64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    #[test]
    fn ring_pattern_spreads_evenly() {
        let blasts = BurstPattern::ring(4).build(Vec3::ZERO, |origin, direction| {
            Blast::new(origin, direction, 3.0)
        });
        assert_eq!(blasts.len(), 4);
        assert!((blasts[0].direction.x - 1.0).abs() < 1e-5);
        assert!((blasts[1].direction.z - 1.0).abs() < 1e-5);
        assert!((blasts[2].direction.x + 1.0).abs() < 1e-5);
    }

    #[test]
    fn blasts_burn_out_at_range() {
        let mut world = World::default();
        let owner = world.spawn_actor("brann", Vec3::new(0.5, 1.5, 0.5), Vec3::new(1.0, 0.0, 0.0));
        let mut manager: InstanceManager<World> = InstanceManager::new();
        let Ok(Build::Spawn(effect)) = activate(&mut manager, &mut world, owner, at(0)) else {
            panic!("burst should spawn");
        };
        let id = manager.add(owner, effect);

        for step in 1..=7 {
            manager.tick(&mut world, at(step * 50));
        }
        assert_eq!(manager.effect::<FireBurst>(id).map(FireBurst::blast_count), Some(BLAST_COUNT));
        manager.tick(&mut world, at(400));
        assert!(!manager.contains(id));
    }

    #[test]
    fn walls_extinguish_individual_blasts() {
        let mut world = World::default();
        world.terrain.set(Cell::new(2, 1, 0), Material::Stone);
        let owner = world.spawn_actor("brann", Vec3::new(0.5, 1.5, 0.5), Vec3::new(1.0, 0.0, 0.0));
        let mut manager: InstanceManager<World> = InstanceManager::new();
        let Ok(Build::Spawn(effect)) = activate(&mut manager, &mut world, owner, at(0)) else {
            panic!("burst should spawn");
        };
        let id = manager.add(owner, effect);

        manager.tick(&mut world, at(50));
        manager.tick(&mut world, at(100));
        assert_eq!(
            manager.effect::<FireBurst>(id).map(FireBurst::blast_count),
            Some(BLAST_COUNT - 1)
        );
    }

    #[test]
    fn burst_melts_a_frost_line_and_keeps_burning() {
        let mut world = World::default();
        world.terrain.set(Cell::new(-3, 1, 0), Material::Ice);
        let alba = world.spawn_actor("alba", Vec3::new(-4.5, 1.5, 0.5), Vec3::new(1.0, 0.0, 0.0));
        let brann = world.spawn_actor("brann", Vec3::new(0.5, 1.5, 0.5), Vec3::new(-1.0, 0.0, 0.0));
        let registry = CollisionRegistry::from_pairs([CollisionPair::new(
            FROST_LINE, FIRE_BURST, true, false,
        )]);
        let mut manager: InstanceManager<World> =
            InstanceManager::with_collision_registry(Arc::new(registry));

        let line = manager.add(
            alba,
            Box::new(FrostLine::prepare(alba, Cell::new(-3, 1, 0), &mut world, at(0))),
        );
        if let Some(frost) = manager.effect_mut::<FrostLine>(line) {
            assert!(frost.launch(&mut world, at(0)));
        }
        manager.tick(&mut world, at(500));
        assert_eq!(manager.effect::<FrostLine>(line).map(FrostLine::is_crawling), Some(true));

        let Ok(Build::Spawn(effect)) = activate(&mut manager, &mut world, brann, at(500)) else {
            panic!("burst should spawn");
        };
        let burst = manager.add(brann, effect);

        let mut hits = 0;
        for step in 1..=4 {
            hits += manager.tick(&mut world, at(500 + step * 50)).collisions.hits;
        }
        assert_eq!(hits, 1);
        assert!(!manager.contains(line));
        assert_eq!(
            manager.effect::<FireBurst>(burst).map(FireBurst::blast_count),
            Some(BLAST_COUNT - 1)
        );
    }
}
