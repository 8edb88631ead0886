use std::collections::BTreeMap;

use effects::{ActorId, Effect, EffectKind, InstanceId, InstanceManager, Timestamp};
use thiserror::Error;
use tracing::{debug, info};

use super::abilities::{self, FrostLine, WaterShot, FROST_LINE, STEAL_RANGE, WATER_SHOT};
use super::region::Region;
use super::world::World;

#[derive(Debug, Error)]
pub(crate) enum ActivationError {
    #[error("unknown effect `{0}`")]
    UnknownEffect(String),
    #[error("actor {0} is not present in the region")]
    UnknownActor(ActorId),
}

/// What a factory produced for one activation request.
pub(crate) enum Build {
    Spawn(Box<dyn Effect<World>>),
    /// An existing instance took the request over.
    Absorbed(InstanceId),
    Rejected(&'static str),
}

pub(crate) type Factory = fn(
    &mut InstanceManager<World>,
    &mut World,
    ActorId,
    Timestamp,
) -> Result<Build, ActivationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Activation {
    Created(InstanceId),
    Absorbed(InstanceId),
    Rejected(&'static str),
}

#[derive(Clone, Copy)]
pub(crate) struct CatalogEntry {
    pub(crate) kind: EffectKind,
    pub(crate) max_per_owner: Option<usize>,
    factory: Factory,
}

/// Effect factories keyed by kind name.
#[derive(Default)]
pub(crate) struct EffectCatalog {
    entries: BTreeMap<&'static str, CatalogEntry>,
}

impl EffectCatalog {
    pub(crate) fn with_builtin() -> Self {
        let mut catalog = Self::default();
        abilities::register_all(&mut catalog);
        catalog
    }

    pub(crate) fn register(
        &mut self,
        kind: EffectKind,
        max_per_owner: Option<usize>,
        factory: Factory,
    ) {
        self.entries.insert(
            kind.name(),
            CatalogEntry {
                kind,
                max_per_owner,
                factory,
            },
        );
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    pub(crate) fn kind(&self, name: &str) -> Option<EffectKind> {
        self.resolve(name).map(|entry| entry.kind)
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }
}

/// Turns actor requests into effect instances.
pub(crate) struct ActivationController {
    catalog: EffectCatalog,
}

impl ActivationController {
    pub(crate) fn new(catalog: EffectCatalog) -> Self {
        Self { catalog }
    }

    pub(crate) fn activate(
        &self,
        region: &mut Region,
        actor: ActorId,
        name: &str,
        now: Timestamp,
    ) -> Result<Activation, ActivationError> {
        let entry = self
            .catalog
            .resolve(name)
            .ok_or_else(|| ActivationError::UnknownEffect(name.to_string()))?;
        if region.world.actor(actor).is_none() {
            return Err(ActivationError::UnknownActor(actor));
        }
        if let Some(max) = entry.max_per_owner {
            if region.effects.count_of_type(actor, entry.kind) >= max {
                debug!(actor = %actor, effect = %entry.kind, max, "activation_capped");
                return Ok(Activation::Rejected("cap_reached"));
            }
        }

        match (entry.factory)(&mut region.effects, &mut region.world, actor, now)? {
            Build::Spawn(effect) => {
                let id = region.effects.add(actor, effect);
                info!(actor = %actor, effect = %entry.kind, instance = %id, "effect_activated");
                Ok(Activation::Created(id))
            }
            Build::Absorbed(id) => {
                debug!(actor = %actor, effect = %entry.kind, instance = %id, "activation_absorbed");
                Ok(Activation::Absorbed(id))
            }
            Build::Rejected(reason) => {
                debug!(actor = %actor, effect = %entry.kind, reason, "activation_rejected");
                Ok(Activation::Rejected(reason))
            }
        }
    }

    /// Commits the actor's pending selection: a water shot first, then a frost line.
    pub(crate) fn launch(&self, region: &mut Region, actor: ActorId, now: Timestamp) -> bool {
        let Region { world, effects, .. } = region;

        let shots: Vec<InstanceId> = effects.instances_of_type(actor, WATER_SHOT).collect();
        for id in shots {
            if let Some(shot) = effects.effect_mut::<WaterShot>(id) {
                if shot.launch(actor, world, now) {
                    info!(actor = %actor, instance = %id, "water_shot_launched");
                    return true;
                }
            }
        }

        let lines: Vec<InstanceId> = effects.instances_of_type(actor, FROST_LINE).collect();
        for id in lines {
            if let Some(line) = effects.effect_mut::<FrostLine>(id) {
                if line.launch(world, now) {
                    info!(actor = %actor, instance = %id, "frost_line_charging");
                    return true;
                }
            }
        }
        false
    }

    /// Takes over the nearest travelling water shot of another actor within reach.
    pub(crate) fn steal(&self, region: &mut Region, actor: ActorId) -> Option<InstanceId> {
        let position = region.world.actor(actor)?.position;
        let effects = &mut region.effects;
        let reach_sq = STEAL_RANGE * STEAL_RANGE;

        let target = effects
            .instances_of_kind(WATER_SHOT)
            .filter(|id| effects.owner_of(*id) != Some(actor))
            .filter_map(|id| {
                let location = effects.effect::<WaterShot>(id)?.location()?;
                Some((id, location.distance_sq(position)))
            })
            .filter(|(_, distance_sq)| *distance_sq <= reach_sq)
            .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
            .map(|(id, _)| id)?;

        let previous = effects.owner_of(target)?;
        if !effects.change_owner(target, actor) {
            return None;
        }
        info!(instance = %target, previous = %previous, actor = %actor, "water_shot_redirected");
        Some(target)
    }

    pub(crate) fn logout(&self, region: &mut Region, actor: ActorId, now: Timestamp) -> usize {
        region.invalidate_actor(actor, now)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use effects::{CollisionRegistry, Vec3};

    use super::*;
    use crate::app::abilities::{FIRE_BURST, ICE_ARMOR};
    use crate::app::world::{Cell, Material};

    fn region_with_pool() -> (Region, ActorId, ActorId) {
        let mut world = World::default();
        world
            .terrain
            .fill(Cell::new(-10, 0, -2), Cell::new(10, 0, 2), Material::Stone);
        world.terrain.set(Cell::new(-5, 1, 0), Material::Water);
        world.terrain.set(Cell::new(-4, 1, 0), Material::Water);
        world.terrain.set(Cell::new(5, 1, 0), Material::Water);
        let alba = world.spawn_actor("alba", Vec3::new(-6.5, 1.5, 0.5), Vec3::new(1.0, 0.0, 0.0));
        let brann = world.spawn_actor("brann", Vec3::new(6.5, 1.5, 0.5), Vec3::new(-1.0, 0.0, 0.0));
        let region = Region::new("test", world, Arc::new(CollisionRegistry::default()));
        (region, alba, brann)
    }

    fn controller() -> ActivationController {
        ActivationController::new(EffectCatalog::with_builtin())
    }

    #[test]
    fn catalog_resolves_every_builtin_kind() {
        let catalog = EffectCatalog::with_builtin();
        let names: Vec<&str> = catalog.names().collect();
        assert_eq!(names, vec!["fire_burst", "frost_line", "ice_armor", "water_shot"]);
        assert_eq!(catalog.kind("ice_armor"), Some(ICE_ARMOR));
        assert!(catalog.kind("lava_wave").is_none());
    }

    #[test]
    fn unknown_effect_and_actor_are_errors() {
        let (mut region, alba, _) = region_with_pool();
        let controller = controller();

        let unknown = controller.activate(&mut region, alba, "lava_wave", Timestamp::ZERO);
        assert!(
            matches!(unknown, Err(ActivationError::UnknownEffect(name)) if name == "lava_wave")
        );

        let ghost = controller.activate(&mut region, ActorId(404), "water_shot", Timestamp::ZERO);
        assert!(matches!(ghost, Err(ActivationError::UnknownActor(ActorId(404)))));
    }

    #[test]
    fn second_water_activation_reselects_the_pending_shot() {
        let (mut region, alba, _) = region_with_pool();
        let controller = controller();

        let first = controller
            .activate(&mut region, alba, "water_shot", Timestamp::ZERO)
            .expect("activation");
        let Activation::Created(id) = first else {
            panic!("expected a new instance, got {first:?}");
        };

        let second = controller
            .activate(&mut region, alba, "water_shot", Timestamp::ZERO)
            .expect("activation");
        assert_eq!(second, Activation::Absorbed(id));
        assert_eq!(region.effects.count_of_type(alba, WATER_SHOT), 1);
    }

    #[test]
    fn activation_without_source_is_rejected() {
        let (mut region, _, brann) = region_with_pool();
        region.world.terrain.set(Cell::new(5, 1, 0), Material::Air);

        let outcome = controller()
            .activate(&mut region, brann, "water_shot", Timestamp::ZERO)
            .expect("activation");
        assert_eq!(outcome, Activation::Rejected("no_source"));
        assert!(region.effects.is_empty());
    }

    #[test]
    fn per_owner_cap_limits_fire_bursts() {
        let (mut region, alba, brann) = region_with_pool();
        let controller = controller();

        for _ in 0..2 {
            let outcome = controller
                .activate(&mut region, alba, "fire_burst", Timestamp::ZERO)
                .expect("activation");
            assert!(matches!(outcome, Activation::Created(_)));
        }
        let capped = controller
            .activate(&mut region, alba, "fire_burst", Timestamp::ZERO)
            .expect("activation");
        assert_eq!(capped, Activation::Rejected("cap_reached"));

        let other = controller
            .activate(&mut region, brann, "fire_burst", Timestamp::ZERO)
            .expect("activation");
        assert!(matches!(other, Activation::Created(_)));
        assert_eq!(region.effects.count_of_type(alba, FIRE_BURST), 2);
    }

    #[test]
    fn launched_shot_can_be_stolen_by_a_nearby_actor() {
        let (mut region, alba, brann) = region_with_pool();
        let controller = controller();
        let Ok(Activation::Created(shot)) =
            controller.activate(&mut region, alba, "water_shot", Timestamp::ZERO)
        else {
            panic!("water shot should activate");
        };

        assert!(controller.launch(&mut region, alba, Timestamp::ZERO));
        assert!(controller.steal(&mut region, brann).is_none());

        if let Some(actor) = region.world.actor_mut(brann) {
            actor.position = Vec3::new(-4.0, 1.5, 0.5);
        }
        assert_eq!(controller.steal(&mut region, brann), Some(shot));
        assert_eq!(region.effects.owner_of(shot), Some(brann));
        assert_eq!(region.effects.count_of_type(alba, WATER_SHOT), 0);
    }

    #[test]
    fn logout_clears_everything_the_actor_owned() {
        let (mut region, alba, brann) = region_with_pool();
        let controller = controller();
        controller
            .activate(&mut region, alba, "ice_armor", Timestamp::ZERO)
            .expect("activation");
        controller
            .activate(&mut region, alba, "fire_burst", Timestamp::ZERO)
            .expect("activation");
        controller
            .activate(&mut region, brann, "fire_burst", Timestamp::ZERO)
            .expect("activation");

        assert_eq!(controller.logout(&mut region, alba, Timestamp::ZERO), 2);
        assert_eq!(region.effects.len(), 1);
        assert!(region.world.actor(alba).is_none());
        assert!(region.world.temp_gear.is_empty());
    }
}
