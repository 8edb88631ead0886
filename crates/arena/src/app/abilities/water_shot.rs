use std::time::Duration;

use effects::{
    ActorId, Chain, Collider, Effect, EffectContext, EffectFault, EffectKind, InstanceManager,
    Replacement, Sphere, TemporalHandle, Timestamp, UpdateResult, Vec3,
};
use tracing::trace;

use super::source::SelectSource;
use crate::app::activation::{ActivationError, Build};
use crate::app::world::{Cell, Material, World};

pub(crate) const WATER_SHOT: EffectKind = EffectKind("water_shot");

const SELECT_RANGE: f32 = 8.0;
const MAX_RANGE: f32 = 24.0;
const SPEED: f32 = 1.0;
const RADIUS: f32 = 0.6;
const SOURCE_REFILL: Duration = Duration::from_secs(6);
const TRAIL_STEP: Duration = Duration::from_millis(250);
pub(crate) const STEAL_RANGE: f32 = 3.0;

enum Stage {
    Selecting(Chain<World, Cell>),
    Travelling(Flight),
}

struct Flight {
    location: Vec3,
    direction: Vec3,
    travelled: f32,
    head: Option<TemporalHandle<Cell>>,
}

/// A ball of water pulled from a source cell and thrown along the owner's aim.
///
/// While travelling the head cell is held as water; every cell it leaves decays
/// through two shallow levels before the terrain is restored.
pub(crate) struct WaterShot {
    stage: Stage,
    trail: Vec<TemporalHandle<Cell>>,
    retarget: bool,
}

impl WaterShot {
    pub(crate) fn select(owner: ActorId, source: Cell, world: &mut World, now: Timestamp) -> Self {
        let mut chain = Chain::new().with_phase(SelectSource::new(
            owner,
            source,
            SELECT_RANGE,
            Material::is_water,
        ));
        chain.start(world, now);
        Self {
            stage: Stage::Selecting(chain),
            trail: Vec::new(),
            retarget: false,
        }
    }

    pub(crate) fn is_selecting(&self) -> bool {
        matches!(self.stage, Stage::Selecting(_))
    }

    pub(crate) fn source(&self) -> Option<Cell> {
        match &self.stage {
            Stage::Selecting(chain) => chain.store().first().copied(),
            Stage::Travelling(_) => None,
        }
    }

    pub(crate) fn location(&self) -> Option<Vec3> {
        match &self.stage {
            Stage::Selecting(_) => None,
            Stage::Travelling(flight) => Some(flight.location),
        }
    }

    pub(crate) fn trail_len(&self) -> usize {
        self.trail.len()
    }

    pub(crate) fn reselect(&mut self, source: Cell, world: &mut World, now: Timestamp) -> bool {
        match &mut self.stage {
            Stage::Selecting(chain) => chain.reselect(source, world, now),
            Stage::Travelling(_) => false,
        }
    }

    /// Commits the selected source and sends the shot toward `owner`'s aim.
    pub(crate) fn launch(&mut self, owner: ActorId, world: &mut World, now: Timestamp) -> bool {
        let Stage::Selecting(chain) = &mut self.stage else {
            return false;
        };
        let Some(source) = chain.store().first().copied() else {
            return false;
        };
        if !world.temp_cells.is_bendable(&source) {
            return false;
        }
        let Some(target) = world.aim_point(owner, MAX_RANGE) else {
            return false;
        };
        if !chain.complete_current(world, now) || !chain.is_finished() {
            return false;
        }

        world.reclaim_cell(source, now);
        world.replace_cell(
            source,
            Replacement::timed(Material::Air, SOURCE_REFILL).bendable(),
            &[],
            now,
        );
        let origin = source.center();
        self.stage = Stage::Travelling(Flight {
            location: origin,
            direction: (target - origin).normalized(),
            travelled: 0.0,
            head: None,
        });
        true
    }
}

impl Effect<World> for WaterShot {
    fn kind(&self) -> EffectKind {
        WATER_SHOT
    }

    fn update(&mut self, ctx: &mut EffectContext<'_, World>) -> Result<UpdateResult, EffectFault> {
        let owner = ctx.owner();
        let now = ctx.now();
        let world = ctx.world_mut();

        let flight = match &mut self.stage {
            Stage::Selecting(chain) => return Ok(chain.update(world, now)),
            Stage::Travelling(flight) => flight,
        };

        let sneaking = world
            .actor(owner)
            .map(|actor| actor.sneaking)
            .ok_or(EffectFault::OwnerInvalid(owner))?;
        if sneaking || self.retarget {
            if let Some(target) = world.aim_point(owner, MAX_RANGE) {
                flight.direction = (target - flight.location).normalized();
            }
            if self.retarget {
                flight.travelled = 0.0;
                self.retarget = false;
            }
        }
        if flight.direction == Vec3::ZERO {
            return Ok(UpdateResult::Remove);
        }

        flight.location = flight.location + flight.direction * SPEED;
        flight.travelled += SPEED;
        if flight.travelled > MAX_RANGE {
            return Ok(UpdateResult::Remove);
        }
        let cell = Cell::containing(flight.location);
        if world.terrain.material(cell).is_solid() {
            return Ok(UpdateResult::Remove);
        }

        let previous = flight.head.take();
        if let Some(head) = previous {
            if *head.key() == cell {
                flight.head = Some(head);
                return Ok(UpdateResult::Continue);
            }
            let left = *head.key();
            world.revert_cell(&head, now);
            let trail = world.replace_cell(
                left,
                Replacement::timed(Material::ShallowWater(7), TRAIL_STEP).bendable(),
                &[Replacement::timed(Material::ShallowWater(6), TRAIL_STEP).bendable()],
                now,
            );
            self.trail.extend(trail);
        }
        flight.head = world.replace_cell(cell, Replacement::held(Material::Water), &[], now);
        self.trail.retain(|handle| world.is_live_cell(handle));
        Ok(UpdateResult::Continue)
    }

    fn colliders(&self) -> Vec<Collider> {
        match &self.stage {
            Stage::Selecting(_) => Vec::new(),
            Stage::Travelling(flight) => vec![Sphere::new(flight.location, RADIUS).into()],
        }
    }

    fn on_owner_changed(&mut self, previous: ActorId, owner: ActorId) {
        trace!(previous = %previous, owner = %owner, "water_shot_retargeted");
        self.retarget = true;
    }

    fn on_destroy(&mut self, ctx: &mut EffectContext<'_, World>) {
        trace!(instance = %ctx.instance_id(), trail = self.trail_len(), "water_shot_collapsed");
        let now = ctx.now();
        let world = ctx.world_mut();
        if let Stage::Travelling(flight) = &mut self.stage {
            if let Some(head) = flight.head.take() {
                world.revert_cell(&head, now);
            }
        }
        for handle in self.trail.drain(..) {
            if let Some(entry) = world.temp_cells.get_mut(handle.key()) {
                if entry.handle() == &handle {
                    entry.clear_follow_up();
                }
            }
            world.revert_cell(&handle, now);
        }
    }
}

pub(crate) fn activate(
    effects: &mut InstanceManager<World>,
    world: &mut World,
    owner: ActorId,
    now: Timestamp,
) -> Result<Build, ActivationError> {
    if world.actor(owner).is_none() {
        return Err(ActivationError::UnknownActor(owner));
    }
    let Some(source) = world.find_source(owner, SELECT_RANGE, Material::is_water) else {
        return Ok(Build::Rejected("no_source"));
    };

    let selecting = effects
        .instances_of_type(owner, WATER_SHOT)
        .find(|id| effects.effect::<WaterShot>(*id).is_some_and(WaterShot::is_selecting));
    if let Some(id) = selecting {
        if let Some(shot) = effects.effect_mut::<WaterShot>(id) {
            trace!(instance = %id, from = ?shot.source(), to = ?source, "water_shot_reselect");
            shot.reselect(source, world, now);
        }
        return Ok(Build::Absorbed(id));
    }

    Ok(Build::Spawn(Box::new(WaterShot::select(owner, source, world, now))))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use effects::{CollisionPair, CollisionRegistry};

    use super::*;

    const T0: Timestamp = Timestamp::ZERO;

    fn arena() -> (World, ActorId) {
        let mut world = World::default();
        world
            .terrain
            .fill(Cell::new(-10, 0, -2), Cell::new(10, 0, 2), Material::Stone);
        world.terrain.set(Cell::new(-5, 1, 0), Material::Water);
        let owner = world.spawn_actor("alba", Vec3::new(-6.5, 1.5, 0.5), Vec3::new(1.0, 0.0, 0.0));
        (world, owner)
    }

    fn at(millis: u64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    #[test]
    fn launched_shot_leaves_a_decaying_trail() {
        let (mut world, owner) = arena();
        let mut manager: InstanceManager<World> = InstanceManager::new();
        let Ok(Build::Spawn(effect)) = activate(&mut manager, &mut world, owner, T0) else {
            panic!("water shot should spawn");
        };
        let id = manager.add(owner, effect);
        let shot = manager.effect_mut::<WaterShot>(id).expect("water shot");
        assert_eq!(shot.source(), Some(Cell::new(-5, 1, 0)));
        assert!(shot.launch(owner, &mut world, T0));
        assert_eq!(world.terrain.material(Cell::new(-5, 1, 0)), Material::Air);

        manager.tick(&mut world, at(50));
        assert_eq!(world.terrain.material(Cell::new(-4, 1, 0)), Material::Water);

        manager.tick(&mut world, at(100));
        assert_eq!(world.terrain.material(Cell::new(-4, 1, 0)), Material::ShallowWater(7));
        assert_eq!(world.terrain.material(Cell::new(-3, 1, 0)), Material::Water);

        world.sweep(at(350));
        assert_eq!(world.terrain.material(Cell::new(-4, 1, 0)), Material::ShallowWater(6));
        world.sweep(at(600));
        assert_eq!(world.terrain.material(Cell::new(-4, 1, 0)), Material::Air);
    }

    #[test]
    fn trail_cells_can_feed_a_second_shot() {
        let (mut world, owner) = arena();
        let mut manager: InstanceManager<World> = InstanceManager::new();
        let first = manager.add(
            owner,
            Box::new(WaterShot::select(owner, Cell::new(-5, 1, 0), &mut world, T0)),
        );
        if let Some(shot) = manager.effect_mut::<WaterShot>(first) {
            assert!(shot.launch(owner, &mut world, T0));
        }
        assert!(world.temp_cells.is_bendable(&Cell::new(-5, 1, 0)));

        manager.tick(&mut world, at(50));
        manager.tick(&mut world, at(100));
        let trail = Cell::new(-4, 1, 0);
        assert_eq!(world.terrain.material(trail), Material::ShallowWater(7));
        assert!(world.temp_cells.is_bendable(&trail));
        assert!(!world.temp_cells.is_bendable(&Cell::new(-3, 1, 0)), "head is held");

        let Ok(Build::Spawn(effect)) = activate(&mut manager, &mut world, owner, at(100)) else {
            panic!("a decaying trail cell is a valid source");
        };
        let second = manager.add(owner, effect);
        let shot = manager.effect_mut::<WaterShot>(second).expect("second shot");
        assert_eq!(shot.source(), Some(trail));
        assert!(shot.launch(owner, &mut world, at(100)));

        assert_eq!(world.terrain.material(trail), Material::Air);
        let drained = world.temp_cells.get(&trail).expect("drained source");
        assert!(drained.is_bendable());
        assert_eq!(drained.follow_up_len(), 0);

        manager.destroy(first, &mut world, at(150));
        manager.destroy(second, &mut world, at(150));
        world.revert_all();
        assert_eq!(world.terrain.material(trail), Material::Air);
        assert_eq!(world.terrain.material(Cell::new(-5, 1, 0)), Material::Water);
    }

    #[test]
    fn destroying_a_shot_restores_its_cells() {
        let (mut world, owner) = arena();
        let mut manager: InstanceManager<World> = InstanceManager::new();
        let id = manager.add(
            owner,
            Box::new(WaterShot::select(owner, Cell::new(-5, 1, 0), &mut world, T0)),
        );
        if let Some(shot) = manager.effect_mut::<WaterShot>(id) {
            assert!(shot.launch(owner, &mut world, T0));
        }
        for step in 1..=3 {
            manager.tick(&mut world, at(step * 50));
        }
        assert_eq!(manager.effect::<WaterShot>(id).map(WaterShot::trail_len), Some(2));

        assert!(manager.destroy(id, &mut world, at(200)));
        for x in -4..=-1 {
            assert_eq!(world.terrain.material(Cell::new(x, 1, 0)), Material::Air);
        }
        assert_eq!(world.temp_cells.len(), 1, "only the drained source stays managed");
    }

    #[test]
    fn shot_stops_at_solid_terrain() {
        let (mut world, owner) = arena();
        world.terrain.set(Cell::new(-2, 1, 0), Material::Stone);
        let mut manager: InstanceManager<World> = InstanceManager::new();
        let id = manager.add(
            owner,
            Box::new(WaterShot::select(owner, Cell::new(-5, 1, 0), &mut world, T0)),
        );
        if let Some(shot) = manager.effect_mut::<WaterShot>(id) {
            shot.launch(owner, &mut world, T0);
        }

        for step in 1..=3 {
            manager.tick(&mut world, at(step * 50));
        }
        assert!(!manager.contains(id));
        assert_eq!(world.terrain.material(Cell::new(-3, 1, 0)), Material::Air);
        assert_eq!(world.terrain.material(Cell::new(-2, 1, 0)), Material::Stone);
        assert_eq!(world.temp_cells.len(), 1);
    }

    #[test]
    fn missing_owner_faults_the_shot() {
        let (mut world, owner) = arena();
        let mut manager: InstanceManager<World> = InstanceManager::new();
        let id = manager.add(
            owner,
            Box::new(WaterShot::select(owner, Cell::new(-5, 1, 0), &mut world, T0)),
        );
        if let Some(shot) = manager.effect_mut::<WaterShot>(id) {
            shot.launch(owner, &mut world, T0);
        }
        world.remove_actor(owner);

        let report = manager.tick(&mut world, at(50));
        assert_eq!(report.faulted, 1);
        assert!(manager.is_empty());
    }

    #[test]
    fn opposing_shots_cancel_each_other() {
        let (mut world, alba) = arena();
        world.terrain.set(Cell::new(4, 1, 0), Material::Water);
        let brann = world.spawn_actor("brann", Vec3::new(5.5, 1.5, 0.5), Vec3::new(-1.0, 0.0, 0.0));
        let registry = CollisionRegistry::from_pairs([CollisionPair::new(
            WATER_SHOT, WATER_SHOT, true, true,
        )]);
        let mut manager: InstanceManager<World> =
            InstanceManager::with_collision_registry(Arc::new(registry));

        let left = manager.add(
            alba,
            Box::new(WaterShot::select(alba, Cell::new(-5, 1, 0), &mut world, T0)),
        );
        let right = manager.add(
            brann,
            Box::new(WaterShot::select(brann, Cell::new(4, 1, 0), &mut world, T0)),
        );
        for (id, owner) in [(left, alba), (right, brann)] {
            if let Some(shot) = manager.effect_mut::<WaterShot>(id) {
                assert!(shot.launch(owner, &mut world, T0));
            }
        }

        let mut hits = 0;
        for step in 1..=8 {
            hits += manager.tick(&mut world, at(step * 50)).collisions.hits;
        }
        assert_eq!(hits, 1);
        assert!(manager.is_empty());
    }
}
