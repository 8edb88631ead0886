use std::collections::{BTreeMap, HashMap};

use effects::{
    ActorId, Replacement, TemporalHandle, TemporalRegistry, TemporalResource, Timestamp,
    Vec3,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Cell {
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) z: i32,
}

impl Cell {
    pub(crate) const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub(crate) fn containing(point: Vec3) -> Self {
        let floored = point.floor();
        Self::new(floored.x as i32, floored.y as i32, floored.z as i32)
    }

    pub(crate) fn origin(self) -> Vec3 {
        Vec3::new(self.x as f32, self.y as f32, self.z as f32)
    }

    pub(crate) fn center(self) -> Vec3 {
        self.origin() + Vec3::HALF
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum Material {
    #[default]
    Air,
    Stone,
    Ice,
    Water,
    /// Partially drained water, `0..=7`.
    ShallowWater(u8),
}

impl Material {
    pub(crate) fn is_water(self) -> bool {
        matches!(self, Material::Water | Material::ShallowWater(_))
    }

    pub(crate) fn is_solid(self) -> bool {
        matches!(self, Material::Stone | Material::Ice)
    }

    pub(crate) fn is_frozen_source(self) -> bool {
        matches!(self, Material::Ice | Material::Water)
    }
}

/// Sparse voxel terrain. Cells that were never written are air.
#[derive(Debug, Default)]
pub(crate) struct Terrain {
    cells: HashMap<Cell, Material>,
}

impl Terrain {
    pub(crate) fn material(&self, cell: Cell) -> Material {
        self.cells.get(&cell).copied().unwrap_or_default()
    }

    pub(crate) fn set(&mut self, cell: Cell, material: Material) {
        if material == Material::Air {
            self.cells.remove(&cell);
        } else {
            self.cells.insert(cell, material);
        }
    }

    pub(crate) fn fill(&mut self, min: Cell, max: Cell, material: Material) {
        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    self.set(Cell::new(x, y, z), material);
                }
            }
        }
    }

    pub(crate) fn cells(&self) -> impl Iterator<Item = (Cell, Material)> + '_ {
        self.cells.iter().map(|(cell, material)| (*cell, *material))
    }
}

impl TemporalResource for Terrain {
    type Key = Cell;
    type Value = Material;

    fn read(&self, key: &Cell) -> Material {
        self.material(*key)
    }

    fn write(&mut self, key: &Cell, value: Material) {
        self.set(*key, value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Gear {
    pub(crate) name: &'static str,
    pub(crate) temporary: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Loadout {
    pub(crate) pieces: Vec<Gear>,
}

impl Loadout {
    pub(crate) fn without_temporary(&self) -> Loadout {
        Loadout {
            pieces: self
                .pieces
                .iter()
                .filter(|gear| !gear.temporary)
                .copied()
                .collect(),
        }
    }

    pub(crate) fn with(mut self, gear: Gear) -> Loadout {
        self.pieces.push(gear);
        self
    }

    pub(crate) fn has_temporary(&self) -> bool {
        self.pieces.iter().any(|gear| gear.temporary)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Equipment {
    loadouts: HashMap<ActorId, Loadout>,
}

impl Equipment {
    pub(crate) fn loadout(&self, actor: ActorId) -> Loadout {
        self.loadouts.get(&actor).cloned().unwrap_or_default()
    }

    pub(crate) fn equip(&mut self, actor: ActorId, gear: Gear) {
        self.loadouts.entry(actor).or_default().pieces.push(gear);
    }
}

impl TemporalResource for Equipment {
    type Key = ActorId;
    type Value = Loadout;

    /// Snapshots never capture temporary gear, so a restore cannot resurrect it.
    fn read(&self, key: &ActorId) -> Loadout {
        self.loadout(*key).without_temporary()
    }

    fn write(&mut self, key: &ActorId, value: Loadout) {
        if value.pieces.is_empty() {
            self.loadouts.remove(key);
        } else {
            self.loadouts.insert(*key, value);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct StandInId(pub(crate) u64);

/// Transient body standing in for an effect in the world, e.g. an ice spike.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StandInBody {
    pub(crate) owner: ActorId,
    pub(crate) position: Vec3,
    pub(crate) label: &'static str,
}

#[derive(Debug, Default)]
pub(crate) struct StandIns {
    bodies: BTreeMap<StandInId, StandInBody>,
    next_id: u64,
}

impl StandIns {
    pub(crate) fn allocate(&mut self) -> StandInId {
        let id = StandInId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    pub(crate) fn get(&self, id: StandInId) -> Option<&StandInBody> {
        self.bodies.get(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.bodies.len()
    }
}

impl TemporalResource for StandIns {
    type Key = StandInId;
    type Value = Option<StandInBody>;

    fn read(&self, key: &StandInId) -> Option<StandInBody> {
        self.bodies.get(key).cloned()
    }

    fn write(&mut self, key: &StandInId, value: Option<StandInBody>) {
        match value {
            Some(body) => {
                self.bodies.insert(*key, body);
            }
            None => {
                self.bodies.remove(key);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Actor {
    pub(crate) name: String,
    pub(crate) position: Vec3,
    pub(crate) facing: Vec3,
    pub(crate) sneaking: bool,
}

/// Shared state every effect in a region reads and temporarily rewrites.
#[derive(Default)]
pub(crate) struct World {
    pub(crate) terrain: Terrain,
    pub(crate) equipment: Equipment,
    pub(crate) stand_ins: StandIns,
    pub(crate) temp_cells: TemporalRegistry<Terrain>,
    pub(crate) temp_gear: TemporalRegistry<Equipment>,
    pub(crate) temp_bodies: TemporalRegistry<StandIns>,
    actors: BTreeMap<ActorId, Actor>,
    next_actor: u64,
}

impl World {
    pub(crate) fn spawn_actor(&mut self, name: &str, position: Vec3, facing: Vec3) -> ActorId {
        self.next_actor = self.next_actor.saturating_add(1);
        let id = ActorId(self.next_actor);
        self.actors.insert(
            id,
            Actor {
                name: name.to_string(),
                position,
                facing: facing.normalized(),
                sneaking: false,
            },
        );
        id
    }

    pub(crate) fn remove_actor(&mut self, id: ActorId) -> Option<Actor> {
        self.actors.remove(&id)
    }

    pub(crate) fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    pub(crate) fn actor_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.get_mut(&id)
    }

    pub(crate) fn actor_named(&self, name: &str) -> Option<ActorId> {
        self.actors
            .iter()
            .find(|(_, actor)| actor.name == name)
            .map(|(id, _)| *id)
    }

    pub(crate) fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// Point `range` units ahead of the actor along its facing.
    pub(crate) fn aim_point(&self, id: ActorId, range: f32) -> Option<Vec3> {
        self.actor(id)
            .map(|actor| actor.position + actor.facing * range)
    }

    /// Closest bendable cell within `range` of the actor whose material `accepts`.
    pub(crate) fn find_source(
        &self,
        id: ActorId,
        range: f32,
        accepts: fn(Material) -> bool,
    ) -> Option<Cell> {
        let position = self.actor(id)?.position;
        let range_sq = range * range;
        self.terrain
            .cells()
            .filter(|(cell, material)| accepts(*material) && self.temp_cells.is_bendable(cell))
            .map(|(cell, _)| (cell, cell.center().distance_sq(position)))
            .filter(|(_, distance_sq)| *distance_sq <= range_sq)
            .min_by(|(a_cell, a_dist), (b_cell, b_dist)| {
                a_dist.total_cmp(b_dist).then_with(|| a_cell.cmp(b_cell))
            })
            .map(|(cell, _)| cell)
    }

    /// Temporarily replaces `cell`, queueing `follow_up` to run after the revert.
    /// Returns `None` when another effect already manages the cell.
    pub(crate) fn replace_cell(
        &mut self,
        cell: Cell,
        replacement: Replacement<Material>,
        follow_up: &[Replacement<Material>],
        now: Timestamp,
    ) -> Option<TemporalHandle<Cell>> {
        let entry = self
            .temp_cells
            .create(cell, replacement, &mut self.terrain, now)?;
        for step in follow_up {
            entry.then(step.clone());
        }
        Some(entry.handle().clone())
    }

    /// Restores a bendable managed cell and drops its pending follow-ups so another
    /// effect can take it over. `false` when the cell is held by a non-bendable entry.
    pub(crate) fn reclaim_cell(&mut self, cell: Cell, now: Timestamp) -> bool {
        match self.temp_cells.get_mut(&cell) {
            None => true,
            Some(entry) if entry.is_bendable() => {
                entry.clear_follow_up();
                self.temp_cells.revert_key(&cell, &mut self.terrain, now)
            }
            Some(_) => false,
        }
    }

    pub(crate) fn revert_cell(&mut self, handle: &TemporalHandle<Cell>, now: Timestamp) -> bool {
        self.temp_cells.revert(handle, &mut self.terrain, now)
    }

    pub(crate) fn is_live_cell(&self, handle: &TemporalHandle<Cell>) -> bool {
        self.temp_cells
            .get(handle.key())
            .is_some_and(|entry| entry.handle() == handle)
    }

    /// Reverts every expired replacement across all registries.
    pub(crate) fn sweep(&mut self, now: Timestamp) -> usize {
        self.temp_cells.sweep(&mut self.terrain, now)
            + self.temp_gear.sweep(&mut self.equipment, now)
            + self.temp_bodies.sweep(&mut self.stand_ins, now)
    }

    pub(crate) fn revert_all(&mut self) -> usize {
        self.temp_cells.revert_all(&mut self.terrain)
            + self.temp_gear.revert_all(&mut self.equipment)
            + self.temp_bodies.revert_all(&mut self.stand_ins)
    }

    pub(crate) fn managed_count(&self) -> usize {
        self.temp_cells.len() + self.temp_gear.len() + self.temp_bodies.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn cell_containing_floors_negative_coordinates() {
        assert_eq!(Cell::containing(Vec3::new(-0.5, 1.2, 3.9)), Cell::new(-1, 1, 3));
        assert_eq!(Cell::new(2, 0, -1).center(), Vec3::new(2.5, 0.5, -0.5));
    }

    #[test]
    fn terrain_defaults_to_air_and_forgets_air_writes() {
        let mut terrain = Terrain::default();
        let cell = Cell::new(0, 0, 0);
        assert_eq!(terrain.material(cell), Material::Air);

        terrain.set(cell, Material::Stone);
        assert_eq!(terrain.material(cell), Material::Stone);
        terrain.set(cell, Material::Air);
        assert_eq!(terrain.cells().count(), 0);
    }

    #[test]
    fn equipment_snapshot_skips_temporary_gear() {
        let mut equipment = Equipment::default();
        let actor = ActorId(1);
        equipment.equip(actor, Gear { name: "boots", temporary: false });
        equipment.equip(actor, Gear { name: "stale_plate", temporary: true });

        let snapshot = equipment.read(&actor);
        assert_eq!(snapshot.pieces.len(), 1);
        assert!(!snapshot.has_temporary());
    }

    #[test]
    fn find_source_prefers_closest_bendable_cell() {
        let mut world = World::default();
        let actor = world.spawn_actor("alba", Vec3::new(0.5, 1.5, 0.5), Vec3::new(1.0, 0.0, 0.0));
        world.terrain.set(Cell::new(2, 1, 0), Material::Water);
        world.terrain.set(Cell::new(4, 1, 0), Material::Water);
        world.terrain.set(Cell::new(1, 1, 0), Material::Stone);

        assert_eq!(
            world.find_source(actor, 8.0, Material::is_water),
            Some(Cell::new(2, 1, 0))
        );

        world.replace_cell(
            Cell::new(2, 1, 0),
            Replacement::timed(Material::Water, Duration::from_secs(1)),
            &[],
            Timestamp::ZERO,
        );
        assert_eq!(
            world.find_source(actor, 8.0, Material::is_water),
            Some(Cell::new(4, 1, 0))
        );
        assert_eq!(world.find_source(actor, 1.0, Material::is_water), None);
    }

    #[test]
    fn reclaim_restores_bendable_cells_only() {
        let mut world = World::default();
        let soft = Cell::new(1, 1, 0);
        let hard = Cell::new(2, 1, 0);
        world.replace_cell(
            soft,
            Replacement::timed(Material::ShallowWater(7), Duration::from_millis(250)).bendable(),
            &[Replacement::timed(Material::ShallowWater(6), Duration::from_millis(250))],
            Timestamp::ZERO,
        );
        world.replace_cell(hard, Replacement::held(Material::Water), &[], Timestamp::ZERO);

        assert!(world.reclaim_cell(soft, Timestamp::ZERO));
        assert_eq!(world.terrain.material(soft), Material::Air);
        assert!(!world.temp_cells.is_managed(&soft), "follow-up must not run");

        assert!(!world.reclaim_cell(hard, Timestamp::ZERO));
        assert_eq!(world.terrain.material(hard), Material::Water);
        assert!(world.reclaim_cell(Cell::new(9, 9, 9), Timestamp::ZERO));
    }

    #[test]
    fn sweep_covers_every_registry() {
        let mut world = World::default();
        let actor = world.spawn_actor("brann", Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        let short = Duration::from_millis(100);

        world.replace_cell(
            Cell::new(0, 0, 0),
            Replacement::timed(Material::Ice, short),
            &[],
            Timestamp::ZERO,
        );
        let plate = Gear {
            name: "plate",
            temporary: true,
        };
        world.temp_gear.create(
            actor,
            Replacement::timed(Loadout::default().with(plate), short),
            &mut world.equipment,
            Timestamp::ZERO,
        );
        let body = world.stand_ins.allocate();
        world.temp_bodies.create(
            body,
            Replacement::timed(
                Some(StandInBody { owner: actor, position: Vec3::ZERO, label: "spike" }),
                short,
            ),
            &mut world.stand_ins,
            Timestamp::ZERO,
        );
        assert_eq!(world.managed_count(), 3);
        assert_eq!(world.stand_ins.len(), 1);

        assert_eq!(world.sweep(Timestamp::from_millis(100)), 3);
        assert_eq!(world.terrain.material(Cell::new(0, 0, 0)), Material::Air);
        assert!(world.equipment.loadout(actor).pieces.is_empty());
        assert_eq!(world.stand_ins.len(), 0);
    }
}
