use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::Timestamp;
use crate::types::{ActorId, EffectKind, InstanceId, InstanceIdAllocator};

use super::collision::{CollisionEngine, CollisionPair, CollisionRegistry, CollisionReport};
use super::effect::{Effect, EffectContext, EffectFault, Pending};

pub(crate) struct Slot<W> {
    pub(crate) owner: ActorId,
    pub(crate) kind: EffectKind,
    pub(crate) effect: Box<dyn Effect<W>>,
}

/// Live instances in id order, indexed by owner.
pub(crate) struct InstanceSet<W> {
    slots: BTreeMap<InstanceId, Slot<W>>,
    by_owner: HashMap<ActorId, BTreeSet<InstanceId>>,
}

impl<W: 'static> Default for InstanceSet<W> {
    fn default() -> Self {
        Self {
            slots: BTreeMap::new(),
            by_owner: HashMap::new(),
        }
    }
}

impl<W: 'static> InstanceSet<W> {
    fn insert(&mut self, id: InstanceId, slot: Slot<W>) {
        self.by_owner.entry(slot.owner).or_default().insert(id);
        self.slots.insert(id, slot);
    }

    fn remove(&mut self, id: InstanceId) -> Option<Slot<W>> {
        let slot = self.slots.remove(&id)?;
        self.unindex(slot.owner, id);
        Some(slot)
    }

    fn unindex(&mut self, owner: ActorId, id: InstanceId) {
        if let Some(owned) = self.by_owner.get_mut(&owner) {
            owned.remove(&id);
            if owned.is_empty() {
                self.by_owner.remove(&owner);
            }
        }
    }

    fn reassign(&mut self, id: InstanceId, owner: ActorId) -> Option<ActorId> {
        let slot = self.slots.get_mut(&id)?;
        let previous = slot.owner;
        slot.owner = owner;
        self.unindex(previous, id);
        self.by_owner.entry(owner).or_default().insert(id);
        Some(previous)
    }

    pub(crate) fn get(&self, id: InstanceId) -> Option<&Slot<W>> {
        self.slots.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: InstanceId) -> Option<&mut Slot<W>> {
        self.slots.get_mut(&id)
    }

    pub(crate) fn contains(&self, id: InstanceId) -> bool {
        self.slots.contains_key(&id)
    }

    pub(crate) fn owner_of(&self, id: InstanceId) -> Option<ActorId> {
        self.slots.get(&id).map(|slot| slot.owner)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn snapshot(&self) -> Vec<(InstanceId, EffectKind)> {
        self.slots.iter().map(|(id, slot)| (*id, slot.kind)).collect()
    }

    fn owned_by(&self, owner: ActorId) -> impl Iterator<Item = InstanceId> + '_ {
        self.by_owner.get(&owner).into_iter().flatten().copied()
    }
}

/// Removes `id` from the set and runs its destroy hook. `false` when it was already gone.
pub(crate) fn destroy_instance<W: 'static>(
    instances: &mut InstanceSet<W>,
    pending: &mut Pending<W>,
    id: InstanceId,
    world: &mut W,
    now: Timestamp,
) -> bool {
    let Some(mut slot) = instances.remove(id) else {
        return false;
    };
    let mut ctx = EffectContext::new(world, now, id, slot.owner, pending);
    slot.effect.on_destroy(&mut ctx);
    debug!(instance = %id, kind = %slot.kind, owner = %slot.owner, "effect_destroyed");
    true
}

/// Applies destroy requests queued by effects, including ones raised by destroy hooks.
pub(crate) fn flush_destroy_requests<W: 'static>(
    instances: &mut InstanceSet<W>,
    pending: &mut Pending<W>,
    world: &mut W,
    now: Timestamp,
) -> usize {
    let mut destroyed = 0;
    while let Some(id) = pending.destroys.pop_front() {
        if destroy_instance(instances, pending, id, world, now) {
            destroyed += 1;
        }
    }
    destroyed
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub updated: usize,
    pub removed: usize,
    pub faulted: usize,
    pub spawned: usize,
    pub collisions: CollisionReport,
}

/// Owns every live effect instance over world `W` and drives them once per tick.
///
/// Instances added through [`InstanceManager::add`] are live immediately. Instances
/// spawned from inside a tick join at the end of that tick and are first updated on
/// the next one.
pub struct InstanceManager<W> {
    allocator: InstanceIdAllocator,
    instances: InstanceSet<W>,
    pending: Pending<W>,
    collisions: CollisionEngine,
}

impl<W: 'static> Default for InstanceManager<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: 'static> InstanceManager<W> {
    pub fn new() -> Self {
        Self::with_collision_registry(Arc::default())
    }

    pub fn with_collision_registry(registry: Arc<CollisionRegistry>) -> Self {
        Self {
            allocator: InstanceIdAllocator::default(),
            instances: InstanceSet::default(),
            pending: Pending::default(),
            collisions: CollisionEngine::new(registry),
        }
    }

    pub fn collision_registry(&self) -> &Arc<CollisionRegistry> {
        self.collisions.registry()
    }

    pub fn set_collision_registry(&mut self, registry: Arc<CollisionRegistry>) {
        info!(pairs = registry.len(), "collision_registry_replaced");
        self.collisions.set_registry(registry);
    }

    /// Replaces the registry with the current pairs plus `pairs`. Returns the new pair count.
    pub fn register_collisions(&mut self, pairs: impl IntoIterator<Item = CollisionPair>) -> usize {
        let merged = CollisionRegistry::from_pairs(
            self.collisions
                .registry()
                .pairs()
                .iter()
                .copied()
                .chain(pairs),
        );
        let count = merged.len();
        self.set_collision_registry(Arc::new(merged));
        count
    }

    pub fn add(&mut self, owner: ActorId, effect: Box<dyn Effect<W>>) -> InstanceId {
        let id = self.allocator.allocate();
        let kind = effect.kind();
        self.instances.insert(id, Slot { owner, kind, effect });
        debug!(instance = %id, kind = %kind, owner = %owner, "effect_added");
        id
    }

    /// Updates every instance live at the start of the call, then runs the collision pass.
    pub fn tick(&mut self, world: &mut W, now: Timestamp) -> TickReport {
        let mut report = TickReport::default();
        let ids: Vec<InstanceId> = self.instances.slots.keys().copied().collect();

        for id in ids {
            let Some(slot) = self.instances.get_mut(id) else {
                continue;
            };
            let kind = slot.kind;
            let mut ctx = EffectContext::new(world, now, id, slot.owner, &mut self.pending);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| slot.effect.update(&mut ctx)))
                .unwrap_or_else(|payload| {
                    Err(EffectFault::Panicked(panic_message(payload.as_ref())))
                });
            report.updated += 1;

            let remove = match outcome {
                Ok(result) => result.is_remove(),
                Err(fault) => {
                    warn!(instance = %id, kind = %kind, error = %fault, "effect_faulted");
                    report.faulted += 1;
                    true
                }
            };
            if remove && destroy_instance(&mut self.instances, &mut self.pending, id, world, now) {
                report.removed += 1;
            }
            report.removed +=
                flush_destroy_requests(&mut self.instances, &mut self.pending, world, now);
        }

        report.collisions =
            self.collisions
                .update(&mut self.instances, &mut self.pending, world, now);
        report.removed += report.collisions.removed;
        report.spawned = self.admit_pending();
        report
    }

    fn admit_pending(&mut self) -> usize {
        let spawns = std::mem::take(&mut self.pending.spawns);
        let count = spawns.len();
        for spawn in spawns {
            self.add(spawn.owner, spawn.effect);
        }
        count
    }

    pub fn destroy(&mut self, id: InstanceId, world: &mut W, now: Timestamp) -> bool {
        let destroyed = destroy_instance(&mut self.instances, &mut self.pending, id, world, now);
        flush_destroy_requests(&mut self.instances, &mut self.pending, world, now);
        destroyed
    }

    pub fn destroy_first_of_type(
        &mut self,
        owner: ActorId,
        kind: EffectKind,
        world: &mut W,
        now: Timestamp,
    ) -> bool {
        match self.first_of_type(owner, kind) {
            Some(id) => self.destroy(id, world, now),
            None => false,
        }
    }

    pub fn destroy_owned_by(&mut self, owner: ActorId, world: &mut W, now: Timestamp) -> usize {
        let owned: Vec<InstanceId> = self.instances.owned_by(owner).collect();
        let destroyed = owned
            .into_iter()
            .filter(|id| self.destroy(*id, world, now))
            .count();
        if destroyed > 0 {
            info!(owner = %owner, destroyed, "owner_effects_cleared");
        }
        destroyed
    }

    pub fn destroy_all(&mut self, world: &mut W, now: Timestamp) -> usize {
        let ids: Vec<InstanceId> = self.instances.slots.keys().copied().collect();
        let destroyed = ids
            .into_iter()
            .filter(|id| self.destroy(*id, world, now))
            .count();
        self.pending.spawns.clear();
        destroyed
    }

    /// Moves `id` to `owner`. The instance keeps its state and its place in update order.
    pub fn change_owner(&mut self, id: InstanceId, owner: ActorId) -> bool {
        let Some(previous) = self.instances.reassign(id, owner) else {
            return false;
        };
        if previous == owner {
            return true;
        }
        if let Some(slot) = self.instances.get_mut(id) {
            slot.effect.on_owner_changed(previous, owner);
        }
        debug!(instance = %id, previous = %previous, owner = %owner, "effect_owner_changed");
        true
    }

    pub fn instances_of_type(
        &self,
        owner: ActorId,
        kind: EffectKind,
    ) -> impl Iterator<Item = InstanceId> + '_ {
        self.instances
            .owned_by(owner)
            .filter(move |id| self.kind_of(*id) == Some(kind))
    }

    pub fn instances_of_kind(&self, kind: EffectKind) -> impl Iterator<Item = InstanceId> + '_ {
        self.instances
            .slots
            .iter()
            .filter(move |(_, slot)| slot.kind == kind)
            .map(|(id, _)| *id)
    }

    pub fn instances_of_owner(&self, owner: ActorId) -> impl Iterator<Item = InstanceId> + '_ {
        self.instances.owned_by(owner)
    }

    pub fn ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.instances.slots.keys().copied()
    }

    pub fn first_of_type(&self, owner: ActorId, kind: EffectKind) -> Option<InstanceId> {
        self.instances_of_type(owner, kind).next()
    }

    pub fn count_of_type(&self, owner: ActorId, kind: EffectKind) -> usize {
        self.instances_of_type(owner, kind).count()
    }

    pub fn has_instance_of_type(&self, owner: ActorId, kind: EffectKind) -> bool {
        self.first_of_type(owner, kind).is_some()
    }

    pub fn owner_of(&self, id: InstanceId) -> Option<ActorId> {
        self.instances.owner_of(id)
    }

    pub fn kind_of(&self, id: InstanceId) -> Option<EffectKind> {
        self.instances.get(id).map(|slot| slot.kind)
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.contains(id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.len() == 0
    }

    pub fn pending_spawns(&self) -> usize {
        self.pending.spawns.len()
    }
}

impl<W: 'static> InstanceManager<W> {
    pub fn effect<E: Effect<W>>(&self, id: InstanceId) -> Option<&E> {
        self.instances
            .get(id)
            .and_then(|slot| slot.effect.downcast_ref::<E>())
    }

    pub fn effect_mut<E: Effect<W>>(&mut self, id: InstanceId) -> Option<&mut E> {
        self.instances
            .get_mut(id)
            .and_then(|slot| slot.effect.downcast_mut::<E>())
    }
}
