//! Pairwise collision detection between instances of registered kind pairs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::trace;

use crate::clock::Timestamp;
use crate::geometry::Collider;
use crate::types::{ActorId, EffectKind, InstanceId};

use super::effect::{EffectContext, Pending};
use super::manager::{destroy_instance, flush_destroy_requests, InstanceSet};

/// Declares that instances of `first` and `second` interact, and which side is
/// removed by default when they do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollisionPair {
    pub first: EffectKind,
    pub second: EffectKind,
    pub remove_first: bool,
    pub remove_second: bool,
}

impl CollisionPair {
    pub fn new(
        first: EffectKind,
        second: EffectKind,
        remove_first: bool,
        remove_second: bool,
    ) -> Self {
        Self {
            first,
            second,
            remove_first,
            remove_second,
        }
    }

    pub fn mirrored(self) -> Self {
        Self {
            first: self.second,
            second: self.first,
            remove_first: self.remove_second,
            remove_second: self.remove_first,
        }
    }

    fn is_self_pair(&self) -> bool {
        self.first == self.second
    }
}

/// Immutable set of collision pairs. A mirrored duplicate of an already registered
/// pair is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollisionRegistry {
    pairs: Vec<CollisionPair>,
}

impl CollisionRegistry {
    pub fn from_pairs(pairs: impl IntoIterator<Item = CollisionPair>) -> Self {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for pair in pairs {
            if seen.contains(&pair) || seen.contains(&pair.mirrored()) {
                continue;
            }
            seen.insert(pair);
            unique.push(pair);
        }
        Self { pairs: unique }
    }

    pub fn pairs(&self) -> &[CollisionPair] {
        &self.pairs
    }

    /// First registered pair covering `a` and `b` in either order.
    pub fn find(&self, a: EffectKind, b: EffectKind) -> Option<&CollisionPair> {
        self.pairs
            .iter()
            .find(|pair| {
                (pair.first == a && pair.second == b) || (pair.first == b && pair.second == a)
            })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// One side's view of an intersection. The mirrored view is handed to the other side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collision {
    pub self_id: InstanceId,
    pub other_id: InstanceId,
    pub self_owner: ActorId,
    pub other_owner: ActorId,
    pub self_kind: EffectKind,
    pub other_kind: EffectKind,
    pub self_collider: Collider,
    pub other_collider: Collider,
    pub remove_self: bool,
    pub remove_other: bool,
}

impl Collision {
    pub fn mirrored(&self) -> Collision {
        Collision {
            self_id: self.other_id,
            other_id: self.self_id,
            self_owner: self.other_owner,
            other_owner: self.self_owner,
            self_kind: self.other_kind,
            other_kind: self.self_kind,
            self_collider: self.other_collider,
            other_collider: self.self_collider,
            remove_self: self.remove_other,
            remove_other: self.remove_self,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionReport {
    pub pairs_tested: usize,
    pub hits: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CollisionEngine {
    registry: Arc<CollisionRegistry>,
}

impl CollisionEngine {
    pub fn new(registry: Arc<CollisionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<CollisionRegistry> {
        &self.registry
    }

    pub fn set_registry(&mut self, registry: Arc<CollisionRegistry>) {
        self.registry = registry;
    }

    pub(crate) fn update<W: 'static>(
        &self,
        instances: &mut InstanceSet<W>,
        pending: &mut Pending<W>,
        world: &mut W,
        now: Timestamp,
    ) -> CollisionReport {
        let mut report = CollisionReport::default();
        if self.registry.is_empty() || instances.len() < 2 {
            return report;
        }

        let snapshot = instances.snapshot();
        let mut colliders: HashMap<InstanceId, Vec<Collider>> = HashMap::new();

        for pair in self.registry.pairs() {
            let firsts: Vec<InstanceId> = snapshot
                .iter()
                .filter(|(_, kind)| *kind == pair.first)
                .map(|(id, _)| *id)
                .collect();
            if firsts.is_empty() {
                continue;
            }
            let seconds: Vec<InstanceId> = snapshot
                .iter()
                .filter(|(_, kind)| *kind == pair.second)
                .map(|(id, _)| *id)
                .collect();

            for (first_index, &first) in firsts.iter().enumerate() {
                for (second_index, &second) in seconds.iter().enumerate() {
                    // A self pair visits each unordered combination once.
                    if pair.is_self_pair() && second_index <= first_index {
                        continue;
                    }
                    if !instances.contains(first) {
                        break;
                    }
                    let (Some(first_owner), Some(second_owner)) =
                        (instances.owner_of(first), instances.owner_of(second))
                    else {
                        continue;
                    };
                    if first_owner == second_owner {
                        continue;
                    }

                    for id in [first, second] {
                        if !colliders.contains_key(&id) {
                            let volumes = instances
                                .get(id)
                                .map(|slot| slot.effect.colliders())
                                .unwrap_or_default();
                            colliders.insert(id, volumes);
                        }
                    }

                    report.pairs_tested += 1;
                    let (Some(first_volumes), Some(second_volumes)) =
                        (colliders.get(&first), colliders.get(&second))
                    else {
                        continue;
                    };

                    'volumes: for first_volume in first_volumes {
                        for second_volume in second_volumes {
                            if !first_volume.intersects(second_volume) {
                                continue;
                            }
                            report.hits += 1;
                            let sides = Collision {
                                self_id: first,
                                other_id: second,
                                self_owner: first_owner,
                                other_owner: second_owner,
                                self_kind: pair.first,
                                other_kind: pair.second,
                                self_collider: *first_volume,
                                other_collider: *second_volume,
                                remove_self: pair.remove_first,
                                remove_other: pair.remove_second,
                            };
                            report.removed += dispatch(instances, pending, world, now, sides);
                            if !instances.contains(first) || !instances.contains(second) {
                                break 'volumes;
                            }
                        }
                    }
                }
            }
        }

        if report.hits > 0 {
            trace!(
                pairs_tested = report.pairs_tested,
                hits = report.hits,
                removed = report.removed,
                "collision_pass"
            );
        }
        report
    }
}

/// Both sides see the event before any removal it causes.
fn dispatch<W: 'static>(
    instances: &mut InstanceSet<W>,
    pending: &mut Pending<W>,
    world: &mut W,
    now: Timestamp,
    mut collision: Collision,
) -> usize {
    let first = collision.self_id;
    let second = collision.other_id;

    if let Some(slot) = instances.get_mut(first) {
        let mut ctx = EffectContext::new(world, now, first, slot.owner, pending);
        slot.effect.on_collision(&mut collision, &mut ctx);
    }

    let mut mirrored = collision.mirrored();
    if let Some(slot) = instances.get_mut(second) {
        let mut ctx = EffectContext::new(world, now, second, slot.owner, pending);
        slot.effect.on_collision(&mut mirrored, &mut ctx);
    }

    let mut removed = 0;
    if mirrored.remove_other && destroy_instance(instances, pending, first, world, now) {
        removed += 1;
    }
    if mirrored.remove_self && destroy_instance(instances, pending, second, world, now) {
        removed += 1;
    }
    removed + flush_destroy_requests(instances, pending, world, now)
}
