use std::any::Any;
use std::collections::VecDeque;

use thiserror::Error;

use crate::clock::Timestamp;
use crate::geometry::Collider;
use crate::types::{ActorId, EffectKind, InstanceId, UpdateResult};

use super::collision::Collision;

/// Unexpected failure inside an effect's update. The manager tears the instance down.
#[derive(Debug, Error)]
pub enum EffectFault {
    #[error("owner {0} is no longer valid")]
    OwnerInvalid(ActorId),
    #[error("missing world resource: {0}")]
    MissingResource(&'static str),
    #[error("effect state is inconsistent: {0}")]
    InvalidState(String),
    #[error("effect panicked: {0}")]
    Panicked(String),
}

pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A live, owned, kind-tagged unit of per-tick simulation over world `W`.
pub trait Effect<W>: AsAny {
    fn kind(&self) -> EffectKind;

    fn update(&mut self, ctx: &mut EffectContext<'_, W>) -> Result<UpdateResult, EffectFault>;

    /// Volumes currently occupied. Queried at most once per collision pass.
    fn colliders(&self) -> Vec<Collider> {
        Vec::new()
    }

    /// `collision` is seen from this instance's side; flag edits decide removal.
    fn on_collision(&mut self, _collision: &mut Collision, _ctx: &mut EffectContext<'_, W>) {}

    /// Runs exactly once, after the instance has left the manager.
    fn on_destroy(&mut self, _ctx: &mut EffectContext<'_, W>) {}

    fn on_owner_changed(&mut self, _previous: ActorId, _owner: ActorId) {}
}

impl<W: 'static> dyn Effect<W> {
    pub fn downcast_ref<E: Effect<W>>(&self) -> Option<&E> {
        AsAny::as_any(self).downcast_ref::<E>()
    }

    pub fn downcast_mut<E: Effect<W>>(&mut self) -> Option<&mut E> {
        AsAny::as_any_mut(self).downcast_mut::<E>()
    }
}

pub(crate) struct PendingSpawn<W> {
    pub(crate) owner: ActorId,
    pub(crate) effect: Box<dyn Effect<W>>,
}

/// Work requested by effects while the manager is mid-pass.
pub(crate) struct Pending<W> {
    pub(crate) spawns: Vec<PendingSpawn<W>>,
    pub(crate) destroys: VecDeque<InstanceId>,
}

impl<W: 'static> Default for Pending<W> {
    fn default() -> Self {
        Self {
            spawns: Vec::new(),
            destroys: VecDeque::new(),
        }
    }
}

pub struct EffectContext<'a, W> {
    world: &'a mut W,
    now: Timestamp,
    instance: InstanceId,
    owner: ActorId,
    pending: &'a mut Pending<W>,
}

impl<'a, W: 'static> EffectContext<'a, W> {
    pub(crate) fn new(
        world: &'a mut W,
        now: Timestamp,
        instance: InstanceId,
        owner: ActorId,
        pending: &'a mut Pending<W>,
    ) -> Self {
        Self {
            world,
            now,
            instance,
            owner,
            pending,
        }
    }

    pub fn world(&self) -> &W {
        &*self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut *self.world
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    pub fn owner(&self) -> ActorId {
        self.owner
    }

    /// Queues a new instance. It joins the manager at the end of the current tick.
    pub fn spawn(&mut self, owner: ActorId, effect: Box<dyn Effect<W>>) {
        self.pending.spawns.push(PendingSpawn { owner, effect });
    }

    /// Requests destruction of any instance, this one included.
    pub fn destroy(&mut self, id: InstanceId) {
        self.pending.destroys.push_back(id);
    }
}
