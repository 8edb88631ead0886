use std::sync::Arc;

use effects::{ActorId, CollisionRegistry, InstanceManager, TickReport, Timestamp};
use tracing::info;

use super::world::World;

/// A world and the effects running inside it.
pub(crate) struct Region {
    pub(crate) name: String,
    pub(crate) world: World,
    pub(crate) effects: InstanceManager<World>,
}

impl Region {
    pub(crate) fn new(name: &str, world: World, collisions: Arc<CollisionRegistry>) -> Self {
        Self {
            name: name.to_string(),
            world,
            effects: InstanceManager::with_collision_registry(collisions),
        }
    }

    pub(crate) fn tick(&mut self, now: Timestamp) -> TickReport {
        self.effects.tick(&mut self.world, now)
    }

    pub(crate) fn sweep(&mut self, now: Timestamp) -> usize {
        self.world.sweep(now)
    }

    /// Tears down everything `actor` owns and removes the actor itself.
    pub(crate) fn invalidate_actor(&mut self, actor: ActorId, now: Timestamp) -> usize {
        let destroyed = self.effects.destroy_owned_by(actor, &mut self.world, now);
        if let Some(removed) = self.world.remove_actor(actor) {
            info!(
                region = %self.name,
                actor = %actor,
                name = %removed.name,
                destroyed,
                "actor_left"
            );
        }
        destroyed
    }

    pub(crate) fn shutdown(&mut self, now: Timestamp) {
        let destroyed = self.effects.destroy_all(&mut self.world, now);
        let restored = self.world.revert_all();
        info!(
            region = %self.name,
            destroyed,
            restored,
            actors = self.world.actor_count(),
            "region_shutdown"
        );
    }
}
