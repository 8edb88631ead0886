use effects::{ActorId, Phase, PhaseContext, UpdateResult};
use tracing::trace;

use crate::app::world::{Cell, Material, World};

/// Holds a selected source cell until the owner commits to it.
///
/// The selection lapses when the cell stops matching or the owner walks out of range.
pub(crate) struct SelectSource {
    owner: ActorId,
    source: Cell,
    range: f32,
    accepts: fn(Material) -> bool,
}

impl SelectSource {
    pub(crate) fn new(
        owner: ActorId,
        source: Cell,
        range: f32,
        accepts: fn(Material) -> bool,
    ) -> Self {
        Self {
            owner,
            source,
            range,
            accepts,
        }
    }

    fn is_usable(&self, cell: Cell, world: &World) -> bool {
        let in_range = world.actor(self.owner).is_some_and(|actor| {
            actor.position.distance_sq(cell.center()) <= self.range * self.range
        });
        in_range && (self.accepts)(world.terrain.material(cell))
    }
}

impl Phase<World, Cell> for SelectSource {
    fn start(&mut self, ctx: &mut PhaseContext<'_, World, Cell>) {
        let store = ctx.store_mut();
        store.clear();
        store.push(self.source);
    }

    fn update(&mut self, ctx: &mut PhaseContext<'_, World, Cell>) -> UpdateResult {
        if self.is_usable(self.source, ctx.world()) {
            UpdateResult::Continue
        } else {
            trace!(owner = %self.owner, source = ?self.source, "source_lost");
            UpdateResult::Remove
        }
    }

    fn complete(&mut self, ctx: &mut PhaseContext<'_, World, Cell>) {
        ctx.advance();
    }

    fn reselect(&mut self, target: Cell, ctx: &mut PhaseContext<'_, World, Cell>) -> bool {
        if target == self.source || !self.is_usable(target, ctx.world()) {
            return false;
        }
        if !ctx.world().temp_cells.is_bendable(&target) {
            return false;
        }
        self.source = target;
        let store = ctx.store_mut();
        store.clear();
        store.push(target);
        true
    }
}
