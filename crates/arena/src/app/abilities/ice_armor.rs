use std::time::Duration;

use effects::{
    ActorId, Effect, EffectContext, EffectFault, EffectKind, InstanceManager, Replacement,
    TemporalHandle, Timestamp, UpdateResult,
};

use crate::app::activation::{ActivationError, Build};
use crate::app::world::{Gear, World};

pub(crate) const ICE_ARMOR: EffectKind = EffectKind("ice_armor");

const DURATION: Duration = Duration::from_secs(8);
const PLATE: Gear = Gear {
    name: "ice_plate",
    temporary: true,
};

/// Temporary plate worn over the owner's regular loadout.
pub(crate) struct IceArmor {
    handle: TemporalHandle<ActorId>,
}

impl Effect<World> for IceArmor {
    fn kind(&self) -> EffectKind {
        ICE_ARMOR
    }

    fn update(&mut self, ctx: &mut EffectContext<'_, World>) -> Result<UpdateResult, EffectFault> {
        let owner = ctx.owner();
        let world = ctx.world();
        if world.actor(owner).is_none() {
            return Err(EffectFault::OwnerInvalid(owner));
        }
        let worn = world
            .temp_gear
            .get(self.handle.key())
            .is_some_and(|entry| entry.handle() == &self.handle);
        if worn {
            Ok(UpdateResult::Continue)
        } else {
            Ok(UpdateResult::Remove)
        }
    }

    fn on_destroy(&mut self, ctx: &mut EffectContext<'_, World>) {
        let now = ctx.now();
        let world = ctx.world_mut();
        world.temp_gear.revert(&self.handle, &mut world.equipment, now);
    }
}

pub(crate) fn activate(
    _effects: &mut InstanceManager<World>,
    world: &mut World,
    owner: ActorId,
    now: Timestamp,
) -> Result<Build, ActivationError> {
    if world.actor(owner).is_none() {
        return Err(ActivationError::UnknownActor(owner));
    }
    if world.temp_gear.is_managed(&owner) || world.equipment.loadout(owner).has_temporary() {
        return Ok(Build::Rejected("already_armored"));
    }

    let armored = world.equipment.loadout(owner).without_temporary().with(PLATE);
    let Some(entry) = world.temp_gear.create(
        owner,
        Replacement::timed(armored, DURATION),
        &mut world.equipment,
        now,
    ) else {
        return Ok(Build::Rejected("already_armored"));
    };
    Ok(Build::Spawn(Box::new(IceArmor {
        handle: entry.handle().clone(),
    })))
}
