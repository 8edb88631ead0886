//! Built-in effects of the arena.

mod fire_burst;
mod frost_line;
mod ice_armor;
mod source;
mod water_shot;

pub(crate) use fire_burst::FIRE_BURST;
pub(crate) use frost_line::{FrostLine, FROST_LINE};
pub(crate) use ice_armor::ICE_ARMOR;
pub(crate) use water_shot::{WaterShot, STEAL_RANGE, WATER_SHOT};

use super::activation::EffectCatalog;

pub(crate) fn register_all(catalog: &mut EffectCatalog) {
    catalog.register(WATER_SHOT, None, water_shot::activate);
    catalog.register(ICE_ARMOR, Some(1), ice_armor::activate);
    catalog.register(FROST_LINE, Some(1), frost_line::activate);
    catalog.register(FIRE_BURST, Some(2), fire_burst::activate);
}
