mod collision;
mod effect;
mod manager;

pub use collision::{Collision, CollisionEngine, CollisionPair, CollisionRegistry, CollisionReport};
pub use effect::{AsAny, Effect, EffectContext, EffectFault};
pub use manager::{InstanceManager, TickReport};
