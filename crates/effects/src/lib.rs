//! Effect runtime: owned effect instances driven per tick, pairwise collisions
//! between registered kinds, time-bounded world replacements with guaranteed
//! restoration, and staged activation chains.

pub mod chain;
mod clock;
mod geometry;
pub mod runtime;
pub mod temporal;
mod types;

pub use chain::{Chain, ChainStore, Phase, PhaseContext};
pub use clock::{Clock, ManualClock, MonotonicClock, Timestamp};
pub use geometry::{Aabb, Collider, Sphere, Vec3};
pub use runtime::{
    Collision, CollisionEngine, CollisionPair, CollisionRegistry, CollisionReport, Effect,
    EffectContext, EffectFault, InstanceManager, TickReport,
};
pub use temporal::{Replacement, TemporalEntry, TemporalHandle, TemporalRegistry, TemporalResource};
pub use types::{ActorId, EffectKind, InstanceId, InstanceIdAllocator, UpdateResult};
