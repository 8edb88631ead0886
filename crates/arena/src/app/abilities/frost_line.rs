use std::time::Duration;

use effects::{
    Aabb, ActorId, Chain, Collider, Effect, EffectContext, EffectFault, EffectKind,
    InstanceManager, Phase, PhaseContext, Replacement, Timestamp, UpdateResult, Vec3,
};
use tracing::trace;

use super::source::SelectSource;
use crate::app::activation::{ActivationError, Build};
use crate::app::world::{Cell, Material, StandInBody, World};

pub(crate) const FROST_LINE: EffectKind = EffectKind("frost_line");

const SELECT_RANGE: f32 = 6.0;
const CHARGE: Duration = Duration::from_millis(500);
const CRAWL_RANGE: f32 = 16.0;
const SPEED: f32 = 1.0;
const SPIKE_DURATION: Duration = Duration::from_millis(1400);
const ICE_DURATION: Duration = Duration::from_secs(8);

/// Waits until the line has gathered enough cold to move.
struct Charge {
    duration: Duration,
    started_at: Timestamp,
}

impl Phase<World, Cell> for Charge {
    fn start(&mut self, ctx: &mut PhaseContext<'_, World, Cell>) {
        self.started_at = ctx.now();
    }

    fn update(&mut self, ctx: &mut PhaseContext<'_, World, Cell>) -> UpdateResult {
        if ctx.now().saturating_duration_since(self.started_at) >= self.duration {
            ctx.advance();
        }
        UpdateResult::Continue
    }

    fn complete(&mut self, _ctx: &mut PhaseContext<'_, World, Cell>) {}
}

enum Stage {
    Preparing(Chain<World, Cell>),
    Crawling(Crawl),
}

struct Crawl {
    location: Vec3,
    direction: Vec3,
    travelled: f32,
}

/// A line of ice spikes crawling along the ground from an ice or water source.
///
/// Water the line passes over freezes for a while and can then feed other effects.
pub(crate) struct FrostLine {
    stage: Stage,
    spikes_raised: usize,
    cells_frozen: usize,
}

impl FrostLine {
    pub(crate) fn prepare(owner: ActorId, source: Cell, world: &mut World, now: Timestamp) -> Self {
        let mut chain = Chain::new()
            .with_phase(SelectSource::new(
                owner,
                source,
                SELECT_RANGE,
                Material::is_frozen_source,
            ))
            .with_phase(Charge {
                duration: CHARGE,
                started_at: now,
            });
        chain.start(world, now);
        Self {
            stage: Stage::Preparing(chain),
            spikes_raised: 0,
            cells_frozen: 0,
        }
    }

    /// Commits the source. The line starts crawling once charged.
    pub(crate) fn launch(&mut self, world: &mut World, now: Timestamp) -> bool {
        match &mut self.stage {
            Stage::Preparing(chain) if chain.current_index() == Some(0) => {
                chain.complete_current(world, now)
            }
            _ => false,
        }
    }

    pub(crate) fn is_crawling(&self) -> bool {
        matches!(self.stage, Stage::Crawling(_))
    }

    pub(crate) fn spikes_raised(&self) -> usize {
        self.spikes_raised
    }

    pub(crate) fn cells_frozen(&self) -> usize {
        self.cells_frozen
    }

    fn begin_crawl(chain: &Chain<World, Cell>, owner: ActorId, world: &World) -> Option<Crawl> {
        let source = chain.store().first().copied()?;
        let origin = source.center();
        let target = world.aim_point(owner, CRAWL_RANGE)?;
        let direction = Vec3::new(target.x - origin.x, 0.0, target.z - origin.z).normalized();
        if direction == Vec3::ZERO {
            return None;
        }
        Some(Crawl {
            location: origin,
            direction,
            travelled: 0.0,
        })
    }
}

impl Effect<World> for FrostLine {
    fn kind(&self) -> EffectKind {
        FROST_LINE
    }

    fn update(&mut self, ctx: &mut EffectContext<'_, World>) -> Result<UpdateResult, EffectFault> {
        let owner = ctx.owner();
        let now = ctx.now();
        let world = ctx.world_mut();

        let crawl = match &mut self.stage {
            Stage::Preparing(chain) => {
                let result = chain.update(world, now);
                if !chain.is_finished() || result.is_remove() {
                    return Ok(result);
                }
                let Some(crawl) = Self::begin_crawl(chain, owner, world) else {
                    return Ok(UpdateResult::Remove);
                };
                self.stage = Stage::Crawling(crawl);
                return Ok(UpdateResult::Continue);
            }
            Stage::Crawling(crawl) => crawl,
        };

        crawl.location = crawl.location + crawl.direction * SPEED;
        crawl.travelled += SPEED;
        let cell = Cell::containing(crawl.location);
        if crawl.travelled > CRAWL_RANGE || world.terrain.material(cell).is_solid() {
            return Ok(UpdateResult::Remove);
        }

        if world.terrain.material(cell) == Material::Water {
            let ice = Replacement::timed(Material::Ice, ICE_DURATION).bendable();
            if world.replace_cell(cell, ice, &[], now).is_some() {
                self.cells_frozen += 1;
                trace!(owner = %owner, cell = ?cell, "water_frozen");
            }
        }

        let spike = world.stand_ins.allocate();
        let body = StandInBody {
            owner,
            position: cell.center(),
            label: "ice_spike",
        };
        if world
            .temp_bodies
            .create(
                spike,
                Replacement::timed(Some(body), SPIKE_DURATION),
                &mut world.stand_ins,
                now,
            )
            .is_some()
        {
            self.spikes_raised += 1;
        }
        if let Some(raised) = world.stand_ins.get(spike) {
            trace!(
                owner = %raised.owner,
                label = raised.label,
                position = ?raised.position,
                raised = self.spikes_raised,
                "spike_raised"
            );
        }
        Ok(UpdateResult::Continue)
    }

    fn on_destroy(&mut self, ctx: &mut EffectContext<'_, World>) {
        trace!(
            instance = %ctx.instance_id(),
            crawling = self.is_crawling(),
            spikes = self.spikes_raised(),
            frozen = self.cells_frozen(),
            "frost_line_ended"
        );
    }

    fn colliders(&self) -> Vec<Collider> {
        match &self.stage {
            Stage::Preparing(_) => Vec::new(),
            Stage::Crawling(crawl) => {
                vec![Aabb::new(crawl.location - Vec3::HALF, crawl.location + Vec3::HALF).into()]
            }
        }
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
    let Some(source) = world.find_source(owner, SELECT_RANGE, Material::is_frozen_source) else {
        return Ok(Build::Rejected("no_source"));
    };
    Ok(Build::Spawn(Box::new(FrostLine::prepare(owner, source, world, now))))
}
