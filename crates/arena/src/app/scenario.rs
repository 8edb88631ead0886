use effects::{Timestamp, Vec3};
use tracing::{debug, warn};

use super::activation::ActivationController;
use super::region::Region;

/// Something an actor does at a given tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Action {
    Activate(&'static str),
    Launch,
    Aim(Vec3),
    Sneak(bool),
    Steal,
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Step {
    pub(crate) tick: u64,
    pub(crate) actor: &'static str,
    pub(crate) action: Action,
}

impl Step {
    pub(crate) const fn new(tick: u64, actor: &'static str, action: Action) -> Self {
        Self { tick, actor, action }
    }
}

/// Scripted actor input replayed against a region, in tick order.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scenario {
    steps: Vec<Step>,
    next: usize,
}

impl Scenario {
    pub(crate) fn new(mut steps: Vec<Step>) -> Self {
        steps.sort_by_key(|step| step.tick);
        Self { steps, next: 0 }
    }

    /// Two actors facing each other across the demo region.
    pub(crate) fn demo() -> Self {
        use Action::*;

        Self::new(vec![
            Step::new(2, "alba", Activate("water_shot")),
            Step::new(3, "brann", Activate("water_shot")),
            Step::new(5, "alba", Launch),
            Step::new(5, "brann", Launch),
            Step::new(10, "alba", Activate("ice_armor")),
            Step::new(20, "brann", Activate("frost_line")),
            Step::new(22, "brann", Launch),
            Step::new(34, "alba", Activate("fire_burst")),
            Step::new(60, "alba", Activate("water_shot")),
            Step::new(62, "alba", Aim(Vec3::new(1.0, 0.0, 0.0))),
            Step::new(62, "alba", Launch),
            Step::new(66, "brann", Sneak(true)),
            Step::new(71, "brann", Steal),
            Step::new(74, "brann", Sneak(false)),
            Step::new(120, "brann", Logout),
        ])
    }

    pub(crate) fn len(&self) -> usize {
        self.steps.len()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.next >= self.steps.len()
    }

    /// Applies every step scheduled at or before `tick`. Returns how many ran.
    pub(crate) fn apply(
        &mut self,
        tick: u64,
        region: &mut Region,
        controller: &ActivationController,
        now: Timestamp,
    ) -> usize {
        let mut applied = 0;
        while let Some(step) = self.steps.get(self.next).copied() {
            if step.tick > tick {
                break;
            }
            self.next += 1;
            applied += 1;
            perform(step, region, controller, now);
        }
        applied
    }
}

fn perform(step: Step, region: &mut Region, controller: &ActivationController, now: Timestamp) {
    let Some(actor) = region.world.actor_named(step.actor) else {
        warn!(tick = step.tick, actor = step.actor, "scenario_actor_missing");
        return;
    };

    match step.action {
        Action::Activate(name) => match controller.activate(region, actor, name, now) {
            Ok(outcome) => {
                debug!(
                    tick = step.tick,
                    actor = step.actor,
                    effect = name,
                    ?outcome,
                    "scenario_activate"
                );
            }
            Err(error) => {
                warn!(tick = step.tick, actor = step.actor, error = %error, "activation_failed");
            }
        },
        Action::Launch => {
            if !controller.launch(region, actor, now) {
                debug!(tick = step.tick, actor = step.actor, "nothing_to_launch");
            }
        }
        Action::Aim(facing) => {
            if let Some(state) = region.world.actor_mut(actor) {
                state.facing = facing.normalized();
            }
        }
        Action::Sneak(sneaking) => {
            if let Some(state) = region.world.actor_mut(actor) {
                state.sneaking = sneaking;
            }
        }
        Action::Steal => {
            if controller.steal(region, actor).is_none() {
                debug!(tick = step.tick, actor = step.actor, "nothing_to_steal");
            }
        }
        Action::Logout => {
            controller.logout(region, actor, now);
        }
    }
}
