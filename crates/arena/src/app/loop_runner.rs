use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use effects::{Clock, ManualClock, MonotonicClock, TickReport, Timestamp};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::activation::ActivationController;
use super::bootstrap::{self, AppWiring};
use super::config::CollisionConfigError;
use super::metrics::MetricsAccumulator;
use super::region::Region;
use super::scenario::Scenario;

#[derive(Debug, Clone)]
pub(crate) struct LoopConfig {
    pub(crate) target_tps: u32,
    pub(crate) max_ticks_per_frame: u32,
    pub(crate) metrics_log_interval: Duration,
    pub(crate) run_ticks: u64,
    pub(crate) sweep_every_ticks: u32,
    /// Sleep between frames so the run follows the wall clock.
    pub(crate) pace_realtime: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 20,
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            run_ticks: 200,
            sweep_every_ticks: 1,
            pace_realtime: false,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    CollisionConfig(#[from] CollisionConfigError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) ticks: u64,
    pub(crate) collision_hits: usize,
    pub(crate) removed: usize,
    pub(crate) faulted: usize,
    pub(crate) dropped_backlog: Duration,
    pub(crate) finished_at: Timestamp,
}

pub(crate) fn run() -> ExitCode {
    let app = match bootstrap::build_app() {
        Ok(app) => app,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return ExitCode::FAILURE;
        }
    };

    let AppWiring {
        config,
        mut region,
        controller,
        mut scenario,
    } = app;
    let summary = simulate(&config, &mut region, &controller, &mut scenario);
    info!(
        region = %region.name,
        ticks = summary.ticks,
        collision_hits = summary.collision_hits,
        removed = summary.removed,
        faulted = summary.faulted,
        dropped_backlog_ms = summary.dropped_backlog.as_millis() as u64,
        finished_at = %summary.finished_at,
        scenario_finished = scenario.is_finished(),
        "run_complete"
    );

    ExitCode::SUCCESS
}

/// Drives `region` for `config.run_ticks` fixed steps, then shuts it down.
///
/// Simulation time always advances by exactly one fixed step per tick. With
/// `pace_realtime` the loop also waits on the wall clock and drops backlog
/// past `max_ticks_per_frame`, the same way a windowed loop would.
pub(crate) fn simulate(
    config: &LoopConfig,
    region: &mut Region,
    controller: &ActivationController,
    scenario: &mut Scenario,
) -> RunSummary {
    let target_tps = config.target_tps.max(1);
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let sweep_every_ticks = u64::from(config.sweep_every_ticks.max(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);

    info!(
        region = %region.name,
        target_tps,
        max_ticks_per_frame,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        run_ticks = config.run_ticks,
        sweep_every_ticks,
        pace_realtime = config.pace_realtime,
        scenario_steps = scenario.len(),
        "loop_config"
    );

    let sim_clock = ManualClock::default();
    let wall_clock = MonotonicClock::new();
    let metrics_now = |sim: &ManualClock| {
        if config.pace_realtime {
            wall_clock.now()
        } else {
            sim.now()
        }
    };
    let mut metrics = MetricsAccumulator::new(metrics_now(&sim_clock), metrics_log_interval);
    let mut summary = RunSummary::default();
    let mut accumulator = Duration::ZERO;
    let mut last_frame = wall_clock.now();

    while summary.ticks < config.run_ticks {
        let frame_dt = if config.pace_realtime {
            let now = wall_clock.now();
            let elapsed = now.saturating_duration_since(last_frame);
            last_frame = now;
            elapsed
        } else {
            fixed_dt
        };
        accumulator = accumulator.saturating_add(frame_dt);

        let plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
        accumulator = plan.remaining_accumulator;
        if !plan.dropped_backlog.is_zero() {
            warn!(
                dropped_backlog_ms = plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame,
                "sim_backlog_dropped"
            );
            summary.dropped_backlog = summary.dropped_backlog.saturating_add(plan.dropped_backlog);
        }

        for _ in 0..plan.ticks_to_run {
            if summary.ticks >= config.run_ticks {
                break;
            }
            summary.ticks += 1;
            let now = sim_clock.advance(fixed_dt);
            let report = run_tick(
                region,
                controller,
                scenario,
                summary.ticks,
                now,
                sweep_every_ticks,
            );

            summary.collision_hits += report.collisions.hits;
            summary.removed += report.removed;
            summary.faulted += report.faulted;
            metrics.record_tick(&report);
        }

        if let Some(snapshot) = metrics.maybe_snapshot(
            metrics_now(&sim_clock),
            region.effects.len(),
            region.world.managed_count(),
        ) {
            info!(
                tps = snapshot.tps,
                live_instances = snapshot.live_instances,
                managed_entries = snapshot.managed_entries,
                stand_ins = region.world.stand_ins.len(),
                collision_hits = snapshot.collision_hits,
                removed = snapshot.removed,
                faulted = snapshot.faulted,
                "loop_metrics"
            );
        }

        if config.pace_realtime && plan.ticks_to_run == 0 {
            thread::sleep(fixed_dt.saturating_sub(accumulator));
        }
    }

    summary.finished_at = sim_clock.now();
    region.shutdown(summary.finished_at);
    summary
}

fn run_tick(
    region: &mut Region,
    controller: &ActivationController,
    scenario: &mut Scenario,
    tick: u64,
    now: Timestamp,
    sweep_every_ticks: u64,
) -> TickReport {
    scenario.apply(tick, region, controller, now);
    if tick % sweep_every_ticks == 0 {
        let restored = region.sweep(now);
        if restored > 0 {
            debug!(tick, restored, "temporal_sweep");
        }
    }
    region.tick(now)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    let dropped_backlog = if accumulator >= fixed_dt {
        std::mem::take(&mut accumulator)
    } else {
        Duration::ZERO
    };
    StepPlan {
        ticks_to_run,
        remaining_accumulator: accumulator,
        dropped_backlog,
    }
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::app::activation::EffectCatalog;
    use crate::app::config::default_collision_registry;
    use crate::app::world::{Cell, Material};

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let fixed_dt = Duration::from_millis(50);
        let result = plan_sim_steps(Duration::from_millis(150), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let fixed_dt = Duration::from_millis(50);
        let result = plan_sim_steps(Duration::from_millis(420), fixed_dt, 3);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(270));
    }

    #[test]
    fn plan_sim_steps_keeps_partial_step() {
        let fixed_dt = Duration::from_millis(50);
        let result = plan_sim_steps(Duration::from_millis(70), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 1);
        assert_eq!(result.remaining_accumulator, Duration::from_millis(20));
    }

    #[test]
    fn zero_metrics_interval_falls_back() {
        assert_eq!(
            normalize_non_zero_duration(Duration::ZERO, Duration::from_secs(1)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn demo_run_restores_the_region() {
        let mut region = bootstrap::demo_region(Arc::new(default_collision_registry()));
        let terrain_before: Vec<(Cell, Material)> = sorted_cells(&region);
        let controller = ActivationController::new(EffectCatalog::with_builtin());
        let mut scenario = Scenario::demo();
        let config = LoopConfig::default();

        let summary = simulate(&config, &mut region, &controller, &mut scenario);

        assert_eq!(summary.ticks, config.run_ticks);
        assert_eq!(summary.finished_at, Timestamp::from_millis(50 * config.run_ticks));
        assert_eq!(summary.faulted, 0);
        assert!(summary.collision_hits >= 1);
        assert!(scenario.is_finished());
        assert!(region.effects.is_empty());
        assert_eq!(region.world.managed_count(), 0);
        assert_eq!(region.world.stand_ins.len(), 0);
        assert_eq!(sorted_cells(&region), terrain_before);
        assert!(region.world.actor_named("brann").is_none());
    }

    #[test]
    fn short_run_stops_at_the_configured_tick() {
        let mut region = bootstrap::demo_region(Arc::new(default_collision_registry()));
        let controller = ActivationController::new(EffectCatalog::with_builtin());
        let mut scenario = Scenario::demo();
        let config = LoopConfig {
            run_ticks: 4,
            ..LoopConfig::default()
        };

        let summary = simulate(&config, &mut region, &controller, &mut scenario);
        assert_eq!(summary.ticks, 4);
        assert_eq!(summary.finished_at, Timestamp::from_millis(200));
        assert!(!scenario.is_finished());
        assert!(region.effects.is_empty());
    }

    fn sorted_cells(region: &Region) -> Vec<(Cell, Material)> {
        let mut cells: Vec<_> = region.world.terrain.cells().collect();
        cells.sort_by_key(|(cell, _)| *cell);
        cells
    }
}
