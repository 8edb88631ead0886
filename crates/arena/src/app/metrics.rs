use std::time::Duration;

use effects::{TickReport, Timestamp};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct LoopMetricsSnapshot {
    pub(crate) tps: f32,
    pub(crate) live_instances: usize,
    pub(crate) managed_entries: usize,
    pub(crate) collision_hits: usize,
    pub(crate) removed: usize,
    pub(crate) faulted: usize,
}

/// Aggregates tick reports over a wall-clock interval.
#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Timestamp,
    interval: Duration,
    ticks: u32,
    collision_hits: usize,
    removed: usize,
    faulted: usize,
}

impl MetricsAccumulator {
    pub(crate) fn new(start: Timestamp, interval: Duration) -> Self {
        Self {
            interval_start: start,
            interval,
            ticks: 0,
            collision_hits: 0,
            removed: 0,
            faulted: 0,
        }
    }

    pub(crate) fn record_tick(&mut self, report: &TickReport) {
        self.ticks = self.ticks.saturating_add(1);
        self.collision_hits += report.collisions.hits;
        self.removed += report.removed;
        self.faulted += report.faulted;
    }

    pub(crate) fn maybe_snapshot(
        &mut self,
        now: Timestamp,
        live_instances: usize,
        managed_entries: usize,
    ) -> Option<LoopMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let snapshot = LoopMetricsSnapshot {
            tps: self.ticks as f32 / elapsed_seconds,
            live_instances,
            managed_entries,
            collision_hits: self.collision_hits,
            removed: self.removed,
            faulted: self.faulted,
        };

        self.interval_start = now;
        self.ticks = 0;
        self.collision_hits = 0;
        self.removed = 0;
        self.faulted = 0;

        Some(snapshot)
    }
}
