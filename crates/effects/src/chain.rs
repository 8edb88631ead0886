//! Linear, forward-only sequencing of activation phases.
//!
//! Only the phase under the cursor receives calls. A phase finishes itself by calling
//! [`PhaseContext::advance`]; the chain then starts the next phase, or finishes when
//! there is none. Phases share a [`ChainStore`] for handing data to whatever runs after
//! the chain.

use tracing::trace;

use crate::clock::Timestamp;
use crate::types::UpdateResult;

#[derive(Debug, Clone, PartialEq)]
pub struct ChainStore<T> {
    items: Vec<T>,
}

impl<T> Default for ChainStore<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> ChainStore<T> {
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter()
    }

    pub fn retain(&mut self, keep: impl FnMut(&T) -> bool) {
        self.items.retain(keep);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub struct PhaseContext<'a, W, T> {
    store: &'a mut ChainStore<T>,
    world: &'a mut W,
    now: Timestamp,
    advance_requested: bool,
}

impl<'a, W, T> PhaseContext<'a, W, T> {
    fn new(store: &'a mut ChainStore<T>, world: &'a mut W, now: Timestamp) -> Self {
        Self {
            store,
            world,
            now,
            advance_requested: false,
        }
    }

    pub fn store(&self) -> &ChainStore<T> {
        &*self.store
    }

    pub fn store_mut(&mut self) -> &mut ChainStore<T> {
        &mut *self.store
    }

    pub fn world(&self) -> &W {
        &*self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut *self.world
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Marks the current phase as done. Takes effect when the phase call returns.
    pub fn advance(&mut self) {
        self.advance_requested = true;
    }
}

pub trait Phase<W, T> {
    fn start(&mut self, ctx: &mut PhaseContext<'_, W, T>);

    fn update(&mut self, ctx: &mut PhaseContext<'_, W, T>) -> UpdateResult;

    /// External request to commit this phase. Phases that are not ready ignore it.
    fn complete(&mut self, ctx: &mut PhaseContext<'_, W, T>);

    /// Points a phase that has not committed yet at a new target.
    fn reselect(&mut self, _target: T, _ctx: &mut PhaseContext<'_, W, T>) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    At(usize),
    Finished,
}

pub struct Chain<W, T> {
    phases: Vec<Box<dyn Phase<W, T>>>,
    cursor: Cursor,
    started: bool,
    store: ChainStore<T>,
}

impl<W, T> Default for Chain<W, T> {
    fn default() -> Self {
        Self {
            phases: Vec::new(),
            cursor: Cursor::At(0),
            started: false,
            store: ChainStore::default(),
        }
    }
}

impl<W, T> Chain<W, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_phase(mut self, phase: impl Phase<W, T> + 'static) -> Self {
        self.add_phase(phase);
        self
    }

    /// Phases added after [`Chain::start`] still run once the cursor reaches them.
    pub fn add_phase(&mut self, phase: impl Phase<W, T> + 'static) -> &mut Self {
        self.phases.push(Box::new(phase));
        self
    }

    pub fn start(&mut self, world: &mut W, now: Timestamp) {
        if self.started || self.phases.is_empty() {
            return;
        }
        self.started = true;
        self.enter(0, world, now);
    }

    pub fn update(&mut self, world: &mut W, now: Timestamp) -> UpdateResult {
        let Some(index) = self.live_index() else {
            return UpdateResult::Remove;
        };
        let (result, advanced) = {
            let mut ctx = PhaseContext::new(&mut self.store, world, now);
            let result = self.phases[index].update(&mut ctx);
            (result, ctx.advance_requested)
        };
        if advanced {
            self.enter(index + 1, world, now);
        }
        result
    }

    /// Asks the current phase to commit. Returns whether the cursor moved.
    pub fn complete_current(&mut self, world: &mut W, now: Timestamp) -> bool {
        let Some(index) = self.live_index() else {
            return false;
        };
        let advanced = {
            let mut ctx = PhaseContext::new(&mut self.store, world, now);
            self.phases[index].complete(&mut ctx);
            ctx.advance_requested
        };
        if advanced {
            self.enter(index + 1, world, now);
        }
        advanced
    }

    /// Forwards a new target to the current phase. Never moves the cursor.
    pub fn reselect(&mut self, target: T, world: &mut W, now: Timestamp) -> bool {
        let Some(index) = self.live_index() else {
            return false;
        };
        let mut ctx = PhaseContext::new(&mut self.store, world, now);
        self.phases[index].reselect(target, &mut ctx)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.live_index()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_finished(&self) -> bool {
        self.cursor == Cursor::Finished
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn store(&self) -> &ChainStore<T> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ChainStore<T> {
        &mut self.store
    }

    fn live_index(&self) -> Option<usize> {
        match self.cursor {
            Cursor::At(index) if self.started => Some(index),
            _ => None,
        }
    }

    /// Starts phases from `index` on until one of them stays current.
    fn enter(&mut self, mut index: usize, world: &mut W, now: Timestamp) {
        loop {
            if index >= self.phases.len() {
                trace!(phases = self.phases.len(), "chain_finished");
                self.cursor = Cursor::Finished;
                return;
            }
            self.cursor = Cursor::At(index);
            let advanced = {
                let mut ctx = PhaseContext::new(&mut self.store, world, now);
                self.phases[index].start(&mut ctx);
                ctx.advance_requested
            };
            if !advanced {
                return;
            }
            index += 1;
        }
    }
}
