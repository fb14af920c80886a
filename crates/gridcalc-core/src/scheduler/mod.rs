//! Evaluation scheduler.
//!
//! Owns the dependency index, the pending sets and the value cache. Content
//! edits are tracked incrementally; structural edits mark the scheduler
//! [`SchedulerState::Stale`], and the next recalculation rebuilds the index
//! from the store and recomputes every non-empty cell.

mod cache;
mod evaluate;
mod store;

pub use cache::ValueCache;
pub use evaluate::RecalcStats;
pub use store::{CellReader, CellSnapshot, CellStore, Change, Formula, FormulaExecutor};

use gridcalc_engine::engine::Value;

use crate::config::RecalcConfig;
use crate::graph::{BoundingBox, CellId, CellPosition, DependencyIndex, RecomputeSet, expand, merge_positions};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    /// The index does not reflect the store; the next recalculation rebuilds it.
    Stale,
    /// Edits are waiting to be evaluated.
    Dirty,
    /// A recalculation is running.
    Evaluating,
    /// The last recalculation settled every pending position.
    Converged,
    /// The last recalculation gave up on some positions after `max_cycle` passes.
    CircularUnresolved,
}

#[derive(Debug)]
pub struct Scheduler {
    config: RecalcConfig,
    index: DependencyIndex,
    state: SchedulerState,
    /// Boxes changed since the last recalculation, expanded on `prepare`.
    seeds: Vec<BoundingBox>,
    current: RecomputeSet,
    next: RecomputeSet,
    cache: ValueCache,
}

impl Scheduler {
    pub fn new(config: RecalcConfig) -> Scheduler {
        Scheduler {
            index: DependencyIndex::new(config.last_row(), config.column_index),
            config,
            state: SchedulerState::Stale,
            seeds: Vec::new(),
            current: RecomputeSet::new(),
            next: RecomputeSet::new(),
            cache: ValueCache::default(),
        }
    }

    pub fn config(&self) -> &RecalcConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn index(&self) -> &DependencyIndex {
        &self.index
    }

    /// Positions waiting to be evaluated. Call [`Scheduler::prepare`] first to
    /// include everything reachable from the edits.
    pub fn pending(&self) -> &RecomputeSet {
        &self.current
    }

    /// Route a change notification.
    pub fn notify<S: CellStore>(&mut self, change: Change, store: &S) {
        match change {
            Change::ContentChanged(position) => self.on_content_changed(position, store),
            other => {
                log::debug!("structural change {other:?}, index marked stale");
                self.mark_stale();
            }
        }
    }

    /// Replace the edges of `position` with those of its current content and
    /// queue it for evaluation.
    pub fn on_content_changed<S: CellStore>(&mut self, position: CellPosition, store: &S) {
        if self.state == SchedulerState::Stale {
            return;
        }
        self.index.remove_all(position);
        if let Some(CellSnapshot::Formula(formula)) = store.cell(position) {
            self.index.insert(position, formula.dependencies());
        }
        self.seeds.push(BoundingBox::cell(position));
        self.current.add_position(position);
        self.state = SchedulerState::Dirty;
    }

    /// [`Scheduler::on_content_changed`] for a cell known by id.
    pub fn on_content_changed_by_id<S: CellStore>(&mut self, id: CellId, store: &S) {
        match store.position_of(id) {
            Some(position) => self.on_content_changed(position, store),
            None => log::debug!("content change for unknown cell id {id} ignored"),
        }
    }

    /// Forget all incremental state; the next recalculation starts from scratch.
    pub fn mark_stale(&mut self) {
        self.state = SchedulerState::Stale;
        self.seeds.clear();
        self.current.clear();
        self.next.clear();
    }

    /// Turn pending edits into the set of positions to evaluate.
    pub fn prepare<S: CellStore>(&mut self, store: &S) {
        match self.state {
            SchedulerState::Stale => {
                let edges = store
                    .formula_positions()
                    .into_iter()
                    .filter_map(|position| match store.cell(position) {
                        Some(CellSnapshot::Formula(formula)) => {
                            Some((position, formula.dependencies().to_vec()))
                        }
                        _ => None,
                    })
                    .collect();
                self.index.rebuild(edges);
                self.cache.clear();
                self.seeds.clear();
                self.next.clear();
                self.current = RecomputeSet::from_boxes(merge_positions(store.non_empty_positions()));
                self.state = SchedulerState::Dirty;
                log::debug!(
                    "full rebuild: {} edges, {} positions pending",
                    self.index.len(),
                    self.current.len()
                );
            }
            SchedulerState::Dirty => {
                if self.seeds.is_empty() {
                    return;
                }
                self.index.flush();
                let reached = expand(&self.index, &self.seeds);
                self.current.extend(&reached);
                self.seeds.clear();
            }
            SchedulerState::Evaluating
            | SchedulerState::Converged
            | SchedulerState::CircularUnresolved => {}
        }
    }

    /// Cached value at `position`, `Empty` when none.
    pub fn evaluated_value(&self, position: CellPosition) -> Value {
        self.cache.get(position).cloned().unwrap_or_default()
    }
}
