//! Draining the pending set in dependency order.
//!
//! A pass runs Tarjan's strongly connected components search over the pending
//! positions, using an explicit stack of visits. Edges go from a formula to the
//! pending positions inside its declared dependency boxes, so components come
//! out dependencies first. A component with more than one member, or a single
//! position reading itself, is a cycle: every member gets `CircularDependency`
//! before any of them is executed. Everything else runs the executor.

use std::collections::{HashMap, HashSet};

use gridcalc_engine::engine::{CellError, Value};

use super::cache::ValueCache;
use super::store::{CellReader, CellSnapshot, CellStore, Formula, FormulaExecutor};
use super::{Scheduler, SchedulerState};
use crate::graph::{BoundingBox, CellPosition, RecomputeSet, SheetId};

/// What a recalculation did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecalcStats {
    pub passes: usize,
    /// Positions finalized, counting re-evaluations in later passes.
    pub evaluated: usize,
    /// Positions assigned `CircularDependency`.
    pub cycles: usize,
    /// Positions assigned `CircularDependencyUnresolved`.
    pub unresolved: usize,
}

/// A position on the walk and the pending positions it reads.
struct Visit {
    position: CellPosition,
    reads: Vec<CellPosition>,
    next: usize,
}

/// Component search state for one pass.
#[derive(Default)]
struct Walk {
    order: HashMap<CellPosition, usize>,
    lowlink: HashMap<CellPosition, usize>,
    on_stack: HashSet<CellPosition>,
    stack: Vec<CellPosition>,
    self_loops: HashSet<CellPosition>,
}

impl Walk {
    fn lower(&mut self, position: CellPosition, value: usize) {
        if let Some(low) = self.lowlink.get_mut(&position) {
            *low = (*low).min(value);
        }
    }

    /// Pop the component rooted at `root` off the stack.
    fn pop_component(&mut self, root: CellPosition) -> Vec<CellPosition> {
        let mut component = Vec::new();
        while let Some(position) = self.stack.pop() {
            self.on_stack.remove(&position);
            component.push(position);
            if position == root {
                break;
            }
        }
        component
    }

    fn is_cycle(&self, component: &[CellPosition]) -> bool {
        match component {
            [single] => self.self_loops.contains(single),
            _ => !component.is_empty(),
        }
    }
}

/// Reader over finalized values. Reads of positions still pending are served
/// from the cache but flagged, so the reading position can be retried.
struct PassReader<'a, S> {
    store: &'a S,
    cache: &'a ValueCache,
    pending: &'a RecomputeSet,
    stale_read: bool,
}

impl<'a, S: CellStore> PassReader<'a, S> {
    fn new(store: &'a S, cache: &'a ValueCache, pending: &'a RecomputeSet) -> Self {
        PassReader {
            store,
            cache,
            pending,
            stale_read: false,
        }
    }
}

impl<S: CellStore> CellReader for PassReader<'_, S> {
    fn read_cell(&mut self, position: CellPosition) -> Result<Value, CellError> {
        if !self.store.sheet_exists(position.sheet) {
            return Err(CellError::invalid_reference());
        }
        if self.pending.contains(position) {
            self.stale_read = true;
        }
        match self.cache.get(position) {
            Some(Value::Error(e)) => Err(e.clone()),
            Some(value) => Ok(value.clone()),
            None => Ok(Value::Empty),
        }
    }

    fn read_range(&mut self, bbox: &BoundingBox) -> Result<Vec<Value>, CellError> {
        if !self.store.sheet_exists(bbox.sheet) {
            return Err(CellError::invalid_reference());
        }
        if self.pending.intersects(bbox) {
            self.stale_read = true;
        }
        self.cache
            .values_in(bbox)
            .into_iter()
            .map(|value| match value {
                Value::Error(e) => Err(e.clone()),
                other => Ok(other.clone()),
            })
            .collect()
    }
}

impl Scheduler {
    /// Evaluate everything pending, then report what happened.
    pub fn recalculate<S, E>(&mut self, store: &S, executor: &E) -> RecalcStats
    where
        S: CellStore,
        E: FormulaExecutor<Formula = S::Formula>,
    {
        self.prepare(store);
        let mut stats = RecalcStats::default();
        if self.current.is_empty() {
            if self.state == SchedulerState::Dirty {
                self.state = SchedulerState::Converged;
            }
            return stats;
        }

        self.state = SchedulerState::Evaluating;
        let mut done = RecomputeSet::new();
        loop {
            stats.passes += 1;
            self.run_pass(store, executor, &mut done, &mut stats);
            if self.next.is_empty() {
                break;
            }
            if stats.passes >= self.config.passes() {
                self.give_up(store, &mut stats);
                break;
            }
            log::trace!("pass {}: {} positions requeued", stats.passes, self.next.len());
            self.current = self.next.take();
        }

        self.state = if stats.unresolved > 0 {
            SchedulerState::CircularUnresolved
        } else {
            SchedulerState::Converged
        };
        log::debug!(
            "recalculated {} positions in {} passes ({} circular, {} unresolved)",
            stats.evaluated,
            stats.passes,
            stats.cycles,
            stats.unresolved
        );
        stats
    }

    /// Evaluate a formula that belongs to no cell, against settled values.
    /// The dependency index is not touched.
    pub fn evaluate_ad_hoc<S, E>(
        &mut self,
        formula: &S::Formula,
        sheet: SheetId,
        store: &S,
        executor: &E,
    ) -> Value
    where
        S: CellStore,
        E: FormulaExecutor<Formula = S::Formula>,
    {
        if matches!(self.state, SchedulerState::Stale | SchedulerState::Dirty) {
            self.recalculate(store, executor);
        }
        if !store.sheet_exists(sheet) {
            return Value::Error(CellError::invalid_reference());
        }
        let mut reader = PassReader::new(store, &self.cache, &self.current);
        executor
            .execute(None, formula, &mut reader)
            .unwrap_or_else(Value::Error)
    }

    fn run_pass<S, E>(
        &mut self,
        store: &S,
        executor: &E,
        done: &mut RecomputeSet,
        stats: &mut RecalcStats,
    ) where
        S: CellStore,
        E: FormulaExecutor<Formula = S::Formula>,
    {
        let mut walk = Walk::default();
        let mut cyclic: HashSet<CellPosition> = HashSet::new();

        while let Some(root) = self.current.first() {
            if walk.order.contains_key(&root) {
                self.current.remove_position(root);
                continue;
            }
            let mut visits = vec![self.visit(root, store, &mut walk)];
            while let Some(top) = visits.last_mut() {
                if let Some(&read) = top.reads.get(top.next) {
                    top.next += 1;
                    let position = top.position;
                    match walk.order.get(&read).copied() {
                        None => visits.push(self.visit(read, store, &mut walk)),
                        Some(order) if walk.on_stack.contains(&read) => walk.lower(position, order),
                        Some(_) => {}
                    }
                    continue;
                }

                let Some(finished) = visits.pop() else {
                    break;
                };
                let position = finished.position;
                let low = walk.lowlink.get(&position).copied().unwrap_or_default();
                if let Some(parent) = visits.last() {
                    walk.lower(parent.position, low);
                }
                if walk.order.get(&position) == Some(&low) {
                    let component = walk.pop_component(position);
                    let is_cycle = walk.is_cycle(&component);
                    self.settle(component, is_cycle, store, executor, done, &mut cyclic, stats);
                }
            }
        }
    }

    /// Number `position` on the walk and collect the pending positions it reads.
    fn visit<S: CellStore>(&self, position: CellPosition, store: &S, walk: &mut Walk) -> Visit {
        let order = walk.order.len();
        walk.order.insert(position, order);
        walk.lowlink.insert(position, order);
        walk.stack.push(position);
        walk.on_stack.insert(position);

        let mut reads = Vec::new();
        if let Some(CellSnapshot::Formula(formula)) = store.cell(position) {
            for bbox in formula.dependencies() {
                reads.extend(self.current.positions_in(bbox));
            }
        }
        if reads.contains(&position) {
            walk.self_loops.insert(position);
        }
        Visit {
            position,
            reads,
            next: 0,
        }
    }

    /// Finalize a component whose dependencies are all settled.
    #[allow(clippy::too_many_arguments)]
    fn settle<S, E>(
        &mut self,
        component: Vec<CellPosition>,
        is_cycle: bool,
        store: &S,
        executor: &E,
        done: &mut RecomputeSet,
        cyclic: &mut HashSet<CellPosition>,
        stats: &mut RecalcStats,
    ) where
        S: CellStore,
        E: FormulaExecutor<Formula = S::Formula>,
    {
        if is_cycle {
            if let Some(first) = component.first() {
                log::trace!("cycle of {} positions through {first}", component.len());
            }
            for position in &component {
                self.current.remove_position(*position);
                cyclic.insert(*position);
            }
            for position in component {
                stats.cycles += 1;
                stats.evaluated += 1;
                self.finalize(position, Value::Error(CellError::circular()), store, done, cyclic);
            }
            return;
        }

        for position in component {
            let (value, stale_read) = self.compute(position, store, executor);
            self.current.remove_position(position);
            if stale_read {
                self.next.add_position(position);
            }
            stats.evaluated += 1;
            self.finalize(position, value, store, done, cyclic);
        }
    }

    /// Run the content at `position`. Returns the value and whether it read a
    /// position that was still pending.
    fn compute<S, E>(&self, position: CellPosition, store: &S, executor: &E) -> (Value, bool)
    where
        S: CellStore,
        E: FormulaExecutor<Formula = S::Formula>,
    {
        let formula = match store.cell(position) {
            None => return (Value::Empty, false),
            Some(CellSnapshot::Constant(value)) => return (value, false),
            Some(CellSnapshot::Formula(formula)) => formula,
        };
        let mut reader = PassReader::new(store, &self.cache, &self.current);
        let value = executor
            .execute(Some(position), formula.as_ref(), &mut reader)
            .unwrap_or_else(Value::Error);
        (value, reader.stale_read)
    }

    /// Publish and cache a final value. When it changed, dependents that
    /// already ran against the old value are queued for the next pass.
    fn finalize<S: CellStore>(
        &mut self,
        position: CellPosition,
        value: Value,
        store: &S,
        done: &mut RecomputeSet,
        cyclic: &HashSet<CellPosition>,
    ) {
        store.publish(position, &value);
        let changed = match self.cache.get(position) {
            Some(previous) => !previous.same_as(&value),
            None => !value.is_empty(),
        };
        self.cache.insert(position, value);
        done.add_position(position);
        if !changed || cyclic.contains(&position) {
            return;
        }
        for dependent in self.index.query(&[BoundingBox::cell(position)]) {
            if dependent != position
                && done.contains(dependent)
                && !self.current.contains(dependent)
                && !cyclic.contains(&dependent)
            {
                self.next.add_position(dependent);
            }
        }
    }

    fn give_up<S: CellStore>(&mut self, store: &S, stats: &mut RecalcStats) {
        let leftover = self.next.take();
        for position in leftover.iter() {
            let value = Value::Error(CellError::unresolved());
            store.publish(position, &value);
            self.cache.insert(position, value);
            stats.unresolved += 1;
        }
        log::warn!(
            "{} positions still pending after {} passes, marked unresolved",
            stats.unresolved,
            stats.passes
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecalcConfig;
    use crate::graph::{CellId, Zone};
    use crate::scheduler::{Change, Formula};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Sums its declared dependencies; optionally also reads one undeclared cell.
    #[derive(Debug)]
    struct Sum {
        deps: Vec<BoundingBox>,
        hidden: Option<CellPosition>,
    }

    impl Formula for Sum {
        fn dependencies(&self) -> &[BoundingBox] {
            &self.deps
        }
    }

    #[derive(Default)]
    struct Store {
        cells: HashMap<CellPosition, CellSnapshot<Sum>>,
        published: RefCell<Vec<CellPosition>>,
    }

    impl Store {
        fn constant(&mut self, position: CellPosition, n: f64) {
            self.cells.insert(position, CellSnapshot::Constant(Value::Number(n)));
        }

        fn formula(&mut self, position: CellPosition, deps: Vec<BoundingBox>) {
            self.cells.insert(position, CellSnapshot::Formula(Arc::new(Sum { deps, hidden: None })));
        }
    }

    impl CellStore for Store {
        type Formula = Sum;

        fn cell(&self, position: CellPosition) -> Option<CellSnapshot<Sum>> {
            self.cells.get(&position).cloned()
        }

        fn position_of(&self, _id: CellId) -> Option<CellPosition> {
            None
        }

        fn non_empty_positions(&self) -> Vec<CellPosition> {
            self.cells.keys().copied().collect()
        }

        fn formula_positions(&self) -> Vec<CellPosition> {
            self.cells
                .iter()
                .filter(|(_, c)| matches!(c, CellSnapshot::Formula(_)))
                .map(|(p, _)| *p)
                .collect()
        }

        fn sheet_exists(&self, sheet: SheetId) -> bool {
            sheet == 0
        }

        fn publish(&self, position: CellPosition, _value: &Value) {
            self.published.borrow_mut().push(position);
        }
    }

    struct Summer;

    impl FormulaExecutor for Summer {
        type Formula = Sum;

        fn execute(
            &self,
            _position: Option<CellPosition>,
            formula: &Sum,
            reader: &mut dyn CellReader,
        ) -> Result<Value, CellError> {
            let mut total = 0.0;
            for bbox in &formula.deps {
                total += reader
                    .read_range(bbox)?
                    .iter()
                    .filter_map(Value::as_number)
                    .sum::<f64>();
            }
            if let Some(hidden) = formula.hidden {
                total += reader.read_cell(hidden)?.as_number().unwrap_or(0.0);
            }
            Ok(Value::Number(total))
        }
    }

    fn p(col: u32, row: u32) -> CellPosition {
        CellPosition::new(0, col, row)
    }

    fn cell(col: u32, row: u32) -> BoundingBox {
        BoundingBox::cell(p(col, row))
    }

    #[test]
    fn test_first_recalculation_is_full() {
        let mut store = Store::default();
        store.constant(p(0, 0), 1.0);
        store.formula(p(1, 0), vec![cell(0, 0)]);
        store.formula(p(2, 0), vec![cell(1, 0), cell(0, 0)]);

        let mut scheduler = Scheduler::new(RecalcConfig::default());
        assert_eq!(scheduler.state(), SchedulerState::Stale);
        let stats = scheduler.recalculate(&store, &Summer);
        assert_eq!(stats.evaluated, 3);
        assert_eq!(stats.passes, 1);
        assert_eq!(scheduler.evaluated_value(p(2, 0)), Value::Number(2.0));
        assert_eq!(scheduler.state(), SchedulerState::Converged);
    }

    #[test]
    fn test_dependencies_run_before_dependents() {
        let mut store = Store::default();
        store.constant(p(0, 0), 2.0);
        // A chain written bottom-up so a naive order would read stale values.
        for col in 1..20 {
            store.formula(p(col, 0), vec![cell(col - 1, 0)]);
        }
        let mut scheduler = Scheduler::new(RecalcConfig::default());
        scheduler.recalculate(&store, &Summer);
        assert_eq!(scheduler.evaluated_value(p(19, 0)), Value::Number(2.0));

        store.constant(p(0, 0), 5.0);
        scheduler.notify(Change::ContentChanged(p(0, 0)), &store);
        store.published.borrow_mut().clear();
        let stats = scheduler.recalculate(&store, &Summer);
        assert_eq!(stats.evaluated, 20);
        assert_eq!(scheduler.evaluated_value(p(19, 0)), Value::Number(5.0));
        assert_eq!(store.published.borrow().len(), 20);
    }

    #[test]
    fn test_self_reference_is_circular() {
        let mut store = Store::default();
        store.formula(p(0, 0), vec![cell(0, 0)]);
        let mut scheduler = Scheduler::new(RecalcConfig::default());
        let stats = scheduler.recalculate(&store, &Summer);
        assert_eq!(stats.cycles, 1);
        let value = scheduler.evaluated_value(p(0, 0));
        assert_eq!(value.as_error().map(|e| e.kind), Some(gridcalc_engine::engine::ErrorKind::CircularDependency));
    }

    #[test]
    fn test_every_cycle_member_is_marked() {
        let mut store = Store::default();
        // A1 reads B1 and C1, B1 reads C1, C1 reads A1. B1 is only reached
        // after C1 has been entered from A1.
        store.formula(p(0, 0), vec![cell(1, 0), cell(2, 0)]);
        store.formula(p(1, 0), vec![cell(2, 0)]);
        store.formula(p(2, 0), vec![cell(0, 0)]);
        store.formula(p(3, 0), vec![cell(0, 0)]);

        let mut scheduler = Scheduler::new(RecalcConfig::default());
        let stats = scheduler.recalculate(&store, &Summer);
        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.passes, 1);
        for col in 0..4 {
            let value = scheduler.evaluated_value(p(col, 0));
            assert_eq!(
                value.as_error().map(|e| e.kind),
                Some(gridcalc_engine::engine::ErrorKind::CircularDependency),
                "column {col}"
            );
        }
    }

    #[test]
    fn test_undeclared_pending_read_is_unresolved() {
        let mut store = Store::default();
        store.cells.insert(
            p(0, 0),
            CellSnapshot::Formula(Arc::new(Sum {
                deps: vec![],
                hidden: Some(p(0, 0)),
            })),
        );
        let mut scheduler = Scheduler::new(RecalcConfig {
            max_cycle: 3,
            ..RecalcConfig::default()
        });
        let stats = scheduler.recalculate(&store, &Summer);
        assert_eq!(stats.passes, 3);
        assert_eq!(stats.unresolved, 1);
        assert_eq!(scheduler.state(), SchedulerState::CircularUnresolved);
        let value = scheduler.evaluated_value(p(0, 0));
        assert_eq!(
            value.as_error().map(|e| e.kind),
            Some(gridcalc_engine::engine::ErrorKind::CircularDependencyUnresolved)
        );
    }

    #[test]
    fn test_undeclared_read_settles_in_a_later_pass() {
        let mut store = Store::default();
        // B1 reads A1 without declaring it; A1 sums C1.
        store.constant(p(2, 0), 4.0);
        store.formula(p(0, 0), vec![cell(2, 0)]);
        store.cells.insert(
            p(1, 0),
            CellSnapshot::Formula(Arc::new(Sum {
                deps: vec![],
                hidden: Some(p(0, 0)),
            })),
        );
        let mut scheduler = Scheduler::new(RecalcConfig {
            max_cycle: 4,
            ..RecalcConfig::default()
        });
        let stats = scheduler.recalculate(&store, &Summer);
        assert_eq!(stats.unresolved, 0);
        assert_eq!(scheduler.evaluated_value(p(1, 0)), Value::Number(4.0));
    }

    #[test]
    fn test_ad_hoc_leaves_index_untouched() {
        let mut store = Store::default();
        store.constant(p(0, 0), 3.0);
        store.constant(p(0, 1), 4.0);
        let mut scheduler = Scheduler::new(RecalcConfig::default());
        let formula = Sum {
            deps: vec![BoundingBox::new(0, Zone::new(0, 0, 1, 0))],
            hidden: None,
        };
        let value = scheduler.evaluate_ad_hoc(&formula, 0, &store, &Summer);
        assert_eq!(value, Value::Number(7.0));
        assert!(scheduler.index().is_empty());

        let missing = scheduler.evaluate_ad_hoc(&formula, 9, &store, &Summer);
        assert!(missing.as_error().is_some());
    }
}
