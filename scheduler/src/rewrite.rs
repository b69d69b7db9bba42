//! The task rewriter protocol: peephole fusion of DAG-adjacent instructions.

use crate::task::Task;

/// A peephole optimization over pairs of DAG-adjacent tasks.
///
/// `first` must be an immediate predecessor of `second`. The processor tries
/// registered rewriters in registration order and applies the first whose
/// `can_merge` accepts the pair.
pub trait Rewriter {
    /// Whether `first` and `second` may be fused into one task.
    fn can_merge(&self, first: &Task, second: &Task) -> bool;

    /// Fuses `first` and `second`. The returned task's read-set must be a
    /// superset of `first.reads ∪ (second.reads − first.writes)` and its
    /// write-set must be `first.writes ∪ second.writes`.
    fn merge(&self, first: &Task, second: &Task) -> Task;
}

/// A rewriter built from a bare predicate and merge function, for callers
/// who don't need a dedicated type.
pub struct SimpleTaskRewriter<P, M> {
    predicate: P,
    merger: M,
}

impl<P, M> SimpleTaskRewriter<P, M>
where
    P: Fn(&Task, &Task) -> bool,
    M: Fn(&Task, &Task) -> Task,
{
    /// Wraps `predicate` and `merger` as a [`Rewriter`].
    pub fn new(predicate: P, merger: M) -> Self {
        SimpleTaskRewriter { predicate, merger }
    }
}

impl<P, M> Rewriter for SimpleTaskRewriter<P, M>
where
    P: Fn(&Task, &Task) -> bool,
    M: Fn(&Task, &Task) -> Task,
{
    fn can_merge(&self, first: &Task, second: &Task) -> bool {
        (self.predicate)(first, second)
    }

    fn merge(&self, first: &Task, second: &Task) -> Task {
        (self.merger)(first, second)
    }
}

/// A general-purpose merge function: runs `first` then `second` in sequence
/// against the same context, with the read/write sets the protocol requires
/// (`first.reads ∪ (second.reads − first.writes)`, `first.writes ∪
/// second.writes`).
///
/// Suitable as the `merger` of a [`SimpleTaskRewriter`] whenever two tasks
/// can be fused without any smarter algebraic shortcut — the fused task is
/// behaviorally identical to executing the originals back to back, which is
/// exactly the equivalence the rewriter protocol requires.
pub fn sequential_merge(first: &Task, second: &Task) -> Task {
    let reads = first
        .reads()
        .iter()
        .copied()
        .chain(
            second
                .reads()
                .iter()
                .copied()
                .filter(|c| !first.writes().contains(c)),
        )
        .collect::<std::collections::HashSet<_>>();
    let writes = first
        .writes()
        .iter()
        .copied()
        .chain(second.writes().iter().copied())
        .collect::<std::collections::HashSet<_>>();
    let priority = first.priority();
    let first = first.clone();
    let second = second.clone();
    Task::new(
        move |ctx| {
            first.execute(ctx)?;
            second.execute(ctx)
        },
        reads,
        writes,
        priority,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentId;
    use crate::model::Value;

    #[test]
    fn simple_rewriter_delegates_to_closures() {
        let rewriter = SimpleTaskRewriter::new(
            |_first: &Task, _second: &Task| true,
            |first: &Task, second: &Task| {
                let reads: Vec<_> = first
                    .reads()
                    .iter()
                    .chain(second.reads().iter())
                    .copied()
                    .collect();
                let writes: Vec<_> = first
                    .writes()
                    .iter()
                    .chain(second.writes().iter())
                    .copied()
                    .collect();
                Task::new(|ctx| {
                    ctx.set(ComponentId::DataGraph, Value::new(1i32));
                    Ok(())
                }, reads, writes, first.priority())
            },
        );

        let a = Task::new(|_ctx| Ok(()), [ComponentId::DataGraph], [], 0);
        let b = Task::new(|_ctx| Ok(()), [], [ComponentId::DataGraph], 0);
        assert!(rewriter.can_merge(&a, &b));
        let merged = rewriter.merge(&a, &b);
        assert!(merged.reads().contains(&ComponentId::DataGraph));
        assert!(merged.writes().contains(&ComponentId::DataGraph));
    }

    #[test]
    fn sequential_merge_runs_both_closures_in_order() {
        use crate::model::{ModelData, TaskContext};
        use std::collections::HashSet as Set;

        let increment = Task::new(
            |ctx| {
                let current = ctx
                    .get(ComponentId::DataGraph)
                    .and_then(Value::downcast_ref::<i32>)
                    .copied()
                    .unwrap_or(0);
                ctx.set(ComponentId::DataGraph, Value::new(current + 1));
                Ok(())
            },
            [ComponentId::DataGraph],
            [ComponentId::DataGraph],
            0,
        );

        let fused = sequential_merge(&increment, &increment);
        assert_eq!(fused.reads(), increment.reads());
        assert_eq!(fused.writes(), increment.writes());

        let mut model = ModelData::new();
        let mut written = Set::new();
        let mut log = Vec::new();
        let mut ctx = TaskContext::new(&mut model, &mut written, &mut log);
        fused.execute(&mut ctx).unwrap();
        assert_eq!(
            ctx.get(ComponentId::DataGraph)
                .and_then(Value::downcast_ref::<i32>),
            Some(&2)
        );
    }
}
