//! Tasks: opaque, clonable units of work over the model data.

use std::collections::HashSet;
use std::error::Error;
use std::rc::Rc;

use crate::component::ComponentId;
use crate::model::TaskContext;

type Closure = dyn Fn(&mut TaskContext) -> Result<(), Box<dyn Error + Send + Sync>>;

/// An opaque unit of work: a closure plus the read/write sets it has
/// declared and a scheduling priority.
///
/// Cloning a `Task` is cheap — the closure is held behind an `Rc` and shared,
/// not duplicated, matching the "clonable closure" strategy of scheduling the
/// same work more than once.
#[derive(Clone)]
pub struct Task {
    closure: Rc<Closure>,
    reads: Rc<HashSet<ComponentId>>,
    writes: Rc<HashSet<ComponentId>>,
    priority: i32,
}

impl Task {
    /// Builds a task from a closure and its declared read/write sets.
    ///
    /// The closure is only permitted to read components in `reads` and write
    /// components in `writes`; the core does not enforce this at runtime
    /// (see the write-set-violation hazard test), so callers that violate it
    /// get undefined — but not unsound — behavior.
    pub fn new(
        closure: impl Fn(&mut TaskContext) -> Result<(), Box<dyn Error + Send + Sync>> + 'static,
        reads: impl IntoIterator<Item = ComponentId>,
        writes: impl IntoIterator<Item = ComponentId>,
        priority: i32,
    ) -> Self {
        Task {
            closure: Rc::new(closure),
            reads: Rc::new(reads.into_iter().collect()),
            writes: Rc::new(writes.into_iter().collect()),
            priority,
        }
    }

    /// The components this task may read.
    pub fn reads(&self) -> &HashSet<ComponentId> {
        &self.reads
    }

    /// The components this task may write.
    pub fn writes(&self) -> &HashSet<ComponentId> {
        &self.writes
    }

    /// This task's scheduling priority; higher runs first.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Runs this task's closure against `ctx`.
    ///
    /// Part of the public task-factory surface (`task.execute(data)`) so that
    /// a [`crate::rewrite::Rewriter::merge`] can build a fused task whose
    /// closure simply runs both originals in sequence.
    pub fn execute(&self, ctx: &mut TaskContext) -> Result<(), Box<dyn Error + Send + Sync>> {
        (self.closure)(ctx)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .field("priority", &self.priority)
            .finish()
    }
}
