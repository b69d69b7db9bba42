//! Instructions: one DAG node per scheduled task, each holding a private
//! two-instant time capsule over the handful of components it reads and
//! writes.
//!
//! Cross-instruction data flow does not run through a single shared capsule
//! chain — the DAG has multiple predecessors per node in general, and a
//! capsule instant has exactly one parent, so a shared chain cannot
//! represent a join. Instead each instruction's capsule is private, seeded
//! at schedule time from the then-current model, and corrected before
//! execution by the processor's explicit transfer step (see
//! [`crate::processor::Processor::process_task`]), mirroring the forwarding
//! network of an out-of-order core rather than a shared reorder-buffer log.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::rc::Rc;

use crate::capsule::Instant;
use crate::component::ComponentId;
use crate::error::{InstructionId, SchedulerError};
use crate::model::{Delta, ModelData, TaskContext, Value};
use crate::task::Task;

type ExecutionRecord = (Vec<Delta>, HashSet<ComponentId>);
type Failure = Box<dyn Error + Send + Sync>;

/// A transferred or pre-seeded override for one component: `Some` pins the
/// component to a value, `None` pins it to "absent" — both distinct from
/// "inherit whatever the seed clone happened to hold".
type Overrides = HashMap<ComponentId, Option<Value>>;

/// One node in the dependency DAG.
pub struct Instruction {
    pub(crate) id: InstructionId,
    pub(crate) task: Task,
    seed: ModelData,
    post: Instant<ModelData>,
    overrides: Rc<RefCell<Overrides>>,
    record: Rc<RefCell<Option<ExecutionRecord>>>,
    failure: Rc<RefCell<Option<Failure>>>,
    /// Predecessor instruction -> components it will supply to this one.
    pub(crate) dependencies: HashMap<InstructionId, HashSet<ComponentId>>,
    /// Successors waiting on this instruction.
    pub(crate) inverted_dependencies: HashSet<InstructionId>,
}

impl Instruction {
    /// Builds a fresh instruction. `seed` is a clone of the model taken at
    /// schedule time, before this task (or any of its as-yet-unexecuted
    /// predecessors) has run; `overrides` pre-seeds any values already known
    /// to have been transferred in (used when splicing a fused instruction
    /// in place of an eligible predecessor).
    pub(crate) fn new(
        id: InstructionId,
        task: Task,
        seed: ModelData,
        overrides: Overrides,
        dependencies: HashMap<InstructionId, HashSet<ComponentId>>,
    ) -> Self {
        let pre = Instant::create(seed.clone());
        let overrides = Rc::new(RefCell::new(overrides));
        let record: Rc<RefCell<Option<ExecutionRecord>>> = Rc::new(RefCell::new(None));
        let failure: Rc<RefCell<Option<Failure>>> = Rc::new(RefCell::new(None));

        let redo_task = task.clone();
        let redo_overrides = overrides.clone();
        let redo_record = record.clone();
        let redo_failure = failure.clone();
        let redo = move |model: &mut ModelData| {
            if let Some((log, _written)) = redo_record.borrow().as_ref() {
                for delta in log {
                    model.set_unchecked(delta.id, delta.new.clone());
                }
                return;
            }

            let mut log = Vec::new();
            for (component, value) in redo_overrides.borrow().iter() {
                let old = model.get(*component).cloned();
                model.set_unchecked(*component, value.clone());
                log.push(Delta {
                    id: *component,
                    old,
                    new: value.clone(),
                });
            }

            let mut written = HashSet::new();
            let outcome = {
                let mut ctx = TaskContext::new(model, &mut written, &mut log);
                redo_task.execute(&mut ctx)
            };
            if let Err(err) = outcome {
                *redo_failure.borrow_mut() = Some(err);
            }
            *redo_record.borrow_mut() = Some((log, written));
        };

        let undo_record = record.clone();
        let undo = move |model: &mut ModelData| {
            if let Some((log, _written)) = undo_record.borrow().as_ref() {
                for delta in log.iter().rev() {
                    model.set_unchecked(delta.id, delta.old.clone());
                }
            }
        };

        let post = pre.modify(redo, undo);

        Instruction {
            id,
            task,
            seed,
            post,
            overrides,
            record,
            failure,
            dependencies,
            inverted_dependencies: HashSet::new(),
        }
    }

    pub(crate) fn is_eligible(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub(crate) fn priority(&self) -> i32 {
        self.task.priority()
    }

    /// The model clone this instruction was seeded with at schedule time —
    /// the baseline a fused replacement instruction should inherit, since
    /// that fusion only ever happens before this instruction has executed.
    pub(crate) fn seed_snapshot(&self) -> ModelData {
        self.seed.clone()
    }

    /// Records a value transferred in from an already-retired predecessor.
    /// `value` is `None` when the predecessor's declared write-set named the
    /// component but it never actually wrote it — the successor must still
    /// see "absent", not whatever its own seed clone happened to hold.
    ///
    /// Must be called before this instruction executes (the caller
    /// guarantees this by only calling it while the instruction still has a
    /// pending dependency on that predecessor).
    pub(crate) fn receive_transfer(&self, component: ComponentId, value: Option<Value>) {
        self.overrides.borrow_mut().insert(component, value);
    }

    /// Snapshots the overrides received so far — used to seed a fused
    /// instruction that replaces this one.
    pub(crate) fn overrides_snapshot(&self) -> Overrides {
        self.overrides.borrow().clone()
    }

    /// Runs the task closure on the first call (applying any overrides
    /// first), replaying the cached effect on any later call, and returns
    /// the set of components it actually wrote. Never fails — a closure
    /// failure is recorded internally and surfaced separately by
    /// [`Instruction::failure`], since the caller (the processor) must still
    /// transfer outputs and retire this instruction even when the task
    /// errored.
    pub(crate) fn run(&self) -> HashSet<ComponentId> {
        let handle = self
            .post
            .acquire()
            .expect("instruction capsules are single-owner and never contended");
        drop(handle);
        self.post
            .release()
            .expect("instruction's own post-instant is never released elsewhere");

        self.record
            .borrow()
            .as_ref()
            .map(|(_, written)| written.clone())
            .unwrap_or_default()
    }

    /// Takes the closure failure recorded by the most recent [`Instruction::run`],
    /// if any. Returns `None` on a second call for the same failure.
    pub(crate) fn failure(&self) -> Option<SchedulerError> {
        self.failure
            .borrow_mut()
            .take()
            .map(SchedulerError::TaskClosureFailure)
    }

    /// Reads a component's value as it stood after this instruction
    /// executed. Only meaningful once [`Instruction::run`] has run.
    pub(crate) fn output(&self, component: ComponentId) -> Option<Value> {
        let handle = self.post.acquire().ok()?;
        let value = handle.get().get(component).cloned();
        self.post
            .release()
            .expect("instruction's own post-instant is never released elsewhere");
        value
    }
}
