//! The out-of-order processor: the dependency builder, scheduler, output
//! forwarder and rewrite driver that ties the rest of the crate together.
//!
//! This is the load-bearing 30% of the core. `schedule` turns a [`Task`]
//! into an [`Instruction`], wires it into the dependency DAG against
//! whichever instructions are currently the last writer/reader of each
//! component it touches, and enqueues it once it has no predecessors left.
//! `process_task` dequeues the next eligible instruction by priority,
//! optionally fuses it with a run of adjacent mergeable successors, runs it,
//! forwards its output to whatever is waiting on it, and retires it.

use std::collections::{HashMap, HashSet};

use crate::component::ComponentId;
use crate::error::{InstructionId, Result, SchedulerError};
use crate::instruction::Instruction;
use crate::model::ModelData;
use crate::queue::ReadyQueue;
use crate::rewrite::Rewriter;
use crate::task::Task;

/// A snapshot of one pending instruction, for diagnostic use (the demo
/// binary's `--explain` flag; see `scheduler-demo`).
#[derive(Debug, Clone)]
pub struct PendingInstruction {
    /// This instruction's identity.
    pub id: InstructionId,
    /// Its scheduling priority.
    pub priority: i32,
    /// Predecessors it is still waiting on.
    pub waiting_on: Vec<InstructionId>,
}

/// The dependency-tracking out-of-order scheduler.
///
/// Drives instructions to completion against a shared [`ModelData`],
/// deriving true data dependencies from each task's declared read/write
/// sets and running independent instructions in priority order.
pub struct Processor {
    model: ModelData,
    next_id: u32,
    instructions: HashMap<InstructionId, Instruction>,
    latest_writer: HashMap<ComponentId, InstructionId>,
    latest_reader: HashMap<ComponentId, InstructionId>,
    ready: ReadyQueue,
    rewriters: Vec<Box<dyn Rewriter>>,
}

/// Instruction indices wrap here, well clear of `i32::MAX`, so the signed
/// priority arithmetic elsewhere in the crate is never confused with
/// instruction identity.
const INDEX_WRAP: u32 = (1 << 31) - 1;

impl Processor {
    /// Creates a processor over `model`, initially with no pending work.
    pub fn new(model: ModelData) -> Self {
        Processor {
            model,
            next_id: 0,
            instructions: HashMap::new(),
            latest_writer: HashMap::new(),
            latest_reader: HashMap::new(),
            ready: ReadyQueue::new(),
            rewriters: Vec::new(),
        }
    }

    /// Registers a rewriter. Tried, in registration order, against every
    /// dequeued instruction's run of eligible successors.
    pub fn register_rewriter(&mut self, rewriter: impl Rewriter + 'static) {
        self.rewriters.push(Box::new(rewriter));
    }

    /// True iff the DAG has no pending instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// A read-only view of the model data as it currently stands committed
    /// (i.e. with every retired instruction's output folded in).
    pub fn model(&self) -> &ModelData {
        &self.model
    }

    /// Lists the instructions still pending, for diagnostics.
    pub fn pending(&self) -> Vec<PendingInstruction> {
        let mut out: Vec<_> = self
            .instructions
            .values()
            .map(|instr| PendingInstruction {
                id: instr.id,
                priority: instr.priority(),
                waiting_on: instr.dependencies.keys().copied().collect(),
            })
            .collect();
        out.sort_by_key(|p| p.id.0);
        out
    }

    fn alloc_id(&mut self) -> InstructionId {
        let id = InstructionId::from_raw(self.next_id);
        self.next_id = if self.next_id >= INDEX_WRAP {
            0
        } else {
            self.next_id + 1
        };
        id
    }

    /// Wraps `task` in a fresh instruction, links it to whatever currently
    /// holds each component it reads or writes, and enqueues it if it has no
    /// predecessors left to wait on.
    pub fn schedule(&mut self, task: Task) -> InstructionId {
        let id = self.alloc_id();
        let mut dependencies: HashMap<InstructionId, HashSet<ComponentId>> = HashMap::new();

        // Write-after-read: a writer must wait for the last reader of each
        // component it writes, unless that reader *is* the current writer
        // (which already serializes it through the read-after-write edge
        // below).
        for &c in task.writes() {
            if let Some(&reader) = self.latest_reader.get(&c) {
                if self.latest_writer.get(&c) != Some(&reader) {
                    dependencies.entry(reader).or_default().insert(c);
                }
            }
        }

        // Read-after-write: a reader must wait for the last writer of each
        // component it reads.
        for &c in task.reads() {
            if let Some(&writer) = self.latest_writer.get(&c) {
                dependencies.entry(writer).or_default().insert(c);
            }
        }

        let seed = self.model.clone();
        let instruction = Instruction::new(id, task.clone(), seed, HashMap::new(), dependencies.clone());
        let eligible = instruction.is_eligible();
        let priority = instruction.priority();
        tracing::trace!(?id, priority, waiting_on = dependencies.len(), "scheduled instruction");

        for (&pred, components) in &dependencies {
            if let Some(p) = self.instructions.get_mut(&pred) {
                p.inverted_dependencies.insert(id);
                tracing::debug!(?pred, successor = ?id, ?components, "dependency edge formed");
            }
        }

        for &c in task.writes() {
            self.latest_writer.insert(c, id);
        }
        for &c in task.reads() {
            self.latest_reader.insert(c, id);
        }

        self.instructions.insert(id, instruction);
        if eligible {
            self.ready.enqueue(id, priority);
        }
        id
    }

    /// Dequeues the next eligible instruction, fuses it with a run of
    /// adjacent mergeable successors if any rewriter applies, runs it,
    /// forwards its output, and retires it.
    ///
    /// Returns `Ok(true)` if an instruction was processed, `Ok(false)` if
    /// the ready queue was empty. A task closure failure is surfaced as
    /// `Err(TaskClosureFailure)` — but only after the instruction has
    /// already been transferred and retired, so the DAG still progresses.
    pub fn process_task(&mut self) -> Result<bool> {
        let id = match self.ready.dequeue() {
            Some(id) => id,
            None => return Ok(false),
        };

        let id = self.fuse_forward(id);

        tracing::debug!(?id, "executing instruction");
        let written = {
            let instr = self
                .instructions
                .get(&id)
                .expect("dequeued instruction must still be present");
            instr.run()
        };
        let failure = self
            .instructions
            .get(&id)
            .and_then(|instr| instr.failure());
        if let Some(err) = &failure {
            tracing::error!(?id, %err, "task closure failed");
        }

        self.transfer(id, &written)?;
        self.retire(id, &written);

        match failure {
            Some(err) => Err(err),
            None => Ok(true),
        }
    }

    /// Runs [`Processor::process_task`] until the ready queue is exhausted.
    /// `TaskClosureFailure`s are logged and swallowed (the DAG has already
    /// progressed past them by the time they are reported); any other error
    /// indicates scheduler-internal corruption and aborts the loop.
    pub fn process_all_tasks(&mut self) -> Result<()> {
        loop {
            match self.process_task() {
                Ok(true) => continue,
                Ok(false) => return Ok(()),
                Err(SchedulerError::TaskClosureFailure(err)) => {
                    tracing::warn!(error = %err, "task closure failed; DAG progressed, continuing batch");
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Greedily fuses `id` forward with its successor chain while each link
    /// is a clean one-to-one adjacency (`id` has exactly one successor, and
    /// that successor depends on nothing else) and some registered rewriter
    /// accepts the pair. This is the "proactive pre-execution scan" strategy
    /// lets a chain of mutually-fusable clones collapse into a single
    /// executed instruction in one `process_task` call.
    fn fuse_forward(&mut self, mut id: InstructionId) -> InstructionId {
        loop {
            if self.rewriters.is_empty() {
                break;
            }
            let succ_id = {
                let instr = &self.instructions[&id];
                if instr.inverted_dependencies.len() != 1 {
                    break;
                }
                *instr.inverted_dependencies.iter().next().unwrap()
            };
            let Some(succ) = self.instructions.get(&succ_id) else {
                break;
            };
            if succ.dependencies.len() != 1 || !succ.dependencies.contains_key(&id) {
                break;
            }

            let merged_task = {
                let first = &self.instructions[&id].task;
                let second = &self.instructions[&succ_id].task;
                match self.rewriters.iter().find(|r| r.can_merge(first, second)) {
                    Some(r) => r.merge(first, second),
                    None => break,
                }
            };

            tracing::debug!(first = ?id, second = ?succ_id, "fusing adjacent instructions");
            id = self.splice(id, succ_id, merged_task);
        }
        id
    }

    /// Replaces the adjacent pair `(first_id, second_id)` with one fresh
    /// instruction running `merged_task`, rewiring every edge that pointed
    /// at either of them. Both inputs must be eligible (no pending
    /// dependencies) — true of `first_id` by construction in
    /// [`Processor::fuse_forward`], and of `second_id` because its only
    /// dependency (on `first_id`) is what made the pair adjacent.
    fn splice(&mut self, first_id: InstructionId, second_id: InstructionId, merged_task: Task) -> InstructionId {
        let first = self.instructions.remove(&first_id).expect("first exists");
        let second = self.instructions.remove(&second_id).expect("second exists");

        let mut overrides = first.overrides_snapshot();
        for (c, v) in second.overrides_snapshot() {
            overrides.insert(c, v);
        }
        let seed = first.seed_snapshot();
        let successors = second.inverted_dependencies;

        let merged_id = self.alloc_id();
        let mut merged = Instruction::new(merged_id, merged_task, seed, overrides, HashMap::new());
        merged.inverted_dependencies = successors;

        for &succ_id in &merged.inverted_dependencies {
            if let Some(succ) = self.instructions.get_mut(&succ_id) {
                if let Some(components) = succ.dependencies.remove(&second_id) {
                    succ.dependencies.insert(merged_id, components);
                }
            }
        }

        for w in self.latest_writer.values_mut() {
            if *w == first_id || *w == second_id {
                *w = merged_id;
            }
        }
        for r in self.latest_reader.values_mut() {
            if *r == first_id || *r == second_id {
                *r = merged_id;
            }
        }

        self.instructions.insert(merged_id, merged);
        merged_id
    }

    /// Copies `id`'s output to every successor waiting on it, clearing the
    /// resolved edge and enqueuing any successor that becomes fully
    /// eligible. `written` is the component set `id`'s closure actually
    /// wrote (from [`Instruction::run`]) — a component on a dependency edge
    /// that `id` never actually wrote (it only declared the write) is
    /// forwarded as absence, not as whatever stale value its capsule
    /// happens to hold.
    fn transfer(&mut self, id: InstructionId, written: &HashSet<ComponentId>) -> Result<()> {
        let successors = self.instructions[&id].inverted_dependencies.clone();

        for succ_id in successors {
            let components = {
                let succ = self
                    .instructions
                    .get_mut(&succ_id)
                    .ok_or(SchedulerError::IndependentTransfer(succ_id))?;
                succ.dependencies
                    .remove(&id)
                    .ok_or(SchedulerError::IndependentTransfer(succ_id))?
            };

            for component in components {
                let value = if written.contains(&component) {
                    self.instructions[&id].output(component)
                } else {
                    None
                };
                tracing::trace!(?id, successor = ?succ_id, ?component, present = value.is_some(), "transferred output");
                self.instructions[&succ_id].receive_transfer(component, value);
            }

            let now_eligible = self.instructions[&succ_id].is_eligible();
            if now_eligible {
                let priority = self.instructions[&succ_id].priority();
                self.ready.enqueue(succ_id, priority);
            }
        }
        Ok(())
    }

    /// Folds `id`'s actually-written components into the shared model —
    /// unless a later-scheduled writer has since claimed that component, in
    /// which case `id`'s write to it is stale and must not stomp the newer
    /// value — clears any `latest_writer`/`latest_reader` pointers still
    /// aimed at `id`, notifies model observers, and drops `id` from the DAG.
    fn retire(&mut self, id: InstructionId, written: &HashSet<ComponentId>) {
        for &c in written {
            if self.latest_writer.get(&c) == Some(&id) {
                let value = self.instructions[&id].output(c);
                self.model.set_unchecked(c, value);
            } else {
                tracing::trace!(?id, component = ?c, "stale write dropped at retire; superseded by a later-scheduled writer");
            }
        }

        self.latest_writer.retain(|_, w| *w != id);
        self.latest_reader.retain(|_, r| *r != id);

        self.model.notify(written);
        tracing::debug!(?id, ?written, "instruction retired");
        self.instructions.remove(&id);
    }
}
