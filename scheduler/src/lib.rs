//! `oop_scheduler`: a dependency-tracking out-of-order task scheduler over a
//! snapshot-isolated model.
//!
//! Tasks declare the components of a shared [`ModelData`] they read and
//! write; a [`Processor`] infers true data dependencies between them from
//! those declarations, runs independent tasks in priority order, and
//! forwards each task's output only to the successors that actually depend
//! on it — mirroring the reorder buffer and forwarding network of an
//! out-of-order CPU core, with the model's components standing in for
//! architectural registers.
//!
//! ```
//! use oop_scheduler::{ComponentId, ModelData, Processor, Task, Value};
//!
//! let mut processor = Processor::new(ModelData::new());
//! processor.schedule(Task::new(
//!     |ctx| {
//!         ctx.set(ComponentId::DataGraph, Value::new(1i32));
//!         Ok(())
//!     },
//!     [],
//!     [ComponentId::DataGraph],
//!     0,
//! ));
//! processor.process_all_tasks().unwrap();
//! assert_eq!(
//!     processor.model().get(ComponentId::DataGraph).and_then(Value::downcast_ref::<i32>),
//!     Some(&1),
//! );
//! ```

mod capsule;
mod component;
mod error;
mod instruction;
mod model;
mod priority;
mod processor;
mod queue;
mod rewrite;
mod task;

pub use component::ComponentId;
pub use error::{Result, SchedulerError};
pub use model::{ModelData, TaskContext, Value};
pub use processor::{PendingInstruction, Processor};
pub use rewrite::{sequential_merge, Rewriter, SimpleTaskRewriter};
pub use task::Task;

/// Re-exports the crate-private instruction identity as an opaque, public
/// type: callers can compare and log the IDs `Processor::schedule` and
/// `Processor::pending` hand back, but cannot construct one themselves.
pub use error::InstructionId;
