//! Error kinds surfaced at the scheduler's API boundary.
//!
//! Most of these indicate a programming error by the caller (acquiring a
//! time capsule instant that is already held elsewhere, releasing one that
//! was never acquired, and so on) and should be treated as fatal by callers
//! rather than retried. `TaskClosureFailure` is the one variant that can
//! legitimately occur at runtime from ordinary user data.

use std::fmt;

/// Errors produced by the scheduler core.
#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    /// `acquire()` was called on an instant while a *different* instant of
    /// the same capsule is currently held with a non-zero acquisition count.
    #[error("time capsule instant already acquired elsewhere")]
    TimeCapsuleAlreadyAcquired,

    /// `release()` was called on an instant whose capsule has a zero
    /// acquisition count.
    #[error("time capsule instant not currently acquired")]
    TimeCapsuleNotAcquired,

    /// `release()` was called on an instant that is not the one currently
    /// held by the capsule.
    #[error("time capsule is acquired at a different instant")]
    TimeCapsuleAcquiredElsewhere,

    /// `transferOutput` was invoked for a successor that does not list the
    /// retiring instruction as one of its dependencies.
    #[error("instruction {0} is not a registered dependency of the transfer target")]
    IndependentTransfer(InstructionId),

    /// A task closure failed while executing. The instruction is still
    /// considered retired for the purposes of DAG progression; see
    /// [`crate::processor::Processor::process_task`] for the exact policy.
    #[error("task closure failed: {0}")]
    TaskClosureFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Convenience alias for results returned by the scheduler core.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Identity of an [`crate::instruction::Instruction`], re-exported here so
/// error messages can reference it without a dependency cycle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstructionId(pub(crate) u32);

impl InstructionId {
    pub(crate) fn from_raw(n: u32) -> Self {
        InstructionId(n)
    }
}

impl fmt::Debug for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
