//! The priority-partitioned ready queue: a FIFO per priority bucket, drained
//! in the order the [`PriorityGenerator`] sawtooth hands out.

use std::collections::{HashMap, VecDeque};

use crate::error::InstructionId;
use crate::priority::PriorityGenerator;

/// Buckets eligible instructions by priority and drains them in sawtooth
/// order, FIFO within a bucket.
#[derive(Default)]
pub struct ReadyQueue {
    buckets: HashMap<i32, VecDeque<InstructionId>>,
    generator: PriorityGenerator,
    len: usize,
}

impl ReadyQueue {
    /// Creates an empty ready queue.
    pub fn new() -> Self {
        ReadyQueue {
            buckets: HashMap::new(),
            generator: PriorityGenerator::new(),
            len: 0,
        }
    }

    /// Appends `id` to its priority's bucket and expands the generator's
    /// tracked range to include `priority`.
    pub fn enqueue(&mut self, id: InstructionId, priority: i32) {
        self.buckets.entry(priority).or_default().push_back(id);
        self.generator.notify_priority_exists(priority);
        self.len += 1;
    }

    /// Pops the next eligible instruction in sawtooth-then-FIFO order, or
    /// `None` if every bucket is empty.
    pub fn dequeue(&mut self) -> Option<InstructionId> {
        if self.len == 0 {
            return None;
        }
        let attempts = self.generator.range_span().max(1);
        for _ in 0..attempts {
            let priority = self.generator.next();
            if let Some(bucket) = self.buckets.get_mut(&priority) {
                if let Some(id) = bucket.pop_front() {
                    self.len -= 1;
                    return Some(id);
                }
            }
        }
        None
    }

    /// True iff no bucket holds an entry.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
