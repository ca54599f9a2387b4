// ============================================================
// Layer 3 — Global Step
// ============================================================
// Counts processed training batches. It is the x-axis of every
// logged scalar, so it only ever moves forward: one increment
// per batch, never reset during a run. A restored checkpoint
// may seed it with the step it was saved at.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalStep(u64);

impl GlobalStep {
    pub fn new() -> Self {
        Self(0)
    }

    /// Resume counting from a previously persisted value
    pub fn resume_from(step: u64) -> Self {
        Self(step)
    }

    /// Add one processed batch and return the new value
    pub fn advance(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}
