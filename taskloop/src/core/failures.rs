//! Consecutive agent-failure accounting for one run.

use crate::error::LoopError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureTracker {
    threshold: u32,
    consecutive: u32,
}

impl FailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive: 0,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Count one failure; errors once the streak reaches the threshold.
    pub fn record_failure(&mut self) -> Result<u32, LoopError> {
        self.consecutive += 1;
        if self.consecutive >= self.threshold {
            return Err(LoopError::TooManyFailures {
                threshold: self.threshold,
            });
        }
        Ok(self.consecutive)
    }
}
