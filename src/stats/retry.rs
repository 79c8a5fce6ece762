/// The verdict of the retry governor after a batch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryVerdict {
    /// The failed batch should be requested again
    Retry,
    /// The budget is exhausted and the session should give up
    Exhausted,
}

/// The retry governor bounds how many full request batch failures are tolerated before giving up.
/// A single reject invalidates the entire in-flight batch, so the budget is expressed
/// and decremented in piece units.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryGovernor {
    remaining: i64,
    armed: bool,
}

impl RetryGovernor {
    pub fn new() -> Self {
        Self {
            remaining: 0,
            armed: false,
        }
    }

    /// Arm the governor with the budget for the given number of pieces.
    /// The budget can only be armed once, it never increases afterwards.
    pub fn arm(&mut self, piece_count: usize, max_batch_failures: usize) {
        if self.armed {
            return;
        }

        self.remaining = (piece_count * max_batch_failures) as i64;
        self.armed = true;
    }

    /// Get the remaining budget in piece units.
    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    /// Register a failure of the entire in-flight batch.
    ///
    /// # Returns
    ///
    /// Returns the verdict on whether the batch should be retried.
    pub fn on_batch_failure(&mut self, piece_count: usize) -> RetryVerdict {
        self.remaining -= piece_count as i64;

        if self.remaining > 0 {
            RetryVerdict::Retry
        } else {
            RetryVerdict::Exhausted
        }
    }
}
