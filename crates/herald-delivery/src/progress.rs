//! Pure counter and circuit-breaker state for one job run.
//!
//! The send loop folds each recipient outcome through [`RunProgress::step`],
//! keeping breaker and checkpoint decisions testable without any I/O. The
//! invariant `processed == success + fail` holds after every step by
//! construction.

/// Tunables for one run.
#[derive(Debug, Clone)]
pub struct RunPolicy {
    /// Consecutive failures that abort the run permanently.
    pub failure_threshold: u32,
    /// Persist counters every this many recipients. Failures always
    /// checkpoint immediately.
    pub checkpoint_every: u32,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: crate::DEFAULT_FAILURE_THRESHOLD,
            checkpoint_every: crate::DEFAULT_CHECKPOINT_EVERY,
        }
    }
}

/// Running counters plus the consecutive-failure streak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunProgress {
    /// Recipients attempted.
    pub processed: i32,
    /// Successful sends.
    pub success: i32,
    /// Failed sends.
    pub fail: i32,
    /// Current streak of failures; reset by any success.
    pub consecutive_failures: u32,
}

/// What the loop should do after recording one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDecision {
    /// Keep going; persist counters first when `checkpoint` is set.
    Continue {
        /// Whether this step falls on a checkpoint.
        checkpoint: bool,
    },
    /// Breaker tripped: persist counters, mark the job failed, stop. The
    /// unprocessed remainder is never retried automatically.
    Abort,
}

impl RunProgress {
    /// Starts a fresh run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one recipient outcome into the counters and decides how to
    /// proceed.
    pub fn step(mut self, succeeded: bool, policy: &RunPolicy) -> (Self, StepDecision) {
        self.processed += 1;
        if succeeded {
            self.success += 1;
            self.consecutive_failures = 0;
        } else {
            self.fail += 1;
            self.consecutive_failures += 1;
        }

        if self.consecutive_failures >= policy.failure_threshold {
            return (self, StepDecision::Abort);
        }

        let on_cadence = policy.checkpoint_every > 0
            && self.processed as u32 % policy.checkpoint_every == 0;
        (self, StepDecision::Continue { checkpoint: !succeeded || on_cadence })
    }

    /// Terminal status for a run that was not aborted by the breaker:
    /// failed only when every recipient failed.
    pub fn all_failed(&self, total: i32) -> bool {
        total > 0 && self.fail == total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RunPolicy {
        RunPolicy { failure_threshold: 20, checkpoint_every: 10 }
    }

    fn run(outcomes: &[bool], policy: &RunPolicy) -> (RunProgress, bool) {
        let mut progress = RunProgress::new();
        for &ok in outcomes {
            let (next, decision) = progress.step(ok, policy);
            progress = next;
            if decision == StepDecision::Abort {
                return (progress, true);
            }
        }
        (progress, false)
    }

    #[test]
    fn counters_stay_consistent() {
        let outcomes: Vec<bool> = (0..37).map(|i| i % 3 != 0).collect();
        let (progress, aborted) = run(&outcomes, &policy());

        assert!(!aborted);
        assert_eq!(progress.processed, progress.success + progress.fail);
        assert_eq!(progress.processed, 37);
    }

    #[test]
    fn twenty_consecutive_failures_abort() {
        let outcomes = vec![false; 30];
        let (progress, aborted) = run(&outcomes, &policy());

        assert!(aborted);
        assert_eq!(progress.processed, 20);
        assert_eq!(progress.fail, 20);
        assert_eq!(progress.success, 0);
    }

    #[test]
    fn a_success_resets_the_streak() {
        // 19 failures, one success, then more failures: never trips until
        // a fresh streak of 20 accumulates.
        let mut outcomes = vec![false; 19];
        outcomes.push(true);
        outcomes.extend(vec![false; 19]);

        let (progress, aborted) = run(&outcomes, &policy());

        assert!(!aborted);
        assert_eq!(progress.processed, 39);
        assert_eq!(progress.consecutive_failures, 19);
    }

    #[test]
    fn failures_checkpoint_immediately() {
        let progress = RunProgress::new();
        let (_, decision) = progress.step(false, &policy());
        assert_eq!(decision, StepDecision::Continue { checkpoint: true });
    }

    #[test]
    fn successes_checkpoint_on_cadence() {
        let mut progress = RunProgress::new();
        for i in 1..=10 {
            let (next, decision) = progress.step(true, &policy());
            progress = next;
            let expected = i == 10;
            assert_eq!(decision, StepDecision::Continue { checkpoint: expected });
        }
    }

    #[test]
    fn all_failed_requires_nonempty_run() {
        let progress = RunProgress { processed: 3, success: 0, fail: 3, consecutive_failures: 3 };
        assert!(progress.all_failed(3));
        assert!(!RunProgress::new().all_failed(0));
    }
}
