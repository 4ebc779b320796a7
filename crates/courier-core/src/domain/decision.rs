//! Decision model: what the worker does with a job after one send.
//!
//! The decider is a pure function of the job, the outcome and the retry
//! policy. Executing the decision (feedback, ack, requeue) is the worker's job.

use std::time::Duration;

use super::feedback::TokenFeedback;
use super::job::PushJob;
use super::outcome::DeliveryOutcome;
use crate::queue::RetryPolicy;

/// The next action for a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Terminal; remove the job.
    Ack,

    /// Terminal; record the token feedback, then remove the job.
    AckWithFeedback(TokenFeedback),

    /// Transient failure within budget; requeue with `attempt` after `delay`.
    Retry { attempt: u32, delay: Duration },

    /// Terminal failure with no actionable signal for the caller; remove the job.
    Drop { reason: String },
}

/// Default decider: feedback for token lifecycle outcomes, exponential
/// backoff for transient failures, drop when the attempt budget runs out.
#[derive(Debug, Clone)]
pub struct DeliveryDecider {
    retry_policy: RetryPolicy,
}

impl DeliveryDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }

    pub fn decide(&self, job: &PushJob, outcome: &DeliveryOutcome) -> Decision {
        match outcome {
            DeliveryOutcome::Delivered => Decision::Ack,
            DeliveryOutcome::InvalidToken => Decision::AckWithFeedback(TokenFeedback::invalid(
                job.service.clone(),
                job.token.clone(),
            )),
            DeliveryOutcome::TokenReplaced(replacement) => {
                Decision::AckWithFeedback(TokenFeedback::replaced(
                    job.service.clone(),
                    job.token.clone(),
                    replacement.clone(),
                ))
            }
            DeliveryOutcome::PermanentFailure(reason) => Decision::Drop {
                reason: reason.clone(),
            },
            DeliveryOutcome::TransientFailure(reason) => {
                let attempt = job.attempt.saturating_add(1);
                if self.retry_policy.is_exceeded(attempt) {
                    Decision::Drop {
                        reason: format!(
                            "retry budget of {} exceeded after {attempt} transient failures: {reason}",
                            self.retry_policy.max_attempts
                        ),
                    }
                } else {
                    Decision::Retry {
                        attempt,
                        delay: self.retry_policy.next_delay(attempt),
                    }
                }
            }
        }
    }
}
