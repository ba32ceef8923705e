use std::sync::Arc;

use domain::arbiter::entity::{AlertEvent, Recommendation};
use domain::arbiter::error::ArbiterError;
use ports::secondary::submission_sink::SubmissionSink;

use crate::retry_queue::{RetryQueue, Submission};

/// Sends submissions through the sink, converting rate limits into retry
/// queue entries.
///
/// A 429 is reported as success to the caller: the submission is parked
/// and the evaluator must not stall or re-dedup on it.
pub struct Submitter {
    sink: Arc<dyn SubmissionSink>,
    queue: Arc<RetryQueue>,
}

impl Submitter {
    pub fn new(sink: Arc<dyn SubmissionSink>, queue: Arc<RetryQueue>) -> Self {
        Self { sink, queue }
    }

    pub async fn alert(&self, alert: AlertEvent) -> Result<(), ArbiterError> {
        match self.sink.send_alert(&alert).await {
            Err(e) if e.is_rate_limit() => {
                tracing::warn!(ip = %alert.ip, "alert rate limited, queuing for retry");
                self.queue.add(Submission::Alert(alert));
                Ok(())
            }
            other => other,
        }
    }

    pub async fn recommend(&self, recommendation: Recommendation) -> Result<(), ArbiterError> {
        match self.sink.send_recommendation(&recommendation).await {
            Err(e) if e.is_rate_limit() => {
                tracing::warn!(
                    ip = %recommendation.ip,
                    "recommendation rate limited, queuing for retry"
                );
                self.queue.add(Submission::Recommendation(recommendation));
                Ok(())
            }
            other => other,
        }
    }
}
