use std::future::Future;
use std::pin::Pin;

use domain::arbiter::entity::{AlertEvent, Recommendation};
use domain::arbiter::error::ArbiterError;

/// Secondary port for delivering alerts and recommendations to the
/// arbiter.
///
/// Uses `Pin<Box<dyn Future>>` return types (instead of RPITIT) so the
/// trait is dyn-compatible and can be shared as `Arc<dyn SubmissionSink>`.
pub trait SubmissionSink: Send + Sync {
    /// POST an alert. A 429 surfaces as `ArbiterError::RateLimited`.
    fn send_alert<'a>(
        &'a self,
        alert: &'a AlertEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ArbiterError>> + Send + 'a>>;

    /// POST a block recommendation. A 429 surfaces as
    /// `ArbiterError::RateLimited`.
    fn send_recommendation<'a>(
        &'a self,
        recommendation: &'a Recommendation,
    ) -> Pin<Box<dyn Future<Output = Result<(), ArbiterError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummySink;

    impl SubmissionSink for DummySink {
        fn send_alert<'a>(
            &'a self,
            _alert: &'a AlertEvent,
        ) -> Pin<Box<dyn Future<Output = Result<(), ArbiterError>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }

        fn send_recommendation<'a>(
            &'a self,
            _recommendation: &'a Recommendation,
        ) -> Pin<Box<dyn Future<Output = Result<(), ArbiterError>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn submission_sink_is_dyn_compatible() {
        let sink: Box<dyn SubmissionSink> = Box::new(DummySink);
        let _ = sink;
    }

    #[tokio::test]
    async fn dummy_sink_accepts_submissions() {
        use domain::common::entity::{Direction, Origin};

        let sink = DummySink;
        let alert = AlertEvent {
            ip_type: Direction::Source,
            ip: "1.2.3.4".to_string(),
            related_ip: "5.6.7.8".to_string(),
            origin: Origin::interface("eth0"),
        };
        assert!(sink.send_alert(&alert).await.is_ok());
    }
}
