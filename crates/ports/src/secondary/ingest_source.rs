use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

/// Contract for ingest adapters (interface capture, syslog server).
///
/// `run` executes the adapter until `shutdown` fires; it must exit cleanly
/// within its next I/O deadline after cancellation and must never panic
/// the supervisor — internal failures are logged and the future resolves.
pub trait IngestSource: Send + Sync {
    /// Stable name used in supervisor logs.
    fn name(&self) -> &'static str;

    fn run(
        &self,
        shutdown: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct IdleSource;

    impl IngestSource for IdleSource {
        fn name(&self) -> &'static str {
            "idle"
        }

        fn run(
            &self,
            shutdown: CancellationToken,
        ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            Box::pin(async move { shutdown.cancelled().await })
        }
    }

    #[tokio::test]
    async fn source_exits_on_cancellation() {
        let source = IdleSource;
        let token = CancellationToken::new();
        token.cancel();
        source.run(token).await;
    }

    #[test]
    fn ingest_source_is_dyn_compatible() {
        let source: Box<dyn IngestSource> = Box::new(IdleSource);
        assert_eq!(source.name(), "idle");
    }
}
