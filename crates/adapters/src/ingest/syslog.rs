use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use application::evaluator::Evaluator;
use domain::common::entity::Origin;
use ports::secondary::ingest_source::IngestSource;

use super::syslog_parse::infer_pair;

const MAX_DATAGRAM: usize = 8 * 1024;

/// Syslog ingest adapter: listens on UDP and TCP, extracts (src, dst)
/// pairs from message bodies, and hands surviving pairs to the evaluator
/// with a `syslog` origin naming the sending peer.
pub struct SyslogServer {
    listen_addr: String,
    port: u16,
    evaluator: Arc<Evaluator>,
}

impl SyslogServer {
    pub fn new(listen_addr: impl Into<String>, port: u16, evaluator: Arc<Evaluator>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            port,
            evaluator,
        }
    }

    fn handle_message(evaluator: &Arc<Evaluator>, message: &str, peer: &str) {
        let Some((src, dst)) = infer_pair(message) else {
            tracing::debug!(peer, "no usable source/destination in message");
            return;
        };
        Arc::clone(evaluator).spawn_pair(src, dst, Origin::syslog(peer.to_string()));
    }

    async fn serve(
        evaluator: Arc<Evaluator>,
        udp: UdpSocket,
        tcp: TcpListener,
        shutdown: CancellationToken,
    ) {
        let connections = TaskTracker::new();
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,

                received = udp.recv_from(&mut buf) => {
                    match received {
                        Ok((len, peer)) => {
                            let message = String::from_utf8_lossy(&buf[..len]);
                            Self::handle_message(
                                &evaluator,
                                message.as_ref(),
                                &peer.ip().to_string(),
                            );
                        }
                        Err(e) => tracing::warn!(error = %e, "udp receive failed"),
                    }
                }

                accepted = tcp.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let evaluator = Arc::clone(&evaluator);
                            let shutdown = shutdown.clone();
                            connections.spawn(async move {
                                let peer_ip = peer.ip().to_string();
                                let mut lines = BufReader::new(stream).lines();
                                loop {
                                    tokio::select! {
                                        () = shutdown.cancelled() => break,
                                        line = lines.next_line() => match line {
                                            Ok(Some(line)) => Self::handle_message(
                                                &evaluator, &line, &peer_ip,
                                            ),
                                            Ok(None) => break,
                                            Err(e) => {
                                                tracing::debug!(error = %e, peer = %peer_ip,
                                                    "tcp syslog read failed");
                                                break;
                                            }
                                        }
                                    }
                                }
                            });
                        }
                        Err(e) => tracing::warn!(error = %e, "tcp accept failed"),
                    }
                }
            }
        }

        connections.close();
        connections.wait().await;
        tracing::info!("syslog server exited cleanly");
    }
}

impl IngestSource for SyslogServer {
    fn name(&self) -> &'static str {
        "syslog"
    }

    fn run(
        &self,
        shutdown: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let bind = format!("{}:{}", self.listen_addr, self.port);

            let udp = match UdpSocket::bind(&bind).await {
                Ok(socket) => socket,
                Err(e) => {
                    tracing::error!(address = %bind, error = %e, "udp bind failed");
                    return;
                }
            };
            let tcp = match TcpListener::bind(&bind).await {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::error!(address = %bind, error = %e, "tcp bind failed");
                    return;
                }
            };

            tracing::info!(address = %bind, "syslog server listening (udp+tcp)");
            Self::serve(Arc::clone(&self.evaluator), udp, tcp, shutdown).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use domain::arbiter::entity::SyncSettings;
    use domain::score::entity::ScoreRecord;
    use ports::secondary::score_store::ScoreStore;
    use ports::secondary::submission_sink::SubmissionSink;
    use ports::test_utils::{MemoryScoreStore, RecordingSink};

    use application::decisions::DecisionService;
    use application::dedup::RecommendationCache;
    use application::policies::PolicyTable;
    use application::retry_queue::RetryQueue;
    use application::scores::ReputationService;
    use application::settings::SharedSettings;
    use application::submitter::Submitter;
    use application::whitelist::WhitelistService;

    fn evaluator(records: Vec<ScoreRecord>, threshold: i32) -> (Arc<RecordingSink>, Arc<Evaluator>) {
        let store = Arc::new(MemoryScoreStore::with_records(records));
        let scores = Arc::new(ReputationService::new(store as Arc<dyn ScoreStore>, 64));
        let policies = Arc::new(PolicyTable::new());
        let decisions = Arc::new(DecisionService::new(scores, Arc::clone(&policies)));
        let whitelist = Arc::new(WhitelistService::new());
        let dedup = Arc::new(RecommendationCache::new(100));
        let sink = Arc::new(RecordingSink::new());
        let queue = Arc::new(RetryQueue::new(
            Arc::clone(&sink) as Arc<dyn SubmissionSink>
        ));
        let submitter = Arc::new(Submitter::new(
            Arc::clone(&sink) as Arc<dyn SubmissionSink>,
            queue,
        ));
        let settings = SharedSettings::new(SyncSettings {
            alert_threshold: threshold,
            sniff_traffic: false,
            run_syslog: true,
        });
        let evaluator = Arc::new(Evaluator::new(
            decisions, whitelist, dedup, submitter, settings,
        ));
        (sink, evaluator)
    }

    #[tokio::test]
    async fn udp_message_reaches_the_evaluator() {
        let (sink, evaluator) = evaluator(
            vec![ScoreRecord::new("203.0.113.9", 90, Utc::now())],
            50,
        );

        let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let udp_addr = udp.local_addr().unwrap();
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = CancellationToken::new();

        let server = tokio::spawn(SyslogServer::serve(
            Arc::clone(&evaluator),
            udp,
            tcp,
            shutdown.clone(),
        ));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(
                b"deny tcp src=203.0.113.9 dst=198.51.100.4 dpt=22",
                udp_addr,
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), server)
            .await
            .unwrap()
            .unwrap();

        // Source side crossed the threshold; exactly one alert.
        let alerts = sink.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].ip, "203.0.113.9");
        assert_eq!(alerts[0].related_ip, "198.51.100.4");
        assert_eq!(alerts[0].origin.source_name, "127.0.0.1");
    }

    #[tokio::test]
    async fn tcp_lines_reach_the_evaluator() {
        let (sink, evaluator) = evaluator(
            vec![ScoreRecord::new("198.51.100.4", 80, Utc::now())],
            50,
        );

        let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let tcp_addr = tcp.local_addr().unwrap();
        let shutdown = CancellationToken::new();

        let server = tokio::spawn(SyslogServer::serve(
            Arc::clone(&evaluator),
            udp,
            tcp,
            shutdown.clone(),
        ));

        use tokio::io::AsyncWriteExt;
        let mut stream = tokio::net::TcpStream::connect(tcp_addr).await.unwrap();
        stream
            .write_all(b"conn 203.0.113.9(1024) -> 198.51.100.4(443)\n")
            .await
            .unwrap();
        stream.shutdown().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), server)
            .await
            .unwrap()
            .unwrap();

        // Destination side is the scored one here.
        let alerts = sink.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].ip, "198.51.100.4");
    }

    #[tokio::test]
    async fn unusable_message_produces_nothing() {
        let (sink, evaluator) = evaluator(vec![], 50);
        SyslogServer::handle_message(&evaluator, "link flap on eth0", "10.0.0.1");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sink.alert_count(), 0);
        assert_eq!(sink.recommendation_count(), 0);
    }
}
