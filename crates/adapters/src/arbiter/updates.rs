use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use application::dispatch::Update;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Inactivity window on the socket. Keepalive pongs refresh it, so the
/// deadline only fires when the peer (or the path) is truly gone.
const READ_DEADLINE: Duration = Duration::from_secs(60);

/// Budget for writing a single keepalive ping.
const WRITE_DEADLINE: Duration = Duration::from_secs(10);

/// Persistent WebSocket subscription to the arbiter's push updates.
///
/// One owned connection per dial cycle: a failed read, write, or ping
/// tears the session down and the dial loop reconnects with exponential
/// backoff. Decoded updates are offered to a bounded channel; when the
/// channel is full the update is dropped with a warning rather than
/// blocking the read loop (the hourly pull reconciles).
pub struct UpdateChannel {
    host: String,
    insecure_skip_verify_tls: bool,
    auth_key: String,
    sensor_name: String,
    keepalive_period: Duration,
    tx: mpsc::Sender<Update>,
}

impl UpdateChannel {
    pub fn new(
        host: impl Into<String>,
        insecure_skip_verify_tls: bool,
        auth_key: impl Into<String>,
        sensor_name: impl Into<String>,
        keepalive_period: Duration,
        tx: mpsc::Sender<Update>,
    ) -> Self {
        Self {
            host: host.into(),
            insecure_skip_verify_tls,
            auth_key: auth_key.into(),
            sensor_name: sensor_name.into(),
            keepalive_period,
            tx,
        }
    }

    /// wss normally; plain ws when TLS verification is disabled.
    fn url(&self) -> String {
        let scheme = if self.insecure_skip_verify_tls {
            "ws"
        } else {
            "wss"
        };
        format!("{scheme}://{}/sync/ws/updates", self.host)
    }

    fn client_request(
        &self,
    ) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, String> {
        let mut request = self
            .url()
            .into_client_request()
            .map_err(|e| format!("invalid update channel URL: {e}"))?;
        let headers = request.headers_mut();
        headers.insert(
            "X_AUTH_KEY",
            HeaderValue::from_str(&self.auth_key).map_err(|e| e.to_string())?,
        );
        headers.insert(
            "X_SENSOR_NAME",
            HeaderValue::from_str(&self.sensor_name).map_err(|e| e.to_string())?,
        );
        Ok(request)
    }

    /// Dial loop: runs until cancelled, reconnecting with backoff
    /// 1 s → 2 s → 4 s … capped at 5 min, reset on every successful
    /// connection.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if shutdown.is_cancelled() {
                return;
            }

            let request = match self.client_request() {
                Ok(request) => request,
                Err(e) => {
                    // Bad host or credentials cannot self-heal; bail out.
                    tracing::error!(error = %e, "update channel misconfigured");
                    return;
                }
            };

            tracing::info!(url = %self.url(), "connecting to update channel");
            let connected = tokio::select! {
                () = shutdown.cancelled() => return,
                result = connect_async(request) => result,
            };

            match connected {
                Ok((stream, _response)) => {
                    tracing::info!("update channel connected");
                    backoff = INITIAL_BACKOFF;
                    self.session(stream, &shutdown).await;
                    if shutdown.is_cancelled() {
                        return;
                    }
                    tracing::warn!(retry_in = ?backoff, "update channel disconnected");
                }
                Err(e) => {
                    tracing::error!(error = %e, retry_in = ?backoff,
                        "update channel connection failed");
                }
            }

            tokio::select! {
                () = shutdown.cancelled() => return,
                () = tokio::time::sleep(backoff) => {}
            }
            backoff = next_backoff(backoff);
        }
    }

    /// Drive one connection until it fails or shutdown fires. The read
    /// deadline is re-armed on every inbound frame, pongs included; the
    /// keepalive tick sends a ping under a write deadline.
    async fn session(
        &self,
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        shutdown: &CancellationToken,
    ) {
        let (mut sink, mut reader) = stream.split();
        let mut ping = tokio::time::interval(self.keepalive_period);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ping.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
                _ = ping.tick() => {
                    match tokio::time::timeout(
                        WRITE_DEADLINE,
                        sink.send(Message::Ping(Vec::new())),
                    )
                    .await
                    {
                        Ok(Ok(())) => tracing::debug!("sent keepalive ping"),
                        Ok(Err(e)) => {
                            tracing::warn!(error = %e, "keepalive ping failed, closing");
                            return;
                        }
                        Err(_elapsed) => {
                            tracing::warn!("keepalive ping write deadline exceeded, closing");
                            return;
                        }
                    }
                }
                inbound = tokio::time::timeout(READ_DEADLINE, reader.next()) => {
                    let message = match inbound {
                        Err(_elapsed) => {
                            tracing::warn!("read deadline exceeded, closing connection");
                            return;
                        }
                        Ok(None) => {
                            tracing::warn!("update channel stream ended");
                            return;
                        }
                        Ok(Some(Err(e))) => {
                            tracing::error!(error = %e, "update channel read error");
                            return;
                        }
                        Ok(Some(Ok(message))) => message,
                    };

                    match message {
                        Message::Text(text) => self.offer(&text),
                        Message::Ping(payload) => {
                            let _ = sink.send(Message::Pong(payload)).await;
                        }
                        Message::Pong(_) => tracing::debug!("received pong"),
                        Message::Close(frame) => {
                            tracing::warn!(?frame, "update channel closed by peer");
                            return;
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Decode and enqueue one pushed message. Malformed payloads and a
    /// full channel both drop the message without disturbing the read
    /// loop.
    fn offer(&self, text: &str) {
        let update: Update = match serde_json::from_str(text) {
            Ok(update) => update,
            Err(e) => {
                tracing::error!(error = %e, payload = text, "failed to decode update");
                return;
            }
        };

        match self.tx.try_send(update) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(update)) => {
                tracing::warn!(kind = %update.kind, "update channel full, dropping update");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("update dispatcher gone, dropping update");
            }
        }
    }
}

/// Double, capped at five minutes.
fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}
