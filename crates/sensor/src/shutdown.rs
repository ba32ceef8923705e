use tokio_util::sync::CancellationToken;

/// Create the root cancellation token and arm it on SIGINT / SIGTERM.
/// Every spawned task observes a clone (or child) of this token.
pub fn install() -> CancellationToken {
    let token = CancellationToken::new();
    let armed = token.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("termination signal received, shutting down");
        armed.cancel();
    });

    token
}

async fn wait_for_signal() {
    let interrupt = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            () = interrupt => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    interrupt.await;
}
