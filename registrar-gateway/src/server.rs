use std::io;

use tokio::net::TcpListener;
use tracing::info;

use crate::routes::{AppState, router};

/// Serve the gateway on `listener` until Ctrl+C is received.
pub async fn serve(listener: TcpListener, state: AppState) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("registration gateway listening on {addr}");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down registration gateway");
    }
}
