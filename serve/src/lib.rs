//! HTTP ingress for Quill (axum).
//!
//! Two listeners: the webhook receiver (`POST /webhooks`, HMAC-validated,
//! bounded queue with overflow spill) and the health stack (`/health`,
//! `/ready`, `/metrics`) on a separate port.
//!
//! The receiver answers within its SLA by queueing only; a single drainer task
//! moves events from the queue into the worker pool where the real processing
//! happens.
//!
//! **Public API**: [`ReceiverState`], [`webhook_router`], [`run_on_listener`],
//! [`spawn_drainer`], [`health_router`], [`HealthState`].

mod app;
mod drainer;
mod health;
mod receiver;
mod signature;
mod stats;

pub use app::{webhook_router, ReceiverOptions, ReceiverState};
pub use drainer::spawn_drainer;
pub use health::{health_router, HealthState};
pub use signature::SignatureValidator;
pub use stats::{ReceiverStats, ReceiverStatsSnapshot};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Serves a router on an existing listener until `cancel` fires. Tests bind to
/// `127.0.0.1:0` and pass the listener in.
pub async fn run_on_listener(
    listener: TcpListener,
    router: axum::Router,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    tracing::info!("listening on http://{}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await?;
    Ok(())
}
