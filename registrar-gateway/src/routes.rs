//! HTTP surface of the registration gateway.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    auth::authorize,
    error::{GatewayError, Message},
    job::RegistrationJob,
    queue::JobQueue,
    waiter::{Completion, CompletionWaiter},
};

/// Shared state handed to every request.
#[derive(Clone)]
pub struct AppState {
    queue: Arc<dyn JobQueue>,
    waiter: CompletionWaiter,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("waiter", &self.waiter)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Serve registrations through `queue`, waiting as `waiter` dictates.
    #[must_use]
    pub fn new(queue: Arc<dyn JobQueue>, waiter: CompletionWaiter) -> Self {
        Self { queue, waiter }
    }

    /// Queue shared with the workers.
    #[must_use]
    pub fn queue(&self) -> Arc<dyn JobQueue> {
        Arc::clone(&self.queue)
    }
}

/// JSON body of `POST /register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Declared resource type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Resource location.
    pub url: String,
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/register", post(register))
        .route("/register/", post(register))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn status() -> Json<Message> {
    Json(Message::new("status: ok"))
}

async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<Message>, GatewayError> {
    let audience = authorize(&headers)?;
    let Json(request) = body.map_err(|err| GatewayError::InvalidRequest(err.body_text()))?;
    let job = RegistrationJob::new(request.kind, &request.url, Utc::now());
    info!(job = %job.id, kind = %job.kind, url = %job.url, %audience, "queued registration");

    // Detached so a client disconnect does not cancel the wait.
    let AppState { queue, waiter } = state;
    let waiting = tokio::spawn(async move {
        queue.enqueue(&job).await?;
        let completion = waiter.wait(queue.as_ref(), job.id).await?;
        Ok::<_, GatewayError>((job, completion))
    });
    let (job, completion) = waiting.await??;

    match completion {
        Completion::Succeeded => {
            info!(job = %job.id, url = %job.url, "registration succeeded");
            Ok(Json(Message::new(format!(
                "Item '{}' was successfully registered",
                job.url
            ))))
        }
        Completion::Failed => {
            warn!(job = %job.id, url = %job.url, "registration failed");
            Err(GatewayError::RegistrationFailed { url: job.url })
        }
        Completion::TimedOut => {
            warn!(job = %job.id, url = %job.url, "registration timed out");
            Err(GatewayError::TimedOut { url: job.url })
        }
    }
}
