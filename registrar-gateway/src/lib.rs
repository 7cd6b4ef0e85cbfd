//! HTTP registration gateway and its job queue.
//!
//! Clients `POST /register` a resource type and URL with a bearer token.
//! The gateway queues a [`RegistrationJob`] under a fresh [`JobId`] and
//! waits for a worker to report the outcome, answering 200 on success,
//! 400 on failure or timeout and 401 when the token is unusable.
//!
//! Workers drain the same [`JobQueue`] with [`process_next`] or
//! [`run_worker`].

pub mod auth;
mod error;
pub mod job;
pub mod queue;
pub mod routes;
mod server;
pub mod waiter;
pub mod worker;

pub use auth::{AuthError, authorize};
pub use error::{GatewayError, Message};
pub use job::{JobId, RegistrationJob, normalize_item_url};
#[cfg(feature = "queue-redis")]
pub use queue::{QueueKeys, RedisJobQueue};
pub use queue::{DEFAULT_RETAINED_OUTCOMES, JobOutcome, JobQueue, MemoryJobQueue, QueueError};
pub use routes::{AppState, RegisterRequest, router};
pub use server::serve;
pub use waiter::{Completion, CompletionWaiter};
pub use worker::{process_next, run_worker};
