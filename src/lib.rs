//! # Courier - a fetch-style HTTP client with retries and interceptors
//!
//! Courier wraps an async transport (by default `reqwest`) with per-attempt
//! timeouts, exponential backoff with jitter, caller-driven cancellation,
//! content-type aware response decoding and ordered interceptor pipelines.
//! Every failure surfaces as a single [`ApiError`] carrying a stable
//! [`ErrorCode`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use courier::{Body, Client, RequestOptions, RetryPolicy};
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize)]
//! struct CreateUser {
//!     name: String,
//!     email: String,
//! }
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//!     email: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .base_url("https://api.example.com")?
//!         .timeout(Duration::from_secs(30))
//!         .retry(RetryPolicy::new(3).delay(Duration::from_millis(100)))
//!         .build()?;
//!
//!     let user: User = client.get("/users/123", RequestOptions::new()).await?;
//!     println!("User: {}", user.name);
//!
//!     let new_user = CreateUser {
//!         name: "Alice".to_string(),
//!         email: "alice@example.com".to_string(),
//!     };
//!     let created: User = client
//!         .post("/users", Body::json(&new_user)?, RequestOptions::new())
//!         .await?;
//!     println!("Created user with ID: {}", created.id);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Per-attempt timeouts** - each attempt gets its own deadline; an elapsed deadline ends the call with `TIMEOUT`
//! - **Retries with backoff** - exponential delays with jitter, driven by a status list or a custom predicate
//! - **Cancellation** - an [`AbortSignal`] ends the call, including any pending backoff wait
//! - **Auto-decoding** - JSON, text or bytes picked from the response's `Content-Type`
//! - **Interceptors** - ordered, removable transforms over outgoing requests and incoming responses
//! - **Structured logging** - attempts, retries and responses are logged with `tracing`
//!
//! ## Error Handling
//!
//! Non-2xx responses are returned as values, not errors. Inspect the status
//! with [`Client::send`], or install a response interceptor that converts
//! them:
//!
//! ```no_run
//! use courier::{Client, ErrorCode, RequestOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let client = Client::builder().base_url("https://api.example.com")?.build()?;
//! match client.get::<serde_json::Value>("/endpoint", RequestOptions::new()).await {
//!     Ok(value) => println!("Success: {value}"),
//!     Err(e) if *e.code() == ErrorCode::Timeout => eprintln!("Timed out: {e}"),
//!     Err(e) if e.code().is_parse_error() => eprintln!("Bad payload ({}): {e}", e.status()),
//!     Err(e) => eprintln!("Other error: {}", e.to_json()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Retry Policies
//!
//! ```no_run
//! use courier::{AttemptFailure, Client, RetryPolicy, ShouldRetry};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), courier::ConfigError> {
//! let client = Client::builder()
//!     .base_url("https://api.example.com")?
//!     .retry(
//!         RetryPolicy::new(5)
//!             .delay(Duration::from_millis(100))
//!             .max_delay(Duration::from_secs(10))
//!             .should_retry(ShouldRetry::predicate(|failure, _attempt| match failure {
//!                 AttemptFailure::Response(head) => head.status.is_server_error(),
//!                 AttemptFailure::Error(_) => true,
//!             })),
//!     )
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod abort;
mod client;
mod error;
mod executor;
mod interceptor;
mod request;
mod response;
pub mod retry;
mod transport;

pub use abort::{AbortController, AbortSignal};
pub use client::{Client, ClientBuilder};
pub use error::{ApiError, ConfigError, ErrorCode, Result};
pub use executor::{RequestExecutor, SendOutcome};
pub use interceptor::{BoxError, Interceptor, InterceptorChain, InterceptorError};
pub use request::{Body, RequestDescriptor, RequestOptions, ResponseType};
pub use response::{Payload, ResponseEnvelope};
pub use retry::{
    AndPredicate, AttemptFailure, OrPredicate, Retry, RetryPolicy, RetryPredicate, RetrySettings,
    ShouldRetry,
};
pub use transport::{
    ReqwestTransport, ResponseBody, ResponseHead, Transport, TransportError, TransportRequest,
    TransportResponse,
};
