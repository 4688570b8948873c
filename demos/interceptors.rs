//! Example demonstrating request and response interceptors.
//!
//! This example shows how to:
//! - Add an auth header to every request
//! - Turn non-2xx responses into `HTTP_ERROR`s
//! - Remove an interceptor by handle
//! - Write a stateful interceptor
//!
//! Run with: `cargo run --example interceptors`

use async_trait::async_trait;
use courier::{
    BoxError, Client, ErrorCode, Interceptor, RequestDescriptor, RequestOptions, ResponseEnvelope,
};
use std::sync::atomic::{AtomicU64, Ordering};

/// Tags each request with a sequence number.
#[derive(Default)]
struct RequestCounter {
    next: AtomicU64,
}

#[async_trait]
impl Interceptor<RequestDescriptor> for RequestCounter {
    async fn intercept(
        &self,
        request: RequestDescriptor,
    ) -> Result<RequestDescriptor, BoxError> {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(request.with_header("x-request-seq", n.to_string())?)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("courier=debug,interceptors=info")
        .init();

    let client = Client::builder().base_url("https://httpbin.org")?.build()?;

    client
        .request_interceptors()
        .register(RequestCounter::default());
    let auth = client
        .request_interceptors()
        .register_fn(|request: RequestDescriptor| async move {
            request
                .with_header("authorization", "Bearer demo-token")
                .map_err(BoxError::from)
        });
    client
        .response_interceptors()
        .register_fn(|response: ResponseEnvelope| async move {
            if response.ok() {
                Ok(response)
            } else {
                Err(BoxError::from(response.to_error()))
            }
        });

    println!("=== Headers Added By Interceptors ===");
    let echoed: serde_json::Value = client.get("/headers", RequestOptions::new()).await?;
    println!("{}", serde_json::to_string_pretty(&echoed["headers"])?);
    println!();

    println!("=== Non-2xx Responses Become Errors ===");
    let result = client
        .get::<serde_json::Value>("/status/404", RequestOptions::new())
        .await;
    match result {
        Ok(_) => println!("Unexpected success"),
        Err(e) if *e.code() == ErrorCode::HttpError => {
            println!("{} -> {}", e.status(), e.to_json());
        }
        Err(e) => println!("Other error: {}", e),
    }
    println!();

    println!("=== Removing An Interceptor ===");
    client.request_interceptors().remove(auth);
    let echoed: serde_json::Value = client.get("/headers", RequestOptions::new()).await?;
    println!("Authorization: {}", echoed["headers"]["Authorization"]);

    Ok(())
}
