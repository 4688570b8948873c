//! Example demonstrating retry policies, timeouts and cancellation.
//!
//! This example shows how to:
//! - Retry with a bare count and the default status list
//! - Configure delays, a ceiling and a custom status list
//! - Retry with a custom predicate
//! - Cancel a call that is waiting between attempts
//!
//! Run with: `cargo run --example retry_strategies`

use courier::{AbortController, AttemptFailure, Client, RequestOptions, RetryPolicy, ShouldRetry};
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("courier=info,retry_strategies=info")
        .init();

    let client = Client::builder()
        .base_url("https://httpbin.org")?
        .timeout(Duration::from_secs(5))
        .build()?;

    println!("=== Bare Retry Count ===");
    println!("Up to 2 retries on 408/429/500/502/503/504, 1s then 2s apart");
    let start = Instant::now();
    let request = client.build_request(
        http::Method::GET,
        "/status/503",
        None,
        RequestOptions::new().retry(2),
    );
    let response = client.send(request).await?;
    println!(
        "Gave up with {} after {} attempts in {:?}",
        response.status(),
        response.attempts(),
        start.elapsed()
    );
    println!();

    println!("=== Custom Delay and Status List ===");
    let policy = RetryPolicy::new(3)
        .delay(Duration::from_millis(100))
        .max_delay(Duration::from_millis(250))
        .should_retry(ShouldRetry::statuses([500]));
    let request = client.build_request(
        http::Method::GET,
        "/status/500",
        None,
        RequestOptions::new().retry(policy),
    );
    let response = client.send(request).await?;
    println!("Attempts: {}", response.attempts());
    println!();

    println!("=== Custom Predicate ===");
    println!("Retry connection failures only, never HTTP statuses");
    let policy = RetryPolicy::new(3)
        .delay(Duration::from_millis(100))
        .should_retry(ShouldRetry::predicate(|failure, attempt| {
            println!("  attempt {} failed: {:?}", attempt + 1, failure.status());
            matches!(failure, AttemptFailure::Error(_))
        }));
    let request = client.build_request(
        http::Method::GET,
        "/status/502",
        None,
        RequestOptions::new().retry(policy),
    );
    let response = client.send(request).await?;
    println!("Attempts: {}", response.attempts());
    println!();

    println!("=== Timeouts Are Not Retried ===");
    let options = RequestOptions::new()
        .timeout(Duration::from_millis(500))
        .retry(3);
    match client.get::<serde_json::Value>("/delay/3", options).await {
        Ok(_) => println!("Unexpected success"),
        Err(e) => println!("{} ({}): {}", e.code(), e.status(), e),
    }
    println!();

    println!("=== Cancelling During Backoff ===");
    let controller = AbortController::new();
    let options = RequestOptions::new()
        .retry(RetryPolicy::new(5).delay(Duration::from_secs(2)))
        .abort_signal(controller.signal());
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        controller.abort();
    });
    let result = client.get::<serde_json::Value>("/status/503", options);
    match result.await {
        Ok(_) => println!("Unexpected success"),
        Err(e) => println!("{}: {}", e.code(), e),
    }

    Ok(())
}
