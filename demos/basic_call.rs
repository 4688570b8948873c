//! Basic example demonstrating simple GET and POST requests.
//!
//! This example shows how to:
//! - Create a client with a base URL and default headers
//! - Make GET requests with query parameters
//! - Make POST requests with a JSON body
//! - Inspect the undecoded response envelope
//!
//! Run with: `cargo run --example basic_call`

use courier::{Body, Client, RequestOptions};
use http::Method;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("courier=debug,basic_call=info")
        .init();

    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .timeout(Duration::from_secs(10))
        .default_header("accept", "application/json")?
        .build()?;

    println!("=== GET Request Example ===");
    let post: Post = client.get("/posts/1", RequestOptions::new()).await?;
    println!("Post ID: {}", post.id);
    println!("Title: {}", post.title);
    println!();

    println!("=== GET With Query Parameters ===");
    let posts: Vec<Post> = client
        .get("/posts", RequestOptions::new().param("userId", 1))
        .await?;
    println!("User 1 has {} posts", posts.len());
    println!();

    println!("=== POST Request Example ===");
    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };
    let created: Post = client
        .post("/posts", Body::json(&new_post)?, RequestOptions::new())
        .await?;
    println!("Created post ID: {}", created.id);
    println!();

    println!("=== Accessing Response Metadata ===");
    let request = client.build_request(Method::GET, "/posts/2", None, RequestOptions::new());
    let response = client.send(request).await?;
    println!(
        "Status: {} {}",
        response.status().as_u16(),
        response.status_text()
    );
    println!("Content-Type: {:?}", response.header("content-type"));
    println!("Latency: {:?}", response.latency());
    println!("Was retried: {}", response.was_retried());
    println!("Payload: {:?}", response.decode().await?);

    Ok(())
}
