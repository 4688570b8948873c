//! Integration tests using wiremock to simulate HTTP servers.

use courier::{
    ApiError, BoxError, Client, ErrorCode, Payload, RequestDescriptor, RequestOptions,
    ResponseEnvelope, ResponseType, RetryPolicy, ShouldRetry,
};
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct User {
    id: u32,
    name: String,
}

fn client_for(server: &MockServer) -> Client {
    Client::builder()
        .base_url(server.uri())
        .unwrap()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_successful_get_request() {
    let mock_server = MockServer::start().await;

    let response_data = json!({"id": 1, "name": "Ann"});
    Mock::given(method("GET"))
        .and(path("/users/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&response_data))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let user: User = client
        .get("/users/1", RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(
        user,
        User {
            id: 1,
            name: "Ann".to_string()
        }
    );
}

#[tokio::test]
async fn test_successful_post_request() {
    let mock_server = MockServer::start().await;

    let response_data = json!({"id": 2, "name": "Bob"});
    Mock::given(method("POST"))
        .and(path("/users"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"name": "Bob"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(&response_data))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let created: User = client
        .post("/users", json!({"name": "Bob"}), RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(created.id, 2);
}

#[tokio::test]
async fn test_explicit_content_type_is_kept() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/notes/1"))
        .and(header("content-type", "text/markdown"))
        .and(body_string("# hello"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let options = RequestOptions::new()
        .header("Content-Type", "text/markdown")
        .unwrap();
    let result: Option<User> = client.put("/notes/1", "# hello", options).await.unwrap();

    assert_eq!(result, None);
}

#[tokio::test]
async fn test_http_error_is_returned_as_response() {
    let mock_server = MockServer::start().await;

    let response_data = json!({"error": "not found"});
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(&response_data))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let request = client.build_request(Method::GET, "/missing", None, RequestOptions::new());
    let response = client.send(request).await.unwrap();

    assert_eq!(response.status().as_u16(), 404);
    assert!(!response.ok());
    assert_eq!(response.attempts(), 1);
    assert_eq!(
        response.decode().await.unwrap(),
        Payload::Json(response_data)
    );
}

#[tokio::test]
async fn test_response_interceptor_converts_http_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    client
        .response_interceptors()
        .register_fn(|response: ResponseEnvelope| async move {
            if response.ok() {
                Ok(response)
            } else {
                Err(BoxError::from(response.to_error()))
            }
        });

    let err = client
        .get::<User>("/missing", RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), &ErrorCode::HttpError);
    assert_eq!(err.status(), 404);
    assert_eq!(err.message(), "HTTP 404: Not Found");
    assert!(err.response().is_some());
    assert!(!err.is_retryable());
    assert_eq!(err.to_json()["code"], "HTTP_ERROR");
}

#[tokio::test]
async fn test_deserialization_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_string("{not json"),
        )
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client
        .get::<User>("/users/1", RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), &ErrorCode::parse("json"));
    assert_eq!(err.code().to_string(), "JSON_PARSE_ERROR");
    assert_eq!(err.status(), 200);
    assert!(err.message().starts_with("Failed to parse response as"));
}

#[tokio::test]
async fn test_text_and_binary_decoding() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/readme"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .mount(&mock_server)
        .await;
    let png = vec![0x89u8, 0x50];
    Mock::given(method("GET"))
        .and(path("/logo"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(png, "image/png"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);

    let readme: String = client.get("/readme", RequestOptions::new()).await.unwrap();
    assert_eq!(readme, "hello");

    let request = client.build_request(Method::GET, "/logo", None, RequestOptions::new());
    let logo = client.fetch(request).await.unwrap();
    assert_eq!(logo.as_bytes().map(|b| b.to_vec()), Some(vec![0x89, 0x50]));

    let options = RequestOptions::new().response_type(ResponseType::Blob);
    let request = client.build_request(Method::GET, "/readme", None, options);
    let raw = client.fetch(request).await.unwrap();
    assert_eq!(raw.as_bytes().map(|b| b.to_vec()), Some(b"hello".to_vec()));
}

#[tokio::test]
async fn test_query_parameters() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("page", "1"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let users: Vec<User> = client
        .get(
            "/users",
            RequestOptions::new().param("page", 1).param("limit", 10),
        )
        .await
        .unwrap();

    assert!(users.is_empty());
}

#[tokio::test]
async fn test_default_and_per_call_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .and(header("x-app", "courier"))
        .and(header("accept", "text/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .base_url(mock_server.uri())
        .unwrap()
        .default_header("accept", "application/json")
        .unwrap()
        .build()
        .unwrap();
    client.set_header("x-app", "courier").unwrap();

    let options = RequestOptions::new()
        .header("Accept", "text/plain")
        .unwrap();
    let body: String = client.get("/test", options).await.unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_retry_on_5xx() {
    let mock_server = MockServer::start().await;
    let attempt_count = Arc::new(AtomicUsize::new(0));
    let attempt_count_clone = attempt_count.clone();
    let response_data = json!({"id": 1, "name": "Ann"});

    // First two requests fail with 500, third succeeds
    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(move |_req: &wiremock::Request| {
            let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
            if count < 2 {
                ResponseTemplate::new(500).set_body_string("Server error")
            } else {
                ResponseTemplate::new(200).set_body_json(&response_data)
            }
        })
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .base_url(mock_server.uri())
        .unwrap()
        .retry(RetryPolicy::new(3).delay(Duration::from_millis(10)))
        .build()
        .unwrap();

    let request = client.build_request(Method::GET, "/test", None, RequestOptions::new());
    let response = client.send(request).await.unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.attempts(), 3);
    assert!(response.was_retried());
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_max_retries_exceeded_returns_last_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let policy = RetryPolicy::new(2).delay(Duration::from_millis(10));
    let options = RequestOptions::new().retry(policy);
    let request = client.build_request(Method::GET, "/test", None, options);
    let response = client.send(request).await.unwrap();

    assert_eq!(response.status().as_u16(), 503);
    assert_eq!(response.attempts(), 3);
}

#[tokio::test]
async fn test_status_not_in_set_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let options = RequestOptions::new().retry(
        RetryPolicy::new(3)
            .delay(Duration::from_millis(10))
            .should_retry(ShouldRetry::statuses([503])),
    );
    let request = client.build_request(Method::GET, "/test", None, options);
    let response = client.send(request).await.unwrap();

    assert_eq!(response.status().as_u16(), 500);
    assert_eq!(response.attempts(), 1);
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // Nothing listens on port 1.
    let client = Client::builder()
        .base_url("http://127.0.0.1:1")
        .unwrap()
        .build()
        .unwrap();
    let err = client
        .get::<User>("/test", RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), &ErrorCode::NetworkError);
    assert_eq!(err.status(), 0);
    assert!(err.message().starts_with("Network error: "));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_interceptor_order() {
    let mock_server = MockServer::start().await;

    let response_data = json!({"id": 1, "name": "Ann"});
    Mock::given(method("GET"))
        .and(path("/test"))
        .and(header("x-step", "second"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&response_data))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let log = seen.clone();
    client
        .request_interceptors()
        .register_fn(move |request: RequestDescriptor| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push("request A");
                request
                    .with_header("x-step", "first")
                    .map_err(BoxError::from)
            }
        });
    let log = seen.clone();
    client
        .request_interceptors()
        .register_fn(move |request: RequestDescriptor| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push("request B");
                request
                    .with_header("x-step", "second")
                    .map_err(BoxError::from)
            }
        });
    let log = seen.clone();
    client
        .response_interceptors()
        .register_fn(move |response: ResponseEnvelope| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push("response");
                Ok::<_, BoxError>(response)
            }
        });

    let user: User = client.get("/test", RequestOptions::new()).await.unwrap();

    assert_eq!(user.id, 1);
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["request A", "request B", "response"]
    );
}

#[tokio::test]
async fn test_removed_interceptor_does_not_run() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let handle = client
        .request_interceptors()
        .register_fn(|_request: RequestDescriptor| async move {
            Err::<RequestDescriptor, BoxError>(
                ApiError::unknown("should have been removed", None).into(),
            )
        });
    client.request_interceptors().remove(handle);

    let body: String = client.get("/test", RequestOptions::new()).await.unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_all_http_methods() {
    let mock_server = MockServer::start().await;

    let response_data = json!({"id": 1, "name": "Ann"});
    for verb in ["GET", "POST", "PUT", "PATCH", "OPTIONS"] {
        Mock::given(method(verb))
            .and(path("/test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_data))
            .mount(&mock_server)
            .await;
    }
    Mock::given(method("DELETE"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-total", "3"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let body = json!({"name": "Ann"});

    let opts = RequestOptions::new;

    let _: User = client.get("/test", opts()).await.unwrap();
    let _: User = client.post("/test", body.clone(), opts()).await.unwrap();
    let _: User = client.put("/test", body.clone(), opts()).await.unwrap();
    let _: User = client.patch("/test", body, opts()).await.unwrap();
    let _: User = client.options("/test", opts()).await.unwrap();

    // 204 decodes to an empty payload, which fits `()` and `Option<T>`.
    client.delete::<()>("/test", opts()).await.unwrap();

    let head = client.head("/test", opts()).await.unwrap();
    assert!(head.is_empty());
}
