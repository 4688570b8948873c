//! Request execution: URL and body building, and the retry loop.
//!
//! A [`RequestExecutor`] owns one [`RequestDescriptor`] for the lifetime of
//! one call. [`RequestExecutor::send`] drives attempts `0..=max_retries`:
//!
//! - each attempt races the transport against its own deadline (if a
//!   timeout is configured) and the caller's abort signal (if any);
//! - a non-2xx response is retried while attempts remain and the retry
//!   decision accepts it, otherwise it is returned as-is;
//! - an elapsed deadline ends the call with `TIMEOUT`;
//! - an abort ends the call with `ABORTED`;
//! - any other transport error is retried while attempts remain and the
//!   retry decision accepts it, otherwise it ends the call with
//!   `NETWORK_ERROR`.
//!
//! Non-2xx responses are never turned into errors here; that is left to
//! response interceptors or the caller.

use crate::error::{ApiError, Result};
use crate::request::{Body, RequestDescriptor};
use crate::retry::{AttemptFailure, RetrySettings};
use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// The transport response a call settled on, and how many attempts it took.
#[derive(Debug)]
pub struct SendOutcome {
    pub response: TransportResponse,
    /// Total attempts made, starting at 1.
    pub attempts: u32,
}

enum AttemptResult {
    Response(TransportResponse),
    Failed(TransportError),
    TimedOut,
    Aborted,
}

/// Executes one call against a [`Transport`].
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    request: Arc<RequestDescriptor>,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl RequestExecutor {
    /// Builds the outgoing headers and body for `request`.
    pub fn new(transport: Arc<dyn Transport>, request: impl Into<Arc<RequestDescriptor>>) -> Self {
        let request = request.into();
        let mut headers = request.headers.clone();
        let body = build_body(&request.method, request.body.as_ref(), &mut headers);
        Self {
            transport,
            request,
            headers,
            body,
        }
    }

    /// The descriptor this executor was built from.
    pub fn request(&self) -> &Arc<RequestDescriptor> {
        &self.request
    }

    /// Headers sent with every attempt.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Encoded body sent with every attempt.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// The target URL with query parameters applied.
    pub fn url(&self) -> Result<Url> {
        self.request.resolve_url().map_err(|e| {
            ApiError::unknown(
                format!("Invalid request URL `{}`: {}", self.request.url, e),
                Some(Arc::clone(&self.request)),
            )
        })
    }

    /// The retry settings resolved from the descriptor's policy.
    pub fn retry_settings(&self) -> RetrySettings {
        RetrySettings::resolve(self.request.retry.as_ref())
    }

    /// Runs the attempt loop until a response is accepted or the call fails.
    pub async fn send(&self) -> Result<SendOutcome> {
        let settings = self.retry_settings();
        let url = self.url()?;
        let method = &self.request.method;
        let mut last_error = None;

        for attempt in 0..=settings.max_retries {
            let retries_left = attempt < settings.max_retries;

            tracing::debug!(
                method = %method,
                url = %url,
                attempt = attempt + 1,
                max_attempts = settings.max_attempts(),
                "Executing HTTP request"
            );

            let transport_request = TransportRequest {
                method: method.clone(),
                url: url.clone(),
                headers: self.headers.clone(),
                body: self.body.clone(),
            };

            match self.attempt(transport_request).await {
                AttemptResult::Response(response) => {
                    let retry = !response.head.ok()
                        && retries_left
                        && settings
                            .should_retry
                            .should_retry(&AttemptFailure::Response(&response.head), attempt);

                    if !retry {
                        return Ok(SendOutcome {
                            response,
                            attempts: attempt + 1,
                        });
                    }

                    let delay = settings.delay_for_attempt(attempt);
                    tracing::warn!(
                        status = response.status().as_u16(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis(),
                        "Retrying request after delay"
                    );
                    last_error = Some(ApiError::from_response(
                        &response.head,
                        Some(Arc::clone(&self.request)),
                    ));
                    drop(response);
                    self.wait(delay).await?;
                }
                AttemptResult::TimedOut => {
                    tracing::warn!(
                        method = %method,
                        url = %url,
                        attempt = attempt + 1,
                        "Request timed out"
                    );
                    return Err(ApiError::from_timeout(Some(Arc::clone(&self.request))));
                }
                AttemptResult::Aborted => {
                    return Err(ApiError::from_abort(Some(Arc::clone(&self.request))));
                }
                AttemptResult::Failed(TransportError::Aborted) => {
                    return Err(ApiError::from_abort(Some(Arc::clone(&self.request))));
                }
                AttemptResult::Failed(error) => {
                    let retry = retries_left
                        && settings
                            .should_retry
                            .should_retry(&AttemptFailure::Error(&error), attempt);

                    if !retry {
                        tracing::warn!(
                            error = %error,
                            attempt = attempt + 1,
                            method = %method,
                            url = %url,
                            "Request failed"
                        );
                        return Err(ApiError::from_network_error(
                            error,
                            Some(Arc::clone(&self.request)),
                        ));
                    }

                    let delay = settings.delay_for_attempt(attempt);
                    tracing::warn!(
                        error = %error,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis(),
                        "Retrying request after delay"
                    );
                    last_error = Some(ApiError::from_network_error(
                        error,
                        Some(Arc::clone(&self.request)),
                    ));
                    self.wait(delay).await?;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ApiError::unknown(
                "Request failed without a recorded error",
                Some(Arc::clone(&self.request)),
            )
        }))
    }

    /// One transport invocation, raced against the deadline and the abort signal.
    async fn attempt(&self, request: TransportRequest) -> AttemptResult {
        let fetch = self.transport.fetch(request);
        let deadline = async {
            match self.request.timeout {
                Some(timeout) => tokio::time::timeout(timeout, fetch).await.ok(),
                None => Some(fetch.await),
            }
        };
        let aborted = async {
            match &self.request.abort_signal {
                Some(signal) => signal.aborted().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = aborted => AttemptResult::Aborted,
            outcome = deadline => match outcome {
                Some(Ok(response)) => AttemptResult::Response(response),
                Some(Err(error)) => AttemptResult::Failed(error),
                None => AttemptResult::TimedOut,
            },
        }
    }

    /// Backoff wait between attempts. An abort cuts it short.
    async fn wait(&self, delay: Duration) -> Result<()> {
        match &self.request.abort_signal {
            Some(signal) => tokio::select! {
                _ = signal.aborted() => Err(ApiError::from_abort(Some(Arc::clone(&self.request)))),
                _ = tokio::time::sleep(delay) => Ok(()),
            },
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

/// Encodes the request body, adjusting `Content-Type` where the encoding implies one.
fn build_body(method: &Method, body: Option<&Body>, headers: &mut HeaderMap) -> Option<Bytes> {
    if *method == Method::GET || *method == Method::HEAD {
        return None;
    }

    match body? {
        Body::Text(text) => Some(Bytes::from(text.clone())),
        Body::Bytes(bytes) => Some(bytes.clone()),
        Body::Form(pairs) => {
            set_default_content_type(headers, "application/x-www-form-urlencoded");
            let mut encoded = url::form_urlencoded::Serializer::new(String::new());
            for (key, value) in pairs {
                encoded.append_pair(key, value);
            }
            Some(Bytes::from(encoded.finish()))
        }
        Body::Json(Value::Null) => None,
        Body::Json(value @ (Value::Object(_) | Value::Array(_))) => {
            set_default_content_type(headers, "application/json");
            Some(Bytes::from(value.to_string()))
        }
        Body::Json(Value::String(text)) => Some(Bytes::from(text.clone())),
        Body::Json(scalar) => Some(Bytes::from(scalar.to_string())),
    }
}

fn set_default_content_type(headers: &mut HeaderMap, content_type: &'static str) {
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ResponseBody;
    use async_trait::async_trait;
    use http::StatusCode;
    use serde_json::json;

    struct Idle;

    #[async_trait]
    impl Transport for Idle {
        async fn fetch(
            &self,
            _request: TransportRequest,
        ) -> std::result::Result<TransportResponse, TransportError> {
            Ok(TransportResponse::new(
                StatusCode::OK,
                HeaderMap::new(),
                "https://api.test/".parse().unwrap(),
                ResponseBody::empty(),
            ))
        }
    }

    fn executor(request: RequestDescriptor) -> RequestExecutor {
        RequestExecutor::new(Arc::new(Idle), request)
    }

    fn post(body: impl Into<Body>) -> RequestExecutor {
        let request = RequestDescriptor::new(Method::POST, "https://api.test/")
            .with_body(body);
        executor(request)
    }

    #[test]
    fn test_get_and_head_never_carry_a_body() {
        for method in [Method::GET, Method::HEAD] {
            let request = RequestDescriptor::new(method, "https://api.test/")
                .with_body(json!({ "ignored": true }));
            let executor = executor(request);
            assert!(executor.body().is_none());
            assert!(!executor.headers().contains_key(CONTENT_TYPE));
        }
    }

    #[test]
    fn test_object_body_is_json_encoded() {
        let value = json!({ "name": "Ann", "tags": ["a", "b"] });
        let executor = post(value.clone());

        let sent: Value = serde_json::from_slice(executor.body().unwrap()).unwrap();
        assert_eq!(sent, value);
        assert_eq!(executor.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_existing_content_type_is_kept() {
        let request = RequestDescriptor::new(Method::PUT, "https://api.test/")
            .with_header("Content-Type", "application/merge-patch+json")
            .unwrap()
            .with_body(json!([1, 2, 3]));
        let executor = executor(request);

        assert_eq!(executor.body().unwrap().as_ref(), b"[1,2,3]");
        assert_eq!(
            executor.headers()[CONTENT_TYPE],
            "application/merge-patch+json"
        );
        assert_eq!(executor.headers().get_all(CONTENT_TYPE).iter().count(), 1);
    }

    #[test]
    fn test_wire_bodies_pass_through() {
        let text = post("raw text");
        assert_eq!(text.body().unwrap().as_ref(), b"raw text");
        assert!(!text.headers().contains_key(CONTENT_TYPE));

        let bytes = post(vec![0u8, 159, 146, 150]);
        assert_eq!(bytes.body().unwrap().as_ref(), &[0u8, 159, 146, 150]);
    }

    #[test]
    fn test_form_body_is_url_encoded() {
        let executor = post(Body::form([("q", "rust lang"), ("page", "2")]));

        assert_eq!(executor.body().unwrap().as_ref(), b"q=rust+lang&page=2");
        assert_eq!(
            executor.headers()[CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );
    }

    #[test]
    fn test_json_scalars_are_stringified() {
        let number = post(json!(42));
        assert_eq!(number.body().unwrap().as_ref(), b"42");
        assert!(!number.headers().contains_key(CONTENT_TYPE));

        let text = post(json!("plain"));
        assert_eq!(text.body().unwrap().as_ref(), b"plain");

        let null = post(Value::Null);
        assert!(null.body().is_none());
    }

    #[test]
    fn test_invalid_url_is_reported() {
        let executor = executor(RequestDescriptor::new(Method::GET, "/no/base"));
        let err = executor.url().unwrap_err();
        assert_eq!(err.code(), &crate::ErrorCode::UnknownError);
        assert!(err.message().contains("/no/base"));
    }
}
