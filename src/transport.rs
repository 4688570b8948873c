//! The transport boundary.
//!
//! The crate never opens sockets itself. Each attempt is handed to a
//! [`Transport`] as a [`TransportRequest`], and the transport answers with a
//! [`TransportResponse`] whose body is read lazily. Cancelling an attempt is
//! done by dropping the future returned by [`Transport::fetch`], so
//! implementations must tolerate being dropped at any await point.
//!
//! [`ReqwestTransport`] is the default implementation.

use crate::error::ConfigError;
use crate::interceptor::BoxError;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use url::Url;

/// One attempt as seen by the transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Status line and headers of a response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Final URL of the response.
    pub url: Url,
}

impl ResponseHead {
    /// Creates a response head from its parts.
    pub fn new(status: StatusCode, headers: HeaderMap, url: Url) -> Self {
        Self {
            status,
            headers,
            url,
        }
    }

    /// Returns `true` for 2xx statuses.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// The canonical reason phrase, or `""` for unknown statuses.
    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    /// Returns a header value by name, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

type BodyFuture = Pin<Box<dyn Future<Output = Result<Bytes, TransportError>> + Send>>;

/// A response body that has not been read yet.
///
/// Nothing is read until [`ResponseBody::bytes`] is awaited, so a response
/// that is never decoded never pulls its body off the wire.
pub struct ResponseBody {
    read: BodyFuture,
}

impl ResponseBody {
    /// Wraps a future that yields the full body.
    pub fn from_future<F>(read: F) -> Self
    where
        F: Future<Output = Result<Bytes, TransportError>> + Send + 'static,
    {
        Self {
            read: Box::pin(read),
        }
    }

    /// A body with no content.
    pub fn empty() -> Self {
        Bytes::new().into()
    }

    /// Reads the whole body.
    pub async fn bytes(self) -> Result<Bytes, TransportError> {
        self.read.await
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::from_future(std::future::ready(Ok(bytes)))
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

impl From<&'static str> for ResponseBody {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseBody { .. }")
    }
}

/// What a transport returns for a completed round trip, whatever the status.
#[derive(Debug)]
pub struct TransportResponse {
    pub head: ResponseHead,
    pub body: ResponseBody,
}

impl TransportResponse {
    /// Creates a response from its parts.
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        url: Url,
        body: impl Into<ResponseBody>,
    ) -> Self {
        Self {
            head: ResponseHead::new(status, headers, url),
            body: body.into(),
        }
    }

    /// The response status code.
    pub fn status(&self) -> StatusCode {
        self.head.status
    }
}

/// Failure to complete a round trip.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// Connection refused, DNS failure, reset, or a failed body read.
    #[error("{0}")]
    Network(#[source] BoxError),

    /// The transport observed a cancellation of its own.
    #[error("The operation was aborted")]
    Aborted,
}

impl TransportError {
    /// Wraps any error as a network failure.
    pub fn network(error: impl Into<BoxError>) -> Self {
        TransportError::Network(error.into())
    }

    /// Returns `true` for [`TransportError::Aborted`].
    pub fn is_abort(&self) -> bool {
        matches!(self, TransportError::Aborted)
    }
}

/// Performs the actual network I/O for an attempt.
///
/// # Examples
///
/// A transport that answers every request locally:
///
/// ```
/// use async_trait::async_trait;
/// use courier::{Transport, TransportError, TransportRequest, TransportResponse};
/// use http::{HeaderMap, StatusCode};
///
/// struct Teapot;
///
/// #[async_trait]
/// impl Transport for Teapot {
///     async fn fetch(
///         &self,
///         request: TransportRequest,
///     ) -> Result<TransportResponse, TransportError> {
///         Ok(TransportResponse::new(
///             StatusCode::IM_A_TEAPOT,
///             HeaderMap::new(),
///             request.url,
///             "short and stout",
///         ))
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one round trip. Non-2xx statuses are responses, not errors.
    async fn fetch(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// [`Transport`] backed by a `reqwest::Client`.
///
/// The client is used as-is; deadlines and retries are applied by the
/// executor, so the wrapped client should not configure its own timeout.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Creates a new `ReqwestTransport` from an existing `reqwest::Client`.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(TransportError::network)?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = ResponseBody::from_future(async move {
            response.bytes().await.map_err(TransportError::network)
        });

        Ok(TransportResponse::new(status, headers, url, body))
    }
}
