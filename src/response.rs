//! Response envelope with lazy, mode-directed body decoding.
//!
//! A [`ResponseEnvelope`] is produced for every completed round trip, 4xx
//! and 5xx included. The body stays unread until one of the decode methods
//! consumes the envelope, so it can be decoded at most once.

use crate::error::{ApiError, Result};
use crate::request::{RequestDescriptor, ResponseType};
use crate::transport::{ResponseBody, ResponseHead, TransportResponse};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// A decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No content: a 204/304 response, or an empty JSON body.
    Empty,
    Json(Value),
    Text(String),
    Binary(Bytes),
}

impl Payload {
    /// Returns `true` for [`Payload::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    /// The JSON value, if this is a JSON payload.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The text, if this is a text payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The raw bytes, if this is a binary payload.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Converts into a JSON value: `Empty` is `null`, text is a string and
    /// binary data is an array of byte values.
    pub fn into_value(self) -> Value {
        match self {
            Payload::Empty => Value::Null,
            Payload::Json(value) => value,
            Payload::Text(text) => Value::String(text),
            Payload::Binary(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        }
    }

    /// Deserializes into `T` through [`Payload::into_value`].
    ///
    /// ```
    /// use courier::Payload;
    ///
    /// let name: String = Payload::Text("Ann".into()).into_typed().unwrap();
    /// assert_eq!(name, "Ann");
    ///
    /// let nothing: Option<u32> = Payload::Empty.into_typed().unwrap();
    /// assert_eq!(nothing, None);
    /// ```
    pub fn into_typed<T: DeserializeOwned>(self) -> serde_json::Result<T> {
        serde_json::from_value(self.into_value())
    }
}

/// A completed response together with the request that produced it.
///
/// # Examples
///
/// ```no_run
/// use courier::{Client, RequestOptions};
/// use http::Method;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::builder().base_url("https://api.example.com")?.build()?;
///
/// let request = client.build_request(Method::GET, "/health", None, RequestOptions::new());
/// let response = client.send(request).await?;
/// println!(
///     "{} after {} attempt(s) in {:?}",
///     response.status(),
///     response.attempts(),
///     response.latency()
/// );
///
/// if response.ok() {
///     let body = response.decode().await?;
///     println!("{body:?}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ResponseEnvelope {
    head: ResponseHead,
    body: ResponseBody,
    request: Arc<RequestDescriptor>,
    attempts: u32,
    latency: Duration,
}

impl ResponseEnvelope {
    /// Wraps a transport response with the request that produced it.
    pub fn new(
        response: TransportResponse,
        request: Arc<RequestDescriptor>,
        attempts: u32,
        latency: Duration,
    ) -> Self {
        Self {
            head: response.head,
            body: response.body,
            request,
            attempts,
            latency,
        }
    }

    /// The response status code.
    pub fn status(&self) -> StatusCode {
        self.head.status
    }

    /// The canonical reason phrase for the status.
    pub fn status_text(&self) -> &'static str {
        self.head.status_text()
    }

    /// Returns `true` for 2xx statuses.
    pub fn ok(&self) -> bool {
        self.head.ok()
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// Returns a header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.header(name)
    }

    /// The final URL, after any redirects.
    pub fn url(&self) -> &Url {
        &self.head.url
    }

    /// Status, headers and URL without the body.
    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    /// The descriptor that was sent, after request interceptors ran.
    pub fn request(&self) -> &Arc<RequestDescriptor> {
        &self.request
    }

    /// Number of attempts it took to get this response.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns `true` if more than one attempt was made.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Time from the first attempt until this response arrived.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Builds an `HTTP_ERROR` for this response.
    pub fn to_error(&self) -> ApiError {
        ApiError::from_response(&self.head, Some(Arc::clone(&self.request)))
    }

    /// Decodes the body in the request's response type.
    pub async fn decode(self) -> Result<Payload> {
        let mode = self.request.response_type;
        self.decode_as(mode).await
    }

    /// Decodes the body in the given mode.
    pub async fn decode_as(self, mode: ResponseType) -> Result<Payload> {
        let Self {
            head,
            body,
            request,
            ..
        } = self;
        let decoder = Decoder {
            head: &head,
            request: &request,
        };

        match mode {
            ResponseType::Auto => decoder.auto(body).await,
            mode => decoder.decode(body, mode).await,
        }
    }

    /// Decodes the body and deserializes it into `T`.
    ///
    /// A payload that does not fit `T` is reported as `JSON_PARSE_ERROR`.
    pub async fn decode_into<T: DeserializeOwned>(self) -> Result<T> {
        let head = self.head.clone();
        let request = Arc::clone(&self.request);
        let payload = self.decode().await?;

        payload.into_typed().map_err(|e| {
            tracing::error!(
                error = %e,
                status = head.status.as_u16(),
                "Failed to deserialize response"
            );
            ApiError::from_parse_error("json", head.status.as_u16(), e, Some(&head), Some(request))
        })
    }
}

type ContentTypeRule = (fn(&str) -> bool, ResponseType);

/// Content-type dispatch for auto mode, in priority order. No match means JSON.
const AUTO_RULES: &[ContentTypeRule] = &[
    (is_json, ResponseType::Json),
    (is_text, ResponseType::Text),
    (is_binary, ResponseType::Blob),
];

fn is_json(content_type: &str) -> bool {
    content_type.contains("json")
}

fn is_text(content_type: &str) -> bool {
    content_type.starts_with("text/") || content_type.contains("xml")
}

fn is_binary(content_type: &str) -> bool {
    content_type.starts_with("image/")
        || content_type.starts_with("video/")
        || content_type.starts_with("audio/")
        || content_type.starts_with("application/octet-stream")
}

struct Decoder<'a> {
    head: &'a ResponseHead,
    request: &'a Arc<RequestDescriptor>,
}

impl Decoder<'_> {
    async fn auto(&self, body: ResponseBody) -> Result<Payload> {
        let status = self.head.status;
        if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
            return Ok(Payload::Empty);
        }

        let content_type = match self.head.headers.get(CONTENT_TYPE) {
            Some(value) => lowercase(value.as_bytes()),
            None => {
                let bytes = self.read(body, ResponseType::Json).await?;
                return match parse_json(&bytes) {
                    Ok(payload) => Ok(payload),
                    Err(_) => Ok(Payload::Text(text(&bytes))),
                };
            }
        };

        let mode = AUTO_RULES
            .iter()
            .find(|(matches, _)| matches(content_type.as_str()))
            .map(|(_, mode)| *mode)
            .unwrap_or(ResponseType::Json);

        tracing::debug!(
            content_type = %content_type,
            mode = mode.as_str(),
            "Auto-decoding response"
        );
        self.decode(body, mode).await
    }

    async fn decode(&self, body: ResponseBody, mode: ResponseType) -> Result<Payload> {
        let bytes = self.read(body, mode).await?;
        match mode {
            ResponseType::Json | ResponseType::Auto => {
                parse_json(&bytes)
                    .map_err(|e| self.parse_error(ResponseType::Json, e))
            }
            ResponseType::Text => Ok(Payload::Text(text(&bytes))),
            ResponseType::Blob | ResponseType::ArrayBuffer => Ok(Payload::Binary(bytes)),
        }
    }

    async fn read(&self, body: ResponseBody, mode: ResponseType) -> Result<Bytes> {
        body.bytes().await.map_err(|e| self.parse_error(mode, e))
    }

    fn parse_error(&self, mode: ResponseType, error: impl Into<crate::BoxError>) -> ApiError {
        let error = error.into();
        tracing::error!(
            error = %error,
            mode = mode.as_str(),
            status = self.head.status.as_u16(),
            "Failed to decode response body"
        );
        ApiError::from_parse_error(
            mode.as_str(),
            self.head.status.as_u16(),
            error,
            Some(self.head),
            Some(Arc::clone(self.request)),
        )
    }
}

/// Whitespace-only bodies decode to `Empty` rather than failing.
fn parse_json(bytes: &[u8]) -> serde_json::Result<Payload> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Payload::Empty);
    }
    serde_json::from_slice(bytes).map(Payload::Json)
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn lowercase(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_ascii_lowercase()
}
