//! Error types for HTTP calls.
//!
//! Every failure that escapes the public request surface is an [`ApiError`].
//! Callers branch on [`ApiError::code`], [`ApiError::status`] and
//! [`ApiError::is_retryable`] instead of matching on transport-specific
//! error types. Client construction problems are reported separately as
//! [`ConfigError`], since they are fail-fast configuration contracts and not
//! request failures.

use crate::interceptor::BoxError;
use crate::request::RequestDescriptor;
use crate::transport::ResponseHead;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// The closed set of failure kinds an [`ApiError`] can carry.
///
/// Decode failures form an open family: `ErrorCode::Parse("JSON")` renders as
/// `JSON_PARSE_ERROR`, and any other decode kind renders the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The server answered with a status the caller treats as failure.
    HttpError,
    /// A per-attempt deadline elapsed.
    Timeout,
    /// The transport failed before producing a response.
    NetworkError,
    /// The caller cancelled the call.
    Aborted,
    /// Decoding the body failed. Holds the upper-case decode kind.
    Parse(Cow<'static, str>),
    /// Anything that fits no other kind.
    UnknownError,
}

impl ErrorCode {
    pub const JSON_PARSE_ERROR: ErrorCode = ErrorCode::Parse(Cow::Borrowed("JSON"));
    pub const TEXT_PARSE_ERROR: ErrorCode = ErrorCode::Parse(Cow::Borrowed("TEXT"));
    pub const BLOB_PARSE_ERROR: ErrorCode = ErrorCode::Parse(Cow::Borrowed("BLOB"));
    pub const ARRAYBUFFER_PARSE_ERROR: ErrorCode =
        ErrorCode::Parse(Cow::Borrowed("ARRAYBUFFER"));

    /// Builds the parse error code for a decode kind such as `"json"`.
    pub fn parse(kind: &str) -> Self {
        let kind = kind.to_ascii_uppercase();
        match kind.as_str() {
            "JSON" => Self::JSON_PARSE_ERROR,
            "TEXT" => Self::TEXT_PARSE_ERROR,
            "BLOB" => Self::BLOB_PARSE_ERROR,
            "ARRAYBUFFER" => Self::ARRAYBUFFER_PARSE_ERROR,
            _ => ErrorCode::Parse(Cow::Owned(kind)),
        }
    }

    /// Returns `true` for any member of the `<KIND>_PARSE_ERROR` family.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, ErrorCode::Parse(_))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::HttpError => f.write_str("HTTP_ERROR"),
            ErrorCode::Timeout => f.write_str("TIMEOUT"),
            ErrorCode::NetworkError => f.write_str("NETWORK_ERROR"),
            ErrorCode::Aborted => f.write_str("ABORTED"),
            ErrorCode::Parse(kind) => write!(f, "{kind}_PARSE_ERROR"),
            ErrorCode::UnknownError => f.write_str("UNKNOWN_ERROR"),
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The single error type returned by request operations.
///
/// Instances are built by the `from_*` factories at the point of failure and
/// are never mutated afterwards.
///
/// # Examples
///
/// ```no_run
/// use courier::{Client, ErrorCode, RequestOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::builder().base_url("https://api.example.com")?.build()?;
///
/// match client.get::<serde_json::Value>("/endpoint", RequestOptions::new()).await {
///     Ok(value) => println!("Success: {value}"),
///     Err(e) if e.code() == &ErrorCode::Timeout => eprintln!("timed out"),
///     Err(e) if e.is_retryable() => eprintln!("transient failure: {e}"),
///     Err(e) => eprintln!("{} ({}): {}", e.code(), e.status(), e.message()),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    code: ErrorCode,
    status: u16,
    message: String,
    response: Option<ResponseHead>,
    request: Option<Arc<RequestDescriptor>>,
    timestamp: SystemTime,
    #[source]
    source: Option<BoxError>,
}

impl ApiError {
    fn new(code: ErrorCode, status: u16, message: String) -> Self {
        Self {
            code,
            status,
            message,
            response: None,
            request: None,
            timestamp: SystemTime::now(),
            source: None,
        }
    }

    fn with_request(mut self, request: Option<Arc<RequestDescriptor>>) -> Self {
        self.request = request;
        self
    }

    fn with_source(mut self, source: BoxError) -> Self {
        self.source = Some(source);
        self
    }

    /// The server answered with a status the caller considers a failure.
    ///
    /// ```
    /// use courier::{ApiError, ErrorCode, ResponseHead};
    /// use http::{HeaderMap, StatusCode};
    ///
    /// let head = ResponseHead::new(
    ///     StatusCode::SERVICE_UNAVAILABLE,
    ///     HeaderMap::new(),
    ///     "https://api.example.com/users".parse().unwrap(),
    /// );
    /// let err = ApiError::from_response(&head, None);
    ///
    /// assert_eq!(err.code(), &ErrorCode::HttpError);
    /// assert_eq!(err.status(), 503);
    /// assert!(err.is_retryable());
    /// ```
    pub fn from_response(response: &ResponseHead, request: Option<Arc<RequestDescriptor>>) -> Self {
        let status = response.status;
        let reason = status.canonical_reason().unwrap_or("Unknown Status");
        let mut err = Self::new(
            ErrorCode::HttpError,
            status.as_u16(),
            format!("HTTP {}: {}", status.as_u16(), reason),
        )
        .with_request(request);
        err.response = Some(response.clone());
        err
    }

    /// A per-attempt deadline elapsed. Always carries status 408.
    pub fn from_timeout(request: Option<Arc<RequestDescriptor>>) -> Self {
        Self::new(ErrorCode::Timeout, 408, "Request timeout".to_string())
            .with_request(request)
    }

    /// The transport failed before producing a response.
    pub fn from_network_error(
        error: impl Into<BoxError>,
        request: Option<Arc<RequestDescriptor>>,
    ) -> Self {
        let error = error.into();
        let message = format!("Network error: {error}");
        Self::new(ErrorCode::NetworkError, 0, message)
            .with_request(request)
            .with_source(error)
    }

    /// The caller cancelled the call.
    pub fn from_abort(request: Option<Arc<RequestDescriptor>>) -> Self {
        Self::new(ErrorCode::Aborted, 0, "Request aborted".to_string())
            .with_request(request)
    }

    /// Decoding the body as `kind` failed.
    pub fn from_parse_error(
        kind: &str,
        status: u16,
        error: impl Into<BoxError>,
        response: Option<&ResponseHead>,
        request: Option<Arc<RequestDescriptor>>,
    ) -> Self {
        let error = error.into();
        let mut err = Self::new(
            ErrorCode::parse(kind),
            status,
            format!("Failed to parse response as {kind}: {error}"),
        )
        .with_request(request)
        .with_source(error);
        err.response = response.cloned();
        err
    }

    /// Fallback for failures that fit no other kind.
    pub fn unknown(message: impl Into<String>, request: Option<Arc<RequestDescriptor>>) -> Self {
        Self::new(ErrorCode::UnknownError, 0, message.into())
            .with_request(request)
    }

    /// The failure kind.
    pub fn code(&self) -> &ErrorCode {
        &self.code
    }

    /// The HTTP status, or `0` when no response was involved.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The human-readable description, also used for `Display`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The response head that produced this error, if any.
    pub fn response(&self) -> Option<&ResponseHead> {
        self.response.as_ref()
    }

    /// The request that produced this error, if known.
    pub fn request(&self) -> Option<&RequestDescriptor> {
        self.request.as_deref()
    }

    /// When the error was created.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Returns `true` if this error is potentially retryable.
    ///
    /// Network errors and timeouts are retryable, as are HTTP errors with a
    /// 5xx status. Everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self.code {
            ErrorCode::NetworkError | ErrorCode::Timeout => true,
            ErrorCode::HttpError => self.status >= 500,
            _ => false,
        }
    }

    /// The URL this error relates to: the response URL when there is one,
    /// otherwise the resolved request URL.
    pub fn url(&self) -> Option<String> {
        if let Some(response) = &self.response {
            return Some(response.url.to_string());
        }
        let request = self.request.as_ref()?;
        Some(
            request
                .resolve_url()
                .map(|url| url.to_string())
                .unwrap_or_else(|_| request.url.clone()),
        )
    }

    /// A log-friendly JSON rendering.
    ///
    /// Only `name`, `code`, `status`, `message`, `timestamp` (epoch millis)
    /// and `url` are included; headers and bodies never are.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": "ApiError",
            "code": self.code.to_string(),
            "status": self.status,
            "message": self.message,
            "timestamp": self.timestamp_millis(),
            "url": self.url(),
        })
    }

    fn timestamp_millis(&self) -> u64 {
        self.timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

// Mirrors `to_json`: headers and bodies are never shown.
impl fmt::Debug for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiError")
            .field("code", &self.code)
            .field("status", &self.status)
            .field("message", &self.message)
            .field("timestamp", &self.timestamp)
            .field("url", &self.url())
            .field("source", &self.source)
            .finish()
    }
}

impl Serialize for ApiError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ApiError", 6)?;
        state.serialize_field("name", "ApiError")?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("status", &self.status)?;
        state.serialize_field("message", &self.message)?;
        state.serialize_field("timestamp", &self.timestamp_millis())?;
        state.serialize_field("url", &self.url())?;
        state.end()
    }
}

/// Invalid client or request configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The base URL is not an absolute `http`/`https` URL.
    #[error("Invalid base URL `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// A zero timeout was configured.
    #[error("Timeout must be greater than zero")]
    InvalidTimeout,

    /// A header name or value could not be represented.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The default transport could not be constructed.
    #[error("Failed to build HTTP transport: {0}")]
    Transport(String),
}

/// A specialized `Result` type for HTTP calls.
pub type Result<T> = std::result::Result<T, ApiError>;
