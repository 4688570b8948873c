//! Per-call request description and options.

use crate::abort::AbortSignal;
use crate::error::ConfigError;
use crate::retry::Retry;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// How a response body should be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResponseType {
    /// Parse the body as JSON. An empty body decodes to [`Payload::Empty`].
    ///
    /// [`Payload::Empty`]: crate::Payload::Empty
    Json,
    /// Return the body as a string.
    Text,
    /// Return the body as opaque bytes.
    Blob,
    /// Return the raw bytes.
    ArrayBuffer,
    /// Pick a decoder from the status code and `Content-Type`.
    #[default]
    Auto,
}

impl ResponseType {
    /// The decode kind used in `<KIND>_PARSE_ERROR` codes.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Json => "json",
            ResponseType::Text => "text",
            ResponseType::Blob => "blob",
            ResponseType::ArrayBuffer => "arraybuffer",
            ResponseType::Auto => "auto",
        }
    }
}

/// A request body.
///
/// `Text`, `Bytes` and `Form` are wire types and are sent as given. `Json`
/// values that are objects or arrays are serialized and sent as
/// `application/json`. Other JSON scalars are sent as their plain text form,
/// and `Json(Null)` is treated like no body at all.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Text(String),
    Bytes(Bytes),
    /// `application/x-www-form-urlencoded` pairs.
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
}

impl Body {
    /// Serializes `value` into a JSON body.
    ///
    /// ```
    /// use courier::Body;
    /// use serde::Serialize;
    ///
    /// #[derive(Serialize)]
    /// struct CreateUser { name: String }
    ///
    /// let body = Body::json(&CreateUser { name: "Ann".into() }).unwrap();
    /// assert_eq!(body, Body::Json(serde_json::json!({ "name": "Ann" })));
    /// ```
    pub fn json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        Ok(Body::Json(serde_json::to_value(value)?))
    }

    /// Builds a url-encoded form body.
    pub fn form<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Body::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(value)
    }
}

/// Everything needed to execute one call.
///
/// A descriptor is built by the client from per-call [`RequestOptions`] merged
/// over instance defaults. Request interceptors receive it by value and may
/// return a modified copy; once handed to the executor it is shared
/// read-only.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,

    /// Absolute URL, or a reference resolved against `base_url`.
    pub url: String,

    pub base_url: Option<Url>,

    pub headers: HeaderMap,

    /// Query parameters, appended in order. Duplicates are kept.
    pub params: Vec<(String, String)>,

    pub body: Option<Body>,

    /// Deadline for each attempt.
    pub timeout: Option<Duration>,

    pub retry: Option<Retry>,

    pub response_type: ResponseType,

    pub abort_signal: Option<AbortSignal>,
}

impl RequestDescriptor {
    /// Creates a descriptor with no headers, parameters or body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            base_url: None,
            headers: HeaderMap::new(),
            params: Vec::new(),
            body: None,
            timeout: None,
            retry: None,
            response_type: ResponseType::default(),
            abort_signal: None,
        }
    }

    /// Sets a header, replacing any existing values for the same name.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, ConfigError> {
        let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Appends a query parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Resolves `url` against `base_url` and appends the query parameters.
    ///
    /// An absolute `url` ignores the base. Parameters already present in the
    /// URL are kept, and the configured ones are appended after them.
    ///
    /// ```
    /// use courier::RequestDescriptor;
    /// use http::Method;
    ///
    /// let mut request = RequestDescriptor::new(Method::GET, "/search?q=rust")
    ///     .with_param("page", 2)
    ///     .with_param("q", "async");
    /// request.base_url = Some("https://api.example.com".parse().unwrap());
    ///
    /// assert_eq!(
    ///     request.resolve_url().unwrap().as_str(),
    ///     "https://api.example.com/search?q=rust&page=2&q=async"
    /// );
    /// ```
    pub fn resolve_url(&self) -> Result<Url, url::ParseError> {
        let mut url = match &self.base_url {
            Some(base) => base.join(&self.url)?,
            None => Url::parse(&self.url)?,
        };
        if !self.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

/// Per-call overrides for a client request.
///
/// Anything left unset falls back to the client's defaults. Headers are
/// merged name by name, with per-call values replacing defaults of the same
/// name.
///
/// # Examples
///
/// ```
/// use courier::{RequestOptions, ResponseType};
/// use std::time::Duration;
///
/// let options = RequestOptions::new()
///     .header("x-request-id", "abc123")
///     .unwrap()
///     .param("limit", 10)
///     .param("verbose", true)
///     .timeout(Duration::from_secs(5))
///     .retry(2)
///     .response_type(ResponseType::Json);
///
/// assert_eq!(options.params[0], ("limit".to_string(), "10".to_string()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: HeaderMap,
    pub params: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub retry: Option<Retry>,
    pub response_type: Option<ResponseType>,
    pub abort_signal: Option<AbortSignal>,
}

impl RequestOptions {
    /// Creates empty options; every value falls back to the client default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header for this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, ConfigError> {
        let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
        self.headers.append(name, value);
        Ok(self)
    }

    /// Adds a query parameter. Numbers and booleans are rendered as text.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Adds several query parameters.
    pub fn params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.to_string())));
        self
    }

    /// Sets the deadline for each attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry policy: a bare count or a full [`RetryPolicy`].
    ///
    /// [`RetryPolicy`]: crate::RetryPolicy
    pub fn retry(mut self, retry: impl Into<Retry>) -> Self {
        self.retry = Some(retry.into());
        self
    }

    /// Sets how the response body is decoded.
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    /// Lets the caller cancel this call from elsewhere.
    pub fn abort_signal(mut self, signal: AbortSignal) -> Self {
        self.abort_signal = Some(signal);
        self
    }
}

pub(crate) fn parse_header(
    name: &str,
    value: &str,
) -> Result<(HeaderName, HeaderValue), ConfigError> {
    let name = HeaderName::try_from(name).map_err(|e| {
        ConfigError::InvalidHeader(format!("Invalid header name `{}`: {}", name, e))
    })?;
    let value = HeaderValue::try_from(value)
        .map_err(|e| ConfigError::InvalidHeader(format!("Invalid header value: {}", e)))?;
    Ok((name, value))
}
