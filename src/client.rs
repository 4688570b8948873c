//! HTTP client facade with instance defaults and interceptor pipelines.
//!
//! The [`Client`] type is the main entry point for making HTTP requests.
//! Use [`ClientBuilder`] to configure and create clients.

use crate::error::{ApiError, ConfigError, Result};
use crate::executor::RequestExecutor;
use crate::interceptor::{InterceptorChain, InterceptorError};
use crate::request::{parse_header, Body, RequestDescriptor, RequestOptions, ResponseType};
use crate::response::{Payload, ResponseEnvelope};
use crate::retry::Retry;
use crate::transport::{ReqwestTransport, Transport};
use http::{HeaderMap, Method};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use url::Url;

/// An HTTP client with instance-wide defaults, retries and interceptors.
///
/// The client is cheap to clone; clones share configuration, default
/// headers and interceptor chains.
///
/// # Examples
///
/// ```no_run
/// use courier::{Body, Client, RequestOptions, RetryPolicy};
/// use serde::{Deserialize, Serialize};
/// use std::time::Duration;
///
/// #[derive(Serialize)]
/// struct CreateUser {
///     name: String,
/// }
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(10))
///     .retry(RetryPolicy::new(3).delay(Duration::from_millis(200)))
///     .default_header("user-agent", "my-app/1.0")?
///     .build()?;
///
/// let user: User = client.get("/users/123", RequestOptions::new()).await?;
/// println!("User: {}", user.name);
///
/// let body = Body::json(&CreateUser { name: "Alice".into() })?;
/// let created: User = client.post("/users", body, RequestOptions::new()).await?;
/// println!("Created user with ID: {}", created.id);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    base_url: Option<Url>,
    timeout: Option<Duration>,
    default_headers: RwLock<HeaderMap>,
    retry: Option<Retry>,
    response_type: ResponseType,
    request_interceptors: InterceptorChain<RequestDescriptor>,
    response_interceptors: InterceptorChain<ResponseEnvelope>,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Interceptors applied to every request before it is sent.
    ///
    /// A failing request interceptor ends the call before any attempt is
    /// made. The error carries the descriptor as it was before the chain ran.
    /// As with [`Client::response_interceptors`], a returned [`ApiError`] is
    /// passed through unchanged.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use courier::{BoxError, Client, RequestDescriptor};
    ///
    /// # fn example() -> Result<(), courier::ConfigError> {
    /// let client = Client::builder().base_url("https://api.example.com")?.build()?;
    ///
    /// client.request_interceptors().register_fn(|request: RequestDescriptor| async move {
    ///     request.with_header("x-trace-id", "abc123").map_err(BoxError::from)
    /// });
    /// # Ok(())
    /// # }
    /// ```
    pub fn request_interceptors(&self) -> &InterceptorChain<RequestDescriptor> {
        &self.inner.request_interceptors
    }

    /// Interceptors applied to every response before it is decoded.
    ///
    /// Returning an [`ApiError`] from a response interceptor fails the call
    /// with that error unchanged, which is how non-2xx statuses are turned
    /// into `HTTP_ERROR`s. The caller cannot tell such an error apart from one
    /// raised by the executor: an interceptor returning
    /// [`ApiError::from_timeout`] looks exactly like a real timeout. Any other
    /// error type becomes a `NETWORK_ERROR` naming the interceptor stage.
    ///
    /// ```no_run
    /// use courier::{BoxError, Client, ResponseEnvelope};
    ///
    /// # fn example() -> Result<(), courier::ConfigError> {
    /// let client = Client::builder().build()?;
    ///
    /// client.response_interceptors().register_fn(|response: ResponseEnvelope| async move {
    ///     if response.ok() {
    ///         Ok(response)
    ///     } else {
    ///         Err(BoxError::from(response.to_error()))
    ///     }
    /// });
    /// # Ok(())
    /// # }
    /// ```
    pub fn response_interceptors(&self) -> &InterceptorChain<ResponseEnvelope> {
        &self.inner.response_interceptors
    }

    /// Sets a default header sent with every request.
    ///
    /// Meant for configuration time. Requests already being prepared may or
    /// may not observe the change.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn set_header(
        &self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> std::result::Result<(), ConfigError> {
        let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
        self.inner
            .default_headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, value);
        Ok(())
    }

    /// Removes a default header. Unknown names are ignored.
    pub fn remove_header(&self, name: impl AsRef<str>) {
        self.inner
            .default_headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name.as_ref());
    }

    /// A snapshot of the current default headers.
    pub fn default_headers(&self) -> HeaderMap {
        self.inner
            .default_headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Merges per-call options over the instance defaults.
    ///
    /// Per-call values win. Headers are merged by name: a per-call header
    /// replaces every default value of the same name.
    pub fn build_request(
        &self,
        method: Method,
        url: &str,
        body: Option<Body>,
        options: RequestOptions,
    ) -> RequestDescriptor {
        let mut headers = self.default_headers();
        for name in options.headers.keys() {
            headers.remove(name);
            for value in options.headers.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        RequestDescriptor {
            method,
            url: url.to_string(),
            base_url: self.inner.base_url.clone(),
            headers,
            params: options.params,
            body,
            timeout: options.timeout.or(self.inner.timeout),
            retry: options.retry.or_else(|| self.inner.retry.clone()),
            response_type: options.response_type.unwrap_or(self.inner.response_type),
            abort_signal: options.abort_signal,
        }
    }

    /// Runs a request through the request interceptors, the executor and the
    /// response interceptors, and returns the undecoded response.
    ///
    /// The descriptor is sent as given; build it with
    /// [`Client::build_request`] to apply the client's defaults.
    pub async fn send(&self, request: RequestDescriptor) -> Result<ResponseEnvelope> {
        let original = Arc::new(request.clone());
        let request = self
            .inner
            .request_interceptors
            .execute(request)
            .await
            .map_err(|e| from_interceptor_error(e, Some(original)))?;
        let request = Arc::new(request);

        let start_time = Instant::now();
        let transport = Arc::clone(&self.inner.transport);
        let executor = RequestExecutor::new(transport, Arc::clone(&request));
        let outcome = executor.send().await?;
        let latency = start_time.elapsed();

        tracing::info!(
            method = %request.method,
            status = outcome.response.status().as_u16(),
            latency_ms = latency.as_millis(),
            attempts = outcome.attempts,
            "Received HTTP response"
        );

        let response = ResponseEnvelope::new(
            outcome.response,
            Arc::clone(&request),
            outcome.attempts,
            latency,
        );
        self.inner
            .response_interceptors
            .execute(response)
            .await
            .map_err(|e| from_interceptor_error(e, Some(request)))
    }

    /// Sends a request and decodes the response into `T`.
    pub async fn request<T: DeserializeOwned>(&self, request: RequestDescriptor) -> Result<T> {
        self.send(request).await?.decode_into().await
    }

    /// Sends a request and returns the decoded payload without conversion.
    pub async fn fetch(&self, request: RequestDescriptor) -> Result<Payload> {
        self.send(request).await?.decode().await
    }

    /// Makes a GET request.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use courier::{Client, RequestOptions};
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct User { name: String }
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = Client::builder().base_url("https://api.example.com")?.build()?;
    ///
    /// let options = RequestOptions::new().param("fields", "name");
    /// let user: User = client.get("/users/123", options).await?;
    /// println!("User: {}", user.name);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get<T: DeserializeOwned>(&self, url: &str, options: RequestOptions) -> Result<T> {
        self.request(self.build_request(Method::GET, url, None, options))
            .await
    }

    /// Makes a POST request.
    pub async fn post<T: DeserializeOwned>(
        &self,
        url: &str,
        body: impl Into<Body>,
        options: RequestOptions,
    ) -> Result<T> {
        self.request(self.build_request(Method::POST, url, Some(body.into()), options))
            .await
    }

    /// Makes a PUT request.
    pub async fn put<T: DeserializeOwned>(
        &self,
        url: &str,
        body: impl Into<Body>,
        options: RequestOptions,
    ) -> Result<T> {
        self.request(self.build_request(Method::PUT, url, Some(body.into()), options))
            .await
    }

    /// Makes a PATCH request.
    pub async fn patch<T: DeserializeOwned>(
        &self,
        url: &str,
        body: impl Into<Body>,
        options: RequestOptions,
    ) -> Result<T> {
        self.request(self.build_request(Method::PATCH, url, Some(body.into()), options))
            .await
    }

    /// Makes a DELETE request.
    pub async fn delete<T: DeserializeOwned>(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<T> {
        self.request(self.build_request(Method::DELETE, url, None, options))
            .await
    }

    /// Makes a HEAD request.
    ///
    /// The decoded payload of a HEAD response is normally [`Payload::Empty`];
    /// use [`Client::send`] to inspect the response headers.
    pub async fn head(&self, url: &str, options: RequestOptions) -> Result<Payload> {
        self.fetch(self.build_request(Method::HEAD, url, None, options))
            .await
    }

    /// Makes an OPTIONS request.
    pub async fn options<T: DeserializeOwned>(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<T> {
        self.request(self.build_request(Method::OPTIONS, url, None, options))
            .await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url)
            .field("timeout", &self.inner.timeout)
            .field("retry", &self.inner.retry)
            .field("response_type", &self.inner.response_type)
            .field("request_interceptors", &self.inner.request_interceptors)
            .field("response_interceptors", &self.inner.response_interceptors)
            .finish_non_exhaustive()
    }
}

/// Interceptor failures become `NETWORK_ERROR`s whose message names the
/// interceptor stage. An [`ApiError`] raised by an interceptor is passed
/// through as-is.
fn from_interceptor_error(
    error: InterceptorError,
    request: Option<Arc<RequestDescriptor>>,
) -> ApiError {
    let handle = error.handle();
    match error.into_source().downcast::<ApiError>() {
        Ok(api_error) => *api_error,
        Err(source) => ApiError::from_network_error(InterceptorError::new(handle, source), request),
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use courier::{ClientBuilder, ResponseType};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), courier::ConfigError> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(30))
///     .retry(3)
///     .response_type(ResponseType::Json)
///     .default_header("User-Agent", "my-app/1.0")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<Url>,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
    retry: Option<Retry>,
    response_type: ResponseType,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            base_url: None,
            default_headers: HeaderMap::new(),
            timeout: None,
            retry: None,
            response_type: ResponseType::default(),
            transport: None,
        }
    }

    /// Sets the base URL that relative request URLs are resolved against.
    ///
    /// # Errors
    ///
    /// Returns an error unless the URL is an absolute `http` or `https` URL.
    pub fn base_url(mut self, url: impl AsRef<str>) -> std::result::Result<Self, ConfigError> {
        let raw = url.as_ref();
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: raw.to_string(),
            reason,
        };

        let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
        }
        if !url.has_host() {
            return Err(invalid("missing host".to_string()));
        }

        self.base_url = Some(url);
        Ok(self)
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> std::result::Result<Self, ConfigError> {
        let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the per-attempt timeout. Must be greater than zero.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the default retry policy: a bare count or a [`RetryPolicy`].
    ///
    /// [`RetryPolicy`]: crate::RetryPolicy
    pub fn retry(mut self, retry: impl Into<Retry>) -> Self {
        self.retry = Some(retry.into());
        self
    }

    /// Sets how response bodies are decoded by default.
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Replaces the default [`ReqwestTransport`].
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is zero or the default transport
    /// cannot be created.
    pub fn build(self) -> std::result::Result<Client, ConfigError> {
        if self.timeout == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidTimeout);
        }

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                transport,
                base_url: self.base_url,
                timeout: self.timeout,
                default_headers: RwLock::new(self.default_headers),
                retry: self.retry,
                response_type: self.response_type,
                request_interceptors: InterceptorChain::new(),
                response_interceptors: InterceptorChain::new(),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
