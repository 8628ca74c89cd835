//! # Request executor
//!
//! Stateless driver that takes one [`ServerRequest`] from construction to
//! its single outcome:
//!
//! - construct error: rejected, nothing sent, no callback.
//! - preflight handled: nothing sent, the request already reported.
//! - 2xx: body parsed as a JSON object (empty or unparseable bodies become
//!   an empty object) and handed to `on_success`.
//! - non-2xx: `on_failure` with the HTTP status.
//! - transport failure: `on_failure` with an internal negative code
//!   (see [`ErrorCode`](crate::outcome::ErrorCode)).
//!
//! There is no retry, batching or queue ordering here.

use std::sync::LazyLock;

use bon::Builder;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use http::{HeaderName, HeaderValue, Method, Request};
use serde_json::{Map, Value};
use url::Url;

use crate::environment::{Environment, StaticEnvironment};
use crate::error::{ClientResult, EncodeError, HttpError, TransportError};
use crate::http_client::HttpClient;
use crate::request::{ServerRequest, ServerResponse};

/// Default API host.
pub const DEFAULT_BASE_URL: &str = "https://api.branch.io/";

/// Payload field the configured API key is written to.
pub const API_KEY_FIELD: &str = "api_key";

const JSON: &str = "application/json";

/// Executor configuration.
///
/// - `base_url`: host that request paths are joined onto.
/// - `api_key`: added to every payload under [`API_KEY_FIELD`] unless the
///   request already set it.
/// - `user_agent`: optional `User-Agent` header.
/// - `extra_headers`: attached to every request.
#[derive(Debug, Clone, Builder)]
#[builder(start_fn = new)]
pub struct ExecutorOptions {
    /// Base URL for all endpoints
    pub base_url: Url,
    /// API key injected into payloads
    #[builder(into)]
    pub api_key: Option<String>,
    /// `User-Agent` header value
    #[builder(into)]
    pub user_agent: Option<String>,
    /// Extra headers to attach to every request
    #[builder(default)]
    pub extra_headers: Vec<(HeaderName, HeaderValue)>,
}

// Parsed once from a constant; a malformed constant fails every test.
static DEFAULT_URL: LazyLock<Url> =
    LazyLock::new(|| Url::parse(DEFAULT_BASE_URL).expect("DEFAULT_BASE_URL is a valid url"));

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self::new().base_url(DEFAULT_URL.clone()).build()
    }
}

/// What the executor did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Payload construction had failed; nothing was sent.
    Rejected,
    /// The request's preflight check handled it; nothing was sent.
    Handled,
    /// The request was sent and its outcome delivered.
    Completed {
        /// HTTP status, or the internal failure code
        status: i32,
    },
}

/// Sends [`ServerRequest`]s over an [`HttpClient`].
///
/// Example
/// ```ignore
/// use attrib_common::{RequestExecutor, ExecutorOptions, StaticEnvironment};
///
/// let executor = RequestExecutor::new(
///     reqwest::Client::new(),
///     StaticEnvironment::online(),
///     ExecutorOptions::default(),
/// );
/// let dispatch = executor.execute(&mut request).await;
/// ```
pub struct RequestExecutor<C, E = StaticEnvironment> {
    client: C,
    env: E,
    opts: ExecutorOptions,
}

impl<C: HttpClient, E: Environment> RequestExecutor<C, E> {
    /// Create a new executor.
    pub fn new(client: C, env: E, opts: ExecutorOptions) -> Self {
        Self { client, env, opts }
    }

    /// Configuration in use.
    pub fn options(&self) -> &ExecutorOptions {
        &self.opts
    }

    /// Underlying HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Drive `request` to its outcome.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, request), fields(path = %request.path(), read = request.is_read_request())))]
    pub async fn execute<R>(&self, request: &mut R) -> Dispatch
    where
        R: ServerRequest + ?Sized,
    {
        if request.is_construct_error() {
            #[cfg(feature = "tracing")]
            tracing::warn!("rejecting request whose payload failed to build");
            return Dispatch::Rejected;
        }

        if request.preflight_check(&self.env) {
            #[cfg(feature = "tracing")]
            tracing::debug!("request handled during preflight, not sending");
            return Dispatch::Handled;
        }

        match self.send_raw(request).await {
            Ok(response) => {
                let status = i32::from(response.status().as_u16());
                request.on_success(response);
                Dispatch::Completed { status }
            }
            Err(e) => {
                let status = e.failure_status();
                #[cfg(feature = "tracing")]
                tracing::warn!(status, error = %e, "request failed");
                request.on_failure(status);
                Dispatch::Completed { status }
            }
        }
    }

    /// Send `request` and return the parsed response without touching its
    /// callback.
    pub async fn send_raw<R>(&self, request: &R) -> ClientResult<ServerResponse>
    where
        R: ServerRequest + ?Sized,
    {
        let http_request = build_http_request(&self.opts, request)?;

        let http_response = self
            .client
            .send_http(http_request)
            .await
            .map_err(classify_transport_error)?;

        process_response(http_response)
    }
}

/// Build the HTTP request for `req`.
///
/// Write requests are `POST`ed as JSON. Read requests are `GET` with the
/// payload encoded as the query string.
pub fn build_http_request<R>(opts: &ExecutorOptions, req: &R) -> ClientResult<Request<Vec<u8>>>
where
    R: ServerRequest + ?Sized,
{
    let mut url = opts.base_url.clone();
    let mut path = url.path().trim_end_matches('/').to_owned();
    path.push('/');
    path.push_str(req.path().trim_start_matches('/'));
    url.set_path(&path);

    let mut payload: Map<String, Value> = req
        .post()
        .cloned()
        .ok_or_else(|| EncodeError::Other("request has no payload".into()))?;
    if let Some(key) = &opts.api_key {
        payload
            .entry(API_KEY_FIELD)
            .or_insert_with(|| Value::String(key.clone()));
    }

    let read = req.is_read_request();
    if read {
        let qs = serde_html_form::to_string(&payload).map_err(EncodeError::from)?;
        if qs.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&qs));
        }
    }

    let method = if read { Method::GET } else { Method::POST };
    let mut builder = Request::builder().method(method).uri(url.as_str());

    if !read {
        builder = builder.header(CONTENT_TYPE, JSON);
    }
    builder = builder.header(ACCEPT, JSON);
    if let Some(agent) = &opts.user_agent {
        builder = builder.header(USER_AGENT, agent.as_str());
    }
    for (name, value) in &opts.extra_headers {
        builder = builder.header(name, value);
    }

    let body = if read {
        vec![]
    } else {
        serde_json::to_vec(&payload).map_err(EncodeError::from)?
    };

    Ok(builder
        .body(body)
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?)
}

/// Turn a raw HTTP response into a [`ServerResponse`] or an [`HttpError`].
pub fn process_response(http_response: http::Response<Vec<u8>>) -> ClientResult<ServerResponse> {
    let status = http_response.status();
    let buffer = Bytes::from(http_response.into_body());

    if !status.is_success() {
        return Err(HttpError {
            status,
            body: Some(buffer),
        }
        .into());
    }

    match ServerResponse::parse(status, &buffer) {
        Ok(response) => Ok(response),
        Err(_e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_e, "unreadable success body, treating as empty object");
            Ok(ServerResponse::new(status, Map::new()))
        }
    }
}

/// Recover a meaningful [`TransportError`] from an arbitrary client error.
fn classify_transport_error<Err>(e: Err) -> TransportError
where
    Err: std::error::Error + Send + Sync + 'static,
{
    let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(e);
    let boxed = match boxed.downcast::<TransportError>() {
        Ok(transport) => return *transport,
        Err(other) => other,
    };
    #[cfg(feature = "reqwest-client")]
    let boxed = match boxed.downcast::<reqwest::Error>() {
        Ok(e) => return TransportError::from(*e),
        Err(other) => other,
    };
    TransportError::Other(boxed)
}
