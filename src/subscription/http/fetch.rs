//! Thin HTTP client that normalizes failures into [`HttpError`].
//!
//! Every call goes out exactly once: there is no retry and no header injection
//! beyond the defaults the client was built with. Response bodies are parsed as
//! JSON only when the server labels them as JSON; anything else is kept as text.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ClientConfig, ConfigError};

pub use reqwest::Method;

/// Message used for failures that never produced an HTTP status.
pub const NETWORK_ERROR: &str = "network error";

/// A decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(serde_json::Value),
    Text(String),
}

impl ResponseBody {
    /// Returns the JSON value if the body was JSON.
    #[must_use]
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl ParsedResponse {
    /// Deserializes the body into `T`.
    ///
    /// # Errors
    ///
    /// Returns an [`HttpError`] carrying this response's status if the body is
    /// not JSON or does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        let value = match &self.body {
            ResponseBody::Json(value) => value.clone(),
            ResponseBody::Empty => serde_json::Value::Null,
            ResponseBody::Text(_) => {
                return Err(HttpError::with_status(
                    self.status,
                    "expected a JSON response body",
                    Some(self.body.clone()),
                ));
            }
        };
        serde_json::from_value(value).map_err(|e| {
            HttpError::with_status(
                self.status,
                format!("failed to decode response: {e}"),
                Some(self.body.clone()),
            )
        })
    }
}

/// A failed HTTP call.
///
/// `status_code` is `None` when the request never produced a response.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}{message}", status_prefix(.status_code.as_ref()))]
pub struct HttpError {
    pub status_code: Option<u16>,
    pub message: String,
    pub body: Option<ResponseBody>,
}

impl HttpError {
    /// The error for connection, timeout and body-transfer failures.
    #[must_use]
    pub fn network() -> Self {
        Self {
            status_code: None,
            message: NETWORK_ERROR.to_owned(),
            body: None,
        }
    }

    pub fn with_status(
        status_code: u16,
        message: impl Into<String>,
        body: Option<ResponseBody>,
    ) -> Self {
        Self {
            status_code: Some(status_code),
            message: message.into(),
            body,
        }
    }

    /// Returns `true` if the request never reached a server response.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        self.status_code.is_none()
    }
}

/// `"404: "` for a status, nothing for a network failure.
pub(super) fn status_prefix(status_code: Option<&u16>) -> String {
    status_code.map(|code| format!("{code}: ")).unwrap_or_default()
}

/// HTTP client bound to an API base URL.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    /// Creates a client with no default headers and no timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ConfigError> {
        Self::from_config(&ClientConfig {
            base_url: base_url.into(),
            timeout_secs: None,
            default_headers: Default::default(),
        })
    }

    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a default header is malformed or the underlying
    /// client cannot be constructed.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::Header {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| ConfigError::Header {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            headers.insert(header_name, header_value);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issues a request and parses the response.
    ///
    /// # Errors
    ///
    /// Returns an [`HttpError`] with a status code for non-2xx responses and
    /// one without a status code when the network call itself fails.
    pub async fn request<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<ParsedResponse, HttpError>
    where
        B: Serialize + ?Sized,
    {
        self.request_with_query(method, path, &[], body).await
    }

    /// Like [`request`](Self::request) with URL-encoded query parameters.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn request_with_query<B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<ParsedResponse, HttpError>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{path}", self.base_url);
        let mut builder = self.client.request(method.clone(), &url);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(%method, %url, error = %e, "request failed before a response");
            HttpError::network()
        })?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(is_json_content_type);
        let bytes = response.bytes().await.map_err(|e| {
            warn!(%method, %url, error = %e, "failed to read response body");
            HttpError::network()
        })?;

        let body = parse_body(status.as_u16(), is_json, &bytes)?;
        debug!(%method, %url, status = status.as_u16(), "response received");

        if status.is_success() {
            Ok(ParsedResponse {
                status: status.as_u16(),
                body,
            })
        } else {
            let message = body
                .as_json()
                .and_then(|value| value.get("message"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
                .or_else(|| status.canonical_reason().map(str::to_owned))
                .unwrap_or_else(|| "request failed".to_owned());
            Err(HttpError::with_status(status.as_u16(), message, Some(body)))
        }
    }

    /// Issues a `GET` and returns the parsed response.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get(&self, path: &str) -> Result<ParsedResponse, HttpError> {
        self.request::<()>(Method::GET, path, None).await
    }

    /// Issues a `GET` and deserializes the JSON body.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request) and [`ParsedResponse::json`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, HttpError> {
        self.get(path).await?.json()
    }

    /// Sends a JSON body and deserializes the JSON response.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request) and [`ParsedResponse::json`].
    pub async fn send_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(method, path, Some(body)).await?.json()
    }
}

fn is_json_content_type(value: &str) -> bool {
    let mime = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || mime.ends_with("+json")
}

fn parse_body(status: u16, is_json: bool, bytes: &[u8]) -> Result<ResponseBody, HttpError> {
    if bytes.is_empty() {
        return Ok(ResponseBody::Empty);
    }
    if is_json {
        return serde_json::from_slice(bytes).map(ResponseBody::Json).map_err(|e| {
            HttpError::with_status(
                status,
                format!("invalid JSON body: {e}"),
                Some(ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned())),
            )
        });
    }
    Ok(ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned()))
}
