//! Uniform error responses.
//!
//! Handlers return [`ApiError`]. The [`normalize_errors`] middleware renders
//! every failed response as an [`ErrorBody`], exposing `stack` and `details`
//! only in development mode. Error responses that did not come from an
//! `ApiError`, such as extractor rejections and unmatched routes, are
//! normalized too, so every error a client sees has the same shape.

use std::error::Error as StdError;
use std::fmt::Write as _;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::Mode;

pub const VALIDATION_MESSAGE: &str = "Validation error";
pub const INTERNAL_MESSAGE: &str = "Internal Server Error";

/// Largest non-JSON error body that is read back as a message.
const MAX_MESSAGE_BYTES: usize = 16 * 1024;

/// One failed check on request input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Location of the offending field, outermost first. Empty for the whole input.
    pub path: Vec<String>,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: &[&str], message: impl Into<String>) -> Self {
        Self {
            path: path.iter().map(|p| (*p).to_owned()).collect(),
            message: message.into(),
        }
    }
}

type Source = Arc<dyn StdError + Send + Sync>;

/// Error returned by request handlers.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Rejected input. Always rendered as 400.
    #[error("Validation error")]
    Validation(Vec<ValidationIssue>),

    /// Any other failure. Missing parts fall back to 500 and a generic message.
    #[error("{}", .message.as_deref().unwrap_or(INTERNAL_MESSAGE))]
    Http {
        status_code: Option<u16>,
        message: Option<String>,
        details: Option<serde_json::Value>,
        #[source]
        source: Option<Source>,
    },
}

impl ApiError {
    pub fn validation(issues: impl IntoIterator<Item = ValidationIssue>) -> Self {
        Self::Validation(issues.into_iter().collect())
    }

    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http {
            status_code: Some(status.as_u16()),
            message: Some(message.into()),
            details: None,
            source: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::status(StatusCode::UNAUTHORIZED, message)
    }

    /// A 500 caused by `source`. The cause is only shown in development mode.
    pub fn internal(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Http {
            status_code: None,
            message: None,
            details: None,
            source: Some(Arc::new(source)),
        }
    }

    /// Attaches diagnostic details shown in development mode.
    #[must_use]
    pub fn with_details(mut self, value: serde_json::Value) -> Self {
        if let Self::Http { details, .. } = &mut self {
            *details = Some(value);
        }
        self
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Http { status_code, .. } => status_code
                .and_then(|code| StatusCode::from_u16(code).ok())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    /// Builds the response body for `mode`.
    #[must_use]
    pub fn body(&self, mode: Mode) -> ErrorBody {
        match self {
            Self::Validation(issues) => ErrorBody {
                message: VALIDATION_MESSAGE.to_owned(),
                errors: Some(issues.clone()),
                stack: None,
                details: None,
            },
            Self::Http { details, .. } => {
                let development = mode.is_development();
                ErrorBody {
                    message: self.to_string(),
                    errors: None,
                    stack: development.then(|| self.trace()),
                    details: if development { details.clone() } else { None },
                }
            }
        }
    }

    /// The error followed by its chain of causes, one per line.
    fn trace(&self) -> String {
        let mut trace = format!("Error: {self}");
        let mut cause = self.source();
        while let Some(err) = cause {
            let _ = write!(trace, "\n    caused by: {err}");
            cause = err.source();
        }
        trace
    }

    /// Renders the complete response for `mode`.
    #[must_use]
    pub fn render(&self, mode: Mode) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.trace(), "request failed");
        } else {
            debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(self.body(mode))).into_response()
    }
}

/// The only error shape clients ever receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ValidationIssue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    /// Renders the production shape and stashes the error so that
    /// [`normalize_errors`] can re-render it for the configured mode.
    fn into_response(self) -> Response {
        let mut response = (self.status_code(), Json(self.body(Mode::Production))).into_response();
        response.extensions_mut().insert(Arc::new(self));
        response
    }
}

/// Middleware that renders every error response as an [`ErrorBody`].
///
/// Install with `axum::middleware::from_fn_with_state(mode, normalize_errors)`.
pub async fn normalize_errors(State(mode): State<Mode>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    if let Some(err) = response.extensions().get::<Arc<ApiError>>().cloned() {
        return err.render(mode);
    }

    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) || is_json(&response) {
        return response;
    }

    let message = read_message(response.into_body()).await;
    let message = if message.is_empty() {
        status.canonical_reason().unwrap_or(INTERNAL_MESSAGE).to_owned()
    } else {
        message
    };
    ApiError::status(status, message).render(mode)
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

async fn read_message(body: Body) -> String {
    match axum::body::to_bytes(body, MAX_MESSAGE_BYTES).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_owned(),
        Err(e) => {
            warn!(error = %e, "failed to read error response body");
            String::new()
        }
    }
}
