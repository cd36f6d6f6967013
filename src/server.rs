//! HTTP surface over an in-memory [`Store`].
//!
//! The caller is identified by the `x-user-id` request header. All failures
//! flow through [`error::normalize_errors`], so clients only ever see an
//! [`ErrorBody`](error::ErrorBody).

pub mod error;
pub mod store;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router, middleware};
use serde::Deserialize;
use tracing::debug;

use crate::api::{FlashcardSet, IdeaSet, NewTag, Report, ResultType, SearchResponse, Tag};
use crate::config::Mode;

use self::error::{ApiError, ValidationIssue};
use self::store::{DEFAULT_SEARCH_LIMIT, Store};

/// Header carrying the authenticated user's id.
pub const USER_HEADER: &str = "x-user-id";

/// Longest accepted tag name, in characters.
pub const MAX_TAG_NAME_LEN: usize = 50;

#[derive(Debug, Clone)]
struct AppState {
    store: Arc<Store>,
}

/// Builds the API router. `mode` controls how much error detail is exposed.
pub fn router(store: Arc<Store>, mode: Mode) -> Router {
    Router::new()
        .route("/api/search", get(search))
        .route("/api/tags", get(list_tags).post(create_tag))
        .route("/api/flashcard-sets/:id", get(get_flashcard_set))
        .route("/api/idea-sets/:id", get(get_idea_set))
        .route("/api/reports/:id", get(get_report))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(mode, error::normalize_errors))
        .with_state(AppState { store })
}

fn current_user(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|user| !user.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| ApiError::unauthorized("Unauthorized"))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(rename = "type")]
    result_type: Option<String>,
    limit: Option<usize>,
}

async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let user = current_user(&headers)?;

    let result_type = match params.result_type.as_deref() {
        None | Some("") => None,
        Some(name) => Some(name.parse::<ResultType>().map_err(|_| {
            ApiError::validation([ValidationIssue::new(
                &["type"],
                format!("Unknown result type: {name}"),
            )])
        })?),
    };

    if params.q.is_empty() {
        return Ok(Json(SearchResponse::default()));
    }

    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let results = state.store.search(&user, &params.q, result_type, limit).await;
    debug!(query = %params.q, count = results.len(), "search");
    Ok(Json(SearchResponse { results }))
}

async fn list_tags(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Tag>>, ApiError> {
    let user = current_user(&headers)?;
    Ok(Json(state.store.user_tags(&user).await))
}

async fn create_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<NewTag>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&headers)?;
    let Json(tag) = body.map_err(|rejection| {
        ApiError::validation([ValidationIssue::new(&[], rejection.body_text())])
    })?;
    validate_tag(&tag)?;

    let created = state.store.create_tag(&user, tag).await;
    Ok((StatusCode::CREATED, Json(created)))
}

fn validate_tag(tag: &NewTag) -> Result<(), ApiError> {
    let mut issues = Vec::new();
    let name_len = tag.name.trim().chars().count();
    if name_len == 0 {
        issues.push(ValidationIssue::new(&["name"], "Name is required"));
    } else if name_len > MAX_TAG_NAME_LEN {
        issues.push(ValidationIssue::new(
            &["name"],
            format!("Name must be at most {MAX_TAG_NAME_LEN} characters"),
        ));
    }
    if let Some(color) = &tag.color {
        let valid = color.len() == 7
            && color.starts_with('#')
            && color[1..].chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            issues.push(ValidationIssue::new(&["color"], "Color must look like #a1b2c3"));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation(issues))
    }
}

async fn get_flashcard_set(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<FlashcardSet>, ApiError> {
    let user = current_user(&headers)?;
    state
        .store
        .flashcard_set(&user, id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Flashcard set not found"))
}

async fn get_idea_set(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<IdeaSet>, ApiError> {
    let user = current_user(&headers)?;
    state
        .store
        .idea_set(&user, id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Idea set not found"))
}

async fn get_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Report>, ApiError> {
    let user = current_user(&headers)?;
    state
        .store
        .report(&user, id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Report not found"))
}

async fn not_found() -> ApiError {
    ApiError::not_found("Not Found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tag() {
        assert!(validate_tag(&NewTag::new("math")).is_ok());
        assert!(validate_tag(&NewTag::new("math").with_color("#00ff7a")).is_ok());

        let Err(ApiError::Validation(issues)) = validate_tag(&NewTag::new("  ")) else {
            panic!("blank name must be rejected");
        };
        assert_eq!(issues[0].path, vec!["name".to_owned()]);

        assert!(validate_tag(&NewTag::new("x".repeat(MAX_TAG_NAME_LEN))).is_ok());
        assert!(validate_tag(&NewTag::new("x".repeat(MAX_TAG_NAME_LEN + 1))).is_err());

        let Err(ApiError::Validation(issues)) =
            validate_tag(&NewTag::new("").with_color("green"))
        else {
            panic!("bad name and color must be rejected");
        };
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn test_current_user() {
        let mut headers = HeaderMap::new();
        assert!(current_user(&headers).is_err());

        headers.insert(USER_HEADER, "  ".parse().expect("header value"));
        assert!(current_user(&headers).is_err());

        headers.insert(USER_HEADER, "alice".parse().expect("header value"));
        assert_eq!(current_user(&headers).expect("user"), "alice");
    }
}
