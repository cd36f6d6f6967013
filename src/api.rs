//! Typed endpoints of the learning-content API.
//!
//! [`Api`] builds [`Query`] subscriptions for reads and [`Mutation`] runners for
//! writes, all sharing one [`QueryClient`]. Cache keys come from [`keys`] so
//! callers can invalidate exactly what a write affected:
//!
//! ```rust,no_run
//! # async fn demo(api: recall::api::Api) {
//! use recall::api::{NewTag, keys};
//!
//! let create = api.create_tag();
//! if create.run(NewTag::new("math")).await.is_ok() {
//!     api.queries().invalidate(&keys::tags());
//! }
//! # }
//! ```

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::de::value::Error as ValueError;
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::{Deserialize, Serialize};

use crate::subscription::http::{
    HttpClient, Method, Mutation, MutationError, Query, QueryClient, QueryError, QueryKey,
    QueryOptions,
};

/// Searches shorter than this are never sent.
pub const MIN_SEARCH_LEN: usize = 2;

/// Cache key builders, one per endpoint.
pub mod keys {
    use super::ResultType;
    use crate::query_key;
    use crate::subscription::http::QueryKey;

    /// Prefix shared by every search key.
    #[must_use]
    pub fn search_all() -> QueryKey {
        query_key!["search"]
    }

    #[must_use]
    pub fn search(query: &str, result_type: Option<ResultType>) -> QueryKey {
        search_all()
            .with(query)
            .with(result_type.map(ResultType::as_str))
    }

    #[must_use]
    pub fn tags() -> QueryKey {
        query_key!["/api/tags"]
    }

    #[must_use]
    pub fn flashcard_set(id: i64) -> QueryKey {
        query_key!["/api/flashcard-sets", id]
    }

    #[must_use]
    pub fn idea_set(id: i64) -> QueryKey {
        query_key!["/api/idea-sets", id]
    }

    #[must_use]
    pub fn report(id: i64) -> QueryKey {
        query_key!["/api/reports", id]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Video,
    Report,
    Flashcard,
    Idea,
}

impl ResultType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Report => "report",
            Self::Flashcard => "flashcard",
            Self::Idea => "idea",
        }
    }
}

/// Parses the serde wire name.
impl FromStr for ResultType {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::deserialize(IntoDeserializer::<ValueError>::into_deserializer(s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: i64,
    #[serde(rename = "type")]
    pub result_type: ResultType,
    pub title: String,
    pub excerpt: String,
    pub created_at: DateTime<Utc>,
    pub score: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/tags`. The owner is taken from the request, not the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTag {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl NewTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
        }
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    pub id: i64,
    pub flashcard_set_id: i64,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardSet {
    pub id: i64,
    pub video_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub flashcards: Vec<Flashcard>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Idea {
    pub id: i64,
    pub idea_set_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeaSet {
    pub id: i64,
    pub video_id: i64,
    /// `blog_titles`, `social_media_hooks` or `questions`.
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub ideas: Vec<Idea>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: i64,
    pub video_id: i64,
    pub title: String,
    pub content: String,
    /// `medium` or `linkedin`.
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

/// Entry point for reads and writes against the API.
///
/// Cloning is cheap; clones share the HTTP connection pool and the query cache.
#[derive(Debug, Clone)]
pub struct Api {
    http: HttpClient,
    queries: Arc<QueryClient>,
}

impl Api {
    #[must_use]
    pub const fn new(http: HttpClient, queries: Arc<QueryClient>) -> Self {
        Self { http, queries }
    }

    #[must_use]
    pub const fn http(&self) -> &HttpClient {
        &self.http
    }

    #[must_use]
    pub const fn queries(&self) -> &Arc<QueryClient> {
        &self.queries
    }

    /// Full-text search. Disabled until `query` has [`MIN_SEARCH_LEN`] characters.
    #[must_use]
    pub fn search(&self, query: &str, result_type: Option<ResultType>) -> Query<SearchResponse> {
        let http = self.http.clone();
        let text = query.to_owned();
        let enabled = query.chars().count() >= MIN_SEARCH_LEN;

        Query::new(
            keys::search(query, result_type),
            move || {
                let http = http.clone();
                let text = text.clone();
                async move { fetch_search(&http, &text, result_type).await }.boxed()
            },
            self.queries.clone(),
        )
        .with_options(QueryOptions::new().enabled(enabled))
    }

    /// Tags of the current user.
    #[must_use]
    pub fn tags(&self) -> Query<Vec<Tag>> {
        self.get(keys::tags(), "/api/tags".to_owned())
    }

    #[must_use]
    pub fn flashcard_set(&self, id: i64) -> Query<FlashcardSet> {
        self.get(keys::flashcard_set(id), format!("/api/flashcard-sets/{id}"))
    }

    #[must_use]
    pub fn idea_set(&self, id: i64) -> Query<IdeaSet> {
        self.get(keys::idea_set(id), format!("/api/idea-sets/{id}"))
    }

    #[must_use]
    pub fn report(&self, id: i64) -> Query<Report> {
        self.get(keys::report(id), format!("/api/reports/{id}"))
    }

    /// Creates a tag. Invalidating [`keys::tags`] afterwards is up to the caller.
    #[must_use]
    pub fn create_tag(&self) -> Mutation<NewTag, Tag> {
        let http = self.http.clone();
        Mutation::new(move |tag: NewTag| {
            let http = http.clone();
            async move {
                http.send_json(Method::POST, "/api/tags", &tag)
                    .await
                    .map_err(MutationError::from)
            }
            .boxed()
        })
    }

    fn get<V>(&self, key: QueryKey, path: String) -> Query<V>
    where
        V: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let http = self.http.clone();
        Query::new(
            key,
            move || {
                let http = http.clone();
                let path = path.clone();
                async move { http.get_json(&path).await.map_err(QueryError::from) }.boxed()
            },
            self.queries.clone(),
        )
    }
}

async fn fetch_search(
    http: &HttpClient,
    text: &str,
    result_type: Option<ResultType>,
) -> Result<SearchResponse, QueryError> {
    let mut params = vec![("q", text)];
    if let Some(result_type) = result_type {
        params.push(("type", result_type.as_str()));
    }
    let response = http
        .request_with_query::<()>(Method::GET, "/api/search", &params, None)
        .await?;
    Ok(response.json()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_key;

    #[test]
    fn test_search_keys() {
        assert_eq!(
            keys::search("ab", None),
            query_key!["search", "ab", None::<&str>]
        );
        assert_eq!(
            keys::search("ab", Some(ResultType::Idea)),
            query_key!["search", "ab", "idea"]
        );
        assert!(keys::search("ab", None).starts_with(&keys::search_all()));
    }

    #[test]
    fn test_resource_keys_are_isolated() {
        assert_ne!(keys::flashcard_set(1), keys::idea_set(1));
        assert_ne!(keys::report(1), keys::report(2));
    }

    #[test]
    fn test_search_enablement() {
        let http = HttpClient::new("http://127.0.0.1:9").expect("client");
        let api = Api::new(http, Arc::new(QueryClient::new()));

        assert!(!api.search("", None).options().enabled);
        assert!(!api.search("a", None).options().enabled);
        assert!(api.search("ab", None).options().enabled);
        assert!(!api.search("é", None).options().enabled);
    }

    #[test]
    fn test_tag_wire_format() {
        let json = serde_json::json!({
            "id": 4,
            "userId": "u1",
            "name": "math",
            "color": null,
            "createdAt": "2024-05-01T10:00:00Z",
        });
        let tag: Tag = serde_json::from_value(json).expect("deserialize");
        assert_eq!(tag.user_id, "u1");
        assert_eq!(tag.color, None);

        let body = serde_json::to_value(NewTag::new("math")).expect("serialize");
        assert_eq!(body, serde_json::json!({ "name": "math" }));
    }

    #[test]
    fn test_result_type_names() {
        for kind in [
            ResultType::Video,
            ResultType::Report,
            ResultType::Flashcard,
            ResultType::Idea,
        ] {
            let wire = serde_json::to_value(kind).expect("serialize");
            assert_eq!(wire, serde_json::json!(kind.as_str()));
            assert_eq!(kind.as_str().parse::<ResultType>().ok(), Some(kind));
        }
        assert!("summary".parse::<ResultType>().is_err());
        assert!("Video".parse::<ResultType>().is_err());
    }
}
