//! Cached HTTP reads and tracked writes.
//!
//! This module provides subscription-based queries and command-based mutations,
//! similar to SWR or TanStack Query.
//!
//! # Features
//!
//! - **Fetch client**: [`HttpClient`] issues requests and normalizes failures into [`HttpError`]
//! - **Queries**: [`Query`] subscriptions read through the [`QueryClient`] cache, coalescing
//!   concurrent fetches and refetching on invalidation
//! - **Mutations**: [`Mutation`] runs writes and tracks their pending/success/error record
//! - **Keys**: [`QueryKey`] tuples with prefix invalidation
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use recall::query_key;
//! use recall::subscription::http::{HttpClient, Mutation, Query, QueryClient, QueryResult};
//!
//! struct Tags {
//!     queries: Arc<QueryClient>,
//!     http: HttpClient,
//!     list: QueryResult<Vec<Tag>>,
//! }
//!
//! impl Tags {
//!     fn subscriptions(&self) -> Vec<Subscription<Message>> {
//!         let http = self.http.clone();
//!         vec![
//!             Subscription::new(Query::new(
//!                 query_key!["/api/tags"],
//!                 move || {
//!                     let http = http.clone();
//!                     Box::pin(async move { Ok(http.get_json("/api/tags").await?) })
//!                 },
//!                 self.queries.clone(),
//!             ))
//!             .map(Message::Tags),
//!         ]
//!     }
//!
//!     fn update(&mut self, msg: Message) -> Command<Message> {
//!         match msg {
//!             Message::Tags(result) => {
//!                 self.list = result;
//!                 Command::none()
//!             }
//!             Message::TagCreated(_) => {
//!                 self.queries.invalidate(&query_key!["/api/tags"]);
//!                 Command::none()
//!             }
//!         }
//!     }
//! }
//! ```

mod cache;
mod config;
mod fetch;
mod key;
pub mod mutation;
pub mod query;

pub use cache::{CacheEntry, QueryStatus};
pub use config::{QueryConfig, QueryOptions};
pub use fetch::{HttpClient, HttpError, Method, NETWORK_ERROR, ParsedResponse, ResponseBody};
pub use key::{KeyPart, QueryKey};
pub use mutation::{Mutation, MutationError, MutationRecord, MutationState};
pub use query::{Query, QueryClient, QueryError, QueryResult, QueryState};
