//! # Recall - query cache, mutation runner and API error boundary
//!
//! Recall is the data layer of a learning-content application (flashcards,
//! idea sets, reports, tags). It follows a message-driven architecture: reads
//! are long-lived [`Subscription`](subscription::Subscription)s that deliver
//! query results as messages, and writes are [`Command`](command::Command)s
//! whose outcome flows back as a message.
//!
//! ## Core Components
//!
//! - [`QueryClient`](subscription::http::QueryClient): keyed cache of read results with
//!   staleness, invalidation, request coalescing and last-write-wins ordering
//! - [`Mutation`](subscription::http::Mutation): write runner with a pending flag and a
//!   record of the latest outcome
//! - [`SubscriptionManager`](subscription::SubscriptionManager): mounts and disposes
//!   subscriptions; a disposed subscription never delivers another message
//! - [`context`]: search and settings providers with an explicit mount lifecycle
//! - [`api`]: typed endpoints and cache keys
//! - [`server`]: an axum router whose errors are normalized into one response shape
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use recall::api::Api;
//! use recall::subscription::http::{HttpClient, QueryClient, QueryResult};
//! use recall::subscription::{Subscription, SubscriptionManager};
//!
//! #[derive(Debug)]
//! enum Message {
//!     Tags(QueryResult<Vec<recall::api::Tag>>),
//! }
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let api = Api::new(
//!     HttpClient::new("http://127.0.0.1:3000")?,
//!     Arc::new(QueryClient::new()),
//! );
//!
//! let mut subscriptions = SubscriptionManager::new();
//! subscriptions.update(vec![Subscription::new(api.tags()).map(Message::Tags)]);
//!
//! while let Some(Message::Tags(result)) = subscriptions.recv().await {
//!     if let Some(tags) = result.data() {
//!         println!("{} tags", tags.len());
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod command;
pub mod config;
pub mod context;
pub mod prelude;
pub mod server;
pub mod subscription;
