//! Prelude module for convenient imports.
//!
//! ```
//! use recall::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`Command`] - For performing side effects
//! - [`Subscription`] and [`SubscriptionManager`] - For long-lived sources
//! - [`Query`], [`QueryClient`], [`QueryKey`] and [`QueryResult`] - For cached reads
//! - [`Mutation`] - For writes
//! - [`query_key!`](crate::query_key) - For building keys

pub use crate::command::Command;
pub use crate::query_key;
pub use crate::subscription::http::{
    Mutation, MutationError, Query, QueryClient, QueryError, QueryKey, QueryResult, QueryState,
};
pub use crate::subscription::{Subscription, SubscriptionManager};
