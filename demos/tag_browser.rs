//! Tag browser demonstrating queries, a mutation and cache invalidation.
//!
//! This example shows:
//! - Query subscriptions for the tag list and the global search
//! - A mutation run as a `Command`, followed by invalidation of the tag list
//! - Search and settings providers with an explicit mount lifecycle
//!
//! Start the demo server first with `cargo run`, then run:
//! `cargo run --example tag_browser -- [TAG NAME]`

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};
use recall::api::{Api, NewTag, SearchResponse, Tag, keys};
use recall::config::{Config, MODE_ENV};
use recall::context::{SearchContext, SettingsContext, Theme};
use recall::prelude::*;
use recall::subscription::http::HttpClient;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum Message {
    Tags(QueryResult<Vec<Tag>>),
    Search(QueryResult<SearchResponse>),
    TagCreated(Result<Tag, MutationError>),
}

struct Browser {
    api: Api,
    search: SearchContext,
    create_tag: Mutation<NewTag, Tag>,
    pending_name: Option<String>,
    created: Option<Tag>,
    done: bool,
}

impl Browser {
    fn subscriptions(&self) -> Vec<Subscription<Message>> {
        let mut subscriptions = vec![Subscription::new(self.api.tags()).map(Message::Tags)];
        if let Ok(query) = self.search.global_query() {
            let search = self.api.search(&query, None);
            subscriptions.push(Subscription::new(search).map(Message::Search));
        }
        subscriptions
    }

    fn update(&mut self, msg: Message) -> Command<Message> {
        match msg {
            Message::Tags(result) => match &result.state {
                QueryState::Loading { previous } => {
                    info!(cached = previous.as_ref().map(Vec::len), "loading tags");
                    Command::none()
                }
                QueryState::Success { data, .. } => {
                    let names: Vec<&str> = data.iter().map(|t| t.name.as_str()).collect();
                    info!(?names, "tags");
                    if let Some(created) = &self.created {
                        self.done = data.iter().any(|t| t.id == created.id);
                    }
                    match self.pending_name.take() {
                        Some(name) if !self.create_tag.is_pending() => self
                            .create_tag
                            .mutate(NewTag::new(name))
                            .map(Message::TagCreated),
                        _ => Command::none(),
                    }
                }
                QueryState::Error { error, .. } => {
                    info!(%error, "failed to load tags");
                    self.done = true;
                    Command::none()
                }
                QueryState::Idle => Command::none(),
            },
            Message::Search(result) => {
                if let Some(response) = result.data() {
                    info!(key = %result.key, hits = response.results.len(), "search results");
                }
                Command::none()
            }
            Message::TagCreated(Ok(tag)) => {
                info!(id = tag.id, name = %tag.name, "tag created");
                self.created = Some(tag);
                self.api.queries().invalidate(&keys::tags());
                Command::none()
            }
            Message::TagCreated(Err(error)) => {
                info!(%error, "could not create tag");
                self.done = true;
                Command::none()
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tag_browser=info")),
        )
        .init();

    let mut config = Config::load_or_default(Path::new("recall.toml"))
        .wrap_err_with(|| format!("failed to load configuration ({MODE_ENV} may be invalid)"))?;
    config
        .client
        .default_headers
        .entry("x-user-id".to_owned())
        .or_insert_with(|| "demo".to_owned());

    let api = Api::new(
        HttpClient::from_config(&config.client)?,
        Arc::new(QueryClient::with_config(config.query_config())),
    );

    let search = SearchContext::new();
    let settings = SettingsContext::new();
    let _search_guard = search.mount()?;
    let _settings_guard = settings.mount()?;
    settings.set_theme(Theme::Dark)?;
    search.set_global_query("rust")?;
    info!(dark = settings.theme()?.is_dark(false), "settings applied");

    let mut browser = Browser {
        create_tag: api.create_tag(),
        api,
        search,
        pending_name: Some(std::env::args().nth(1).unwrap_or_else(|| "ownership".to_owned())),
        created: None,
        done: false,
    };

    let mut subscriptions = SubscriptionManager::new();
    let (tx, mut commands) = mpsc::unbounded_channel();
    let deadline = tokio::time::sleep(Duration::from_secs(10));
    tokio::pin!(deadline);

    while !browser.done {
        subscriptions.update(browser.subscriptions());
        let msg = tokio::select! {
            Some(msg) = subscriptions.recv() => msg,
            Some(msg) = commands.recv() => msg,
            () = &mut deadline => {
                info!("timed out");
                break;
            }
        };
        let _ = browser.update(msg).spawn(tx.clone());
    }

    subscriptions.shutdown().await;
    Ok(())
}
