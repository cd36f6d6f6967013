//! Demo backend serving the learning-content API from memory.
//!
//! Usage: `recall [CONFIG]` (default `recall.toml`; a missing file means defaults).
//! Set `RECALL_ENV=development` to include diagnostics in error responses and
//! `RUST_LOG` to adjust logging.

use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr};
use tracing::info;
use tracing_subscriber::EnvFilter;

use recall::config::Config;
use recall::server::{self, store::Store};

const DEMO_USER: &str = "demo";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("recall=info")),
        )
        .init();

    let path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from("recall.toml"), PathBuf::from);
    let config = Config::load_or_default(&path)
        .wrap_err_with(|| format!("failed to load {}", path.display()))?;

    let store = Arc::new(Store::new());
    seed(&store).await;

    let app = server::router(store, config.server.mode);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .wrap_err_with(|| format!("failed to bind {}", config.server.bind))?;
    info!(
        bind = %config.server.bind,
        mode = %config.server.mode,
        user = DEMO_USER,
        "serving"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .wrap_err("server error")?;
    Ok(())
}

async fn seed(store: &Store) {
    let video = store
        .add_video(DEMO_USER, "Rust ownership explained", "Moves, borrows and lifetimes")
        .await;
    store
        .add_report(
            video,
            "Ownership in five minutes",
            "Every value has a single owner. Borrowing lends access without moving it.",
            "medium",
        )
        .await;
    store
        .add_flashcard_set(
            video,
            "Ownership basics",
            &[
                ("What happens to a value when its owner goes out of scope?", "It is dropped"),
                ("How many mutable borrows may coexist?", "One"),
            ],
        )
        .await;
    store
        .add_idea_set(
            video,
            "questions",
            &["Why does Rust forbid aliasing mutable references?"],
        )
        .await;
}
