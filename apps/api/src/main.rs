/// Compiles a literal regex once and hands out a `&'static Regex`.
macro_rules! static_regex {
    ($pattern:expr) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($pattern).expect("static regex literal is valid"))
    }};
}

mod config;
mod credentials;
mod db;
mod errors;
mod generation;
mod images;
mod llm_client;
mod quality;
mod render;
mod research;
mod routes;
mod state;
mod structured_data;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::credentials::settings::{EnvSettingsStore, PgSettingsStore, SettingsStore};
use crate::credentials::KeyPool;
use crate::db::create_pool;
use crate::generation::executor::StepExecutor;
use crate::generation::pipeline::{ArticlePipeline, SiteSettings};
use crate::images::PollinationsClient;
use crate::llm_client::LlmClient;
use crate::research::{ResearchUrls, WebResearch};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Autowriter API v{}", env!("CARGO_PKG_VERSION"));

    // Settings store: Postgres when configured, process environment otherwise
    let settings: Arc<dyn SettingsStore> = match &config.database_url {
        Some(url) => Arc::new(PgSettingsStore::new(create_pool(url).await?)),
        None => {
            info!("DATABASE_URL not set, reading API keys from the environment");
            Arc::new(EnvSettingsStore)
        }
    };

    let keys = Arc::new(KeyPool::new(settings, config.key_refresh_interval));

    let llm = LlmClient::new()?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let research = WebResearch::new(
        keys.clone(),
        ResearchUrls {
            news_api: config.news_api_url.clone(),
            search: config.search_url.clone(),
        },
    )?;
    let images = PollinationsClient::new(config.image_api_url.clone())?;

    let pipeline = ArticlePipeline::new(
        Arc::new(llm),
        Arc::new(research),
        Arc::new(images),
        StepExecutor::new(keys.clone()),
        SiteSettings {
            site_url: config.site_url.clone(),
            site_name: config.site_name.clone(),
            step_pause: config.step_pause,
        },
    );

    let state = AppState {
        keys,
        pipeline: Arc::new(pipeline),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the admin UI has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
