use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Everything except the listen port has a working default.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL of the settings store. `None` switches the settings store
    /// to plain process environment variables.
    pub database_url: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub site_url: String,
    pub site_name: String,
    pub news_api_url: String,
    pub search_url: String,
    pub image_api_url: String,
    pub key_refresh_interval: Duration,
    pub step_pause: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            port: env_or("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: env_or("RUST_LOG", "info"),
            site_url: env_or("SITE_URL", "https://aitoolsinsights.com")
                .trim_end_matches('/')
                .to_string(),
            site_name: env_or("SITE_NAME", "AI Tools Insights"),
            news_api_url: env_or("NEWS_API_URL", "https://newsapi.org/v2/everything"),
            search_url: env_or("SEARCH_URL", "https://www.google.com/search"),
            image_api_url: env_or("IMAGE_API_URL", "https://image.pollinations.ai")
                .trim_end_matches('/')
                .to_string(),
            key_refresh_interval: Duration::from_secs(
                env_or("KEY_REFRESH_SECS", "60")
                    .parse::<u64>()
                    .context("KEY_REFRESH_SECS must be a whole number of seconds")?,
            ),
            step_pause: Duration::from_millis(
                env_or("STEP_PAUSE_MS", "2000")
                    .parse::<u64>()
                    .context("STEP_PAUSE_MS must be a whole number of milliseconds")?,
            ),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
