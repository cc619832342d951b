//! Credential pool: owns the API keys of every external service and tracks
//! their health.
//!
//! One pool object is built at startup and shared by all requests through
//! `AppState`. Keys are loaded lazily from the settings store and re-read on a
//! fixed interval; failure counters survive reloads for keys that are still
//! configured.
//!
//! Selection is round-robin from the slot after the last-used key, skipping
//! keys at or above the service ceiling. Failure counts are advisory: two
//! concurrent runs may race on them, and the worst case is a redundant retry.

pub mod settings;

use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use self::settings::SettingsStore;

/// Failure state is forgiven once this long has passed since the last failure.
pub const COOL_DOWN: Duration = Duration::from_secs(5 * 60);

/// Language-model keys shorter than this (after trimming) are ignored on load.
const MIN_LLM_KEY_LEN: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    /// Generative language-model provider.
    Llm,
    /// News-search provider.
    News,
}

impl Service {
    /// Failure count at which a key stops being selected.
    pub fn failure_ceiling(self) -> u32 {
        match self {
            Service::Llm => 5,
            Service::News => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Service::Llm => "Gemini",
            Service::News => "NewsAPI",
        }
    }

    fn keys_setting(self) -> &'static str {
        match self {
            Service::Llm => "GEMINI_API_KEYS",
            Service::News => "NEWSAPI_KEYS",
        }
    }

    fn legacy_setting(self) -> &'static str {
        match self {
            Service::Llm => "GEMINI_API_KEY",
            Service::News => "NEWSAPI_KEY",
        }
    }
}

impl FromStr for Service {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "llm" | "gemini" => Ok(Service::Llm),
            "news" | "newsapi" => Ok(Service::News),
            other => Err(format!("unknown service '{other}'")),
        }
    }
}

/// Health state of a single API key.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub key: String,
    pub last_used_at: Option<Instant>,
    pub failure_count: u32,
    pub last_error: Option<String>,
    pub last_failure_at: Option<Instant>,
}

impl CredentialRecord {
    fn new(key: String) -> Self {
        Self {
            key,
            last_used_at: None,
            failure_count: 0,
            last_error: None,
            last_failure_at: None,
        }
    }

    fn is_healthy(&self, ceiling: u32) -> bool {
        self.failure_count < ceiling
    }

    fn forgive(&mut self) {
        self.failure_count = 0;
        self.last_error = None;
        self.last_failure_at = None;
    }
}

/// Counts reported by `KeyPool::health_snapshot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolHealth {
    pub total: usize,
    pub healthy: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct ServicePool {
    records: Vec<CredentialRecord>,
    cursor: usize,
}

impl ServicePool {
    /// Swaps in a freshly loaded key list, carrying over the state of keys
    /// that were already known.
    fn replace_keys(&mut self, keys: Vec<String>) {
        let mut previous = std::mem::take(&mut self.records);
        self.records = keys
            .into_iter()
            .map(|key| match previous.iter().position(|r| r.key == key) {
                Some(i) => previous.swap_remove(i),
                None => CredentialRecord::new(key),
            })
            .collect();
        if self.cursor >= self.records.len() {
            self.cursor = 0;
        }
    }

    fn select(&mut self, ceiling: u32, now: Instant) -> Option<(usize, String)> {
        if self.records.is_empty() {
            return None;
        }

        for record in &mut self.records {
            let cooled = record
                .last_failure_at
                .is_some_and(|at| now.saturating_duration_since(at) > COOL_DOWN);
            if record.failure_count > 0 && cooled {
                debug!("Cool-down expired for key {}, forgiving failures", mask_key(&record.key));
                record.forgive();
            }
        }

        if self.records.iter().all(|r| !r.is_healthy(ceiling)) {
            warn!("All keys are over the failure ceiling, resetting every failure count");
            self.records.iter_mut().for_each(CredentialRecord::forgive);
            self.cursor = 0;
        } else {
            let n = self.records.len();
            self.cursor = (self.cursor + 1) % n;
            let mut skipped = 0;
            while !self.records[self.cursor].is_healthy(ceiling) && skipped < n {
                self.cursor = (self.cursor + 1) % n;
                skipped += 1;
            }
        }

        let record = &mut self.records[self.cursor];
        record.last_used_at = Some(now);
        Some((self.cursor, record.key.clone()))
    }

    fn find_mut(&mut self, key: &str) -> Option<&mut CredentialRecord> {
        self.records.iter_mut().find(|r| r.key == key)
    }

    fn health(&self, ceiling: u32) -> PoolHealth {
        let healthy = self.records.iter().filter(|r| r.is_healthy(ceiling)).count();
        PoolHealth {
            total: self.records.len(),
            healthy,
            failed: self.records.len() - healthy,
        }
    }
}

#[derive(Debug, Default)]
struct PoolState {
    llm: ServicePool,
    news: ServicePool,
    loaded_at: Option<Instant>,
}

impl PoolState {
    fn pool_mut(&mut self, service: Service) -> &mut ServicePool {
        match service {
            Service::Llm => &mut self.llm,
            Service::News => &mut self.news,
        }
    }
}

/// Process-wide pool of API keys for every external service.
///
/// The mutex is only held for in-memory bookkeeping, never across an await.
pub struct KeyPool {
    settings: Arc<dyn SettingsStore>,
    refresh_interval: Duration,
    state: Mutex<PoolState>,
}

impl KeyPool {
    pub fn new(settings: Arc<dyn SettingsStore>, refresh_interval: Duration) -> Self {
        Self {
            settings,
            refresh_interval,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Returns the next usable key, or `None` when the service has no key at
    /// all. `None` is a configuration error for the caller, never a retry.
    pub async fn next_key(&self, service: Service) -> Option<String> {
        self.refresh().await;

        let selected = self
            .lock()
            .pool_mut(service)
            .select(service.failure_ceiling(), Instant::now());

        match selected {
            Some((index, key)) => {
                debug!("Using {} key #{} ({})", service.label(), index + 1, mask_key(&key));
                Some(key)
            }
            None => self.legacy_key(service).await,
        }
    }

    /// Every configured key for a service in pool order. Falls back to the
    /// legacy single key as a one-element list.
    pub async fn all_keys(&self, service: Service) -> Vec<String> {
        self.refresh().await;

        let keys: Vec<String> = self
            .lock()
            .pool_mut(service)
            .records
            .iter()
            .map(|r| r.key.clone())
            .collect();

        if !keys.is_empty() {
            return keys;
        }
        self.legacy_key(service).await.into_iter().collect()
    }

    pub fn report_success(&self, service: Service, key: &str) {
        let mut state = self.lock();
        if let Some(record) = state.pool_mut(service).find_mut(key) {
            if record.failure_count > 0 {
                info!(
                    "{} key {} succeeded, clearing {} failure(s)",
                    service.label(),
                    mask_key(key),
                    record.failure_count
                );
            }
            record.forgive();
        }
    }

    pub fn report_failure(&self, service: Service, key: &str, error: &str) {
        let mut state = self.lock();
        if let Some(record) = state.pool_mut(service).find_mut(key) {
            record.failure_count += 1;
            record.last_error = Some(error.to_string());
            record.last_failure_at = Some(Instant::now());
            warn!(
                "{} key {} failed ({}/{}): {}",
                service.label(),
                mask_key(key),
                record.failure_count,
                service.failure_ceiling(),
                truncate(error, 200)
            );
        }
    }

    pub async fn health_snapshot(&self, service: Service) -> PoolHealth {
        self.refresh().await;
        self.lock()
            .pool_mut(service)
            .health(service.failure_ceiling())
    }

    /// Clears the failure state of every key of a service.
    pub async fn reset(&self, service: Service) {
        self.refresh().await;
        let mut state = self.lock();
        state
            .pool_mut(service)
            .records
            .iter_mut()
            .for_each(CredentialRecord::forgive);
        info!("All {} keys reset", service.label());
    }

    async fn refresh(&self) {
        let due = {
            let state = self.lock();
            state.llm.records.is_empty()
                || state
                    .loaded_at
                    .map_or(true, |at| at.elapsed() >= self.refresh_interval)
        };
        if !due {
            return;
        }

        let llm = self.read_keys(Service::Llm).await;
        let news = self.read_keys(Service::News).await;

        let mut state = self.lock();
        state.llm.replace_keys(llm);
        state.news.replace_keys(news);
        state.loaded_at = Some(Instant::now());
        debug!(
            "Loaded {} Gemini keys and {} NewsAPI keys",
            state.llm.records.len(),
            state.news.records.len()
        );
    }

    async fn read_keys(&self, service: Service) -> Vec<String> {
        let raw = match self.settings.get_setting(service.keys_setting()).await {
            Ok(value) => value.unwrap_or_else(|| "[]".to_string()),
            Err(e) => {
                warn!("Failed to read {}: {e:#}", service.keys_setting());
                return Vec::new();
            }
        };

        let keys: Vec<String> = match serde_json::from_str(&raw) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("{} is not a JSON array of strings: {e}", service.keys_setting());
                return Vec::new();
            }
        };

        keys.into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| match service {
                Service::Llm => k.len() >= MIN_LLM_KEY_LEN,
                Service::News => !k.is_empty(),
            })
            .collect()
    }

    async fn legacy_key(&self, service: Service) -> Option<String> {
        match self.settings.get_setting(service.legacy_setting()).await {
            Ok(Some(key)) => {
                warn!("Using legacy single {} API key", service.label());
                Some(key)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read {}: {e:#}", service.legacy_setting());
                None
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Short, log-safe form of an API key.
pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(8).collect();
    format!("{prefix}... ({} chars)", key.chars().count())
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
