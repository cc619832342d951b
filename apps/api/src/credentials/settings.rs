//! Key/value settings store the credential pool reads API keys from.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

/// Read-only view of the settings store.
///
/// Carried by the credential pool as `Arc<dyn SettingsStore>`.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_setting(&self, name: &str) -> Result<Option<String>>;
}

/// Settings backed by the `settings(key, value)` table.
pub struct PgSettingsStore {
    pool: PgPool,
}

impl PgSettingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn get_setting(&self, name: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = $1 LIMIT 1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.filter(|v| !v.is_empty()))
    }
}

/// Settings read straight from the process environment. Used when no
/// database is configured.
pub struct EnvSettingsStore;

#[async_trait]
impl SettingsStore for EnvSettingsStore {
    async fn get_setting(&self, name: &str) -> Result<Option<String>> {
        Ok(std::env::var(name).ok().filter(|v| !v.is_empty()))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// In-memory settings for tests. Values can be swapped between reloads.
    #[derive(Default)]
    pub struct MemorySettings {
        values: Mutex<HashMap<String, String>>,
    }

    impl MemorySettings {
        pub fn with(pairs: &[(&str, &str)]) -> Self {
            let store = Self::default();
            for (k, v) in pairs {
                store.set(k, v);
            }
            store
        }

        pub fn set(&self, name: &str, value: &str) {
            self.values
                .lock()
                .unwrap()
                .insert(name.to_string(), value.to_string());
        }
    }

    #[async_trait]
    impl SettingsStore for MemorySettings {
        async fn get_setting(&self, name: &str) -> Result<Option<String>> {
            Ok(self.values.lock().unwrap().get(name).cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_env_store_treats_empty_as_missing() {
        std::env::set_var("AUTOWRITER_TEST_EMPTY_SETTING", "");
        let value = EnvSettingsStore
            .get_setting("AUTOWRITER_TEST_EMPTY_SETTING")
            .await
            .unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_env_store_reads_value() {
        std::env::set_var("AUTOWRITER_TEST_SETTING", "[\"abc\"]");
        let value = EnvSettingsStore
            .get_setting("AUTOWRITER_TEST_SETTING")
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("[\"abc\"]"));
    }
}
