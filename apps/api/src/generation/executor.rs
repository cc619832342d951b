//! Resilient step executor: runs one unit of model work across the key pool
//! with bounded retries, backoff and failure classification.
//!
//! Attempts are strictly sequential. Each step starts on its own "primary"
//! key (`step_index % pool size`) so consecutive steps spread over the pool
//! without coordinating with each other.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::credentials::{KeyPool, Service};
use crate::llm_client::{FailureClass, LlmError};

const OVERLOAD_BASE_MS: u64 = 5_000;
const OVERLOAD_MAX_MS: u64 = 60_000;
const RETRY_BASE_MS: u64 = 3_000;
const RETRY_STEP_MS: u64 = 1_000;
const RETRY_MAX_MS: u64 = 15_000;

#[derive(Debug, Error)]
pub enum StepError {
    #[error("No Gemini API keys configured. Please add at least one API key in Settings.")]
    NoKeys,

    #[error("{step} failed: {source}")]
    Fatal {
        step: String,
        #[source]
        source: LlmError,
    },

    #[error("{step} failed after {attempts} attempts across {keys} keys: {last_error}")]
    Exhausted {
        step: String,
        attempts: u32,
        keys: usize,
        last_error: LlmError,
    },
}

impl StepError {
    /// The provider error that ended the step, if any.
    pub fn last_error(&self) -> Option<&LlmError> {
        match self {
            StepError::NoKeys => None,
            StepError::Fatal { source, .. } => Some(source),
            StepError::Exhausted { last_error, .. } => Some(last_error),
        }
    }
}

/// Output of a successful step plus how it got there.
#[derive(Debug)]
pub struct StepResult<T> {
    pub data: T,
    pub attempts_used: u32,
    pub key_index_used: usize,
}

pub struct StepExecutor {
    keys: Arc<KeyPool>,
}

impl StepExecutor {
    pub fn new(keys: Arc<KeyPool>) -> Self {
        Self { keys }
    }

    /// Language-model keys a step would currently be offered.
    pub async fn key_count(&self) -> usize {
        self.keys.all_keys(Service::Llm).await.len()
    }

    /// Runs `work` with successive keys until it succeeds, hits a fatal
    /// error, or `pool size * max_rounds` attempts are spent.
    pub async fn execute<T, F, Fut>(
        &self,
        step: &str,
        step_index: usize,
        max_rounds: u32,
        mut work: F,
    ) -> Result<StepResult<T>, StepError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let keys = self.keys.all_keys(Service::Llm).await;
        if keys.is_empty() {
            return Err(StepError::NoKeys);
        }

        let pool_size = keys.len();
        let max_rounds = max_rounds.max(1);
        let max_attempts = pool_size as u32 * max_rounds;
        let primary = step_index % pool_size;

        let mut attempts = 0u32;
        let mut last_error: Option<LlmError> = None;
        let mut last_key_index = primary;

        for round in 0..max_rounds {
            for offset in 0..pool_size {
                attempts += 1;
                let key_index = (primary + offset) % pool_size;
                let key = &keys[key_index];
                last_key_index = key_index;

                match &last_error {
                    None => info!("{step} using dedicated key #{}/{pool_size}", key_index + 1),
                    Some(previous) => {
                        let class = previous.classify();
                        let delay = backoff_delay(class, round, attempts);
                        info!(
                            "{step} retry {attempts}/{max_attempts} with key #{}/{pool_size} (round {}/{max_rounds}), waiting {}ms{}",
                            key_index + 1,
                            round + 1,
                            delay.as_millis(),
                            if class == FailureClass::Overloaded { " (service overload detected)" } else { "" }
                        );
                        tokio::time::sleep(delay).await;
                    }
                }

                match work(key.clone()).await {
                    Ok(data) => {
                        info!("{step} completed with key #{} (attempt {attempts})", key_index + 1);
                        self.keys.report_success(Service::Llm, key);
                        return Ok(StepResult {
                            data,
                            attempts_used: attempts,
                            key_index_used: key_index,
                        });
                    }
                    Err(e) => {
                        let class = e.classify();
                        warn!(
                            "{step} failed with key #{} (attempt {attempts}/{max_attempts}, {class:?}): {}",
                            key_index + 1,
                            truncate(&e.to_string(), 200)
                        );
                        if class.is_fatal() {
                            error!("{step}: fatal {class:?} error, stopping retries");
                            return Err(StepError::Fatal {
                                step: step.to_string(),
                                source: e,
                            });
                        }
                        last_error = Some(e);
                    }
                }
            }
        }

        let last_error = last_error.unwrap_or(LlmError::EmptyContent);
        error!("{step}: all {attempts} attempts exhausted");
        self.keys
            .report_failure(Service::Llm, &keys[last_key_index], &last_error.to_string());

        Err(StepError::Exhausted {
            step: step.to_string(),
            attempts,
            keys: pool_size,
            last_error,
        })
    }
}

/// Pause before attempt number `attempts` (1-based, already counted).
/// Provider overload backs off exponentially per round; everything else
/// grows linearly with the attempt count.
pub fn backoff_delay(previous: FailureClass, round: u32, attempts: u32) -> Duration {
    let ms = if previous == FailureClass::Overloaded {
        OVERLOAD_BASE_MS
            .saturating_mul(2u64.saturating_pow(round))
            .min(OVERLOAD_MAX_MS)
    } else {
        (RETRY_BASE_MS + u64::from(attempts) * RETRY_STEP_MS).min(RETRY_MAX_MS)
    };
    Duration::from_millis(ms)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
