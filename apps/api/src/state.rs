use std::sync::Arc;

use crate::credentials::KeyPool;
use crate::generation::pipeline::ArticlePipeline;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Process-wide credential pool, shared by every concurrent generation run.
    pub keys: Arc<KeyPool>,
    pub pipeline: Arc<ArticlePipeline>,
}
