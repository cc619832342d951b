// Article generation engine.
// Implements: step execution over the key pool, per-run context, prompts,
// the orchestrating pipeline and its streaming HTTP surface.
// All model calls go through llm_client via StepExecutor.

pub mod assembly;
pub mod context;
pub mod executor;
pub mod fallback;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod prompts;
